pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod utils;

use std::{sync::Arc, time::Duration};

use config::Config;
use db::DataStore;
use service::{
    booking_service::BookingService,
    chat_service::ChatService,
    checkout_service::CheckoutService,
    maps::{DirectionsProvider, Geocoder, NominatimGeocoder, OsrmDirections},
    payment_provider::{MockPaymentGateway, PaymentGateway},
    realtime::RealtimeHub,
    sos_service::SosService,
    storage::{LocalObjectStore, ObjectStore},
    tracking::TrackingService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn DataStore>,
    pub realtime: Arc<RealtimeHub>,
    pub storage: Arc<dyn ObjectStore>,
    pub geocoder: Arc<dyn Geocoder>,
    // Services
    pub booking_service: Arc<BookingService>,
    pub sos_service: Arc<SosService>,
    pub chat_service: Arc<ChatService>,
    pub checkout_service: Arc<CheckoutService>,
    pub tracking_service: Arc<TrackingService>,
}

impl AppState {
    pub fn new(db_client: Arc<dyn DataStore>, config: Config) -> Result<Self, reqwest::Error> {
        let http_timeout = Duration::from_secs(config.http_timeout_secs);

        let directions: Arc<dyn DirectionsProvider> =
            Arc::new(OsrmDirections::new(&config.directions_base_url, http_timeout)?);
        let geocoder: Arc<dyn Geocoder> =
            Arc::new(NominatimGeocoder::new(&config.geocoding_base_url, http_timeout)?);
        let gateway: Arc<dyn PaymentGateway> = Arc::new(MockPaymentGateway::new(
            Duration::from_millis(config.payment_delay_ms),
        ));
        let storage: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
            &config.storage_dir,
            &config.storage_base_url,
        ));

        Ok(Self::with_collaborators(db_client, config, directions, geocoder, gateway, storage))
    }

    /// Builds the state around explicit collaborators; used by `new` and by tests
    /// that swap in fakes for the maps, payment and storage seams.
    pub fn with_collaborators(
        db_client: Arc<dyn DataStore>,
        config: Config,
        directions: Arc<dyn DirectionsProvider>,
        geocoder: Arc<dyn Geocoder>,
        gateway: Arc<dyn PaymentGateway>,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        let realtime = Arc::new(RealtimeHub::new(RealtimeHub::DEFAULT_CAPACITY));

        let booking_service = Arc::new(BookingService::new(db_client.clone(), realtime.clone()));
        let sos_service = Arc::new(SosService::new(db_client.clone(), realtime.clone()));
        let chat_service = Arc::new(ChatService::new(db_client.clone(), realtime.clone()));
        let checkout_service = Arc::new(CheckoutService::new(
            db_client.clone(),
            gateway,
            config.pricing_policy(),
        ));
        let tracking_service = Arc::new(TrackingService::new(db_client.clone(), directions));

        Self {
            env: config,
            db_client,
            realtime,
            storage,
            geocoder,
            booking_service,
            sos_service,
            chat_service,
            checkout_service,
            tracking_service,
        }
    }
}
