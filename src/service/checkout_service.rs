// service/checkout_service.rs
use std::{collections::BTreeMap, sync::Arc};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::DataStore,
    dtos::storedtos::CheckoutDto,
    middleware::AuthSession,
    models::storemodels::{NewOrder, Order, OrderItem},
    service::{
        cart::{CartTotals, PricingPolicy},
        error::ServiceError,
        payment_provider::{PaymentDetails, PaymentGateway, PaymentOutcome},
    },
    utils::currency::format_minor,
};

#[derive(Debug, Clone)]
pub struct CheckoutService {
    db_client: Arc<dyn DataStore>,
    gateway: Arc<dyn PaymentGateway>,
    policy: PricingPolicy,
}

impl CheckoutService {
    pub fn new(db_client: Arc<dyn DataStore>, gateway: Arc<dyn PaymentGateway>, policy: PricingPolicy) -> Self {
        Self { db_client, gateway, policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Prices the requested lines from current product data. Each product must
    /// exist and be active. Repeated ids are merged.
    pub async fn quote(&self, dto: &CheckoutDto) -> Result<(Vec<OrderItem>, CartTotals), ServiceError> {
        let mut quantities: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &dto.items {
            if item.quantity <= 0 {
                return Err(ServiceError::validation("Quantity must be at least 1"));
            }
            let merged = quantities.entry(item.product_id).or_default();
            *merged = merged
                .checked_add(item.quantity)
                .ok_or_else(|| ServiceError::validation("Quantity is too large"))?;
        }
        if quantities.is_empty() {
            return Err(ServiceError::validation("Cart is empty"));
        }

        let ids: Vec<Uuid> = quantities.keys().copied().collect();
        let products = self.db_client.get_products_by_ids(&ids).await?;

        let mut items = Vec::with_capacity(quantities.len());
        for (product_id, quantity) in quantities {
            let product = products
                .iter()
                .find(|p| p.id == product_id)
                .ok_or_else(|| ServiceError::not_found(format!("Product {}", product_id)))?;
            if !product.active {
                return Err(ServiceError::validation(format!(
                    "{} is no longer available",
                    product.title
                )));
            }
            items.push(OrderItem {
                product_id,
                quantity,
                price: product.price,
                title: product.title.clone(),
                image_url: product.image_url.clone(),
            });
        }

        let totals = CartTotals::for_items(&items, &self.policy)
            .ok_or_else(|| ServiceError::validation("Order total is too large"))?;
        Ok((items, totals))
    }

    /// Prices the cart, authorizes payment and records the order. A declined
    /// payment writes nothing.
    pub async fn checkout(&self, session: &AuthSession, dto: &CheckoutDto) -> Result<Order, ServiceError> {
        let (items, totals) = self.quote(dto).await?;

        let payment = PaymentDetails {
            user_id: session.user_id,
            amount: totals.total,
            email: Some(session.email.clone()),
        };
        let reference = match self.gateway.authorize(&payment).await.map_err(ServiceError::Upstream)? {
            PaymentOutcome::Approved { reference } => reference,
            PaymentOutcome::Declined { reason } => {
                warn!("Payment declined for {}: {}", session.user_id, reason);
                return Err(ServiceError::PaymentDeclined(reason));
            }
        };

        let order = self
            .db_client
            .create_order(
                session.user_id,
                NewOrder {
                    items,
                    subtotal: totals.subtotal,
                    tax: totals.tax,
                    shipping: totals.shipping,
                    total_amount: totals.total,
                    payment_reference: reference,
                },
            )
            .await?;

        info!(
            "Order {} placed by {} for {}",
            order.id,
            session.user_id,
            format_minor(order.total_amount)
        );
        Ok(order)
    }

    pub async fn list_orders(&self, session: &AuthSession, limit: i64, offset: i64) -> Result<Vec<Order>, ServiceError> {
        Ok(self.db_client.get_user_orders(session.user_id, limit, offset).await?)
    }

    pub async fn get_order(&self, session: &AuthSession, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self
            .db_client
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))?;
        if order.user_id != session.user_id && !session.is_admin() {
            return Err(ServiceError::forbidden("view this order"));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        db::{storedb::{OrderExt, ProductExt}, MemoryStore},
        dtos::storedtos::CheckoutItemDto,
        models::{
            storemodels::{NewProduct, Product, ProductUpdate},
            usermodel::UserRole,
        },
        service::{
            payment_provider::MockPaymentGateway,
            test_support::{session, store},
        },
    };

    #[derive(Debug)]
    struct DecliningGateway;

    #[async_trait]
    impl PaymentGateway for DecliningGateway {
        async fn authorize(&self, _payment: &PaymentDetails) -> Result<PaymentOutcome, String> {
            Ok(PaymentOutcome::Declined { reason: "card expired".to_string() })
        }
    }

    async fn product(store: &MemoryStore, mechanic_id: Uuid, price: i64) -> Product {
        store
            .create_product(
                mechanic_id,
                NewProduct {
                    title: "Brake pads".to_string(),
                    description: None,
                    price,
                    stock: 5,
                    image_url: None,
                    active: true,
                },
            )
            .await
            .unwrap()
    }

    fn line(product_id: Uuid, quantity: i32) -> CheckoutItemDto {
        CheckoutItemDto { product_id, quantity }
    }

    fn service(store: Arc<MemoryStore>, gateway: Arc<dyn PaymentGateway>) -> CheckoutService {
        CheckoutService::new(store, gateway, PricingPolicy::default())
    }

    #[tokio::test]
    async fn test_checkout_prices_and_snapshots_order() {
        let store = store();
        let buyer = session(&store, UserRole::User).await;
        let seller = session(&store, UserRole::Mechanic).await;
        let pads = product(&store, seller.user_id, 100_000).await;
        let checkout = service(store.clone(), Arc::new(MockPaymentGateway::new(Duration::ZERO)));

        let order = checkout
            .checkout(&buyer, &CheckoutDto { items: vec![line(pads.id, 2)] })
            .await
            .unwrap();

        assert_eq!(order.subtotal, 200_000);
        assert_eq!(order.tax, 10_000);
        assert_eq!(order.shipping, 1_000);
        assert_eq!(order.total_amount, 211_000);
        assert!(order.payment_reference.starts_with("MOCK-"));

        store
            .update_product(pads.id, seller.user_id, ProductUpdate { price: Some(1), ..Default::default() })
            .await
            .unwrap();
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.items.0[0].price, 100_000);
        assert_eq!(stored.items.0[0].title, "Brake pads");
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_merged() {
        let store = store();
        let seller = session(&store, UserRole::Mechanic).await;
        let pads = product(&store, seller.user_id, 500).await;
        let checkout = service(store.clone(), Arc::new(MockPaymentGateway::new(Duration::ZERO)));

        let (items, totals) = checkout
            .quote(&CheckoutDto { items: vec![line(pads.id, 1), line(pads.id, 2)] })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(totals.subtotal, 1_500);
    }

    #[tokio::test]
    async fn test_inactive_or_missing_products_rejected() {
        let store = store();
        let seller = session(&store, UserRole::Mechanic).await;
        let pads = product(&store, seller.user_id, 500).await;
        store
            .update_product(pads.id, seller.user_id, ProductUpdate { active: Some(false), ..Default::default() })
            .await
            .unwrap();
        let checkout = service(store.clone(), Arc::new(MockPaymentGateway::new(Duration::ZERO)));

        let err = checkout.quote(&CheckoutDto { items: vec![line(pads.id, 1)] }).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = checkout
            .quote(&CheckoutDto { items: vec![line(Uuid::new_v4(), 1)] })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_oversized_total_is_rejected_without_charging() {
        let store = store();
        let buyer = session(&store, UserRole::User).await;
        let seller = session(&store, UserRole::Mechanic).await;
        let gold = product(&store, seller.user_id, 100_000_000_000_000_000).await;
        let checkout = service(store.clone(), Arc::new(MockPaymentGateway::new(Duration::ZERO)));

        let err = checkout
            .checkout(&buyer, &CheckoutDto { items: vec![line(gold.id, 1)] })
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(checkout.list_orders(&buyer, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declined_payment_writes_no_order() {
        let store = store();
        let buyer = session(&store, UserRole::User).await;
        let seller = session(&store, UserRole::Mechanic).await;
        let pads = product(&store, seller.user_id, 500).await;
        let checkout = service(store.clone(), Arc::new(DecliningGateway));

        let err = checkout
            .checkout(&buyer, &CheckoutDto { items: vec![line(pads.id, 1)] })
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::PaymentDeclined(_)));
        assert!(checkout.list_orders(&buyer, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orders_are_private() {
        let store = store();
        let buyer = session(&store, UserRole::User).await;
        let other = session(&store, UserRole::User).await;
        let seller = session(&store, UserRole::Mechanic).await;
        let pads = product(&store, seller.user_id, 500).await;
        let checkout = service(store.clone(), Arc::new(MockPaymentGateway::new(Duration::ZERO)));

        let order = checkout
            .checkout(&buyer, &CheckoutDto { items: vec![line(pads.id, 1)] })
            .await
            .unwrap();

        assert!(checkout.get_order(&buyer, order.id).await.is_ok());
        assert!(matches!(
            checkout.get_order(&other, order.id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
