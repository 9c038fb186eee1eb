// config.rs
use std::fmt;

use crate::{models::bookingmodel::Coordinates, service::cart::PricingPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub app_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    pub cors_origins: Vec<String>,
    // Object storage
    pub storage_dir: String,
    pub storage_base_url: String,
    pub max_upload_bytes: usize,
    // Maps / geocoding
    pub directions_base_url: String,
    pub geocoding_base_url: String,
    pub http_timeout_secs: u64,
    pub db_query_timeout_secs: u64,
    // Live tracking
    pub tracking_interval_secs: u64,
    pub default_location: Coordinates,
    // Checkout
    pub shipping_fee_minor: i64,
    pub tax_rate_bps: i64,
    pub payment_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid(key, value) => write!(f, "{} has an invalid value: {}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn init() -> Config {
        Self::from_lookup(|key| std::env::var(key).ok())
            .unwrap_or_else(|err| panic!("configuration error: {}", err))
    }

    /// Reads every setting through `lookup` so the same parsing runs for the
    /// process environment and for tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET_KEY")?;
        let jwt_maxage = parse("JWT_MAXAGE", required("JWT_MAXAGE")?)?;

        let port = parse("PORT", or_default("PORT", "8000"))?;
        let app_url = or_default("APP_URL", "http://localhost:8000");

        let cors_origins = or_default("CORS_ORIGINS", "http://localhost:5173,http://localhost:8000")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let storage_dir = or_default("STORAGE_DIR", "./uploads");
        let storage_base_url = lookup("STORAGE_BASE_URL")
            .unwrap_or_else(|| format!("{}/uploads", app_url.trim_end_matches('/')));

        let default_location = Coordinates {
            latitude: parse("DEFAULT_LATITUDE", or_default("DEFAULT_LATITUDE", "28.6139"))?,
            longitude: parse("DEFAULT_LONGITUDE", or_default("DEFAULT_LONGITUDE", "77.2090"))?,
        };
        if !default_location.is_valid() {
            return Err(ConfigError::Invalid(
                "DEFAULT_LATITUDE/DEFAULT_LONGITUDE",
                format!("{:?}", default_location),
            ));
        }

        Ok(Config {
            database_url,
            app_url,
            jwt_secret,
            jwt_maxage,
            port,
            cors_origins,
            storage_dir,
            storage_base_url,
            max_upload_bytes: parse("MAX_UPLOAD_BYTES", or_default("MAX_UPLOAD_BYTES", "5242880"))?,
            directions_base_url: or_default("DIRECTIONS_BASE_URL", "https://router.project-osrm.org"),
            geocoding_base_url: or_default("GEOCODING_BASE_URL", "https://nominatim.openstreetmap.org"),
            http_timeout_secs: parse("HTTP_TIMEOUT_SECS", or_default("HTTP_TIMEOUT_SECS", "10"))?,
            db_query_timeout_secs: parse("DB_QUERY_TIMEOUT_SECS", or_default("DB_QUERY_TIMEOUT_SECS", "5"))?,
            tracking_interval_secs: parse("TRACKING_INTERVAL_SECS", or_default("TRACKING_INTERVAL_SECS", "10"))?,
            default_location,
            shipping_fee_minor: parse("SHIPPING_FEE_MINOR", or_default("SHIPPING_FEE_MINOR", "1000"))?,
            tax_rate_bps: parse("TAX_RATE_BPS", or_default("TAX_RATE_BPS", "500"))?,
            payment_delay_ms: parse("PAYMENT_DELAY_MS", or_default("PAYMENT_DELAY_MS", "1500"))?,
        })
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            shipping_fee: self.shipping_fee_minor,
            tax_rate_bps: self.tax_rate_bps,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key, value))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("memory://".to_string()),
        "JWT_SECRET_KEY" => Some("test-secret".to_string()),
        "JWT_MAXAGE" => Some("60".to_string()),
        "PAYMENT_DELAY_MS" => Some("0".to_string()),
        _ => None,
    })
    .expect("test config is valid")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_required_keys_are_reported() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_defaults_apply() {
        let config = test_config();
        assert_eq!(config.port, 8000);
        assert_eq!(config.tracking_interval_secs, 10);
        assert_eq!(config.shipping_fee_minor, 1000);
        assert_eq!(config.tax_rate_bps, 500);
        assert_eq!(config.storage_base_url, "http://localhost:8000/uploads");
        assert!(config.uses_memory_store());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://localhost/mechnest"),
            ("JWT_SECRET_KEY", "secret"),
            ("JWT_MAXAGE", "sixty"),
        ]
        .into_iter()
        .collect();

        let err = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err, ConfigError::Invalid("JWT_MAXAGE", "sixty".to_string()));
    }
}
