// service/payment_provider.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub user_id: Uuid,
    /// Minor currency units.
    pub amount: i64,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

/// Authorizes a charge. Real providers plug in here; checkout only sees the outcome.
#[async_trait]
pub trait PaymentGateway: Send + Sync + std::fmt::Debug {
    async fn authorize(&self, payment: &PaymentDetails) -> Result<PaymentOutcome, String>;
}

/// Approves every positive amount after a fixed delay.
#[derive(Debug, Clone)]
pub struct MockPaymentGateway {
    delay: Duration,
}

impl MockPaymentGateway {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    fn generate_reference() -> String {
        let suffix: u32 = rand::rng().random_range(100_000..1_000_000);
        format!("MOCK-{}-{}", Utc::now().timestamp_millis(), suffix)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn authorize(&self, payment: &PaymentDetails) -> Result<PaymentOutcome, String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if payment.amount <= 0 {
            return Ok(PaymentOutcome::Declined {
                reason: "Amount must be positive".to_string(),
            });
        }

        let reference = Self::generate_reference();
        tracing::info!(user_id = %payment.user_id, amount = payment.amount, %reference, "mock payment approved");
        Ok(PaymentOutcome::Approved { reference })
    }
}
