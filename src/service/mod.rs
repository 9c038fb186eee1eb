pub mod booking_service;
pub mod cart;
pub mod chat_service;
pub mod checkout_service;
pub mod error;
pub mod maps;
pub mod payment_provider;
pub mod realtime;
pub mod sos_service;
pub mod storage;
pub mod tracking;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::{
        db::{userdb::UserExt, MemoryStore},
        middleware::AuthSession,
        models::usermodel::UserRole,
    };

    pub fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    /// Registers a fresh user with `role` and returns their session.
    pub async fn session(store: &MemoryStore, role: UserRole) -> AuthSession {
        let email = format!("{}@example.com", Uuid::new_v4());
        let (user, profile) = store
            .create_user_with_profile(&email, "hash", "Test User", None, role)
            .await
            .unwrap();
        AuthSession {
            user_id: user.id,
            email: user.email,
            role: profile.role,
        }
    }
}
