pub mod bookingdb;
pub mod chatdb;
pub mod db;
pub mod memory;
pub mod query_timeout;
pub mod sosdb;
pub mod storedb;
pub mod userdb;

use std::fmt::Debug;

pub use db::DBClient;
pub use memory::MemoryStore;

use bookingdb::BookingExt;
use chatdb::ChatExt;
use sosdb::SosExt;
use storedb::{OrderExt, ProductExt};
use userdb::UserExt;

/// Everything the services need from persistence. Implemented by the
/// Postgres-backed [`DBClient`] and by the in-process [`MemoryStore`].
pub trait DataStore:
    UserExt + BookingExt + SosExt + ChatExt + ProductExt + OrderExt + Send + Sync + Debug
{
    fn backend_name(&self) -> &'static str;
}
