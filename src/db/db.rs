use std::future::Future;
use std::time::Duration;

use sqlx::{Pool, Postgres};

use super::{query_timeout::QueryTimeout, DataStore};

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
    query_timeout: Duration,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient {
            pool,
            query_timeout: QueryTimeout::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Bounds a single query by the configured timeout.
    pub(crate) async fn timed<F, T>(&self, query: F) -> Result<T, sqlx::Error>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        QueryTimeout::execute_with_timeout(query, self.query_timeout).await
    }
}

impl DataStore for DBClient {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
