use super::kv::HashClient;
use apiseal_core::{ApiSealError, ApiSealResult, KeyValueBackendConfig};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::time::Duration;
use tracing::{debug, info};

/// [`HashClient`] over a Redis server.
///
/// Holds one multiplexed connection shared by all requests; `close` leaves it
/// open and the connection is released when the client is dropped.
pub struct RedisHashClient {
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl RedisHashClient {
    /// Connect using the `[session.backend]` key-value settings.
    pub async fn connect(config: &KeyValueBackendConfig) -> ApiSealResult<Self> {
        let client = redis::Client::open(connection_info(config)).map_err(runtime)?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                ApiSealError::runtime(format!(
                    "timed out connecting to {}:{}",
                    config.host, config.port
                ))
            })?
            .map_err(runtime)?;

        info!(host = %config.host, port = config.port, "Connected to key-value server");
        Ok(Self { conn, timeout })
    }

    async fn timed<T, F>(&self, fut: F) -> ApiSealResult<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ApiSealError::runtime("key-value command timed out"))?
            .map_err(runtime)
    }
}

/// Credentials go into the structured info as given, never through a URL.
fn connection_info(config: &KeyValueBackendConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            password: config.password.clone(),
            ..Default::default()
        },
    }
}

fn runtime(e: redis::RedisError) -> ApiSealError {
    ApiSealError::runtime(format!("key-value server error: {e}"))
}

#[async_trait]
impl HashClient for RedisHashClient {
    async fn hget(&self, hash: &str, field: &str) -> ApiSealResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.timed(conn.hget(hash, field)).await
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> ApiSealResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self.timed(conn.hset(hash, field, value)).await?;
        Ok(())
    }

    async fn hdel(&self, hash: &str, field: &str) -> ApiSealResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self.timed(conn.hdel(hash, field)).await?;
        Ok(deleted > 0)
    }

    async fn close(&self) -> ApiSealResult<()> {
        debug!("Key-value connection kept open for reuse");
        Ok(())
    }
}
