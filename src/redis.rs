//! Shared store backend.

use crate::algorithms::{WindowOutcome, WindowRequest};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;

/// Expire, count, conditionally add and refresh TTL in one server-side step.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. window_start)
local count = redis.call('ZCARD', key)
if count >= limit then
  return {0, count}
end

redis.call('ZADD', key, now, member)
redis.call('EXPIRE', key, ttl)
return {1, count + 1}
"#;

/// Ordered-set store holding window records shared across instances.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Cheap reachability check used when probing the store.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Apply one request to the window record atomically.
    async fn record(&self, request: &WindowRequest<'_>) -> Result<WindowOutcome, StoreError>;

    /// Human readable location for logs. Must not contain credentials.
    fn describe(&self) -> String;
}

pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    connect_timeout: Duration,
    script: Script,
}

impl RedisStore {
    pub fn new(redis_url: &str, connect_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Connect(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            connect_timeout,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }

    /// Hand out the cached connection, dialing a new one if needed.
    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.connect_timeout))?
        .map_err(|e| StoreError::Connect(format!("Failed to connect to Redis: {}", e)))?;

        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the cached connection so the next call redials.
    async fn reset_connection(&self) {
        self.connection.lock().await.take();
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let reply = redis::cmd("PING").query_async::<_, String>(&mut conn).await;

        match reply {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(other) => Err(StoreError::Protocol(format!("PING returned {}", other))),
            Err(e) => {
                self.reset_connection().await;
                Err(StoreError::Command(e))
            }
        }
    }

    async fn record(&self, request: &WindowRequest<'_>) -> Result<WindowOutcome, StoreError> {
        let mut conn = self.connection().await?;

        let reply: Result<(i64, i64), _> = self
            .script
            .key(request.key)
            .arg(request.now_ms)
            .arg(request.window_start_ms())
            .arg(request.limit)
            .arg(request.member)
            .arg(request.ttl_secs)
            .invoke_async(&mut conn)
            .await;

        let (allowed, count) = match reply {
            Ok(values) => values,
            Err(e) => {
                self.reset_connection().await;
                return Err(StoreError::Command(e));
            }
        };

        if !(0..=1).contains(&allowed) || count < 0 {
            return Err(StoreError::Protocol(format!(
                "window script returned ({}, {})",
                allowed, count
            )));
        }

        Ok(WindowOutcome {
            allowed: allowed == 1,
            count: count as u64,
        })
    }

    fn describe(&self) -> String {
        let info = self.client.get_connection_info();
        format!("{}/{}", info.addr, info.redis.db)
    }
}
