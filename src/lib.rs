pub mod admission;
pub mod algorithms;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod redis;
pub mod response;
pub mod server;
pub mod validation;

pub use crate::admission::{AdmissionController, AdmissionResult, BackendMode};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{Config, LimiterConfig, QuotaTable};
pub use crate::error::{AdmissionError, ApiError, ConfigError, StoreError, Throttled};
pub use crate::redis::{RedisStore, SharedStore};
pub use crate::server::create_app;
