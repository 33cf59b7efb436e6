//! Outward-facing implementations of the core ports: Postgres and
//! in-memory directory stores, the fail-ban redis feed and the Yubico
//! validation client, plus environment-driven settings.

pub mod config;
pub mod notify;
pub mod otp;
pub mod persistence;
pub mod telemetry;

pub use config::Settings;
pub use notify::redis_fail_ban::RedisFailBanNotifier;
pub use otp::yubico_client::YubicoHttpClient;
pub use persistence::memory_directory::MemoryDirectory;
pub use persistence::postgres_directory::PgDirectoryStore;
pub use telemetry::init_tracing;
