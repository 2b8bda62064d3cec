//! Configuration management subsystem.
//!
//! ```text
//! flowgate.toml
//!     → loader      toml → GatewayConfig, then validate_config
//!     → main        builds stores, cache, HttpServer from the result
//!
//! file edited
//!     → watcher     reload + validate, send on the update channel
//!     → server      re-validates and swaps RuntimeSettings
//! ```
//!
//! Every field has a default, so an empty file is a valid development config.
//! Only the origin policy and the admin key follow a reload; budgets, session
//! TTLs and cache wiring are read once at startup.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::AdminConfig;
pub use schema::GatewayConfig;
pub use schema::OriginConfig;
pub use schema::RateLimitConfig;
pub use schema::SessionConfig;
