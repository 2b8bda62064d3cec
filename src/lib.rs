//! Flowgate: a multi-tenant workflow execution gateway.
//!
//! Authenticated callers invoke stored workflow graphs over JSON-RPC. Each
//! request passes origin, rate-limit, credential and session checks before a
//! graph is ordered, its capabilities resolved, and its steps run in sequence
//! with credential-shaped parameters stripped on the way in and out.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod workflow;

// Backends
pub mod cache;
pub mod capabilities;
pub mod store;

// Cross-cutting concerns
pub mod admin;
pub mod auth;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::{ExternalServices, HttpServer};
pub use lifecycle::Shutdown;
