//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → origin.rs (Origin/Host checks)
//!     → rate_limit.rs (per-IP budget, later per-user budget)
//!     → [authentication]
//!
//! Inside execution:
//!     → sanitizer.rs (strip credential-shaped keys, both directions)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: an unconfigured origin policy rejects everything
//! - No trust in client input

pub mod origin;
pub mod rate_limit;
pub mod sanitizer;

pub use origin::{OriginGuard, OriginRejection};
pub use rate_limit::{RateLimitDecision, RateLimiter, WindowPolicy};
pub use sanitizer::{sanitize, SanitizationMonitor, Sanitized};
