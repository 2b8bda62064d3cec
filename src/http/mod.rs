//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, timeout, body limit)
//!     → rpc.rs (origin → budgets → credential → session → dispatch)
//!     → response.rs (JSON-RPC envelope, rate-limit / session / CORS headers)
//!     → Send to client
//! ```

pub mod response;
pub mod rpc;
pub mod server;

pub use response::{RpcReply, RpcRequest, X_SESSION_ID};
pub use server::{AppState, ExternalServices, HttpServer, RuntimeSettings};
