//! Caller authentication.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <secret>
//!     → token.rs   (credential + live membership → ConnectionContext)
//!     → session.rs (x-session-id bound to the authenticated user)
//! ```

pub mod session;
pub mod token;

use rand::RngCore;

pub use session::{Session, SessionBinder, SessionError};
pub use token::{
    generate_credential, hash_secret, parse_bearer, ConnectionContext, StoreTokenValidator,
    TokenError, TokenValidator,
};

/// `bytes` of OS-seeded randomness as lowercase hex.
pub(crate) fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}
