use thiserror::Error;

use crate::remote::RemoteError;

/// Failure taxonomy at the store boundary.
///
/// Stores never let a panic cross their public surface; fallible operations
/// either return a success flag (with the message recorded on the store's
/// `error` field) or a `Result` carrying one of these variants.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not authenticated")]
    AuthenticationRequired,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation already in flight")]
    InFlight,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
