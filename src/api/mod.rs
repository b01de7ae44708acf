//! REST access to the workforce backend.
//!
//! Every call resolves to an [`ApiResponse`] envelope; transport and HTTP
//! failures are folded into its `error` field instead of being returned as
//! `Err`, so callers branch on the envelope alone.

mod client;
mod envelope;

pub use client::ApiClient;
pub use envelope::{ApiError, ApiResponse, STATUS_NETWORK_ERROR};
