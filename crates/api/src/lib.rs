//! Block-explorer access and request pacing for the Kashi liquidator.
//!
//! This crate provides:
//! - ExplorerClient: Etherscan-compatible event log and transaction history queries
//! - Throttle: fixed-window rate limiting shared per endpoint
//! - retry: bounded exponential backoff with cooperative cancellation

mod error;
mod explorer;
pub mod retry;
mod throttle;

pub use error::ExplorerError;
pub use explorer::{AddressTransaction, ExplorerClient, ExplorerResponse, LogEntry, LogQuery, LogSource};
pub use retry::{retry, CancelToken, Cancellation, RetryError, RetryPolicy};
pub use throttle::Throttle;
