//! Engine error types.

use kashi_api::ExplorerError;
use kashi_chain::ChainError;

/// Checked fixed-point arithmetic failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("division by zero in {0}")]
    DivisionByZero(&'static str),
}

/// Errors that fail a unit of work (a pair, a network pass).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("explorer error: {0}")]
    Explorer(#[from] ExplorerError),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pass deadline exceeded")]
    DeadlineExceeded,

    #[error("cancelled")]
    Cancelled,
}
