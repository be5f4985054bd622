//! Chain interaction errors.

use alloy::primitives::B256;
use alloy::rpc::json_rpc::RpcError;
use alloy::transports::TransportError;

/// JSON-RPC error code geth uses for reverted `eth_call`s.
const REVERT_ERROR_CODE: i64 = 3;

/// JSON-RPC codes that indicate an overloaded or rate-limited node.
const TRANSIENT_RPC_CODES: [i64; 3] = [-32005, -32603, 429];

/// Errors returned by the chain layer.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid RPC URL: {0}")]
    InvalidUrl(String),

    /// Connection failure, timeout, empty response and similar.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The node answered with a non-revert error.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The call executed and reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("failed to decode RPC response: {0}")]
    Decode(String),

    #[error("block {0} not found")]
    MissingBlock(String),

    #[error("no signer configured")]
    NoSigner,

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// Submission failed before or while waiting for the receipt.
    #[error("transaction submission failed: {0}")]
    Submission(String),

    /// Broadcast, but no receipt arrived in time; the nonce stays consumed.
    #[error("transaction {0} sent but not confirmed")]
    Unconfirmed(B256),

    /// Mined with a failed status.
    #[error("transaction {0} reverted on-chain")]
    TransactionReverted(B256),
}

impl ChainError {
    /// Whether the call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rpc { code, .. } => TRANSIENT_RPC_CODES.contains(code),
            _ => false,
        }
    }
}

impl From<TransportError> for ChainError {
    fn from(e: TransportError) -> Self {
        if let Some(payload) = e.as_error_resp() {
            let message = payload.message.to_string();
            if payload.code == REVERT_ERROR_CODE || message.to_lowercase().contains("revert") {
                return Self::Reverted(message);
            }
            return Self::Rpc {
                code: payload.code,
                message,
            };
        }
        match e {
            RpcError::SerError(e) => Self::Decode(e.to_string()),
            RpcError::DeserError { err, .. } => Self::Decode(err.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<alloy::contract::Error> for ChainError {
    fn from(e: alloy::contract::Error) -> Self {
        match e {
            alloy::contract::Error::TransportError(e) => e.into(),
            other => Self::Decode(other.to_string()),
        }
    }
}
