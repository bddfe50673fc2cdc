//! Error types for minichain

use std::fmt;

#[derive(Debug, Clone)]
pub enum ChainError {
    InvalidTransaction(String),
    InvalidBlock(String),
    InsufficientFunds(String),
    ParseError(String),
    UnknownNode(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::InvalidTransaction(msg) => write!(f, "Invalid Tx: {}", msg),
            ChainError::InvalidBlock(msg) => write!(f, "Invalid Block: {}", msg),
            ChainError::InsufficientFunds(msg) => write!(f, "Wallet error: {}", msg),
            ChainError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ChainError::UnknownNode(msg) => write!(f, "Unknown node: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::ParseError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
