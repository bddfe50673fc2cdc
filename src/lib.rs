//! minichain - A minimal ledger-validation and peer-propagation engine
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Packet Codec
//! - [`packet`] - Canonical serialization and content hashing of typed records
//!
//! ## Ledger
//! - [`ledger`] - Pure transaction replay and block-chain validation
//!
//! ## Networking
//! - [`node`] - Peer nodes and the in-process network registry
//!
//! ## Utilities
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Packet Codec
// ============================================================================
pub mod packet;

// ============================================================================
// Ledger
// ============================================================================
pub mod ledger;

// ============================================================================
// Networking
// ============================================================================
pub mod node;

// ============================================================================
// Utilities
// ============================================================================
pub mod error;
