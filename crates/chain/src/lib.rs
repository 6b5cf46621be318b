//! Polymarket CLOB trading layer.
//!
//! This crate provides:
//! - Signature modes (EOA, legacy proxy, Gnosis Safe proxy) and API credentials
//! - L1 (EIP-712) and L2 (HMAC) request authentication
//! - CTF Exchange order construction and EIP-712 signing
//! - A CLOB client that prices and posts fill-or-kill market sells

pub mod auth;
mod clob;
pub mod order;

pub use alloy::primitives::Address;
pub use auth::{ApiCredentials, SignatureType};
pub use clob::{parse_order_response, ClobClient, OrderResponse, OrderSubmitter, SubmitError, CLOB_HOST, POLYGON_CHAIN_ID};
