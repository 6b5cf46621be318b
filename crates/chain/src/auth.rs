//! CLOB authentication: signature modes, API credentials and request headers.
//!
//! Two header levels are used:
//! - L1: EIP-712 `ClobAuth` signature by the wallet key, used to derive API credentials
//! - L2: HMAC-SHA256 over the request with the derived API secret, used for trading calls

use std::fmt;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const CLOB_AUTH_DOMAIN_NAME: &str = "ClobAuthDomain";
const CLOB_AUTH_DOMAIN_VERSION: &str = "1";
const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";

pub const POLY_ADDRESS: &str = "POLY_ADDRESS";
pub const POLY_SIGNATURE: &str = "POLY_SIGNATURE";
pub const POLY_TIMESTAMP: &str = "POLY_TIMESTAMP";
pub const POLY_NONCE: &str = "POLY_NONCE";
pub const POLY_API_KEY: &str = "POLY_API_KEY";
pub const POLY_PASSPHRASE: &str = "POLY_PASSPHRASE";

sol! {
    #[derive(Debug)]
    struct ClobAuth {
        address address;
        string timestamp;
        uint256 nonce;
        string message;
    }
}

/// How the venue attributes an order signature to the funding wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    /// Wallet key signs for itself.
    #[serde(rename = "eoa", alias = "EOA")]
    Eoa,
    /// Key signs for a legacy proxy wallet.
    #[serde(rename = "proxy", alias = "poly-proxy", alias = "POLY_PROXY")]
    PolyProxy,
    /// Key signs for a Gnosis Safe proxy wallet.
    #[default]
    #[serde(rename = "gnosis-safe", alias = "safe", alias = "POLY_GNOSIS_SAFE")]
    PolyGnosisSafe,
}

impl SignatureType {
    /// Wire value of the order's `signatureType` field.
    pub fn as_u8(&self) -> u8 {
        match self {
            SignatureType::Eoa => 0,
            SignatureType::PolyProxy => 1,
            SignatureType::PolyGnosisSafe => 2,
        }
    }

    /// Whether orders are made on behalf of a separate funder wallet.
    pub fn uses_funder(&self) -> bool {
        !matches!(self, SignatureType::Eoa)
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureType::Eoa => "EOA",
            SignatureType::PolyProxy => "POLY_PROXY",
            SignatureType::PolyGnosisSafe => "POLY_GNOSIS_SAFE",
        };
        write!(f, "{}", name)
    }
}

/// L2 API credentials derived from the wallet key.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ApiCredentials {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

/// Request headers as (name, value) pairs.
pub type AuthHeaders = Vec<(&'static str, String)>;

/// Build L1 headers proving control of `signer`'s wallet.
pub async fn l1_headers(
    signer: &PrivateKeySigner,
    chain_id: u64,
    timestamp: u64,
    nonce: u64,
) -> Result<AuthHeaders, alloy::signers::Error> {
    let address = signer.address();
    let signature = sign_clob_auth(signer, chain_id, timestamp, nonce).await?;

    Ok(vec![
        (POLY_ADDRESS, address.to_checksum(None)),
        (POLY_SIGNATURE, signature),
        (POLY_TIMESTAMP, timestamp.to_string()),
        (POLY_NONCE, nonce.to_string()),
    ])
}

async fn sign_clob_auth(
    signer: &PrivateKeySigner,
    chain_id: u64,
    timestamp: u64,
    nonce: u64,
) -> Result<String, alloy::signers::Error> {
    let auth = clob_auth(signer.address(), timestamp, nonce);
    let hash = auth.eip712_signing_hash(&clob_auth_domain(chain_id));
    let signature = signer.sign_hash(&hash).await?;
    Ok(format!("0x{}", hex::encode(signature.as_bytes())))
}

fn clob_auth(address: Address, timestamp: u64, nonce: u64) -> ClobAuth {
    ClobAuth {
        address,
        timestamp: timestamp.to_string(),
        nonce: U256::from(nonce),
        message: CLOB_AUTH_MESSAGE.to_string(),
    }
}

fn clob_auth_domain(chain_id: u64) -> alloy::sol_types::Eip712Domain {
    eip712_domain! {
        name: CLOB_AUTH_DOMAIN_NAME,
        version: CLOB_AUTH_DOMAIN_VERSION,
        chain_id: chain_id,
    }
}

/// Build L2 headers for an authenticated trading request.
pub fn l2_headers(
    address: Address,
    credentials: &ApiCredentials,
    timestamp: u64,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<AuthHeaders> {
    let signature = l2_signature(&credentials.secret, timestamp, method, path, body)?;

    Ok(vec![
        (POLY_ADDRESS, address.to_checksum(None)),
        (POLY_SIGNATURE, signature),
        (POLY_TIMESTAMP, timestamp.to_string()),
        (POLY_API_KEY, credentials.api_key.clone()),
        (POLY_PASSPHRASE, credentials.passphrase.clone()),
    ])
}

/// HMAC-SHA256 of `timestamp + method + path + body`, keyed by the base64url secret.
pub fn l2_signature(
    secret: &str,
    timestamp: u64,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<String> {
    let key = URL_SAFE
        .decode(secret)
        .or_else(|_| URL_SAFE_NO_PAD.decode(secret.trim_end_matches('=')))
        .map_err(|e| anyhow!("API secret is not valid base64: {}", e))?;

    let mut message = format!("{}{}{}", timestamp, method, path);
    if let Some(body) = body {
        message.push_str(body);
    }

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|e| anyhow!("invalid API secret: {}", e))?;
    mac.update(message.as_bytes());

    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}
