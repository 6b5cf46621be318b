//! CTF Exchange order construction and EIP-712 signing.
//!
//! Market sells are expressed as limit orders priced to sweep the bid side:
//! - Price is the bid level at which cumulative size covers the order
//! - Maker amount is shares, taker amount is USDC, both in 6-decimal units
//! - Orders are signed against the standard or neg-risk exchange domain

use alloy::primitives::{address, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol;
use alloy::sol_types::{eip712_domain, Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};

use crate::auth::SignatureType;

/// CTF Exchange on Polygon.
pub const EXCHANGE_ADDRESS: Address = address!("4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");

/// Neg-risk CTF Exchange on Polygon.
pub const NEG_RISK_EXCHANGE_ADDRESS: Address = address!("C5d563A36AE78145C45a50134d48A1215220f80a");

const EXCHANGE_DOMAIN_NAME: &str = "Polymarket CTF Exchange";
const EXCHANGE_DOMAIN_VERSION: &str = "1";

/// Collateral and conditional tokens both use 6 decimals.
const TOKEN_DECIMALS: f64 = 1_000_000.0;

/// Salts stay within the integer range JSON consumers parse exactly.
const SALT_MASK: u128 = (1 << 53) - 1;

const SIDE_SELL: u8 = 1;

sol! {
    #[derive(Debug)]
    struct Order {
        uint256 salt;
        address maker;
        address signer;
        address taker;
        uint256 tokenId;
        uint256 makerAmount;
        uint256 takerAmount;
        uint256 expiration;
        uint256 nonce;
        uint256 feeRateBps;
        uint8 side;
        uint8 signatureType;
    }
}

/// One price level of the order book.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookLevel {
    #[serde(deserialize_with = "deserialize_f64")]
    pub price: f64,
    #[serde(deserialize_with = "deserialize_f64")]
    pub size: f64,
}

/// Order book snapshot for a single outcome token.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default = "default_tick_size", deserialize_with = "deserialize_f64")]
    pub tick_size: f64,
}

fn default_tick_size() -> f64 {
    0.01
}

/// Decimal places used when rounding order fields for a given tick size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundConfig {
    pub price: u32,
    pub size: u32,
    pub amount: u32,
}

impl RoundConfig {
    pub fn for_tick(tick_size: f64) -> Self {
        let price = if tick_size >= 0.1 {
            1
        } else if tick_size >= 0.01 {
            2
        } else if tick_size >= 0.001 {
            3
        } else {
            4
        };
        Self {
            price,
            size: 2,
            amount: price + 2,
        }
    }
}

/// Worst bid price needed to fill `shares` completely, walking from the best bid.
///
/// Returns `None` when the book cannot absorb the full size (fill-or-kill would fail).
pub fn market_sell_price(bids: &[BookLevel], shares: f64) -> Option<f64> {
    let mut levels: Vec<&BookLevel> = bids.iter().filter(|l| l.size > 0.0).collect();
    levels.sort_by(|a, b| b.price.total_cmp(&a.price));

    let mut filled = 0.0;
    for level in levels {
        filled += level.size;
        if filled >= shares {
            return Some(level.price);
        }
    }
    None
}

/// Maker (shares) and taker (USDC) amounts for a sell, in token base units.
pub fn sell_amounts(shares: f64, price: f64, round: RoundConfig) -> (U256, U256) {
    let maker = round_down(shares, round.size);
    let price = round_normal(price, round.price);
    let taker = round_down(maker * price, round.amount);
    (to_token_units(maker), to_token_units(taker))
}

/// Random order salt.
pub fn new_salt() -> u64 {
    (uuid::Uuid::new_v4().as_u128() & SALT_MASK) as u64
}

/// Unsigned sell order. Proxy modes trade from the funder wallet.
pub fn build_sell_order(
    signer: Address,
    funder: Address,
    mode: SignatureType,
    token_id: U256,
    maker_amount: U256,
    taker_amount: U256,
    salt: u64,
) -> Order {
    let maker = if mode.uses_funder() { funder } else { signer };
    Order {
        salt: U256::from(salt),
        maker,
        signer,
        taker: Address::ZERO,
        tokenId: token_id,
        makerAmount: maker_amount,
        takerAmount: taker_amount,
        expiration: U256::ZERO,
        nonce: U256::ZERO,
        feeRateBps: U256::ZERO,
        side: SIDE_SELL,
        signatureType: mode.as_u8(),
    }
}

/// EIP-712 domain of the exchange that settles the market.
pub fn exchange_domain(chain_id: u64, neg_risk: bool) -> Eip712Domain {
    let verifying_contract = if neg_risk {
        NEG_RISK_EXCHANGE_ADDRESS
    } else {
        EXCHANGE_ADDRESS
    };
    eip712_domain! {
        name: EXCHANGE_DOMAIN_NAME,
        version: EXCHANGE_DOMAIN_VERSION,
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    }
}

/// Sign `order`, returning the 0x-prefixed 65-byte signature.
pub async fn sign_order(
    signer: &PrivateKeySigner,
    order: &Order,
    chain_id: u64,
    neg_risk: bool,
) -> Result<String, alloy::signers::Error> {
    let hash = order.eip712_signing_hash(&exchange_domain(chain_id, neg_risk));
    let signature = signer.sign_hash(&hash).await?;
    Ok(format!("0x{}", hex::encode(signature.as_bytes())))
}

/// Order as posted to `/order`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub side: &'static str,
    pub signature_type: u8,
    pub signature: String,
}

impl SignedOrder {
    pub fn new(order: &Order, salt: u64, signature: String) -> Self {
        Self {
            salt,
            maker: order.maker.to_checksum(None),
            signer: order.signer.to_checksum(None),
            taker: order.taker.to_checksum(None),
            token_id: order.tokenId.to_string(),
            maker_amount: order.makerAmount.to_string(),
            taker_amount: order.takerAmount.to_string(),
            expiration: order.expiration.to_string(),
            nonce: order.nonce.to_string(),
            fee_rate_bps: order.feeRateBps.to_string(),
            side: if order.side == SIDE_SELL { "SELL" } else { "BUY" },
            signature_type: order.signatureType,
            signature,
        }
    }
}

/// Request body for `POST /order`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOrder {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: &'static str,
}

fn round_down(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    ((value * factor) + 1e-9).floor() / factor
}

fn round_normal(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn to_token_units(value: f64) -> U256 {
    U256::from((value * TOKEN_DECIMALS).round().max(0.0) as u128)
}

fn deserialize_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(f64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}
