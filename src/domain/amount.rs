use crate::domain::wallet::WalletEndpoint;
use crate::error::{NegotiationError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest scale whose power of ten still fits in a `u64`.
pub const MAX_ASSET_SCALE: u8 = 19;

/// An amount of an asset expressed in integer minor units.
///
/// The value is produced once by [`to_minor_units`] (or handed back by a remote
/// server) and carried unchanged from then on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonetaryAmount {
    pub asset_code: String,
    pub asset_scale: u8,
    pub value: u64,
}

impl MonetaryAmount {
    pub fn new(asset_code: impl Into<String>, asset_scale: u8, value: u64) -> Self {
        Self {
            asset_code: asset_code.into(),
            asset_scale,
            value,
        }
    }

    /// Normalizes a human-entered amount against an asset.
    pub fn from_human(
        human_amount: Decimal,
        asset_code: impl Into<String>,
        asset_scale: u8,
    ) -> Result<Self> {
        let value = to_minor_units(human_amount, asset_scale)?;
        Ok(Self::new(asset_code, asset_scale, value))
    }

    /// The amount back in major units, for display only.
    pub fn to_decimal(&self) -> Decimal {
        let mut value = Decimal::from(self.value);
        // Scales above 28 are not representable; they never pass normalization anyway.
        if value.set_scale(u32::from(self.asset_scale)).is_err() {
            return Decimal::ZERO;
        }
        value
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.asset_code)
    }
}

/// Converts a decimal amount into minor units: `round(amount * 10^scale)`.
///
/// Midpoints round away from zero. Negative amounts and results that do not fit
/// in a `u64` are rejected.
pub fn to_minor_units(human_amount: Decimal, asset_scale: u8) -> Result<u64> {
    if human_amount.is_sign_negative() && !human_amount.is_zero() {
        return Err(NegotiationError::InvalidAmount(format!(
            "{human_amount} is negative"
        )));
    }
    if asset_scale > MAX_ASSET_SCALE {
        return Err(NegotiationError::InvalidAmount(format!(
            "asset scale {asset_scale} exceeds {MAX_ASSET_SCALE}"
        )));
    }

    let factor = Decimal::from(10u64.pow(u32::from(asset_scale)));
    human_amount
        .checked_mul(factor)
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|rounded| rounded.to_u64())
        .ok_or_else(|| {
            NegotiationError::InvalidAmount(format!(
                "{human_amount} at scale {asset_scale} overflows"
            ))
        })
}

/// Decides whether a sender and receiver may negotiate across assets.
///
/// Whatever the policy, the quote stays the only source of settlement amounts;
/// this check can only reject a negotiation earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetPolicy {
    /// Allow any pair of assets and let the quote convert.
    #[default]
    Passthrough,
    /// Require sender and receiver to hold the same asset code.
    SameAsset,
}

impl AssetPolicy {
    pub fn assert_compatible(&self, sender: &WalletEndpoint, receiver: &WalletEndpoint) -> Result<()> {
        match self {
            AssetPolicy::Passthrough => Ok(()),
            AssetPolicy::SameAsset if sender.asset_code == receiver.asset_code => Ok(()),
            AssetPolicy::SameAsset => Err(NegotiationError::IncompatibleAssets {
                sender: sender.asset_code.clone(),
                receiver: receiver.asset_code.clone(),
            }),
        }
    }
}

impl std::str::FromStr for AssetPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "passthrough" => Ok(Self::Passthrough),
            "same-asset" => Ok(Self::SameAsset),
            other => Err(format!("unknown asset policy: {other}")),
        }
    }
}
