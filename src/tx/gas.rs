//! Gas prices, fees and gas estimation

use super::proto::{Coin, Fee};
use crate::error::{SubmitError, SubmitResult};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

lazy_static! {
    static ref GAS_PRICE_PATTERN: Regex =
        Regex::new(r"^([0-9]+(?:\.[0-9]+)?)([a-zA-Z][a-zA-Z0-9/:._-]{1,127})$").unwrap();
}

/// Most decimals a gas price may carry
const MAX_PRICE_DECIMALS: u32 = 18;

/// Gas limit of a request built only to be simulated. The node meters a
/// simulation without enforcing the limit.
pub const SIMULATION_GAS_LIMIT: u64 = 10_000_000;

/// Price per unit of gas, e.g. `0.1uscrt`.
///
/// Kept as an exact decimal (`mantissa / 10^scale`) so fee computation never
/// goes through floating point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPrice {
    mantissa: u128,
    scale: u32,
    denom: String,
}

impl GasPrice {
    pub fn denom(&self) -> &str {
        &self.denom
    }

    /// Fee for `gas_limit` units: `ceil(price * gas_limit)`
    pub fn fee_amount(&self, gas_limit: u64) -> SubmitResult<Coin> {
        let overflow = || SubmitError::InvalidFee(format!("{} x {} overflows", self, gas_limit));

        let product = self
            .mantissa
            .checked_mul(gas_limit as u128)
            .ok_or_else(overflow)?;
        let divisor = 10u128.pow(self.scale);
        let amount = product / divisor + u128::from(product % divisor != 0);

        Ok(Coin::new(amount, self.denom.clone()))
    }
}

impl FromStr for GasPrice {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| SubmitError::InvalidFee(format!("{:?}: {}", s, message));

        let caps = GAS_PRICE_PATTERN
            .captures(s.trim())
            .ok_or_else(|| invalid("expected <decimal><denom>"))?;

        let number = &caps[1];
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let scale = fraction.len() as u32;
        if scale > MAX_PRICE_DECIMALS {
            return Err(invalid("too many decimal places"));
        }

        let digits = format!("{}{}", whole, fraction);
        let mantissa: u128 = digits.parse().map_err(|_| invalid("price out of range"))?;

        Ok(Self {
            mantissa,
            scale,
            denom: caps[2].to_string(),
        })
    }
}

impl fmt::Display for GasPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = format!("{:0>width$}", self.mantissa, width = self.scale as usize + 1);
        let (whole, fraction) = digits.split_at(digits.len() - self.scale as usize);
        if fraction.is_empty() {
            write!(f, "{}{}", whole, self.denom)
        } else {
            write!(f, "{}.{}{}", whole, fraction, self.denom)
        }
    }
}

impl<'de> Deserialize<'de> for GasPrice {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How the fee of a transaction is determined.
///
/// There is no implicit default: either the amount is given, or a gas price
/// and limit from which it is computed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeSpec {
    Explicit {
        amount: Vec<Coin>,
        gas_limit: u64,
        #[serde(default)]
        payer: Option<String>,
        #[serde(default)]
        granter: Option<String>,
    },
    FromGasPrice {
        gas_price: GasPrice,
        gas_limit: u64,
        #[serde(default)]
        payer: Option<String>,
        #[serde(default)]
        granter: Option<String>,
    },
}

impl FeeSpec {
    pub fn from_gas_price(gas_price: GasPrice, gas_limit: u64) -> Self {
        FeeSpec::FromGasPrice {
            gas_price,
            gas_limit,
            payer: None,
            granter: None,
        }
    }

    /// Zero-amount fee for a request whose fee is to be estimated
    pub fn for_simulation() -> Self {
        FeeSpec::Explicit {
            amount: Vec::new(),
            gas_limit: SIMULATION_GAS_LIMIT,
            payer: None,
            granter: None,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            FeeSpec::Explicit { gas_limit, .. } | FeeSpec::FromGasPrice { gas_limit, .. } => {
                *gas_limit
            }
        }
    }

    /// Wire `Fee` for the AuthInfo
    pub fn to_fee(&self) -> SubmitResult<Fee> {
        if self.gas_limit() == 0 {
            return Err(SubmitError::InvalidFee("gas limit must be positive".to_string()));
        }

        let (amount, payer, granter) = match self {
            FeeSpec::Explicit {
                amount,
                payer,
                granter,
                ..
            } => {
                if amount.iter().any(|coin| coin.amount.parse::<u128>().is_err()) {
                    return Err(SubmitError::InvalidFee(
                        "fee amounts must be unsigned integers".to_string(),
                    ));
                }
                (amount.clone(), payer, granter)
            }
            FeeSpec::FromGasPrice {
                gas_price,
                gas_limit,
                payer,
                granter,
            } => (vec![gas_price.fee_amount(*gas_limit)?], payer, granter),
        };

        Ok(Fee {
            amount,
            gas_limit: self.gas_limit(),
            payer: payer.clone().unwrap_or_default(),
            granter: granter.clone().unwrap_or_default(),
        })
    }
}

/// Gas estimator turning simulated usage into a gas limit
pub struct GasEstimator {
    /// Buffer percentage over simulated usage (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
        }
    }

    /// Gas limit covering `gas_used` plus the buffer, rounded up
    pub fn adjusted_limit(&self, gas_used: u64) -> u64 {
        let buffer = (gas_used as u128 * self.gas_limit_buffer_percent as u128).div_ceil(100);
        let limit = (gas_used as u128 + buffer).min(u64::MAX as u128) as u64;
        debug!("Gas used {} -> limit {}", gas_used, limit);
        limit
    }

    /// Fee spec for a simulated transaction
    pub fn fee_for(&self, gas_used: u64, gas_price: GasPrice) -> FeeSpec {
        FeeSpec::from_gas_price(gas_price, self.adjusted_limit(gas_used))
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(20)
    }
}
