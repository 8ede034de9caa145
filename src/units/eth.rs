use rust_decimal::Decimal;
use thiserror::Error;

use super::{WeiNewtype, WEI_DECIMALS};

// rust_decimal keeps at most 28 digits after the point.
const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("{0} decimals is more than a decimal can represent")]
    TooManyDecimals(u32),
    #[error("amount {0} does not fit in a decimal")]
    Overflow(WeiNewtype),
}

/// Converts base unit amounts into whole units of the asset, e.g. wei into ETH, without going
/// through floats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaseUnits {
    decimals: u32,
}

impl Default for BaseUnits {
    fn default() -> Self {
        Self {
            decimals: WEI_DECIMALS,
        }
    }
}

impl BaseUnits {
    pub fn new(decimals: u32) -> Result<Self, ConversionError> {
        if decimals > MAX_DECIMALS {
            return Err(ConversionError::TooManyDecimals(decimals));
        }
        Ok(Self { decimals })
    }

    pub fn to_whole_units(&self, amount: WeiNewtype) -> Result<Decimal, ConversionError> {
        let WeiNewtype(base_units) = amount;
        i128::try_from(base_units)
            .ok()
            .and_then(|base_units| Decimal::try_from_i128_with_scale(base_units, self.decimals).ok())
            .ok_or(ConversionError::Overflow(amount))
    }
}
