mod eth;
mod wei;

pub use eth::BaseUnits;
pub use eth::ConversionError;

pub use wei::WeiNewtype;

/// Decimals of the native asset on Ethereum-like chains, 1 ETH = 10^18 wei.
pub const WEI_DECIMALS: u32 = 18;
