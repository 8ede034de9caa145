use std::fmt::Display;

/// An amount of the native asset in its smallest unit. Balances are never negative, hence
/// unsigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct WeiNewtype(pub u128);

impl Display for WeiNewtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let WeiNewtype(amount) = self;
        write!(f, "{amount}")
    }
}
