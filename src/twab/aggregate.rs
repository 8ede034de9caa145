use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("cannot average over zero days")]
    NoDays,
    #[error("twab of {cumulative} over {day_count} days at price {price} overflows")]
    Overflow {
        cumulative: Decimal,
        day_count: u32,
        price: Decimal,
    },
}

/// `(cumulative / day_count) * price`, where `day_count` is the length of the whole requested
/// range, however many of its days came from the cache.
pub fn twab(cumulative: Decimal, day_count: u32, price: Decimal) -> Result<Decimal, AggregateError> {
    if day_count == 0 {
        return Err(AggregateError::NoDays);
    }

    cumulative
        .checked_div(Decimal::from(day_count))
        .and_then(|average| average.checked_mul(price))
        .map(|twab| twab.normalize())
        .ok_or(AggregateError::Overflow {
            cumulative,
            day_count,
            price,
        })
}
