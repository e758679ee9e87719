use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::domain::VendorRates;

/// Unit and total price for one vendor and one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// Price a job against a vendor's rate table.
///
/// Returns `None` when the vendor has no rate for the requested category. The
/// total is the raw rate times pages times copies, rounded once after the full
/// product is taken. The reported unit price is the rate rounded to cents.
pub fn quote(
    rates: &VendorRates,
    color: bool,
    duplex: bool,
    page_count: u32,
    copies: u32,
) -> Option<PriceQuote> {
    let rate = rates.rate_for(color, duplex)?;
    let total = rate * Decimal::from(page_count) * Decimal::from(copies);

    Some(PriceQuote {
        unit_price: round_currency(rate),
        total_price: round_currency(total),
    })
}

/// Round to cents, half away from zero.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
