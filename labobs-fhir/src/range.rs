use labobs_core::{redact, Quantity, QuantityValue, ReferenceRange};
use tracing::warn;

use crate::value::{parse_number, UnitRule};

/// Build the reference range of a row.
///
/// Bounds are parsed independently and never rounded; an unparsable bound is
/// dropped on its own. The range exists only if some bound survived, and then
/// carries `display_text` whichever bound that was.
pub fn reference_range(
    low: Option<&str>,
    high: Option<&str>,
    display_text: Option<&str>,
    units: &UnitRule<'_>,
) -> Option<ReferenceRange> {
    let low = bound("low", low, units);
    let high = bound("high", high, units);
    let text = display_text
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);
    ReferenceRange::from_bounds(low, high, text)
}

fn bound(label: &str, raw: Option<&str>, units: &UnitRule<'_>) -> Option<Quantity> {
    let raw = raw.map(str::trim).filter(|text| !text.is_empty())?;
    match parse_number(raw) {
        Some(number) => Some(units.quantity(QuantityValue::Decimal(number))),
        None => {
            warn!(bound = label, value = redact(raw), "invalid reference range bound");
            None
        }
    }
}
