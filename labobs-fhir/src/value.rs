//! Raw value interpretation and the unit rule shared with reference ranges.

use labobs_core::{ObservationValue, Quantity, QuantityValue, Susceptibility};

/// Above this magnitude values are rounded to whole numbers.
pub const ROUNDING_THRESHOLD: f64 = 9.0;

/// Unit metadata for one row.
///
/// The coded unit is the UCUM code when given, else the display unit.
/// The display unit is carried as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitRule<'a> {
    pub code: Option<&'a str>,
    pub display: Option<&'a str>,
}

impl<'a> UnitRule<'a> {
    pub fn resolve(ucum: Option<&'a str>, unit_display: Option<&'a str>) -> Self {
        let ucum = non_blank(ucum);
        let display = non_blank(unit_display);
        Self {
            code: ucum.or(display),
            display,
        }
    }

    pub fn quantity(&self, value: QuantityValue) -> Quantity {
        Quantity::new(value, self.code, self.display)
    }
}

/// Parse a finite number, ignoring surrounding whitespace.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

/// Decide how a raw cell is represented.
///
/// Numbers become quantities, `S`/`I`/`R` become susceptibility codes and any
/// other non-blank text is kept verbatim (trimmed). Blank input has no value.
pub fn interpret(raw: Option<&str>, units: &UnitRule<'_>) -> Option<ObservationValue> {
    let raw = raw.filter(|text| !text.is_empty())?;

    if let Some(number) = parse_number(raw) {
        let value = if number > ROUNDING_THRESHOLD {
            let rounded = number.round_ties_even();
            whole_number(rounded).map_or(QuantityValue::Decimal(rounded), QuantityValue::Integer)
        } else {
            QuantityValue::Decimal(number)
        };
        return Some(ObservationValue::Quantity(units.quantity(value)));
    }

    let text = raw.trim();
    if let Some(code) = Susceptibility::from_code(text) {
        return Some(ObservationValue::Susceptibility(code));
    }
    if text.is_empty() {
        return None;
    }
    Some(ObservationValue::Text(text.to_string()))
}

/// `rounded` as an `i64` when it is representable exactly.
fn whole_number(rounded: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    let in_range = rounded >= i64::MIN as f64 && rounded < i64::MAX as f64;
    in_range.then(|| rounded as i64)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
