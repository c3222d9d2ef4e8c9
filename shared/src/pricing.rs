//! Line pricing and document totals
//!
//! Both are pure: the services resolve presentations inside a transaction and
//! hand them here, so the arithmetic can be tested without a database.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{DocumentKind, LineInput, Presentation};
use crate::validation::{validate_line, validate_money, ValidationError, MONEY_SCALE};

/// Resolved unit price and subtotal for one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePricing {
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Document-level totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub descuento: Decimal,
    pub totalsindescuento: Decimal,
    pub totalcondescuento: Decimal,
}

/// `quantity * unit_price`, rounded to cents. `None` on decimal overflow.
pub fn line_subtotal(quantity: i32, unit_price: Decimal) -> Option<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .map(|subtotal| subtotal.round_dp(MONEY_SCALE))
}

/// Line subtotal that also fits the stored money column
fn bounded_subtotal(quantity: i32, unit_price: Decimal) -> Result<Decimal, ValidationError> {
    line_subtotal(quantity, unit_price)
        .filter(|subtotal| validate_money(*subtotal).is_ok())
        .ok_or_else(|| ValidationError::new("subtotal", "Line subtotal is out of range"))
}

/// Resolve the unit price and subtotal of a requested line.
///
/// A missing unit price falls back to the presentation's buy price for
/// purchases and its sell price for sales. A missing subtotal is computed as
/// `cantidad * unit_price`; a supplied one is kept as given.
pub fn resolve_line_pricing(
    line: &LineInput,
    presentation: &Presentation,
    kind: DocumentKind,
) -> Result<LinePricing, ValidationError> {
    validate_line(line)?;

    let unit_price = line
        .precio_unitario
        .unwrap_or_else(|| presentation.default_price(kind));
    let subtotal = match line.subtotal {
        Some(subtotal) => subtotal,
        None => bounded_subtotal(line.cantidad, unit_price)?,
    };

    Ok(LinePricing {
        unit_price,
        subtotal,
    })
}

/// Reprice an existing line after its quantity, presentation or price changed.
///
/// An explicit new price wins. Otherwise a presentation change takes the new
/// presentation's default price and an unchanged presentation keeps the
/// line's current price. The subtotal is always recomputed.
pub fn reprice_line(
    quantity: i32,
    current_price: Decimal,
    new_price: Option<Decimal>,
    presentation_changed: bool,
    presentation: &Presentation,
    kind: DocumentKind,
) -> Result<LinePricing, ValidationError> {
    let unit_price = match (new_price, presentation_changed) {
        (Some(price), _) => price,
        (None, true) => presentation.default_price(kind),
        (None, false) => current_price,
    };
    Ok(LinePricing {
        unit_price,
        subtotal: bounded_subtotal(quantity, unit_price)?,
    })
}

/// Sum line subtotals and apply the discount (zero when absent).
///
/// Fails when the sum no longer fits the stored money column.
pub fn compute_totals<I>(
    subtotals: I,
    descuento: Option<Decimal>,
) -> Result<DocumentTotals, ValidationError>
where
    I: IntoIterator<Item = Decimal>,
{
    let out_of_range =
        || ValidationError::new("totalsindescuento", "Document total is out of range");

    let descuento = descuento.unwrap_or(Decimal::ZERO);
    let totalsindescuento = subtotals
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, subtotal| acc.checked_add(subtotal))
        .filter(|total| validate_money(*total).is_ok())
        .ok_or_else(out_of_range)?;
    let totalcondescuento = totalsindescuento
        .checked_sub(descuento)
        .ok_or_else(out_of_range)?;

    Ok(DocumentTotals {
        descuento,
        totalsindescuento,
        totalcondescuento,
    })
}
