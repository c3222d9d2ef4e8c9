//! Stock-reconciliation engine
//!
//! Every stock movement is expressed in base units: a line of `cantidad`
//! presentation units moves `cantidad * cantidad_base` units of the owning
//! product. Purchases add, sales subtract (refusing to go below zero), and
//! voiding or deleting a document runs the inverse movement.
//!
//! The services lock the affected product rows, load them into a
//! [`StockLedger`], fold the document lines through it and write back only the
//! products whose stock changed. A failed fold never reaches the database.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Presentation, Product};

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockDirection {
    /// Stock-in (purchase)
    In,
    /// Stock-out (sale)
    Out,
}

impl StockDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockDirection::In => "in",
            StockDirection::Out => "out",
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            StockDirection::In => StockDirection::Out,
            StockDirection::Out => StockDirection::In,
        }
    }
}

/// Stock engine failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("Insufficient stock for {product}. Available: {available}, required: {required}")]
    InsufficientStock {
        product_id: Uuid,
        product: String,
        available: i64,
        required: i64,
    },

    #[error("Presentation {presentation_id} belongs to product {owner_id}, not {product_id}")]
    PresentationMismatch {
        presentation_id: Uuid,
        owner_id: Uuid,
        product_id: Uuid,
    },

    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(i32),

    #[error("Product {0} is not part of the locked stock snapshot")]
    ProductNotLoaded(Uuid),

    #[error("Stock of {product} would overflow")]
    Overflow { product_id: Uuid, product: String },
}

/// A stock error tied to the document line that caused it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {index}: {source}")]
pub struct LineStockError {
    pub index: usize,
    #[source]
    pub source: StockError,
}

fn required_units(
    product: &Product,
    presentation: &Presentation,
    quantity: i32,
) -> Result<i64, StockError> {
    if quantity <= 0 {
        return Err(StockError::NonPositiveQuantity(quantity));
    }
    if presentation.id_producto != product.id {
        return Err(StockError::PresentationMismatch {
            presentation_id: presentation.id,
            owner_id: presentation.id_producto,
            product_id: product.id,
        });
    }
    Ok(presentation.base_units(quantity))
}

fn add_units(product: &mut Product, units: i64) -> Result<i64, StockError> {
    product.stock_actual = product
        .stock_actual
        .checked_add(units)
        .ok_or_else(|| StockError::Overflow {
            product_id: product.id,
            product: product.nombre.clone(),
        })?;
    Ok(units)
}

fn remove_units(product: &mut Product, units: i64) -> Result<i64, StockError> {
    if product.stock_actual < units {
        return Err(StockError::InsufficientStock {
            product_id: product.id,
            product: product.nombre.clone(),
            available: product.stock_actual,
            required: units,
        });
    }
    product.stock_actual -= units;
    Ok(-units)
}

/// Add `quantity * cantidad_base` units to the product. No upper bound is
/// enforced; `stock_maximo` is advisory. Returns the signed delta.
pub fn apply_purchase_line(
    product: &mut Product,
    presentation: &Presentation,
    quantity: i32,
) -> Result<i64, StockError> {
    let units = required_units(product, presentation, quantity)?;
    add_units(product, units)
}

/// Remove `quantity * cantidad_base` units from the product, failing with
/// [`StockError::InsufficientStock`] when current stock does not cover them.
/// Returns the signed delta.
pub fn apply_sale_line(
    product: &mut Product,
    presentation: &Presentation,
    quantity: i32,
) -> Result<i64, StockError> {
    let units = required_units(product, presentation, quantity)?;
    remove_units(product, units)
}

/// Which catalog reference was unavailable during a reversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReference {
    Presentation,
    Product,
}

/// Result of undoing one line's stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReversalOutcome {
    Applied {
        presentation_id: Uuid,
        product_id: Uuid,
        delta: i64,
    },
    SkippedMissingReference {
        presentation_id: Uuid,
        missing: MissingReference,
    },
}

impl ReversalOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReversalOutcome::Applied { .. })
    }

    pub fn presentation_id(&self) -> Uuid {
        match self {
            ReversalOutcome::Applied {
                presentation_id, ..
            }
            | ReversalOutcome::SkippedMissingReference {
                presentation_id, ..
            } => *presentation_id,
        }
    }
}

/// Undo the movement a line of the given direction made.
///
/// A purchase line (`In`) is reversed by removing its units, which fails if
/// they have since been sold. A sale line (`Out`) is reversed by adding its
/// units back. A missing or logically deleted presentation or product is
/// reported as [`ReversalOutcome::SkippedMissingReference`] rather than failing.
pub fn reverse_line(
    product: Option<&mut Product>,
    presentation: Option<&Presentation>,
    presentation_id: Uuid,
    quantity: i32,
    direction: StockDirection,
) -> Result<ReversalOutcome, StockError> {
    let presentation = match presentation {
        Some(p) if p.is_active() => p,
        _ => {
            return Ok(ReversalOutcome::SkippedMissingReference {
                presentation_id,
                missing: MissingReference::Presentation,
            })
        }
    };
    let product = match product {
        Some(p) if p.is_active() => p,
        _ => {
            return Ok(ReversalOutcome::SkippedMissingReference {
                presentation_id,
                missing: MissingReference::Product,
            })
        }
    };

    let units = required_units(product, presentation, quantity)?;
    let delta = match direction {
        StockDirection::In => remove_units(product, units)?,
        StockDirection::Out => add_units(product, units)?,
    };

    Ok(ReversalOutcome::Applied {
        presentation_id: presentation.id,
        product_id: product.id,
        delta,
    })
}

/// One applied stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub presentation_id: Uuid,
    pub direction: StockDirection,
    pub base_units: i64,
    pub stock_after: i64,
}

/// In-transaction snapshot of locked products.
///
/// Lines are applied one after another, so a later line of the same document
/// sees stock already reduced by the earlier ones.
#[derive(Debug, Clone, Default)]
pub struct StockLedger {
    products: BTreeMap<Uuid, Product>,
    opening: BTreeMap<Uuid, i64>,
    movements: Vec<StockMovement>,
}

impl StockLedger {
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        let products: BTreeMap<Uuid, Product> =
            products.into_iter().map(|p| (p.id, p)).collect();
        let opening = products
            .iter()
            .map(|(id, p)| (*id, p.stock_actual))
            .collect();
        Self {
            products,
            opening,
            movements: Vec::new(),
        }
    }

    pub fn product(&self, id: Uuid) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn stock_of(&self, id: Uuid) -> Option<i64> {
        self.products.get(&id).map(|p| p.stock_actual)
    }

    pub fn movements(&self) -> &[StockMovement] {
        &self.movements
    }

    /// Net change in base units since the snapshot was taken
    pub fn net_change(&self, id: Uuid) -> i64 {
        match (self.products.get(&id), self.opening.get(&id)) {
            (Some(p), Some(open)) => p.stock_actual - open,
            _ => 0,
        }
    }

    /// Products whose stock differs from the snapshot, in id order
    pub fn changed_products(&self) -> impl Iterator<Item = &Product> {
        self.products
            .values()
            .filter(|p| self.opening.get(&p.id) != Some(&p.stock_actual))
    }

    /// Apply one line in the document's direction
    pub fn apply(
        &mut self,
        presentation: &Presentation,
        quantity: i32,
        direction: StockDirection,
    ) -> Result<StockMovement, StockError> {
        let product = self
            .products
            .get_mut(&presentation.id_producto)
            .ok_or(StockError::ProductNotLoaded(presentation.id_producto))?;

        let delta = match direction {
            StockDirection::In => apply_purchase_line(product, presentation, quantity)?,
            StockDirection::Out => apply_sale_line(product, presentation, quantity)?,
        };

        let movement = StockMovement {
            product_id: product.id,
            presentation_id: presentation.id,
            direction,
            base_units: delta.abs(),
            stock_after: product.stock_actual,
        };
        self.movements.push(movement);
        Ok(movement)
    }

    /// Apply every line in list order. On failure the ledger is restored to
    /// its state before the call and the failing line index is reported.
    pub fn apply_lines<'a, I>(
        &mut self,
        lines: I,
        direction: StockDirection,
    ) -> Result<Vec<StockMovement>, LineStockError>
    where
        I: IntoIterator<Item = (&'a Presentation, i32)>,
    {
        let checkpoint = self.checkpoint();
        let mut applied = Vec::new();

        for (index, (presentation, quantity)) in lines.into_iter().enumerate() {
            match self.apply(presentation, quantity, direction) {
                Ok(movement) => applied.push(movement),
                Err(source) => {
                    self.restore(checkpoint);
                    return Err(LineStockError { index, source });
                }
            }
        }

        Ok(applied)
    }

    /// Undo one line that was applied in `direction`
    pub fn reverse(
        &mut self,
        presentation: Option<&Presentation>,
        presentation_id: Uuid,
        quantity: i32,
        direction: StockDirection,
    ) -> Result<ReversalOutcome, StockError> {
        let product = presentation.and_then(|p| self.products.get_mut(&p.id_producto));
        let outcome = reverse_line(product, presentation, presentation_id, quantity, direction)?;

        if let ReversalOutcome::Applied {
            presentation_id,
            product_id,
            delta,
        } = outcome
        {
            let stock_after = self.stock_of(product_id).unwrap_or_default();
            self.movements.push(StockMovement {
                product_id,
                presentation_id,
                direction: direction.reversed(),
                base_units: delta.abs(),
                stock_after,
            });
        }

        Ok(outcome)
    }

    /// Reverse several lines, restoring the ledger if any reversal fails
    pub fn reverse_lines<'a, I>(
        &mut self,
        lines: I,
        direction: StockDirection,
    ) -> Result<Vec<ReversalOutcome>, LineStockError>
    where
        I: IntoIterator<Item = (Option<&'a Presentation>, Uuid, i32)>,
    {
        let checkpoint = self.checkpoint();
        let mut outcomes = Vec::new();

        for (index, (presentation, presentation_id, quantity)) in lines.into_iter().enumerate() {
            match self.reverse(presentation, presentation_id, quantity, direction) {
                Ok(outcome) => outcomes.push(outcome),
                Err(source) => {
                    self.restore(checkpoint);
                    return Err(LineStockError { index, source });
                }
            }
        }

        Ok(outcomes)
    }

    /// Swap the stock effect of an edited line: undo `old_quantity` of the old
    /// presentation and apply `new_quantity` of the new one.
    ///
    /// The stock-adding half runs first so a change within one product never
    /// dips below zero halfway: a purchase applies the new pair before
    /// reversing the old, a sale reverses the old pair before applying the new.
    /// On failure the ledger is restored.
    pub fn replace_line(
        &mut self,
        old_presentation: Option<&Presentation>,
        old_presentation_id: Uuid,
        old_quantity: i32,
        new_presentation: &Presentation,
        new_quantity: i32,
        direction: StockDirection,
    ) -> Result<ReversalOutcome, StockError> {
        let checkpoint = self.checkpoint();

        let result = match direction {
            StockDirection::In => self
                .apply(new_presentation, new_quantity, direction)
                .and_then(|_| {
                    self.reverse(old_presentation, old_presentation_id, old_quantity, direction)
                }),
            StockDirection::Out => self
                .reverse(old_presentation, old_presentation_id, old_quantity, direction)
                .and_then(|outcome| {
                    self.apply(new_presentation, new_quantity, direction)
                        .map(|_| outcome)
                }),
        };

        if result.is_err() {
            self.restore(checkpoint);
        }
        result
    }

    fn checkpoint(&self) -> (BTreeMap<Uuid, i64>, usize) {
        let stocks = self
            .products
            .iter()
            .map(|(id, p)| (*id, p.stock_actual))
            .collect();
        (stocks, self.movements.len())
    }

    fn restore(&mut self, (stocks, movements): (BTreeMap<Uuid, i64>, usize)) {
        for (id, stock) in stocks {
            if let Some(product) = self.products.get_mut(&id) {
                product.stock_actual = stock;
            }
        }
        self.movements.truncate(movements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn product(stock: i64) -> Product {
        Product {
            id: Uuid::new_v4(),
            codigo: "P-001".to_string(),
            nombre: "Cuaderno A4".to_string(),
            unidad_base: "unidad".to_string(),
            adicional: None,
            id_categoria: None,
            id_marca: None,
            id_tipo_producto: None,
            stock_actual: stock,
            stock_minimo: 0,
            stock_maximo: None,
            avatar: None,
            estado: RecordStatus::Active,
            fecha_creacion: Utc::now(),
            fecha_edicion: None,
        }
    }

    fn presentation(product: &Product, cantidad_base: i32) -> Presentation {
        Presentation {
            id: Uuid::new_v4(),
            id_producto: product.id,
            nombre: format!("x{}", cantidad_base),
            cantidad_base,
            precio_venta: Decimal::new(1000, 2),
            precio_compra: Decimal::new(700, 2),
            estado: RecordStatus::Active,
            fecha_creacion: Utc::now(),
        }
    }

    #[test]
    fn purchase_adds_base_units() {
        let mut p = product(0);
        let caja = presentation(&p, 12);
        assert_eq!(apply_purchase_line(&mut p, &caja, 5).unwrap(), 60);
        assert_eq!(p.stock_actual, 60);
    }

    #[test]
    fn purchase_ignores_stock_maximo() {
        let mut p = product(90);
        p.stock_maximo = Some(100);
        let caja = presentation(&p, 12);
        apply_purchase_line(&mut p, &caja, 1).unwrap();
        assert_eq!(p.stock_actual, 102);
    }

    #[test]
    fn sale_subtracts_base_units() {
        let mut p = product(60);
        let caja = presentation(&p, 12);
        assert_eq!(apply_sale_line(&mut p, &caja, 3).unwrap(), -36);
        assert_eq!(p.stock_actual, 24);
    }

    #[test]
    fn sale_may_consume_all_stock() {
        let mut p = product(12);
        let caja = presentation(&p, 12);
        apply_sale_line(&mut p, &caja, 1).unwrap();
        assert_eq!(p.stock_actual, 0);
    }

    #[test]
    fn sale_rejects_insufficient_stock_without_mutating() {
        let mut p = product(24);
        let pack = presentation(&p, 10);
        let err = apply_sale_line(&mut p, &pack, 3).unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientStock {
                product_id: p.id,
                product: "Cuaderno A4".to_string(),
                available: 24,
                required: 30,
            }
        );
        assert_eq!(p.stock_actual, 24);
    }

    #[test]
    fn foreign_presentation_is_rejected() {
        let mut p = product(10);
        let other = product(10);
        let foreign = presentation(&other, 1);
        assert!(matches!(
            apply_sale_line(&mut p, &foreign, 1),
            Err(StockError::PresentationMismatch { .. })
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let mut p = product(10);
        let unit = presentation(&p, 1);
        assert_eq!(
            apply_purchase_line(&mut p, &unit, 0),
            Err(StockError::NonPositiveQuantity(0))
        );
    }

    #[test]
    fn reversing_a_sale_restores_units() {
        let mut p = product(24);
        let caja = presentation(&p, 12);
        let outcome =
            reverse_line(Some(&mut p), Some(&caja), caja.id, 3, StockDirection::Out).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(p.stock_actual, 60);
    }

    #[test]
    fn reversing_a_purchase_removes_units() {
        let mut p = product(60);
        let caja = presentation(&p, 12);
        reverse_line(Some(&mut p), Some(&caja), caja.id, 5, StockDirection::In).unwrap();
        assert_eq!(p.stock_actual, 0);
    }

    #[test]
    fn reversing_a_sold_out_purchase_fails() {
        let mut p = product(10);
        let caja = presentation(&p, 12);
        let err =
            reverse_line(Some(&mut p), Some(&caja), caja.id, 1, StockDirection::In).unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { required: 12, .. }));
        assert_eq!(p.stock_actual, 10);
    }

    #[test]
    fn reversal_skips_missing_presentation() {
        let mut p = product(5);
        let id = Uuid::new_v4();
        let outcome = reverse_line(Some(&mut p), None, id, 2, StockDirection::Out).unwrap();
        assert_eq!(
            outcome,
            ReversalOutcome::SkippedMissingReference {
                presentation_id: id,
                missing: MissingReference::Presentation,
            }
        );
        assert_eq!(p.stock_actual, 5);
    }

    #[test]
    fn reversal_skips_inactive_product() {
        let mut p = product(5);
        p.estado = RecordStatus::Inactive;
        let unit = presentation(&p, 1);
        let outcome =
            reverse_line(Some(&mut p), Some(&unit), unit.id, 2, StockDirection::Out).unwrap();
        assert!(matches!(
            outcome,
            ReversalOutcome::SkippedMissingReference {
                missing: MissingReference::Product,
                ..
            }
        ));
        assert_eq!(p.stock_actual, 5);
    }

    #[test]
    fn ledger_applies_lines_sequentially() {
        let p = product(30);
        let unit = presentation(&p, 1);
        let pack = presentation(&p, 6);
        let mut ledger = StockLedger::new([p.clone()]);

        let moves = ledger
            .apply_lines([(&pack, 4), (&unit, 6)], StockDirection::Out)
            .unwrap();

        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].stock_after, 6);
        assert_eq!(moves[1].stock_after, 0);
        assert_eq!(ledger.net_change(p.id), -30);
    }

    #[test]
    fn ledger_restores_on_failed_line() {
        let p = product(30);
        let unit = presentation(&p, 1);
        let pack = presentation(&p, 6);
        let mut ledger = StockLedger::new([p.clone()]);

        // line 0 takes 24, line 1 then needs 12 with only 6 left
        let err = ledger
            .apply_lines([(&pack, 4), (&pack, 2), (&unit, 1)], StockDirection::Out)
            .unwrap_err();

        assert_eq!(err.index, 1);
        assert!(matches!(
            err.source,
            StockError::InsufficientStock {
                available: 6,
                required: 12,
                ..
            }
        ));
        assert_eq!(ledger.stock_of(p.id), Some(30));
        assert!(ledger.movements().is_empty());
        assert_eq!(ledger.changed_products().count(), 0);
    }

    #[test]
    fn ledger_reports_missing_product() {
        let p = product(30);
        let unit = presentation(&p, 1);
        let mut ledger = StockLedger::new(Vec::new());
        assert_eq!(
            ledger.apply(&unit, 1, StockDirection::In),
            Err(StockError::ProductNotLoaded(p.id))
        );
    }

    #[test]
    fn ledger_only_reports_changed_products() {
        let a = product(10);
        let b = product(10);
        let unit_a = presentation(&a, 1);
        let mut ledger = StockLedger::new([a.clone(), b]);
        ledger.apply(&unit_a, 2, StockDirection::In).unwrap();

        let changed: Vec<_> = ledger.changed_products().map(|p| p.id).collect();
        assert_eq!(changed, vec![a.id]);
    }

    #[test]
    fn ledger_reversal_with_skips() {
        let p = product(0);
        let unit = presentation(&p, 1);
        let mut ledger = StockLedger::new([p.clone()]);
        let gone = Uuid::new_v4();

        let outcomes = ledger
            .reverse_lines(
                [(Some(&unit), unit.id, 4), (None, gone, 9)],
                StockDirection::Out,
            )
            .unwrap();

        assert!(outcomes[0].is_applied());
        assert!(!outcomes[1].is_applied());
        assert_eq!(outcomes[1].presentation_id(), gone);
        assert_eq!(ledger.stock_of(p.id), Some(4));
    }

    #[test]
    fn direction_reversal() {
        assert_eq!(StockDirection::In.reversed(), StockDirection::Out);
        assert_eq!(StockDirection::Out.as_str(), "out");
    }
}
