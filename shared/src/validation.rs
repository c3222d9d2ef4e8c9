//! Validation utilities for documents and monetary fields

use rust_decimal::Decimal;
use thiserror::Error;
use validator::Validate;

use crate::models::{CreatePurchaseInput, CreateSaleInput, LineInput, UpdateLineInput};

/// Maximum number of decimal places accepted for money
pub const MONEY_SCALE: u32 = 2;

/// Exclusive upper bound of a `NUMERIC(12,2)` column
pub const MONEY_LIMIT: i64 = 10_000_000_000;

/// A rejected input field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefix the field with a parent path, e.g. `detalles[2].cantidad`
    pub fn within(self, parent: &str) -> Self {
        Self {
            field: format!("{}.{}", parent, self.field),
            message: self.message,
        }
    }
}

/// Pick a deterministic first error out of a `validator` result
pub fn first_validation_error(errors: &validator::ValidationErrors) -> ValidationError {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().copied().collect();
    fields.sort_unstable();

    fields
        .first()
        .and_then(|field| {
            field_errors.get(field).and_then(|errs| errs.first()).map(|err| {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                ValidationError::new(*field, message)
            })
        })
        .unwrap_or_else(|| ValidationError::new("input", "Invalid input"))
}

// ============================================================================
// Field Validations
// ============================================================================

/// Validate a line quantity (count of presentation units)
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a monetary amount: non-negative with at most two decimals
pub fn validate_money(amount: Decimal) -> Result<(), &'static str> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err("Amount cannot be negative");
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err("Amount must have at most two decimal places");
    }
    if amount >= Decimal::from(MONEY_LIMIT) {
        return Err("Amount must be below 10000000000");
    }
    Ok(())
}

/// Validate an optional monetary field, reporting it under `field`
pub fn validate_money_field(field: &str, amount: Option<Decimal>) -> Result<(), ValidationError> {
    match amount {
        Some(value) => validate_money(value).map_err(|msg| ValidationError::new(field, msg)),
        None => Ok(()),
    }
}

// ============================================================================
// Document Validations
// ============================================================================

/// Validate a single requested line
pub fn validate_line(line: &LineInput) -> Result<(), ValidationError> {
    line.validate()
        .map_err(|errors| first_validation_error(&errors))?;
    validate_quantity(line.cantidad).map_err(|msg| ValidationError::new("cantidad", msg))?;
    validate_money_field("precio_unitario", line.precio_unitario)?;
    validate_money_field("subtotal", line.subtotal)?;
    Ok(())
}

/// Validate every line, naming the offending index on failure
pub fn validate_lines(lines: &[LineInput]) -> Result<(), ValidationError> {
    for (index, line) in lines.iter().enumerate() {
        validate_line(line).map_err(|e| e.within(&format!("detalles[{}]", index)))?;
    }
    Ok(())
}

/// Validate a purchase creation request
pub fn validate_purchase_input(input: &CreatePurchaseInput) -> Result<(), ValidationError> {
    input
        .validate()
        .map_err(|errors| first_validation_error(&errors))?;
    validate_money_field("descuento", input.descuento)?;
    if let (Some(compra), Some(entrega)) = (input.fecha_compra, input.fecha_entrega) {
        if entrega < compra {
            return Err(ValidationError::new(
                "fecha_entrega",
                "Delivery date cannot precede the purchase date",
            ));
        }
    }
    validate_lines(&input.detalles)
}

/// Validate a sale creation request
pub fn validate_sale_input(input: &CreateSaleInput) -> Result<(), ValidationError> {
    input
        .validate()
        .map_err(|errors| first_validation_error(&errors))?;
    validate_money_field("descuento", input.descuento)?;
    validate_lines(&input.detalles)
}

/// Validate a line change request
pub fn validate_line_update(input: &UpdateLineInput) -> Result<(), ValidationError> {
    if input.is_empty() {
        return Err(ValidationError::new(
            "detalle",
            "Nothing to update: provide cantidad, id_presentacion or precio_unitario",
        ));
    }
    input
        .validate()
        .map_err(|errors| first_validation_error(&errors))?;
    if let Some(quantity) = input.cantidad {
        validate_quantity(quantity).map_err(|msg| ValidationError::new("cantidad", msg))?;
    }
    validate_money_field("precio_unitario", input.precio_unitario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(cantidad: i32) -> LineInput {
        LineInput {
            id_presentacion: Uuid::new_v4(),
            cantidad,
            precio_unitario: None,
            subtotal: None,
        }
    }

    #[test]
    fn money_accepts_two_decimals() {
        assert!(validate_money(dec("10.25")).is_ok());
        assert!(validate_money(dec("10.250")).is_ok());
        assert!(validate_money(Decimal::ZERO).is_ok());
    }

    #[test]
    fn money_rejects_negative_and_over_precise() {
        assert!(validate_money(dec("-1.00")).is_err());
        assert!(validate_money(dec("1.005")).is_err());
    }

    #[test]
    fn money_rejects_amounts_beyond_column_range() {
        assert!(validate_money(dec("9999999999.99")).is_ok());
        assert!(validate_money(dec("10000000000")).is_err());
        assert!(validate_money(dec("70000000000000000000000000000")).is_err());
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn line_errors_name_the_index() {
        let err = validate_lines(&[line(2), line(0)]).unwrap_err();
        assert_eq!(err.field, "detalles[1].cantidad");
    }

    #[test]
    fn sale_without_lines_is_rejected() {
        let input = CreateSaleInput {
            id_cliente: None,
            id_usuario: None,
            fecha: None,
            descuento: None,
            detalles: vec![],
        };
        let err = validate_sale_input(&input).unwrap_err();
        assert_eq!(err.field, "detalles");
    }

    #[test]
    fn purchase_without_lines_is_accepted() {
        let input = CreatePurchaseInput {
            id_proveedor: None,
            id_usuario: None,
            fecha_compra: None,
            fecha_entrega: None,
            descuento: Some(dec("0")),
            detalles: vec![],
        };
        assert!(validate_purchase_input(&input).is_ok());
    }

    #[test]
    fn negative_discount_is_rejected() {
        let input = CreatePurchaseInput {
            id_proveedor: None,
            id_usuario: None,
            fecha_compra: None,
            fecha_entrega: None,
            descuento: Some(dec("-5")),
            detalles: vec![line(1)],
        };
        let err = validate_purchase_input(&input).unwrap_err();
        assert_eq!(err.field, "descuento");
    }

    #[test]
    fn delivery_before_purchase_is_rejected() {
        let input = CreatePurchaseInput {
            id_proveedor: None,
            id_usuario: None,
            fecha_compra: chrono::NaiveDate::from_ymd_opt(2024, 5, 10),
            fecha_entrega: chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
            descuento: None,
            detalles: vec![line(1)],
        };
        let err = validate_purchase_input(&input).unwrap_err();
        assert_eq!(err.field, "fecha_entrega");
    }

    #[test]
    fn empty_line_update_is_rejected() {
        assert!(validate_line_update(&UpdateLineInput::default()).is_err());
    }
}
