//! Pieces common to purchase and sale documents

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::stock::StockDirection;

/// The two document kinds that move stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Purchase,
    Sale,
}

impl DocumentKind {
    /// Direction in which a confirmed document of this kind moves stock
    pub fn direction(&self) -> StockDirection {
        match self {
            DocumentKind::Purchase => StockDirection::In,
            DocumentKind::Sale => StockDirection::Out,
        }
    }

    /// Field name used for the unit price on lines of this kind
    pub fn price_field(&self) -> &'static str {
        match self {
            DocumentKind::Purchase => "precio_compra",
            DocumentKind::Sale => "precio_unitario",
        }
    }
}

/// One requested line of a purchase or sale
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineInput {
    pub id_presentacion: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub cantidad: i32,
    /// Unit price; defaults to the presentation's buy or sell price
    #[serde(default, alias = "precio_compra")]
    pub precio_unitario: Option<Decimal>,
    /// Line subtotal; defaults to `cantidad * precio_unitario`
    #[serde(default)]
    pub subtotal: Option<Decimal>,
}

/// Change request for an existing document line
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateLineInput {
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub cantidad: Option<i32>,
    pub id_presentacion: Option<Uuid>,
    #[serde(default, alias = "precio_compra")]
    pub precio_unitario: Option<Decimal>,
}

impl UpdateLineInput {
    pub fn is_empty(&self) -> bool {
        self.cantidad.is_none() && self.id_presentacion.is_none() && self.precio_unitario.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_lines_accept_precio_compra_alias() {
        let json = format!(
            r#"{{"id_presentacion":"{}","cantidad":2,"precio_compra":"4.50"}}"#,
            Uuid::nil()
        );
        let line: LineInput = serde_json::from_str(&json).unwrap();
        assert_eq!(line.precio_unitario, Some(Decimal::new(450, 2)));
        assert!(line.subtotal.is_none());
    }

    #[test]
    fn zero_quantity_fails_validation() {
        let line = LineInput {
            id_presentacion: Uuid::nil(),
            cantidad: 0,
            precio_unitario: None,
            subtotal: None,
        };
        assert!(line.validate().is_err());
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(UpdateLineInput::default().is_empty());
        let update = UpdateLineInput {
            cantidad: Some(3),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn direction_follows_kind() {
        assert_eq!(DocumentKind::Purchase.direction(), StockDirection::In);
        assert_eq!(DocumentKind::Sale.direction(), StockDirection::Out);
    }
}
