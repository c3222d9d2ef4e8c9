//! Purchase (stock-in) documents

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{LineInput, PresentationSummary, ProductSummary};

/// Purchase document status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PurchaseStatus {
    #[default]
    Confirmada,
    Anulada,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Confirmada => "CONFIRMADA",
            PurchaseStatus::Anulada => "ANULADA",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CONFIRMADA" => Some(PurchaseStatus::Confirmada),
            "ANULADA" => Some(PurchaseStatus::Anulada),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStatus::Anulada)
    }
}

/// A purchase header with its lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseDocument {
    pub id: Uuid,
    pub id_proveedor: Option<Uuid>,
    pub id_usuario: Option<Uuid>,
    pub fecha_compra: Option<NaiveDate>,
    pub fecha_entrega: Option<NaiveDate>,
    pub descuento: Decimal,
    pub totalsindescuento: Decimal,
    pub totalcondescuento: Decimal,
    pub estado: PurchaseStatus,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_edicion: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub detalles: Vec<PurchaseLine>,
}

/// A purchase line, optionally with its resolved catalog references
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub id: Uuid,
    pub id_compra: Uuid,
    pub id_presentacion: Uuid,
    pub cantidad: i32,
    pub precio_compra: Decimal,
    pub subtotal: Decimal,
    pub posicion: i32,
    pub presentacion: Option<PresentationSummary>,
    pub producto: Option<ProductSummary>,
}

/// Input for creating a purchase
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseInput {
    pub id_proveedor: Option<Uuid>,
    /// Buyer; defaults to the authenticated user
    pub id_usuario: Option<Uuid>,
    pub fecha_compra: Option<NaiveDate>,
    pub fecha_entrega: Option<NaiveDate>,
    #[serde(default)]
    pub descuento: Option<Decimal>,
    #[serde(default)]
    pub detalles: Vec<LineInput>,
}

/// Input for updating purchase header fields. Lines change through the
/// line operations only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePurchaseInput {
    pub id_proveedor: Option<Uuid>,
    pub fecha_compra: Option<NaiveDate>,
    pub fecha_entrega: Option<NaiveDate>,
    pub descuento: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(PurchaseStatus::Confirmada.as_str(), "CONFIRMADA");
        assert_eq!(PurchaseStatus::from_str("ANULADA"), Some(PurchaseStatus::Anulada));
        assert_eq!(PurchaseStatus::from_str("CANCELADA"), None);
    }

    #[test]
    fn only_anulada_is_terminal() {
        assert!(PurchaseStatus::Anulada.is_terminal());
        assert!(!PurchaseStatus::Confirmada.is_terminal());
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&PurchaseStatus::Anulada).unwrap();
        assert_eq!(json, "\"ANULADA\"");
    }
}
