//! Catalog models: products and their presentations

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DocumentKind;

/// Logical-delete flag shared by catalog rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecordStatus {
    #[default]
    #[serde(rename = "A")]
    Active,
    #[serde(rename = "I")]
    Inactive,
}

impl RecordStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            RecordStatus::Active => "A",
            RecordStatus::Inactive => "I",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(RecordStatus::Active),
            "I" => Some(RecordStatus::Inactive),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RecordStatus::Active)
    }
}

/// A stock-tracked product. `stock_actual` is expressed in base units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub codigo: String,
    pub nombre: String,
    pub unidad_base: String,
    pub adicional: Option<String>,
    pub id_categoria: Option<Uuid>,
    pub id_marca: Option<Uuid>,
    pub id_tipo_producto: Option<Uuid>,
    pub stock_actual: i64,
    /// Advisory lower bound, never enforced
    pub stock_minimo: i64,
    /// Advisory upper bound, never enforced
    pub stock_maximo: Option<i64>,
    pub avatar: Option<String>,
    pub estado: RecordStatus,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_edicion: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.estado.is_active()
    }
}

/// A packaging variant of a product, e.g. "Unidad" or "Caja x12"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Presentation {
    pub id: Uuid,
    pub id_producto: Uuid,
    pub nombre: String,
    /// Base units contained in one unit of this presentation (>= 1)
    pub cantidad_base: i32,
    pub precio_venta: Decimal,
    pub precio_compra: Decimal,
    pub estado: RecordStatus,
    pub fecha_creacion: DateTime<Utc>,
}

impl Presentation {
    pub fn is_active(&self) -> bool {
        self.estado.is_active()
    }

    /// Base units represented by `quantity` units of this presentation
    pub fn base_units(&self, quantity: i32) -> i64 {
        i64::from(quantity) * i64::from(self.cantidad_base)
    }

    /// Default unit price for a line of the given document kind
    pub fn default_price(&self, kind: DocumentKind) -> Decimal {
        match kind {
            DocumentKind::Purchase => self.precio_compra,
            DocumentKind::Sale => self.precio_venta,
        }
    }
}

/// Product reference attached to materialized document lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSummary {
    pub id: Uuid,
    pub codigo: String,
    pub nombre: String,
}

/// Presentation reference attached to materialized document lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresentationSummary {
    pub id: Uuid,
    pub nombre: String,
    pub cantidad_base: i32,
    pub precio_venta: Decimal,
    pub precio_compra: Decimal,
}

/// Product with its active presentations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductWithPresentations {
    #[serde(flatten)]
    pub product: Product,
    pub presentaciones: Vec<Presentation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn presentation(cantidad_base: i32) -> Presentation {
        Presentation {
            id: Uuid::new_v4(),
            id_producto: Uuid::new_v4(),
            nombre: format!("Caja x{}", cantidad_base),
            cantidad_base,
            precio_venta: dec("15.00"),
            precio_compra: dec("11.50"),
            estado: RecordStatus::Active,
            fecha_creacion: Utc::now(),
        }
    }

    #[test]
    fn record_status_codes_round_trip() {
        assert_eq!(RecordStatus::from_code("A"), Some(RecordStatus::Active));
        assert_eq!(RecordStatus::from_code("I"), Some(RecordStatus::Inactive));
        assert_eq!(RecordStatus::from_code("X"), None);
        assert_eq!(RecordStatus::Inactive.as_code(), "I");
    }

    #[test]
    fn record_status_serializes_as_code() {
        let json = serde_json::to_string(&RecordStatus::Inactive).unwrap();
        assert_eq!(json, "\"I\"");
    }

    #[test]
    fn base_units_multiplies_by_conversion_factor() {
        assert_eq!(presentation(12).base_units(5), 60);
        assert_eq!(presentation(1).base_units(7), 7);
    }

    #[test]
    fn base_units_does_not_overflow_i32() {
        assert_eq!(
            presentation(i32::MAX).base_units(2),
            2 * i64::from(i32::MAX)
        );
    }

    #[test]
    fn default_price_depends_on_document_kind() {
        let p = presentation(6);
        assert_eq!(p.default_price(DocumentKind::Purchase), dec("11.50"));
        assert_eq!(p.default_price(DocumentKind::Sale), dec("15.00"));
    }
}
