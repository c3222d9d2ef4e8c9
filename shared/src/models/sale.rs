//! Sale (stock-out) documents

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{LineInput, PresentationSummary, ProductSummary};

/// Sale document status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SaleStatus {
    #[default]
    Confirmada,
    Cancelada,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Confirmada => "CONFIRMADA",
            SaleStatus::Cancelada => "CANCELADA",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CONFIRMADA" => Some(SaleStatus::Confirmada),
            "CANCELADA" => Some(SaleStatus::Cancelada),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Cancelada)
    }
}

/// A sale header with its lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleDocument {
    pub id: Uuid,
    pub id_cliente: Option<Uuid>,
    pub id_usuario: Option<Uuid>,
    pub fecha: DateTime<Utc>,
    pub descuento: Decimal,
    pub totalsindescuento: Decimal,
    pub totalcondescuento: Decimal,
    pub estado: SaleStatus,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_edicion: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub detalles: Vec<SaleLine>,
}

/// A sale line, optionally with its resolved catalog references
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub id: Uuid,
    pub id_venta: Uuid,
    pub id_presentacion: Uuid,
    pub cantidad: i32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
    pub posicion: i32,
    pub presentacion: Option<PresentationSummary>,
    pub producto: Option<ProductSummary>,
}

/// Input for creating a sale
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSaleInput {
    pub id_cliente: Option<Uuid>,
    /// Seller; defaults to the authenticated user
    pub id_usuario: Option<Uuid>,
    /// Sale date; defaults to now
    pub fecha: Option<DateTime<Utc>>,
    #[serde(default)]
    pub descuento: Option<Decimal>,
    #[serde(default)]
    #[validate(length(min = 1, message = "A sale must have at least one line"))]
    pub detalles: Vec<LineInput>,
}

/// Input for updating sale header fields. Status changes go through cancel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSaleInput {
    pub id_cliente: Option<Uuid>,
    pub fecha: Option<DateTime<Utc>>,
    pub descuento: Option<Decimal>,
}
