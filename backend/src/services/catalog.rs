//! Catalog store: product and presentation lookups and product row locks

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Presentation, Product, ProductWithPresentations, RecordStatus, StockLedger};

const PRODUCT_COLUMNS: &str = "id, codigo, nombre, unidad_base, adicional, id_categoria, id_marca, \
     id_tipo_producto, stock_actual, stock_minimo, stock_maximo, avatar, estado, fecha_creacion, \
     fecha_edicion";

const PRESENTATION_COLUMNS: &str =
    "id, id_producto, nombre, cantidad_base, precio_venta, precio_compra, estado, fecha_creacion";

/// Row for product queries
#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    codigo: String,
    nombre: String,
    unidad_base: String,
    adicional: Option<String>,
    id_categoria: Option<Uuid>,
    id_marca: Option<Uuid>,
    id_tipo_producto: Option<Uuid>,
    stock_actual: i64,
    stock_minimo: i64,
    stock_maximo: Option<i64>,
    avatar: Option<String>,
    estado: String,
    fecha_creacion: DateTime<Utc>,
    fecha_edicion: Option<DateTime<Utc>>,
}

/// Row for presentation queries
#[derive(Debug, FromRow)]
struct PresentationRow {
    id: Uuid,
    id_producto: Uuid,
    nombre: String,
    cantidad_base: i32,
    precio_venta: Decimal,
    precio_compra: Decimal,
    estado: String,
    fecha_creacion: DateTime<Utc>,
}

fn record_status(code: &str) -> AppResult<RecordStatus> {
    RecordStatus::from_code(code)
        .ok_or_else(|| AppError::Internal(format!("Unknown record status '{}'", code)))
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> AppResult<Self> {
        Ok(Product {
            estado: record_status(&row.estado)?,
            id: row.id,
            codigo: row.codigo,
            nombre: row.nombre,
            unidad_base: row.unidad_base,
            adicional: row.adicional,
            id_categoria: row.id_categoria,
            id_marca: row.id_marca,
            id_tipo_producto: row.id_tipo_producto,
            stock_actual: row.stock_actual,
            stock_minimo: row.stock_minimo,
            stock_maximo: row.stock_maximo,
            avatar: row.avatar,
            fecha_creacion: row.fecha_creacion,
            fecha_edicion: row.fecha_edicion,
        })
    }
}

impl TryFrom<PresentationRow> for Presentation {
    type Error = AppError;

    fn try_from(row: PresentationRow) -> AppResult<Self> {
        Ok(Presentation {
            estado: record_status(&row.estado)?,
            id: row.id,
            id_producto: row.id_producto,
            nombre: row.nombre,
            cantidad_base: row.cantidad_base,
            precio_venta: row.precio_venta,
            precio_compra: row.precio_compra,
            fecha_creacion: row.fecha_creacion,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> AppResult<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

fn into_presentations(rows: Vec<PresentationRow>) -> AppResult<Vec<Presentation>> {
    rows.into_iter().map(Presentation::try_from).collect()
}

/// Load presentations by id, active or not. Ids that do not exist are
/// simply absent from the map.
pub async fn load_presentations(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Presentation>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, PresentationRow>(&format!(
        "SELECT {} FROM presentaciones WHERE id = ANY($1)",
        PRESENTATION_COLUMNS
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(into_presentations(rows)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect())
}

/// Lock the given products `FOR UPDATE` in ascending id order and load them
/// into a stock ledger. Missing products are absent from the ledger.
pub async fn lock_products(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<StockLedger> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    if ids.is_empty() {
        return Ok(StockLedger::default());
    }

    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {} FROM productos WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        PRODUCT_COLUMNS
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(StockLedger::new(into_products(rows)?))
}

/// Write back every product whose stock changed in the ledger
pub async fn persist_stock(conn: &mut PgConnection, ledger: &StockLedger) -> AppResult<()> {
    for product in ledger.changed_products() {
        tracing::debug!(
            product_id = %product.id,
            delta = ledger.net_change(product.id),
            stock = product.stock_actual,
            "Persisting stock"
        );

        sqlx::query("UPDATE productos SET stock_actual = $1, fecha_edicion = NOW() WHERE id = $2")
            .bind(product.stock_actual)
            .bind(product.id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Read-only catalog queries
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

impl CatalogService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM productos WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(Product::try_from)
        .transpose()
    }

    pub async fn find_presentation(&self, id: Uuid) -> AppResult<Option<Presentation>> {
        sqlx::query_as::<_, PresentationRow>(&format!(
            "SELECT {} FROM presentaciones WHERE id = $1",
            PRESENTATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(Presentation::try_from)
        .transpose()
    }

    /// Active presentations of a product, smallest first
    pub async fn presentations_of(&self, product_id: Uuid) -> AppResult<Vec<Presentation>> {
        let rows = sqlx::query_as::<_, PresentationRow>(&format!(
            "SELECT {} FROM presentaciones WHERE id_producto = $1 AND estado = $2 \
             ORDER BY cantidad_base, nombre",
            PRESENTATION_COLUMNS
        ))
        .bind(product_id)
        .bind(RecordStatus::Active.as_code())
        .fetch_all(&self.db)
        .await?;

        into_presentations(rows)
    }

    /// An active product with its active presentations
    pub async fn get_product(&self, id: Uuid) -> AppResult<ProductWithPresentations> {
        let product = self
            .find_product(id)
            .await?
            .filter(Product::is_active)
            .ok_or_else(|| AppError::not_found("Product", id))?;

        let presentaciones = self.presentations_of(id).await?;

        Ok(ProductWithPresentations {
            product,
            presentaciones,
        })
    }

    pub async fn get_presentation(&self, id: Uuid) -> AppResult<Presentation> {
        self.find_presentation(id)
            .await?
            .filter(Presentation::is_active)
            .ok_or_else(|| AppError::not_found("Presentation", id))
    }

    /// Active products at or below their advisory minimum
    pub async fn low_stock(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM productos WHERE estado = $1 AND stock_actual <= stock_minimo \
             ORDER BY stock_actual, nombre",
            PRODUCT_COLUMNS
        ))
        .bind(RecordStatus::Active.as_code())
        .fetch_all(&self.db)
        .await?;

        into_products(rows)
    }
}
