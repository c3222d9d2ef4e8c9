//! Sale service: stock-out documents

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    validate_line_update, validate_money_field, validate_sale_input, CreateSaleInput,
    PaginatedResponse, Pagination, SaleDocument, SaleLine, SaleStatus, UpdateLineInput,
    UpdateSaleInput,
};
use crate::services::catalog::persist_stock;
use crate::services::document::{self, MaterializedLineRow, SALE_TABLES};

/// Sale service for creating, cancelling and editing sales
#[derive(Clone)]
pub struct SaleService {
    db: PgPool,
}

/// Query filters for listing sales
#[derive(Debug, Default, Deserialize)]
pub struct SaleFilter {
    pub id_cliente: Option<Uuid>,
    pub id_usuario: Option<Uuid>,
    pub estado: Option<String>,
    /// Inclusive lower bound on the sale date
    pub desde: Option<NaiveDate>,
    /// Inclusive upper bound on the sale date
    pub hasta: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

const HEADER_COLUMNS: &str = "id, id_cliente, id_usuario, fecha, descuento, totalsindescuento, \
     totalcondescuento, estado, fecha_creacion, fecha_edicion, created_by, updated_by";

const LIST_FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR id_cliente = $1)
      AND ($2::uuid IS NULL OR id_usuario = $2)
      AND ($3::text IS NULL OR estado = $3)
      AND ($4::date IS NULL OR fecha::date >= $4)
      AND ($5::date IS NULL OR fecha::date <= $5)
"#;

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    id_cliente: Option<Uuid>,
    id_usuario: Option<Uuid>,
    fecha: DateTime<Utc>,
    descuento: Decimal,
    totalsindescuento: Decimal,
    totalcondescuento: Decimal,
    estado: String,
    fecha_creacion: DateTime<Utc>,
    fecha_edicion: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
}

impl SaleRow {
    fn into_document(self, lines: Vec<MaterializedLineRow>) -> AppResult<SaleDocument> {
        let estado = SaleStatus::from_str(&self.estado)
            .ok_or_else(|| AppError::Internal(format!("Unknown sale status '{}'", self.estado)))?;

        Ok(SaleDocument {
            estado,
            id: self.id,
            id_cliente: self.id_cliente,
            id_usuario: self.id_usuario,
            fecha: self.fecha,
            descuento: self.descuento,
            totalsindescuento: self.totalsindescuento,
            totalcondescuento: self.totalcondescuento,
            fecha_creacion: self.fecha_creacion,
            fecha_edicion: self.fecha_edicion,
            created_by: self.created_by,
            updated_by: self.updated_by,
            detalles: lines
                .into_iter()
                .map(|row| SaleLine {
                    presentacion: row.presentation(),
                    producto: row.product(),
                    id: row.id,
                    id_venta: row.document_id,
                    id_presentacion: row.id_presentacion,
                    cantidad: row.cantidad,
                    precio_unitario: row.precio,
                    subtotal: row.subtotal,
                    posicion: row.posicion,
                })
                .collect(),
        })
    }
}

async fn load_sales(conn: &mut PgConnection, rows: Vec<SaleRow>) -> AppResult<Vec<SaleDocument>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut lines = document::materialized_lines(conn, &SALE_TABLES, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let detalles = lines.remove(&row.id).unwrap_or_default();
            row.into_document(detalles)
        })
        .collect()
}

async fn load_sale(conn: &mut PgConnection, id: Uuid) -> AppResult<SaleDocument> {
    let row = sqlx::query_as::<_, SaleRow>(&format!(
        "SELECT {} FROM ventas WHERE id = $1",
        HEADER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(SALE_TABLES.entity, id))?;

    load_sales(conn, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found(SALE_TABLES.entity, id))
}

impl SaleService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a confirmed sale. Every line is checked against stock already
    /// reduced by the earlier lines; any shortfall aborts the whole sale.
    pub async fn create_sale(&self, actor: Uuid, input: CreateSaleInput) -> AppResult<SaleDocument> {
        validate_sale_input(&input)?;

        let mut tx = self.db.begin().await?;

        let prepared = document::prepare_lines(&mut tx, SALE_TABLES.kind, &input.detalles).await?;
        let totals = prepared.totals(input.descuento)?;

        let sale_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO ventas (
                id_cliente, id_usuario, fecha, descuento, totalsindescuento,
                totalcondescuento, estado, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(input.id_cliente)
        .bind(input.id_usuario.unwrap_or(actor))
        .bind(input.fecha.unwrap_or_else(Utc::now))
        .bind(totals.descuento)
        .bind(totals.totalsindescuento)
        .bind(totals.totalcondescuento)
        .bind(SaleStatus::Confirmada.as_str())
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        document::insert_lines(&mut tx, &SALE_TABLES, sale_id, &prepared.lines).await?;
        persist_stock(&mut tx, &prepared.ledger).await?;

        let sale = load_sale(&mut tx, sale_id).await?;
        tx.commit().await?;

        tracing::info!(
            sale_id = %sale.id,
            lines = sale.detalles.len(),
            total = %sale.totalcondescuento,
            "Sale created"
        );

        Ok(sale)
    }

    pub async fn get_sale(&self, id: Uuid) -> AppResult<SaleDocument> {
        let mut conn = self.db.acquire().await?;
        load_sale(&mut conn, id).await
    }

    pub async fn list_sales(&self, filter: SaleFilter) -> AppResult<PaginatedResponse<SaleDocument>> {
        let estado = filter
            .estado
            .as_deref()
            .map(|s| {
                SaleStatus::from_str(s)
                    .ok_or_else(|| AppError::validation("estado", "Unknown sale status"))
            })
            .transpose()?;
        if let (Some(desde), Some(hasta)) = (filter.desde, filter.hasta) {
            if hasta < desde {
                return Err(AppError::validation("hasta", "End date cannot precede start date"));
            }
        }
        let pagination = Pagination::from_query(filter.page, filter.per_page);

        let mut conn = self.db.acquire().await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM ventas {}",
            LIST_FILTER
        ))
        .bind(filter.id_cliente)
        .bind(filter.id_usuario)
        .bind(estado.map(|s| s.as_str()))
        .bind(filter.desde)
        .bind(filter.hasta)
        .fetch_one(&mut *conn)
        .await?;

        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {} FROM ventas {} ORDER BY fecha DESC, id LIMIT $6 OFFSET $7",
            HEADER_COLUMNS, LIST_FILTER
        ))
        .bind(filter.id_cliente)
        .bind(filter.id_usuario)
        .bind(estado.map(|s| s.as_str()))
        .bind(filter.desde)
        .bind(filter.hasta)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *conn)
        .await?;

        let sales = load_sales(&mut conn, rows).await?;
        Ok(PaginatedResponse::new(sales, pagination, total.max(0) as u64))
    }

    /// Update header fields. A discount change recomputes the totals.
    pub async fn update_sale(
        &self,
        id: Uuid,
        actor: Uuid,
        input: UpdateSaleInput,
    ) -> AppResult<SaleDocument> {
        validate_money_field("descuento", input.descuento)?;

        let mut tx = self.db.begin().await?;

        let status = document::lock_document(&mut tx, &SALE_TABLES, id)
            .await?
            .ok_or_else(|| AppError::not_found(SALE_TABLES.entity, id))?;
        if status == SALE_TABLES.terminal_status {
            return Err(AppError::InvalidStateTransition(format!(
                "Sale {} is {} and can no longer be edited",
                id, status
            )));
        }

        sqlx::query(
            r#"
            UPDATE ventas
            SET id_cliente = COALESCE($1, id_cliente),
                fecha = COALESCE($2, fecha),
                descuento = COALESCE($3, descuento),
                fecha_edicion = NOW(),
                updated_by = $4
            WHERE id = $5
            "#,
        )
        .bind(input.id_cliente)
        .bind(input.fecha)
        .bind(input.descuento)
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if input.descuento.is_some() {
            document::recompute_totals(&mut tx, &SALE_TABLES, id, actor).await?;
        }

        let sale = load_sale(&mut tx, id).await?;
        tx.commit().await?;
        Ok(sale)
    }

    /// Cancel a sale, returning its units to stock. Cancelling an already
    /// cancelled sale returns it unchanged.
    pub async fn cancel_sale(&self, id: Uuid, actor: Uuid) -> AppResult<SaleDocument> {
        let mut tx = self.db.begin().await?;

        document::void_document(&mut tx, &SALE_TABLES, id, actor)
            .await?
            .ok_or_else(|| AppError::not_found(SALE_TABLES.entity, id))?;

        let sale = load_sale(&mut tx, id).await?;
        tx.commit().await?;
        Ok(sale)
    }

    /// Delete a sale and its lines. Returns `false` when it did not exist.
    pub async fn delete_sale(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;
        let deleted = document::delete_document(&mut tx, &SALE_TABLES, id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn update_line(
        &self,
        line_id: Uuid,
        actor: Uuid,
        input: UpdateLineInput,
    ) -> AppResult<SaleLine> {
        validate_line_update(&input)?;

        let mut tx = self.db.begin().await?;
        let sale_id = document::update_line(&mut tx, &SALE_TABLES, line_id, &input, actor).await?;
        let line = load_sale(&mut tx, sale_id)
            .await?
            .detalles
            .into_iter()
            .find(|line| line.id == line_id)
            .ok_or_else(|| AppError::not_found(SALE_TABLES.line_entity, line_id))?;
        tx.commit().await?;
        Ok(line)
    }

    pub async fn delete_line(&self, line_id: Uuid, actor: Uuid) -> AppResult<SaleDocument> {
        let mut tx = self.db.begin().await?;
        let sale_id = document::delete_line(&mut tx, &SALE_TABLES, line_id, actor).await?;
        let sale = load_sale(&mut tx, sale_id).await?;
        tx.commit().await?;
        Ok(sale)
    }
}
