//! Purchase service: stock-in documents

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    validate_line_update, validate_money_field, validate_purchase_input, CreatePurchaseInput,
    PaginatedResponse, Pagination, PurchaseDocument, PurchaseLine, PurchaseStatus,
    UpdateLineInput, UpdatePurchaseInput,
};
use crate::services::catalog::persist_stock;
use crate::services::document::{self, MaterializedLineRow, PURCHASE_TABLES};

/// Purchase service for creating, voiding and editing purchases
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

/// Query filters for listing purchases
#[derive(Debug, Default, Deserialize)]
pub struct PurchaseFilter {
    pub id_proveedor: Option<Uuid>,
    pub id_usuario: Option<Uuid>,
    pub estado: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

const HEADER_COLUMNS: &str = "id, id_proveedor, id_usuario, fecha_compra, fecha_entrega, \
     descuento, totalsindescuento, totalcondescuento, estado, fecha_creacion, fecha_edicion, \
     created_by, updated_by";

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: Uuid,
    id_proveedor: Option<Uuid>,
    id_usuario: Option<Uuid>,
    fecha_compra: Option<NaiveDate>,
    fecha_entrega: Option<NaiveDate>,
    descuento: Decimal,
    totalsindescuento: Decimal,
    totalcondescuento: Decimal,
    estado: String,
    fecha_creacion: DateTime<Utc>,
    fecha_edicion: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
}

impl PurchaseRow {
    fn status(&self) -> AppResult<PurchaseStatus> {
        PurchaseStatus::from_str(&self.estado)
            .ok_or_else(|| AppError::Internal(format!("Unknown purchase status '{}'", self.estado)))
    }

    fn into_document(self, lines: Vec<MaterializedLineRow>) -> AppResult<PurchaseDocument> {
        Ok(PurchaseDocument {
            estado: self.status()?,
            id: self.id,
            id_proveedor: self.id_proveedor,
            id_usuario: self.id_usuario,
            fecha_compra: self.fecha_compra,
            fecha_entrega: self.fecha_entrega,
            descuento: self.descuento,
            totalsindescuento: self.totalsindescuento,
            totalcondescuento: self.totalcondescuento,
            fecha_creacion: self.fecha_creacion,
            fecha_edicion: self.fecha_edicion,
            created_by: self.created_by,
            updated_by: self.updated_by,
            detalles: lines.into_iter().map(purchase_line).collect(),
        })
    }
}

fn purchase_line(row: MaterializedLineRow) -> PurchaseLine {
    PurchaseLine {
        presentacion: row.presentation(),
        producto: row.product(),
        id: row.id,
        id_compra: row.document_id,
        id_presentacion: row.id_presentacion,
        cantidad: row.cantidad,
        precio_compra: row.precio,
        subtotal: row.subtotal,
        posicion: row.posicion,
    }
}

async fn load_purchases(
    conn: &mut PgConnection,
    rows: Vec<PurchaseRow>,
) -> AppResult<Vec<PurchaseDocument>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut lines = document::materialized_lines(conn, &PURCHASE_TABLES, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let detalles = lines.remove(&row.id).unwrap_or_default();
            row.into_document(detalles)
        })
        .collect()
}

async fn load_purchase(conn: &mut PgConnection, id: Uuid) -> AppResult<PurchaseDocument> {
    let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        "SELECT {} FROM compras WHERE id = $1",
        HEADER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(PURCHASE_TABLES.entity, id))?;

    load_purchases(conn, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found(PURCHASE_TABLES.entity, id))
}

impl PurchaseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a confirmed purchase and add its units to stock
    pub async fn create_purchase(
        &self,
        actor: Uuid,
        input: CreatePurchaseInput,
    ) -> AppResult<PurchaseDocument> {
        validate_purchase_input(&input)?;

        let mut tx = self.db.begin().await?;

        let prepared =
            document::prepare_lines(&mut tx, PURCHASE_TABLES.kind, &input.detalles).await?;
        let totals = prepared.totals(input.descuento)?;

        let purchase_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO compras (
                id_proveedor, id_usuario, fecha_compra, fecha_entrega, descuento,
                totalsindescuento, totalcondescuento, estado, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(input.id_proveedor)
        .bind(input.id_usuario.unwrap_or(actor))
        .bind(input.fecha_compra.unwrap_or_else(|| Utc::now().date_naive()))
        .bind(input.fecha_entrega)
        .bind(totals.descuento)
        .bind(totals.totalsindescuento)
        .bind(totals.totalcondescuento)
        .bind(PurchaseStatus::Confirmada.as_str())
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        document::insert_lines(&mut tx, &PURCHASE_TABLES, purchase_id, &prepared.lines).await?;
        persist_stock(&mut tx, &prepared.ledger).await?;

        let purchase = load_purchase(&mut tx, purchase_id).await?;
        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            lines = purchase.detalles.len(),
            total = %purchase.totalcondescuento,
            "Purchase created"
        );

        Ok(purchase)
    }

    pub async fn get_purchase(&self, id: Uuid) -> AppResult<PurchaseDocument> {
        let mut conn = self.db.acquire().await?;
        load_purchase(&mut conn, id).await
    }

    pub async fn list_purchases(
        &self,
        filter: PurchaseFilter,
    ) -> AppResult<PaginatedResponse<PurchaseDocument>> {
        let estado = filter
            .estado
            .as_deref()
            .map(|s| {
                PurchaseStatus::from_str(s)
                    .ok_or_else(|| AppError::validation("estado", "Unknown purchase status"))
            })
            .transpose()?;
        let pagination = Pagination::from_query(filter.page, filter.per_page);

        let mut conn = self.db.acquire().await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM compras
            WHERE ($1::uuid IS NULL OR id_proveedor = $1)
              AND ($2::uuid IS NULL OR id_usuario = $2)
              AND ($3::text IS NULL OR estado = $3)
            "#,
        )
        .bind(filter.id_proveedor)
        .bind(filter.id_usuario)
        .bind(estado.map(|s| s.as_str()))
        .fetch_one(&mut *conn)
        .await?;

        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            r#"
            SELECT {} FROM compras
            WHERE ($1::uuid IS NULL OR id_proveedor = $1)
              AND ($2::uuid IS NULL OR id_usuario = $2)
              AND ($3::text IS NULL OR estado = $3)
            ORDER BY fecha_creacion DESC, id
            LIMIT $4 OFFSET $5
            "#,
            HEADER_COLUMNS
        ))
        .bind(filter.id_proveedor)
        .bind(filter.id_usuario)
        .bind(estado.map(|s| s.as_str()))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *conn)
        .await?;

        let purchases = load_purchases(&mut conn, rows).await?;
        Ok(PaginatedResponse::new(purchases, pagination, total.max(0) as u64))
    }

    /// Update header fields. A discount change recomputes the totals.
    pub async fn update_purchase(
        &self,
        id: Uuid,
        actor: Uuid,
        input: UpdatePurchaseInput,
    ) -> AppResult<PurchaseDocument> {
        validate_money_field("descuento", input.descuento)?;

        let mut tx = self.db.begin().await?;

        let status = document::lock_document(&mut tx, &PURCHASE_TABLES, id)
            .await?
            .ok_or_else(|| AppError::not_found(PURCHASE_TABLES.entity, id))?;
        if status == PURCHASE_TABLES.terminal_status {
            return Err(AppError::InvalidStateTransition(format!(
                "Purchase {} is {} and can no longer be edited",
                id, status
            )));
        }

        let current = load_purchase(&mut tx, id).await?;
        let fecha_compra = input.fecha_compra.or(current.fecha_compra);
        let fecha_entrega = input.fecha_entrega.or(current.fecha_entrega);
        if let (Some(compra), Some(entrega)) = (fecha_compra, fecha_entrega) {
            if entrega < compra {
                return Err(AppError::validation(
                    "fecha_entrega",
                    "Delivery date cannot precede the purchase date",
                ));
            }
        }

        sqlx::query(
            r#"
            UPDATE compras
            SET id_proveedor = COALESCE($1, id_proveedor),
                fecha_compra = $2,
                fecha_entrega = $3,
                descuento = COALESCE($4, descuento),
                fecha_edicion = NOW(),
                updated_by = $5
            WHERE id = $6
            "#,
        )
        .bind(input.id_proveedor)
        .bind(fecha_compra)
        .bind(fecha_entrega)
        .bind(input.descuento)
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if input.descuento.is_some() {
            document::recompute_totals(&mut tx, &PURCHASE_TABLES, id, actor).await?;
        }

        let purchase = load_purchase(&mut tx, id).await?;
        tx.commit().await?;
        Ok(purchase)
    }

    /// Void a purchase, removing its units from stock. Voiding an already
    /// voided purchase returns it unchanged.
    pub async fn void_purchase(&self, id: Uuid, actor: Uuid) -> AppResult<PurchaseDocument> {
        let mut tx = self.db.begin().await?;

        document::void_document(&mut tx, &PURCHASE_TABLES, id, actor)
            .await?
            .ok_or_else(|| AppError::not_found(PURCHASE_TABLES.entity, id))?;

        let purchase = load_purchase(&mut tx, id).await?;
        tx.commit().await?;
        Ok(purchase)
    }

    /// Delete a purchase and its lines. Returns `false` when it did not exist.
    pub async fn delete_purchase(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;
        let deleted = document::delete_document(&mut tx, &PURCHASE_TABLES, id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    /// Change one purchase line and return it as stored afterwards
    pub async fn update_line(
        &self,
        line_id: Uuid,
        actor: Uuid,
        input: UpdateLineInput,
    ) -> AppResult<PurchaseLine> {
        validate_line_update(&input)?;

        let mut tx = self.db.begin().await?;
        let purchase_id =
            document::update_line(&mut tx, &PURCHASE_TABLES, line_id, &input, actor).await?;
        let line = load_purchase(&mut tx, purchase_id)
            .await?
            .detalles
            .into_iter()
            .find(|line| line.id == line_id)
            .ok_or_else(|| AppError::not_found(PURCHASE_TABLES.line_entity, line_id))?;
        tx.commit().await?;
        Ok(line)
    }

    pub async fn delete_line(&self, line_id: Uuid, actor: Uuid) -> AppResult<PurchaseDocument> {
        let mut tx = self.db.begin().await?;
        let purchase_id = document::delete_line(&mut tx, &PURCHASE_TABLES, line_id, actor).await?;
        let purchase = load_purchase(&mut tx, purchase_id).await?;
        tx.commit().await?;
        Ok(purchase)
    }
}
