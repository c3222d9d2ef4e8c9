//! Stock reconciliation shared by purchases and sales
//!
//! Everything here runs on a connection that is already inside a
//! transaction. Lock order is always document header first, then products in
//! ascending id order.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    compute_totals, reprice_line, resolve_line_pricing, DocumentKind, DocumentTotals, LineInput,
    LinePricing, Presentation, PresentationSummary, ProductSummary, ReversalOutcome,
    StockLedger, UpdateLineInput,
};
use crate::services::catalog::{load_presentations, lock_products, persist_stock};

/// Table layout of one document kind
#[derive(Debug, Clone, Copy)]
pub struct DocumentTables {
    pub kind: DocumentKind,
    pub entity: &'static str,
    pub line_entity: &'static str,
    pub header: &'static str,
    pub lines: &'static str,
    pub parent_column: &'static str,
    pub terminal_status: &'static str,
}

pub const PURCHASE_TABLES: DocumentTables = DocumentTables {
    kind: DocumentKind::Purchase,
    entity: "Purchase",
    line_entity: "Purchase line",
    header: "compras",
    lines: "detalle_compras",
    parent_column: "id_compra",
    terminal_status: "ANULADA",
};

pub const SALE_TABLES: DocumentTables = DocumentTables {
    kind: DocumentKind::Sale,
    entity: "Sale",
    line_entity: "Sale line",
    header: "ventas",
    lines: "detalle_ventas",
    parent_column: "id_venta",
    terminal_status: "CANCELADA",
};

impl DocumentTables {
    fn price_column(&self) -> &'static str {
        self.kind.price_field()
    }
}

/// A requested line with its resolved presentation and price
#[derive(Debug, Clone)]
pub struct PreparedLine {
    pub presentation: Presentation,
    pub cantidad: i32,
    pub pricing: LinePricing,
}

/// Lines ready to insert plus the ledger holding their stock effect
#[derive(Debug)]
pub struct PreparedDocument {
    pub lines: Vec<PreparedLine>,
    pub ledger: StockLedger,
}

impl PreparedDocument {
    pub fn totals(&self, descuento: Option<Decimal>) -> AppResult<DocumentTotals> {
        Ok(compute_totals(
            self.lines.iter().map(|l| l.pricing.subtotal),
            descuento,
        )?)
    }
}

/// The stock-relevant part of a stored line
#[derive(Debug, Clone, FromRow)]
struct StoredLine {
    document_id: Uuid,
    id_presentacion: Uuid,
    cantidad: i32,
    precio: Decimal,
    subtotal: Decimal,
}

/// A stored line joined with its presentation and product, when they exist
#[derive(Debug, Clone, FromRow)]
pub struct MaterializedLineRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub id_presentacion: Uuid,
    pub cantidad: i32,
    pub precio: Decimal,
    pub subtotal: Decimal,
    pub posicion: i32,
    pub presentacion_nombre: Option<String>,
    pub presentacion_cantidad_base: Option<i32>,
    pub presentacion_precio_venta: Option<Decimal>,
    pub presentacion_precio_compra: Option<Decimal>,
    pub producto_id: Option<Uuid>,
    pub producto_codigo: Option<String>,
    pub producto_nombre: Option<String>,
}

impl MaterializedLineRow {
    pub fn presentation(&self) -> Option<PresentationSummary> {
        Some(PresentationSummary {
            id: self.id_presentacion,
            nombre: self.presentacion_nombre.clone()?,
            cantidad_base: self.presentacion_cantidad_base?,
            precio_venta: self.presentacion_precio_venta?,
            precio_compra: self.presentacion_precio_compra?,
        })
    }

    pub fn product(&self) -> Option<ProductSummary> {
        Some(ProductSummary {
            id: self.producto_id?,
            codigo: self.producto_codigo.clone()?,
            nombre: self.producto_nombre.clone()?,
        })
    }
}

/// Resolve presentations, lock products, price every line and fold the
/// stock movement of each line in list order.
///
/// Inactive presentations and products are reported as not found. The caller
/// persists the ledger and the lines in the same transaction.
pub async fn prepare_lines(
    conn: &mut PgConnection,
    kind: DocumentKind,
    lines: &[LineInput],
) -> AppResult<PreparedDocument> {
    let presentation_ids: Vec<Uuid> = lines.iter().map(|l| l.id_presentacion).collect();
    let presentations = load_presentations(conn, &presentation_ids).await?;

    let mut prepared = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        let presentation = presentations
            .get(&line.id_presentacion)
            .filter(|p| p.is_active())
            .ok_or_else(|| AppError::not_found("Presentation", line.id_presentacion))?;

        let pricing = resolve_line_pricing(line, presentation, kind)
            .map_err(|e| e.within(&format!("detalles[{}]", index)))?;

        prepared.push(PreparedLine {
            presentation: presentation.clone(),
            cantidad: line.cantidad,
            pricing,
        });
    }

    let product_ids: Vec<Uuid> = prepared.iter().map(|l| l.presentation.id_producto).collect();
    let mut ledger = lock_products(conn, &product_ids).await?;

    for id in &product_ids {
        if !ledger.product(*id).map_or(false, |p| p.is_active()) {
            return Err(AppError::not_found("Product", *id));
        }
    }

    let movements = ledger.apply_lines(
        prepared.iter().map(|l| (&l.presentation, l.cantidad)),
        kind.direction(),
    )?;

    for movement in &movements {
        tracing::debug!(
            product_id = %movement.product_id,
            presentation_id = %movement.presentation_id,
            direction = movement.direction.as_str(),
            units = movement.base_units,
            stock_after = movement.stock_after,
            "Stock movement"
        );
    }

    Ok(PreparedDocument {
        lines: prepared,
        ledger,
    })
}

/// Insert prepared lines in list order
pub async fn insert_lines(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    document_id: Uuid,
    lines: &[PreparedLine],
) -> AppResult<()> {
    let sql = format!(
        "INSERT INTO {} ({}, id_presentacion, cantidad, {}, subtotal, posicion) \
         VALUES ($1, $2, $3, $4, $5, $6)",
        tables.lines,
        tables.parent_column,
        tables.price_column()
    );

    for (position, line) in lines.iter().enumerate() {
        sqlx::query(&sql)
            .bind(document_id)
            .bind(line.presentation.id)
            .bind(line.cantidad)
            .bind(line.pricing.unit_price)
            .bind(line.pricing.subtotal)
            .bind(position as i32)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Lock a document header and return its status
pub async fn lock_document(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    id: Uuid,
) -> AppResult<Option<String>> {
    let status = sqlx::query_scalar::<_, String>(&format!(
        "SELECT estado FROM {} WHERE id = $1 FOR UPDATE",
        tables.header
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(status)
}

async fn stored_lines(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    document_id: Uuid,
) -> AppResult<Vec<StoredLine>> {
    let lines = sqlx::query_as::<_, StoredLine>(&format!(
        "SELECT {parent} AS document_id, id_presentacion, cantidad, {price} AS precio, subtotal \
         FROM {lines} WHERE {parent} = $1 ORDER BY posicion, id",
        parent = tables.parent_column,
        price = tables.price_column(),
        lines = tables.lines
    ))
    .bind(document_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

async fn stored_line(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    line_id: Uuid,
    lock: bool,
) -> AppResult<Option<StoredLine>> {
    let line = sqlx::query_as::<_, StoredLine>(&format!(
        "SELECT {parent} AS document_id, id_presentacion, cantidad, {price} AS precio, subtotal \
         FROM {lines} WHERE id = $1{lock}",
        parent = tables.parent_column,
        price = tables.price_column(),
        lines = tables.lines,
        lock = if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(line_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(line)
}

/// Load lines of several documents joined with their catalog references,
/// grouped by document id
pub async fn materialized_lines(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    document_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<MaterializedLineRow>>> {
    if document_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, MaterializedLineRow>(&format!(
        r#"
        SELECT d.id, d.{parent} AS document_id, d.id_presentacion, d.cantidad,
               d.{price} AS precio, d.subtotal, d.posicion,
               pr.nombre AS presentacion_nombre,
               pr.cantidad_base AS presentacion_cantidad_base,
               pr.precio_venta AS presentacion_precio_venta,
               pr.precio_compra AS presentacion_precio_compra,
               p.id AS producto_id, p.codigo AS producto_codigo, p.nombre AS producto_nombre
        FROM {lines} d
        LEFT JOIN presentaciones pr ON pr.id = d.id_presentacion
        LEFT JOIN productos p ON p.id = pr.id_producto
        WHERE d.{parent} = ANY($1)
        ORDER BY d.{parent}, d.posicion, d.id
        "#,
        parent = tables.parent_column,
        price = tables.price_column(),
        lines = tables.lines
    ))
    .bind(document_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<MaterializedLineRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.document_id).or_default().push(row);
    }
    Ok(grouped)
}

fn log_skipped(tables: &DocumentTables, document_id: Uuid, outcomes: &[ReversalOutcome]) {
    for outcome in outcomes {
        if let ReversalOutcome::SkippedMissingReference {
            presentation_id,
            missing,
        } = outcome
        {
            tracing::warn!(
                document = tables.entity,
                %document_id,
                %presentation_id,
                ?missing,
                "Skipped stock reversal: catalog reference missing or inactive"
            );
        }
    }
}

/// Undo the stock movement of every line of a document.
///
/// Lines whose presentation or product is gone are skipped with a warning.
pub async fn reverse_document(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    document_id: Uuid,
) -> AppResult<Vec<ReversalOutcome>> {
    let lines = stored_lines(conn, tables, document_id).await?;
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let presentation_ids: Vec<Uuid> = lines.iter().map(|l| l.id_presentacion).collect();
    let presentations = load_presentations(conn, &presentation_ids).await?;

    let product_ids: Vec<Uuid> = presentations.values().map(|p| p.id_producto).collect();
    let mut ledger = lock_products(conn, &product_ids).await?;

    let outcomes = ledger.reverse_lines(
        lines.iter().map(|l| {
            (
                presentations.get(&l.id_presentacion),
                l.id_presentacion,
                l.cantidad,
            )
        }),
        tables.kind.direction(),
    )?;

    log_skipped(tables, document_id, &outcomes);
    persist_stock(conn, &ledger).await?;

    Ok(outcomes)
}

/// Recompute and store header totals from the current lines
pub async fn recompute_totals(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    document_id: Uuid,
    actor: Uuid,
) -> AppResult<DocumentTotals> {
    let descuento = sqlx::query_scalar::<_, Decimal>(&format!(
        "SELECT descuento FROM {} WHERE id = $1",
        tables.header
    ))
    .bind(document_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(tables.entity, document_id))?;

    let lines = stored_lines(conn, tables, document_id).await?;
    let totals = compute_totals(lines.iter().map(|l| l.subtotal), Some(descuento))?;

    sqlx::query(&format!(
        "UPDATE {} SET totalsindescuento = $1, totalcondescuento = $2, \
         fecha_edicion = NOW(), updated_by = $3 WHERE id = $4",
        tables.header
    ))
    .bind(totals.totalsindescuento)
    .bind(totals.totalcondescuento)
    .bind(actor)
    .bind(document_id)
    .execute(&mut *conn)
    .await?;

    Ok(totals)
}

/// Lock the header owning a line and the line itself, refusing terminal
/// documents
async fn lock_line(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    line_id: Uuid,
) -> AppResult<StoredLine> {
    let document_id = stored_line(conn, tables, line_id, false)
        .await?
        .map(|l| l.document_id)
        .ok_or_else(|| AppError::not_found(tables.line_entity, line_id))?;

    let status = lock_document(conn, tables, document_id)
        .await?
        .ok_or_else(|| AppError::not_found(tables.entity, document_id))?;

    if status == tables.terminal_status {
        return Err(AppError::InvalidStateTransition(format!(
            "{} {} is {} and its lines can no longer change",
            tables.entity, document_id, status
        )));
    }

    // the line may have been removed while waiting for the header lock
    stored_line(conn, tables, line_id, true)
        .await?
        .ok_or_else(|| AppError::not_found(tables.line_entity, line_id))
}

/// Change quantity, presentation or price of one line.
///
/// The old pair is reversed against the references as they were before the
/// change and the new pair is applied against the ones resolved after it.
/// Returns the owning document id.
pub async fn update_line(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    line_id: Uuid,
    input: &UpdateLineInput,
    actor: Uuid,
) -> AppResult<Uuid> {
    let line = lock_line(conn, tables, line_id).await?;

    let new_presentation_id = input.id_presentacion.unwrap_or(line.id_presentacion);
    let new_quantity = input.cantidad.unwrap_or(line.cantidad);
    let presentation_changed = new_presentation_id != line.id_presentacion;

    let presentations =
        load_presentations(conn, &[line.id_presentacion, new_presentation_id]).await?;

    let new_presentation = presentations
        .get(&new_presentation_id)
        .filter(|p| p.is_active())
        .ok_or_else(|| AppError::not_found("Presentation", new_presentation_id))?;
    let old_presentation = presentations.get(&line.id_presentacion);

    let product_ids: Vec<Uuid> = presentations.values().map(|p| p.id_producto).collect();
    let mut ledger = lock_products(conn, &product_ids).await?;

    if !ledger
        .product(new_presentation.id_producto)
        .map_or(false, |p| p.is_active())
    {
        return Err(AppError::not_found("Product", new_presentation.id_producto));
    }

    let outcome = ledger.replace_line(
        old_presentation,
        line.id_presentacion,
        line.cantidad,
        new_presentation,
        new_quantity,
        tables.kind.direction(),
    )?;
    log_skipped(tables, line.document_id, &[outcome]);

    let pricing = reprice_line(
        new_quantity,
        line.precio,
        input.precio_unitario,
        presentation_changed,
        new_presentation,
        tables.kind,
    )?;

    sqlx::query(&format!(
        "UPDATE {} SET id_presentacion = $1, cantidad = $2, {} = $3, subtotal = $4 WHERE id = $5",
        tables.lines,
        tables.price_column()
    ))
    .bind(new_presentation_id)
    .bind(new_quantity)
    .bind(pricing.unit_price)
    .bind(pricing.subtotal)
    .bind(line_id)
    .execute(&mut *conn)
    .await?;

    persist_stock(conn, &ledger).await?;
    recompute_totals(conn, tables, line.document_id, actor).await?;

    tracing::info!(
        document = tables.entity,
        document_id = %line.document_id,
        %line_id,
        "Document line updated"
    );

    Ok(line.document_id)
}

/// Remove one line, reversing its stock movement. A sale must keep at least
/// one line. Returns the owning document id.
pub async fn delete_line(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    line_id: Uuid,
    actor: Uuid,
) -> AppResult<Uuid> {
    let line = lock_line(conn, tables, line_id).await?;

    if tables.kind == DocumentKind::Sale {
        let remaining = stored_lines(conn, tables, line.document_id).await?.len();
        if remaining <= 1 {
            return Err(AppError::validation(
                "detalles",
                "A sale must have at least one line",
            ));
        }
    }

    let presentations = load_presentations(conn, &[line.id_presentacion]).await?;
    let presentation = presentations.get(&line.id_presentacion);
    let product_ids: Vec<Uuid> = presentation.iter().map(|p| p.id_producto).collect();
    let mut ledger = lock_products(conn, &product_ids).await?;

    let outcome = ledger.reverse(
        presentation,
        line.id_presentacion,
        line.cantidad,
        tables.kind.direction(),
    )?;
    log_skipped(tables, line.document_id, &[outcome]);

    sqlx::query(&format!("DELETE FROM {} WHERE id = $1", tables.lines))
        .bind(line_id)
        .execute(&mut *conn)
        .await?;

    persist_stock(conn, &ledger).await?;
    recompute_totals(conn, tables, line.document_id, actor).await?;

    tracing::info!(
        document = tables.entity,
        document_id = %line.document_id,
        %line_id,
        "Document line deleted"
    );

    Ok(line.document_id)
}

/// Void or cancel a document: reverse every line and move it to its terminal
/// status. Returns `None` when the document does not exist; a document that
/// is already terminal is left untouched.
pub async fn void_document(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    document_id: Uuid,
    actor: Uuid,
) -> AppResult<Option<()>> {
    let Some(status) = lock_document(conn, tables, document_id).await? else {
        return Ok(None);
    };

    if status == tables.terminal_status {
        tracing::debug!(document = tables.entity, %document_id, "Already terminal, nothing to do");
        return Ok(Some(()));
    }

    let outcomes = reverse_document(conn, tables, document_id).await?;

    sqlx::query(&format!(
        "UPDATE {} SET estado = $1, fecha_edicion = NOW(), updated_by = $2 WHERE id = $3",
        tables.header
    ))
    .bind(tables.terminal_status)
    .bind(actor)
    .bind(document_id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        document = tables.entity,
        %document_id,
        lines = outcomes.len(),
        reversed = outcomes.iter().filter(|o| o.is_applied()).count(),
        "Document moved to {}",
        tables.terminal_status
    );

    Ok(Some(()))
}

/// Physically delete a document. Stock is reversed only when the document is
/// still confirmed. Returns whether a row was deleted.
pub async fn delete_document(
    conn: &mut PgConnection,
    tables: &DocumentTables,
    document_id: Uuid,
) -> AppResult<bool> {
    let Some(status) = lock_document(conn, tables, document_id).await? else {
        return Ok(false);
    };

    if status != tables.terminal_status {
        reverse_document(conn, tables, document_id).await?;
    }

    sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = $1",
        tables.lines, tables.parent_column
    ))
    .bind(document_id)
    .execute(&mut *conn)
    .await?;

    let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", tables.header))
        .bind(document_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    tracing::info!(document = tables.entity, %document_id, status = %status, "Document deleted");

    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_use_kind_price_column() {
        assert_eq!(PURCHASE_TABLES.price_column(), "precio_compra");
        assert_eq!(SALE_TABLES.price_column(), "precio_unitario");
    }

    #[test]
    fn terminal_statuses_match_models() {
        use crate::models::{PurchaseStatus, SaleStatus};
        assert_eq!(PURCHASE_TABLES.terminal_status, PurchaseStatus::Anulada.as_str());
        assert_eq!(SALE_TABLES.terminal_status, SaleStatus::Cancelada.as_str());
    }

    #[test]
    fn materialized_row_without_catalog_refs() {
        let row = MaterializedLineRow {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            id_presentacion: Uuid::new_v4(),
            cantidad: 2,
            precio: Decimal::new(500, 2),
            subtotal: Decimal::new(1000, 2),
            posicion: 0,
            presentacion_nombre: None,
            presentacion_cantidad_base: None,
            presentacion_precio_venta: None,
            presentacion_precio_compra: None,
            producto_id: None,
            producto_codigo: None,
            producto_nombre: None,
        };
        assert!(row.presentation().is_none());
        assert!(row.product().is_none());
    }
}
