//! Database service for the reconciliation engine.
//!
//! All store access goes through here. Batched reads return indexed maps for
//! the pure reconcilers; batched writes run inside a caller-owned
//! transaction so each batch commits or rolls back as a unit.

use chrono::{DateTime, NaiveDate, Utc};
use engine_core::error::AppError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::models::{
    CardCycleConfig, CardTransaction, ExistingInstallments, Invoice, InvoiceStatus,
    NewInstallment, StatementPeriod,
};
use crate::reconcile::invoices::InvoiceDiff;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Begin the transaction scoping one batch's writes.
    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    // =========================================================================
    // Invoice Reconciliation
    // =========================================================================

    /// All card ids, active or not: inactive cards still take part in a run
    /// so their future empty invoices can be retracted.
    #[instrument(skip(self))]
    pub async fn list_card_ids(&self) -> Result<Vec<i64>, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT card_id FROM cards ORDER BY card_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list cards: {}", e)))
    }

    /// Billing configuration for one batch of cards, joined with the
    /// product-level postponement flag.
    #[instrument(skip(self, card_ids), fields(batch_len = card_ids.len()))]
    pub async fn fetch_card_details(
        &self,
        card_ids: &[i64],
    ) -> Result<Vec<CardCycleConfig>, AppError> {
        if card_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, CardCycleConfig>(
            r#"
            SELECT
                c.card_id,
                c.user_id,
                c.due_day,
                c.closing_offset_days,
                p.postpone_due_date,
                c.active
            FROM cards c
            JOIN card_products p ON c.product_id = p.product_id
            WHERE c.card_id = ANY($1)
            "#,
        )
        .bind(card_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch card details: {}", e))
        })
    }

    /// Persisted invoices for the batch within [start, end], keyed by
    /// (card, period).
    #[instrument(skip(self, card_ids), fields(batch_len = card_ids.len(), start = %start, end = %end))]
    pub async fn fetch_invoices_in_window(
        &self,
        card_ids: &[i64],
        start: StatementPeriod,
        end: StatementPeriod,
    ) -> Result<HashMap<(i64, StatementPeriod), Invoice>, AppError> {
        if card_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT
                invoice_id, card_id, user_id, statement_period,
                opening_date, closing_date, due_date,
                amount, paid_amount, payment_date, status, file_url,
                created_utc, updated_utc
            FROM invoices
            WHERE card_id = ANY($1)
              AND statement_period >= $2
              AND statement_period <= $3
            "#,
        )
        .bind(card_ids.to_vec())
        .bind(start.to_string())
        .bind(end.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoices: {}", e))
        })?;

        Ok(index_invoices(rows))
    }

    /// Every persisted invoice of the given cards, regardless of period.
    /// Used for inactive-card retraction, which looks beyond the window.
    #[instrument(skip(self, card_ids), fields(batch_len = card_ids.len()))]
    pub async fn fetch_all_invoices_for_cards(
        &self,
        card_ids: &[i64],
    ) -> Result<HashMap<(i64, StatementPeriod), Invoice>, AppError> {
        if card_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT
                invoice_id, card_id, user_id, statement_period,
                opening_date, closing_date, due_date,
                amount, paid_amount, payment_date, status, file_url,
                created_utc, updated_utc
            FROM invoices
            WHERE card_id = ANY($1)
            "#,
        )
        .bind(card_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoices: {}", e))
        })?;

        Ok(index_invoices(rows))
    }

    /// Apply one batch's invoice diff inside the caller's transaction.
    ///
    /// Updates re-check the frozen-invoice guard in SQL so a statement issued
    /// between fetch and write is never rewritten. All three date fields are
    /// written together, never partially.
    #[instrument(
        skip(self, tx, diff),
        fields(
            inserts = diff.inserts.len(),
            updates = diff.updates.len(),
            deletes = diff.deletes.len()
        )
    )]
    pub async fn apply_invoice_changes(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        diff: &InvoiceDiff,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !diff.deletes.is_empty() {
            let ids: Vec<String> = diff.deletes.iter().cloned().collect();
            let result = sqlx::query("DELETE FROM invoices WHERE invoice_id = ANY($1)")
                .bind(ids)
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoices: {}", e))
                })?;
            info!(deleted = result.rows_affected(), "Invoices staged for deletion");
        }

        for invoice in &diff.inserts {
            sqlx::query(
                r#"
                INSERT INTO invoices (
                    invoice_id, card_id, user_id, statement_period,
                    opening_date, closing_date, due_date,
                    amount, paid_amount, payment_date, status, file_url,
                    created_utc, updated_utc
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, 0, 0, $8, $9, NULL, $10, $10)
                "#,
            )
            .bind(&invoice.invoice_id)
            .bind(invoice.card_id)
            .bind(invoice.user_id)
            .bind(&invoice.statement_period)
            .bind(invoice.opening_date)
            .bind(invoice.closing_date)
            .bind(invoice.due_date)
            .bind(invoice.due_date)
            .bind(InvoiceStatus::Open.as_str())
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to insert invoice {}: {}",
                    invoice.invoice_id,
                    e
                ))
            })?;
        }
        if !diff.inserts.is_empty() {
            info!(inserted = diff.inserts.len(), "Invoices staged for insertion");
        }

        for update in &diff.updates {
            sqlx::query(
                r#"
                UPDATE invoices
                SET opening_date = $2,
                    closing_date = $3,
                    due_date = $4,
                    updated_utc = $5
                WHERE invoice_id = $1
                  AND status = $6
                  AND file_url IS NULL
                "#,
            )
            .bind(&update.invoice_id)
            .bind(update.opening_date)
            .bind(update.closing_date)
            .bind(update.due_date)
            .bind(now)
            .bind(InvoiceStatus::Open.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to update invoice {}: {}",
                    update.invoice_id,
                    e
                ))
            })?;
        }
        if !diff.updates.is_empty() {
            info!(updated = diff.updates.len(), "Invoices staged for date correction");
        }

        Ok(())
    }

    // =========================================================================
    // Installment Reconciliation
    // =========================================================================

    /// Count settled installment transactions still needing rows, for
    /// batch-size calculation. Counting is separate from fetching so it
    /// happens exactly once per run.
    #[instrument(skip(self))]
    pub async fn count_pending_transactions(&self) -> Result<usize, AppError> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM card_transactions ct WHERE {}",
            PENDING_TRANSACTION_PREDICATE
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count pending: {}", e))
        })?;

        info!(pending = count, "Pending installment transactions counted");
        Ok(count.max(0) as usize)
    }

    /// One page of pending transactions, ordered by occurrence time so
    /// offset pagination is stable within a run.
    #[instrument(skip(self))]
    pub async fn fetch_pending_transactions(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CardTransaction>, AppError> {
        let rows = sqlx::query_as::<_, CardTransaction>(&format!(
            r#"
            SELECT
                ct.transaction_id, ct.user_id, ct.card_id, ct.occurred_utc,
                ct.statement_period, ct.installment_count,
                ct.base_value, ct.fees_taxes, ct.description
            FROM card_transactions ct
            WHERE {}
            ORDER BY ct.occurred_utc
            OFFSET $1
            LIMIT $2
            "#,
            PENDING_TRANSACTION_PREDICATE
        ))
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch pending: {}", e))
        })?;

        info!(fetched = rows.len(), offset, limit, "Pending transactions fetched");
        Ok(rows)
    }

    /// Existing installment rows for the batch, summarized per transaction.
    #[instrument(skip(self, transaction_ids), fields(batch_len = transaction_ids.len()))]
    pub async fn fetch_existing_installments(
        &self,
        transaction_ids: &[String],
    ) -> Result<HashMap<String, ExistingInstallments>, AppError> {
        if transaction_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (String, i32, String, Decimal, Decimal)>(
            r#"
            SELECT transaction_id, number, installment_id, base_value, fees_taxes
            FROM installments
            WHERE transaction_id = ANY($1)
            "#,
        )
        .bind(transaction_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch installments: {}", e))
        })?;

        let mut existing: HashMap<String, ExistingInstallments> = HashMap::new();
        let total = rows.len();
        for (transaction_id, number, installment_id, base_value, fees_taxes) in rows {
            let entry = existing.entry(transaction_id).or_default();
            entry.by_number.insert(number, installment_id);
            entry.base_sum += base_value;
            entry.fees_sum += fees_taxes;
        }

        info!(rows = total, "Existing installments fetched for batch");
        Ok(existing)
    }

    /// Invoice ids for the given (card, period) keys. Read-only: a missing
    /// invoice is reported by the reconciler as a gap, never created here.
    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    pub async fn fetch_invoice_ids_for_periods(
        &self,
        keys: &BTreeSet<(i64, StatementPeriod)>,
    ) -> Result<HashMap<(i64, StatementPeriod), String>, AppError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let (card_ids, periods): (Vec<i64>, Vec<String>) = keys
            .iter()
            .map(|(card_id, period)| (*card_id, period.to_string()))
            .unzip();

        let rows = sqlx::query_as::<_, (i64, String, String)>(
            r#"
            SELECT card_id, statement_period, invoice_id
            FROM invoices
            WHERE (card_id, statement_period) IN
                  (SELECT * FROM UNNEST($1::bigint[], $2::text[]))
            "#,
        )
        .bind(card_ids)
        .bind(periods)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice ids: {}", e))
        })?;

        let mut map = HashMap::new();
        for (card_id, period, invoice_id) in rows {
            match period.parse::<StatementPeriod>() {
                Ok(period) => {
                    map.insert((card_id, period), invoice_id);
                }
                Err(e) => {
                    warn!(card_id, period = %period, error = %e, "Skipping invoice with bad period key");
                }
            }
        }
        Ok(map)
    }

    /// Bulk-insert one batch's new installment rows inside the caller's
    /// transaction.
    #[instrument(skip(self, tx, rows), fields(rows = rows.len()))]
    pub async fn insert_installments(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[NewInstallment],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO installments (
                    installment_id, transaction_id, invoice_id, number,
                    statement_period, observations, base_value, fees_taxes,
                    updated_utc
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&row.installment_id)
            .bind(&row.transaction_id)
            .bind(&row.invoice_id)
            .bind(row.number)
            .bind(&row.statement_period)
            .bind(&row.observations)
            .bind(row.base_value)
            .bind(row.fees_taxes)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to insert installment {} of transaction {}: {}",
                    row.number,
                    row.transaction_id,
                    e
                ))
            })?;
        }

        info!(inserted = rows.len(), "Installments staged for insertion");
        Ok(())
    }

    // =========================================================================
    // Calendar
    // =========================================================================

    /// Holiday dates for the given years.
    #[instrument(skip(self))]
    pub async fn holidays_for_years(
        &self,
        years: &[i32],
    ) -> Result<HashSet<NaiveDate>, AppError> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT holiday_date
            FROM holidays
            WHERE date_part('year', holiday_date)::int = ANY($1)
            "#,
        )
        .bind(years.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch holidays: {}", e))
        })?;

        info!(years = ?years, holidays = dates.len(), "Holiday set loaded");
        Ok(dates.into_iter().collect())
    }
}

/// Pending predicate shared by count and fetch: settled installment
/// purchases with missing rows, or complete rows whose sums drifted past
/// the one-cent-per-row tolerance.
const PENDING_TRANSACTION_PREDICATE: &str = r#"
    ct.is_installment = TRUE
    AND ct.status = 'settled'
    AND (
        NOT EXISTS (
            SELECT 1
            FROM installments i
            WHERE i.transaction_id = ct.transaction_id
            GROUP BY i.transaction_id
            HAVING COUNT(*) = ct.installment_count
        )
        OR EXISTS (
            SELECT 1
            FROM (
                SELECT
                    COUNT(*) AS row_count,
                    COALESCE(SUM(i.base_value), 0) AS base_sum,
                    COALESCE(SUM(i.fees_taxes), 0) AS fees_sum
                FROM installments i
                WHERE i.transaction_id = ct.transaction_id
                GROUP BY i.transaction_id
            ) sums
            WHERE sums.row_count = ct.installment_count
              AND (
                  ABS(sums.base_sum - ct.base_value) > (0.01 * sums.row_count)
                  OR ABS(sums.fees_sum - ct.fees_taxes) > (0.01 * sums.row_count)
              )
        )
    )
"#;

fn index_invoices(rows: Vec<Invoice>) -> HashMap<(i64, StatementPeriod), Invoice> {
    let mut indexed = HashMap::with_capacity(rows.len());
    for invoice in rows {
        match invoice.statement_period.parse::<StatementPeriod>() {
            Ok(period) => {
                indexed.insert((invoice.card_id, period), invoice);
            }
            Err(e) => {
                warn!(
                    invoice_id = %invoice.invoice_id,
                    period = %invoice.statement_period,
                    error = %e,
                    "Skipping invoice with bad period key"
                );
            }
        }
    }
    indexed
}
