//! Batch-oriented execution of the two reconciliation runs.
//!
//! Each batch is fetch -> reconcile -> write -> commit, with exactly one
//! store transaction per batch. A failed batch rolls back and is counted;
//! the run continues with the next batch.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use engine_core::error::AppError;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar::{years_to_cover, BusinessCalendar};
use crate::config::EngineConfig;
use crate::models::{Invoice, StatementPeriod};
use crate::reconcile::installments::{plan_installments, required_periods};
use crate::reconcile::invoices::{reconcile_cards, InvoiceDiff, ProjectionWindow};
use crate::services::Database;

/// Batch-size bounds for one workload.
#[derive(Debug, Clone, Copy)]
pub struct BatchBounds {
    pub min: usize,
    pub max: usize,
}

/// Invoice runs trade larger batches against per-card fetch fan-out.
pub const INVOICE_BATCH_BOUNDS: BatchBounds = BatchBounds { min: 250, max: 1250 };

/// Installment batches carry more rows per item, so they stay smaller.
pub const INSTALLMENT_BATCH_BOUNDS: BatchBounds = BatchBounds { min: 100, max: 1000 };

/// 5% of the working set, clamped to the workload's bounds.
pub fn batch_size(total: usize, bounds: BatchBounds) -> usize {
    ((total as f64 * 0.05) as usize).clamp(bounds.min, bounds.max)
}

/// Outcome of an invoice reconciliation run.
#[derive(Debug, Default)]
pub struct InvoiceRunReport {
    pub run_id: Uuid,
    pub cards_total: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub invoices_inserted: usize,
    pub invoices_updated: usize,
    pub invoices_deleted: usize,
}

/// Outcome of an installment reconciliation run.
#[derive(Debug, Default)]
pub struct InstallmentRunReport {
    pub run_id: Uuid,
    pub transactions_pending: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub installments_inserted: usize,
    pub invoice_gaps: usize,
}

/// Project and reconcile invoices for every card.
pub async fn run_invoice_reconciliation(
    db: &Database,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<InvoiceRunReport, AppError> {
    let run_id = Uuid::new_v4();
    let today = config.run_as_of.unwrap_or_else(|| now.date_naive());
    let mut report = InvoiceRunReport {
        run_id,
        ..Default::default()
    };

    let card_ids = db.list_card_ids().await?;
    report.cards_total = card_ids.len();
    if card_ids.is_empty() {
        info!(run_id = %run_id, "No cards to process");
        return Ok(report);
    }

    let window = ProjectionWindow {
        start: StatementPeriod::from_date(today),
        months: config.lookahead_months,
    };
    let size = batch_size(card_ids.len(), INVOICE_BATCH_BOUNDS);
    info!(
        run_id = %run_id,
        cards = card_ids.len(),
        batch_size = size,
        window_start = %window.start,
        window_end = %window.end(),
        "Starting invoice reconciliation run"
    );

    let holidays = db
        .holidays_for_years(&years_to_cover(today.year(), config.lookahead_months))
        .await?;
    let calendar = BusinessCalendar::new(holidays);

    let total_batches = card_ids.len().div_ceil(size);
    for (index, batch_ids) in card_ids.chunks(size).enumerate() {
        let batch_number = index + 1;
        let started = Instant::now();
        report.batches_total += 1;
        info!(
            run_id = %run_id,
            batch = batch_number,
            total_batches,
            size = batch_ids.len(),
            "Processing card batch"
        );

        match process_invoice_batch(db, batch_ids, window, today, now, &calendar).await {
            Ok((inserted, updated, deleted)) => {
                report.invoices_inserted += inserted;
                report.invoices_updated += updated;
                report.invoices_deleted += deleted;
                info!(
                    run_id = %run_id,
                    batch = batch_number,
                    inserted,
                    updated,
                    deleted,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Card batch committed"
                );
            }
            Err(e) => {
                report.batches_failed += 1;
                error!(
                    run_id = %run_id,
                    batch = batch_number,
                    error = %e,
                    "Card batch failed and was rolled back, continuing"
                );
            }
        }
    }

    info!(
        run_id = %run_id,
        batches = report.batches_total,
        failed = report.batches_failed,
        inserted = report.invoices_inserted,
        updated = report.invoices_updated,
        deleted = report.invoices_deleted,
        "Invoice reconciliation run finished"
    );
    Ok(report)
}

async fn process_invoice_batch(
    db: &Database,
    batch_ids: &[i64],
    window: ProjectionWindow,
    today: NaiveDate,
    now: DateTime<Utc>,
    calendar: &BusinessCalendar,
) -> Result<(usize, usize, usize), AppError> {
    let cards = db.fetch_card_details(batch_ids).await?;
    if cards.is_empty() {
        warn!(ids = ?batch_ids, "No card details found for batch");
        return Ok((0, 0, 0));
    }

    // The fetch starts one period before the window so the projection chain
    // seeds from the last persisted closing date; inactive cards need their
    // full invoice history for retraction.
    let mut existing = db
        .fetch_invoices_in_window(batch_ids, window.fetch_start(), window.end())
        .await?;
    let inactive_ids: Vec<i64> = cards
        .iter()
        .filter(|card| !card.active)
        .map(|card| card.card_id)
        .collect();
    if !inactive_ids.is_empty() {
        merge_invoices(
            &mut existing,
            db.fetch_all_invoices_for_cards(&inactive_ids).await?,
        );
    }

    let diff = reconcile_cards(&cards, &existing, window, today, calendar);
    apply_invoice_diff(db, diff, now).await
}

fn merge_invoices(
    target: &mut HashMap<(i64, StatementPeriod), Invoice>,
    source: HashMap<(i64, StatementPeriod), Invoice>,
) {
    for (key, invoice) in source {
        target.entry(key).or_insert(invoice);
    }
}

async fn apply_invoice_diff(
    db: &Database,
    diff: InvoiceDiff,
    now: DateTime<Utc>,
) -> Result<(usize, usize, usize), AppError> {
    if diff.is_empty() {
        return Ok((0, 0, 0));
    }
    let counts = (diff.inserts.len(), diff.updates.len(), diff.deletes.len());

    // One transaction per batch; dropping it on error rolls everything back.
    let mut tx = db.begin().await?;
    db.apply_invoice_changes(&mut tx, &diff, now).await?;
    tx.commit()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit batch: {}", e)))?;
    Ok(counts)
}

/// Generate missing installment rows for settled multi-installment purchases.
pub async fn run_installment_reconciliation(
    db: &Database,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<InstallmentRunReport, AppError> {
    let run_id = Uuid::new_v4();
    let mut report = InstallmentRunReport {
        run_id,
        ..Default::default()
    };

    let total = db.count_pending_transactions().await?;
    report.transactions_pending = total;
    if total == 0 {
        info!(run_id = %run_id, "No pending installment transactions");
        return Ok(report);
    }

    let size = batch_size(total, INSTALLMENT_BATCH_BOUNDS);
    let total_batches = total.div_ceil(size);
    info!(
        run_id = %run_id,
        pending = total,
        batch_size = size,
        total_batches,
        "Starting installment reconciliation run"
    );

    for batch_index in 0..total_batches {
        let batch_number = batch_index + 1;
        let offset = batch_index * size;
        let started = Instant::now();
        report.batches_total += 1;
        info!(
            run_id = %run_id,
            batch = batch_number,
            total_batches,
            offset,
            limit = size,
            "Processing transaction batch"
        );

        match process_installment_batch(db, offset, size, now).await {
            Ok((inserted, gaps)) => {
                report.installments_inserted += inserted;
                report.invoice_gaps += gaps;
                info!(
                    run_id = %run_id,
                    batch = batch_number,
                    inserted,
                    gaps,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Transaction batch committed"
                );
            }
            Err(e) => {
                report.batches_failed += 1;
                error!(
                    run_id = %run_id,
                    batch = batch_number,
                    error = %e,
                    "Transaction batch failed and was rolled back, continuing"
                );
            }
        }
    }

    info!(
        run_id = %run_id,
        batches = report.batches_total,
        failed = report.batches_failed,
        inserted = report.installments_inserted,
        gaps = report.invoice_gaps,
        "Installment reconciliation run finished"
    );
    Ok(report)
}

async fn process_installment_batch(
    db: &Database,
    offset: usize,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<(usize, usize), AppError> {
    let transactions = db.fetch_pending_transactions(offset, limit).await?;
    if transactions.is_empty() {
        return Ok((0, 0));
    }

    let transaction_ids: Vec<String> = transactions
        .iter()
        .map(|t| t.transaction_id.clone())
        .collect();
    let existing = db.fetch_existing_installments(&transaction_ids).await?;
    let required = required_periods(&transactions, &existing);
    let invoice_ids = db.fetch_invoice_ids_for_periods(&required).await?;

    let plan = plan_installments(&transactions, &existing, &invoice_ids);
    let gaps = plan.gaps.len();
    if plan.inserts.is_empty() {
        return Ok((0, gaps));
    }

    let inserted = plan.inserts.len();
    let mut tx = db.begin().await?;
    db.insert_installments(&mut tx, &plan.inserts, now).await?;
    tx.commit()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit batch: {}", e)))?;
    Ok((inserted, gaps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_clamps_to_bounds() {
        // 5% of 1000 is 50, below the installment floor of 100.
        assert_eq!(batch_size(1000, INSTALLMENT_BATCH_BOUNDS), 100);
        assert_eq!(batch_size(4000, INSTALLMENT_BATCH_BOUNDS), 200);
        assert_eq!(batch_size(100_000, INSTALLMENT_BATCH_BOUNDS), 1000);
        assert_eq!(batch_size(1000, INVOICE_BATCH_BOUNDS), 250);
        assert_eq!(batch_size(40_000, INVOICE_BATCH_BOUNDS), 1250);
        assert_eq!(batch_size(0, INVOICE_BATCH_BOUNDS), 250);
    }
}
