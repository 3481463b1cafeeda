//! Invoice reconciliation: project billing cycles per card and diff the
//! projection against persisted invoices.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error};

use crate::calendar::BusinessCalendar;
use crate::cycle::compute_cycle_dates;
use crate::ids;
use crate::models::{
    CardCycleConfig, Invoice, InvoiceDateCorrection, NewInvoice, StatementPeriod,
};

/// Inactive-card retraction only touches invoices whose balance is zero
/// within one cent.
const ZERO_BALANCE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// The consecutive statement periods a run projects per card.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionWindow {
    pub start: StatementPeriod,
    pub months: u32,
}

impl ProjectionWindow {
    /// First period store reads must cover: one before the window, so the
    /// chain can seed from the last persisted closing date.
    pub fn fetch_start(&self) -> StatementPeriod {
        self.start.prev()
    }

    /// Last period inside the window (inclusive).
    pub fn end(&self) -> StatementPeriod {
        self.start.plus_months(self.months.saturating_sub(1))
    }

    pub fn periods(&self) -> impl Iterator<Item = StatementPeriod> + '_ {
        (0..self.months).map(|offset| self.start.plus_months(offset))
    }
}

/// The minimal change set turning persisted invoices into the projection.
#[derive(Debug, Default)]
pub struct InvoiceDiff {
    pub inserts: Vec<NewInvoice>,
    pub updates: Vec<InvoiceDateCorrection>,
    pub deletes: BTreeSet<String>,
}

impl InvoiceDiff {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Reconcile one batch of cards against their persisted invoices.
///
/// `existing` must hold every persisted invoice of the batch from
/// [`ProjectionWindow::fetch_start`] through the end of the window, so the
/// chain can seed from the closing date of the period just before it.
/// Inactive cards additionally need all of their invoices present.
///
/// Re-running with unchanged inputs yields an empty diff.
pub fn reconcile_cards(
    cards: &[CardCycleConfig],
    existing: &HashMap<(i64, StatementPeriod), Invoice>,
    window: ProjectionWindow,
    today: NaiveDate,
    calendar: &BusinessCalendar,
) -> InvoiceDiff {
    let mut inserts = Vec::new();
    let mut updates: BTreeMap<String, InvoiceDateCorrection> = BTreeMap::new();
    let mut deletes = BTreeSet::new();

    for card in cards {
        if !card.active {
            retract_future_empty_invoices(card, existing, today, &mut deletes);
            continue;
        }

        // Seed the chain from the latest persisted invoice before the window.
        let mut previous_closing = existing
            .iter()
            .filter(|((card_id, period), _)| *card_id == card.card_id && *period < window.start)
            .max_by_key(|((_, period), _)| *period)
            .map(|(_, invoice)| invoice.closing_date);

        for period in window.periods() {
            let dates = match compute_cycle_dates(card, period, previous_closing, calendar) {
                Ok(dates) => dates,
                Err(e) => {
                    // Skip this period but keep going; the chain continues
                    // from the last successfully computed closing date.
                    error!(
                        card_id = card.card_id,
                        period = %period,
                        error = %e,
                        "Cycle date computation failed, skipping period"
                    );
                    continue;
                }
            };
            previous_closing = Some(dates.closing);

            match existing.get(&(card.card_id, period)) {
                None => inserts.push(NewInvoice {
                    invoice_id: ids::new_invoice_id(),
                    card_id: card.card_id,
                    user_id: card.user_id,
                    statement_period: period.to_string(),
                    opening_date: dates.opening,
                    closing_date: dates.closing,
                    due_date: dates.due,
                }),
                Some(invoice) => {
                    let drifted = invoice.opening_date != dates.opening
                        || invoice.closing_date != dates.closing
                        || invoice.due_date != dates.due;
                    if invoice.dates_are_mutable() && drifted {
                        updates
                            .entry(invoice.invoice_id.clone())
                            .or_insert_with(|| InvoiceDateCorrection {
                                invoice_id: invoice.invoice_id.clone(),
                                opening_date: dates.opening,
                                closing_date: dates.closing,
                                due_date: dates.due,
                            });
                    }
                }
            }
        }
    }

    InvoiceDiff {
        inserts,
        updates: updates.into_values().collect(),
        deletes,
    }
}

/// A deactivated card keeps its billed history; only future invoices that
/// never accrued a balance are retracted.
fn retract_future_empty_invoices(
    card: &CardCycleConfig,
    existing: &HashMap<(i64, StatementPeriod), Invoice>,
    today: NaiveDate,
    deletes: &mut BTreeSet<String>,
) {
    for ((card_id, _), invoice) in existing {
        if *card_id != card.card_id {
            continue;
        }
        if invoice.due_date > today && invoice.amount.abs() <= ZERO_BALANCE_TOLERANCE {
            debug!(
                card_id = card.card_id,
                invoice_id = %invoice.invoice_id,
                due_date = %invoice.due_date,
                "Retracting future empty invoice of inactive card"
            );
            deletes.insert(invoice.invoice_id.clone());
        }
    }
}
