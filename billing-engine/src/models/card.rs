//! Card billing configuration model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A card's billing configuration, joined with the postponement flag from
/// its product. Read-only snapshot per reconciliation run; owned upstream.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardCycleConfig {
    pub card_id: i64,
    pub user_id: i64,
    /// Nominal day of month the invoice falls due, 1..=31. Days beyond the
    /// end of a month clamp to the month's last day at computation time.
    pub due_day: i16,
    /// Days between closing and due date.
    pub closing_offset_days: i16,
    /// Shift due dates landing on weekends/holidays to the next business day.
    pub postpone_due_date: bool,
    pub active: bool,
}
