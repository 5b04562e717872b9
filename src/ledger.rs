//! Cash-register arithmetic for the current reconciliation period.
//!
//! A period runs from the latest register cut to now; with no cut yet the
//! boundary is the 2000-01-01 sentinel. The drawer balance counts CASH sales
//! only; card/transfer revenue is reported alongside for visibility but
//! never enters the drawer.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::{CashWithdrawalRow, SaleRow};

pub const PAYMENT_CASH: &str = "CASH";

/// Boundary used when no cut has ever been performed.
pub fn epoch_boundary() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .expect("valid sentinel date")
        .and_time(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTotals {
    pub cash_balance: f64,
    pub total_revenue: f64,
    pub total_withdrawals: f64,
}

/// Folds the period's sales and withdrawals into the drawer totals.
pub fn totals(sales: &[SaleRow], withdrawals: &[CashWithdrawalRow]) -> LedgerTotals {
    let mut cash_sales = 0.0;
    let mut other_sales = 0.0;
    for sale in sales {
        if sale.payment_method.eq_ignore_ascii_case(PAYMENT_CASH) {
            cash_sales += sale.total_amount;
        } else {
            other_sales += sale.total_amount;
        }
    }

    let total_withdrawals: f64 = withdrawals.iter().map(|w| w.amount).sum();

    LedgerTotals {
        cash_balance: cash_sales - total_withdrawals,
        total_revenue: cash_sales + other_sales,
        total_withdrawals,
    }
}

/// One row of the merged register feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub amount: f64,
    pub date: NaiveDateTime,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    pub user: String,
}

/// Human description for a sale entry: item names with barber attribution,
/// then the client or guest name when known.
pub fn sale_description(
    sale: &SaleRow,
    item_lines: &[(String, Option<String>)],
    client_name: Option<&str>,
) -> String {
    let mut desc = format!("Venta #{}: ", sale.id);
    let summary = item_lines
        .iter()
        .map(|(name, barber)| match barber {
            Some(barber) => format!("{name} ({barber})"),
            None => name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    desc.push_str(&summary);

    if let Some(client) = client_name {
        desc.push_str(" | Cliente: ");
        desc.push_str(client);
    } else if let Some(guest) = sale.guest_name.as_deref().filter(|g| !g.is_empty()) {
        desc.push_str(" | Cliente: ");
        desc.push_str(guest);
    }
    desc
}

/// Merges sale and withdrawal entries newest-first. Withdrawal amounts are
/// already negated by the caller.
pub fn merge_history(mut entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    entries
}
