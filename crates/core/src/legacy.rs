//! One-time adapter for the positional string rows of the legacy data format.
//!
//! Legacy rows are flat string arrays. Short rows and unparseable cells fall
//! back to zero or empty values instead of failing the import.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::{parse_dividend_months, BondHolding, MonthlyAssetRecord};

/// Positional layout of a legacy asset row: date, 13 amounts, notes, createdAt.
pub const LEGACY_ASSET_ROW_LEN: usize = 16;

/// Positional layout of a legacy bond row.
pub const LEGACY_BOND_ROW_LEN: usize = 15;

fn cell<S: AsRef<str>>(row: &[S], index: usize) -> &str {
    row.get(index).map(|value| value.as_ref().trim()).unwrap_or("")
}

/// Parses a legacy numeric cell.
///
/// Accepts thousands separators and a trailing `%` (the number is kept as
/// written, not divided by 100). Anything else yields zero.
pub fn parse_legacy_number(raw: &str) -> Decimal {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .unwrap_or(Decimal::ZERO)
}

/// Parses a legacy date cell, defaulting to the Unix epoch date.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD` and month-only `YYYY-MM` / `YYYY/MM`
/// (first of the month). A timestamp cell contributes its date.
pub fn parse_legacy_date(raw: &str) -> NaiveDate {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date;
        }
    }
    let month_start = format!("{}-01", raw.replace('/', "-"));
    if let Ok(date) = NaiveDate::parse_from_str(&month_start, "%Y-%m-%d") {
        return date;
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return timestamp.with_timezone(&Utc).date_naive();
    }
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

fn parse_legacy_timestamp(raw: &str, fallback: NaiveDate) -> DateTime<Utc> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return timestamp.with_timezone(&Utc);
    }
    let date = if raw.is_empty() {
        fallback
    } else {
        parse_legacy_date(raw)
    };
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Builds a monthly asset record for `client_id` from a legacy asset row.
pub fn asset_record_from_legacy<S: AsRef<str>>(client_id: Uuid, row: &[S]) -> MonthlyAssetRecord {
    let date = parse_legacy_date(cell(row, 0));
    let mut record = MonthlyAssetRecord::new(client_id, date);

    let mut amounts = [Decimal::ZERO; 13];
    for (offset, amount) in amounts.iter_mut().enumerate() {
        *amount = parse_legacy_number(cell(row, 1 + offset));
    }
    record.set_amounts(amounts);
    record.notes = cell(row, 14).to_string();
    record.created_at = parse_legacy_timestamp(cell(row, 15), date);
    record
}

/// Builds a bond holding for `client_id` from a legacy bond row.
pub fn bond_from_legacy<S: AsRef<str>>(client_id: Uuid, row: &[S]) -> BondHolding {
    let purchase_date = parse_legacy_date(cell(row, 0));
    let mut bond = BondHolding::new(client_id, purchase_date, cell(row, 1));
    bond.coupon_rate = parse_legacy_number(cell(row, 2));
    bond.yield_rate = parse_legacy_number(cell(row, 3));
    bond.purchase_price = parse_legacy_number(cell(row, 4));
    bond.purchase_amount = parse_legacy_number(cell(row, 5));
    bond.holding_face_value = parse_legacy_number(cell(row, 6));
    bond.trade_amount = parse_legacy_number(cell(row, 7));
    bond.current_value = parse_legacy_number(cell(row, 8));
    bond.received_interest = parse_legacy_number(cell(row, 9));
    bond.dividend_months = parse_dividend_months(cell(row, 10));
    bond.per_payment_interest = parse_legacy_number(cell(row, 11));
    bond.currency = cell(row, 12).to_string();
    bond.exchange_rate = parse_legacy_number(cell(row, 13));
    bond.notes = cell(row, 14).to_string();
    bond
}
