//! Versioned receipt storage.
//!
//! A logical receipt is identified by its source file, or by the natural key
//! (profile, merchant, date, total, currency) when it has none. Each upsert
//! inserts a new version and demotes the previous current one.

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use rust_decimal::{Decimal, RoundingStrategy};

use super::{new_id, now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptRow {
    pub id: String,
    pub profile_id: String,
    pub file_id: Option<String>,
    pub file_path: Option<String>,
    pub merchant_name: String,
    pub tx_date: String,
    pub subtotal: Option<String>,
    pub discount: Option<String>,
    pub other_fees: Option<String>,
    pub tip: Option<String>,
    pub tax: Option<String>,
    pub total: String,
    pub currency_code: String,
    pub category: String,
    pub payment_method: Option<String>,
    pub payment_last4: Option<String>,
    pub description: Option<String>,
    pub is_current: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ReceiptRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            profile_id: row.get("profile_id")?,
            file_id: row.get("file_id")?,
            file_path: row.get("file_path")?,
            merchant_name: row.get("merchant_name")?,
            tx_date: row.get("tx_date")?,
            subtotal: row.get("subtotal")?,
            discount: row.get("discount")?,
            other_fees: row.get("other_fees")?,
            tip: row.get("tip")?,
            tax: row.get("tax")?,
            total: row.get("total")?,
            currency_code: row.get("currency_code")?,
            category: row.get("category")?,
            payment_method: row.get("payment_method")?,
            payment_last4: row.get("payment_last4")?,
            description: row.get("description")?,
            is_current: row.get("is_current")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// The total as a decimal. Stored totals are always valid.
    pub fn total_decimal(&self) -> Option<Decimal> {
        Decimal::from_str(&self.total).ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewReceipt {
    pub profile_id: String,
    pub file_id: Option<String>,
    pub file_path: Option<String>,
    pub merchant_name: String,
    pub tx_date: String,
    pub subtotal: Option<String>,
    pub discount: Option<String>,
    pub other_fees: Option<String>,
    pub tip: Option<String>,
    pub tax: Option<String>,
    pub total: String,
    pub currency_code: String,
    pub category: String,
    pub payment_method: Option<String>,
    pub payment_last4: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub receipt: ReceiptRow,
    /// Number of previously current versions that were demoted.
    pub demoted: usize,
}

/// Inserts a new current version of a receipt, demoting the prior one.
///
/// Runs in a single immediate transaction; on any error nothing changes.
pub fn upsert(db: &Database, receipt: &NewReceipt) -> Result<UpsertOutcome, DatabaseError> {
    let now = now_rfc3339();
    let row = ReceiptRow {
        id: new_id(),
        profile_id: receipt.profile_id.clone(),
        file_id: receipt.file_id.clone(),
        file_path: receipt.file_path.clone(),
        merchant_name: receipt.merchant_name.trim().to_string(),
        tx_date: receipt.tx_date.trim().to_string(),
        subtotal: optional_money("subtotal", receipt.subtotal.as_deref())?,
        discount: optional_money("discount", receipt.discount.as_deref())?,
        other_fees: optional_money("other_fees", receipt.other_fees.as_deref())?,
        tip: optional_money("tip", receipt.tip.as_deref())?,
        tax: optional_money("tax", receipt.tax.as_deref())?,
        total: money("total", &receipt.total)?,
        currency_code: receipt.currency_code.trim().to_uppercase(),
        category: receipt.category.clone(),
        payment_method: receipt.payment_method.clone(),
        payment_last4: receipt.payment_last4.clone(),
        description: receipt.description.clone(),
        is_current: true,
        created_at: now.clone(),
        updated_at: now,
    };

    let demoted = db.with_transaction(|tx| {
        let demoted = demote_current(tx, &row)?;
        insert_row(tx, &row)?;
        Ok(demoted)
    })?;

    match &row.file_id {
        Some(file_id) => log::info!(
            "Stored receipt {} for file {} ({} prior version(s) demoted)",
            row.id,
            file_id,
            demoted
        ),
        None => log::info!(
            "Stored receipt {} without file ({} prior version(s) demoted)",
            row.id,
            demoted
        ),
    }

    Ok(UpsertOutcome {
        receipt: row,
        demoted,
    })
}

fn demote_current(tx: &Transaction<'_>, row: &ReceiptRow) -> Result<usize, DatabaseError> {
    let changed = match &row.file_id {
        Some(file_id) => tx.execute(
            "UPDATE receipts SET is_current = 0, updated_at = ?2
             WHERE file_id = ?1 AND is_current = 1",
            params![file_id, row.updated_at],
        )?,
        None => tx.execute(
            "UPDATE receipts SET is_current = 0, updated_at = ?6
             WHERE file_id IS NULL AND is_current = 1
               AND profile_id IS ?1 AND merchant_name IS ?2 AND tx_date IS ?3
               AND total IS ?4 AND currency_code IS ?5",
            params![
                row.profile_id,
                row.merchant_name,
                row.tx_date,
                row.total,
                row.currency_code,
                row.updated_at
            ],
        )?,
    };
    Ok(changed)
}

fn insert_row(tx: &Transaction<'_>, row: &ReceiptRow) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT INTO receipts (id, profile_id, file_id, file_path, merchant_name, tx_date,
         subtotal, discount, other_fees, tip, tax, total, currency_code, category,
         payment_method, payment_last4, description, is_current, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
         1, ?18, ?19)",
        params![
            row.id,
            row.profile_id,
            row.file_id,
            row.file_path,
            row.merchant_name,
            row.tx_date,
            row.subtotal,
            row.discount,
            row.other_fees,
            row.tip,
            row.tax,
            row.total,
            row.currency_code,
            row.category,
            row.payment_method,
            row.payment_last4,
            row.description,
            row.created_at,
            row.updated_at,
        ],
    )?;
    Ok(())
}

/// Parses a decimal string and renders it with exactly two places.
fn money(field: &'static str, raw: &str) -> Result<String, DatabaseError> {
    let value = Decimal::from_str(raw.trim()).map_err(|e| DatabaseError::InvalidValue {
        field,
        reason: format!("'{}' is not a decimal: {}", raw, e),
    })?;
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Ok(format!("{:.2}", rounded))
}

fn optional_money(field: &'static str, raw: Option<&str>) -> Result<Option<String>, DatabaseError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => money(field, value).map(Some),
    }
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ReceiptRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM receipts WHERE id = ?1",
                params![id],
                ReceiptRow::from_row,
            )
            .optional()?)
    })
}

/// The current version of the receipt extracted from `file_id`.
pub fn get_current_by_file_id(
    db: &Database,
    file_id: &str,
) -> Result<Option<ReceiptRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM receipts WHERE file_id = ?1 AND is_current = 1",
                params![file_id],
                ReceiptRow::from_row,
            )
            .optional()?)
    })
}

/// Current receipts of a profile, optionally bounded by date (inclusive),
/// ordered by transaction date.
pub fn list_current(
    db: &Database,
    profile_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<ReceiptRow>, DatabaseError> {
    let from = from.map(|d| d.format("%Y-%m-%d").to_string());
    let to = to.map(|d| d.format("%Y-%m-%d").to_string());
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM receipts
             WHERE profile_id = ?1 AND is_current = 1
               AND (?2 IS NULL OR tx_date >= ?2)
               AND (?3 IS NULL OR tx_date <= ?3)
             ORDER BY tx_date ASC, created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![profile_id, from, to], ReceiptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Every version extracted from a file, oldest first.
pub fn list_versions_by_file(db: &Database, file_id: &str) -> Result<Vec<ReceiptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM receipts WHERE file_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![file_id], ReceiptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
