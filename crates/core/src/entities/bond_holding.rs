use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{newest_first, FieldBag, RecordType, RemoteKey, SyncableEntity};

/// A bond position held by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondHolding {
    pub id: Uuid,
    pub client_id: Uuid,
    pub purchase_date: NaiveDate,
    pub bond_name: String,
    pub currency: String,
    pub coupon_rate: Decimal,
    pub yield_rate: Decimal,
    pub purchase_price: Decimal,
    pub purchase_amount: Decimal,
    pub holding_face_value: Decimal,
    pub trade_amount: Decimal,
    pub current_value: Decimal,
    pub received_interest: Decimal,
    pub per_payment_interest: Decimal,
    pub exchange_rate: Decimal,
    /// Coupon months (1-12), ascending and unique.
    pub dividend_months: Vec<u32>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl BondHolding {
    pub fn new(client_id: Uuid, purchase_date: NaiveDate, bond_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            purchase_date,
            bond_name: bond_name.into(),
            currency: "USD".to_string(),
            coupon_rate: Decimal::ZERO,
            yield_rate: Decimal::ZERO,
            purchase_price: Decimal::ZERO,
            purchase_amount: Decimal::ZERO,
            holding_face_value: Decimal::ZERO,
            trade_amount: Decimal::ZERO,
            current_value: Decimal::ZERO,
            received_interest: Decimal::ZERO,
            per_payment_interest: Decimal::ZERO,
            exchange_rate: Decimal::ONE,
            dividend_months: Vec::new(),
            notes: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Parses "1,7" / "1/7" / "1 7" into sorted unique months, dropping anything outside 1-12.
pub fn parse_dividend_months(raw: &str) -> Vec<u32> {
    let mut months: Vec<u32> = raw
        .split(|c: char| c == ',' || c == '/' || c == '、' || c.is_whitespace())
        .filter_map(|part| part.trim().trim_end_matches('月').parse::<u32>().ok())
        .filter(|month| (1..=12).contains(month))
        .collect();
    months.sort_unstable();
    months.dedup();
    months
}

pub fn format_dividend_months(months: &[u32]) -> String {
    months
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl SyncableEntity for BondHolding {
    const RECORD_TYPE: RecordType = RecordType::BondHolding;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_fields(&self) -> FieldBag {
        FieldBag::new()
            .with_text("clientId", self.client_id.to_string())
            .with_date("purchaseDate", self.purchase_date)
            .with_text("bondName", self.bond_name.clone())
            .with_text("currency", self.currency.clone())
            .with_number("couponRate", self.coupon_rate)
            .with_number("yieldRate", self.yield_rate)
            .with_number("purchasePrice", self.purchase_price)
            .with_number("purchaseAmount", self.purchase_amount)
            .with_number("holdingFaceValue", self.holding_face_value)
            .with_number("tradeAmount", self.trade_amount)
            .with_number("currentValue", self.current_value)
            .with_number("receivedInterest", self.received_interest)
            .with_number("perPaymentInterest", self.per_payment_interest)
            .with_number("exchangeRate", self.exchange_rate)
            .with_text(
                "dividendMonths",
                format_dividend_months(&self.dividend_months),
            )
            .with_text("notes", self.notes.clone())
            .with_timestamp("createdAt", self.created_at)
    }

    fn from_fields(remote_key: &RemoteKey, fields: &FieldBag) -> Option<Self> {
        Some(Self {
            id: remote_key.to_id()?,
            client_id: Uuid::parse_str(fields.text("clientId")?).ok()?,
            purchase_date: fields.date("purchaseDate")?,
            bond_name: fields.text_or_empty("bondName")?,
            currency: fields.text_or_empty("currency")?,
            coupon_rate: fields.number("couponRate")?,
            yield_rate: fields.number("yieldRate")?,
            purchase_price: fields.number("purchasePrice")?,
            purchase_amount: fields.number("purchaseAmount")?,
            holding_face_value: fields.number("holdingFaceValue")?,
            trade_amount: fields.number("tradeAmount")?,
            current_value: fields.number("currentValue")?,
            received_interest: fields.number("receivedInterest")?,
            per_payment_interest: fields.number("perPaymentInterest")?,
            exchange_rate: fields.number("exchangeRate")?,
            dividend_months: parse_dividend_months(&fields.text_or_empty("dividendMonths")?),
            notes: fields.text_or_empty("notes")?,
            created_at: fields.timestamp("createdAt")?,
        })
    }

    fn order(&self, other: &Self) -> Ordering {
        newest_first(
            (self.purchase_date, self.id),
            (other.purchase_date, other.id),
        )
    }
}
