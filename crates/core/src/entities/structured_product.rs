use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{newest_first, FieldBag, FieldValue, RecordType, RemoteKey, SyncableEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Ongoing,
    Exited,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Ongoing => "ongoing",
            ProductStatus::Exited => "exited",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ongoing" => Some(ProductStatus::Ongoing),
            "exited" => Some(ProductStatus::Exited),
            _ => None,
        }
    }
}

/// Fields recorded once a product has been called, knocked out or matured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductExit {
    pub exit_date: NaiveDate,
    pub holding_months: Option<i64>,
    pub actual_return: Option<Decimal>,
}

/// Structured note (autocallable / reverse convertible) held by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredProduct {
    pub id: Uuid,
    pub client_id: Uuid,
    pub trade_date: NaiveDate,
    pub execution_date: NaiveDate,
    pub latest_evaluation_date: Option<NaiveDate>,
    /// Underlying tickers as entered, e.g. "NVDA / TSLA".
    pub underlying: String,
    pub ko_barrier: Decimal,
    pub put_strike: Decimal,
    pub ki_barrier: Decimal,
    pub yield_rate: Decimal,
    pub trade_amount: Decimal,
    pub currency: String,
    pub status: ProductStatus,
    pub exit: Option<ProductExit>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl StructuredProduct {
    pub fn new(
        client_id: Uuid,
        trade_date: NaiveDate,
        execution_date: NaiveDate,
        underlying: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            trade_date,
            execution_date,
            latest_evaluation_date: None,
            underlying: underlying.into(),
            ko_barrier: Decimal::ZERO,
            put_strike: Decimal::ZERO,
            ki_barrier: Decimal::ZERO,
            yield_rate: Decimal::ZERO,
            trade_amount: Decimal::ZERO,
            currency: "USD".to_string(),
            status: ProductStatus::Ongoing,
            exit: None,
            notes: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Marks the product exited with the given outcome.
    pub fn mark_exited(&mut self, exit: ProductExit) {
        self.status = ProductStatus::Exited;
        self.exit = Some(exit);
    }
}

impl SyncableEntity for StructuredProduct {
    const RECORD_TYPE: RecordType = RecordType::StructuredProduct;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_fields(&self) -> FieldBag {
        let exit = self.exit.as_ref();
        FieldBag::new()
            .with_text("clientId", self.client_id.to_string())
            .with_date("tradeDate", self.trade_date)
            .with_date("executionDate", self.execution_date)
            .with_optional(
                "latestEvaluationDate",
                self.latest_evaluation_date.map(FieldValue::Date),
            )
            .with_text("underlying", self.underlying.clone())
            .with_number("koBarrier", self.ko_barrier)
            .with_number("putStrike", self.put_strike)
            .with_number("kiBarrier", self.ki_barrier)
            .with_number("yieldRate", self.yield_rate)
            .with_number("tradeAmount", self.trade_amount)
            .with_text("currency", self.currency.clone())
            .with_text("status", self.status.as_str())
            .with_optional("exitDate", exit.map(|e| FieldValue::Date(e.exit_date)))
            .with_optional(
                "holdingMonths",
                exit.and_then(|e| e.holding_months).map(FieldValue::Integer),
            )
            .with_optional(
                "actualReturn",
                exit.and_then(|e| e.actual_return).map(FieldValue::Number),
            )
            .with_text("notes", self.notes.clone())
            .with_timestamp("createdAt", self.created_at)
    }

    fn from_fields(remote_key: &RemoteKey, fields: &FieldBag) -> Option<Self> {
        let status = ProductStatus::parse(fields.text("status")?)?;
        let exit = match fields.optional_date("exitDate")? {
            Some(exit_date) => Some(ProductExit {
                exit_date,
                holding_months: fields.optional_integer("holdingMonths")?,
                actual_return: fields.optional_number("actualReturn")?,
            }),
            None => None,
        };

        Some(Self {
            id: remote_key.to_id()?,
            client_id: Uuid::parse_str(fields.text("clientId")?).ok()?,
            trade_date: fields.date("tradeDate")?,
            execution_date: fields.date("executionDate")?,
            latest_evaluation_date: fields.optional_date("latestEvaluationDate")?,
            underlying: fields.text_or_empty("underlying")?,
            ko_barrier: fields.number("koBarrier")?,
            put_strike: fields.number("putStrike")?,
            ki_barrier: fields.number("kiBarrier")?,
            yield_rate: fields.number("yieldRate")?,
            trade_amount: fields.number("tradeAmount")?,
            currency: fields.text_or_empty("currency")?,
            status,
            exit,
            notes: fields.text_or_empty("notes")?,
            created_at: fields.timestamp("createdAt")?,
        })
    }

    fn order(&self, other: &Self) -> Ordering {
        newest_first((self.trade_date, self.id), (other.trade_date, other.id))
    }
}
