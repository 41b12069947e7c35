use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{newest_first, FieldBag, RecordType, RemoteKey, SyncableEntity};

/// Wire names of the thirteen amount fields, in legacy column order.
pub const ASSET_AMOUNT_FIELDS: [&str; 13] = [
    "cash",
    "usStock",
    "regularInvestment",
    "otherInvestment",
    "bonds",
    "structuredProducts",
    "twStock",
    "twStockConverted",
    "confirmedInterest",
    "deposit",
    "usStockCost",
    "regularInvestmentCost",
    "bondsCost",
];

/// Month-end snapshot of one client's holdings and cost basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAssetRecord {
    pub id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub cash: Decimal,
    pub us_stock: Decimal,
    pub regular_investment: Decimal,
    pub other_investment: Decimal,
    pub bonds: Decimal,
    pub structured_products: Decimal,
    pub tw_stock: Decimal,
    pub tw_stock_converted: Decimal,
    pub confirmed_interest: Decimal,
    pub deposit: Decimal,
    pub us_stock_cost: Decimal,
    pub regular_investment_cost: Decimal,
    pub bonds_cost: Decimal,
    pub notes: String,
}

impl MonthlyAssetRecord {
    /// Empty snapshot for `client_id` dated `date`.
    pub fn new(client_id: Uuid, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            date,
            created_at: Utc::now(),
            cash: Decimal::ZERO,
            us_stock: Decimal::ZERO,
            regular_investment: Decimal::ZERO,
            other_investment: Decimal::ZERO,
            bonds: Decimal::ZERO,
            structured_products: Decimal::ZERO,
            tw_stock: Decimal::ZERO,
            tw_stock_converted: Decimal::ZERO,
            confirmed_interest: Decimal::ZERO,
            deposit: Decimal::ZERO,
            us_stock_cost: Decimal::ZERO,
            regular_investment_cost: Decimal::ZERO,
            bonds_cost: Decimal::ZERO,
            notes: String::new(),
        }
    }

    /// Amounts in `ASSET_AMOUNT_FIELDS` order.
    pub fn amounts(&self) -> [Decimal; 13] {
        [
            self.cash,
            self.us_stock,
            self.regular_investment,
            self.other_investment,
            self.bonds,
            self.structured_products,
            self.tw_stock,
            self.tw_stock_converted,
            self.confirmed_interest,
            self.deposit,
            self.us_stock_cost,
            self.regular_investment_cost,
            self.bonds_cost,
        ]
    }

    /// Assigns amounts in `ASSET_AMOUNT_FIELDS` order.
    pub fn set_amounts(&mut self, amounts: [Decimal; 13]) {
        let [cash, us_stock, regular_investment, other_investment, bonds, structured_products, tw_stock, tw_stock_converted, confirmed_interest, deposit, us_stock_cost, regular_investment_cost, bonds_cost] =
            amounts;
        self.cash = cash;
        self.us_stock = us_stock;
        self.regular_investment = regular_investment;
        self.other_investment = other_investment;
        self.bonds = bonds;
        self.structured_products = structured_products;
        self.tw_stock = tw_stock;
        self.tw_stock_converted = tw_stock_converted;
        self.confirmed_interest = confirmed_interest;
        self.deposit = deposit;
        self.us_stock_cost = us_stock_cost;
        self.regular_investment_cost = regular_investment_cost;
        self.bonds_cost = bonds_cost;
    }
}

impl SyncableEntity for MonthlyAssetRecord {
    const RECORD_TYPE: RecordType = RecordType::MonthlyAssetRecord;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_fields(&self) -> FieldBag {
        let mut fields = FieldBag::new()
            .with_text("clientId", self.client_id.to_string())
            .with_date("date", self.date)
            .with_timestamp("createdAt", self.created_at)
            .with_text("notes", self.notes.clone());
        for (name, amount) in ASSET_AMOUNT_FIELDS.iter().zip(self.amounts()) {
            fields = fields.with_number(name, amount);
        }
        fields
    }

    fn from_fields(remote_key: &RemoteKey, fields: &FieldBag) -> Option<Self> {
        let mut amounts = [Decimal::ZERO; 13];
        for (slot, name) in amounts.iter_mut().zip(ASSET_AMOUNT_FIELDS) {
            *slot = fields.number(name)?;
        }

        let mut record = Self {
            id: remote_key.to_id()?,
            client_id: Uuid::parse_str(fields.text("clientId")?).ok()?,
            date: fields.date("date")?,
            created_at: fields.timestamp("createdAt")?,
            notes: fields.text_or_empty("notes")?,
            ..Self::new(Uuid::nil(), NaiveDate::MIN)
        };
        record.set_amounts(amounts);
        Some(record)
    }

    fn order(&self, other: &Self) -> Ordering {
        newest_first((self.date, self.id), (other.date, other.id))
    }
}
