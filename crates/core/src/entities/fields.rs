//! Flat field-bag representation used by the remote record store.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single scalar value stored in a remote record.
///
/// Remote records are flat: no value nests another bag or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    Integer(i64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Bool(bool),
}

/// Ordered map of field name to scalar value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldBag(BTreeMap<String, FieldValue>);

impl FieldBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, name: &str, value: FieldValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    // Builder-style setters used by the per-entity serializers.

    pub fn with_text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, FieldValue::Text(value.into()));
        self
    }

    pub fn with_number(mut self, name: &str, value: Decimal) -> Self {
        self.insert(name, FieldValue::Number(value));
        self
    }

    pub fn with_integer(mut self, name: &str, value: i64) -> Self {
        self.insert(name, FieldValue::Integer(value));
        self
    }

    pub fn with_date(mut self, name: &str, value: NaiveDate) -> Self {
        self.insert(name, FieldValue::Date(value));
        self
    }

    pub fn with_timestamp(mut self, name: &str, value: DateTime<Utc>) -> Self {
        self.insert(name, FieldValue::Timestamp(value));
        self
    }

    /// Sets the field only when a value is present; absent optionals are omitted.
    pub fn with_optional(mut self, name: &str, value: Option<FieldValue>) -> Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    // Typed getters. `None` means the field is missing or has a different type,
    // which callers treat as a malformed record.

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Numeric getter that also accepts integers, since remote writers are free
    /// to send whole amounts without a fractional part.
    pub fn number(&self, name: &str) -> Option<Decimal> {
        match self.get(name)? {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Integer(value) => Some(Decimal::from(*value)),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        match self.get(name)? {
            FieldValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name)? {
            FieldValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Getter for optional fields: missing is `Some(None)`, mistyped is `None`.
    pub fn optional_date(&self, name: &str) -> Option<Option<NaiveDate>> {
        match self.get(name) {
            None => Some(None),
            Some(FieldValue::Date(value)) => Some(Some(*value)),
            Some(_) => None,
        }
    }

    pub fn optional_number(&self, name: &str) -> Option<Option<Decimal>> {
        match self.get(name) {
            None => Some(None),
            Some(FieldValue::Number(value)) => Some(Some(*value)),
            Some(FieldValue::Integer(value)) => Some(Some(Decimal::from(*value))),
            Some(_) => None,
        }
    }

    pub fn optional_integer(&self, name: &str) -> Option<Option<i64>> {
        match self.get(name) {
            None => Some(None),
            Some(FieldValue::Integer(value)) => Some(Some(*value)),
            Some(_) => None,
        }
    }

    /// Text fields that older writers may have left out entirely.
    pub fn text_or_empty(&self, name: &str) -> Option<String> {
        match self.get(name) {
            None => Some(String::new()),
            Some(FieldValue::Text(value)) => Some(value.clone()),
            Some(_) => None,
        }
    }
}

impl FromIterator<(String, FieldValue)> for FieldBag {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn typed_getters_reject_mismatched_types() {
        let bag = FieldBag::new()
            .with_text("name", "Alice")
            .with_number("cash", dec!(12.50));

        assert_eq!(bag.text("name"), Some("Alice"));
        assert_eq!(bag.number("cash"), Some(dec!(12.50)));
        assert_eq!(bag.number("name"), None);
        assert_eq!(bag.date("cash"), None);
        assert_eq!(bag.text("missing"), None);
    }

    #[test]
    fn optional_getters_distinguish_missing_from_mistyped() {
        let bag = FieldBag::new().with_text("exitDate", "soon");

        assert_eq!(bag.optional_date("latestEvaluationDate"), Some(None));
        assert_eq!(bag.optional_date("exitDate"), None);
    }

    #[test]
    fn wire_format_tags_each_value() {
        let bag = FieldBag::new()
            .with_number("cash", dec!(1.25))
            .with_date("date", NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"));

        let json = serde_json::to_value(&bag).expect("serialize bag");
        assert_eq!(
            json,
            serde_json::json!({
                "cash": { "type": "number", "value": "1.25" },
                "date": { "type": "date", "value": "2026-03-01" },
            })
        );
    }
}
