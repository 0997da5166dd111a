//! Purpose: Decode host rows and flatten them into spreadsheet-ready string cells.
//! Exports: `Row`, `DatasetRow`, `SearchRow`, `SearchValue`, `LinkedRef`, `Scalar`.
//! Role: Tagged row variants sharing one `normalize(columns)` capability.
//! Invariants: Dataset rows keep their positional width; search rows follow declared column order.
//! Invariants: Linked-record lists expand to one cell per reference, empty text when absent.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::report::Column;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn display(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(value) => value.to_string(),
            Scalar::Integer(value) => value.to_string(),
            Scalar::Float(value) => display_float(*value),
            Scalar::Text(value) => value.clone(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

fn display_float(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    value.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// Any list element decodes; non-objects and non-text `text` fields carry no display text.
impl<'de> Deserialize<'de> for LinkedRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Value::Object(mut fields) = Value::deserialize(deserializer)? else {
            return Ok(LinkedRef {
                value: None,
                text: None,
            });
        };
        let value = fields
            .remove("value")
            .and_then(|value| serde_json::from_value(value).ok());
        let text = match fields.remove("text") {
            Some(Value::String(text)) => Some(text),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        };
        Ok(LinkedRef { value, text })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchValue {
    Refs(Vec<LinkedRef>),
    Scalar(Scalar),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub values: Vec<Scalar>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    pub values: BTreeMap<String, SearchValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Row {
    Dataset(DatasetRow),
    Search(SearchRow),
}

impl Row {
    pub fn normalize(&self, columns: &[Column]) -> Vec<String> {
        match self {
            Row::Dataset(row) => row.values.iter().map(Scalar::display).collect(),
            Row::Search(row) => {
                let mut cells = Vec::with_capacity(columns.len());
                for column in columns {
                    match row.values.get(&column.key) {
                        Some(SearchValue::Scalar(value)) => cells.push(value.display()),
                        Some(SearchValue::Refs(refs)) => cells.extend(
                            refs.iter()
                                .map(|item| item.text.clone().unwrap_or_default()),
                        ),
                        None => cells.push(String::new()),
                    }
                }
                cells
            }
        }
    }
}
