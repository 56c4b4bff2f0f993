use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use derive_setters::Setters;
use serde_json::Value;

/// Extracts a cell value from a row. Resolved once when the schema is built.
pub type Accessor = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnType {
    Text,
    Number,
    Date,
    Currency,
    Status,
    Actions,
}

#[derive(Clone, Setters)]
#[setters(strip_option)]
pub struct ColumnSpec {
    #[setters(skip)]
    pub key: String,
    #[setters(skip)]
    pub label: String,
    #[setters(skip)]
    pub kind: ColumnType,
    pub sortable: bool,
    #[setters(into)]
    pub width: Option<String>,
    #[setters(skip)]
    access: Accessor,
}

impl ColumnSpec {
    /// A column reading `key` from the row. Dotted keys (`cliente.nome`)
    /// address nested objects.
    pub fn new(key: &str, label: &str, kind: ColumnType) -> Self {
        let access: Accessor = if kind == ColumnType::Actions {
            Arc::new(|_row: &Value| Value::Null)
        } else {
            let pointer = json_pointer(key);
            Arc::new(move |row: &Value| row.pointer(&pointer).cloned().unwrap_or(Value::Null))
        };
        Self::with_accessor(key, label, kind, access)
    }

    pub fn with_accessor(key: &str, label: &str, kind: ColumnType, access: Accessor) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind,
            sortable: false,
            width: None,
            access,
        }
    }

    pub fn value(&self, row: &Value) -> Value {
        (self.access)(row)
    }

    /// Minimum terminal width derived from the width hint. Hints are given
    /// in `px` (8px per character cell) or `ch`.
    pub fn min_width(&self) -> usize {
        let Some(hint) = self.width.as_deref().map(str::trim) else {
            return 0;
        };
        if let Some(px) = hint.strip_suffix("px") {
            px.trim().parse::<usize>().map(|px| px.div_ceil(8)).unwrap_or(0)
        } else if let Some(ch) = hint.strip_suffix("ch") {
            ch.trim().parse().unwrap_or(0)
        } else {
            0
        }
    }
}

impl fmt::Debug for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("sortable", &self.sortable)
            .field("width", &self.width)
            .finish()
    }
}

fn json_pointer(key: &str) -> String {
    key.split('.')
        .map(|part| format!("/{}", part.replace('~', "~0").replace('/', "~1")))
        .collect()
}

pub fn column_keys(schema: &[ColumnSpec]) -> Vec<String> {
    schema.iter().map(|c| c.key.clone()).collect()
}

/// Keeps the keys of `available` that also appear in `persisted`.
/// The result follows the order of `available`, unknown keys are dropped.
pub fn reconcile(persisted: &[String], available: &[String]) -> Vec<String> {
    available
        .iter()
        .filter(|key| persisted.contains(key))
        .cloned()
        .collect()
}

/// Like [`reconcile`] but never returns an empty list.
pub fn visible_or_default(
    persisted: &[String],
    available: &[String],
    defaults: &[String],
) -> Vec<String> {
    let visible = reconcile(persisted, available);
    if visible.is_empty() {
        defaults.to_vec()
    } else {
        visible
    }
}

/// Turns a cell into the text shown in the table.
pub trait CellRenderer: Sync {
    fn render(&self, row: &Value, column: &ColumnSpec) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRenderer;

impl CellRenderer for DefaultRenderer {
    fn render(&self, row: &Value, column: &ColumnSpec) -> String {
        let value = column.value(row);
        let text = match column.kind {
            ColumnType::Actions => return "▸".to_string(),
            _ if value.is_null() => return String::from("∅"),
            ColumnType::Text | ColumnType::Number => plain(&value),
            ColumnType::Date => format_date(&value),
            ColumnType::Currency => format_currency(&value),
            ColumnType::Status => format_status(&value),
        };
        text.replace("\r\n", " ↵ ").replace('\n', " ↵ ")
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_date(value: &Value) -> String {
    let raw = plain(value);
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return ts.format("%d/%m/%Y").to_string();
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        return ts.format("%d/%m/%Y").to_string();
    }
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(date) => date.format("%d/%m/%Y").to_string(),
        Err(_) => raw,
    }
}

fn format_currency(value: &Value) -> String {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(amount) = amount else {
        return plain(value);
    };

    let cents = (amount.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}R$ {grouped},{:02}", cents % 100)
}

fn format_status(value: &Value) -> String {
    match value {
        Value::Bool(true) => "Ativo".to_string(),
        Value::Bool(false) => "Inativo".to_string(),
        other => {
            let text = plain(other).replace('_', " ");
            let mut chars = text.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => text,
            }
        }
    }
}
