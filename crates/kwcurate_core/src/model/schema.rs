//! Keyword field schema.
//!
//! # Responsibility
//! - Declare the ordered column set shared by grid, clipboard and bulk edits.
//! - Validate and parse typed field values against their declared kind.
//!
//! # Invariants
//! - Column order is stable; clipboard payloads depend on it.
//! - Only `editable` fields may be changed by bulk field updates.

use crate::model::record::{FieldValue, Record};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Pseudo-column holding `Record::keyword`.
pub const KEYWORD_COLUMN: &str = "keyword";
/// Field written by status toggles.
pub const STATUS_FIELD: &str = "status";

pub const CRITERION_TYPES: &[&str] = &["Phrase", "Broad", "Exact"];
pub const STATUS_VALUES: &[&str] = &["Enabled", "Paused"];
pub const INTENT_TYPES: &[&str] = &["Commercial", "Informational", "Navigational", "Transactional"];

/// Default bid assigned to keywords added from plain text.
pub const DEFAULT_MAX_CPC: f64 = 3.61;

/// Declared kind of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Flag,
    /// Text restricted to a closed set of values.
    Choice(&'static [&'static str]),
}

/// One schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub editable: bool,
}

const fn field(name: &'static str, kind: FieldKind, editable: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        editable,
    }
}

const KEYWORD_FIELDS: &[FieldSpec] = &[
    field("criterion_type", FieldKind::Choice(CRITERION_TYPES), true),
    field("max_cpc", FieldKind::Number, true),
    field("max_cpm", FieldKind::Number, false),
    field(STATUS_FIELD, FieldKind::Choice(STATUS_VALUES), false),
    field("comment", FieldKind::Text, true),
    field("has_ads", FieldKind::Flag, false),
    field("has_school_sites", FieldKind::Flag, false),
    field("has_google_maps", FieldKind::Flag, false),
    field("has_our_site", FieldKind::Flag, false),
    field("intent_type", FieldKind::Choice(INTENT_TYPES), true),
    field("recommendation", FieldKind::Text, true),
    field("avg_monthly_searches", FieldKind::Number, false),
    field("three_month_change", FieldKind::Number, false),
    field("yearly_change", FieldKind::Number, false),
    field("competition", FieldKind::Text, false),
    field("competition_percent", FieldKind::Number, false),
    field("min_top_of_page_bid", FieldKind::Number, false),
    field("max_top_of_page_bid", FieldKind::Number, false),
    field("ad_impression_share", FieldKind::Number, false),
    field("organic_average_position", FieldKind::Number, false),
    field("organic_impression_share", FieldKind::Number, false),
    field("labels", FieldKind::Text, false),
];

/// Errors raised when a value does not fit the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    UnknownField(String),
    ReadOnlyField(String),
    KindMismatch {
        field: String,
        expected: &'static str,
    },
    InvalidChoice {
        field: String,
        value: String,
    },
    Unparseable {
        field: String,
        raw: String,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(name) => write!(f, "unknown field `{name}`"),
            Self::ReadOnlyField(name) => write!(f, "field `{name}` cannot be bulk-edited"),
            Self::KindMismatch { field, expected } => {
                write!(f, "field `{field}` expects a {expected} value")
            }
            Self::InvalidChoice { field, value } => {
                write!(f, "`{value}` is not an allowed value for `{field}`")
            }
            Self::Unparseable { field, raw } => {
                write!(f, "cannot parse `{raw}` for field `{field}`")
            }
        }
    }
}

impl Error for SchemaError {}

/// Ordered field schema of keyword records.
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    fields: &'static [FieldSpec],
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::keywords()
    }
}

impl FieldSchema {
    /// The keyword column set of the curation grid.
    pub fn keywords() -> Self {
        Self {
            fields: KEYWORD_FIELDS,
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    /// Number of clipboard columns, including the keyword column.
    pub fn column_count(&self) -> usize {
        self.fields.len() + 1
    }

    pub fn spec(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// Checks that `value` may be written to `name` by a bulk edit.
    pub fn check_editable(&self, name: &str, value: Option<&FieldValue>) -> Result<(), SchemaError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
        if !spec.editable {
            return Err(SchemaError::ReadOnlyField(name.to_string()));
        }
        match value {
            Some(value) => check_kind(spec, value),
            None => Ok(()),
        }
    }

    /// Checks a value against its declared kind, ignoring editability.
    pub fn check_value(&self, name: &str, value: &FieldValue) -> Result<(), SchemaError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
        check_kind(spec, value)
    }

    /// Fields assigned to keywords created from plain text.
    pub fn text_import_defaults(&self) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert("criterion_type".to_string(), FieldValue::text("Phrase"));
        fields.insert(STATUS_FIELD.to_string(), FieldValue::text("Enabled"));
        fields.insert("max_cpc".to_string(), FieldValue::Number(DEFAULT_MAX_CPC));
        fields
    }

    /// Projects one record onto the ordered column list.
    ///
    /// `None` marks a missing field.
    pub fn row_of(&self, record: &Record) -> Vec<Option<String>> {
        let mut row = Vec::with_capacity(self.column_count());
        row.push(Some(record.keyword.clone()));
        for spec in self.fields {
            row.push(record.field(spec.name).map(FieldValue::render));
        }
        row
    }

    /// Parses an ordered column list back into keyword text and typed fields.
    ///
    /// Missing trailing columns are treated as missing fields.
    pub fn parse_row(
        &self,
        row: &[Option<String>],
    ) -> Result<(String, BTreeMap<String, FieldValue>), SchemaError> {
        let keyword = row
            .first()
            .and_then(|cell| cell.clone())
            .ok_or_else(|| SchemaError::Unparseable {
                field: KEYWORD_COLUMN.to_string(),
                raw: String::new(),
            })?;

        let mut fields = BTreeMap::new();
        for (spec, cell) in self.fields.iter().zip(row.iter().skip(1)) {
            if let Some(raw) = cell {
                fields.insert(spec.name.to_string(), parse_value(spec, raw)?);
            }
        }
        Ok((keyword, fields))
    }
}

/// Parses one rendered value according to the declared field kind.
pub fn parse_value(spec: &FieldSpec, raw: &str) -> Result<FieldValue, SchemaError> {
    let unparseable = || SchemaError::Unparseable {
        field: spec.name.to_string(),
        raw: raw.to_string(),
    };
    match spec.kind {
        FieldKind::Text => Ok(FieldValue::text(raw)),
        FieldKind::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(FieldValue::Number)
            .ok_or_else(unparseable),
        FieldKind::Flag => match raw {
            "true" => Ok(FieldValue::Flag(true)),
            "false" => Ok(FieldValue::Flag(false)),
            _ => Err(unparseable()),
        },
        FieldKind::Choice(allowed) => {
            if allowed.contains(&raw) {
                Ok(FieldValue::text(raw))
            } else {
                Err(SchemaError::InvalidChoice {
                    field: spec.name.to_string(),
                    value: raw.to_string(),
                })
            }
        }
    }
}

fn check_kind(spec: &FieldSpec, value: &FieldValue) -> Result<(), SchemaError> {
    let mismatch = |expected| SchemaError::KindMismatch {
        field: spec.name.to_string(),
        expected,
    };
    match (spec.kind, value) {
        (FieldKind::Text, FieldValue::Text(_)) => Ok(()),
        (FieldKind::Number, FieldValue::Number(number)) if number.is_finite() => Ok(()),
        (FieldKind::Flag, FieldValue::Flag(_)) => Ok(()),
        (FieldKind::Choice(allowed), FieldValue::Text(text)) => {
            if allowed.contains(&text.as_str()) {
                Ok(())
            } else {
                Err(SchemaError::InvalidChoice {
                    field: spec.name.to_string(),
                    value: text.clone(),
                })
            }
        }
        (FieldKind::Text, _) => Err(mismatch("text")),
        (FieldKind::Number, _) => Err(mismatch("number")),
        (FieldKind::Flag, _) => Err(mismatch("flag")),
        (FieldKind::Choice(_), _) => Err(mismatch("choice")),
    }
}
