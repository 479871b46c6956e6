//! Clipboard transport for records.
//!
//! # Responsibility
//! - Serialize keyword lists or full records into one flat string and parse
//!   it back, so selections can be pasted into another group.
//! - Keep the delimiter choice behind one swappable interface.

mod comma_space;

pub use comma_space::{CommaSpaceCodec, FIELD_DELIMITER, MISSING_PLACEHOLDER, RECORD_DELIMITER};

use crate::model::record::{FieldValue, Record};
use crate::model::schema::SchemaError;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// What a clipboard payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Keyword text only.
    #[default]
    KeywordsOnly,
    /// Keyword plus every schema field, in schema order.
    FullRecords,
}

/// Raw decode result, before schema typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Keywords(Vec<String>),
    /// One cell list per record; `None` marks a missing field.
    Rows(Vec<Vec<Option<String>>>),
}

/// One typed record parsed from a payload, not yet assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRow {
    pub keyword: String,
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    BlankKeyword { row: usize },
    Schema { row: usize, source: SchemaError },
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankKeyword { row } => write!(f, "clipboard row {row} has no keyword"),
            Self::Schema { row, source } => write!(f, "clipboard row {row}: {source}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BlankKeyword { .. } => None,
            Self::Schema { source, .. } => Some(source),
        }
    }
}

/// Clipboard encoder/decoder.
pub trait ClipboardCodec: Send + Sync {
    fn encode(&self, records: &[Record], mode: CopyMode) -> String;
    fn decode(&self, text: &str, mode: CopyMode) -> Result<Decoded, CodecError>;
    /// Decodes and types a payload against the field schema.
    fn decode_rows(&self, text: &str, mode: CopyMode) -> Result<Vec<ImportedRow>, CodecError>;
}
