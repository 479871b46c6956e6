//! `", "`-joined records with `" "`-joined fields.
//!
//! Only the keyword column may contain spaces: in full mode any tokens beyond
//! the column count are folded back into the keyword. Values containing
//! `", "` or equal to the placeholder do not survive a round trip.
//!
//! Both modes split records the same way and keep keyword text verbatim,
//! surrounding spaces included; only blank chunks are dropped.

use crate::codec::{ClipboardCodec, CodecError, CopyMode, Decoded, ImportedRow};
use crate::model::record::Record;
use crate::model::schema::FieldSchema;
use std::collections::BTreeMap;

pub const RECORD_DELIMITER: &str = ", ";
pub const FIELD_DELIMITER: &str = " ";
/// Rendered in place of a missing field.
pub const MISSING_PLACEHOLDER: &str = "None";

#[derive(Debug, Clone, Copy, Default)]
pub struct CommaSpaceCodec {
    schema: FieldSchema,
}

impl CommaSpaceCodec {
    pub fn new(schema: FieldSchema) -> Self {
        Self { schema }
    }

    pub fn encode_keywords_only(&self, records: &[Record]) -> String {
        records
            .iter()
            .map(|record| record.keyword.as_str())
            .collect::<Vec<_>>()
            .join(RECORD_DELIMITER)
    }

    pub fn encode_full_records(&self, records: &[Record]) -> String {
        records
            .iter()
            .map(|record| {
                self.schema
                    .row_of(record)
                    .into_iter()
                    .map(|cell| cell.unwrap_or_else(|| MISSING_PLACEHOLDER.to_string()))
                    .collect::<Vec<_>>()
                    .join(FIELD_DELIMITER)
            })
            .collect::<Vec<_>>()
            .join(RECORD_DELIMITER)
    }

    fn split_records(text: &str) -> impl Iterator<Item = &str> {
        text.trim_matches(|ch: char| ch == '\n' || ch == '\r')
            .split(RECORD_DELIMITER)
            .filter(|chunk| !chunk.trim().is_empty())
    }

    fn split_row(&self, chunk: &str) -> Vec<Option<String>> {
        let tokens: Vec<&str> = chunk.split(FIELD_DELIMITER).collect();
        let field_count = self.schema.fields().len();
        let keyword_len = if tokens.len() > field_count {
            tokens.len() - field_count
        } else {
            1
        };

        let mut row = Vec::with_capacity(self.schema.column_count());
        row.push(Some(tokens[..keyword_len].join(FIELD_DELIMITER)));
        for token in &tokens[keyword_len..] {
            row.push(if *token == MISSING_PLACEHOLDER {
                None
            } else {
                Some((*token).to_string())
            });
        }
        row
    }
}

impl ClipboardCodec for CommaSpaceCodec {
    fn encode(&self, records: &[Record], mode: CopyMode) -> String {
        match mode {
            CopyMode::KeywordsOnly => self.encode_keywords_only(records),
            CopyMode::FullRecords => self.encode_full_records(records),
        }
    }

    fn decode(&self, text: &str, mode: CopyMode) -> Result<Decoded, CodecError> {
        match mode {
            CopyMode::KeywordsOnly => Ok(Decoded::Keywords(
                Self::split_records(text).map(str::to_string).collect(),
            )),
            CopyMode::FullRecords => Ok(Decoded::Rows(
                Self::split_records(text)
                    .map(|chunk| self.split_row(chunk))
                    .collect(),
            )),
        }
    }

    fn decode_rows(&self, text: &str, mode: CopyMode) -> Result<Vec<ImportedRow>, CodecError> {
        match self.decode(text, mode)? {
            Decoded::Keywords(keywords) => Ok(keywords
                .into_iter()
                .map(|keyword| ImportedRow {
                    keyword,
                    fields: BTreeMap::new(),
                })
                .collect()),
            Decoded::Rows(rows) => rows
                .iter()
                .enumerate()
                .map(|(row, cells)| {
                    let (keyword, fields) = self
                        .schema
                        .parse_row(cells)
                        .map_err(|source| CodecError::Schema { row, source })?;
                    if keyword.trim().is_empty() {
                        return Err(CodecError::BlankKeyword { row });
                    }
                    Ok(ImportedRow { keyword, fields })
                })
                .collect(),
        }
    }
}
