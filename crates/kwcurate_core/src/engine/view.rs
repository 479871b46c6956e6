//! Sort and filter settings for the main record view.
//!
//! # Invariants
//! - Trashed records never appear in the main view.
//! - Sorting is total: ties are broken by ascending id.
//! - Missing field values sort last in both directions.

use crate::model::record::{FieldValue, Record, RecordId};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Keyword,
    /// Any schema field, by name.
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Descending,
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = match &self.column {
            SortColumn::Id => self.direction.apply(a.id.cmp(&b.id)),
            SortColumn::Keyword => self
                .direction
                .apply(compare_text(a.keyword.as_str(), b.keyword.as_str())),
            SortColumn::Field(name) => match (a.field(name), b.field(name)) {
                (Some(left), Some(right)) => self.direction.apply(compare_values(left, right)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Row filter. An empty filter matches every active record.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    keyword_pattern: Option<Regex>,
    equals: Vec<(String, FieldValue)>,
    only_new: bool,
}

impl RecordFilter {
    /// Keeps records whose keyword matches `pattern`, case-insensitively.
    pub fn keyword_matching(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.keyword_pattern = Some(RegexBuilder::new(pattern).case_insensitive(true).build()?);
        Ok(self)
    }

    pub fn field_equals(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.equals.push((field.into(), value));
        self
    }

    pub fn only_new(mut self, only_new: bool) -> Self {
        self.only_new = only_new;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keyword_pattern.is_none() && self.equals.is_empty() && !self.only_new
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !record.is_active() {
            return false;
        }
        if self.only_new && !record.is_new() {
            return false;
        }
        if let Some(pattern) = &self.keyword_pattern {
            if !pattern.is_match(&record.keyword) {
                return false;
            }
        }
        self.equals
            .iter()
            .all(|(field, value)| record.field(field) == Some(value))
    }
}

/// What the operator currently sees: one filter plus an optional sort.
#[derive(Debug, Clone, Default)]
pub struct ViewSpec {
    pub sort: Option<SortKey>,
    pub filter: RecordFilter,
}

impl ViewSpec {
    pub fn sorted(sort: SortKey) -> Self {
        Self {
            sort: Some(sort),
            filter: RecordFilter::default(),
        }
    }

    pub fn filtered(filter: RecordFilter) -> Self {
        Self { sort: None, filter }
    }

    /// Visible ids in display order. Without a sort, group order is kept.
    pub fn arrange(&self, records: &[Record]) -> Vec<RecordId> {
        let mut visible: Vec<&Record> = records
            .iter()
            .filter(|record| self.filter.matches(record))
            .collect();
        if let Some(sort) = &self.sort {
            visible.sort_by(|a, b| sort.compare(a, b));
        }
        visible.into_iter().map(|record| record.id).collect()
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Number(left), FieldValue::Number(right)) => {
            left.partial_cmp(right).unwrap_or(Ordering::Equal)
        }
        (FieldValue::Text(left), FieldValue::Text(right)) => compare_text(left, right),
        (FieldValue::Flag(left), FieldValue::Flag(right)) => left.cmp(right),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn kind_rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Number(_) => 0,
        FieldValue::Text(_) => 1,
        FieldValue::Flag(_) => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordFilter, SortColumn, SortKey, ViewSpec};
    use crate::model::record::{BatchTag, FieldValue, Record};

    fn records() -> Vec<Record> {
        vec![
            Record::new(1, "buy shoes").with_field("max_cpc", FieldValue::Number(2.0)),
            Record::new(2, "Apple pie"),
            Record::new(3, "cheap shoes").with_field("max_cpc", FieldValue::Number(0.5)),
        ]
    }

    #[test]
    fn default_view_keeps_group_order() {
        assert_eq!(ViewSpec::default().arrange(&records()), vec![1, 2, 3]);
    }

    #[test]
    fn keyword_sort_is_case_insensitive() {
        let view = ViewSpec::sorted(SortKey::ascending(SortColumn::Keyword));
        assert_eq!(view.arrange(&records()), vec![2, 1, 3]);
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let field = SortColumn::Field("max_cpc".to_string());
        let ascending = ViewSpec::sorted(SortKey::ascending(field.clone()));
        let descending = ViewSpec::sorted(SortKey::descending(field));

        assert_eq!(ascending.arrange(&records()), vec![3, 1, 2]);
        assert_eq!(descending.arrange(&records()), vec![1, 3, 2]);
    }

    #[test]
    fn filter_excludes_trashed_and_matches_pattern() {
        let mut rows = records();
        rows[0].soft_delete(10);
        let view = ViewSpec::filtered(
            RecordFilter::default()
                .keyword_matching("SHOES")
                .unwrap(),
        );
        assert_eq!(view.arrange(&rows), vec![3]);
    }

    #[test]
    fn only_new_filter_keeps_staged_records() {
        let mut rows = records();
        rows[1].stage(BatchTag::generate());
        let view = ViewSpec::filtered(RecordFilter::default().only_new(true));
        assert_eq!(view.arrange(&rows), vec![2]);
    }
}
