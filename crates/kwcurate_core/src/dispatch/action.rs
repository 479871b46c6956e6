//! Closed set of bulk actions.

use crate::model::record::FieldValue;
use serde::{Deserialize, Serialize};

/// Parameters of one enrichment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichParams {
    /// Number of SERP results requested per keyword.
    pub depth: u32,
    pub location_code: u32,
    pub language_code: String,
    pub device: String,
    pub os: String,
    /// Exclude records already carrying an enrichment marker.
    pub skip_enriched: bool,
}

impl Default for EnrichParams {
    fn default() -> Self {
        Self {
            depth: 10,
            location_code: 2804,
            language_code: "ru".to_string(),
            device: "desktop".to_string(),
            os: "windows".to_string(),
            skip_enriched: false,
        }
    }
}

/// One bulk action over a resolved selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BulkAction {
    /// Moves targets into trash.
    Delete,
    /// Writes (or clears) one editable field.
    SetField {
        field: String,
        value: Option<FieldValue>,
    },
    SetStatus { status: String },
    Enrich(EnrichParams),
}

/// Payload-free discriminant, used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Delete,
    SetField,
    SetStatus,
    Enrich,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::SetField => "set_field",
            Self::SetStatus => "set_status",
            Self::Enrich => "enrich",
        }
    }
}

impl BulkAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Delete => ActionKind::Delete,
            Self::SetField { .. } => ActionKind::SetField,
            Self::SetStatus { .. } => ActionKind::SetStatus,
            Self::Enrich(_) => ActionKind::Enrich,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BulkAction, EnrichParams};
    use crate::model::record::FieldValue;

    #[test]
    fn actions_serialize_with_kind_tag() {
        let action = BulkAction::SetField {
            field: "max_cpc".to_string(),
            value: Some(FieldValue::Number(1.25)),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "set_field");
        assert_eq!(json["value"]["number"], 1.25);

        let enrich = serde_json::to_value(BulkAction::Enrich(EnrichParams::default())).unwrap();
        assert_eq!(enrich["kind"], "enrich");
        assert_eq!(enrich["depth"], 10);
    }
}
