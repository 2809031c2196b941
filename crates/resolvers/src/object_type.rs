//! Object types that workflow definitions can bind to, and the fields of
//! each that approval actions may target.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowObjectType {
    Control,
    Evidence,
    InternalPolicy,
    Procedure,
    Risk,
    Task,
    Program,
    Finding,
    Asset,
    Narrative,
    ActionPlan,
}

impl WorkflowObjectType {
    pub const ALL: [WorkflowObjectType; 11] = [
        Self::Control,
        Self::Evidence,
        Self::InternalPolicy,
        Self::Procedure,
        Self::Risk,
        Self::Task,
        Self::Program,
        Self::Finding,
        Self::Asset,
        Self::Narrative,
        Self::ActionPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control        => "Control",
            Self::Evidence       => "Evidence",
            Self::InternalPolicy => "InternalPolicy",
            Self::Procedure      => "Procedure",
            Self::Risk           => "Risk",
            Self::Task           => "Task",
            Self::Program        => "Program",
            Self::Finding        => "Finding",
            Self::Asset          => "Asset",
            Self::Narrative      => "Narrative",
            Self::ActionPlan     => "ActionPlan",
        }
    }

    /// Case-insensitive lookup; `None` for anything outside the catalog.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value))
    }

    /// Fields approval actions on this object type may target.
    pub fn eligible_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Control | Self::Procedure | Self::InternalPolicy | Self::Narrative => &[
                "status",
                "category",
                "subcategory",
                "description",
                "details",
                "approver_id",
                "delegate_id",
                "review_due",
            ],
            Self::Evidence => &["status", "description", "collection_procedure", "renewal_date"],
            Self::Risk => &[
                "status",
                "category",
                "risk_type",
                "impact",
                "likelihood",
                "score",
                "mitigation",
                "details",
            ],
            Self::Task => &["status", "category", "due", "assignee_id", "details"],
            Self::Program => &["status", "start_date", "end_date", "auditor_ready", "description"],
            Self::Finding => &["status", "severity", "category", "remediation", "due_date"],
            Self::Asset => &["asset_type", "category", "description", "website"],
            Self::ActionPlan => &["status", "priority", "due_date", "details"],
        }
    }
}

impl std::fmt::Display for WorkflowObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowObjectType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown workflow object type: {s}"))
    }
}

/// Lookup of the fields approval actions may target for an object type.
///
/// An empty set means "no restriction".
pub trait FieldEligibility: Send + Sync {
    fn eligible_fields(&self, object_type: WorkflowObjectType) -> BTreeSet<String>;
}

/// The static per-type catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectTypeCatalog;

impl FieldEligibility for ObjectTypeCatalog {
    fn eligible_fields(&self, object_type: WorkflowObjectType) -> BTreeSet<String> {
        object_type
            .eligible_fields()
            .iter()
            .map(|field| field.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(WorkflowObjectType::parse("control"), Some(WorkflowObjectType::Control));
        assert_eq!(
            WorkflowObjectType::parse(" INTERNALPOLICY "),
            Some(WorkflowObjectType::InternalPolicy)
        );
        assert_eq!(WorkflowObjectType::parse("Widget"), None);
    }

    #[test]
    fn catalog_lists_control_status() {
        let fields = ObjectTypeCatalog.eligible_fields(WorkflowObjectType::Control);
        assert!(fields.contains("status"));
        assert!(fields.contains("category"));
        assert!(!fields.contains("id"));
    }
}
