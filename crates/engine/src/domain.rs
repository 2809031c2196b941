//! Approval domains, the field sets approval actions guard.
//!
//! A domain key is derived on demand and never stored as an entity of its
//! own.  Keys are order-independent: fields are trimmed, deduplicated and
//! sorted before joining.

use std::collections::BTreeSet;

use resolvers::WorkflowObjectType;
use serde_json::{Map, Value};

use crate::{
    models::{ActionType, ApprovalTiming, TriggerOperation, WorkflowDefinitionDocument},
    params::{ApprovalActionParams, ReviewActionParams},
    DomainError,
};

/// Trimmed, deduplicated, sorted copy of `fields` without blanks.
pub fn normalize_fields<S: AsRef<str>>(fields: &[S]) -> Vec<String> {
    fields
        .iter()
        .map(|f| f.as_ref().trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `"<ObjectType>::<a,b,c>"`, or `None` when no field remains after
/// normalization.
pub fn derive_domain_key<S: AsRef<str>>(object_type: WorkflowObjectType, fields: &[S]) -> Option<String> {
    let fields = normalize_fields(fields);
    if fields.is_empty() {
        return None;
    }
    Some(format!("{}::{}", object_type, fields.join(",")))
}

/// Key used for the within-document uniqueness check: fields and edges
/// together, normalized, comma-joined.
pub fn field_set_key(fields: &[String], edges: &[String]) -> Option<String> {
    let all: Vec<&String> = fields.iter().chain(edges).collect();
    let normalized = normalize_fields(&all);
    (!normalized.is_empty()).then(|| normalized.join(","))
}

/// Field lists of every approval action in `doc`, in action order.
///
/// Blank entries are dropped and approval actions without fields are
/// skipped.  Params that do not parse are an error.
pub fn approval_domains(doc: &WorkflowDefinitionDocument) -> Result<Vec<Vec<String>>, DomainError> {
    let mut domains = Vec::new();
    for action in doc.approval_actions() {
        let Some(raw) = action.params() else {
            continue;
        };
        let params: ApprovalActionParams = serde_json::from_value(raw.clone()).map_err(|source| {
            DomainError::InvalidApprovalParams {
                key: action.key.clone(),
                source,
            }
        })?;

        let fields: Vec<String> = params
            .fields
            .into_iter()
            .filter(|f| !f.trim().is_empty())
            .collect();
        if !fields.is_empty() {
            domains.push(fields);
        }
    }
    Ok(domains)
}

/// Distinct domain keys of `doc` for `object_type`.
pub fn domain_keys(
    doc: &WorkflowDefinitionDocument,
    object_type: WorkflowObjectType,
) -> Result<BTreeSet<String>, DomainError> {
    Ok(approval_domains(doc)?
        .iter()
        .filter_map(|fields| derive_domain_key(object_type, fields))
        .collect())
}

pub fn definition_has_approval_action(doc: &WorkflowDefinitionDocument) -> bool {
    doc.approval_actions().next().is_some()
}

/// Changed field names, sorted.
pub fn fields_from_changes(changes: &Map<String, Value>) -> Vec<String> {
    let mut fields: Vec<String> = changes.keys().cloned().collect();
    fields.sort();
    fields
}

/// The subset of `changes` touching `fields`.
pub fn filter_changes_for_domain<S: AsRef<str>>(changes: &Map<String, Value>, fields: &[S]) -> Map<String, Value> {
    let wanted = normalize_fields(fields);
    changes
        .iter()
        .filter(|(name, _)| wanted.iter().any(|w| w == *name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Changes falling inside one approval domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainChanges {
    pub domain_key: String,
    /// The domain's normalized fields.
    pub fields: Vec<String>,
    pub changes: Map<String, Value>,
}

/// One entry per domain that at least one change falls into, in domain
/// order.  Domains sharing a key are reported once.
pub fn split_changes_by_domains(
    object_type: WorkflowObjectType,
    changes: &Map<String, Value>,
    domains: &[Vec<String>],
) -> Vec<DomainChanges> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    for domain in domains {
        let Some(domain_key) = derive_domain_key(object_type, domain) else {
            continue;
        };
        if !seen.insert(domain_key.clone()) {
            continue;
        }
        let matched = filter_changes_for_domain(changes, domain);
        if matched.is_empty() {
            continue;
        }
        out.push(DomainChanges {
            domain_key,
            fields: normalize_fields(domain),
            changes: matched,
        });
    }
    out
}

/// Split `changes` by the approval domains of `doc`.  A definition without
/// approval domains treats every changed field as one domain.
pub fn domain_changes_for_definition(
    object_type: WorkflowObjectType,
    doc: &WorkflowDefinitionDocument,
    changes: &Map<String, Value>,
) -> Result<Vec<DomainChanges>, DomainError> {
    let domains = approval_domains(doc)?;
    if !domains.is_empty() {
        return Ok(split_changes_by_domains(object_type, changes, &domains));
    }

    let fields = fields_from_changes(changes);
    Ok(derive_domain_key(object_type, &fields)
        .map(|domain_key| DomainChanges {
            domain_key,
            fields,
            changes: changes.clone(),
        })
        .into_iter()
        .collect())
}

/// Whether any trigger of `doc` fires for `operation` given the changed
/// fields and edges.  Triggers without field or edge scoping match every
/// change of their operation.
pub fn definition_matches_trigger(
    doc: &WorkflowDefinitionDocument,
    operation: TriggerOperation,
    changed_fields: &[String],
    changed_edges: &[String],
) -> bool {
    doc.triggers.iter().any(|trigger| {
        if trigger.operation() != Some(operation) {
            return false;
        }
        if trigger.fields.is_empty() && trigger.edges.is_empty() {
            return true;
        }
        let touches = |scoped: &[String], changed: &[String]| {
            scoped
                .iter()
                .any(|s| changed.iter().any(|c| c.trim() == s.trim()))
        };
        touches(&trigger.fields, changed_fields) || touches(&trigger.edges, changed_edges)
    })
}

pub fn uses_post_commit_approvals(doc: &WorkflowDefinitionDocument) -> bool {
    doc.approval_timing() == Some(ApprovalTiming::PostCommit)
}

/// Copy of `doc` with every approval action turned into a review action
/// carrying the same targets, quorum and label.  The change has already
/// committed under post-commit timing, so there is nothing left to gate.
pub fn convert_approval_actions_to_review(
    doc: &WorkflowDefinitionDocument,
) -> Result<WorkflowDefinitionDocument, DomainError> {
    let mut converted = doc.clone();
    for action in converted.actions.iter_mut().filter(|a| a.is_approval()) {
        let approval: ApprovalActionParams = match action.params() {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|source| {
                DomainError::InvalidApprovalParams {
                    key: action.key.clone(),
                    source,
                }
            })?,
            None => ApprovalActionParams::default(),
        };

        let review = ReviewActionParams {
            targets: approval.resolved_targets(),
            required: approval.required,
            required_count: approval.required_count,
            label: approval.label,
        };
        action.action_type = ActionType::Review.as_str().to_string();
        action.params = Some(serde_json::to_value(review).map_err(|source| {
            DomainError::InvalidApprovalParams {
                key: action.key.clone(),
                source,
            }
        })?);
    }
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WorkflowAction, WorkflowTrigger};
    use serde_json::json;

    fn action(key: &str, action_type: &str, params: Option<Value>) -> WorkflowAction {
        WorkflowAction {
            key: key.into(),
            action_type: action_type.into(),
            params,
            ..WorkflowAction::default()
        }
    }

    fn changes(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn domain_key_is_order_independent() {
        let a = derive_domain_key(WorkflowObjectType::Control, &["b", "a"]);
        let b = derive_domain_key(WorkflowObjectType::Control, &["a", "b", " a "]);
        assert_eq!(a, b);
        assert_eq!(a.as_deref(), Some("Control::a,b"));
        assert_eq!(derive_domain_key::<&str>(WorkflowObjectType::Control, &[]), None);
        assert_eq!(derive_domain_key(WorkflowObjectType::Control, &["  "]), None);
    }

    #[test]
    fn approval_domains_skip_other_actions_and_blanks() {
        let doc = WorkflowDefinitionDocument {
            actions: vec![
                action("notify", "NOTIFY", Some(json!({ "fields": ["status"] }))),
                action("primary", "REQUEST_APPROVAL", Some(json!({ "fields": [" status ", "name", ""] }))),
                action("secondary", "approval", Some(json!({ "fields": ["priority"] }))),
                action("empty", "REQUEST_APPROVAL", Some(json!({ "targets": [] }))),
            ],
            ..WorkflowDefinitionDocument::default()
        };

        assert_eq!(
            approval_domains(&doc).unwrap(),
            vec![vec![" status ".to_string(), "name".to_string()], vec!["priority".to_string()]]
        );
        assert_eq!(
            domain_keys(&doc, WorkflowObjectType::Control).unwrap().into_iter().collect::<Vec<_>>(),
            vec!["Control::name,status", "Control::priority"]
        );
    }

    #[test]
    fn malformed_approval_params_are_an_error() {
        let doc = WorkflowDefinitionDocument {
            actions: vec![action("approval", "REQUEST_APPROVAL", Some(json!({ "fields": "status" })))],
            ..WorkflowDefinitionDocument::default()
        };
        assert!(matches!(
            approval_domains(&doc),
            Err(DomainError::InvalidApprovalParams { key, .. }) if key == "approval"
        ));
    }

    #[test]
    fn filter_changes_keeps_only_domain_fields() {
        let all = changes(json!({ "text": "new", "other_field": 1 }));
        assert_eq!(filter_changes_for_domain(&all, &["text", "description"]), changes(json!({ "text": "new" })));
        assert!(filter_changes_for_domain(&all, &["description"]).is_empty());
    }

    #[test]
    fn split_changes_reports_touched_domains() {
        let all = changes(json!({ "status": "approved", "description": "update", "priority": "p1", "other": 1 }));
        let domains = vec![
            vec!["status".to_string()],
            vec!["priority".to_string(), "description".to_string()],
            vec!["category".to_string()],
        ];

        let split = split_changes_by_domains(WorkflowObjectType::Task, &all, &domains);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].domain_key, "Task::status");
        assert_eq!(split[0].changes, changes(json!({ "status": "approved" })));
        assert_eq!(split[1].fields, vec!["description", "priority"]);
        assert_eq!(split[1].changes, changes(json!({ "description": "update", "priority": "p1" })));
    }

    #[test]
    fn definition_without_domains_uses_every_changed_field() {
        let doc = WorkflowDefinitionDocument {
            actions: vec![action("notify", "NOTIFY", None)],
            ..WorkflowDefinitionDocument::default()
        };
        let all = changes(json!({ "status": "approved", "name": "example" }));

        let split = domain_changes_for_definition(WorkflowObjectType::Control, &doc, &all).unwrap();
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].domain_key, "Control::name,status");
        assert_eq!(split[0].changes, all);
        assert!(!definition_has_approval_action(&doc));
        assert_eq!(fields_from_changes(&all), vec!["name", "status"]);
    }

    #[test]
    fn trigger_matching_respects_operation_and_scope() {
        let doc = WorkflowDefinitionDocument {
            triggers: vec![
                WorkflowTrigger {
                    operation: "update".into(),
                    object_type: "Control".into(),
                    fields: vec!["status".into()],
                    ..WorkflowTrigger::default()
                },
                WorkflowTrigger {
                    operation: "CREATE".into(),
                    object_type: "Control".into(),
                    ..WorkflowTrigger::default()
                },
            ],
            ..WorkflowDefinitionDocument::default()
        };

        assert!(definition_matches_trigger(&doc, TriggerOperation::Update, &["status".into()], &[]));
        assert!(!definition_matches_trigger(&doc, TriggerOperation::Update, &["name".into()], &[]));
        assert!(definition_matches_trigger(&doc, TriggerOperation::Create, &[], &[]));
        assert!(!definition_matches_trigger(&doc, TriggerOperation::Delete, &[], &[]));
    }

    #[test]
    fn post_commit_definitions_run_approvals_as_reviews() {
        let doc = WorkflowDefinitionDocument {
            approval_timing: "POST_COMMIT".into(),
            actions: vec![action(
                "approve",
                "REQUEST_APPROVAL",
                Some(json!({ "fields": ["status"], "assignees": { "users": ["u1"] }, "required_count": 1 })),
            )],
            ..WorkflowDefinitionDocument::default()
        };
        assert!(uses_post_commit_approvals(&doc));

        let converted = convert_approval_actions_to_review(&doc).unwrap();
        assert_eq!(converted.actions[0].kind(), Some(ActionType::Review));
        let params: ReviewActionParams =
            serde_json::from_value(converted.actions[0].params.clone().unwrap()).unwrap();
        assert_eq!(params.targets, vec![crate::models::TargetConfig::user("u1")]);
        assert_eq!(params.required_count, 1);
        assert!(!definition_has_approval_action(&converted));
    }
}
