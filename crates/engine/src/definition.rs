//! Definition validation. Run this before persisting or activating a
//! workflow definition.
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. A document is present and its `schemaType` agrees with the input.
//! 2. Triggers: at least one; known operation; object type present and
//!    matching; no blank field/edge names; guard expressions compile.
//! 3. Condition expressions compile.
//! 4. Actions: at least one; unique non-blank keys; known type; per-type
//!    params; `when` guards compile.
//! 5. No two approval actions share a field set.
//! 6. Submission mode and timing, when set, are known (manual submit is
//!    rejected).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use resolvers::{FieldEligibility, ObjectTypeCatalog, ResolverRegistry, WorkflowObjectType};

use crate::{
    domain::field_set_key,
    expression::{validate_expression, ExpressionScope},
    models::{
        ActionType, ApprovalSubmissionMode, ApprovalTiming, WorkflowAction, WorkflowDefinitionDocument,
        WorkflowTrigger,
    },
    params::{
        validate_approval_params, validate_field_update_params, validate_review_params,
        validate_webhook_params, ApprovalActionParams,
    },
    DefinitionError, EngineConfig, ExpressionConfig, ParamsError,
};

/// Validate `doc` against `schema_type` with the built-in resolver registry
/// and the object-type field catalog.
pub fn validate_definition(
    schema_type: &str,
    doc: Option<&WorkflowDefinitionDocument>,
    config: &ExpressionConfig,
) -> Result<(), DefinitionError> {
    DefinitionValidator::new(config.clone()).validate(schema_type, doc)
}

/// Definition validator with injectable collaborators.
#[derive(Clone)]
pub struct DefinitionValidator {
    expressions: ExpressionConfig,
    registry: Arc<ResolverRegistry>,
    eligibility: Arc<dyn FieldEligibility>,
}

impl DefinitionValidator {
    pub fn new(expressions: ExpressionConfig) -> Self {
        Self {
            expressions,
            registry: ResolverRegistry::builtin(),
            eligibility: Arc::new(ObjectTypeCatalog),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.expressions.clone())
    }

    pub fn with_registry(mut self, registry: Arc<ResolverRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_eligibility(mut self, eligibility: Arc<dyn FieldEligibility>) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn validate(
        &self,
        schema_type: &str,
        doc: Option<&WorkflowDefinitionDocument>,
    ) -> Result<(), DefinitionError> {
        let doc = doc.ok_or(DefinitionError::DefinitionRequired)?;
        let schema_type = schema_type.trim();

        validate_schema_type_match(schema_type, doc)?;

        // -------------------------------------------------------------------
        // Triggers and conditions
        // -------------------------------------------------------------------
        if doc.triggers.is_empty() {
            return Err(DefinitionError::NoTriggers);
        }
        for (index, trigger) in doc.triggers.iter().enumerate() {
            self.validate_trigger(schema_type, index, trigger)?;
        }

        for (index, condition) in doc.conditions.iter().enumerate() {
            validate_expression(&self.expressions, ExpressionScope::Base, &condition.expression)
                .map_err(|source| DefinitionError::ConditionExpression { index, source })?;
        }

        // -------------------------------------------------------------------
        // Actions
        // -------------------------------------------------------------------
        let eligible_fields = self.resolve_eligible_fields(schema_type, &doc.triggers);

        if doc.actions.is_empty() {
            return Err(DefinitionError::NoActions);
        }
        let mut seen_keys: HashSet<&str> = HashSet::new();
        for (index, action) in doc.actions.iter().enumerate() {
            self.validate_action(index, action, &mut seen_keys, &eligible_fields)?;
        }

        validate_approval_field_set_uniqueness(doc)?;
        validate_submission_mode(&doc.approval_submission_mode)?;
        validate_approval_timing(&doc.approval_timing)?;

        Ok(())
    }

    fn validate_trigger(
        &self,
        schema_type: &str,
        index: usize,
        trigger: &WorkflowTrigger,
    ) -> Result<(), DefinitionError> {
        let operation = trigger.operation.trim();
        if operation.is_empty() {
            return Err(DefinitionError::TriggerMissingOperation { index });
        }
        if trigger.operation().is_none() {
            return Err(DefinitionError::TriggerUnsupportedOperation {
                index,
                operation: trigger.operation.clone(),
            });
        }

        let object_type = trigger.object_type.trim();
        if object_type.is_empty() {
            return Err(DefinitionError::TriggerMissingObjectType { index });
        }
        if !schema_type.is_empty() && !object_type.eq_ignore_ascii_case(schema_type) {
            return Err(DefinitionError::TriggerObjectTypeMismatch {
                index,
                object_type: trigger.object_type.clone(),
                expected: schema_type.to_string(),
            });
        }

        if trigger.fields.iter().any(|f| f.trim().is_empty()) {
            return Err(DefinitionError::TriggerEmptyFieldName { index });
        }
        if trigger.edges.iter().any(|e| e.trim().is_empty()) {
            return Err(DefinitionError::TriggerEmptyEdgeName { index });
        }

        validate_expression(&self.expressions, ExpressionScope::Base, &trigger.expression)
            .map_err(|source| DefinitionError::TriggerExpression { index, source })
    }

    /// First trigger's object type, else the schema type; an empty set when
    /// neither names a known object type.
    fn resolve_eligible_fields(&self, schema_type: &str, triggers: &[WorkflowTrigger]) -> BTreeSet<String> {
        triggers
            .first()
            .and_then(|trigger| WorkflowObjectType::parse(&trigger.object_type))
            .or_else(|| WorkflowObjectType::parse(schema_type))
            .map(|object_type| self.eligibility.eligible_fields(object_type))
            .unwrap_or_default()
    }

    fn validate_action<'a>(
        &self,
        index: usize,
        action: &'a WorkflowAction,
        seen_keys: &mut HashSet<&'a str>,
        eligible_fields: &BTreeSet<String>,
    ) -> Result<(), DefinitionError> {
        if action.key.trim().is_empty() {
            return Err(DefinitionError::ActionMissingKey { index });
        }
        if !seen_keys.insert(action.key.as_str()) {
            return Err(DefinitionError::DuplicateActionKey(action.key.clone()));
        }

        if action.action_type.trim().is_empty() {
            return Err(DefinitionError::ActionMissingType { index });
        }
        let action_type = action
            .kind()
            .ok_or_else(|| DefinitionError::UnsupportedActionType {
                index,
                action_type: action.action_type.clone(),
            })?;

        self.validate_action_params(action_type, action, eligible_fields)
            .map_err(|source| DefinitionError::InvalidActionParams {
                index,
                key: action.key.clone(),
                source,
            })?;

        validate_expression(&self.expressions, ExpressionScope::Action, &action.when).map_err(|source| {
            DefinitionError::ActionWhenExpression {
                index,
                key: action.key.clone(),
                source,
            }
        })
    }

    fn validate_action_params(
        &self,
        action_type: ActionType,
        action: &WorkflowAction,
        eligible_fields: &BTreeSet<String>,
    ) -> Result<(), ParamsError> {
        let raw = action.params();
        match action_type {
            ActionType::Approval => {
                validate_approval_params(raw, eligible_fields, &self.registry)?;
            }
            ActionType::Review => {
                validate_review_params(raw, &self.registry)?;
            }
            ActionType::Webhook => {
                validate_webhook_params(raw, &self.expressions)?;
            }
            ActionType::FieldUpdate => {
                validate_field_update_params(raw)?;
            }
            // Notification params are free-form.
            ActionType::Notification => {}
        }
        Ok(())
    }
}

fn validate_schema_type_match(schema_type: &str, doc: &WorkflowDefinitionDocument) -> Result<(), DefinitionError> {
    let document = doc.schema_type.trim();
    if !schema_type.is_empty() && !document.is_empty() && !document.eq_ignore_ascii_case(schema_type) {
        return Err(DefinitionError::SchemaTypeMismatch {
            document: doc.schema_type.clone(),
            input: schema_type.to_string(),
        });
    }
    Ok(())
}

/// Approval actions with unreadable params or no fields are skipped here;
/// the per-action check reports those.
fn validate_approval_field_set_uniqueness(doc: &WorkflowDefinitionDocument) -> Result<(), DefinitionError> {
    let mut seen: HashMap<String, &str> = HashMap::new();

    for action in doc.approval_actions() {
        let Some(params) = action
            .params()
            .and_then(|raw| serde_json::from_value::<ApprovalActionParams>(raw.clone()).ok())
        else {
            continue;
        };
        let Some(key) = field_set_key(&params.fields, &params.edges) else {
            continue;
        };

        if let Some(first) = seen.get(&key) {
            return Err(DefinitionError::DuplicateApprovalFieldSet {
                field_set: key,
                first: first.to_string(),
                second: action.key.clone(),
            });
        }
        seen.insert(key, action.key.as_str());
    }
    Ok(())
}

fn validate_submission_mode(mode: &str) -> Result<(), DefinitionError> {
    if mode.trim().is_empty() {
        return Ok(());
    }
    match ApprovalSubmissionMode::parse(mode) {
        None => Err(DefinitionError::SubmissionModeInvalid(mode.to_string())),
        Some(ApprovalSubmissionMode::ManualSubmit) => Err(DefinitionError::ManualSubmitNotSupported),
        Some(ApprovalSubmissionMode::AutoSubmit) => Ok(()),
    }
}

fn validate_approval_timing(timing: &str) -> Result<(), DefinitionError> {
    if timing.trim().is_empty() {
        return Ok(());
    }
    ApprovalTiming::parse(timing)
        .map(|_| ())
        .ok_or_else(|| DefinitionError::ApprovalTimingInvalid(timing.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> WorkflowDefinitionDocument {
        serde_json::from_value(value).unwrap()
    }

    fn check(value: serde_json::Value) -> Result<(), DefinitionError> {
        validate_definition("Control", Some(&doc(value)), &ExpressionConfig::default())
    }

    fn notify_action() -> serde_json::Value {
        json!({ "key": "notify", "type": "NOTIFY" })
    }

    #[test]
    fn missing_document_is_rejected() {
        assert!(matches!(
            validate_definition("Control", None, &ExpressionConfig::default()),
            Err(DefinitionError::DefinitionRequired)
        ));
    }

    #[test]
    fn schema_types_must_agree() {
        let result = check(json!({
            "schemaType": "Risk",
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "actions": [notify_action()]
        }));
        assert!(matches!(result, Err(DefinitionError::SchemaTypeMismatch { .. })));

        let same = check(json!({
            "schemaType": "control",
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "actions": [notify_action()]
        }));
        assert!(same.is_ok());
    }

    #[test]
    fn trigger_checks_report_the_index() {
        let cases = [
            (json!({ "operation": " ", "objectType": "Control" }), "missing operation"),
            (json!({ "operation": "PATCH", "objectType": "Control" }), "unsupported operation"),
            (json!({ "operation": "UPDATE" }), "missing object type"),
            (json!({ "operation": "UPDATE", "objectType": "Risk" }), "object type mismatch"),
            (json!({ "operation": "UPDATE", "objectType": "Control", "fields": [""] }), "empty field"),
            (json!({ "operation": "UPDATE", "objectType": "Control", "edges": [" "] }), "empty edge"),
            (json!({ "operation": "UPDATE", "objectType": "Control", "expression": "object.status ==" }), "bad expression"),
        ];

        for (trigger, label) in cases {
            let result = check(json!({
                "triggers": [{ "operation": "CREATE", "objectType": "Control" }, trigger],
                "actions": [notify_action()]
            }));
            let err = result.expect_err(label);
            let index_one = match err {
                DefinitionError::TriggerMissingOperation { index }
                | DefinitionError::TriggerUnsupportedOperation { index, .. }
                | DefinitionError::TriggerMissingObjectType { index }
                | DefinitionError::TriggerObjectTypeMismatch { index, .. }
                | DefinitionError::TriggerEmptyFieldName { index }
                | DefinitionError::TriggerEmptyEdgeName { index }
                | DefinitionError::TriggerExpression { index, .. } => index == 1,
                _ => false,
            };
            assert!(index_one, "{label}: unexpected error {err}");
        }
    }

    #[test]
    fn blank_conditions_are_skipped_and_bad_ones_rejected() {
        let ok = check(json!({
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "conditions": [{ "expression": "" }, { "expression": "object.status != 'DRAFT'" }],
            "actions": [notify_action()]
        }));
        assert!(ok.is_ok());

        let bad = check(json!({
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "conditions": [{ "expression": "instance.id == ''" }],
            "actions": [notify_action()]
        }));
        let err = bad.unwrap_err();
        assert!(matches!(err, DefinitionError::ConditionExpression { index: 0, .. }));
        assert!(err.expression_error().is_some());
    }

    #[test]
    fn action_key_and_type_checks() {
        let trigger = json!([{ "operation": "UPDATE", "objectType": "Control" }]);

        let missing_key = check(json!({ "triggers": trigger, "actions": [{ "type": "NOTIFY" }] }));
        assert!(matches!(missing_key, Err(DefinitionError::ActionMissingKey { index: 0 })));

        let duplicate = check(json!({ "triggers": trigger, "actions": [notify_action(), notify_action()] }));
        assert!(matches!(duplicate, Err(DefinitionError::DuplicateActionKey(k)) if k == "notify"));

        let missing_type = check(json!({ "triggers": trigger, "actions": [{ "key": "a" }] }));
        assert!(matches!(missing_type, Err(DefinitionError::ActionMissingType { index: 0 })));

        let unsupported = check(json!({ "triggers": trigger, "actions": [{ "key": "a", "type": "SEND_EMAIL" }] }));
        assert!(matches!(unsupported, Err(DefinitionError::UnsupportedActionType { index: 0, .. })));

        let no_actions = check(json!({ "triggers": trigger, "actions": [] }));
        assert!(matches!(no_actions, Err(DefinitionError::NoActions)));
    }

    #[test]
    fn params_errors_name_the_action() {
        let result = check(json!({
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "actions": [notify_action(), { "key": "hook", "type": "WEBHOOK", "params": { "url": "not a url" } }]
        }));
        let err = result.unwrap_err();
        assert!(matches!(
            &err,
            DefinitionError::InvalidActionParams { index: 1, key, source: ParamsError::WebhookUrlInvalid(_) }
                if key == "hook"
        ));
        assert!(err.to_string().contains("action 1 (hook)"));
    }

    #[test]
    fn when_guards_use_the_action_scope() {
        let ok = check(json!({
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "actions": [{ "key": "notify", "type": "NOTIFY", "when": "action_key == 'notify'" }]
        }));
        assert!(ok.is_ok());

        let bad = check(json!({
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "actions": [{ "key": "notify", "type": "NOTIFY", "when": "secret == 1" }]
        }));
        assert!(matches!(bad, Err(DefinitionError::ActionWhenExpression { index: 0, .. })));
    }

    #[test]
    fn submission_mode_and_timing() {
        let with = |mode: &str, timing: &str| {
            check(json!({
                "approvalSubmissionMode": mode,
                "approvalTiming": timing,
                "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
                "actions": [notify_action()]
            }))
        };

        assert!(matches!(with("MANUAL_SUBMIT", ""), Err(DefinitionError::ManualSubmitNotSupported)));
        assert!(matches!(with("later", ""), Err(DefinitionError::SubmissionModeInvalid(_))));
        assert!(with("AUTO_SUBMIT", "").is_ok());
        assert!(with("", "").is_ok());
        assert!(matches!(with("", "NEVER"), Err(DefinitionError::ApprovalTimingInvalid(_))));
        assert!(with("", "POST_COMMIT").is_ok());
    }

    #[test]
    fn unknown_trigger_type_falls_back_to_schema_eligibility() {
        let validator = DefinitionValidator::new(ExpressionConfig::default());
        let triggers = vec![WorkflowTrigger {
            operation: "UPDATE".into(),
            object_type: "Widget".into(),
            ..WorkflowTrigger::default()
        }];
        assert!(validator.resolve_eligible_fields("Control", &triggers).contains("status"));
        assert!(validator.resolve_eligible_fields("Widget", &triggers).is_empty());
    }
}
