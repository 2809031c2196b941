//! Approval-domain conflict checking.
//!
//! Two active definitions owned by the same organization may not claim the
//! same approval domain for the same schema type.  Run this before
//! activating or updating a definition.  Schema types are matched
//! case-insensitively and domain keys always carry the canonical object type
//! name.

use std::collections::BTreeSet;

use db::{models::WorkflowDefinitionRow, DbError, DefinitionFilter, DefinitionStore};
use resolvers::WorkflowObjectType;
use tracing::{debug, info, instrument, warn};

use crate::{
    domain::{derive_domain_key, domain_keys},
    models::WorkflowDefinitionDocument,
    ConflictError,
};

/// Domain keys `doc` would claim once activated under `schema_type`.
pub fn activation_domain_keys(
    schema_type: &str,
    doc: &WorkflowDefinitionDocument,
) -> Result<BTreeSet<String>, ConflictError> {
    let object_type = WorkflowObjectType::parse(schema_type)
        .ok_or_else(|| ConflictError::InvalidSchemaType(schema_type.to_string()))?;
    Ok(domain_keys(doc, object_type)?)
}

/// Fail with [`ConflictError::ConflictingDomain`] if another active,
/// non-draft definition of `owner_id` already claims one of `doc`'s
/// approval domains.  `current_definition_id` is left out of the
/// comparison so a definition never conflicts with itself.
#[instrument(skip(store, doc), fields(schema_type = %schema_type, owner_id = %owner_id))]
pub async fn check_definition_conflicts(
    store: &dyn DefinitionStore,
    schema_type: &str,
    owner_id: &str,
    current_definition_id: &str,
    doc: &WorkflowDefinitionDocument,
) -> Result<(), ConflictError> {
    let object_type = WorkflowObjectType::parse(schema_type)
        .ok_or_else(|| ConflictError::InvalidSchemaType(schema_type.to_string()))?;

    let claimed = domain_keys(doc, object_type)?;
    if claimed.is_empty() {
        debug!("definition has no approval domains");
        return Ok(());
    }

    let filter = DefinitionFilter::new(object_type.as_str())
        .owned_by(owner_id)
        .excluding(current_definition_id);
    let existing = store
        .list_active_definitions(&filter)
        .await
        .map_err(ConflictError::Query)?;

    debug!(claimed = claimed.len(), existing = existing.len(), "comparing approval domains");

    for row in &existing {
        let Some(stored_keys) = stored_domain_keys(row)? else {
            continue;
        };
        if let Some(domain_key) = claimed.intersection(&stored_keys).next() {
            warn!(domain_key = %domain_key, definition_id = %row.id, "approval domain conflict");
            return Err(ConflictError::ConflictingDomain {
                domain_key: domain_key.clone(),
                definition_id: row.id.clone(),
            });
        }
    }

    Ok(())
}

/// Check `doc` for domain conflicts, then activate `definition_id` and
/// claim its domain keys in `store`.
///
/// The check reads a snapshot.  Two activations that both pass it are
/// settled by the store's unique domain key; the loser fails with
/// [`ConflictError::DomainClaimed`] and stays inactive.
#[instrument(skip(store, doc), fields(schema_type = %schema_type, owner_id = %owner_id))]
pub async fn activate_definition(
    store: &dyn DefinitionStore,
    schema_type: &str,
    owner_id: &str,
    definition_id: &str,
    doc: &WorkflowDefinitionDocument,
) -> Result<WorkflowDefinitionRow, ConflictError> {
    check_definition_conflicts(store, schema_type, owner_id, definition_id, doc).await?;

    let domain_keys: Vec<String> = activation_domain_keys(schema_type, doc)?.into_iter().collect();
    let row = store
        .activate_definition(definition_id, &domain_keys)
        .await
        .map_err(|err| match err {
            DbError::UniqueViolation(constraint) => {
                warn!(definition_id, constraint = %constraint, "approval domain claimed concurrently");
                ConflictError::DomainClaimed {
                    definition_id: definition_id.to_string(),
                }
            }
            source => ConflictError::Activation {
                definition_id: definition_id.to_string(),
                source,
            },
        })?;

    info!(definition_id, domains = domain_keys.len(), "workflow definition activated");
    Ok(row)
}

/// Domains claimed by a stored definition.  `None` when the row's schema
/// type is not a known object type.  Rows whose document declares no
/// approval fields fall back to the legacy `approval_fields` column.
fn stored_domain_keys(row: &WorkflowDefinitionRow) -> Result<Option<BTreeSet<String>>, ConflictError> {
    let Some(object_type) = WorkflowObjectType::parse(&row.schema_type) else {
        return Ok(None);
    };

    let malformed = |message: String| ConflictError::MalformedDefinition {
        definition_id: row.id.clone(),
        message,
    };

    let doc: WorkflowDefinitionDocument =
        serde_json::from_value(row.definition.clone()).map_err(|err| malformed(err.to_string()))?;
    let mut keys = domain_keys(&doc, object_type).map_err(|err| malformed(err.to_string()))?;

    if keys.is_empty() {
        keys.extend(derive_domain_key(object_type, &row.approval_fields));
    }
    Ok(Some(keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use db::InMemoryStore;
    use serde_json::{json, Value};

    /// Serves an empty conflict snapshot but activates through the inner
    /// store, as if every other activation committed after the check ran.
    struct StaleSnapshot(InMemoryStore);

    #[async_trait]
    impl DefinitionStore for StaleSnapshot {
        async fn list_active_definitions(
            &self,
            _filter: &DefinitionFilter,
        ) -> Result<Vec<WorkflowDefinitionRow>, DbError> {
            Ok(Vec::new())
        }

        async fn get_definition(&self, id: &str) -> Result<WorkflowDefinitionRow, DbError> {
            self.0.get_definition(id).await
        }

        async fn activate_definition(
            &self,
            id: &str,
            domain_keys: &[String],
        ) -> Result<WorkflowDefinitionRow, DbError> {
            self.0.activate_definition(id, domain_keys).await
        }

        async fn deactivate_definition(&self, id: &str) -> Result<(), DbError> {
            self.0.deactivate_definition(id).await
        }
    }

    fn approval_doc(fields: &[&str]) -> Value {
        json!({
            "schemaType": "Control",
            "triggers": [{ "operation": "UPDATE", "objectType": "Control", "fields": fields }],
            "actions": [{
                "key": "approve",
                "type": "REQUEST_APPROVAL",
                "params": { "targets": [{ "type": "USER", "id": "u1" }], "fields": fields }
            }]
        })
    }

    fn row(id: &str, owner: &str, definition: Value) -> WorkflowDefinitionRow {
        WorkflowDefinitionRow {
            id: id.into(),
            owner_id: owner.into(),
            name: id.into(),
            schema_type: "Control".into(),
            active: true,
            draft: false,
            definition,
            approval_fields: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn doc(value: Value) -> WorkflowDefinitionDocument {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn same_domain_in_same_org_conflicts() {
        let store = InMemoryStore::new();
        store.insert_definition(row("def-1", "org-1", approval_doc(&["status"])));

        let err = check_definition_conflicts(&store, "Control", "org-1", "", &doc(approval_doc(&["status"])))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            ConflictError::ConflictingDomain { domain_key, definition_id }
                if domain_key == "Control::status" && definition_id == "def-1"
        ));
        assert!(err.to_string().contains("already used by workflow definition 'def-1'"));
    }

    #[tokio::test]
    async fn schema_type_case_does_not_hide_conflicts() {
        let store = InMemoryStore::new();
        let mut lowercase = row("def-1", "org-1", approval_doc(&["status"]));
        lowercase.schema_type = "control".into();
        store.insert_definition(lowercase);

        for schema_type in ["control", "Control", "CONTROL"] {
            let err = check_definition_conflicts(&store, schema_type, "org-1", "", &doc(approval_doc(&["status"])))
                .await
                .unwrap_err();
            assert!(
                matches!(
                    &err,
                    ConflictError::ConflictingDomain { domain_key, definition_id }
                        if domain_key == "Control::status" && definition_id == "def-1"
                ),
                "schema type {schema_type:?}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn other_domains_owners_and_self_do_not_conflict() {
        let store = InMemoryStore::new();
        store.insert_definition(row("def-1", "org-1", approval_doc(&["status"])));

        let other_field = doc(approval_doc(&["category"]));
        assert!(check_definition_conflicts(&store, "Control", "org-1", "", &other_field).await.is_ok());

        let same_field = doc(approval_doc(&["status"]));
        assert!(check_definition_conflicts(&store, "Control", "org-2", "", &same_field).await.is_ok());
        assert!(check_definition_conflicts(&store, "Control", "org-1", "def-1", &same_field).await.is_ok());
    }

    #[tokio::test]
    async fn drafts_and_inactive_rows_are_ignored() {
        let store = InMemoryStore::new();
        let mut draft = row("draft", "org-1", approval_doc(&["status"]));
        draft.draft = true;
        let mut inactive = row("inactive", "org-1", approval_doc(&["status"]));
        inactive.active = false;
        store.insert_definition(draft);
        store.insert_definition(inactive);

        let result = check_definition_conflicts(&store, "Control", "org-1", "", &doc(approval_doc(&["status"]))).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn no_approval_domains_skips_the_query() {
        let store = InMemoryStore::new();
        let notify_only = doc(json!({
            "triggers": [{ "operation": "UPDATE", "objectType": "Control" }],
            "actions": [{ "key": "notify", "type": "NOTIFY" }]
        }));

        assert!(check_definition_conflicts(&store, "Control", "org-1", "", &notify_only).await.is_ok());
        assert_eq!(store.definition_queries(), 0);
    }

    #[tokio::test]
    async fn legacy_approval_fields_are_compared() {
        let store = InMemoryStore::new();
        let mut legacy = row(
            "legacy",
            "org-1",
            json!({ "triggers": [{ "operation": "UPDATE", "objectType": "Control" }] }),
        );
        legacy.approval_fields = vec!["status".into()];
        store.insert_definition(legacy);

        let err = check_definition_conflicts(&store, "Control", "org-1", "", &doc(approval_doc(&["status"])))
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::ConflictingDomain { definition_id, .. } if definition_id == "legacy"));
    }

    #[tokio::test]
    async fn unknown_schema_type_is_rejected() {
        let store = InMemoryStore::new();
        let err = check_definition_conflicts(&store, "Widget", "org-1", "", &doc(approval_doc(&["status"])))
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::InvalidSchemaType(t) if t == "Widget"));
    }

    #[test]
    fn activation_keys_are_sorted_domain_keys() {
        let keys = activation_domain_keys("control", &doc(approval_doc(&["status", "category"]))).unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["Control::category,status"]);
    }

    fn draft(id: &str, schema_type: &str) -> WorkflowDefinitionRow {
        let mut row = row(id, "org-1", approval_doc(&["status"]));
        row.schema_type = schema_type.into();
        row.active = false;
        row.draft = true;
        row
    }

    #[tokio::test]
    async fn racing_activations_of_one_domain_leave_a_single_winner() {
        let store = StaleSnapshot(InMemoryStore::new());
        store.0.insert_definition(draft("def-a", "Control"));
        store.0.insert_definition(draft("def-b", "control"));
        let status = doc(approval_doc(&["status"]));

        // Both pass the snapshot check before either commits.
        assert!(check_definition_conflicts(&store, "Control", "org-1", "def-a", &status).await.is_ok());
        assert!(check_definition_conflicts(&store, "control", "org-1", "def-b", &status).await.is_ok());

        let winner = activate_definition(&store, "Control", "org-1", "def-a", &status).await.unwrap();
        assert!(winner.active && !winner.draft);
        assert_eq!(store.0.claimed_domain_keys("def-a"), vec!["Control::status"]);

        let err = activate_definition(&store, "control", "org-1", "def-b", &status)
            .await
            .unwrap_err();
        assert!(matches!(&err, ConflictError::DomainClaimed { definition_id } if definition_id == "def-b"));

        let loser = store.0.get_definition("def-b").await.unwrap();
        assert!(!loser.active && loser.draft);
        assert!(store.0.claimed_domain_keys("def-b").is_empty());
    }

    #[tokio::test]
    async fn activation_runs_the_conflict_check_first() {
        let store = InMemoryStore::new();
        store.insert_definition(row("def-1", "org-1", approval_doc(&["status"])));
        store.insert_definition(draft("def-2", "Control"));
        let status = doc(approval_doc(&["status"]));

        let err = activate_definition(&store, "Control", "org-1", "def-2", &status)
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::ConflictingDomain { definition_id, .. } if definition_id == "def-1"));

        store.deactivate_definition("def-1").await.unwrap();
        let activated = activate_definition(&store, "Control", "org-1", "def-2", &status).await.unwrap();
        assert!(activated.active);
        assert_eq!(store.claimed_domain_keys("def-2"), vec!["Control::status"]);
    }

    #[tokio::test]
    async fn activating_a_missing_definition_reports_the_store_error() {
        let store = InMemoryStore::new();
        let err = activate_definition(&store, "Control", "org-1", "missing", &doc(approval_doc(&["status"])))
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::Activation { source, .. } if source.is_not_found()));
    }
}
