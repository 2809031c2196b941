//! Request identity and the triggering-object reference handed to resolvers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WorkflowObjectType;

/// Identity of the caller, taken from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            organization_id: Some(organization_id.into()),
        }
    }

    /// Context with neither a user nor an organization.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The acting user, ignoring blank values.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    /// The caller's organization, ignoring blank values.
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Reference to the object a workflow instance runs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowObject {
    pub id: String,
    pub object_type: WorkflowObjectType,
    /// Loaded object fields, when the caller already has them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Value>,
}

impl WorkflowObject {
    pub fn new(object_type: WorkflowObjectType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type,
            node: None,
        }
    }

    pub fn with_node(mut self, node: Value) -> Self {
        self.node = Some(node);
        self
    }

    /// Non-blank string field from the loaded node.
    pub fn string_field(&self, name: &str) -> Option<&str> {
        self.node
            .as_ref()?
            .get(name)?
            .as_str()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
