//! `engine` crate — the workflow rule engine.
//!
//! Validates definition documents and their expressions, derives approval
//! domains and checks them for conflicts across definitions, resolves
//! approval/review targets to users, and authorizes assignment decisions.

pub mod config;
pub mod conflicts;
pub mod decision;
pub mod definition;
pub mod domain;
pub mod error;
pub mod expression;
pub mod models;
pub mod params;
pub mod targets;

pub use config::{EngineConfig, ExpressionConfig};
pub use conflicts::{activate_definition, activation_domain_keys, check_definition_conflicts};
pub use decision::{DecisionValidator, ValidatedDecision};
pub use definition::{validate_definition, DefinitionValidator};
pub use domain::derive_domain_key;
pub use error::{
    ConflictError, DecisionError, DefinitionError, DomainError, EngineError, ExpressionError,
    ParamsError, TargetError,
};
pub use expression::{validate_expression, ExpressionScope};
pub use models::{TargetConfig, WorkflowDefinitionDocument};
pub use params::ApprovalQuorum;
pub use targets::{ResolvedTarget, TargetResolver};
