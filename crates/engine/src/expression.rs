//! Expression validation for trigger guards, conditions, action guards and
//! webhook payload templates.
//!
//! An expression is parsed with `cel-parser` and every free identifier it
//! references is checked against the variables of its scope.  Comprehension
//! macros (`list.exists(x, ...)` and friends) bind their variable only inside
//! their own arguments.  Nothing is evaluated here.

use std::collections::BTreeSet;

use cel_parser::{Expression, Member};

use crate::{ExpressionConfig, ExpressionError};

/// Variables visible to trigger expressions and conditions.
pub const BASE_VARIABLES: &[&str] = &[
    "object",
    "object_type",
    "changed_fields",
    "changed_edges",
    "added_ids",
    "removed_ids",
    "proposed_changes",
    "event_type",
    "user_id",
    "conditions",
];

/// Variables visible only to action guards and payload templates.
pub const ACTION_VARIABLES: &[&str] = &["assignments", "instance", "action_key", "definition_id"];

/// Functions admitted when function checking is on.
pub const STANDARD_FUNCTIONS: &[&str] = &[
    "has",
    "size",
    "contains",
    "startsWith",
    "endsWith",
    "matches",
    "all",
    "exists",
    "exists_one",
    "map",
    "filter",
    "max",
    "min",
    "int",
    "uint",
    "double",
    "string",
    "bytes",
    "bool",
    "type",
    "duration",
    "timestamp",
    "getFullYear",
    "getMonth",
    "getDayOfYear",
    "getDayOfMonth",
    "getDate",
    "getDayOfWeek",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getMilliseconds",
];

/// Macros whose first argument names a variable bound in the rest of the call.
const COMPREHENSIONS: &[&str] = &["all", "exists", "exists_one", "map", "filter"];

/// Evaluation scope an expression is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionScope {
    Base,
    Action,
}

impl ExpressionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base   => "base",
            Self::Action => "action",
        }
    }

    pub fn declares(&self, name: &str) -> bool {
        BASE_VARIABLES.contains(&name)
            || (*self == Self::Action && ACTION_VARIABLES.contains(&name))
    }
}

/// Free variables and called functions of a parsed expression.
#[derive(Debug, Default)]
struct References<'e> {
    variables: BTreeSet<&'e str>,
    functions: BTreeSet<&'e str>,
}

impl<'e> References<'e> {
    fn collect(expression: &'e Expression) -> Self {
        let mut references = Self::default();
        references.walk(expression, &mut Vec::new());
        references
    }

    fn walk(&mut self, expression: &'e Expression, bound: &mut Vec<&'e str>) {
        match expression {
            Expression::Arithmetic(left, _, right)
            | Expression::Relation(left, _, right)
            | Expression::Or(left, right)
            | Expression::And(left, right) => {
                self.walk(left, bound);
                self.walk(right, bound);
            }
            Expression::Ternary(condition, then, otherwise) => {
                self.walk(condition, bound);
                self.walk(then, bound);
                self.walk(otherwise, bound);
            }
            Expression::Unary(_, operand) => self.walk(operand, bound),
            Expression::Member(operand, member) => {
                self.walk(operand, bound);
                match &**member {
                    Member::Attribute(_) => {}
                    Member::Index(index) => self.walk(index, bound),
                    Member::Fields(fields) => {
                        for (_, value) in fields {
                            self.walk(value, bound);
                        }
                    }
                }
            }
            Expression::FunctionCall(name, target, args) => {
                let name = match &**name {
                    Expression::Ident(name) => Some(name.as_str()),
                    _ => None,
                };
                if let Some(name) = name {
                    self.functions.insert(name);
                }
                // The receiver is evaluated outside the macro's binding.
                if let Some(target) = target {
                    self.walk(target, bound);
                }

                let binder = match (name, args.first()) {
                    (Some(name), Some(Expression::Ident(var)))
                        if COMPREHENSIONS.contains(&name) && args.len() >= 2 =>
                    {
                        Some(var.as_str())
                    }
                    _ => None,
                };
                match binder {
                    Some(var) => {
                        bound.push(var);
                        for arg in &args[1..] {
                            self.walk(arg, bound);
                        }
                        bound.pop();
                    }
                    None => {
                        for arg in args {
                            self.walk(arg, bound);
                        }
                    }
                }
            }
            Expression::List(items) => {
                for item in items {
                    self.walk(item, bound);
                }
            }
            Expression::Map(entries) => {
                for (key, value) in entries {
                    self.walk(key, bound);
                    self.walk(value, bound);
                }
            }
            Expression::Atom(_) => {}
            Expression::Ident(name) => {
                if !bound.contains(&name.as_str()) {
                    self.variables.insert(name.as_str());
                }
            }
        }
    }
}

/// Compile `expression` against `scope`.
///
/// Blank expressions are always valid.  Reference checks report the first
/// offending name in sorted order so the same input always yields the same
/// error.
pub fn validate_expression(
    config: &ExpressionConfig,
    scope: ExpressionScope,
    expression: &str,
) -> Result<(), ExpressionError> {
    if expression.trim().is_empty() {
        return Ok(());
    }

    let size = expression.chars().count();
    if config.max_expression_size > 0 && size > config.max_expression_size {
        return Err(ExpressionError::TooLarge {
            size,
            limit: config.max_expression_size,
        });
    }

    let ast = cel_parser::parse(expression).map_err(|err| ExpressionError::Compile {
        message: err.to_string(),
    })?;
    let references = References::collect(&ast);

    for &name in &references.variables {
        let declared = scope.declares(name)
            || config.extra_variables.iter().any(|extra| extra == name);
        if !declared {
            return Err(ExpressionError::UndeclaredVariable {
                name: name.to_string(),
                scope: scope.as_str(),
            });
        }
    }

    if config.check_functions {
        for &name in &references.functions {
            let known = STANDARD_FUNCTIONS.contains(&name)
                || config.extra_functions.iter().any(|extra| extra == name);
            if !known {
                return Err(ExpressionError::UnknownFunction {
                    name: name.to_string(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(expression: &str) -> Result<(), ExpressionError> {
        validate_expression(&ExpressionConfig::default(), ExpressionScope::Base, expression)
    }

    #[test]
    fn blank_expression_is_valid() {
        assert!(base("").is_ok());
        assert!(base("   ").is_ok());
    }

    #[test]
    fn base_scope_accepts_object_fields() {
        assert!(base("'status' in changed_fields && object.status == 'APPROVED'").is_ok());
        assert!(base("size(changed_fields) > 0").is_ok());
    }

    #[test]
    fn syntax_error_is_a_compile_failure() {
        assert!(matches!(base("object.status =="), Err(ExpressionError::Compile { .. })));
    }

    #[test]
    fn action_variables_are_not_in_base_scope() {
        let err = base("action_key == 'approve'").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::UndeclaredVariable {
                name: "action_key".into(),
                scope: "base",
            }
        );

        let action = validate_expression(
            &ExpressionConfig::default(),
            ExpressionScope::Action,
            "action_key == 'approve' && object.status == 'DRAFT'",
        );
        assert!(action.is_ok());
    }

    #[test]
    fn macro_variables_are_bound() {
        assert!(base("changed_fields.exists(f, f == 'status')").is_ok());
    }

    #[test]
    fn macro_variables_do_not_escape_their_call() {
        assert_eq!(
            base("[1].exists(secret, true) && secret == 'x'").unwrap_err(),
            ExpressionError::UndeclaredVariable {
                name: "secret".into(),
                scope: "base",
            }
        );

        // Binding an action-scope name does not declare it in the base scope.
        assert_eq!(
            base("[1].all(instance, true) && instance.id == ''").unwrap_err(),
            ExpressionError::UndeclaredVariable {
                name: "instance".into(),
                scope: "base",
            }
        );
    }

    #[test]
    fn macro_receiver_is_checked_outside_the_binding() {
        assert!(matches!(
            base("x.exists(x, x > 1)"),
            Err(ExpressionError::UndeclaredVariable { name, .. }) if name == "x"
        ));
        assert!(base("added_ids.map(id, id + 'x').exists(s, s == 'ax')").is_ok());
    }

    #[test]
    fn every_ternary_branch_and_index_is_checked() {
        assert!(matches!(
            base("object.status == 'x' ? user_id : hidden"),
            Err(ExpressionError::UndeclaredVariable { name, .. }) if name == "hidden"
        ));
        assert!(matches!(
            base("object.fields[hidden_key] == 1"),
            Err(ExpressionError::UndeclaredVariable { name, .. }) if name == "hidden_key"
        ));
    }

    #[test]
    fn unknown_functions_are_rejected_unless_configured() {
        assert!(matches!(
            base("launch(object)"),
            Err(ExpressionError::UnknownFunction { .. })
        ));

        let config = ExpressionConfig {
            extra_functions: vec!["launch".into()],
            ..ExpressionConfig::default()
        };
        assert!(validate_expression(&config, ExpressionScope::Base, "launch(object)").is_ok());

        let unchecked = ExpressionConfig {
            check_functions: false,
            ..ExpressionConfig::default()
        };
        assert!(validate_expression(&unchecked, ExpressionScope::Base, "launch(object)").is_ok());
    }

    #[test]
    fn oversize_expressions_are_rejected() {
        let config = ExpressionConfig {
            max_expression_size: 8,
            ..ExpressionConfig::default()
        };
        assert!(matches!(
            validate_expression(&config, ExpressionScope::Base, "object.status == 'x'"),
            Err(ExpressionError::TooLarge { limit: 8, .. })
        ));
    }
}
