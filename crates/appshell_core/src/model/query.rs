//! Query constraints for listing documents.
//!
//! Constraints compose conjunctively. Their order matters only to the remote
//! store's index selection, never to the result set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field value equals one of the operand array's items.
    In,
    /// Field holds an array containing the operand.
    ArrayContains,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::ArrayContains => "array-contains",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One filter/sort/limit clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Filter {
        field: String,
        op: FilterOp,
        value: Value,
    },
    OrderBy {
        field: String,
        direction: SortDirection,
    },
    Limit {
        count: u32,
    },
}

pub fn filter(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Constraint {
    Constraint::Filter {
        field: field.into(),
        op,
        value: value.into(),
    }
}

pub fn order_by(field: impl Into<String>, direction: SortDirection) -> Constraint {
    Constraint::OrderBy {
        field: field.into(),
        direction,
    }
}

pub fn limit(count: u32) -> Constraint {
    Constraint::Limit { count }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    EmptyField,
    ZeroLimit,
    DuplicateLimit,
    InOperandNotArray(String),
}

impl Display for QueryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField => write!(f, "constraint field path must not be empty"),
            Self::ZeroLimit => write!(f, "limit must be greater than zero"),
            Self::DuplicateLimit => write!(f, "at most one limit constraint is allowed"),
            Self::InOperandNotArray(field) => {
                write!(f, "`in` filter on `{field}` requires an array operand")
            }
        }
    }
}

impl Error for QueryValidationError {}

/// Checks constraint shape before the list is sent to the store.
pub fn validate_constraints(constraints: &[Constraint]) -> Result<(), QueryValidationError> {
    let mut seen_limit = false;
    for constraint in constraints {
        match constraint {
            Constraint::Filter { field, op, value } => {
                if field.trim().is_empty() {
                    return Err(QueryValidationError::EmptyField);
                }
                if *op == FilterOp::In && !value.is_array() {
                    return Err(QueryValidationError::InOperandNotArray(field.clone()));
                }
            }
            Constraint::OrderBy { field, .. } => {
                if field.trim().is_empty() {
                    return Err(QueryValidationError::EmptyField);
                }
            }
            Constraint::Limit { count } => {
                if *count == 0 {
                    return Err(QueryValidationError::ZeroLimit);
                }
                if seen_limit {
                    return Err(QueryValidationError::DuplicateLimit);
                }
                seen_limit = true;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        filter, limit, order_by, validate_constraints, FilterOp, QueryValidationError,
        SortDirection,
    };
    use serde_json::json;

    #[test]
    fn accepts_well_formed_constraints() {
        let constraints = vec![
            filter("status", FilterOp::Eq, "open"),
            filter("priority", FilterOp::In, json!([1, 2])),
            order_by("createdAt", SortDirection::Desc),
            limit(20),
        ];
        assert_eq!(validate_constraints(&constraints), Ok(()));
        assert_eq!(validate_constraints(&[]), Ok(()));
    }

    #[test]
    fn rejects_malformed_constraints() {
        assert_eq!(
            validate_constraints(&[filter(" ", FilterOp::Eq, 1)]),
            Err(QueryValidationError::EmptyField)
        );
        assert_eq!(
            validate_constraints(&[limit(0)]),
            Err(QueryValidationError::ZeroLimit)
        );
        assert_eq!(
            validate_constraints(&[limit(1), limit(2)]),
            Err(QueryValidationError::DuplicateLimit)
        );
        assert_eq!(
            validate_constraints(&[filter("tag", FilterOp::In, "x")]),
            Err(QueryValidationError::InOperandNotArray("tag".to_string()))
        );
    }

    #[test]
    fn filter_ops_render_store_syntax() {
        assert_eq!(FilterOp::Le.as_str(), "<=");
        assert_eq!(FilterOp::ArrayContains.as_str(), "array-contains");
    }
}
