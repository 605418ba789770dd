//! # Check Constraints and Expression Evaluation
//!
//! A `Check` binds a boolean expression to a table, a column, or a domain.
//! Expressions are opaque to this crate: they are identified by `ExprId` and
//! evaluated by a caller-supplied [`Evaluator`] against a [`RowBinding`].
//!
//! ## Three-Valued Results
//!
//! | Evaluator result        | Truth     | Blocks the write? |
//! |-------------------------|-----------|-------------------|
//! | `Value::Bool(true)`     | `True`    | no                |
//! | `Value::Bool(false)`    | `False`   | yes               |
//! | `Value::Null`           | `Unknown` | no                |
//! | any other value / error | -         | yes (`CheckViolation`), except for domain targets where it is `Unknown` |

use crate::error::IntegrityError;
use crate::schema::Naming;
use crate::tree::PTree;
use crate::types::{CheckId, ColumnId, ExprId, ObjectId, TableId, Value};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub fn is_false(self) -> bool {
        matches!(self, Truth::False)
    }
}

impl From<bool> for Truth {
    fn from(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }
}

/// Column values visible to an expression.
#[derive(Debug, Clone, Copy)]
pub struct RowBinding<'a> {
    table: Option<TableId>,
    values: Option<&'a PTree<ColumnId, Value>>,
}

static NULL: Value = Value::Null;

impl<'a> RowBinding<'a> {
    pub fn new(table: TableId, values: &'a PTree<ColumnId, Value>) -> Self {
        Self {
            table: Some(table),
            values: Some(values),
        }
    }

    /// Binding with no row, used for default expressions.
    pub fn empty() -> Self {
        Self {
            table: None,
            values: None,
        }
    }

    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    /// Value of `column`, `Value::Null` when unset.
    pub fn get(&self, column: ColumnId) -> &'a Value {
        self.values.and_then(|v| v.get(&column)).unwrap_or(&NULL)
    }
}

pub trait Evaluator {
    fn eval(&self, expr: ExprId, row: &RowBinding<'_>) -> Result<Value>;
}

/// Evaluator backed by a closure.
pub struct FnEvaluator<F>(pub F);

impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(ExprId, &RowBinding<'_>) -> Result<Value>,
{
    fn eval(&self, expr: ExprId, row: &RowBinding<'_>) -> Result<Value> {
        (self.0)(expr, row)
    }
}

/// Evaluator for schemas without check or default expressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExpressions;

impl Evaluator for NoExpressions {
    fn eval(&self, expr: ExprId, _row: &RowBinding<'_>) -> Result<Value> {
        eyre::bail!("no evaluator available for expression {}", expr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckTarget {
    Table(TableId),
    Column { table: TableId, column: ColumnId },
    Domain(ObjectId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    id: CheckId,
    name: String,
    target: CheckTarget,
    source: String,
    expr: ExprId,
}

impl Check {
    pub fn new(
        id: CheckId,
        name: impl Into<String>,
        target: CheckTarget,
        source: impl Into<String>,
        expr: ExprId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            target,
            source: source.into(),
            expr,
        }
    }

    pub fn id(&self) -> CheckId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> CheckTarget {
        self.target
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> ExprId {
        self.expr
    }

    pub fn evaluate(
        &self,
        evaluator: &dyn Evaluator,
        row: &RowBinding<'_>,
        names: &dyn Naming,
    ) -> Result<Truth> {
        let outcome = evaluator.eval(self.expr, row);
        let tolerant = matches!(self.target, CheckTarget::Domain(_));
        match outcome {
            Ok(Value::Bool(b)) => Ok(Truth::from(b)),
            Ok(Value::Null) => Ok(Truth::Unknown),
            Ok(other) if tolerant => {
                trace!(check = self.id, value = %other, "non-boolean domain check result");
                Ok(Truth::Unknown)
            }
            Err(e) if tolerant => {
                trace!(check = self.id, error = %e, "domain check evaluation failed");
                Ok(Truth::Unknown)
            }
            Ok(other) => Err(eyre::Report::new(self.violation(names))
                .wrap_err(format!("check expression returned non-boolean {}", other))),
            Err(e) => Err(e.wrap_err(self.violation(names))),
        }
    }

    pub(crate) fn violation(&self, names: &dyn Naming) -> IntegrityError {
        let (table, column) = match self.target {
            CheckTarget::Table(t) => (names.name_of(t), "*".to_string()),
            CheckTarget::Column { table, column } => (names.name_of(table), names.name_of(column)),
            CheckTarget::Domain(d) => (names.name_of(d), "*".to_string()),
        };
        IntegrityError::CheckViolation {
            constraint_name: self.name.clone(),
            column_name: column,
            table_name: table,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CONSTRAINT {} CHECK ({})", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationKind;

    struct NumberedNames;

    impl Naming for NumberedNames {
        fn lookup_name(&self, id: ObjectId) -> Option<String> {
            Some(format!("obj{}", id))
        }
    }

    fn positive() -> FnEvaluator<impl Fn(ExprId, &RowBinding<'_>) -> Result<Value>> {
        FnEvaluator(|_expr: ExprId, row: &RowBinding<'_>| match row.get(2) {
            Value::Int(v) => Ok(Value::Bool(*v > 0)),
            Value::Null => Ok(Value::Null),
            other => eyre::bail!("cannot compare {}", other),
        })
    }

    fn check(target: CheckTarget) -> Check {
        Check::new(9, "positive_amount", target, "Amount > 0", 1)
    }

    fn values(v: Value) -> PTree<ColumnId, Value> {
        [(2, v)].into_iter().collect()
    }

    #[test]
    fn three_valued_outcomes() {
        let c = check(CheckTarget::Column { table: 1, column: 2 });
        let eval = positive();
        let yes = values(Value::Int(3));
        let no = values(Value::Int(-3));
        let unset = PTree::new();
        assert_eq!(c.evaluate(&eval, &RowBinding::new(1, &yes), &NumberedNames).unwrap(), Truth::True);
        assert_eq!(c.evaluate(&eval, &RowBinding::new(1, &no), &NumberedNames).unwrap(), Truth::False);
        assert_eq!(
            c.evaluate(&eval, &RowBinding::new(1, &unset), &NumberedNames).unwrap(),
            Truth::Unknown
        );
    }

    #[test]
    fn evaluation_failure_is_check_violation() {
        let c = check(CheckTarget::Column { table: 1, column: 2 });
        let bad = values(Value::text("x"));
        let err = c
            .evaluate(&positive(), &RowBinding::new(1, &bad), &NumberedNames)
            .unwrap_err();
        let violation = err.downcast_ref::<IntegrityError>().unwrap();
        assert_eq!(violation.kind(), ViolationKind::Check);
        assert_eq!(violation.column_name(), Some("obj2"));
        assert_eq!(violation.table_name(), Some("obj1"));
    }

    #[test]
    fn domain_targets_tolerate_failures() {
        let c = check(CheckTarget::Domain(5));
        let bad = values(Value::text("x"));
        assert_eq!(
            c.evaluate(&positive(), &RowBinding::new(1, &bad), &NumberedNames).unwrap(),
            Truth::Unknown
        );
    }

    #[test]
    fn empty_binding_reads_null() {
        assert!(RowBinding::empty().get(42).is_null());
        assert_eq!(RowBinding::empty().table(), None);
    }
}
