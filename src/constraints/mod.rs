//! # Constraint Enforcement Module
//!
//! This module validates candidate rows before they reach any index. Key
//! constraints (primary key, unique, foreign key) are enforced by the indexes
//! themselves during maintenance; everything that depends only on the row's own
//! values is enforced here.
//!
//! ## Supported Constraints
//!
//! | Constraint | INSERT | UPDATE | ALTER | Description                              |
//! |------------|--------|--------|-------|------------------------------------------|
//! | DEFAULT    | ✓      | -      | -     | Literal or expression for unset columns  |
//! | NOT NULL   | ✓      | ✓      | ✓     | Column must hold a value                 |
//! | CHECK      | ✓      | ✓      | ✓     | Expression must not evaluate to false    |
//!
//! ## Validation Order
//!
//! 1. Apply DEFAULT values for unset columns
//! 2. Validate NOT NULL constraints
//! 3. Validate CHECK constraints (table checks, then column checks)
//!
//! NOT NULL failures are reported before any expression is evaluated, and both
//! run before the row pipeline touches an index.
//!
//! ## Scans Over Existing Rows
//!
//! Adding a check or tightening a column to NOT NULL must first prove that
//! every current row already satisfies it. [`ConstraintValidator::scan_nulls`]
//! takes a `reverse` flag: forward mode fails on the first row where the column
//! is null, reverse mode fails on the first row where it holds a value (used
//! before a column is removed from the table).
//!
//! ## Usage
//!
//! ```rust,ignore
//! let validator = ConstraintValidator::new(&snapshot, &table, evaluator, &cx);
//! let values = validator.apply_defaults(&values)?;
//! validator.validate_row(&values)?;
//! ```

pub mod check;

pub use check::{Check, CheckTarget, Evaluator, FnEvaluator, NoExpressions, RowBinding, Truth};

use crate::error::IntegrityError;
use crate::mvcc::TransactionContext;
use crate::schema::{ColumnDefault, Names, Naming, Table};
use crate::snapshot::Snapshot;
use crate::tree::PTree;
use crate::types::{ColumnId, Value};
use eyre::Result;
use tracing::warn;

pub struct ConstraintValidator<'a> {
    snapshot: &'a Snapshot,
    table: &'a Table,
    evaluator: &'a dyn Evaluator,
    names: Names<'a>,
}

impl<'a> ConstraintValidator<'a> {
    pub fn new(
        snapshot: &'a Snapshot,
        table: &'a Table,
        evaluator: &'a dyn Evaluator,
        cx: &'a TransactionContext,
    ) -> Self {
        Self {
            snapshot,
            table,
            evaluator,
            names: Names::new(snapshot, cx),
        }
    }

    /// Fills unset columns from their defaults.
    ///
    /// An expression default that fails to evaluate leaves the column unset;
    /// the NOT NULL pass decides whether that is acceptable.
    pub fn apply_defaults(&self, values: &PTree<ColumnId, Value>) -> Result<PTree<ColumnId, Value>> {
        let mut out = values.clone();
        for column in self.table.columns() {
            if values.get(&column.id()).is_some_and(|v| !v.is_null()) {
                continue;
            }
            let value = match column.default_value() {
                None => continue,
                Some(ColumnDefault::Literal(v)) => v.clone(),
                Some(ColumnDefault::Expr(expr)) => {
                    match self.evaluator.eval(*expr, &RowBinding::empty()) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(
                                table = self.table.name(),
                                column = column.name(),
                                error = %e,
                                "default expression failed"
                            );
                            continue;
                        }
                    }
                }
            };
            out = out.insert(column.id(), value);
        }
        Ok(out)
    }

    pub fn validate_not_null(&self, values: &PTree<ColumnId, Value>) -> Result<()> {
        for column in self.table.columns().iter().filter(|c| c.is_not_null()) {
            if values.get(&column.id()).map_or(true, Value::is_null) {
                return Err(IntegrityError::NotNullViolation {
                    table_name: self.table.name().to_string(),
                    column_name: column.name().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn validate_checks(&self, values: &PTree<ColumnId, Value>) -> Result<()> {
        let binding = RowBinding::new(self.table.id(), values);
        let column_checks = self.table.columns().iter().flat_map(|c| c.checks());
        for id in self.table.checks().chain(column_checks) {
            let check = self.snapshot.check(id)?;
            self.enforce(check, &binding)?;
        }
        Ok(())
    }

    pub fn validate_row(&self, values: &PTree<ColumnId, Value>) -> Result<()> {
        self.validate_not_null(values)?;
        self.validate_checks(values)
    }

    /// Evaluates one check against every current row of the table.
    pub fn scan_check(&self, check: &Check) -> Result<()> {
        for row in self.table.rows().values() {
            self.enforce(check, &RowBinding::new(self.table.id(), row.values()))?;
        }
        Ok(())
    }

    /// Scans a column over every current row. Forward mode fails when a null
    /// is found, reverse mode when a value is found.
    pub fn scan_nulls(&self, column: ColumnId, reverse: bool) -> Result<()> {
        let column_name = || {
            self.table
                .column(column)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| self.names.name_of(column))
        };
        for row in self.table.rows().values() {
            let null_found = !row.has_value(column);
            if null_found ^ reverse {
                let table_name = self.table.name().to_string();
                return Err(if reverse {
                    IntegrityError::NullFoundViolation {
                        table_name,
                        column_name: column_name(),
                    }
                } else {
                    IntegrityError::NotNullViolation {
                        table_name,
                        column_name: column_name(),
                    }
                }
                .into());
            }
        }
        Ok(())
    }

    fn enforce(&self, check: &Check, binding: &RowBinding<'_>) -> Result<()> {
        if check.evaluate(self.evaluator, binding, &self.names)?.is_false() {
            return Err(check.violation(&self.names).into());
        }
        Ok(())
    }
}
