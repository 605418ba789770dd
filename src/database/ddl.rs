//! # DDL Operations Module
//!
//! Schema changes on a snapshot: tables, columns, indexes and checks.
//!
//! ## Supported Operations
//!
//! ### CREATE / ADD
//! - `create_table` - allocates the table and column ids
//! - `add_column` - appends a column; a NOT NULL column requires an empty table
//! - `create_index` - registers and builds an index over the existing rows
//! - `add_check` - validates every existing row, then attaches the check
//!
//! ### DROP
//! - `drop_column` - refuses while any row holds a value unless cascade is
//!   authorized, in which case the values are cleared first
//! - `drop_index` - refuses while a foreign key references the index unless
//!   cascade is authorized, in which case those foreign keys are dropped too
//! - `drop_check`
//!
//! ### ALTER
//! - `set_not_null` - tightening scans existing rows for nulls
//!
//! ## Index Registration
//!
//! ```text
//! create_index(FK on Items(OrderId) -> PK_Orders)
//!   Items.indexes        += fk            (indexes I own)
//!   Orders.referenced_by += fk            (indexes that reference me)
//!   snapshot[fk]          = Index::build(..)
//! ```

use super::rows::relink_row;
use super::Writer;
use crate::constraints::{Check, CheckTarget};
use crate::error::IntegrityError;
use crate::index::{ConstraintKind, Domain, Index, ReferentialAction};
use crate::schema::{ColumnDef, Names, Naming, Table};
use crate::snapshot::Snapshot;
use crate::tree::PTree;
use crate::types::{CheckId, ColumnId, ExprId, IndexId, TableId, Value};
use eyre::{bail, ensure, Result, WrapErr};
use std::sync::Arc;
use tracing::debug;

/// Description of an index to create.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    table: TableId,
    columns: Vec<ColumnId>,
    kind: ConstraintKind,
    name: Option<String>,
    references: Option<IndexId>,
    on_delete: ReferentialAction,
    on_update: ReferentialAction,
    allow_duplicates: bool,
    allow_unresolved: bool,
}

impl IndexSpec {
    pub fn new(table: TableId, columns: impl Into<Vec<ColumnId>>, kind: ConstraintKind) -> Self {
        Self {
            table,
            columns: columns.into(),
            kind,
            name: None,
            references: None,
            on_delete: ReferentialAction::Restrict,
            on_update: ReferentialAction::Restrict,
            allow_duplicates: false,
            allow_unresolved: false,
        }
    }

    pub fn primary_key(table: TableId, columns: impl Into<Vec<ColumnId>>) -> Self {
        Self::new(table, columns, ConstraintKind::PrimaryKey)
    }

    pub fn unique(table: TableId, columns: impl Into<Vec<ColumnId>>) -> Self {
        Self::new(table, columns, ConstraintKind::Unique)
    }

    pub fn foreign_key(
        table: TableId,
        columns: impl Into<Vec<ColumnId>>,
        referenced_index: IndexId,
    ) -> Self {
        Self {
            references: Some(referenced_index),
            ..Self::new(table, columns, ConstraintKind::ForeignKey)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    pub fn allow_duplicates(mut self) -> Self {
        self.allow_duplicates = true;
        self
    }

    pub fn allow_unresolved(mut self) -> Self {
        self.allow_unresolved = true;
        self
    }
}

impl Writer<'_> {
    pub fn create_table(
        &self,
        snapshot: &Snapshot,
        name: &str,
        columns: Vec<ColumnDef>,
    ) -> Result<(Snapshot, TableId)> {
        ensure!(
            snapshot.table_by_name(name).is_err(),
            "table '{}' already exists",
            name
        );
        for (i, c) in columns.iter().enumerate() {
            ensure!(
                !columns[..i].iter().any(|o| o.name() == c.name()),
                "duplicate column '{}' in table '{}'",
                c.name(),
                name
            );
        }
        let mut snap = snapshot.clone();
        let table_id = snap.allocate_object_id();
        let mut built = Vec::with_capacity(columns.len());
        for def in columns {
            let id = snap.allocate_object_id();
            snap.put_column(id, table_id);
            built.push(def.into_column(id, table_id));
        }
        snap.put_table(Table::new(table_id, name, built));
        debug!(table = name, id = table_id, "created table");
        Ok((snap, table_id))
    }

    pub fn add_column(
        &self,
        snapshot: &Snapshot,
        table: TableId,
        def: ColumnDef,
    ) -> Result<(Snapshot, ColumnId)> {
        let t = snapshot.table(table)?;
        ensure!(
            t.column_by_name(def.name()).is_none(),
            "column '{}' already exists in table '{}'",
            def.name(),
            t.name()
        );
        let mut snap = snapshot.clone();
        let id = snap.allocate_object_id();
        let next = t.with_column(def.into_column(id, table));
        if next.column(id).is_some_and(|c| c.is_not_null()) {
            self.validator(&snap, &next).scan_nulls(id, false)?;
        }
        snap.put_column(id, table);
        snap.put_table(next);
        Ok((snap, id))
    }

    /// Removes a column that no index uses.
    pub fn drop_column(&self, snapshot: &Snapshot, table: TableId, column: ColumnId) -> Result<Snapshot> {
        let t = snapshot.table(table)?.clone();
        let col = t
            .column(column)
            .ok_or_else(|| eyre::eyre!("column {} not found in table '{}'", column, t.name()))?
            .clone();
        for ix in t.indexes() {
            let ix = snapshot.index(ix)?;
            ensure!(
                !ix.keys().contains(column),
                "column '{}' is used by index '{}'",
                col.name(),
                ix.name()
            );
        }

        let mut snap = snapshot.clone();
        if !self.cx.cascade_authorized() {
            self.validator(&snap, &t).scan_nulls(column, true)?;
        } else {
            let clear: PTree<ColumnId, Value> = [(column, Value::Null)].into_iter().collect();
            let holders: Vec<_> = t
                .rows()
                .values()
                .filter(|r| r.has_value(column))
                .cloned()
                .collect();
            for row in holders {
                let position = snap.allocate_position();
                let next = row.apply_update(position, None, self.cx.provenance().clone(), &clear);
                relink_row(&mut snap, self.cx, &row, Arc::new(next), false)?;
            }
        }

        for check in col.checks() {
            snap.remove_object(check);
        }
        let next = snap.table(table)?.without_column(column);
        snap.put_table(next);
        snap.remove_object(column);
        debug!(table = t.name(), column = col.name(), "dropped column");
        Ok(snap)
    }

    pub fn create_index(&self, snapshot: &Snapshot, spec: IndexSpec) -> Result<(Snapshot, IndexId)> {
        let t = snapshot.table(spec.table)?;
        ensure!(!spec.columns.is_empty(), "index on '{}' needs at least one column", t.name());
        for c in &spec.columns {
            ensure!(
                t.column(*c).is_some(),
                "column {} does not belong to table '{}'",
                c,
                t.name()
            );
        }
        if spec.kind == ConstraintKind::PrimaryKey {
            ensure!(
                t.primary_index().is_none(),
                "table '{}' already has a primary key",
                t.name()
            );
        }

        let mut snap = snapshot.clone();
        let id = snap.allocate_object_id();
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| self.cx.namer().next_name());
        let mut index = Index::new(id, spec.table, Domain::new(spec.columns.iter().copied()), spec.kind)
            .with_name(name)
            .on_delete(spec.on_delete)
            .on_update(spec.on_update);
        if spec.allow_duplicates {
            index = index.allow_duplicates();
        }
        if spec.allow_unresolved {
            index = index.allow_unresolved();
        }

        let referenced_table = match spec.kind {
            ConstraintKind::ForeignKey => {
                let target_id = spec
                    .references
                    .ok_or_else(|| eyre::eyre!("foreign key on '{}' names no referenced index", t.name()))?;
                let target = snap.index(target_id)?;
                ensure!(
                    target.kind().is_unique(),
                    "foreign key must reference a primary or unique index, '{}' is {}",
                    target.name(),
                    target.kind()
                );
                ensure!(
                    target.keys().len() == spec.columns.len(),
                    "foreign key has {} columns but '{}' has {}",
                    spec.columns.len(),
                    target.name(),
                    target.keys().len()
                );
                index = index.references(target_id, target.table());
                Some(target.table())
            }
            _ => None,
        };

        let built = index
            .build(&snap, self.cx)
            .wrap_err_with(|| format!("building index '{}'", index.name()))?;
        debug!(index = %built, "created index");
        snap.put_index(built);

        let owner = snap
            .table(spec.table)?
            .with_index(id, spec.kind == ConstraintKind::PrimaryKey);
        snap.put_table(owner);
        if let Some(rt) = referenced_table {
            let referenced = snap.table(rt)?.with_referencing_index(id);
            snap.put_table(referenced);
        }
        Ok((snap, id))
    }

    pub fn drop_index(&self, snapshot: &Snapshot, index: IndexId) -> Result<Snapshot> {
        let mut snap = snapshot.clone();
        self.drop_index_in(&mut snap, index)?;
        Ok(snap)
    }

    fn drop_index_in(&self, snap: &mut Snapshot, index: IndexId) -> Result<()> {
        let ix = snap.index(index)?.clone();
        let owner = snap.table(ix.table())?.clone();
        let mut dependents = Vec::new();
        for fk in owner.referenced_by() {
            if snap.index(fk)?.reference().is_some_and(|r| r.index == index) {
                dependents.push(fk);
            }
        }
        if let Some(&first) = dependents.first() {
            if !self.cx.cascade_authorized() {
                let fk = snap.index(first)?;
                let names = Names::new(snap, self.cx);
                return Err(IntegrityError::RestrictViolation {
                    constraint_name: fk.name().to_string(),
                    table_name: names.name_of(fk.table()),
                    detail: "index referenced by foreign key".to_string(),
                }
                .into());
            }
            for fk in dependents {
                self.drop_index_in(snap, fk)?;
            }
        }

        let owner = snap.table(ix.table())?.without_index(index);
        snap.put_table(owner);
        if let Some(r) = ix.reference() {
            let referenced = snap.table(r.table)?.without_referencing_index(index);
            snap.put_table(referenced);
        }
        snap.remove_object(index);
        debug!(index = ix.name(), "dropped index");
        Ok(())
    }

    /// Attaches a check after validating it against every current row.
    pub fn add_check(
        &self,
        snapshot: &Snapshot,
        name: &str,
        target: CheckTarget,
        source: &str,
        expr: ExprId,
    ) -> Result<(Snapshot, CheckId)> {
        let mut snap = snapshot.clone();
        let id = snap.allocate_object_id();
        let check = Check::new(id, name, target, source, expr);
        match target {
            CheckTarget::Table(table) => {
                let t = snap.table(table)?.clone();
                self.validator(&snap, &t).scan_check(&check)?;
                snap.put_table(t.with_check(id));
            }
            CheckTarget::Column { table, column } => {
                let t = snap.table(table)?.clone();
                let c = t
                    .column(column)
                    .ok_or_else(|| eyre::eyre!("column {} not found in table '{}'", column, t.name()))?;
                self.validator(&snap, &t).scan_check(&check)?;
                let next = t.with_column(c.with_check(id));
                snap.put_table(next);
            }
            CheckTarget::Domain(_) => {}
        }
        debug!(check = %check, "added check");
        snap.put_check(check);
        Ok((snap, id))
    }

    pub fn drop_check(&self, snapshot: &Snapshot, check: CheckId) -> Result<Snapshot> {
        let c = snapshot.check(check)?;
        let mut snap = snapshot.clone();
        match c.target() {
            CheckTarget::Table(table) => {
                let t = snap.table(table)?.without_check(check);
                snap.put_table(t);
            }
            CheckTarget::Column { table, column } => {
                let t = snap.table(table)?;
                if let Some(col) = t.column(column) {
                    let next = t.with_column(col.without_check(check));
                    snap.put_table(next);
                }
            }
            CheckTarget::Domain(_) => {}
        }
        snap.remove_object(check);
        Ok(snap)
    }

    /// Changes a column's NOT NULL flag. Tightening fails if any row is null.
    pub fn set_not_null(
        &self,
        snapshot: &Snapshot,
        table: TableId,
        column: ColumnId,
        not_null: bool,
    ) -> Result<Snapshot> {
        let t = snapshot.table(table)?;
        let Some(col) = t.column(column) else {
            bail!("column {} not found in table '{}'", column, t.name());
        };
        if col.is_not_null() == not_null {
            return Ok(snapshot.clone());
        }
        if not_null {
            self.validator(snapshot, t).scan_nulls(column, false)?;
        }
        let mut snap = snapshot.clone();
        snap.put_table(t.with_column(col.with_not_null(not_null)));
        Ok(snap)
    }
}
