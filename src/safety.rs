//! Read-only guard for generated SQL.
//!
//! Parses a sanitized statement with sqlparser and rejects anything that
//! would write: non-query statements, `SELECT ... INTO`, and data-modifying
//! CTEs. Text that does not parse is let through; the execution service
//! reports grammar errors itself.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::error::{Result, SageError};

/// Rejects statements that are not pure reads.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let statements = match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            debug!("Read-only guard could not parse statement, deferring to database: {e}");
            return Ok(());
        }
    };

    match statements.as_slice() {
        [] => Ok(()),
        [Statement::Query(query)] => check_query(query),
        [statement] => Err(SageError::ReadOnlyViolation(statement_kind(statement))),
        _ => Err(SageError::ReadOnlyViolation(format!(
            "{} statements found, expected one",
            statements.len()
        ))),
    }
}

fn statement_kind(statement: &Statement) -> String {
    let text = statement.to_string();
    let keyword = text.split_whitespace().next().unwrap_or("unknown");
    format!("{} statement", keyword.to_uppercase())
}

fn check_query(query: &Query) -> Result<()> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(set_expr: &SetExpr) -> Result<()> {
    match set_expr {
        SetExpr::Select(select) => check_select(select),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        // INSERT/UPDATE/DELETE bodies inside a WITH clause
        other => Err(SageError::ReadOnlyViolation(format!(
            "data-modifying expression: {}",
            other
        ))),
    }
}

fn check_select(select: &Select) -> Result<()> {
    if let Some(into) = &select.into {
        return Err(SageError::ReadOnlyViolation(format!(
            "SELECT INTO {}",
            into.name
        )));
    }
    select.from.iter().try_for_each(check_table_with_joins)
}

fn check_table_with_joins(twj: &TableWithJoins) -> Result<()> {
    check_table_factor(&twj.relation)?;
    twj.joins
        .iter()
        .try_for_each(|join| check_table_factor(&join.relation))
}

fn check_table_factor(factor: &TableFactor) -> Result<()> {
    match factor {
        TableFactor::Derived { subquery, .. } => check_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => check_table_with_joins(table_with_joins),
        _ => Ok(()),
    }
}
