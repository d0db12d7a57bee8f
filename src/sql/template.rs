//! Runtime placeholders and the final substitution pass.
//!
//! Generated SQL may reference values only known when a load actually
//! runs: the incremental cutoff, the load timestamp and the load-run id.
//! The compiler emits them as [`Placeholder`] tokens which serialize to
//! fixed markers; [`substitute`] is the single place those markers are
//! replaced.

use super::dialect::{Dialect, SqlDialect};
use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use thiserror::Error;

/// `{{NAME}}` or `{{ name }}`.
static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// A value resolved at run time, never at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    /// Lower bound of an incremental window.
    DeltaCutoff,
    /// Timestamp shared by every statement of one load.
    LoadTimestamp,
    /// Identifier of the current load run.
    LoadRunId,
}

impl Placeholder {
    pub const ALL: [Placeholder; 3] = [
        Placeholder::DeltaCutoff,
        Placeholder::LoadTimestamp,
        Placeholder::LoadRunId,
    ];

    /// The exact text emitted into SQL.
    pub fn marker(&self) -> &'static str {
        match self {
            Placeholder::DeltaCutoff => "{{DELTA_CUTOFF}}",
            Placeholder::LoadTimestamp => "{{ load_timestamp }}",
            Placeholder::LoadRunId => "{{ load_run_id }}",
        }
    }

    /// Resolve a marker name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "delta_cutoff" => Some(Placeholder::DeltaCutoff),
            "load_timestamp" => Some(Placeholder::LoadTimestamp),
            "load_run_id" => Some(Placeholder::LoadRunId),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{{{0}}}}}'")]
    Unknown(String),

    #[error("no runtime value supplied for {0}")]
    Unresolved(&'static str),
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Values substituted into a rendered load.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeValues {
    pub load_run_id: String,
    pub load_timestamp: NaiveDateTime,
    /// Absent on a first (full) load.
    pub delta_cutoff: Option<NaiveDateTime>,
}

/// Placeholders referenced by `sql`.
pub fn placeholders_in(sql: &str) -> TemplateResult<BTreeSet<Placeholder>> {
    PLACEHOLDER_PATTERN
        .captures_iter(sql)
        .map(|caps| {
            let name = &caps[1];
            Placeholder::from_name(name).ok_or_else(|| TemplateError::Unknown(name.to_string()))
        })
        .collect()
}

/// Replace every placeholder in `sql` with a dialect literal.
///
/// Fails on unknown placeholder names and on a `DELTA_CUTOFF` reference
/// when no cutoff is supplied. Text outside the markers is untouched.
pub fn substitute(sql: &str, dialect: Dialect, values: &RuntimeValues) -> TemplateResult<String> {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;

    for caps in PLACEHOLDER_PATTERN.captures_iter(sql) {
        let Some(whole) = caps.get(0) else { continue };
        let name = &caps[1];
        let placeholder =
            Placeholder::from_name(name).ok_or_else(|| TemplateError::Unknown(name.to_string()))?;

        out.push_str(&sql[last..whole.start()]);
        out.push_str(&resolve(placeholder, dialect, values)?);
        last = whole.end();
    }

    out.push_str(&sql[last..]);
    Ok(out)
}

fn resolve(
    placeholder: Placeholder,
    dialect: Dialect,
    values: &RuntimeValues,
) -> TemplateResult<String> {
    match placeholder {
        Placeholder::LoadRunId => Ok(dialect.quote_string(&values.load_run_id)),
        Placeholder::LoadTimestamp => Ok(dialect.format_timestamp_literal(&format_ts(
            &values.load_timestamp,
        ))),
        Placeholder::DeltaCutoff => values
            .delta_cutoff
            .map(|ts| dialect.format_timestamp_literal(&format_ts(&ts)))
            .ok_or(TemplateError::Unresolved("DELTA_CUTOFF")),
    }
}

pub(crate) fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn values(cutoff: bool) -> RuntimeValues {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        RuntimeValues {
            load_run_id: "run-42".into(),
            load_timestamp: ts,
            delta_cutoff: cutoff.then_some(ts),
        }
    }

    #[test]
    fn test_placeholders_in() {
        let found = placeholders_in("x >= {{DELTA_CUTOFF}} AND y = {{ load_run_id }}").unwrap();
        assert!(found.contains(&Placeholder::DeltaCutoff));
        assert!(found.contains(&Placeholder::LoadRunId));
        assert!(!found.contains(&Placeholder::LoadTimestamp));
    }

    #[test]
    fn test_substitute_postgres() {
        let sql = "SELECT {{ load_run_id }}, {{ load_timestamp }}";
        let out = substitute(sql, Dialect::Postgres, &values(false)).unwrap();
        assert_eq!(
            out,
            "SELECT 'run-42', CAST('2024-03-01 12:30:00' AS TIMESTAMP)"
        );
    }

    #[test]
    fn test_spacing_variants_accepted() {
        let out = substitute("{{delta_cutoff}}", Dialect::Oracle, &values(true)).unwrap();
        assert_eq!(out, "TIMESTAMP '2024-03-01 12:30:00'");
    }

    #[test]
    fn test_missing_cutoff_is_error() {
        let err = substitute("WHERE a > {{DELTA_CUTOFF}}", Dialect::DuckDb, &values(false))
            .unwrap_err();
        assert_eq!(err, TemplateError::Unresolved("DELTA_CUTOFF"));
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let err = substitute("{{ whoami }}", Dialect::DuckDb, &values(true)).unwrap_err();
        assert_eq!(err, TemplateError::Unknown("whoami".into()));
    }

    #[test]
    fn test_text_outside_markers_untouched() {
        let sql = "SELECT '{ not a marker }' FROM t";
        assert_eq!(substitute(sql, Dialect::DuckDb, &values(false)).unwrap(), sql);
    }
}
