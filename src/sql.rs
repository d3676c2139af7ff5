//! Composable constructor for parameterized SELECT statements.
//!
//! The store assembles one statement from many optional filter families;
//! this builder keeps the pieces (joins, predicates, grouping, ordering,
//! limit) separate until [`SqlBuilder::compile`] flattens them. Nested
//! builders can be joined as parenthesized sub-selects, which is how the
//! environment maps and the per-command enrichment counts come in.
//!
//! Parameter order in the compiled statement is: column parameters, join
//! parameters (in join-registration order), predicate parameters, LIMIT.

use std::fmt::Write as _;

/// A single bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Real(f64),
    Null,
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value};
        Ok(match self {
            Self::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
            Self::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Self::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for SqlParam {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// Predicate template with `{0}` for the left-hand side and `{1}`,
/// `{2}`, ... for the bind placeholders of one predicate.
///
/// `render("{0} GLOB {1}", "command", 1)` yields `command GLOB ?`.
#[must_use]
pub fn render_matcher(template: &str, lhs: &str, numq: usize) -> String {
    let mut out = template.replace("{0}", lhs);
    for i in 1..=numq {
        out = out.replace(&format!("{{{i}}}"), "?");
    }
    out
}

/// Sort direction for `ORDER BY` terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// The opposite direction, used by `--reverse`.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Compiled output of a builder: SQL text, bind parameters, and the key
/// name for each SELECT column in order.
#[derive(Debug)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub keys: Vec<String>,
}

/// Composable SELECT statement builder.
#[derive(Debug, Default, Clone)]
pub struct SqlBuilder {
    join_source: String,
    columns: Vec<String>,
    keys: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    limit: Option<i64>,
    table_alias: Option<String>,
    column_params: Vec<SqlParam>,
    join_params: Vec<SqlParam>,
    params: Vec<SqlParam>,
    conditions: Vec<String>,
    ordering: Vec<(String, SortOrder)>,
}

impl SqlBuilder {
    /// Start a builder selecting `columns` from `source`. Keys default
    /// to the column expressions.
    pub fn new<S: Into<String>>(source: S, columns: &[&str]) -> Self {
        Self {
            join_source: source.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
            keys: columns.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Override the per-column keys (row field names).
    #[must_use]
    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(ToString::to_string).collect();
        self
    }

    /// Name this builder's sub-select so a parent join can reference it
    /// through `{r}` in its ON clause.
    #[must_use]
    pub fn with_table_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.table_alias = Some(alias.into());
        self
    }

    /// Row cap; a negative value means no LIMIT clause.
    pub fn set_limit(&mut self, limit: Option<i64>) {
        self.limit = limit;
    }

    /// Append a plain-table join clause. `{r}` in `on` refers to the
    /// joined source.
    pub fn join(&mut self, source: &str, op: &str, on: &str) {
        let on = on.replace("{r}", source);
        self.push_join(source.to_string(), op, &on);
    }

    /// Join another builder as a parenthesized sub-select.
    ///
    /// The sub-select is compiled immediately: later changes to `source`
    /// do not affect this builder. Its parameters bind in join
    /// registration order, before any predicate parameters.
    pub fn join_builder(&mut self, source: &SqlBuilder, op: &str, on: &str) {
        let compiled = source.compile();
        self.join_params.extend(compiled.params);
        let mut jsrc = format!("( {} )", compiled.sql);
        let on = if let Some(alias) = &source.table_alias {
            let _ = write!(jsrc, " AS {alias}");
            on.replace("{r}", alias)
        } else {
            on.to_string()
        };
        self.push_join(jsrc, op, &on);
    }

    fn push_join(&mut self, jsrc: String, op: &str, on: &str) {
        let _ = write!(self.join_source, " {op} {jsrc}");
        if !on.is_empty() {
            let _ = write!(self.join_source, " ON {on}");
        }
    }

    /// Append predicates combined into the WHERE conjunction, one per
    /// parameter group. Each group binds `group.len()` placeholders.
    pub fn add_and_matches(&mut self, matcher: &str, lhs: &str, groups: &[Vec<SqlParam>]) {
        for group in groups {
            self.conditions.push(render_matcher(matcher, lhs, group.len()));
            self.params.extend(group.iter().cloned());
        }
    }

    /// Append predicates combined into one parenthesized OR disjunction.
    pub fn add_or_matches(&mut self, matcher: &str, lhs: &str, groups: &[Vec<SqlParam>]) {
        if groups.is_empty() {
            return;
        }
        let exprs: Vec<String> = groups
            .iter()
            .map(|group| render_matcher(matcher, lhs, group.len()))
            .collect();
        self.conditions.push(format!("({})", exprs.join(" OR ")));
        for group in groups {
            self.params.extend(group.iter().cloned());
        }
    }

    /// Append one parenthesized OR disjunction over pre-rendered
    /// expressions. Used when a single disjunction mixes matchers
    /// (e.g. GLOB and REGEXP alternatives over the same rows).
    pub fn add_or_exprs(&mut self, exprs: &[String], params: Vec<SqlParam>) {
        if exprs.is_empty() {
            return;
        }
        self.conditions.push(format!("({})", exprs.join(" OR ")));
        self.params.extend(params);
    }

    /// Convenience for the three standard filter modes: `match_groups`
    /// AND together, `include_groups` form one OR block, and
    /// `exclude_groups` AND the negated matcher.
    pub fn add_matches(
        &mut self,
        matcher: &str,
        lhs: &str,
        match_groups: &[Vec<SqlParam>],
        include_groups: &[Vec<SqlParam>],
        exclude_groups: &[Vec<SqlParam>],
    ) {
        let negated = format!("NOT {matcher}");
        self.add_and_matches(matcher, lhs, match_groups);
        self.add_or_matches(matcher, lhs, include_groups);
        self.add_and_matches(&negated, lhs, exclude_groups);
    }

    /// Extend the SELECT list. Extra parameters bind in column position.
    pub fn add_column(&mut self, expr: &str, key: Option<&str>, params: &[SqlParam]) {
        self.columns.push(expr.to_string());
        self.keys.push(key.unwrap_or(expr).to_string());
        self.column_params.extend(params.iter().cloned());
    }

    pub fn add_group_by(&mut self, expr: &str) {
        self.group_by.push(expr.to_string());
    }

    pub fn add_having(&mut self, expr: &str) {
        self.having.push(expr.to_string());
    }

    pub fn order_by(&mut self, expr: &str, order: SortOrder) {
        self.ordering.push((expr.to_string(), order));
    }

    /// Group by `column` and wrap the `chooser` column in `aggregate` so
    /// each group is represented by the row the aggregate picks. The
    /// chooser may name either a plain column or the expression part of
    /// an `expr AS alias` column; the alias survives the wrap.
    pub fn uniquify_by(&mut self, column: &str, chooser: Option<&str>, aggregate: &str) {
        self.group_by.push(column.to_string());
        let Some(chooser) = chooser else { return };
        let aliased = format!("{chooser} AS ");
        if let Some(i) = self
            .columns
            .iter()
            .position(|c| c == chooser || c.starts_with(&aliased))
        {
            self.columns[i] = match self.columns[i].split_once(" AS ") {
                Some((expr, alias)) => format!("{aggregate}({expr}) AS {alias}"),
                None => format!("{aggregate}({})", self.columns[i]),
            };
        }
    }

    /// Promote the current WHERE conjunction into a boolean SELECT
    /// column named `column`, clearing the WHERE state. With no
    /// conditions the column is constant true.
    pub fn move_where_clause_to_column(&mut self, column: &str) {
        let (expr, params) = if self.conditions.is_empty() {
            ("1".to_string(), Vec::new())
        } else {
            (
                self.conditions.join(" AND "),
                std::mem::take(&mut self.params),
            )
        };
        self.conditions.clear();
        self.add_column(&format!("({expr}) AS {column}"), Some(column), &params);
    }

    /// Flatten the builder into SQL text, bind parameters, and keys.
    #[must_use]
    pub fn compile(&self) -> CompiledSql {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.columns.join(", "),
            self.join_source
        );
        if !self.conditions.is_empty() {
            let _ = write!(sql, " WHERE {}", self.conditions.join(" AND "));
        }
        if !self.group_by.is_empty() {
            let _ = write!(sql, " GROUP BY {}", self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            let _ = write!(sql, " HAVING {}", self.having.join(" AND "));
        }
        if !self.ordering.is_empty() {
            let terms: Vec<String> = self
                .ordering
                .iter()
                .map(|(expr, order)| format!("{expr} {}", order.as_str()))
                .collect();
            let _ = write!(sql, " ORDER BY {}", terms.join(", "));
        }

        let mut params = Vec::with_capacity(
            self.column_params.len() + self.join_params.len() + self.params.len() + 1,
        );
        params.extend(self.column_params.iter().cloned());
        params.extend(self.join_params.iter().cloned());
        params.extend(self.params.iter().cloned());
        if let Some(limit) = self.limit {
            if limit >= 0 {
                sql.push_str(" LIMIT ?");
                params.push(SqlParam::Int(limit));
            }
        }

        CompiledSql {
            sql,
            params,
            keys: self.keys.clone(),
        }
    }
}

/// Wrap scalar parameters into one-element groups (one placeholder per
/// predicate).
#[must_use]
pub fn scalar_groups<P: Into<SqlParam> + Clone>(params: &[P]) -> Vec<Vec<SqlParam>> {
    params
        .iter()
        .map(|p| vec![p.clone().into()])
        .collect()
}

/// Wrap `(a, b)` pairs into two-element groups for two-placeholder
/// matchers.
#[must_use]
pub fn pair_groups(params: &[(String, String)]) -> Vec<Vec<SqlParam>> {
    params
        .iter()
        .map(|(a, b)| vec![SqlParam::Text(a.clone()), SqlParam::Text(b.clone())])
        .collect()
}
