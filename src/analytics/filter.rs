//! Search filters
//!
//! A search expression is a conjunction of `(field, operator, value)`
//! conditions plus optional sorting and a result cap. It can be built in code
//! or parsed from a SQL `WHERE`-style predicate:
//!
//! ```text
//! ExperimentName = 'pipe-mode-demo' AND "train:loss - Min" < 0.5
//! TrialName LIKE '%2024-03%'
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// Comparison applied by one filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    /// `=`
    Equals,
    /// `!=` / `<>`
    NotEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqualTo,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqualTo,
    /// Substring match (text only)
    Contains,
}

impl FilterOperator {
    /// Apply to an ordering of `field` relative to the filter value.
    pub(crate) fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Equals => ordering == Equal,
            Self::NotEquals => ordering != Equal,
            Self::GreaterThan => ordering == Greater,
            Self::GreaterThanOrEqualTo => ordering != Less,
            Self::LessThan => ordering == Less,
            Self::LessThanOrEqualTo => ordering != Greater,
            Self::Contains => false,
        }
    }
}

/// Right-hand side of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    /// String literal
    Text(String),
    /// Numeric literal
    Number(f64),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FilterValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

/// One match condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Column the condition applies to
    pub name: String,
    /// Comparison
    pub operator: FilterOperator,
    /// Value compared against
    pub value: FilterValue,
}

impl SearchFilter {
    /// Create a filter.
    pub fn new(name: impl Into<String>, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        Self {
            name: name.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// Filters (all must match), sort key and result cap.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchExpression {
    /// Conjunction of conditions
    pub filters: Vec<SearchFilter>,
    /// Column to sort by
    pub sort_by: Option<String>,
    /// Sort direction
    pub sort_order: SortOrder,
    /// Maximum rows returned
    pub max_results: Option<usize>,
}

impl SearchExpression {
    /// Match everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `WHERE`-style predicate into filters.
    ///
    /// Supports `AND`, parentheses, `= != <> < <= > >=` against number or
    /// single-quoted string literals, and `LIKE '%text%'`. Column names that
    /// are not plain identifiers go in double quotes.
    ///
    /// # Errors
    /// Returns `Error::ParseError` for syntax errors or unsupported constructs
    /// (`OR`, functions, column-to-column comparisons, ...)
    ///
    /// # Example
    /// ```
    /// use pipemode::analytics::{FilterOperator, SearchExpression};
    ///
    /// # fn main() -> pipemode::Result<()> {
    /// let expr = SearchExpression::parse(
    ///     r#"ExperimentName = 'demo' AND "train:loss - Min" <= 0.25"#,
    /// )?;
    /// assert_eq!(expr.filters.len(), 2);
    /// assert_eq!(expr.filters[1].operator, FilterOperator::LessThanOrEqualTo);
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse(predicate: &str) -> Result<Self> {
        if predicate.trim().is_empty() {
            return Ok(Self::new());
        }
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(predicate)
            .map_err(|e| Error::ParseError(e.to_string()))?;
        let expr = parser
            .parse_expr()
            .map_err(|e| Error::ParseError(e.to_string()))?;
        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(Error::ParseError(format!(
                "unexpected trailing input starting at '{}'",
                trailing.token
            )));
        }

        let mut filters = Vec::new();
        collect_filters(&expr, &mut filters)?;
        Ok(Self {
            filters,
            ..Self::default()
        })
    }

    /// Add a condition.
    #[must_use]
    pub fn filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sort results by a column.
    #[must_use]
    pub fn sort_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(column.into());
        self.sort_order = order;
        self
    }

    /// Cap the number of rows.
    #[must_use]
    pub const fn max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }
}

fn collect_filters(expr: &Expr, out: &mut Vec<SearchFilter>) -> Result<()> {
    match expr {
        Expr::Nested(inner) => collect_filters(inner, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_filters(left, out)?;
            collect_filters(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let operator = match op {
                BinaryOperator::Eq => FilterOperator::Equals,
                BinaryOperator::NotEq => FilterOperator::NotEquals,
                BinaryOperator::Gt => FilterOperator::GreaterThan,
                BinaryOperator::GtEq => FilterOperator::GreaterThanOrEqualTo,
                BinaryOperator::Lt => FilterOperator::LessThan,
                BinaryOperator::LtEq => FilterOperator::LessThanOrEqualTo,
                other => {
                    return Err(Error::ParseError(format!(
                        "operator '{other}' not supported in filters"
                    )))
                }
            };
            out.push(SearchFilter {
                name: column_name(left)?,
                operator,
                value: literal(right)?,
            });
            Ok(())
        }
        Expr::Like {
            negated: false,
            expr,
            pattern,
            ..
        } => {
            let FilterValue::Text(pattern) = literal(pattern)? else {
                return Err(Error::ParseError("LIKE needs a string pattern".to_string()));
            };
            let needle = pattern
                .strip_prefix('%')
                .and_then(|p| p.strip_suffix('%'))
                .filter(|p| !p.contains('%') && !p.contains('_'))
                .ok_or_else(|| {
                    Error::ParseError(format!(
                        "LIKE pattern '{pattern}' must have the form '%text%'"
                    ))
                })?;
            out.push(SearchFilter::new(
                column_name(expr)?,
                FilterOperator::Contains,
                needle,
            ));
            Ok(())
        }
        other => Err(Error::ParseError(format!(
            "unsupported filter expression: {other}"
        ))),
    }
}

fn column_name(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => Ok(parts
            .iter()
            .map(|ident| ident.value.as_str())
            .collect::<Vec<_>>()
            .join(".")),
        other => Err(Error::ParseError(format!(
            "expected a column name, found '{other}'"
        ))),
    }
}

fn literal(expr: &Expr) -> Result<FilterValue> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n
            .parse::<f64>()
            .map(FilterValue::Number)
            .map_err(|_| Error::ParseError(format!("invalid number '{n}'"))),
        Expr::Value(Value::SingleQuotedString(s)) => Ok(FilterValue::Text(s.clone())),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            FilterValue::Number(n) => Ok(FilterValue::Number(-n)),
            FilterValue::Text(_) => Err(Error::ParseError(
                "cannot negate a string literal".to_string(),
            )),
        },
        other => Err(Error::ParseError(format!(
            "expected a literal value, found '{other}'"
        ))),
    }
}
