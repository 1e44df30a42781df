//! Validated query value object for reads against the remote data service.
//!
//! A [`Query`] is built once through [`QueryBuilder::build`], which rejects bad
//! identifiers and contradictory pagination, and then rendered to PostgREST
//! query parameters by [`Query::to_params`].

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("invalid column identifier '{0}'")]
    InvalidColumn(String),

    #[error("limit must be greater than zero")]
    ZeroLimit,

    #[error("invalid range {from}..={to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("range {from}..={to} spans more rows than a limit can hold")]
    RangeTooLarge { from: u32, to: u32 },

    #[error("limit and range cannot both be set")]
    LimitAndRange,

    #[error("'in' filter on '{0}' needs at least one value")]
    EmptyInList(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<FilterValue>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Int(i) => write!(f, "{i}"),
            FilterValue::Float(x) => write!(f, "{x}"),
            FilterValue::Bool(b) => write!(f, "{b}"),
            FilterValue::Null => f.write_str("null"),
            FilterValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(quote_list_item).collect();
                write!(f, "({})", rendered.join(","))
            }
        }
    }
}

/// Items inside `in.(...)` must be quoted when they contain reserved characters.
fn quote_list_item(value: &FilterValue) -> String {
    let raw = value.to_string();
    if raw.contains(&[',', '(', ')', '"', ' '][..]) {
        format!("\"{}\"", raw.replace('"', "\\\""))
    } else {
        raw
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<Uuid> for FilterValue {
    fn from(v: Uuid) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    Is,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::ILike => "ilike",
            FilterOp::Is => "is",
            FilterOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    fn new(column: &str, op: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    pub fn eq(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOp::Eq, value.into())
    }

    pub fn neq(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOp::Neq, value.into())
    }

    pub fn gt(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOp::Gt, value.into())
    }

    pub fn gte(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOp::Gte, value.into())
    }

    pub fn lt(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOp::Lt, value.into())
    }

    pub fn lte(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(column, FilterOp::Lte, value.into())
    }

    pub fn like(column: &str, pattern: &str) -> Self {
        Self::new(column, FilterOp::Like, pattern.into())
    }

    pub fn ilike(column: &str, pattern: &str) -> Self {
        Self::new(column, FilterOp::ILike, pattern.into())
    }

    pub fn is_null(column: &str) -> Self {
        Self::new(column, FilterOp::Is, FilterValue::Null)
    }

    pub fn in_list<V: Into<FilterValue>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(
            column,
            FilterOp::In,
            FilterValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Renders as a `(column, "op.value")` query pair.
    pub fn to_param(&self) -> (String, String) {
        (self.column.clone(), format!("{}.{}", self.op.as_str(), self.value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    fn render(&self) -> String {
        let dir = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        format!("{}.{dir}", self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    columns: Vec<String>,
    filters: Vec<Filter>,
    order: Vec<Order>,
    limit: Option<u32>,
    offset: Option<u32>,
    scoped: bool,
}

impl Default for Query {
    /// `select=*`, scoped to the signed-in user.
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            scoped: true,
        }
    }
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order(&self) -> &[Order] {
        &self.order
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub fn is_scoped(&self) -> bool {
        self.scoped
    }

    /// Adds a filter to an already-validated query. Only used with
    /// identifiers owned by the crate, such as `user_id`.
    pub(crate) fn and(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Default ordering applied when the caller did not pick one.
    pub(crate) fn or_order_by(mut self, column: &str, direction: Direction) -> Self {
        if self.order.is_empty() {
            self.order.push(Order {
                column: column.to_string(),
                direction,
            });
        }
        self
    }

    pub fn select_clause(&self) -> String {
        if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        }
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.select_clause())];
        params.extend(self.filters.iter().map(Filter::to_param));
        if !self.order.is_empty() {
            let order: Vec<String> = self.order.iter().map(Order::render).collect();
            params.push(("order".to_string(), order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }
}

#[derive(Debug, Default)]
pub struct QueryBuilder {
    columns: Vec<String>,
    filters: Vec<Filter>,
    order: Vec<Order>,
    limit: Option<u32>,
    range: Option<(u32, u32)>,
    unscoped: bool,
}

impl QueryBuilder {
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Inclusive row range, zero-based.
    pub fn range(mut self, from: u32, to: u32) -> Self {
        self.range = Some((from, to));
        self
    }

    /// Skips the automatic `user_id` filter.
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    pub fn build(self) -> Result<Query, QueryError> {
        for column in &self.columns {
            if column != "*" && !is_identifier(column) {
                return Err(QueryError::InvalidColumn(column.clone()));
            }
        }
        for filter in &self.filters {
            if !is_identifier(&filter.column) {
                return Err(QueryError::InvalidColumn(filter.column.clone()));
            }
            if let FilterValue::List(items) = &filter.value {
                if items.is_empty() {
                    return Err(QueryError::EmptyInList(filter.column.clone()));
                }
            }
        }
        for order in &self.order {
            if !is_identifier(&order.column) {
                return Err(QueryError::InvalidColumn(order.column.clone()));
            }
        }

        let (limit, offset) = match (self.limit, self.range) {
            (Some(_), Some(_)) => return Err(QueryError::LimitAndRange),
            (Some(0), None) => return Err(QueryError::ZeroLimit),
            (Some(limit), None) => (Some(limit), None),
            (None, Some((from, to))) if from > to => {
                return Err(QueryError::InvalidRange { from, to })
            }
            (None, Some((from, to))) => {
                let limit = (to - from)
                    .checked_add(1)
                    .ok_or(QueryError::RangeTooLarge { from, to })?;
                (Some(limit), Some(from))
            }
            (None, None) => (None, None),
        };

        Ok(Query {
            columns: self.columns,
            filters: self.filters,
            order: self.order,
            limit,
            offset,
            scoped: !self.unscoped,
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
