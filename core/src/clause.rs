//! WHERE / ORDER BY 子句的组成部分

use crate::error::SqlxFluentError;
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// SQL 操作符（允许列表）
///
/// 列名与操作符以原样文本拼入 SQL，只有值走占位符，因此操作符只接受以下几种。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// 等于: =
    Eq,
    /// 不等于: !=
    Ne,
    /// 不等于: <>
    LtGt,
    /// 大于: >
    Gt,
    /// 大于等于: >=
    Ge,
    /// 小于: <
    Lt,
    /// 小于等于: <=
    Le,
    /// LIKE 匹配
    Like,
    /// NOT LIKE 匹配
    NotLike,
    /// ILIKE 匹配（PostgreSQL）
    ILike,
    /// IN 查询: IN (?, ?, ...)
    In,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::LtGt => "<>",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
        }
    }

    /// 生成 `操作符 占位符` 片段
    ///
    /// `IN` 每个元素一个占位符；空列表渲染为 `IN (NULL)`，不匹配任何行。
    pub fn to_sql(&self, placeholders: &[String]) -> String {
        match self {
            Operator::In if placeholders.is_empty() => "IN (NULL)".to_string(),
            Operator::In => format!("IN ({})", placeholders.join(", ")),
            op => format!("{} {}", op.as_sql(), placeholders.join(", ")),
        }
    }
}

impl FromStr for Operator {
    type Err = SqlxFluentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "<>" => Ok(Operator::LtGt),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "ILIKE" => Ok(Operator::ILike),
            "IN" => Ok(Operator::In),
            _ => Err(SqlxFluentError::InvalidOperator(s.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = SqlxFluentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(SqlxFluentError::Other(format!(
                "Invalid order direction: {}",
                s
            ))),
        }
    }
}

/// 单个过滤条件（AND 连接）
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl WhereClause {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// 该条件占用的占位符数量
    pub fn bind_count(&self) -> usize {
        match &self.value {
            Value::List(items) => items.len(),
            _ => 1,
        }
    }

    /// 按占位符顺序展开的绑定值
    pub fn bind_values(&self) -> impl Iterator<Item = &Value> {
        match &self.value {
            Value::List(items) => items.iter(),
            value => std::slice::from_ref(value).iter(),
        }
    }
}

/// 单个排序项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub column: String,
    pub direction: Direction,
}
