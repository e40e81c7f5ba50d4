//! 命令行查询参数解析

use anyhow::{bail, Context, Result};
use clap::Args;
use sqlxfluent::{Builder, Data, Direction, Value};

/// 所有子命令共享的查询参数
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Table name
    #[arg(short, long)]
    pub table: String,

    /// Columns to select (comma separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    pub select: Vec<String>,

    /// Filter in the form "column operator value", e.g. "age > 18"
    #[arg(short, long = "where")]
    pub wheres: Vec<String>,

    /// Ordering in the form "column [asc|desc]"
    #[arg(short, long = "order")]
    pub orders: Vec<String>,

    #[arg(long)]
    pub limit: Option<u64>,

    #[arg(long)]
    pub offset: Option<u64>,

    /// SELECT DISTINCT
    #[arg(long)]
    pub distinct: bool,
}

impl QueryArgs {
    /// 把参数应用到 Builder 上
    pub fn apply<T>(&self, builder: &mut Builder<T>) -> Result<()> {
        if !self.select.is_empty() {
            builder.select(self.select.iter().map(|c| c.trim().to_string()));
        }
        if self.distinct {
            builder.distinct();
        }
        for raw in &self.wheres {
            let (column, operator, value) = parse_where(raw)?;
            builder.and_where(column, &operator, value);
        }
        for raw in &self.orders {
            let (column, direction) = parse_order(raw)?;
            builder.order_by(column, direction);
        }
        if let Some(limit) = self.limit {
            builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder.offset(offset);
        }
        Ok(())
    }
}

/// 切出第一个空白分隔的词，返回 (词, 剩余部分)
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// 解析 "column operator value"，`NOT LIKE` 作为一个操作符
///
/// `in` 的值按逗号拆成列表，可带括号：`id in (1, 2, 3)`。
pub fn parse_where(raw: &str) -> Result<(String, String, Value)> {
    let (column, rest) = split_token(raw);
    let (operator, mut rest) = split_token(rest);
    let mut operator = operator.to_string();
    if operator.eq_ignore_ascii_case("not") {
        let (second, tail) = split_token(rest);
        operator = format!("{} {}", operator, second);
        rest = tail;
    }
    let value = rest.trim();
    if column.is_empty() || operator.is_empty() || value.is_empty() {
        bail!("Invalid --where '{}', expected \"column operator value\"", raw);
    }
    let value = if operator.eq_ignore_ascii_case("in") {
        let inner = value
            .strip_prefix('(')
            .and_then(|v| v.strip_suffix(')'))
            .unwrap_or(value);
        Value::list(
            inner
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(parse_value),
        )
    } else {
        parse_value(value)
    };
    Ok((column.to_string(), operator, value))
}

/// 解析 "column [asc|desc]"
pub fn parse_order(raw: &str) -> Result<(String, Direction)> {
    let (column, rest) = split_token(raw);
    if column.is_empty() {
        bail!("Invalid --order '{}', expected \"column [asc|desc]\"", raw);
    }
    let rest = rest.trim();
    let direction = if rest.is_empty() {
        Direction::default()
    } else {
        rest.parse::<Direction>()
            .with_context(|| format!("Invalid direction in --order '{}'", raw))?
    };
    Ok((column.to_string(), direction))
}

/// 解析若干 "key=value" 为写入数据
pub fn parse_set(pairs: &[String]) -> Result<Data> {
    let mut data = Data::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid --set '{}', expected key=value", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid --set '{}', empty key", pair);
        }
        data.insert(key, parse_value(value.trim()));
    }
    Ok(data)
}

/// 字面量推断：null / true / false / 整数 / 浮点数，带引号的按字符串处理
pub fn parse_value(raw: &str) -> Value {
    let quoted = raw.len() >= 2
        && ((raw.starts_with('\'') && raw.ends_with('\''))
            || (raw.starts_with('"') && raw.ends_with('"')));
    if quoted {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::Float64(f);
        }
    }
    Value::String(raw.to_string())
}
