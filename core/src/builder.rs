//! 流式查询构建器
//!
//! `Builder` 持有一次查询的全部可变状态。配置方法只修改状态、不做 I/O；终结操作
//! （`get` / `first` / `count` / `create` / `create_many` / `update` / `delete`）
//! 先取出并重置状态，再通过 [`Grammar`] 编译 SQL、交给 [`Executor`] 执行。
//! 状态在终结操作开始时就被重置，无论成功还是失败，实例都可以立即复用。
//!
//! 配置需要 `&mut self`，同一个实例不能被多个任务同时配置；并发查询请通过
//! [`Builder::table`] 获取各自独立的实例。

use crate::clause::{Direction, Operator, OrderClause, WhereClause};
use crate::db_pool::DbDriver;
use crate::error::{Result, SqlxFluentError};
use crate::executor::{Executor, Record};
use crate::grammar::Grammar;
use crate::utils::{is_safe_field_name, is_safe_table_name};
use crate::value::{Data, Value};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 单个 Builder 的查询状态
#[derive(Debug)]
struct QueryState {
    table: String,
    columns: Vec<String>,
    wheres: Vec<WhereClause>,
    orders: Vec<OrderClause>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    // 按占位符顺序展开的条件值
    bindings: Vec<Value>,
    // 配置阶段发现的第一个错误，在终结操作时报告
    build_error: Option<SqlxFluentError>,
}

impl QueryState {
    fn new(table: String) -> Self {
        Self {
            table,
            columns: vec!["*".to_string()],
            wheres: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            bindings: Vec::new(),
            build_error: None,
        }
    }
}

/// 流式查询构建器，`T` 为结果行的形状
///
/// `T` 默认为 [`Record`]；任何实现了 `Deserialize` 的结构体都可以作为行形状，
/// 结果行按列名映射到字段。
pub struct Builder<T = Record> {
    executor: Arc<dyn Executor>,
    grammar: Arc<dyn Grammar>,
    state: QueryState,
    _row: PhantomData<fn() -> T>,
}

impl Builder<Record> {
    /// 创建未选择表的 Builder
    ///
    /// 方言语法取自执行器声明的 [`Executor::dialect`]；未声明时使用 `$N` 占位符。
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let dialect = executor.dialect().unwrap_or(DbDriver::Postgres);
        Self::with_grammar(executor, Arc::new(dialect))
    }

    /// 使用自定义方言语法创建 Builder
    pub fn with_grammar(executor: Arc<dyn Executor>, grammar: Arc<dyn Grammar>) -> Self {
        Self {
            executor,
            grammar,
            state: QueryState::new(String::new()),
            _row: PhantomData,
        }
    }
}

impl<T> Builder<T> {
    /// 选择表，返回一个新的、状态为空的 Builder
    ///
    /// 新实例与当前实例共享执行器和方言语法，但不共享任何查询状态。
    pub fn table<U>(&self, name: impl Into<String>) -> Builder<U> {
        let name = name.into();
        let mut state = QueryState::new(name);
        if !state.table.is_empty() && !is_safe_table_name(&state.table) {
            state.build_error = Some(SqlxFluentError::InvalidIdentifier(state.table.clone()));
        }
        Builder {
            executor: Arc::clone(&self.executor),
            grammar: Arc::clone(&self.grammar),
            state,
            _row: PhantomData,
        }
    }

    /// 当前表名（未选择时为空串）
    pub fn table_name(&self) -> &str {
        &self.state.table
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn grammar(&self) -> &Arc<dyn Grammar> {
        &self.grammar
    }

    /// 替换查询列
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// SELECT DISTINCT
    pub fn distinct(&mut self) -> &mut Self {
        self.state.distinct = true;
        self
    }

    /// 追加一个 AND 条件：`column operator value`
    ///
    /// 操作符必须在 [`Operator`] 允许列表内，列名必须是合法标识符；否则错误会在
    /// 下一次终结操作时返回，且不会访问数据库。
    pub fn and_where(
        &mut self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Value>,
    ) -> &mut Self {
        let column = column.into();
        if !is_safe_field_name(&column) {
            self.record_error(SqlxFluentError::InvalidIdentifier(column));
            return self;
        }
        match operator.parse::<Operator>() {
            Ok(op) => self.push_where(WhereClause::new(column, op, value)),
            Err(e) => self.record_error(e),
        }
        self
    }

    /// 追加 `column IN (v1, v2, ...)` 条件，每个元素一个占位符
    ///
    /// 空列表不匹配任何行。
    pub fn where_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_clause(WhereClause::new(column, Operator::In, Value::list(values)))
    }

    /// 追加一个已构造好的条件
    pub fn where_clause(&mut self, clause: WhereClause) -> &mut Self {
        if is_safe_field_name(&clause.column) {
            self.push_where(clause);
        } else {
            self.record_error(SqlxFluentError::InvalidIdentifier(clause.column));
        }
        self
    }

    /// 追加排序
    pub fn order_by(&mut self, column: impl Into<String>, direction: Direction) -> &mut Self {
        let column = column.into();
        if is_safe_field_name(&column) {
            self.state.orders.push(OrderClause { column, direction });
        } else {
            self.record_error(SqlxFluentError::InvalidIdentifier(column));
        }
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.state.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.state.offset = Some(n);
        self
    }

    fn push_where(&mut self, clause: WhereClause) {
        if let Value::List(items) = &clause.value {
            if clause.operator != Operator::In {
                self.record_error(SqlxFluentError::InvalidValue(format!(
                    "list value for `{}` requires the IN operator, got {}",
                    clause.column, clause.operator
                )));
                return;
            }
            if items.iter().any(Value::is_list) {
                self.record_error(SqlxFluentError::InvalidValue(format!(
                    "nested list value for `{}`",
                    clause.column
                )));
                return;
            }
        }
        self.state.bindings.extend(clause.bind_values().cloned());
        self.state.wheres.push(clause);
    }

    fn record_error(&mut self, error: SqlxFluentError) {
        if self.state.build_error.is_none() {
            self.state.build_error = Some(error);
        }
    }

    /// 取出当前状态并恢复为构造时的默认值（保留表名）
    fn take_state(&mut self) -> QueryState {
        let fresh = QueryState::new(self.state.table.clone());
        std::mem::replace(&mut self.state, fresh)
    }

    /// 终结操作入口：重置状态并检查调用方误用
    fn begin(&mut self) -> Result<QueryState> {
        let mut state = self.take_state();
        if state.table.is_empty() {
            return Err(SqlxFluentError::NoTableSelected);
        }
        if let Some(error) = state.build_error.take() {
            return Err(error);
        }
        Ok(state)
    }

    async fn dispatch(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        tracing::debug!(sql, params = params.len(), "executing query");
        self.executor.execute(sql, params).await
    }

    /// 统计满足条件的行数
    pub async fn count(&mut self) -> Result<u64> {
        let state = self.begin()?;
        let sql = self.grammar.compile_count(&state.table, &state.wheres);
        let rows = self.dispatch(&sql, &state.bindings).await?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| SqlxFluentError::InvalidCount("count query returned no rows".into()))?;
        parse_count(record.get("count"))
    }

    /// 删除满足条件的行；没有条件时删除整张表
    pub async fn delete(&mut self) -> Result<()> {
        let state = self.begin()?;
        let sql = self.grammar.compile_delete(&state.table, &state.wheres);
        if state.wheres.is_empty() {
            tracing::warn!(table = %state.table, "DELETE without WHERE affects every row");
        }
        self.dispatch(&sql, &state.bindings).await?;
        Ok(())
    }
}

impl<T: DeserializeOwned> Builder<T> {
    /// 执行 SELECT，返回所有结果行
    ///
    /// 子句顺序固定为 WHERE、ORDER BY、LIMIT、OFFSET。
    pub async fn get(&mut self) -> Result<Vec<T>> {
        let state = self.begin()?;
        let mut sql = self.grammar.compile_select(&state.table, &state.columns);
        if state.distinct {
            sql = sql.replacen("SELECT", "SELECT DISTINCT", 1);
        }
        sql.push_str(&self.grammar.compile_wheres(&state.wheres, 0));
        self.grammar
            .compile_tail(&mut sql, &state.orders, state.limit, state.offset);

        let rows = self.dispatch(&sql, &state.bindings).await?;
        rows.into_iter().map(map_row).collect()
    }

    /// 取第一行；没有结果时返回 `None`
    pub async fn first(&mut self) -> Result<Option<T>> {
        self.state.limit = Some(1);
        Ok(self.get().await?.into_iter().next())
    }

    /// 插入一行并返回数据库中创建的行
    ///
    /// 只使用 `data` 中的值，已配置的条件会被丢弃。驱动没有返回任何行时报
    /// [`SqlxFluentError::NoRowReturned`]。
    pub async fn create(&mut self, data: Data) -> Result<T> {
        let state = self.begin()?;
        if data.is_empty() {
            return Err(SqlxFluentError::EmptyInsert);
        }
        validate_data(&data)?;
        let compiled = self.grammar.compile_insert(&state.table, &data);
        let rows = self.dispatch(&compiled.sql, &compiled.values).await?;
        let record = rows
            .into_iter()
            .next()
            .ok_or(SqlxFluentError::NoRowReturned)?;
        map_row(record)
    }

    /// 依次插入多行，按输入顺序返回
    ///
    /// 逐条执行而非并发；中途失败时立即返回错误，之前已插入的行不会回滚。
    pub async fn create_many<I>(&mut self, items: I) -> Result<Vec<T>>
    where
        I: IntoIterator<Item = Data>,
    {
        let mut created = Vec::new();
        for data in items {
            created.push(self.create(data).await?);
        }
        Ok(created)
    }

    /// 更新满足条件的行，返回驱动返回的行
    ///
    /// 绑定顺序为 `[SET 值..., 条件值...]`。没有条件时更新整张表。
    pub async fn update(&mut self, data: Data) -> Result<Vec<T>> {
        let state = self.begin()?;
        if data.is_empty() {
            return Err(SqlxFluentError::EmptyUpdate);
        }
        validate_data(&data)?;
        let compiled = self
            .grammar
            .compile_update(&state.table, &data, &state.wheres);
        if state.wheres.is_empty() {
            tracing::warn!(table = %state.table, "UPDATE without WHERE affects every row");
        }
        let mut params = compiled.values;
        params.extend(state.bindings);

        let rows = self.dispatch(&compiled.sql, &params).await?;
        rows.into_iter().map(map_row).collect()
    }
}

impl<T> fmt::Debug for Builder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("grammar", &self.grammar)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// 写入数据的列名同样以原样文本拼入 SQL，必须是合法标识符；列表值不能写入
fn validate_data(data: &Data) -> Result<()> {
    for (column, value) in data.iter() {
        if !is_safe_field_name(column) {
            return Err(SqlxFluentError::InvalidIdentifier(column.to_string()));
        }
        if value.is_list() {
            return Err(SqlxFluentError::InvalidValue(format!(
                "list value for column `{}` cannot be written",
                column
            )));
        }
    }
    Ok(())
}

fn map_row<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(record))?)
}

/// 解析 `count` 字段：接受数字或十进制字符串
fn parse_count(value: Option<&serde_json::Value>) -> Result<u64> {
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| SqlxFluentError::InvalidCount(n.to_string())),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| SqlxFluentError::InvalidCount(s.clone())),
        Some(other) => Err(SqlxFluentError::InvalidCount(other.to_string())),
        None => Err(SqlxFluentError::InvalidCount(
            "missing `count` column".to_string(),
        )),
    }
}
