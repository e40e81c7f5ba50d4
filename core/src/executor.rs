use crate::db_pool::DbDriver;
use crate::error::{Result, SqlxFluentError};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// 一行结果：列名 -> 值，保持列顺序
pub type Record = serde_json::Map<String, serde_json::Value>;

/// 执行端口 trait，Builder 只通过它访问数据库
///
/// 连接池、并发控制、超时和取消都由实现方负责；Builder 每次终结操作只调用一次
/// `execute`。`connect` / `disconnect` 由外层应用调用，Builder 从不调用它们。
#[async_trait]
pub trait Executor: Send + Sync {
    /// 执行器使用的 SQL 方言
    ///
    /// [`Builder::new`](crate::Builder::new) 用它选择方言语法；返回 `None` 时使用
    /// `$N` 占位符。自带语法的执行器可以不实现，改用
    /// [`Builder::with_grammar`](crate::Builder::with_grammar)。
    fn dialect(&self) -> Option<DbDriver> {
        None
    }

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// 执行 SQL，按顺序绑定 `params`，返回所有结果行
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>>;
}

/// 一条被记录下来的语句
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// 预置的执行结果
#[derive(Debug, Clone)]
enum Response {
    Rows(Vec<Record>),
    Error(String),
}

/// 不访问数据库的执行器
///
/// 记录收到的每条语句；若预置了结果则按先进先出顺序返回，否则返回空结果集。
/// 用于预览生成的 SQL 以及测试。
#[derive(Debug)]
pub struct DryRunExecutor {
    driver: DbDriver,
    statements: Mutex<Vec<Statement>>,
    responses: Mutex<VecDeque<Response>>,
}

impl DryRunExecutor {
    pub fn new(driver: DbDriver) -> Self {
        Self {
            driver,
            statements: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    /// 预置下一次 `execute` 返回的行
    pub fn push_rows(&self, rows: Vec<Record>) {
        self.lock_responses().push_back(Response::Rows(rows));
    }

    /// 预置下一次 `execute` 返回的错误
    pub fn push_error(&self, message: impl Into<String>) {
        self.lock_responses()
            .push_back(Response::Error(message.into()));
    }

    /// 已记录的全部语句
    pub fn statements(&self) -> Vec<Statement> {
        self.lock_statements().clone()
    }

    /// 最后一条语句
    pub fn last(&self) -> Option<Statement> {
        self.lock_statements().last().cloned()
    }

    pub fn clear(&self) {
        self.lock_statements().clear();
        self.lock_responses().clear();
    }

    fn lock_statements(&self) -> std::sync::MutexGuard<'_, Vec<Statement>> {
        self.statements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Response>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Executor for DryRunExecutor {
    fn dialect(&self) -> Option<DbDriver> {
        Some(self.driver)
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        self.lock_statements().push(Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match self.lock_responses().pop_front() {
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Error(message)) => Err(SqlxFluentError::Executor(message.into())),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_records_statements() {
        let executor = DryRunExecutor::new(DbDriver::Postgres);
        let rows = executor
            .execute("SELECT * FROM users WHERE id = $1", &[Value::Int64(1)])
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(
            executor.last(),
            Some(Statement {
                sql: "SELECT * FROM users WHERE id = $1".to_string(),
                params: vec![Value::Int64(1)],
            })
        );
    }

    #[tokio::test]
    async fn test_dry_run_replays_responses_in_order() {
        let executor = DryRunExecutor::new(DbDriver::Sqlite);
        executor.push_rows(vec![record(json!({"id": 1}))]);
        executor.push_error("boom");

        let first = executor.execute("a", &[]).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = executor.execute("b", &[]).await.unwrap_err();
        assert_eq!(second.to_string(), "Executor error: boom");
        assert!(executor.execute("c", &[]).await.unwrap().is_empty());
        assert_eq!(executor.statements().len(), 3);

        executor.clear();
        assert!(executor.statements().is_empty());
    }
}
