#[cfg(any(feature = "mysql", feature = "postgres", feature = "sqlite"))]
use sqlx::Pool;
use crate::error::{Result, SqlxFluentError};
use crate::executor::{Executor, Record};
use crate::value::Value;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDriver {
    MySql,
    Postgres,
    Sqlite,
}

impl DbDriver {
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Ok(DbDriver::MySql)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(DbDriver::Postgres)
        } else if url.starts_with("sqlite://") || url.starts_with("sqlite:") {
            Ok(DbDriver::Sqlite)
        } else {
            Err(SqlxFluentError::UnsupportedDatabase(url.to_string()))
        }
    }
}

impl std::str::FromStr for DbDriver {
    type Err = SqlxFluentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DbDriver::MySql),
            "postgres" | "postgresql" | "pg" => Ok(DbDriver::Postgres),
            "sqlite" => Ok(DbDriver::Sqlite),
            _ => Err(SqlxFluentError::UnsupportedDatabase(s.to_string())),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_mysql_key_column() -> String {
    "id".to_string()
}

/// 连接池配置
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// 数据库 URL（mysql://、postgres://、sqlite:）
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// MySQL 插入后回读新行时使用的自增主键列
    #[serde(default = "default_mysql_key_column")]
    pub mysql_key_column: String,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            mysql_key_column: default_mysql_key_column(),
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn acquire_timeout_secs(mut self, secs: u64) -> Self {
        self.acquire_timeout_secs = secs;
        self
    }

    pub fn mysql_key_column(mut self, column: impl Into<String>) -> Self {
        self.mysql_key_column = column.into();
        self
    }

    #[cfg(any(feature = "mysql", feature = "postgres", feature = "sqlite"))]
    fn pool_options<DB: sqlx::Database>(&self) -> sqlx::pool::PoolOptions<DB> {
        sqlx::pool::PoolOptions::<DB>::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }
}

/// 基于 sqlx 连接池的执行器
///
/// 每个实例只持有一种数据库的连接池。MySQL 不支持 `RETURNING`，插入语句执行后
/// 会用 `last_insert_id` 按 `mysql_key_column` 回读新行；MySQL 上的 UPDATE 不返回行。
#[derive(Debug, Clone)]
pub struct DbPool {
    driver: DbDriver,
    #[cfg_attr(not(feature = "mysql"), allow(dead_code))]
    mysql_key_column: String,
    #[cfg(feature = "mysql")]
    mysql: Option<Arc<Pool<sqlx::MySql>>>,
    #[cfg(feature = "postgres")]
    pg: Option<Arc<Pool<sqlx::Postgres>>>,
    #[cfg(feature = "sqlite")]
    sqlite: Option<Arc<Pool<sqlx::Sqlite>>>,
}

impl DbPool {
    fn empty(driver: DbDriver, mysql_key_column: String) -> Self {
        Self {
            driver,
            mysql_key_column,
            #[cfg(feature = "mysql")]
            mysql: None,
            #[cfg(feature = "postgres")]
            pg: None,
            #[cfg(feature = "sqlite")]
            sqlite: None,
        }
    }

    /// 从数据库 URL 连接并创建 DbPool（使用默认配置）
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(&DbConfig::new(url)).await
    }

    /// 按配置连接并创建 DbPool，立即建立连接
    pub async fn connect_with(config: &DbConfig) -> Result<Self> {
        let driver = DbDriver::from_url(&config.url)?;
        let mut db = Self::empty(driver, config.mysql_key_column.clone());

        match driver {
            #[cfg(feature = "mysql")]
            DbDriver::MySql => {
                let pool = config.pool_options::<sqlx::MySql>().connect(&config.url).await?;
                db.mysql = Some(Arc::new(pool));
            }
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                let pool = config
                    .pool_options::<sqlx::Postgres>()
                    .connect(&config.url)
                    .await?;
                db.pg = Some(Arc::new(pool));
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                let pool = config.pool_options::<sqlx::Sqlite>().connect(&config.url).await?;
                db.sqlite = Some(Arc::new(pool));
            }
            #[allow(unreachable_patterns)]
            _ => return Err(unsupported(driver)),
        }
        tracing::info!(driver = ?driver, "database pool connected");
        Ok(db)
    }

    /// 按配置创建 DbPool，但推迟到第一次使用时才建立连接
    pub fn connect_lazy(config: &DbConfig) -> Result<Self> {
        let driver = DbDriver::from_url(&config.url)?;
        let mut db = Self::empty(driver, config.mysql_key_column.clone());

        match driver {
            #[cfg(feature = "mysql")]
            DbDriver::MySql => {
                let pool = config.pool_options::<sqlx::MySql>().connect_lazy(&config.url)?;
                db.mysql = Some(Arc::new(pool));
            }
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                let pool = config
                    .pool_options::<sqlx::Postgres>()
                    .connect_lazy(&config.url)?;
                db.pg = Some(Arc::new(pool));
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                let pool = config.pool_options::<sqlx::Sqlite>().connect_lazy(&config.url)?;
                db.sqlite = Some(Arc::new(pool));
            }
            #[allow(unreachable_patterns)]
            _ => return Err(unsupported(driver)),
        }
        Ok(db)
    }

    /// 从 MySQL Pool 创建 DbPool
    #[cfg(feature = "mysql")]
    pub fn from_mysql_pool(pool: Arc<Pool<sqlx::MySql>>) -> Self {
        let mut db = Self::empty(DbDriver::MySql, default_mysql_key_column());
        db.mysql = Some(pool);
        db
    }

    /// 从 PostgreSQL Pool 创建 DbPool
    #[cfg(feature = "postgres")]
    pub fn from_postgres_pool(pool: Arc<Pool<sqlx::Postgres>>) -> Self {
        let mut db = Self::empty(DbDriver::Postgres, default_mysql_key_column());
        db.pg = Some(pool);
        db
    }

    /// 从 SQLite Pool 创建 DbPool
    #[cfg(feature = "sqlite")]
    pub fn from_sqlite_pool(pool: Arc<Pool<sqlx::Sqlite>>) -> Self {
        let mut db = Self::empty(DbDriver::Sqlite, default_mysql_key_column());
        db.sqlite = Some(pool);
        db
    }

    pub fn driver(&self) -> DbDriver {
        self.driver
    }

    #[cfg(feature = "mysql")]
    pub fn mysql_pool(&self) -> Option<&Pool<sqlx::MySql>> {
        self.mysql.as_deref()
    }

    #[cfg(feature = "postgres")]
    pub fn pg_pool(&self) -> Option<&Pool<sqlx::Postgres>> {
        self.pg.as_deref()
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite_pool(&self) -> Option<&Pool<sqlx::Sqlite>> {
        self.sqlite.as_deref()
    }

    #[cfg(feature = "mysql")]
    async fn execute_mysql(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        let pool = self.mysql.as_deref().ok_or(SqlxFluentError::NoPoolAvailable)?;

        let Some(table) = insert_target(sql) else {
            let mut query = sqlx::query(sql);
            for value in params {
                query = crate::apply_bind_value!(
                    query,
                    value,
                    |d: &bigdecimal::BigDecimal| d.clone(),
                    Option::<String>::None
                );
            }
            let rows = query.fetch_all(pool).await?;
            return rows.iter().map(crate::row::mysql_record).collect();
        };

        // MySQL 没有 RETURNING：执行插入后按自增主键回读
        let mut query = sqlx::query(sql);
        for value in params {
            query = crate::apply_bind_value!(
                query,
                value,
                |d: &bigdecimal::BigDecimal| d.clone(),
                Option::<String>::None
            );
        }
        let result = query.execute(pool).await?;
        let select = format!(
            "SELECT * FROM {} WHERE {} = ?",
            table, self.mysql_key_column
        );
        tracing::debug!(sql = %select, id = result.last_insert_id(), "re-reading inserted row");
        let rows = sqlx::query(&select)
            .bind(result.last_insert_id())
            .fetch_all(pool)
            .await?;
        rows.iter().map(crate::row::mysql_record).collect()
    }

    #[cfg(feature = "postgres")]
    async fn execute_postgres(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        let pool = self.pg.as_deref().ok_or(SqlxFluentError::NoPoolAvailable)?;
        let mut query = sqlx::query(sql);
        for value in params {
            query = crate::apply_bind_value!(
                query,
                value,
                |d: &bigdecimal::BigDecimal| d.clone(),
                PgNull
            );
        }
        let rows = query.fetch_all(pool).await?;
        rows.iter().map(crate::row::pg_record).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn execute_sqlite(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        let pool = self.sqlite.as_deref().ok_or(SqlxFluentError::NoPoolAvailable)?;
        let mut query = sqlx::query(sql);
        for value in params {
            // SQLite 没有 DECIMAL 类型，以文本形式绑定
            query = crate::apply_bind_value!(
                query,
                value,
                |d: &bigdecimal::BigDecimal| d.to_string(),
                Option::<String>::None
            );
        }
        let rows = query.fetch_all(pool).await?;
        rows.iter().map(crate::row::sqlite_record).collect()
    }
}

#[async_trait]
impl Executor for DbPool {
    fn dialect(&self) -> Option<DbDriver> {
        Some(self.driver)
    }

    /// 从连接池获取一个连接以确认数据库可达
    async fn connect(&self) -> Result<()> {
        match self.driver {
            #[cfg(feature = "mysql")]
            DbDriver::MySql => {
                let pool = self.mysql.as_deref().ok_or(SqlxFluentError::NoPoolAvailable)?;
                pool.acquire().await?;
            }
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                let pool = self.pg.as_deref().ok_or(SqlxFluentError::NoPoolAvailable)?;
                pool.acquire().await?;
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                let pool = self.sqlite.as_deref().ok_or(SqlxFluentError::NoPoolAvailable)?;
                pool.acquire().await?;
            }
            #[allow(unreachable_patterns)]
            _ => return Err(SqlxFluentError::NoPoolAvailable),
        }
        tracing::info!(driver = ?self.driver, "database reachable");
        Ok(())
    }

    /// 关闭连接池，等待已借出的连接归还
    async fn disconnect(&self) -> Result<()> {
        match self.driver {
            #[cfg(feature = "mysql")]
            DbDriver::MySql => {
                if let Some(pool) = self.mysql.as_deref() {
                    pool.close().await;
                }
            }
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                if let Some(pool) = self.pg.as_deref() {
                    pool.close().await;
                }
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                if let Some(pool) = self.sqlite.as_deref() {
                    pool.close().await;
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
        tracing::info!(driver = ?self.driver, "database pool closed");
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        if params.iter().any(Value::is_list) {
            return Err(SqlxFluentError::InvalidValue(
                "list values must be expanded into one parameter per element".to_string(),
            ));
        }
        match self.driver {
            #[cfg(feature = "mysql")]
            DbDriver::MySql => self.execute_mysql(sql, params).await,
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => self.execute_postgres(sql, params).await,
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => self.execute_sqlite(sql, params).await,
            #[allow(unreachable_patterns)]
            _ => Err(SqlxFluentError::NoPoolAvailable),
        }
    }
}

/// 不带类型的 NULL 参数
///
/// PostgreSQL 按参数类型做赋值检查，`Option::<String>::None` 会以 TEXT 发送，
/// 写入整数、时间等列时报类型不匹配。OID 0 表示未指定类型，由服务端按上下文推断。
#[cfg(feature = "postgres")]
struct PgNull;

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for PgNull {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_oid(sqlx::postgres::types::Oid(0))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for PgNull {
    fn encode_by_ref(
        &self,
        _buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        Ok(sqlx::encode::IsNull::Yes)
    }
}

#[allow(dead_code)]
fn unsupported(driver: DbDriver) -> SqlxFluentError {
    SqlxFluentError::UnsupportedDatabase(format!(
        "Unsupported database driver, only mysql, postgres, sqlite is supported, got: {:?}",
        driver
    ))
}

/// 若语句是 `INSERT INTO <table> ...`，返回目标表名
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
fn insert_target(sql: &str) -> Option<&str> {
    let rest = sql.strip_prefix("INSERT INTO ")?;
    rest.split_whitespace().next()
}

/// 将单个绑定值应用到查询中
///
/// `$decimal` 决定 DECIMAL 的绑定形式（SQLite 需要转成文本），`$null` 为 NULL
/// 的绑定值。列表值在 `execute` 入口已被拒绝。
#[macro_export]
macro_rules! apply_bind_value {
    ($query:expr, $value:expr, $decimal:expr, $null:expr) => {
        match $value {
            $crate::value::Value::Null | $crate::value::Value::List(_) => $query.bind($null),
            $crate::value::Value::Bool(b) => $query.bind(*b),
            $crate::value::Value::Int16(i) => $query.bind(*i),
            $crate::value::Value::Int32(i) => $query.bind(*i),
            $crate::value::Value::Int64(i) => $query.bind(*i),
            $crate::value::Value::Float32(f) => $query.bind(*f),
            $crate::value::Value::Float64(f) => $query.bind(*f),
            $crate::value::Value::String(s) => $query.bind(s.clone()),
            $crate::value::Value::Bytes(b) => $query.bind(b.clone()),
            $crate::value::Value::Json(j) => $query.bind(j.clone()),
            $crate::value::Value::Timestamp(t) => $query.bind(*t),
            $crate::value::Value::Decimal(d) => $query.bind(($decimal)(d)),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_from_url() {
        assert_eq!(DbDriver::from_url("mysql://localhost/db").unwrap(), DbDriver::MySql);
        assert_eq!(DbDriver::from_url("mariadb://localhost/db").unwrap(), DbDriver::MySql);
        assert_eq!(
            DbDriver::from_url("postgresql://localhost/db").unwrap(),
            DbDriver::Postgres
        );
        assert_eq!(DbDriver::from_url("sqlite::memory:").unwrap(), DbDriver::Sqlite);
        assert!(matches!(
            DbDriver::from_url("oracle://x"),
            Err(SqlxFluentError::UnsupportedDatabase(_))
        ));
    }

    #[test]
    fn test_driver_from_str() {
        assert_eq!("PG".parse::<DbDriver>().unwrap(), DbDriver::Postgres);
        assert_eq!("sqlite".parse::<DbDriver>().unwrap(), DbDriver::Sqlite);
        assert!("mssql".parse::<DbDriver>().is_err());
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: DbConfig =
            serde_json::from_str(r#"{"url": "postgres://localhost/app"}"#).unwrap();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_secs, 30);
        assert_eq!(config.mysql_key_column, "id");

        let config = DbConfig::new("mysql://localhost/app")
            .max_connections(2)
            .mysql_key_column("user_id");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.mysql_key_column, "user_id");
    }

    #[test]
    fn test_insert_target() {
        assert_eq!(
            insert_target("INSERT INTO users (name) VALUES (?)"),
            Some("users")
        );
        assert_eq!(insert_target("SELECT * FROM users"), None);
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_pg_null_is_untyped() {
        use sqlx::Encode;

        let info = <PgNull as sqlx::Type<sqlx::Postgres>>::type_info();
        assert_eq!(info.oid(), Some(sqlx::postgres::types::Oid(0)));

        let mut buf = sqlx::postgres::PgArgumentBuffer::default();
        let is_null = PgNull.encode_by_ref(&mut buf).unwrap();
        assert!(matches!(is_null, sqlx::encode::IsNull::Yes));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_execute_rejects_unexpanded_list() {
        let pool = DbPool::connect_lazy(&DbConfig::new("sqlite::memory:")).unwrap();
        let err = pool
            .execute("SELECT ?", &[Value::list([1i64, 2])])
            .await
            .unwrap_err();
        assert!(matches!(err, SqlxFluentError::InvalidValue(_)));
    }

    #[tokio::test]
    async fn test_unsupported_url_is_rejected_before_connecting() {
        let err = DbPool::connect("redis://localhost").await.unwrap_err();
        assert!(matches!(err, SqlxFluentError::UnsupportedDatabase(_)));
    }
}
