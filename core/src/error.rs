use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlxFluentError {
    /// 终结操作前未通过 `table()` 选择表
    #[error("No table selected")]
    NoTableSelected,
    /// `update()` 的数据为空
    #[error("No data to update")]
    EmptyUpdate,
    /// `create()` 的数据为空
    #[error("No data to insert")]
    EmptyInsert,
    /// 操作符不在允许列表中
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),
    /// 表名或列名不合法
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// 值不能用在该位置（例如列表值用于非 IN 条件或写入数据）
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    /// INSERT 没有返回任何行（驱动未处理 RETURNING）
    #[error("Insert returned no row")]
    NoRowReturned,
    /// COUNT 查询结果中没有可解析的 `count` 字段
    #[error("Invalid count result: {0}")]
    InvalidCount(String),
    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabase(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("No connection pool available for driver")]
    NoPoolAvailable,
    /// 结果行中某一列解码失败
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },
    /// 结果行无法映射为目标行类型
    #[error("Row mapping error: {0}")]
    RowMapping(#[from] serde_json::Error),
    /// 自定义执行端口返回的错误
    #[error("Executor error: {0}")]
    Executor(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// 通用错误信息
    #[error("{0}")]
    Other(String),
}

impl SqlxFluentError {
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// 是否为调用方误用（在访问数据库之前就被拒绝）
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NoTableSelected
                | Self::EmptyUpdate
                | Self::EmptyInsert
                | Self::InvalidOperator(_)
                | Self::InvalidIdentifier(_)
                | Self::InvalidValue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SqlxFluentError>;
