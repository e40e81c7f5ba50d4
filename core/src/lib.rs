//! sqlxfluent: 基于 sqlx 的流式 SQL 查询构建器
//!
//! ```no_run
//! use sqlxfluent::{Builder, Data, DbPool, Direction, Record};
//! use std::sync::Arc;
//!
//! # async fn demo() -> sqlxfluent::Result<()> {
//! let pool = DbPool::connect("sqlite::memory:").await?;
//! let db = Builder::new(Arc::new(pool));
//!
//! let mut users = db.table::<Record>("users");
//! users.create(Data::new().set("name", "Jane").set("age", 31)).await?;
//! let adults = users
//!     .and_where("age", ">", 18)
//!     .order_by("created_at", Direction::Desc)
//!     .limit(10)
//!     .get()
//!     .await?;
//! # let _ = adults;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod clause;
pub mod db_pool;
pub mod error;
pub mod executor;
pub mod grammar;
mod row;
pub mod utils;
pub mod value;

pub use builder::Builder;
pub use clause::{Direction, Operator, OrderClause, WhereClause};
pub use db_pool::{DbConfig, DbDriver, DbPool};
pub use error::{Result, SqlxFluentError};
pub use executor::{DryRunExecutor, Executor, Record, Statement};
pub use grammar::{CompiledQuery, Grammar};
pub use value::{Data, Value};
