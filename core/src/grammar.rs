//! SQL 方言语法
//!
//! 把表名、列、过滤条件和写入数据渲染成带编号占位符的 SQL。所有方法都是纯函数，
//! 不做任何 I/O。方言差异（占位符格式、是否支持 `RETURNING`）集中在 [`Grammar`]
//! 的两个必需方法里，其余渲染逻辑都是默认实现，新方言只需覆盖需要改变的部分。

use crate::clause::{OrderClause, WhereClause};
use crate::db_pool::DbDriver;
use crate::value::{Data, Value};
use std::fmt::{self, Write};

/// 一次编译的结果：SQL 文本与按占位符顺序排列的绑定值
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

/// 方言语法 trait
pub trait Grammar: Send + Sync + fmt::Debug {
    /// 获取占位符字符串
    ///
    /// * `index` - 占位符的索引（从 0 开始）
    fn placeholder(&self, index: usize) -> String;

    /// 是否支持 `INSERT ... RETURNING *`
    fn supports_returning(&self) -> bool {
        true
    }

    /// `SELECT <cols> FROM <table>`，列为空时回退为 `*`
    fn compile_select(&self, table: &str, columns: &[String]) -> String {
        if columns.is_empty() {
            format!("SELECT * FROM {}", table)
        } else {
            format!("SELECT {} FROM {}", columns.join(", "), table)
        }
    }

    /// 生成 ` WHERE c1 op ph AND c2 op ph ...`（带前导空格）
    ///
    /// `offset` 为第一个条件之前已经占用的占位符数量；`IN` 列表的每个元素各占一个
    /// 占位符，后续条件的编号顺延。没有条件时返回空串。
    fn compile_wheres(&self, wheres: &[WhereClause], offset: usize) -> String {
        if wheres.is_empty() {
            return String::new();
        }
        let mut index = offset;
        let conditions = wheres
            .iter()
            .map(|w| {
                let placeholders = (index..index + w.bind_count())
                    .map(|i| self.placeholder(i))
                    .collect::<Vec<_>>();
                index += placeholders.len();
                format!("{} {}", w.column, w.operator.to_sql(&placeholders))
            })
            .collect::<Vec<_>>();
        format!(" WHERE {}", conditions.join(" AND "))
    }

    /// `INSERT INTO <table> (<keys>) VALUES (<ph..>) RETURNING *`
    fn compile_insert(&self, table: &str, data: &Data) -> CompiledQuery {
        let keys = data.keys().collect::<Vec<_>>().join(", ");
        let placeholders = (0..data.len())
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("INSERT INTO {} ({}) VALUES ({})", table, keys, placeholders);
        if self.supports_returning() {
            sql.push_str(" RETURNING *");
        }
        CompiledQuery {
            sql,
            values: data.values().cloned().collect(),
        }
    }

    /// `UPDATE <table> SET k = ph, ...` + WHERE
    ///
    /// WHERE 占位符编号接在所有 SET 占位符之后；返回的 `values` 只包含 SET 的值，
    /// 调用方需要把条件绑定值追加在后面。
    fn compile_update(&self, table: &str, data: &Data, wheres: &[WhereClause]) -> CompiledQuery {
        let sets = data
            .keys()
            .enumerate()
            .map(|(i, k)| format!("{} = {}", k, self.placeholder(i)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {} SET {}", table, sets);
        sql.push_str(&self.compile_wheres(wheres, data.len()));
        CompiledQuery {
            sql,
            values: data.values().cloned().collect(),
        }
    }

    /// `DELETE FROM <table>` + WHERE，占位符只覆盖条件
    fn compile_delete(&self, table: &str, wheres: &[WhereClause]) -> String {
        let mut sql = format!("DELETE FROM {}", table);
        sql.push_str(&self.compile_wheres(wheres, 0));
        sql
    }

    /// `SELECT COUNT(*) as count FROM <table>` + WHERE
    fn compile_count(&self, table: &str, wheres: &[WhereClause]) -> String {
        let mut sql = format!("SELECT COUNT(*) as count FROM {}", table);
        sql.push_str(&self.compile_wheres(wheres, 0));
        sql
    }

    /// 在 SELECT 上追加 ORDER BY / LIMIT / OFFSET
    fn compile_tail(
        &self,
        sql: &mut String,
        orders: &[OrderClause],
        limit: Option<u64>,
        offset: Option<u64>,
    ) {
        if !orders.is_empty() {
            let terms = orders
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                .collect::<Vec<_>>();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = limit {
            let _ = write!(sql, " LIMIT {}", limit);
        }
        if let Some(offset) = offset {
            let _ = write!(sql, " OFFSET {}", offset);
        }
    }
}

impl Grammar for DbDriver {
    fn placeholder(&self, index: usize) -> String {
        match self {
            // MySQL / SQLite 使用 ? 作为占位符，不依赖索引
            DbDriver::MySql | DbDriver::Sqlite => "?".to_string(),
            DbDriver::Postgres => format!("${}", index + 1),
        }
    }

    fn supports_returning(&self) -> bool {
        // MySQL 没有 RETURNING，由驱动在插入后回读
        !matches!(self, DbDriver::MySql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{Direction, Operator};

    fn pg() -> DbDriver {
        DbDriver::Postgres
    }

    fn wheres(n: usize) -> Vec<WhereClause> {
        (0..n)
            .map(|i| WhereClause::new(format!("c{}", i + 1), Operator::Eq, i as i64))
            .collect()
    }

    // ========== SELECT 测试 ==========
    #[test]
    fn test_compile_select() {
        let cols = vec!["id".to_string(), "name".to_string()];
        assert_eq!(pg().compile_select("users", &cols), "SELECT id, name FROM users");
        assert_eq!(
            pg().compile_select("users", &["*".to_string()]),
            "SELECT * FROM users"
        );
    }

    #[test]
    fn test_compile_select_empty_columns_falls_back_to_star() {
        assert_eq!(pg().compile_select("users", &[]), "SELECT * FROM users");
    }

    // ========== INSERT 测试 ==========
    #[test]
    fn test_compile_insert() {
        let data = Data::new().set("name", "Jane").set("age", 31i64).set("active", true);
        let compiled = pg().compile_insert("users", &data);
        assert_eq!(
            compiled.sql,
            "INSERT INTO users (name, age, active) VALUES ($1, $2, $3) RETURNING *"
        );
        assert_eq!(
            compiled.values,
            vec![
                Value::String("Jane".to_string()),
                Value::Int64(31),
                Value::Bool(true)
            ]
        );
    }

    #[test]
    fn test_compile_insert_empty_data_does_not_panic() {
        let compiled = pg().compile_insert("users", &Data::new());
        assert_eq!(compiled.sql, "INSERT INTO users () VALUES () RETURNING *");
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn test_compile_insert_mysql_without_returning() {
        let data = Data::new().set("name", "Jane").set("age", 31i64);
        let compiled = DbDriver::MySql.compile_insert("users", &data);
        assert_eq!(compiled.sql, "INSERT INTO users (name, age) VALUES (?, ?)");
    }

    #[test]
    fn test_compile_insert_sqlite_keeps_returning() {
        let data = Data::new().set("name", "Jane");
        let compiled = DbDriver::Sqlite.compile_insert("users", &data);
        assert_eq!(compiled.sql, "INSERT INTO users (name) VALUES (?) RETURNING *");
    }

    // ========== UPDATE 测试 ==========
    #[test]
    fn test_compile_update_numbers_wheres_after_sets() {
        let data = Data::new().set("name", "Jane").set("age", 31i64);
        let compiled = pg().compile_update("users", &data, &wheres(3));
        assert_eq!(
            compiled.sql,
            "UPDATE users SET name = $1, age = $2 WHERE c1 = $3 AND c2 = $4 AND c3 = $5"
        );
        // 只返回 SET 的值
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_compile_update_without_wheres() {
        let data = Data::new().set("name", "Jane").set("age", 31i64);
        let compiled = pg().compile_update("users", &data, &[]);
        assert_eq!(compiled.sql, "UPDATE users SET name = $1, age = $2");
        assert!(!compiled.sql.contains("WHERE"));
        assert_eq!(
            compiled.values,
            vec![Value::String("Jane".to_string()), Value::Int64(31)]
        );
    }

    // ========== DELETE 测试 ==========
    #[test]
    fn test_compile_delete() {
        assert_eq!(pg().compile_delete("users", &[]), "DELETE FROM users");
        assert_eq!(
            pg().compile_delete("users", &wheres(2)),
            "DELETE FROM users WHERE c1 = $1 AND c2 = $2"
        );
    }

    #[test]
    fn test_compile_delete_sqlite_placeholders() {
        assert_eq!(
            DbDriver::Sqlite.compile_delete("users", &wheres(2)),
            "DELETE FROM users WHERE c1 = ? AND c2 = ?"
        );
    }

    // ========== WHERE / COUNT / 尾部子句测试 ==========
    #[test]
    fn test_compile_wheres_operators() {
        let wheres = vec![
            WhereClause::new("age", Operator::Gt, 18i64),
            WhereClause::new("name", Operator::ILike, "%ja%"),
            WhereClause::new("status", Operator::In, "active"),
        ];
        assert_eq!(
            pg().compile_wheres(&wheres, 0),
            " WHERE age > $1 AND name ILIKE $2 AND status IN ($3)"
        );
        assert_eq!(pg().compile_wheres(&[], 0), "");
    }

    #[test]
    fn test_compile_wheres_in_list_shifts_later_placeholders() {
        let wheres = vec![
            WhereClause::new("id", Operator::In, Value::list([1i64, 2, 3])),
            WhereClause::new("age", Operator::Gt, 18i64),
        ];
        assert_eq!(
            pg().compile_wheres(&wheres, 0),
            " WHERE id IN ($1, $2, $3) AND age > $4"
        );
        assert_eq!(
            DbDriver::MySql.compile_wheres(&wheres, 0),
            " WHERE id IN (?, ?, ?) AND age > ?"
        );
    }

    #[test]
    fn test_compile_update_in_list_after_sets() {
        let data = Data::new().set("name", "Jane").set("age", 31i64);
        let wheres = vec![
            WhereClause::new("id", Operator::In, Value::list([7i64, 8])),
            WhereClause::new("active", Operator::Eq, true),
        ];
        let compiled = pg().compile_update("users", &data, &wheres);
        assert_eq!(
            compiled.sql,
            "UPDATE users SET name = $1, age = $2 WHERE id IN ($3, $4) AND active = $5"
        );
    }

    #[test]
    fn test_compile_wheres_empty_in_list() {
        let wheres = vec![
            WhereClause::new("id", Operator::In, Value::list(Vec::<i64>::new())),
            WhereClause::new("age", Operator::Gt, 18i64),
        ];
        assert_eq!(
            pg().compile_wheres(&wheres, 0),
            " WHERE id IN (NULL) AND age > $1"
        );
    }

    #[test]
    fn test_compile_count() {
        assert_eq!(
            pg().compile_count("users", &[]),
            "SELECT COUNT(*) as count FROM users"
        );
        assert_eq!(
            pg().compile_count("users", &wheres(1)),
            "SELECT COUNT(*) as count FROM users WHERE c1 = $1"
        );
    }

    #[test]
    fn test_compile_tail() {
        let mut sql = String::from("SELECT * FROM users");
        let orders = vec![
            OrderClause {
                column: "created_at".to_string(),
                direction: Direction::Desc,
            },
            OrderClause {
                column: "id".to_string(),
                direction: Direction::Asc,
            },
        ];
        pg().compile_tail(&mut sql, &orders, Some(10), Some(5));
        assert_eq!(
            sql,
            "SELECT * FROM users ORDER BY created_at DESC, id ASC LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(DbDriver::Postgres.placeholder(0), "$1");
        assert_eq!(DbDriver::Postgres.placeholder(2), "$3");
        assert_eq!(DbDriver::MySql.placeholder(5), "?");
        assert_eq!(DbDriver::Sqlite.placeholder(0), "?");
    }
}
