//! 数据库模块
//!
//! - `schema`: 表结构定义、版本检测、结构描述
//! - `dao`: 商品与部门的数据访问对象
//! - `migration`: 部门规范化迁移

pub mod dao;
pub mod migration;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// 打开数据库文件并开启外键约束
pub fn open_connection(path: impl AsRef<Path>) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// 打开内存数据库（测试和临时场景）
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    // 必须在事务外设置，事务内的 PRAGMA foreign_keys 不生效
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_enables_foreign_keys() {
        let conn = open_in_memory().unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_open_connection_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let conn = open_connection(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(path.exists());
    }
}
