use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::errors::Stage;

const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    enable_foreign_keys(&conn)?;
    Ok(conn)
}

pub fn enable_foreign_keys(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")
}

/// Run the static DDL script verbatim.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

// ── Rows ──

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: Option<String>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub asin: String,
    pub seq_id: i64,
    pub title: Option<String>,
    pub group: Option<String>,
    pub salesrank: Option<i64>,
    pub similar_count: i64,
    pub category_count: i64,
    pub review_count: i64,
    pub downloaded: i64,
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductCategoryRow {
    pub asin: String,
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRow {
    pub asin: String,
    pub date: String, // ISO-8601, YYYY-MM-DD
    pub customer_id: String,
    pub rating: i64,
    pub votes: i64,
    pub helpful: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimilarRow {
    pub asin: String,
    pub similar_asin: String,
}

// ── Inserts ──
//
// Each function writes one chunk and returns how many rows were actually
// inserted; rows that hit an existing natural key are ignored.

pub fn insert_categories(conn: &Connection, rows: &[CategoryRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO categories (id, name, parent_id) VALUES (?1, ?2, ?3)",
    )?;
    let mut count = 0;
    for r in rows {
        count += stmt.execute(rusqlite::params![r.id, r.name, r.parent_id])?;
    }
    Ok(count)
}

pub fn insert_products(conn: &Connection, rows: &[ProductRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO products
         (asin, seq_id, title, product_group, salesrank, similar_count,
          category_count, review_count, downloaded, avg_rating)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    let mut count = 0;
    for p in rows {
        count += stmt.execute(rusqlite::params![
            p.asin, p.seq_id, p.title, p.group, p.salesrank, p.similar_count,
            p.category_count, p.review_count, p.downloaded, p.avg_rating,
        ])?;
    }
    Ok(count)
}

pub fn insert_product_categories(
    conn: &Connection,
    rows: &[ProductCategoryRow],
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO product_categories (asin, category_id) VALUES (?1, ?2)",
    )?;
    let mut count = 0;
    for r in rows {
        count += stmt.execute(rusqlite::params![r.asin, r.category_id])?;
    }
    Ok(count)
}

pub fn insert_reviews(conn: &Connection, rows: &[ReviewRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO reviews
         (asin, review_date, customer_id, rating, votes, helpful)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut count = 0;
    for r in rows {
        count += stmt.execute(rusqlite::params![
            r.asin, r.date, r.customer_id, r.rating, r.votes, r.helpful,
        ])?;
    }
    Ok(count)
}

pub fn insert_similar(conn: &Connection, rows: &[SimilarRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO similar_products (asin, similar_asin) VALUES (?1, ?2)",
    )?;
    let mut count = 0;
    for r in rows {
        count += stmt.execute(rusqlite::params![r.asin, r.similar_asin])?;
    }
    Ok(count)
}

// ── Stats ──

/// Row count of every loaded table, in load order.
pub fn get_stats(conn: &Connection) -> Result<Vec<(&'static str, usize)>> {
    Stage::ALL
        .iter()
        .map(|stage| {
            let table = stage.table();
            let n: usize = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .with_context(|| format!("Failed to count {}", table))?;
            Ok((table, n))
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        enable_foreign_keys(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn product(asin: &str) -> ProductRow {
        ProductRow {
            asin: asin.to_string(),
            seq_id: 1,
            title: Some("Title".into()),
            group: Some("Book".into()),
            salesrank: Some(10),
            similar_count: 0,
            category_count: 0,
            review_count: 0,
            downloaded: 0,
            avg_rating: Some(0.0),
        }
    }

    #[test]
    fn schema_is_rerunnable() {
        let conn = memory_db();
        init_schema(&conn).unwrap();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.len(), 5);
        assert!(stats.iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn conflicting_rows_are_ignored() {
        let conn = memory_db();
        let rows = vec![product("A1"), product("A1"), product("B2")];
        assert_eq!(insert_products(&conn, &rows).unwrap(), 2);
        assert_eq!(insert_products(&conn, &rows).unwrap(), 0);
    }

    #[test]
    fn dangling_similar_edge_violates_foreign_key() {
        let conn = memory_db();
        insert_products(&conn, &[product("A1")]).unwrap();
        let edge = SimilarRow {
            asin: "A1".into(),
            similar_asin: "MISSING".into(),
        };
        assert!(insert_similar(&conn, &[edge]).is_err());
    }

    #[test]
    fn category_parent_must_exist() {
        let conn = memory_db();
        let orphan = CategoryRow {
            id: 17,
            name: Some("Literature".into()),
            parent_id: Some(1000),
        };
        assert!(insert_categories(&conn, &[orphan]).is_err());
    }
}
