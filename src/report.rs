//! Read-only analytical queries over a loaded catalog.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryKind {
    /// Most helpful reviews of a product, best and worst rated
    TopReviews,
    /// Similar products with a better sales rank
    BetterSimilar,
    /// Daily running average rating of a product
    RatingEvolution,
    /// Sales rank leaders of every product group
    GroupLeaders,
    /// Products whose positive reviews are most helpful
    HelpfulProducts,
    /// Categories whose positive reviews are most helpful
    HelpfulCategories,
    /// Customers with the most reviews in every product group
    TopCustomers,
}

enum Param {
    Asin,
    Limit,
}

struct QueryDef {
    sql: &'static str,
    params: &'static [Param],
    default_limit: usize,
}

impl QueryKind {
    pub fn name(self) -> &'static str {
        match self {
            QueryKind::TopReviews => "top-reviews",
            QueryKind::BetterSimilar => "better-similar",
            QueryKind::RatingEvolution => "rating-evolution",
            QueryKind::GroupLeaders => "group-leaders",
            QueryKind::HelpfulProducts => "helpful-products",
            QueryKind::HelpfulCategories => "helpful-categories",
            QueryKind::TopCustomers => "top-customers",
        }
    }

    pub fn needs_asin(self) -> bool {
        self.def().params.iter().any(|p| matches!(p, Param::Asin))
    }

    fn def(self) -> QueryDef {
        match self {
            QueryKind::TopReviews => QueryDef {
                sql: "SELECT * FROM (
                          SELECT 'highest' AS bucket, review_date, customer_id, rating, votes, helpful
                          FROM reviews WHERE asin = ?1
                          ORDER BY rating DESC, helpful DESC, review_date LIMIT ?2)
                      UNION ALL
                      SELECT * FROM (
                          SELECT 'lowest' AS bucket, review_date, customer_id, rating, votes, helpful
                          FROM reviews WHERE asin = ?1
                          ORDER BY rating ASC, helpful DESC, review_date LIMIT ?2)",
                params: &[Param::Asin, Param::Limit],
                default_limit: 5,
            },
            QueryKind::BetterSimilar => QueryDef {
                sql: "SELECT p.asin, p.title, p.salesrank
                      FROM similar_products s
                      JOIN products base ON base.asin = s.asin
                      JOIN products p ON p.asin = s.similar_asin
                      WHERE s.asin = ?1
                        AND p.salesrank > 0 AND base.salesrank > 0
                        AND p.salesrank < base.salesrank
                      ORDER BY p.salesrank
                      LIMIT ?2",
                params: &[Param::Asin, Param::Limit],
                default_limit: 100,
            },
            QueryKind::RatingEvolution => QueryDef {
                sql: "SELECT review_date,
                             COUNT(*) AS reviews,
                             ROUND(AVG(rating), 3) AS day_avg,
                             ROUND(SUM(SUM(rating)) OVER w * 1.0 / SUM(COUNT(*)) OVER w, 3) AS running_avg
                      FROM reviews
                      WHERE asin = ?1
                      GROUP BY review_date
                      WINDOW w AS (ORDER BY review_date)
                      ORDER BY review_date
                      LIMIT ?2",
                params: &[Param::Asin, Param::Limit],
                default_limit: 10_000,
            },
            QueryKind::GroupLeaders => QueryDef {
                sql: "SELECT product_group, position, asin, title, salesrank FROM (
                          SELECT product_group, asin, title, salesrank,
                                 ROW_NUMBER() OVER (PARTITION BY product_group ORDER BY salesrank, asin) AS position
                          FROM products
                          WHERE title IS NOT NULL AND salesrank > 0)
                      WHERE position <= ?1
                      ORDER BY product_group, position",
                params: &[Param::Limit],
                default_limit: 10,
            },
            QueryKind::HelpfulProducts => QueryDef {
                sql: "SELECT p.asin, p.title, ROUND(AVG(r.helpful), 3) AS avg_helpful,
                             COUNT(*) AS positive_reviews
                      FROM reviews r
                      JOIN products p ON p.asin = r.asin
                      WHERE r.rating >= 4
                      GROUP BY p.asin, p.title
                      ORDER BY avg_helpful DESC, positive_reviews DESC, p.asin
                      LIMIT ?1",
                params: &[Param::Limit],
                default_limit: 10,
            },
            QueryKind::HelpfulCategories => QueryDef {
                sql: "SELECT c.id, c.name, ROUND(AVG(r.helpful), 3) AS avg_helpful,
                             COUNT(*) AS positive_reviews
                      FROM reviews r
                      JOIN product_categories pc ON pc.asin = r.asin
                      JOIN categories c ON c.id = pc.category_id
                      WHERE r.rating >= 4
                      GROUP BY c.id, c.name
                      ORDER BY avg_helpful DESC, positive_reviews DESC, c.id
                      LIMIT ?1",
                params: &[Param::Limit],
                default_limit: 5,
            },
            QueryKind::TopCustomers => QueryDef {
                sql: "SELECT product_group, position, customer_id, reviews FROM (
                          SELECT p.product_group, r.customer_id, COUNT(*) AS reviews,
                                 ROW_NUMBER() OVER (
                                     PARTITION BY p.product_group
                                     ORDER BY COUNT(*) DESC, r.customer_id) AS position
                          FROM reviews r
                          JOIN products p ON p.asin = r.asin
                          GROUP BY p.product_group, r.customer_id)
                      WHERE position <= ?1
                      ORDER BY product_group, position",
                params: &[Param::Limit],
                default_limit: 10,
            },
        }
    }
}

/// Query result with display-ready cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn run(
    conn: &Connection,
    kind: QueryKind,
    asin: Option<&str>,
    limit: Option<usize>,
) -> Result<Table> {
    let def = kind.def();
    let mut values: Vec<Value> = Vec::with_capacity(def.params.len());
    for param in def.params {
        match param {
            Param::Asin => match asin {
                Some(a) => values.push(Value::Text(a.to_string())),
                None => bail!("query `{}` requires --asin", kind.name()),
            },
            Param::Limit => values.push(Value::Integer(limit.unwrap_or(def.default_limit) as i64)),
        }
    }

    let mut stmt = conn
        .prepare(def.sql)
        .with_context(|| format!("Failed to prepare query `{}`", kind.name()))?;
    let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = headers.len();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(render))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table { headers, rows })
}

fn render(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

impl Table {
    pub fn print(&self) {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(truncate(cell, 48).chars().count());
            }
        }

        let line = |cells: Vec<String>| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<w$}", c, w = *w))
                .collect::<Vec<_>>()
                .join(" | ")
        };
        println!("{}", line(self.headers.clone()));
        println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1)));
        for row in &self.rows {
            println!("{}", line(row.iter().map(|c| truncate(c, 48)).collect()));
        }
        println!("\n{} rows", self.rows.len());
    }

    /// Write the table to `<dir>/<name>.csv`, creating `dir` if needed.
    pub fn export_csv(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        let path = dir.join(format!("{}.csv", name));
        let mut writer =
            csv::Writer::from_path(&path).with_context(|| format!("Failed to create {:?}", path))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(path)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

// ── Tests ──
