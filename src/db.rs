use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::model::ProfessorRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS professors (
            id                   INTEGER NOT NULL,
            name                 TEXT NOT NULL,
            university           TEXT NOT NULL,
            major                TEXT NOT NULL,
            h_index              TEXT,
            profile_url          TEXT NOT NULL,
            email                TEXT NOT NULL,
            research_fields      TEXT NOT NULL DEFAULT '[]',
            scraped_at           TEXT,
            -- lowercased copies for case-insensitive search
            name_fold            TEXT NOT NULL,
            university_fold      TEXT NOT NULL,
            major_fold           TEXT NOT NULL,
            research_fields_fold TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_professors_name ON professors(name);
        ",
    )?;
    Ok(())
}

// ── Loading ──

pub fn delete_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM professors", [])?)
}

/// Insert records in one transaction; rowid order follows slice order.
pub fn insert_professors(conn: &Connection, records: &[ProfessorRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO professors
             (id, name, university, major, h_index, profile_url, email, research_fields,
              scraped_at, name_fold, university_fold, major_fold, research_fields_fold)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for r in records {
            let fields = serde_json::to_string(&r.research_fields)?;
            let folded: Vec<String> = r.research_fields.iter().map(|f| f.to_lowercase()).collect();
            let fields_fold = serde_json::to_string(&folded)?;
            count += stmt.execute(rusqlite::params![
                r.id as i64,
                r.name,
                r.university,
                r.major,
                r.h_index,
                r.profile_url,
                r.email,
                fields,
                r.scraped_at,
                r.name.to_lowercase(),
                r.university.to_lowercase(),
                r.major.to_lowercase(),
                fields_fold,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn count_all(conn: &Connection) -> Result<usize> {
    Ok(conn.query_row("SELECT COUNT(*) FROM professors", [], |r| r.get(0))?)
}

// ── Querying ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    University,
    Major,
    HIndex,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "name" => Some(Self::Name),
            "university" => Some(Self::University),
            "major" => Some(Self::Major),
            "h_index" => Some(Self::HIndex),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::University => "university",
            Self::Major => "major",
            Self::HIndex => "h_index",
        }
    }

    /// ORDER BY expression. The h-index is text; SQLite's integer cast takes
    /// the leading integer and yields 0 for empty or non-numeric text, and a
    /// missing value is treated as 0 as well.
    fn order_expr(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::University => "university",
            Self::Major => "major",
            Self::HIndex => "COALESCE(CAST(h_index AS INTEGER), 0)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Match conditions, ANDed together. An empty filter matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filter<'a> {
    /// Case-insensitive substring over name, university, major and each
    /// research field.
    pub search_term: Option<&'a str>,
    /// Every tag must be present, compared exactly.
    pub research_fields: &'a [String],
}

fn where_clause(filter: &Filter, params: &mut Vec<Box<dyn ToSql>>) -> String {
    let mut conditions = Vec::new();

    if let Some(term) = filter.search_term.filter(|t| !t.is_empty()) {
        params.push(Box::new(term.to_lowercase()));
        let n = params.len();
        conditions.push(format!(
            "(instr(name_fold, ?{n}) > 0
              OR instr(university_fold, ?{n}) > 0
              OR instr(major_fold, ?{n}) > 0
              OR EXISTS (SELECT 1 FROM json_each(professors.research_fields_fold)
                         WHERE instr(json_each.value, ?{n}) > 0))"
        ));
    }

    for tag in filter.research_fields {
        params.push(Box::new(tag.clone()));
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM json_each(professors.research_fields)
                     WHERE json_each.value = ?{})",
            params.len()
        ));
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

pub fn count_matching(conn: &Connection, filter: &Filter) -> rusqlite::Result<usize> {
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    let sql = format!("SELECT COUNT(*) FROM professors{}", where_clause(filter, &mut params));
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    conn.query_row(&sql, param_refs.as_slice(), |r| r.get(0))
}

/// One sorted window of the matching records. Ties keep insertion order.
pub fn fetch_matching(
    conn: &Connection,
    filter: &Filter,
    sort: SortField,
    direction: SortDirection,
    offset: usize,
    limit: usize,
) -> rusqlite::Result<Vec<ProfessorRecord>> {
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    let where_sql = where_clause(filter, &mut params);
    let sql = format!(
        "SELECT id, name, university, major, h_index, profile_url, email, research_fields, scraped_at
         FROM professors{}
         ORDER BY {} {}, rowid ASC
         LIMIT {} OFFSET {}",
        where_sql,
        sort.order_expr(),
        direction.sql(),
        i64::try_from(limit).unwrap_or(i64::MAX),
        i64::try_from(offset).unwrap_or(i64::MAX),
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), professor_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn professor_from_row(row: &Row) -> rusqlite::Result<ProfessorRecord> {
    let fields_json: String = row.get(7)?;
    let research_fields = serde_json::from_str(&fields_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    let id: i64 = row.get(0)?;
    Ok(ProfessorRecord {
        id: u64::try_from(id).unwrap_or_default(),
        name: row.get(1)?,
        university: row.get(2)?,
        major: row.get(3)?,
        h_index: row.get(4)?,
        profile_url: row.get(5)?,
        email: row.get(6)?,
        research_fields,
        scraped_at: row.get(8)?,
    })
}
