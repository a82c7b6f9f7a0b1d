use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{info, warn};

use crate::db;
use crate::model::ProfessorRecord;

const CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    pub skipped: usize,
    pub blank: usize,
}

#[derive(Debug)]
pub enum ParsedLine {
    Record(ProfessorRecord),
    Blank,
    Invalid(String),
}

/// Parse every line of a JSONL document. Output order matches input order;
/// the second tuple element is the 1-based line number.
pub fn parse_lines(text: &str) -> Vec<(usize, ParsedLine)> {
    let lines: Vec<(usize, &str)> = text.lines().enumerate().map(|(i, l)| (i + 1, l)).collect();
    lines
        .par_chunks(CHUNK)
        .flat_map_iter(|chunk| chunk.iter().map(|&(n, line)| (n, parse_line(line))))
        .collect()
}

fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Blank;
    }
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => return ParsedLine::Invalid("expected a JSON object".to_string()),
        Err(e) => return ParsedLine::Invalid(e.to_string()),
    };
    match serde_json::from_value::<ProfessorRecord>(value) {
        Ok(record) => ParsedLine::Record(record),
        Err(e) => ParsedLine::Invalid(e.to_string()),
    }
}

/// Replace the whole collection with the contents of a JSONL file.
///
/// The delete and the chunked inserts commit separately, so a reader running
/// during a load can see a partially filled collection.
pub fn load_file(conn: &Connection, path: &Path) -> Result<LoadReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut report = LoadReport::default();
    let mut records = Vec::new();
    for (line_no, parsed) in parse_lines(&text) {
        match parsed {
            ParsedLine::Record(r) => records.push(r),
            ParsedLine::Blank => report.blank += 1,
            ParsedLine::Invalid(reason) => {
                report.skipped += 1;
                warn!(line = line_no, %reason, "Skipping invalid JSON line");
            }
        }
    }

    db::init_schema(conn)?;
    let removed = db::delete_all(conn)?;
    info!("Cleared {} existing documents", removed);

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );
    for chunk in records.chunks(CHUNK) {
        report.inserted += db::insert_professors(conn, chunk)?;
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        blank = report.blank,
        "Imported {}",
        path.display()
    );
    Ok(report)
}

/// Write records as JSONL through a temp file renamed into place.
pub fn write_jsonl(path: &Path, records: &[ProfessorRecord]) -> Result<()> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    write_lines(path, &lines)
}

/// Rewrite the `id` of every record in a JSONL file to its 1-based position,
/// keeping all other keys and their order. Blank lines are dropped.
pub fn renumber_file(path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut lines = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut value: Value = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid JSON", path.display(), i + 1))?;
        let Some(obj) = value.as_object_mut() else {
            bail!("{}:{}: expected a JSON object", path.display(), i + 1);
        };
        obj.insert("id".to_string(), Value::from(lines.len() as u64 + 1));
        lines.push(serde_json::to_string(&value)?);
    }

    write_lines(path, &lines)?;
    info!("Renumbered {} records in {}", lines.len(), path.display());
    Ok(lines.len())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?,
        );
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{memory_db, prof};

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "{\"id\":1,\"name\":\"A\"}\nnot json\n\n{\"id\":2,\"name\":\"B\"}\n[1,2]\n";
        let parsed = parse_lines(text);
        assert_eq!(parsed.len(), 5);
        assert!(matches!(&parsed[0], (1, ParsedLine::Record(r)) if r.name == "A"));
        assert!(matches!(parsed[1], (2, ParsedLine::Invalid(_))));
        assert!(matches!(parsed[2], (3, ParsedLine::Blank)));
        assert!(matches!(&parsed[3], (4, ParsedLine::Record(r)) if r.name == "B"));
        assert!(matches!(parsed[4], (5, ParsedLine::Invalid(_))));
    }

    #[test]
    fn loose_scalars_are_coerced() {
        let text = "{\"id\":\"3\",\"name\":\"A\"}\n\
                    {\"id\":1.0,\"name\":\"B\",\"scraped_at\":1700000000}\n\
                    {\"id\":\"x\",\"name\":7,\"h_index\":true,\"research_fields\":[\"AI\",2,null]}\n\
                    {\"id\":-4,\"scraped_at\":false}\n";
        let records: Vec<ProfessorRecord> = parse_lines(text)
            .into_iter()
            .map(|(n, p)| match p {
                ParsedLine::Record(r) => r,
                other => panic!("line {n} not loaded: {other:?}"),
            })
            .collect();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 1, 0, 0]);
        assert_eq!(records[1].scraped_at.as_deref(), Some("1700000000"));
        assert_eq!(records[2].name, "7");
        assert_eq!(records[2].h_index.as_deref(), Some("true"));
        assert_eq!(records[2].research_fields, vec!["AI", "2"]);
        assert_eq!(records[3].scraped_at.as_deref(), Some("false"));
    }

    #[test]
    fn load_keeps_loosely_typed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edited.jsonl");
        std::fs::write(
            &path,
            "{\"id\":\"3\",\"name\":\"A\"}\n{\"id\":1.0,\"name\":\"B\",\"scraped_at\":1700000000}\n\"text\"\n",
        )
        .unwrap();
        let conn = memory_db();
        let report = load_file(&conn, &path).unwrap();
        assert_eq!(report, LoadReport { inserted: 2, skipped: 1, blank: 0 });
        assert_eq!(db::count_all(&conn).unwrap(), 2);
    }

    #[test]
    fn parse_keeps_order_across_chunks() {
        let text: String = (1..=1200).map(|i| format!("{{\"id\":{i}}}\n")).collect();
        let ids: Vec<u64> = parse_lines(&text)
            .into_iter()
            .filter_map(|(_, p)| match p {
                ParsedLine::Record(r) => Some(r.id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, (1..=1200).collect::<Vec<u64>>());
    }

    #[test]
    fn load_replaces_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("professors.jsonl");
        let conn = memory_db();
        db::insert_professors(&conn, &[prof(1, "stale", &[])]).unwrap();

        std::fs::write(
            &path,
            "{\"id\":1,\"name\":\"A\",\"research_fields\":[\"AI\"]}\n{broken\n{\"id\":2,\"name\":\"B\"}\n",
        )
        .unwrap();
        let report = load_file(&conn, &path).unwrap();
        assert_eq!(report, LoadReport { inserted: 2, skipped: 1, blank: 0 });
        assert_eq!(db::count_all(&conn).unwrap(), 2);

        let stale = vec![];
        let filter = db::Filter { search_term: Some("stale"), research_fields: &stale };
        assert_eq!(db::count_matching(&conn, &filter).unwrap(), 0);
    }

    #[test]
    fn load_of_missing_file_fails() {
        let conn = memory_db();
        assert!(load_file(&conn, Path::new("/nonexistent/professors.jsonl")).is_err());
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/professors.jsonl");
        write_jsonl(&path, &[prof(1, "A", &["AI"]), prof(2, "B", &[])]).unwrap();
        assert!(!path.with_extension("jsonl.tmp").exists());

        let conn = memory_db();
        let report = load_file(&conn, &path).unwrap();
        assert_eq!(report.inserted, 2);
    }

    #[test]
    fn renumber_rewrites_ids_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("professors.jsonl");
        std::fs::write(
            &path,
            "{\"id\":7,\"name\":\"علی\",\"extra\":true}\n\n{\"name\":\"B\",\"id\":7}\n{\"name\":\"C\"}\n",
        )
        .unwrap();

        assert_eq!(renumber_file(&path).unwrap(), 3);
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "{\"id\":1,\"name\":\"علی\",\"extra\":true}");
        assert_eq!(lines[1], "{\"name\":\"B\",\"id\":2}");
        assert_eq!(lines[2], "{\"name\":\"C\",\"id\":3}");
    }

    #[test]
    fn renumber_rejects_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("professors.jsonl");
        std::fs::write(&path, "{\"id\":1}\n[1,2]\n").unwrap();
        let err = renumber_file(&path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
        // file untouched on failure
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"id\":1}\n[1,2]\n");
    }
}
