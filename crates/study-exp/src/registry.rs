use std::fs::{self, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use study_core::errors::{ErrorInfo, StudyError};
use study_core::{ModValue, StudyDescriptor, StudyStore, VariantStatus};
use study_model::to_canonical_json_bytes;

const COLUMNS: [&str; 7] = [
    "recorded_at",
    "study_dir",
    "plan_hash",
    "variant_id",
    "status",
    "duration_secs",
    "varied",
];

/// Supported registry backends.
#[derive(Debug, Clone, PartialEq)]
pub enum Registry {
    /// Append-only CSV file.
    Csv(PathBuf),
    /// SQLite database with a `variants` table.
    Sqlite(PathBuf),
}

impl Registry {
    /// Picks the backend from the file extension (`.sqlite`/`.db` or CSV).
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("sqlite") | Some("db") => Registry::Sqlite(path),
            _ => Registry::Csv(path),
        }
    }
}

/// Filter for registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Query {
    /// Only rows of this plan hash.
    #[serde(default)]
    pub plan_hash: Option<String>,
    /// Maximum number of rows.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Tabular query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows in storage order.
    pub rows: Vec<Vec<String>>,
}

/// One registry row per variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRow {
    /// Time the row was appended.
    pub recorded_at: String,
    /// Study directory.
    pub study_dir: String,
    /// Plan hash of the study.
    pub plan_hash: String,
    /// Variant identifier.
    pub variant_id: u32,
    /// Variant status.
    pub status: String,
    /// Duration of the last execution in seconds, empty when unknown.
    pub duration_secs: String,
    /// Canonical JSON of the variant's varied tags.
    pub varied: String,
}

impl RegistryRow {
    fn fields(&self) -> Vec<String> {
        vec![
            self.recorded_at.clone(),
            self.study_dir.clone(),
            self.plan_hash.clone(),
            self.variant_id.to_string(),
            self.status.clone(),
            self.duration_secs.clone(),
            self.varied.clone(),
        ]
    }
}

fn registry_error(code: &str, message: &str, err: impl ToString) -> StudyError {
    StudyError::Storage(ErrorInfo::new(code, message).with_hint(err.to_string()))
}

fn status_name(status: VariantStatus) -> &'static str {
    match status {
        VariantStatus::Pending => "pending",
        VariantStatus::Started => "started",
        VariantStatus::Finished => "finished",
        VariantStatus::Failed => "failed",
    }
}

/// Builds the rows of a study, reading varied tags from finished outputs.
pub fn registry_rows(
    descriptor: &StudyDescriptor,
    store: &dyn StudyStore,
    recorded_at: &str,
) -> Result<Vec<RegistryRow>, StudyError> {
    let study_dir = descriptor
        .study_dir
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();
    let mut rows = Vec::with_capacity(descriptor.variants.len());
    for variant in &descriptor.variants {
        let varied: std::collections::BTreeMap<String, ModValue> =
            if variant.status == VariantStatus::Finished && store.exists(&variant.output_path) {
                store
                    .load(&variant.output_path)?
                    .into_iter()
                    .flat_map(|record| record.varied)
                    .collect()
            } else {
                Default::default()
            };
        let varied = String::from_utf8(to_canonical_json_bytes(&varied)?)
            .map_err(|err| registry_error("registry_canonical", "varied tags are not UTF-8", err))?;
        rows.push(RegistryRow {
            recorded_at: recorded_at.to_string(),
            study_dir: study_dir.clone(),
            plan_hash: descriptor.plan_hash.clone(),
            variant_id: variant.id,
            status: status_name(variant.status).to_string(),
            duration_secs: variant
                .duration_secs
                .map(|secs| format!("{secs:.6}"))
                .unwrap_or_default(),
            varied,
        });
    }
    Ok(rows)
}

/// Appends rows to the registry.
pub fn registry_append(registry: &Registry, rows: &[RegistryRow]) -> Result<(), StudyError> {
    match registry {
        Registry::Csv(path) => append_csv(path, rows),
        Registry::Sqlite(path) => append_sqlite(path, rows),
    }
}

/// Queries the registry.
pub fn registry_query(registry: &Registry, query: &Query) -> Result<Table, StudyError> {
    match registry {
        Registry::Csv(path) => query_csv(path, query),
        Registry::Sqlite(path) => query_sqlite(path, query),
    }
}

fn ensure_parent(path: &Path) -> Result<(), StudyError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|err| StudyError::storage("registry_create", parent, err)),
        _ => Ok(()),
    }
}

fn append_csv(path: &Path, rows: &[RegistryRow]) -> Result<(), StudyError> {
    ensure_parent(path)?;
    let file_exists = path.exists();
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|err| StudyError::storage("registry_open", path, err))?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));
    if !file_exists {
        writer
            .write_record(COLUMNS)
            .map_err(|err| registry_error("registry_header", "failed to write CSV header", err))?;
    }
    for row in rows {
        writer
            .write_record(row.fields())
            .map_err(|err| registry_error("registry_row", "failed to write CSV row", err))?;
    }
    writer
        .flush()
        .map_err(|err| registry_error("registry_flush", "failed to flush CSV registry", err))
}

fn open_sqlite(path: &Path) -> Result<Connection, StudyError> {
    let conn = Connection::open(path).map_err(|err| {
        StudyError::Storage(
            ErrorInfo::new("registry_sqlite_open", "failed to open sqlite registry")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS variants (
            recorded_at TEXT NOT NULL,
            study_dir TEXT NOT NULL,
            plan_hash TEXT NOT NULL,
            variant_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            duration_secs TEXT NOT NULL,
            varied TEXT NOT NULL
        );"#,
    )
    .map_err(|err| registry_error("registry_sqlite_schema", "failed to ensure registry schema", err))?;
    Ok(conn)
}

fn append_sqlite(path: &Path, rows: &[RegistryRow]) -> Result<(), StudyError> {
    ensure_parent(path)?;
    let mut conn = open_sqlite(path)?;
    let tx = conn
        .transaction()
        .map_err(|err| registry_error("registry_sqlite_transaction", "failed to start transaction", err))?;
    for row in rows {
        tx.execute(
            "INSERT INTO variants (recorded_at, study_dir, plan_hash, variant_id, status, duration_secs, varied)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &row.recorded_at,
                &row.study_dir,
                &row.plan_hash,
                i64::from(row.variant_id),
                &row.status,
                &row.duration_secs,
                &row.varied,
            ],
        )
        .map_err(|err| registry_error("registry_sqlite_insert", "failed to append registry row", err))?;
    }
    tx.commit()
        .map_err(|err| registry_error("registry_sqlite_commit", "failed to commit registry rows", err))
}

fn query_csv(path: &Path, query: &Query) -> Result<Table, StudyError> {
    if !path.exists() {
        return Ok(empty_table());
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|err| registry_error("registry_read", "failed to read CSV registry", err))?;
    let mut rows = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|err| registry_error("registry_record", "malformed CSV registry row", err))?;
        if let Some(plan) = &query.plan_hash {
            if record.get(2) != Some(plan.as_str()) {
                continue;
            }
        }
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        if query.limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }
    }
    Ok(Table {
        columns: table_columns(),
        rows,
    })
}

fn query_sqlite(path: &Path, query: &Query) -> Result<Table, StudyError> {
    if !path.exists() {
        return Ok(empty_table());
    }
    let conn = open_sqlite(path)?;
    let mut sql = format!("SELECT {} FROM variants", COLUMNS.join(", "));
    if query.plan_hash.is_some() {
        sql.push_str(" WHERE plan_hash = ?1");
    }
    sql.push_str(" ORDER BY recorded_at, plan_hash, variant_id");
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| registry_error("registry_sqlite_prepare", "failed to prepare registry query", err))?;
    let mut rows_iter = match &query.plan_hash {
        Some(plan) => stmt.query([plan]),
        None => stmt.query([]),
    }
    .map_err(|err| registry_error("registry_sqlite_query", "failed to execute registry query", err))?;
    let mut rows = Vec::new();
    while let Some(row) = rows_iter
        .next()
        .map_err(|err| registry_error("registry_sqlite_row", "failed to fetch registry row", err))?
    {
        let mut fields = Vec::with_capacity(COLUMNS.len());
        for (idx, column) in COLUMNS.iter().enumerate() {
            let value = if *column == "variant_id" {
                row.get::<_, i64>(idx).map(|v| v.to_string())
            } else {
                row.get::<_, String>(idx)
            }
            .map_err(|err| registry_error("registry_sqlite_get", "failed to read column", err))?;
            fields.push(value);
        }
        rows.push(fields);
    }
    Ok(Table {
        columns: table_columns(),
        rows,
    })
}

fn table_columns() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn empty_table() -> Table {
    Table {
        columns: table_columns(),
        rows: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(plan: &str, id: u32) -> RegistryRow {
        RegistryRow {
            recorded_at: "2024-01-01T00:00:00Z".into(),
            study_dir: "study".into(),
            plan_hash: plan.into(),
            variant_id: id,
            status: "finished".into(),
            duration_secs: "0.5".into(),
            varied: r#"{"E_gNa":100.0}"#.into(),
        }
    }

    #[test]
    fn csv_and_sqlite_filter_by_plan() {
        let dir = tempdir().expect("tempdir");
        for name in ["registry.csv", "registry.sqlite"] {
            let registry = Registry::from_path(dir.path().join(name));
            registry_append(&registry, &[row("a", 1), row("b", 1)]).expect("append");
            registry_append(&registry, &[row("a", 2)]).expect("append again");
            let table = registry_query(
                &registry,
                &Query {
                    plan_hash: Some("a".into()),
                    limit: None,
                },
            )
            .expect("query");
            assert_eq!(table.rows.len(), 2, "{name}");
            assert_eq!(table.rows[1][3], "2");
            let limited = registry_query(
                &registry,
                &Query {
                    plan_hash: None,
                    limit: Some(1),
                },
            )
            .expect("limited");
            assert_eq!(limited.rows.len(), 1);
        }
    }
}
