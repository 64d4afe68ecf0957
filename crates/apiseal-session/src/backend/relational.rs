use super::{BackendKind, StorageBackend};
use crate::record::{SessionModel, SessionRecord};
use apiseal_core::{ApiSealError, ApiSealResult, RelationalBackendConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const ID_SEPARATOR: &str = "\u{1f}";

/// Ids per `DELETE` statement. SQLite caps bound parameters at 32766.
const REMOVE_BATCH: usize = 500;

/// Longest database error text carried into a session error.
const MAX_ERROR_LEN: usize = 256;

/// Relational session storage: one row per session in a SQLite table.
///
/// Columns are the four mandatory fields plus one TEXT column per model
/// extension, holding the JSON-encoded value. Extension fields outside the
/// model are not persisted.
pub struct RelationalBackend {
    conn: Arc<Mutex<Connection>>,
    table: String,
    columns: Vec<String>,
}

impl RelationalBackend {
    /// Open (or create) the database and the session table.
    ///
    /// A `path` of `:memory:` opens a private in-memory database.
    pub fn open(config: &RelationalBackendConfig, model: &SessionModel) -> ApiSealResult<Self> {
        let conn = if config.path == Path::new(":memory:") {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiSealError::runtime(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            Connection::open(&config.path)
        }
        .map_err(|e| ApiSealError::runtime(format!("cannot open session database: {e}")))?;

        Self::with_connection(conn, &config.table, model)
    }

    /// Use an already opened connection.
    pub fn with_connection(
        conn: Connection,
        table: &str,
        model: &SessionModel,
    ) -> ApiSealResult<Self> {
        validate_identifier(table)?;
        let columns = model.extension_keys();
        for column in &columns {
            validate_identifier(column)?;
        }

        let extension_ddl: String = columns
            .iter()
            .map(|c| format!(", {c} TEXT"))
            .collect();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                session_id TEXT PRIMARY KEY NOT NULL,
                session_data TEXT NOT NULL,
                session_time INTEGER NOT NULL,
                expires_time INTEGER NOT NULL{extension_ddl}
            )"
        );
        conn.execute_batch(&ddl).map_err(query_error)?;
        info!(table = %table, columns = columns.len(), "Session table ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
            columns,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> ApiSealResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| ApiSealError::runtime(format!("session database task failed: {e}")))?
        .map_err(query_error)
    }

    fn select_sql(&self) -> String {
        let extension: String = self.columns.iter().map(|c| format!(", {c}")).collect();
        format!(
            "SELECT session_id, session_data, session_time, expires_time{extension} \
             FROM {} WHERE session_id = ?1",
            self.table
        )
    }

    fn extension_values(&self, record: &SessionRecord) -> ApiSealResult<Vec<SqlValue>> {
        self.columns
            .iter()
            .map(|c| match record.extra.get(c) {
                Some(v) => Ok(SqlValue::Text(serde_json::to_string(v)?)),
                None => Ok(SqlValue::Null),
            })
            .collect()
    }
}

fn query_error(e: rusqlite::Error) -> ApiSealError {
    let mut message = e.to_string();
    if message.len() > MAX_ERROR_LEN {
        let mut end = MAX_ERROR_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
        message.push_str("...");
    }
    ApiSealError::runtime(format!("session database error: {message}"))
}

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
fn validate_identifier(name: &str) -> ApiSealResult<()> {
    let mut chars = name.chars();
    let valid = name.len() <= 64
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ApiSealError::config(format!(
            "'{name}' is not a valid table or column name"
        )));
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for RelationalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn load(&self, session_id: &str) -> ApiSealResult<Option<SessionRecord>> {
        let sql = self.select_sql();
        let columns = self.columns.clone();
        let id = session_id.to_string();

        let row = self
            .with_conn(move |conn| {
                conn.query_row(&sql, params![id], |row| {
                    let mut record = SessionRecord::new(row.get::<_, String>(0)?);
                    record.session_data = row.get(1)?;
                    record.session_time = row.get(2)?;
                    record.expires_time = row.get(3)?;
                    let mut raw_extra = Vec::with_capacity(columns.len());
                    for (i, column) in columns.iter().enumerate() {
                        raw_extra.push((column.clone(), row.get::<_, Option<String>>(4 + i)?));
                    }
                    Ok((record, raw_extra))
                })
                .optional()
            })
            .await?;

        let Some((mut record, raw_extra)) = row else {
            return Ok(None);
        };
        for (column, raw) in raw_extra {
            if let Some(raw) = raw {
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                record.extra.insert(column, value);
            }
        }
        Ok(Some(record))
    }

    async fn insert(&self, record: &SessionRecord) -> ApiSealResult<()> {
        let mut names = vec![
            "session_id".to_string(),
            "session_data".to_string(),
            "session_time".to_string(),
            "expires_time".to_string(),
        ];
        names.extend(self.columns.iter().cloned());
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders.join(", ")
        );

        let mut values = vec![
            SqlValue::Text(record.session_id.clone()),
            SqlValue::Text(record.session_data.clone()),
            SqlValue::Integer(record.session_time),
            SqlValue::Integer(record.expires_time),
        ];
        values.extend(self.extension_values(record)?);

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(&sql, params_from_iter(values.iter()))?;
            tx.commit()
        })
        .await?;
        debug!(session_id = %record.session_id, table = %self.table, "Session row inserted");
        Ok(())
    }

    async fn update(&self, record: &SessionRecord) -> ApiSealResult<()> {
        let mut assignments = vec![
            "session_data = ?1".to_string(),
            "session_time = ?2".to_string(),
            "expires_time = ?3".to_string(),
        ];
        for (i, column) in self.columns.iter().enumerate() {
            assignments.push(format!("{column} = ?{}", 4 + i));
        }
        let id_param = assignments.len() + 1;
        let sql = format!(
            "UPDATE {} SET {} WHERE session_id = ?{id_param}",
            self.table,
            assignments.join(", ")
        );

        let mut values = vec![
            SqlValue::Text(record.session_data.clone()),
            SqlValue::Integer(record.session_time),
            SqlValue::Integer(record.expires_time),
        ];
        values.extend(self.extension_values(record)?);
        values.push(SqlValue::Text(record.session_id.clone()));

        let changed = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(&sql, params_from_iter(values.iter()))?;
                tx.commit()?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(ApiSealError::runtime(format!(
                "cannot update session {}: row does not exist",
                record.session_id
            )));
        }
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> ApiSealResult<()> {
        let sql = format!("DELETE FROM {} WHERE session_id = ?1", self.table);
        let id = session_id.to_string();
        self.with_conn(move |conn| conn.execute(&sql, params![id]))
            .await?;
        Ok(())
    }

    async fn remove_group(&self, session_ids: &[String], cutoff: i64) -> ApiSealResult<usize> {
        if session_ids.is_empty() {
            return Ok(0);
        }
        let table = self.table.clone();
        let ids = session_ids.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            for chunk in ids.chunks(REMOVE_BATCH) {
                let placeholders: Vec<String> =
                    (2..chunk.len() + 2).map(|i| format!("?{i}")).collect();
                let sql = format!(
                    "DELETE FROM {table} WHERE session_time < ?1 AND session_id IN ({})",
                    placeholders.join(", ")
                );
                let mut values = Vec::with_capacity(chunk.len() + 1);
                values.push(SqlValue::Integer(cutoff));
                values.extend(chunk.iter().map(|id| SqlValue::Text(id.clone())));
                removed += tx.execute(&sql, params_from_iter(values.iter()))?;
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn lost_sessions(&self, cutoff: i64) -> ApiSealResult<Vec<String>> {
        let sql = format!(
            "SELECT group_concat(session_id, ?2) FROM {} WHERE session_time < ?1",
            self.table
        );
        let joined: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(&sql, params![cutoff, ID_SEPARATOR], |row| row.get(0))
            })
            .await?;

        let mut ids: Vec<String> = joined
            .map(|s| s.split(ID_SEPARATOR).map(str::to_string).collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(model: &SessionModel) -> RelationalBackend {
        RelationalBackend::with_connection(
            Connection::open_in_memory().unwrap(),
            "sessions",
            model,
        )
        .unwrap()
    }

    fn record(id: &str, time: i64) -> SessionRecord {
        let mut r = SessionModel::default().blank(id);
        r.session_data = "a=1".into();
        r.session_time = time;
        r.expires_time = 1800;
        r
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("sessions").is_ok());
        assert!(validate_identifier("_t1").is_ok());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("t; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_bad_table_name_is_config_error() {
        let result = RelationalBackend::with_connection(
            Connection::open_in_memory().unwrap(),
            "bad-name",
            &SessionModel::bare(),
        );
        assert!(matches!(result, Err(ApiSealError::Config(_))));
    }

    #[tokio::test]
    async fn test_extension_columns_round_trip() {
        let b = backend(&SessionModel::default());
        let mut r = record("A", 100);
        r.extra.insert("remote_ip".into(), json!("10.0.0.9"));
        b.insert(&r).await.unwrap();
        assert_eq!(b.load("A").await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let b = backend(&SessionModel::default());
        b.insert(&record("A", 1)).await.unwrap();
        let result = b.insert(&record("A", 2)).await;
        assert!(matches!(result, Err(ApiSealError::SessionRuntime(_))));
    }

    #[tokio::test]
    async fn test_update_missing_row_fails() {
        let b = backend(&SessionModel::default());
        assert!(b.update(&record("GHOST", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_lost_sessions_uses_strict_cutoff() {
        let b = backend(&SessionModel::default());
        b.insert(&record("A", 100)).await.unwrap();
        b.insert(&record("B", 200)).await.unwrap();
        b.insert(&record("C", 300)).await.unwrap();

        assert_eq!(b.lost_sessions(200).await.unwrap(), vec!["A"]);
        assert_eq!(b.lost_sessions(301).await.unwrap(), vec!["A", "B", "C"]);
        assert!(b.lost_sessions(0).await.unwrap().is_empty());

        assert_eq!(
            b.remove_group(&["A".into(), "B".into()], 301).await.unwrap(),
            2
        );
        assert!(b.load("A").await.unwrap().is_none());
        assert!(b.load("C").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_group_keeps_refreshed_rows() {
        let b = backend(&SessionModel::default());
        b.insert(&record("STALE", 100)).await.unwrap();
        b.insert(&record("LIVE", 100)).await.unwrap();

        let listed = b.lost_sessions(500).await.unwrap();
        b.update(&record("LIVE", 900)).await.unwrap();

        assert_eq!(b.remove_group(&listed, 500).await.unwrap(), 1);
        assert!(b.load("LIVE").await.unwrap().is_some());
        assert!(b.load("STALE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_group_beyond_parameter_limit() {
        const STALE_ROWS: usize = 33_000;
        let b = backend(&SessionModel::default());
        {
            let mut conn = b.conn.lock();
            let tx = conn.transaction().unwrap();
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO sessions (session_id, session_data, session_time, expires_time) \
                         VALUES (?1, '', 10, 1800)",
                    )
                    .unwrap();
                for i in 0..STALE_ROWS {
                    stmt.execute(params![format!("S{i:05}")]).unwrap();
                }
            }
            tx.commit().unwrap();
        }
        b.insert(&record("FRESH", 5_000)).await.unwrap();

        let lost = b.lost_sessions(100).await.unwrap();
        assert_eq!(lost.len(), STALE_ROWS);
        assert_eq!(b.remove_group(&lost, 100).await.unwrap(), STALE_ROWS);
        assert!(b.lost_sessions(100).await.unwrap().is_empty());
        assert!(b.load("FRESH").await.unwrap().is_some());
    }

    #[test]
    fn test_query_error_text_is_bounded() {
        let err = query_error(rusqlite::Error::InvalidColumnName("x".repeat(10_000)));
        let ApiSealError::SessionRuntime(message) = err else {
            panic!("expected a runtime error");
        };
        assert!(message.len() < MAX_ERROR_LEN + 64);
        assert!(message.ends_with("..."));
    }
}
