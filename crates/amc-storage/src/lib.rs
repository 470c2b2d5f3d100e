//! Durable storage for the memory service: append-only events, derived
//! chunks, decisions, tasks, artifacts, memory edits, capsules, handoffs,
//! audit log, and consolidation bookkeeping. One SQLite connection per
//! `Store`; every primitive takes a tenant id and predicates on it.

use amc_core::{
    Artifact, AuditLogEntry, AuditOutcome, Capsule, CapsuleItems, CapsuleStatus, Channel, Chunk,
    Decision, DecisionStatus, Event, EventKind, MemoryEdit, Scope, Sensitivity,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

pub const SCHEMA_VERSION: i64 = 1;

/// Maximum depth walked when checking `blocked_by` for cycles, mirrored
/// from `amc_core::task::MAX_BLOCKED_BY_CYCLE_DEPTH`.
const MAX_CYCLE_DEPTH: u32 = amc_core::task::MAX_BLOCKED_BY_CYCLE_DEPTH;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("row not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl From<StorageError> for amc_core::CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => amc_core::CoreError::NotFound("row not found".to_string()),
            StorageError::Conflict(msg) => amc_core::CoreError::Conflict(msg),
            StorageError::Integrity(msg) => amc_core::CoreError::IntegrityError(msg),
            StorageError::UnsupportedSchemaVersion { found, supported } => amc_core::CoreError::internal(format!(
                "unsupported schema version {found}, max supported {supported}"
            )),
            StorageError::Serialization(msg) => amc_core::CoreError::internal(msg),
            StorageError::Sqlite(err) => amc_core::CoreError::internal(err.to_string()),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|err| StorageError::Serialization(err.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StorageError> {
    serde_json::from_str(text).map_err(|err| StorageError::Serialization(err.to_string()))
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self.conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }
        if current < 1 {
            let sql = include_str!("../migrations/0001_core_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn.execute("PRAGMA user_version = 1", [])?;
        }
        Ok(())
    }

    fn guard_tenant(tenant_id: &str) {
        assert!(!tenant_id.is_empty(), "tenant_id must not be empty: programming error");
    }

    // ---------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------

    /// Inserts an event; returns `false` if a row with the same dedup key
    /// (tenant, session, content hash) already existed instead of erroring,
    /// so the Recorder can treat re-submission as idempotent.
    pub fn insert_event(&self, event: &Event, content_hash: &str) -> Result<bool, StorageError> {
        Self::guard_tenant(&event.tenant_id);
        let tags = to_json(&event.tags)?;
        let content = to_json(&event.content)?;
        let refs = to_json(&event.refs)?;
        let result = self.conn.execute(
            "INSERT OR IGNORE INTO events
                (event_id, tenant_id, session_id, ts, channel, actor_type, actor_id, kind,
                 sensitivity, tags, content, refs, scope, subject_type, subject_id, project_id, content_hash)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                event.event_id,
                event.tenant_id,
                event.session_id,
                event.ts,
                event.channel.as_str(),
                event.actor.actor_type.as_str(),
                event.actor.id,
                event.kind.as_str(),
                event.sensitivity.as_str(),
                tags,
                content,
                refs,
                event.scope.map(Scope::as_str),
                event.subject_type,
                event.subject_id,
                event.project_id,
                content_hash,
            ],
        )?;
        Ok(result > 0)
    }

    /// Looks up an existing event by its dedup key, used by the Recorder to
    /// return the prior result on a duplicate submission.
    pub fn find_event_by_hash(
        &self,
        tenant_id: &str,
        session_id: &str,
        content_hash: &str,
    ) -> Result<Option<Event>, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM events WHERE tenant_id=?1 AND session_id=?2 AND content_hash=?3",
                params![tenant_id, session_id, content_hash],
                Self::row_to_event,
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn get_event(&self, tenant_id: &str, event_id: &str) -> Result<Event, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM events WHERE tenant_id=?1 AND event_id=?2",
                params![tenant_id, event_id],
                Self::row_to_event,
            )
            .optional()?
            .ok_or(StorageError::NotFound)
    }

    pub fn list_events(
        &self,
        tenant_id: &str,
        session_id: &str,
        limit: u32,
        before_ts: Option<i64>,
    ) -> Result<Vec<Event>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM events
             WHERE tenant_id=?1 AND session_id=?2 AND (?3 IS NULL OR ts < ?3)
             ORDER BY ts DESC LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![tenant_id, session_id, before_ts, limit],
            Self::row_to_event,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
        let tags: String = row.get("tags")?;
        let content: String = row.get("content")?;
        let refs: String = row.get("refs")?;
        let channel: String = row.get("channel")?;
        let actor_type: String = row.get("actor_type")?;
        let kind: String = row.get("kind")?;
        let sensitivity: String = row.get("sensitivity")?;
        let scope: Option<String> = row.get("scope")?;
        Ok(Event {
            event_id: row.get("event_id")?,
            tenant_id: row.get("tenant_id")?,
            session_id: row.get("session_id")?,
            ts: row.get("ts")?,
            channel: channel.parse().map_err(to_sqlite_err)?,
            actor: amc_core::ActorRef::new(
                actor_type.parse().map_err(to_sqlite_err)?,
                row.get::<_, String>("actor_id")?,
            ),
            kind: kind.parse().map_err(to_sqlite_err)?,
            sensitivity: sensitivity.parse().map_err(to_sqlite_err)?,
            tags: serde_json::from_str(&tags).map_err(to_sqlite_json_err)?,
            content: serde_json::from_str(&content).map_err(to_sqlite_json_err)?,
            refs: serde_json::from_str(&refs).map_err(to_sqlite_json_err)?,
            scope: scope.map(|s| s.parse()).transpose().map_err(to_sqlite_err)?,
            subject_type: row.get("subject_type")?,
            subject_id: row.get("subject_id")?,
            project_id: row.get("project_id")?,
        })
    }

    // ---------------------------------------------------------------
    // Chunks
    // ---------------------------------------------------------------

    /// Inserts all chunks for one event plus their FTS rows, in the
    /// caller's transaction (see `Store::transaction`).
    pub fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        for chunk in chunks {
            Self::guard_tenant(&chunk.tenant_id);
            let tags = to_json(&chunk.tags)?;
            let refs = to_json(&chunk.refs)?;
            self.conn.execute(
                "INSERT INTO chunks
                    (chunk_id, tenant_id, event_id, session_id, ts, kind, channel, sensitivity,
                     tags, text, token_est, importance, scope, subject_type, subject_id, project_id, refs)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
                params![
                    chunk.chunk_id,
                    chunk.tenant_id,
                    chunk.event_id,
                    chunk.session_id,
                    chunk.ts,
                    chunk.kind.as_str(),
                    chunk.channel.as_str(),
                    chunk.sensitivity.as_str(),
                    tags,
                    chunk.text,
                    chunk.token_est,
                    chunk.importance,
                    chunk.scope.map(Scope::as_str),
                    chunk.subject_type,
                    chunk.subject_id,
                    chunk.project_id,
                    refs,
                ],
            )?;
            self.conn.execute(
                "INSERT INTO chunks_fts (chunk_id, tenant_id, text) VALUES (?1,?2,?3)",
                params![chunk.chunk_id, chunk.tenant_id, chunk.text],
            )?;
        }
        Ok(())
    }

    pub fn get_chunks_by_ids(&self, tenant_id: &str, chunk_ids: &[String]) -> Result<Vec<Chunk>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut out = Vec::with_capacity(chunk_ids.len());
        for chunk_id in chunk_ids {
            if let Some(chunk) = self
                .conn
                .query_row(
                    "SELECT * FROM chunks WHERE tenant_id=?1 AND chunk_id=?2",
                    params![tenant_id, chunk_id],
                    Self::row_to_chunk,
                )
                .optional()?
            {
                out.push(chunk);
            }
        }
        Ok(out)
    }

    /// Chunks derived from a single event, in derivation order. Used by the
    /// Recorder to report `chunk_ids` back on a re-submitted (duplicate)
    /// event without re-deriving them.
    pub fn chunks_for_event(&self, tenant_id: &str, event_id: &str) -> Result<Vec<Chunk>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM chunks WHERE tenant_id=?1 AND event_id=?2 ORDER BY rowid ASC")?;
        let rows = stmt.query_map(params![tenant_id, event_id], Self::row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    pub fn recent_chunks(&self, tenant_id: &str, session_id: &str, limit: u32) -> Result<Vec<Chunk>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM chunks WHERE tenant_id=?1 AND session_id=?2 ORDER BY ts DESC LIMIT ?3")?;
        let rows = stmt.query_map(params![tenant_id, session_id, limit], Self::row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// FTS candidate pool. `query_text` of `None` falls back to plain
    /// recency order within the other filters (no `MATCH` clause).
    #[allow(clippy::too_many_arguments)]
    pub fn search_chunks(
        &self,
        tenant_id: &str,
        query_text: Option<&str>,
        session_id: Option<&str>,
        scope: Option<Scope>,
        subject: Option<(&str, &str)>,
        project_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Chunk>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut sql = String::from("SELECT c.* FROM chunks c ");
        if query_text.is_some() {
            sql.push_str("JOIN chunks_fts f ON f.chunk_id = c.chunk_id AND f.tenant_id = c.tenant_id ");
        }
        sql.push_str("WHERE c.tenant_id = ?1 ");
        let mut idx = 2;
        let mut bind_strings: Vec<String> = Vec::new();
        if let Some(q) = query_text {
            sql.push_str(&format!("AND f.text MATCH ?{idx} "));
            bind_strings.push(q.to_string());
            idx += 1;
        }
        if let Some(session_id) = session_id {
            sql.push_str(&format!("AND c.session_id = ?{idx} "));
            bind_strings.push(session_id.to_string());
            idx += 1;
        }
        if let Some(scope) = scope {
            sql.push_str(&format!("AND c.scope = ?{idx} "));
            bind_strings.push(scope.as_str().to_string());
            idx += 1;
        }
        if let Some((subject_type, subject_id)) = subject {
            sql.push_str(&format!("AND c.subject_type = ?{idx} "));
            bind_strings.push(subject_type.to_string());
            idx += 1;
            sql.push_str(&format!("AND c.subject_id = ?{idx} "));
            bind_strings.push(subject_id.to_string());
            idx += 1;
        }
        if let Some(project_id) = project_id {
            sql.push_str(&format!("AND c.project_id = ?{idx} "));
            bind_strings.push(project_id.to_string());
            idx += 1;
        }
        sql.push_str(&format!("ORDER BY c.ts DESC LIMIT ?{idx}"));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut params_dyn: Vec<&dyn rusqlite::ToSql> = vec![&tenant_id];
        for value in &bind_strings {
            params_dyn.push(value);
        }
        params_dyn.push(&limit);
        let rows = stmt.query_map(params_dyn.as_slice(), Self::row_to_chunk)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn row_to_chunk(row: &Row) -> rusqlite::Result<Chunk> {
        let tags: String = row.get("tags")?;
        let refs: String = row.get("refs")?;
        let kind: String = row.get("kind")?;
        let channel: String = row.get("channel")?;
        let sensitivity: String = row.get("sensitivity")?;
        let scope: Option<String> = row.get("scope")?;
        Ok(Chunk {
            chunk_id: row.get("chunk_id")?,
            tenant_id: row.get("tenant_id")?,
            event_id: row.get("event_id")?,
            session_id: row.get("session_id")?,
            ts: row.get("ts")?,
            kind: kind.parse().map_err(to_sqlite_err)?,
            channel: channel.parse().map_err(to_sqlite_err)?,
            sensitivity: sensitivity.parse().map_err(to_sqlite_err)?,
            tags: serde_json::from_str(&tags).map_err(to_sqlite_json_err)?,
            text: row.get("text")?,
            token_est: row.get("token_est")?,
            importance: row.get("importance")?,
            scope: scope.map(|s| s.parse()).transpose().map_err(to_sqlite_err)?,
            subject_type: row.get("subject_type")?,
            subject_id: row.get("subject_id")?,
            project_id: row.get("project_id")?,
            refs: serde_json::from_str(&refs).map_err(to_sqlite_json_err)?,
        })
    }

    // ---------------------------------------------------------------
    // Decisions
    // ---------------------------------------------------------------

    pub fn insert_decision(&self, decision: &Decision) -> Result<(), StorageError> {
        Self::guard_tenant(&decision.tenant_id);
        self.conn.execute(
            "INSERT INTO decisions
                (decision_id, tenant_id, ts, status, scope, decision, rationale, constraints,
                 alternatives, consequences, refs, subject_type, subject_id, project_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                decision.decision_id,
                decision.tenant_id,
                decision.ts,
                decision.status.as_str(),
                decision.scope.as_str(),
                decision.decision,
                to_json(&decision.rationale)?,
                to_json(&decision.constraints)?,
                to_json(&decision.alternatives)?,
                to_json(&decision.consequences)?,
                to_json(&decision.refs)?,
                decision.subject_type,
                decision.subject_id,
                decision.project_id,
            ],
        )?;
        Ok(())
    }

    /// Atomically flips `predecessor_id` to `superseded` and inserts
    /// `successor` in one transaction. Fails with `Conflict` if the
    /// predecessor is not currently `active`.
    pub fn supersede_decision(&self, tenant_id: &str, predecessor_id: &str, successor: &Decision) -> Result<(), StorageError> {
        Self::guard_tenant(tenant_id);
        let tx = self.conn.unchecked_transaction()?;
        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM decisions WHERE tenant_id=?1 AND decision_id=?2",
                params![tenant_id, predecessor_id],
                |row| row.get(0),
            )
            .optional()?;
        match status.as_deref() {
            None => return Err(StorageError::NotFound),
            Some("active") => {}
            Some(_) => {
                return Err(StorageError::Conflict(format!(
                    "decision {predecessor_id} is not active"
                )))
            }
        }
        tx.execute(
            "UPDATE decisions SET status='superseded' WHERE tenant_id=?1 AND decision_id=?2",
            params![tenant_id, predecessor_id],
        )?;
        tx.execute(
            "INSERT INTO decisions
                (decision_id, tenant_id, ts, status, scope, decision, rationale, constraints,
                 alternatives, consequences, refs, subject_type, subject_id, project_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                successor.decision_id,
                successor.tenant_id,
                successor.ts,
                successor.status.as_str(),
                successor.scope.as_str(),
                successor.decision,
                to_json(&successor.rationale)?,
                to_json(&successor.constraints)?,
                to_json(&successor.alternatives)?,
                to_json(&successor.consequences)?,
                to_json(&successor.refs)?,
                successor.subject_type,
                successor.subject_id,
                successor.project_id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_decision(&self, tenant_id: &str, decision_id: &str) -> Result<Decision, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM decisions WHERE tenant_id=?1 AND decision_id=?2",
                params![tenant_id, decision_id],
                Self::row_to_decision,
            )
            .optional()?
            .ok_or(StorageError::NotFound)
    }

    /// Active decisions, optionally filtered by subject/project, ordered by
    /// scope precedence desc then ts desc (§4.6).
    pub fn active_decisions(
        &self,
        tenant_id: &str,
        subject: Option<(&str, &str)>,
        project_id: Option<&str>,
    ) -> Result<Vec<Decision>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM decisions
             WHERE tenant_id=?1 AND status='active'
               AND (?2 IS NULL OR subject_type=?2) AND (?3 IS NULL OR subject_id=?3)
               AND (?4 IS NULL OR project_id=?4)
             ORDER BY ts DESC",
        )?;
        let (subject_type, subject_id) = subject.map_or((None, None), |(t, i)| (Some(t), Some(i)));
        let rows = stmt.query_map(
            params![tenant_id, subject_type, subject_id, project_id],
            Self::row_to_decision,
        )?;
        let mut decisions = rows.collect::<Result<Vec<_>, _>>()?;
        decisions.sort_by(|a, b| {
            b.scope
                .precedence()
                .cmp(&a.scope.precedence())
                .then(b.ts.cmp(&a.ts))
        });
        Ok(decisions)
    }

    fn row_to_decision(row: &Row) -> rusqlite::Result<Decision> {
        let status: String = row.get("status")?;
        let scope: String = row.get("scope")?;
        let rationale: String = row.get("rationale")?;
        let constraints: String = row.get("constraints")?;
        let alternatives: String = row.get("alternatives")?;
        let consequences: String = row.get("consequences")?;
        let refs: String = row.get("refs")?;
        Ok(Decision {
            decision_id: row.get("decision_id")?,
            tenant_id: row.get("tenant_id")?,
            ts: row.get("ts")?,
            status: status.parse().map_err(to_sqlite_err)?,
            scope: scope.parse().map_err(to_sqlite_err)?,
            decision: row.get("decision")?,
            rationale: serde_json::from_str(&rationale).map_err(to_sqlite_json_err)?,
            constraints: serde_json::from_str(&constraints).map_err(to_sqlite_json_err)?,
            alternatives: serde_json::from_str(&alternatives).map_err(to_sqlite_json_err)?,
            consequences: serde_json::from_str(&consequences).map_err(to_sqlite_json_err)?,
            refs: serde_json::from_str(&refs).map_err(to_sqlite_json_err)?,
            subject_type: row.get("subject_type")?,
            subject_id: row.get("subject_id")?,
            project_id: row.get("project_id")?,
        })
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    pub fn insert_task(&self, task: &amc_core::Task) -> Result<(), StorageError> {
        Self::guard_tenant(&task.tenant_id);
        self.check_no_cycle(&task.tenant_id, &task.task_id, &task.blocked_by)?;
        self.conn.execute(
            "INSERT INTO tasks
                (task_id, tenant_id, ts, title, details, status, priority, progress_percent,
                 assignee_id, refs, blocked_by, blocking, project_refs, start_date, due_date)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                task.task_id,
                task.tenant_id,
                task.ts,
                task.title,
                task.details,
                task.status.as_str(),
                task.priority,
                task.progress_percent,
                task.assignee_id,
                to_json(&task.refs)?,
                to_json(&task.blocked_by)?,
                to_json(&task.blocking)?,
                to_json(&task.project_refs)?,
                task.start_date,
                task.due_date,
            ],
        )?;
        self.add_blocking_links(&task.tenant_id, &task.task_id, &task.blocked_by)?;
        Ok(())
    }

    /// Walks `blocked_by` edges up to `MAX_CYCLE_DEPTH` looking for a path
    /// back to `task_id`; rejects self-reference outright.
    fn check_no_cycle(&self, tenant_id: &str, task_id: &str, blocked_by: &[String]) -> Result<(), StorageError> {
        if blocked_by.iter().any(|id| id == task_id) {
            return Err(StorageError::Integrity(format!("task {task_id} cannot block itself")));
        }
        let mut frontier = blocked_by.to_vec();
        for _ in 0..MAX_CYCLE_DEPTH {
            if frontier.is_empty() {
                return Ok(());
            }
            if frontier.iter().any(|id| id == task_id) {
                return Err(StorageError::Integrity(format!(
                    "update would create a cycle through task {task_id}"
                )));
            }
            let mut next = Vec::new();
            for id in &frontier {
                if let Some(upstream) = self
                    .conn
                    .query_row(
                        "SELECT blocked_by FROM tasks WHERE tenant_id=?1 AND task_id=?2",
                        params![tenant_id, id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?
                {
                    let ids: Vec<String> = from_json(&upstream)?;
                    next.extend(ids);
                }
            }
            frontier = next;
        }
        Ok(())
    }

    fn add_blocking_links(&self, tenant_id: &str, task_id: &str, blocked_by: &[String]) -> Result<(), StorageError> {
        for upstream_id in blocked_by {
            if let Some(blocking_json) = self
                .conn
                .query_row(
                    "SELECT blocking FROM tasks WHERE tenant_id=?1 AND task_id=?2",
                    params![tenant_id, upstream_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
            {
                let mut blocking: Vec<String> = from_json(&blocking_json)?;
                if !blocking.iter().any(|id| id == task_id) {
                    blocking.push(task_id.to_string());
                    self.conn.execute(
                        "UPDATE tasks SET blocking=?1 WHERE tenant_id=?2 AND task_id=?3",
                        params![to_json(&blocking)?, tenant_id, upstream_id],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn update_task(&self, tenant_id: &str, task_id: &str, update: &amc_core::TaskUpdateInput) -> Result<amc_core::Task, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut task = self.get_task(tenant_id, task_id)?;
        if let Some(title) = &update.title {
            task.title = title.clone();
        }
        if let Some(details) = &update.details {
            task.details = details.clone();
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(progress_percent) = update.progress_percent {
            task.progress_percent = progress_percent;
        }
        if update.assignee_id.is_some() {
            task.assignee_id = update.assignee_id.clone();
        }
        if let Some(blocked_by) = &update.blocked_by {
            self.check_no_cycle(tenant_id, task_id, blocked_by)?;
            task.blocked_by = blocked_by.clone();
        }
        if update.due_date.is_some() {
            task.due_date = update.due_date;
        }
        self.conn.execute(
            "UPDATE tasks SET title=?1, details=?2, status=?3, priority=?4, progress_percent=?5,
                assignee_id=?6, blocked_by=?7, due_date=?8
             WHERE tenant_id=?9 AND task_id=?10",
            params![
                task.title,
                task.details,
                task.status.as_str(),
                task.priority,
                task.progress_percent,
                task.assignee_id,
                to_json(&task.blocked_by)?,
                task.due_date,
                tenant_id,
                task_id,
            ],
        )?;
        if update.blocked_by.is_some() {
            self.add_blocking_links(tenant_id, task_id, &task.blocked_by)?;
        }
        Ok(task)
    }

    pub fn get_task(&self, tenant_id: &str, task_id: &str) -> Result<amc_core::Task, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM tasks WHERE tenant_id=?1 AND task_id=?2",
                params![tenant_id, task_id],
                Self::row_to_task,
            )
            .optional()?
            .ok_or(StorageError::NotFound)
    }

    pub fn list_tasks(
        &self,
        tenant_id: &str,
        status: Option<amc_core::TaskStatus>,
        assignee_id: Option<&str>,
    ) -> Result<Vec<amc_core::Task>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM tasks
             WHERE tenant_id=?1 AND (?2 IS NULL OR status=?2) AND (?3 IS NULL OR assignee_id=?3)
             ORDER BY priority DESC, ts DESC",
        )?;
        let rows = stmt.query_map(
            params![tenant_id, status.map(|s| s.as_str()), assignee_id],
            Self::row_to_task,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    pub fn delete_task(&self, tenant_id: &str, task_id: &str) -> Result<(), StorageError> {
        Self::guard_tenant(tenant_id);
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE tenant_id=?1 AND task_id=?2", params![tenant_id, task_id])?;
        if changed == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    pub fn tasks_for_project(&self, tenant_id: &str, project_id: &str) -> Result<Vec<amc_core::Task>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM tasks WHERE tenant_id=?1 AND project_refs LIKE ?2 ORDER BY ts DESC")?;
        let needle = format!("%\"{project_id}\"%");
        let rows = stmt.query_map(params![tenant_id, needle], Self::row_to_task)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn row_to_task(row: &Row) -> rusqlite::Result<amc_core::Task> {
        let status: String = row.get("status")?;
        let refs: String = row.get("refs")?;
        let blocked_by: String = row.get("blocked_by")?;
        let blocking: String = row.get("blocking")?;
        let project_refs: String = row.get("project_refs")?;
        Ok(amc_core::Task {
            task_id: row.get("task_id")?,
            tenant_id: row.get("tenant_id")?,
            ts: row.get("ts")?,
            title: row.get("title")?,
            details: row.get("details")?,
            status: status.parse().map_err(to_sqlite_err)?,
            priority: row.get("priority")?,
            progress_percent: row.get("progress_percent")?,
            assignee_id: row.get("assignee_id")?,
            refs: serde_json::from_str(&refs).map_err(to_sqlite_json_err)?,
            blocked_by: serde_json::from_str(&blocked_by).map_err(to_sqlite_json_err)?,
            blocking: serde_json::from_str(&blocking).map_err(to_sqlite_json_err)?,
            project_refs: serde_json::from_str(&project_refs).map_err(to_sqlite_json_err)?,
            start_date: row.get("start_date")?,
            due_date: row.get("due_date")?,
        })
    }

    // ---------------------------------------------------------------
    // Artifacts
    // ---------------------------------------------------------------

    pub fn insert_artifact(&self, artifact: &Artifact) -> Result<(), StorageError> {
        Self::guard_tenant(&artifact.tenant_id);
        self.conn.execute(
            "INSERT INTO artifacts (artifact_id, tenant_id, ts, content_hash, media_type, content)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                artifact.artifact_id,
                artifact.tenant_id,
                artifact.ts,
                artifact.content_hash,
                artifact.media_type,
                to_json(&artifact.content)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_artifact(&self, tenant_id: &str, artifact_id: &str) -> Result<Artifact, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM artifacts WHERE tenant_id=?1 AND artifact_id=?2",
                params![tenant_id, artifact_id],
                |row| {
                    let content: String = row.get("content")?;
                    Ok(Artifact {
                        artifact_id: row.get("artifact_id")?,
                        tenant_id: row.get("tenant_id")?,
                        ts: row.get("ts")?,
                        content_hash: row.get("content_hash")?,
                        media_type: row.get("media_type")?,
                        content: serde_json::from_str(&content).map_err(to_sqlite_json_err)?,
                    })
                },
            )
            .optional()?
            .ok_or(StorageError::NotFound)
    }

    // ---------------------------------------------------------------
    // Memory edits
    // ---------------------------------------------------------------

    pub fn insert_memory_edit(&self, edit: &MemoryEdit) -> Result<(), StorageError> {
        Self::guard_tenant(&edit.tenant_id);
        self.conn.execute(
            "INSERT INTO memory_edits
                (edit_id, tenant_id, ts, target_type, target_id, op, reason, proposed_by,
                 approved_by, status, patch, applied_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                edit.edit_id,
                edit.tenant_id,
                edit.ts,
                edit.target_type.as_str(),
                edit.target_id,
                edit.op.as_str(),
                edit.reason,
                edit.proposed_by,
                edit.approved_by,
                edit.status.as_str(),
                to_json(&edit.patch)?,
                edit.applied_at,
            ],
        )?;
        Ok(())
    }

    pub fn approve_edit(&self, tenant_id: &str, edit_id: &str, approved_by: &str, applied_at: i64) -> Result<(), StorageError> {
        Self::guard_tenant(tenant_id);
        let changed = self.conn.execute(
            "UPDATE memory_edits SET status='approved', approved_by=?1, applied_at=?2
             WHERE tenant_id=?3 AND edit_id=?4 AND status='pending'",
            params![approved_by, applied_at, tenant_id, edit_id],
        )?;
        if changed == 0 {
            return Err(StorageError::Conflict(format!("edit {edit_id} is not pending")));
        }
        Ok(())
    }

    /// All approved edits for a target, ordered `applied_at DESC`, as used
    /// by the Effective View to compute precedence.
    pub fn approved_edits_for_target(
        &self,
        tenant_id: &str,
        target_type: amc_core::TargetType,
        target_id: &str,
    ) -> Result<Vec<MemoryEdit>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM memory_edits
             WHERE tenant_id=?1 AND target_type=?2 AND target_id=?3 AND status='approved'
             ORDER BY applied_at DESC",
        )?;
        let rows = stmt.query_map(
            params![tenant_id, target_type.as_str(), target_id],
            Self::row_to_edit,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    pub fn list_edits(&self, tenant_id: &str, target_type: amc_core::TargetType, target_id: &str) -> Result<Vec<MemoryEdit>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM memory_edits WHERE tenant_id=?1 AND target_type=?2 AND target_id=?3 ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map(
            params![tenant_id, target_type.as_str(), target_id],
            Self::row_to_edit,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn row_to_edit(row: &Row) -> rusqlite::Result<MemoryEdit> {
        let target_type: String = row.get("target_type")?;
        let op: String = row.get("op")?;
        let status: String = row.get("status")?;
        let patch: String = row.get("patch")?;
        Ok(MemoryEdit {
            edit_id: row.get("edit_id")?,
            tenant_id: row.get("tenant_id")?,
            ts: row.get("ts")?,
            target_type: target_type.parse().map_err(to_sqlite_err)?,
            target_id: row.get("target_id")?,
            op: op.parse().map_err(to_sqlite_err)?,
            reason: row.get("reason")?,
            proposed_by: row.get("proposed_by")?,
            approved_by: row.get("approved_by")?,
            status: status.parse().map_err(to_sqlite_err)?,
            patch: serde_json::from_str(&patch).map_err(to_sqlite_json_err)?,
            applied_at: row.get("applied_at")?,
        })
    }

    // ---------------------------------------------------------------
    // Capsules
    // ---------------------------------------------------------------

    pub fn insert_capsule(&self, capsule: &Capsule) -> Result<(), StorageError> {
        Self::guard_tenant(&capsule.tenant_id);
        self.conn.execute(
            "INSERT INTO capsules
                (capsule_id, tenant_id, ts, scope, subject_type, subject_id, project_id,
                 author_agent_id, audience_agent_ids, items, risks, ttl_days, status, expires_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                capsule.capsule_id,
                capsule.tenant_id,
                capsule.ts,
                capsule.scope.as_str(),
                capsule.subject_type,
                capsule.subject_id,
                capsule.project_id,
                capsule.author_agent_id,
                to_json(&capsule.audience_agent_ids)?,
                to_json(&capsule.items)?,
                to_json(&capsule.risks)?,
                capsule.ttl_days,
                capsule.status.as_str(),
                capsule.expires_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_capsule(&self, tenant_id: &str, capsule_id: &str) -> Result<Capsule, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM capsules WHERE tenant_id=?1 AND capsule_id=?2",
                params![tenant_id, capsule_id],
                Self::row_to_capsule,
            )
            .optional()?
            .ok_or(StorageError::NotFound)
    }

    /// Capsules visible to `requester_agent_id`, optionally scoped to a
    /// subject. Non-audience rows are simply absent from the result — the
    /// caller-facing NotFound-vs-PermissionDenied decision is made above
    /// this layer.
    pub fn capsules_for_requester(
        &self,
        tenant_id: &str,
        requester_agent_id: &str,
        subject: Option<(&str, &str)>,
        now_ts: i64,
    ) -> Result<Vec<Capsule>, StorageError> {
        Self::guard_tenant(tenant_id);
        let (subject_type, subject_id) = subject.map_or((None, None), |(t, i)| (Some(t), Some(i)));
        let mut stmt = self.conn.prepare(
            "SELECT * FROM capsules
             WHERE tenant_id=?1 AND status='active' AND expires_at > ?2
               AND (?3 IS NULL OR subject_type=?3) AND (?4 IS NULL OR subject_id=?4)
             ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map(
            params![tenant_id, now_ts, subject_type, subject_id],
            Self::row_to_capsule,
        )?;
        let capsules = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(capsules
            .into_iter()
            .filter(|c| c.audience_agent_ids.iter().any(|id| id == requester_agent_id))
            .collect())
    }

    pub fn revoke_capsule(&self, tenant_id: &str, capsule_id: &str) -> Result<(), StorageError> {
        Self::guard_tenant(tenant_id);
        let changed = self.conn.execute(
            "UPDATE capsules SET status='revoked' WHERE tenant_id=?1 AND capsule_id=?2 AND status='active'",
            params![tenant_id, capsule_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Flips every capsule whose `expires_at <= now_ts` and is still
    /// `active` to `expired`. Returns the count updated.
    pub fn expire_capsules(&self, now_ts: i64) -> Result<usize, StorageError> {
        let changed = self.conn.execute(
            "UPDATE capsules SET status='expired' WHERE status='active' AND expires_at <= ?1",
            params![now_ts],
        )?;
        Ok(changed)
    }

    fn row_to_capsule(row: &Row) -> rusqlite::Result<Capsule> {
        let scope: String = row.get("scope")?;
        let audience: String = row.get("audience_agent_ids")?;
        let items: String = row.get("items")?;
        let risks: String = row.get("risks")?;
        let status: String = row.get("status")?;
        Ok(Capsule {
            capsule_id: row.get("capsule_id")?,
            tenant_id: row.get("tenant_id")?,
            ts: row.get("ts")?,
            scope: scope.parse().map_err(to_sqlite_err)?,
            subject_type: row.get("subject_type")?,
            subject_id: row.get("subject_id")?,
            project_id: row.get("project_id")?,
            author_agent_id: row.get("author_agent_id")?,
            audience_agent_ids: serde_json::from_str(&audience).map_err(to_sqlite_json_err)?,
            items: serde_json::from_str::<CapsuleItems>(&items).map_err(to_sqlite_json_err)?,
            risks: serde_json::from_str(&risks).map_err(to_sqlite_json_err)?,
            ttl_days: row.get("ttl_days")?,
            status: status.parse().map_err(to_sqlite_err)?,
            expires_at: row.get("expires_at")?,
        })
    }

    // ---------------------------------------------------------------
    // Handoffs
    // ---------------------------------------------------------------

    pub fn insert_handoff(&self, handoff: &amc_core::Handoff) -> Result<(), StorageError> {
        Self::guard_tenant(&handoff.tenant_id);
        self.conn.execute(
            "INSERT INTO handoffs
                (handoff_id, tenant_id, with_whom, session_id, ts, experienced, noticed, learned,
                 story, becoming, remember, significance, tags, compression_level, influenced_by)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                handoff.handoff_id,
                handoff.tenant_id,
                handoff.with_whom,
                handoff.session_id,
                handoff.ts,
                handoff.experienced,
                handoff.noticed,
                handoff.learned,
                handoff.story,
                handoff.becoming,
                handoff.remember,
                handoff.significance,
                to_json(&handoff.tags)?,
                handoff.compression_level.as_str(),
                handoff.influenced_by,
            ],
        )?;
        let text = format!(
            "{} {} {} {} {} {}",
            handoff.experienced, handoff.noticed, handoff.learned, handoff.story, handoff.becoming, handoff.remember
        );
        self.conn.execute(
            "INSERT INTO handoffs_fts (handoff_id, tenant_id, with_whom, text) VALUES (?1,?2,?3,?4)",
            params![handoff.handoff_id, handoff.tenant_id, handoff.with_whom, text],
        )?;
        Ok(())
    }

    pub fn last_handoff(&self, tenant_id: &str, with_whom: &str) -> Result<Option<amc_core::Handoff>, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM handoffs WHERE tenant_id=?1 AND with_whom=?2 ORDER BY ts DESC LIMIT 1",
                params![tenant_id, with_whom],
                Self::row_to_handoff,
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn recent_handoffs(&self, tenant_id: &str, with_whom: &str, count: u32) -> Result<Vec<amc_core::Handoff>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM handoffs WHERE tenant_id=?1 AND with_whom=?2 ORDER BY ts DESC LIMIT ?3")?;
        let rows = stmt.query_map(params![tenant_id, with_whom, count], Self::row_to_handoff)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Handoffs beyond the recent window matching `topic` via FTS over
    /// `(experienced, noticed, becoming)` — never a substring LIKE.
    pub fn progressive_handoffs(
        &self,
        tenant_id: &str,
        with_whom: &str,
        topic: &str,
        exclude_ids: &[String],
        limit: u32,
    ) -> Result<Vec<amc_core::Handoff>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self.conn.prepare(
            "SELECT h.* FROM handoffs h
             JOIN handoffs_fts f ON f.handoff_id = h.handoff_id AND f.tenant_id = h.tenant_id
             WHERE h.tenant_id=?1 AND h.with_whom=?2 AND f.text MATCH ?3
             ORDER BY h.ts DESC LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![tenant_id, with_whom, topic, limit], Self::row_to_handoff)?;
        let all = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(all
            .into_iter()
            .filter(|h| !exclude_ids.contains(&h.handoff_id))
            .collect())
    }

    pub fn unconsolidated_handoffs(&self, tenant_id: &str, with_whom: &str) -> Result<Vec<amc_core::Handoff>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM handoffs WHERE tenant_id=?1 AND with_whom=?2 AND consolidated=0 ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map(params![tenant_id, with_whom], Self::row_to_handoff)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    pub fn mark_handoffs_consolidated(&self, tenant_id: &str, handoff_ids: &[String]) -> Result<(), StorageError> {
        Self::guard_tenant(tenant_id);
        for handoff_id in handoff_ids {
            self.conn.execute(
                "UPDATE handoffs SET consolidated=1 WHERE tenant_id=?1 AND handoff_id=?2",
                params![tenant_id, handoff_id],
            )?;
        }
        Ok(())
    }

    pub fn distinct_with_whom(&self, tenant_id: &str) -> Result<Vec<String>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT with_whom FROM handoffs WHERE tenant_id=?1")?;
        let rows = stmt.query_map(params![tenant_id], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Every tenant with at least one handoff on record. There is no
    /// separate tenant registry table; the background worker uses this to
    /// discover which tenants need a metadata/reflection sweep.
    pub fn distinct_handoff_tenants(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT tenant_id FROM handoffs")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// `INSERT ... ON CONFLICT UPDATE` refresh of one aggregate row,
    /// avoiding long exclusive locks across tenants (§5).
    pub fn upsert_handoff_metadata(&self, tenant_id: &str, with_whom: &str, metadata: &amc_core::HandoffMetadata) -> Result<(), StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn.execute(
            "INSERT INTO handoff_metadata
                (tenant_id, with_whom, session_count, first_session, last_session,
                 significance_avg, key_people, all_tags, high_significance_count)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT (tenant_id, with_whom) DO UPDATE SET
                session_count=excluded.session_count,
                first_session=excluded.first_session,
                last_session=excluded.last_session,
                significance_avg=excluded.significance_avg,
                key_people=excluded.key_people,
                all_tags=excluded.all_tags,
                high_significance_count=excluded.high_significance_count",
            params![
                tenant_id,
                with_whom,
                metadata.session_count,
                metadata.first_session,
                metadata.last_session,
                metadata.significance_avg,
                to_json(&metadata.key_people)?,
                to_json(&metadata.all_tags)?,
                metadata.high_significance_count,
            ],
        )?;
        Ok(())
    }

    pub fn handoff_metadata(&self, tenant_id: &str, with_whom: &str) -> Result<Option<amc_core::HandoffMetadata>, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM handoff_metadata WHERE tenant_id=?1 AND with_whom=?2",
                params![tenant_id, with_whom],
                |row| {
                    let key_people: String = row.get("key_people")?;
                    let all_tags: String = row.get("all_tags")?;
                    Ok(amc_core::HandoffMetadata {
                        session_count: row.get("session_count")?,
                        first_session: row.get("first_session")?,
                        last_session: row.get("last_session")?,
                        significance_avg: row.get("significance_avg")?,
                        key_people: serde_json::from_str(&key_people).map_err(to_sqlite_json_err)?,
                        all_tags: serde_json::from_str(&all_tags).map_err(to_sqlite_json_err)?,
                        high_significance_count: row.get("high_significance_count")?,
                    })
                },
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn upsert_reflection(&self, tenant_id: &str, with_whom: &str, insights: &[String], source_handoff_ids: &[String], generated_at: i64) -> Result<(), StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn.execute(
            "INSERT INTO reflections (tenant_id, with_whom, insights, source_handoff_ids, generated_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT (tenant_id, with_whom) DO UPDATE SET
                insights=excluded.insights, source_handoff_ids=excluded.source_handoff_ids,
                generated_at=excluded.generated_at",
            params![tenant_id, with_whom, to_json(insights)?, to_json(source_handoff_ids)?, generated_at],
        )?;
        Ok(())
    }

    pub fn reflection(&self, tenant_id: &str, with_whom: &str) -> Result<Option<amc_core::Reflection>, StorageError> {
        Self::guard_tenant(tenant_id);
        self.conn
            .query_row(
                "SELECT * FROM reflections WHERE tenant_id=?1 AND with_whom=?2",
                params![tenant_id, with_whom],
                |row| {
                    let insights: String = row.get("insights")?;
                    let source_ids: String = row.get("source_handoff_ids")?;
                    Ok(amc_core::Reflection {
                        available: true,
                        reason: None,
                        insights: serde_json::from_str(&insights).map_err(to_sqlite_json_err)?,
                        source_handoff_ids: serde_json::from_str(&source_ids).map_err(to_sqlite_json_err)?,
                        generated_at: Some(row.get("generated_at")?),
                    })
                },
            )
            .optional()
            .map_err(StorageError::from)
    }

    fn row_to_handoff(row: &Row) -> rusqlite::Result<amc_core::Handoff> {
        let tags: String = row.get("tags")?;
        let compression_level: String = row.get("compression_level")?;
        Ok(amc_core::Handoff {
            handoff_id: row.get("handoff_id")?,
            tenant_id: row.get("tenant_id")?,
            with_whom: row.get("with_whom")?,
            session_id: row.get("session_id")?,
            ts: row.get("ts")?,
            experienced: row.get("experienced")?,
            noticed: row.get("noticed")?,
            learned: row.get("learned")?,
            story: row.get("story")?,
            becoming: row.get("becoming")?,
            remember: row.get("remember")?,
            significance: row.get("significance")?,
            tags: serde_json::from_str(&tags).map_err(to_sqlite_json_err)?,
            compression_level: compression_level.parse().map_err(to_sqlite_err)?,
            influenced_by: row.get("influenced_by")?,
        })
    }

    // ---------------------------------------------------------------
    // Audit log
    // ---------------------------------------------------------------

    pub fn insert_audit_log(&self, entry: &AuditLogEntry) -> Result<(), StorageError> {
        Self::guard_tenant(&entry.tenant_id);
        self.conn.execute(
            "INSERT INTO audit_log (audit_id, tenant_id, actor_id, op, target, outcome, ts, ip, metadata)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                entry.audit_id,
                entry.tenant_id,
                entry.actor_id,
                entry.op,
                entry.target,
                entry.outcome.as_str(),
                entry.ts,
                entry.ip,
                to_json(&entry.metadata)?,
            ],
        )?;
        Ok(())
    }

    pub fn audit_log_for_target(&self, tenant_id: &str, target: &str, limit: u32) -> Result<Vec<AuditLogEntry>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM audit_log WHERE tenant_id=?1 AND target=?2 ORDER BY ts DESC LIMIT ?3")?;
        let rows = stmt.query_map(params![tenant_id, target, limit], Self::row_to_audit)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    pub fn audit_log_recent(&self, tenant_id: &str, limit: u32) -> Result<Vec<AuditLogEntry>, StorageError> {
        Self::guard_tenant(tenant_id);
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM audit_log WHERE tenant_id=?1 ORDER BY ts DESC LIMIT ?2")?;
        let rows = stmt.query_map(params![tenant_id, limit], Self::row_to_audit)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Deletes audit rows older than the retention window; used by C10.
    pub fn purge_audit_log_before(&self, cutoff_ts: i64) -> Result<usize, StorageError> {
        Ok(self
            .conn
            .execute("DELETE FROM audit_log WHERE ts < ?1", params![cutoff_ts])?)
    }

    fn row_to_audit(row: &Row) -> rusqlite::Result<AuditLogEntry> {
        let outcome: String = row.get("outcome")?;
        let metadata: String = row.get("metadata")?;
        Ok(AuditLogEntry {
            audit_id: row.get("audit_id")?,
            tenant_id: row.get("tenant_id")?,
            actor_id: row.get("actor_id")?,
            op: row.get("op")?,
            target: row.get("target")?,
            outcome: match outcome.as_str() {
                "success" => AuditOutcome::Success,
                _ => AuditOutcome::Failure,
            },
            ts: row.get("ts")?,
            ip: row.get("ip")?,
            metadata: serde_json::from_str::<Value>(&metadata).map_err(to_sqlite_json_err)?,
        })
    }

    // ---------------------------------------------------------------
    // Consolidation bookkeeping
    // ---------------------------------------------------------------

    pub fn start_consolidation_job(&self, job_id: &str, kind: &str, started_at: i64) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO consolidation_jobs (job_id, started_at, kind, status) VALUES (?1,?2,?3,'running')",
            params![job_id, started_at, kind],
        )?;
        Ok(())
    }

    pub fn finish_consolidation_job(&self, job_id: &str, finished_at: i64, processed_count: u32, error: Option<&str>) -> Result<(), StorageError> {
        let status = if error.is_some() { "failed" } else { "succeeded" };
        self.conn.execute(
            "UPDATE consolidation_jobs SET finished_at=?1, processed_count=?2, status=?3, error=?4 WHERE job_id=?5",
            params![finished_at, processed_count, status, error, job_id],
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Misc
    // ---------------------------------------------------------------

    /// Runs `op` inside a single SQLite transaction; used by the Recorder
    /// to make event insert + chunk insert + audit log write atomic.
    pub fn transaction<T>(&self, op: impl FnOnce(&Connection) -> Result<T, StorageError>) -> Result<T, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let result = op(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Escape hatch for callers that need to issue raw SQL within an
    /// existing transaction-scoped connection (used by amc-ingest's
    /// combined event+chunk write).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn to_sqlite_err<E: std::fmt::Display>(err: E) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(0, err.to_string(), rusqlite::types::Type::Text)
}

fn to_sqlite_json_err(err: serde_json::Error) -> rusqlite::Error {
    to_sqlite_err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::ActorRef;

    fn sample_event(tenant: &str, session: &str) -> Event {
        Event {
            event_id: amc_core::ids::new_event_id(),
            tenant_id: tenant.to_string(),
            session_id: session.to_string(),
            ts: 1000,
            channel: Channel::Private,
            actor: ActorRef::human("u1"),
            kind: EventKind::Message,
            sensitivity: Sensitivity::None,
            tags: vec![],
            content: serde_json::json!({"text": "hello"}),
            refs: vec![],
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
        }
    }

    #[test]
    fn insert_and_get_event_round_trips() {
        let store = Store::open_in_memory().expect("open");
        let event = sample_event("t1", "s1");
        assert!(store.insert_event(&event, "hash1").expect("insert"));
        let fetched = store.get_event("t1", &event.event_id).expect("get");
        assert_eq!(fetched, event);
    }

    #[test]
    fn tenant_isolation_on_get_event() {
        let store = Store::open_in_memory().expect("open");
        let event = sample_event("t1", "s1");
        store.insert_event(&event, "hash1").expect("insert");
        let result = store.get_event("t2", &event.event_id);
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[test]
    fn duplicate_event_hash_is_idempotent() {
        let store = Store::open_in_memory().expect("open");
        let event = sample_event("t1", "s1");
        assert!(store.insert_event(&event, "hash1").expect("first insert"));
        let mut duplicate = event.clone();
        duplicate.event_id = amc_core::ids::new_event_id();
        assert!(!store.insert_event(&duplicate, "hash1").expect("duplicate insert"));
    }

    #[test]
    fn supersede_decision_flips_predecessor_and_requires_active() {
        let store = Store::open_in_memory().expect("open");
        let predecessor = Decision {
            decision_id: "d1".to_string(),
            tenant_id: "t1".to_string(),
            ts: 1,
            status: DecisionStatus::Active,
            scope: Scope::Global,
            decision: "Never store secrets".to_string(),
            rationale: vec![],
            constraints: vec![],
            alternatives: vec![],
            consequences: vec![],
            refs: vec![],
            subject_type: None,
            subject_id: None,
            project_id: None,
        };
        store.insert_decision(&predecessor).expect("insert predecessor");
        let successor = Decision {
            decision_id: "d2".to_string(),
            refs: vec!["d1".to_string()],
            ts: 2,
            decision: "Store secrets encrypted".to_string(),
            ..predecessor.clone()
        };
        store
            .supersede_decision("t1", "d1", &successor)
            .expect("supersede");
        let refreshed = store.get_decision("t1", "d1").expect("get predecessor");
        assert_eq!(refreshed.status, DecisionStatus::Superseded);
        let active = store.active_decisions("t1", None, None).expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].decision_id, "d2");

        let retry = store.supersede_decision("t1", "d1", &successor);
        assert!(matches!(retry, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn task_cycle_is_rejected() {
        let store = Store::open_in_memory().expect("open");
        let mut a = amc_core::Task {
            task_id: "a".to_string(),
            tenant_id: "t1".to_string(),
            ts: 1,
            title: "A".to_string(),
            details: String::new(),
            status: amc_core::TaskStatus::Open,
            priority: 0,
            progress_percent: 0,
            assignee_id: None,
            refs: vec![],
            blocked_by: vec![],
            blocking: vec![],
            project_refs: vec![],
            start_date: None,
            due_date: None,
        };
        store.insert_task(&a).expect("insert a");
        let mut b = a.clone();
        b.task_id = "b".to_string();
        b.blocked_by = vec!["a".to_string()];
        store.insert_task(&b).expect("insert b");

        a.blocked_by = vec!["b".to_string()];
        let result = store.update_task(
            "t1",
            "a",
            &amc_core::TaskUpdateInput {
                blocked_by: Some(vec!["b".to_string()]),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(StorageError::Integrity(_))));
    }

    #[test]
    fn capsule_visible_only_to_audience() {
        let store = Store::open_in_memory().expect("open");
        let capsule = Capsule {
            capsule_id: "c1".to_string(),
            tenant_id: "t1".to_string(),
            ts: 1,
            scope: Scope::User,
            subject_type: "user".to_string(),
            subject_id: "jack".to_string(),
            project_id: None,
            author_agent_id: "agent_a".to_string(),
            audience_agent_ids: vec!["agent_b".to_string()],
            items: CapsuleItems::default(),
            risks: vec![],
            ttl_days: 7,
            status: CapsuleStatus::Active,
            expires_at: 1_000_000,
        };
        store.insert_capsule(&capsule).expect("insert");
        assert!(store
            .capsules_for_requester("t1", "agent_a", None, 0)
            .expect("query")
            .is_empty());
        let visible = store
            .capsules_for_requester("t1", "agent_b", None, 0)
            .expect("query");
        assert_eq!(visible.len(), 1);
        store.revoke_capsule("t1", "c1").expect("revoke");
        assert!(store
            .capsules_for_requester("t1", "agent_b", None, 0)
            .expect("query")
            .is_empty());
    }
}
