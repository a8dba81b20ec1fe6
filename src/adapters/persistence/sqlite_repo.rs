//! SQLite-backed stores via libsql: users, reply map, invoice sequence, scheduled broadcasts.
//!
//! One database file (desk.db) shared by every relay process pointed at the same data dir.
//! WAL plus a per-connection busy timeout lets several processes write without SQLITE_BUSY errors.

use crate::domain::{
    Audience, BroadcastPayload, DomainError, MessageRef, ScheduledBroadcast, UserRecord,
};
use crate::ports::{BroadcastQueue, InvoiceSequence, MessageMapStore, UserStore};
use libsql::{params, Connection, Database, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    telegram_id INTEGER NOT NULL UNIQUE,
    chat_id INTEGER NOT NULL,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    category TEXT,
    allowed INTEGER NOT NULL DEFAULT 0,
    blocked INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
)"#;

const MSG_MAP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS msg_map (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    src_chat_id INTEGER NOT NULL,
    src_message_id INTEGER NOT NULL,
    user_chat_id INTEGER NOT NULL,
    user_message_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (src_chat_id, src_message_id)
)"#;
const MSG_MAP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_msg_map_user ON msg_map (user_chat_id, user_message_id)";

/// Single-row counter. `next_num` is the number the next reservation returns.
const INVOICE_SEQ_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS invoice_seq (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    next_num INTEGER NOT NULL
)"#;

const SCHEDULED_BROADCASTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_broadcasts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    due_at INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    sent_at INTEGER
)"#;

const BUSY_TIMEOUT_MS: u32 = 5000;

fn repo_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::Repo(e.to_string())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// PRAGMA returns a row (new value); use query and consume rows (execute fails when rows are returned).
async fn run_pragma(conn: &Connection, pragma: &str) -> Result<(), DomainError> {
    let mut rows = conn
        .query(pragma, ())
        .await
        .map_err(|e| DomainError::Repo(format!("{} failed: {}", pragma, e)))?;
    while rows.next().await.map_err(repo_err)?.is_some() {}
    Ok(())
}

pub struct SqliteRepo {
    db: Database,
    db_path: PathBuf,
}

impl SqliteRepo {
    /// Connect to (or create) `desk.db` in `base_dir` and ensure the schema exists.
    /// `invoice_start` seeds the invoice counter only when the row does not exist yet.
    pub async fn connect(base_dir: impl AsRef<Path>, invoice_start: i64) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(repo_err)?;
        let db_path = base.join("desk.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(repo_err)?;

        let repo = Self {
            db,
            db_path: db_path.clone(),
        };
        let conn = repo.conn().await?;
        run_pragma(&conn, "PRAGMA journal_mode=WAL").await?;
        run_pragma(&conn, "PRAGMA synchronous=NORMAL").await?;

        for ddl in [
            USERS_TABLE,
            MSG_MAP_TABLE,
            MSG_MAP_INDEX,
            INVOICE_SEQ_TABLE,
            SCHEDULED_BROADCASTS_TABLE,
        ] {
            conn.execute(ddl, ()).await.map_err(repo_err)?;
        }
        conn.execute(
            "INSERT OR IGNORE INTO invoice_seq (id, next_num) VALUES (1, ?1)",
            params![invoice_start],
        )
        .await
        .map_err(repo_err)?;

        info!(path = %db_path.display(), "SQLite connected with WAL mode");
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// New connection with the busy timeout applied (the pragma is per connection).
    async fn conn(&self) -> Result<Connection, DomainError> {
        let conn = self.db.connect().map_err(repo_err)?;
        run_pragma(&conn, &format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS)).await?;
        Ok(conn)
    }

    async fn query_flag(&self, sql: &str, user_id: i64) -> Result<bool, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn.query(sql, params![user_id]).await.map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(repo_err)? != 0),
            None => Ok(false),
        }
    }

    async fn query_chat_ids(&self, sql: &str) -> Result<Vec<i64>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn.query(sql, ()).await.map_err(repo_err)?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            ids.push(row.get::<i64>(0).map_err(repo_err)?);
        }
        Ok(ids)
    }

    async fn query_optional_chat(
        &self,
        sql: &str,
        param: libsql::Value,
    ) -> Result<Option<i64>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn.query(sql, vec![param]).await.map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(row.get::<i64>(0).map_err(repo_err)?)),
            None => Ok(None),
        }
    }

    /// Fallback for SQLite builds without RETURNING: read and bump inside a write-locked transaction.
    async fn reserve_in_transaction(&self) -> Result<i64, DomainError> {
        let conn = self.conn().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(repo_err)?;
        let mut rows = tx
            .query("SELECT next_num FROM invoice_seq WHERE id = 1", ())
            .await
            .map_err(repo_err)?;
        let current = match rows.next().await.map_err(repo_err)? {
            Some(row) => row.get::<i64>(0).map_err(repo_err)?,
            None => return Err(DomainError::Repo("invoice_seq row missing".into())),
        };
        drop(rows);
        tx.execute(
            "UPDATE invoice_seq SET next_num = ?1 WHERE id = 1",
            params![current + 1],
        )
        .await
        .map_err(repo_err)?;
        tx.commit().await.map_err(repo_err)?;
        Ok(current)
    }
}

#[async_trait::async_trait]
impl MessageMapStore for SqliteRepo {
    async fn record(&self, dest: MessageRef, origin: MessageRef) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO msg_map (src_chat_id, src_message_id, user_chat_id, user_message_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                dest.chat_id,
                dest.message_id,
                origin.chat_id,
                origin.message_id,
                unix_now()
            ],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn lookup_origin(&self, dest: MessageRef) -> Result<Option<MessageRef>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT user_chat_id, user_message_id FROM msg_map
                WHERE src_chat_id = ?1 AND src_message_id = ?2
                LIMIT 1
                "#,
                params![dest.chat_id, dest.message_id],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(MessageRef::new(
                row.get::<i64>(0).map_err(repo_err)?,
                row.get::<i32>(1).map_err(repo_err)?,
            ))),
            None => Ok(None),
        }
    }

    async fn find_destination_chat(
        &self,
        origin: MessageRef,
        candidates: &[i64],
    ) -> Result<Option<i64>, DomainError> {
        let conn = self.conn().await?;
        for &chat in candidates.iter().filter(|&&c| c != 0) {
            let mut rows = conn
                .query(
                    r#"
                    SELECT 1 FROM msg_map
                    WHERE src_chat_id = ?1 AND user_chat_id = ?2 AND user_message_id = ?3
                    LIMIT 1
                    "#,
                    params![chat, origin.chat_id, origin.message_id],
                )
                .await
                .map_err(repo_err)?;
            if rows.next().await.map_err(repo_err)?.is_some() {
                return Ok(Some(chat));
            }
        }
        Ok(None)
    }

    async fn find_destination_message(
        &self,
        dest_chat: i64,
        origin: MessageRef,
    ) -> Result<Option<i32>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT MAX(src_message_id) FROM msg_map
                WHERE src_chat_id = ?1 AND user_chat_id = ?2 AND user_message_id = ?3
                "#,
                params![dest_chat, origin.chat_id, origin.message_id],
            )
            .await
            .map_err(repo_err)?;
        // MAX over no rows yields a single NULL row.
        Ok(rows
            .next()
            .await
            .map_err(repo_err)?
            .and_then(|row| row.get::<i32>(0).ok()))
    }
}

#[async_trait::async_trait]
impl UserStore for SqliteRepo {
    async fn upsert(&self, user: &UserRecord) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO users (telegram_id, chat_id, username, first_name, last_name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (telegram_id) DO UPDATE SET
                chat_id = excluded.chat_id,
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name
            "#,
            params![
                user.user_id,
                user.chat_id,
                user.username.clone(),
                user.first_name.clone(),
                user.last_name.clone(),
                unix_now()
            ],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn category(&self, user_id: i64) -> Result<Option<String>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT category FROM users WHERE telegram_id = ?1",
                params![user_id],
            )
            .await
            .map_err(repo_err)?;
        Ok(rows
            .next()
            .await
            .map_err(repo_err)?
            .and_then(|row| row.get::<String>(0).ok())
            .filter(|c| !c.trim().is_empty()))
    }

    async fn set_category(&self, user_id: i64, category: &str) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE users SET category = ?1 WHERE telegram_id = ?2",
            params![category, user_id],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn is_allowed(&self, user_id: i64) -> Result<bool, DomainError> {
        self.query_flag("SELECT allowed FROM users WHERE telegram_id = ?1", user_id)
            .await
    }

    async fn set_allowed(&self, user_id: i64, allowed: bool) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE users SET allowed = ?1 WHERE telegram_id = ?2",
            params![allowed as i64, user_id],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn is_blocked(&self, user_id: i64) -> Result<bool, DomainError> {
        self.query_flag("SELECT blocked FROM users WHERE telegram_id = ?1", user_id)
            .await
    }

    async fn set_blocked(&self, user_id: i64, blocked: bool) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE users SET blocked = ?1 WHERE telegram_id = ?2",
            params![blocked as i64, user_id],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }

    async fn list_chats(&self, audience: Audience) -> Result<Vec<i64>, DomainError> {
        let sql = match audience {
            Audience::All => "SELECT chat_id FROM users",
            Audience::Allowed => "SELECT chat_id FROM users WHERE allowed = 1",
            Audience::Eligible => "SELECT chat_id FROM users WHERE allowed = 1 AND blocked = 0",
        };
        self.query_chat_ids(sql).await
    }

    async fn find_eligible_chat_by_username(
        &self,
        username: &str,
    ) -> Result<Option<i64>, DomainError> {
        let name = username.trim().trim_start_matches('@').to_lowercase();
        if name.is_empty() {
            return Ok(None);
        }
        self.query_optional_chat(
            r#"
            SELECT chat_id FROM users
            WHERE lower(username) = ?1 AND allowed = 1 AND blocked = 0
            LIMIT 1
            "#,
            libsql::Value::Text(name),
        )
        .await
    }

    async fn find_eligible_chat_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Option<i64>, DomainError> {
        self.query_optional_chat(
            "SELECT chat_id FROM users WHERE telegram_id = ?1 AND allowed = 1 AND blocked = 0",
            libsql::Value::Integer(user_id),
        )
        .await
    }
}

#[async_trait::async_trait]
impl InvoiceSequence for SqliteRepo {
    async fn reserve(&self) -> Result<i64, DomainError> {
        let conn = self.conn().await?;
        let attempt = conn
            .query(
                "UPDATE invoice_seq SET next_num = next_num + 1 WHERE id = 1 RETURNING next_num - 1",
                (),
            )
            .await;
        let mut rows = match attempt {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "RETURNING reservation failed; using transaction fallback");
                return self.reserve_in_transaction().await;
            }
        };
        match rows.next().await.map_err(repo_err)? {
            Some(row) => row.get::<i64>(0).map_err(repo_err),
            None => Err(DomainError::Repo("invoice_seq row missing".into())),
        }
    }
}

#[async_trait::async_trait]
impl BroadcastQueue for SqliteRepo {
    async fn schedule(&self, due_at: i64, payload: &BroadcastPayload) -> Result<i64, DomainError> {
        let json = serde_json::to_string(payload).map_err(repo_err)?;
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO scheduled_broadcasts (due_at, payload_json, created_at) VALUES (?1, ?2, ?3)",
            params![due_at, json, unix_now()],
        )
        .await
        .map_err(repo_err)?;
        Ok(conn.last_insert_rowid())
    }

    async fn claim_due(&self, now: i64) -> Result<Vec<ScheduledBroadcast>, DomainError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                UPDATE scheduled_broadcasts SET sent_at = ?1
                WHERE sent_at IS NULL AND due_at <= ?1
                RETURNING id, due_at, payload_json
                "#,
                params![now],
            )
            .await
            .map_err(repo_err)?;
        let mut claimed = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            let id: i64 = row.get(0).map_err(repo_err)?;
            let due_at: i64 = row.get(1).map_err(repo_err)?;
            let json: String = row.get(2).map_err(repo_err)?;
            match serde_json::from_str::<BroadcastPayload>(&json) {
                Ok(payload) => claimed.push(ScheduledBroadcast {
                    id,
                    due_at,
                    payload,
                }),
                Err(e) => warn!(id, error = %e, "dropping scheduled broadcast with bad payload"),
            }
        }
        claimed.sort_by_key(|b| (b.due_at, b.id));
        Ok(claimed)
    }

    async fn release(&self, id: i64) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE scheduled_broadcasts SET sent_at = NULL WHERE id = ?1",
            params![id],
        )
        .await
        .map_err(repo_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    async fn repo(dir: &tempfile::TempDir) -> SqliteRepo {
        SqliteRepo::connect(dir.path(), 1).await.unwrap()
    }

    fn user(id: i64, username: &str) -> UserRecord {
        UserRecord {
            user_id: id,
            chat_id: id * 10,
            username: Some(username.to_string()),
            first_name: None,
            last_name: None,
        }
    }

    #[tokio::test]
    async fn test_mapping_first_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let dest = MessageRef::new(-100, 5);
        repo.record(dest, MessageRef::new(1, 10)).await.unwrap();
        repo.record(dest, MessageRef::new(2, 20)).await.unwrap();
        assert_eq!(
            repo.lookup_origin(dest).await.unwrap(),
            Some(MessageRef::new(1, 10))
        );
        assert_eq!(repo.lookup_origin(MessageRef::new(-100, 6)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destination_lookup_prefers_candidate_order_and_max_id() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let origin = MessageRef::new(1, 10);
        repo.record(MessageRef::new(-200, 3), origin).await.unwrap();
        repo.record(MessageRef::new(-200, 4), origin).await.unwrap();
        repo.record(MessageRef::new(-300, 9), origin).await.unwrap();

        assert_eq!(
            repo.find_destination_chat(origin, &[0, -300, -200]).await.unwrap(),
            Some(-300)
        );
        assert_eq!(
            repo.find_destination_chat(origin, &[-200, -300]).await.unwrap(),
            Some(-200)
        );
        assert_eq!(
            repo.find_destination_chat(origin, &[-400]).await.unwrap(),
            None
        );
        assert_eq!(
            repo.find_destination_message(-200, origin).await.unwrap(),
            Some(4)
        );
        assert_eq!(
            repo.find_destination_message(-400, origin).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_concurrent_reservations_are_unique_and_gap_free() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SqliteRepo::connect(dir.path(), 100).await.unwrap());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let r = Arc::clone(&repo);
            handles.push(tokio::spawn(async move { r.reserve().await.unwrap() }));
        }
        let mut got = HashSet::new();
        for h in handles {
            assert!(got.insert(h.await.unwrap()));
        }
        let expected: HashSet<i64> = (100..120).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_reservations_shared_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let a = SqliteRepo::connect(dir.path(), 1).await.unwrap();
        let b = SqliteRepo::connect(dir.path(), 500).await.unwrap();
        assert_eq!(a.reserve().await.unwrap(), 1);
        assert_eq!(b.reserve().await.unwrap(), 2);
        assert_eq!(a.reserve().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_transaction_fallback_continues_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        assert_eq!(repo.reserve().await.unwrap(), 1);
        assert_eq!(repo.reserve_in_transaction().await.unwrap(), 2);
        assert_eq!(repo.reserve().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_user_flags_and_audiences() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        repo.upsert(&user(1, "Alice")).await.unwrap();
        repo.upsert(&user(2, "bob")).await.unwrap();
        repo.upsert(&user(3, "carol")).await.unwrap();
        assert!(!repo.is_allowed(1).await.unwrap());
        assert!(!repo.is_allowed(99).await.unwrap());

        repo.set_allowed(1, true).await.unwrap();
        repo.set_allowed(2, true).await.unwrap();
        repo.set_blocked(2, true).await.unwrap();

        // Upsert refreshes names but keeps flags.
        repo.upsert(&user(1, "Alice")).await.unwrap();
        assert!(repo.is_allowed(1).await.unwrap());
        assert!(repo.is_blocked(2).await.unwrap());

        let mut all = repo.list_chats(Audience::All).await.unwrap();
        all.sort();
        assert_eq!(all, vec![10, 20, 30]);
        let mut allowed = repo.list_chats(Audience::Allowed).await.unwrap();
        allowed.sort();
        assert_eq!(allowed, vec![10, 20]);
        assert_eq!(repo.list_chats(Audience::Eligible).await.unwrap(), vec![10]);

        assert_eq!(
            repo.find_eligible_chat_by_username("@alice").await.unwrap(),
            Some(10)
        );
        assert_eq!(repo.find_eligible_chat_by_username("bob").await.unwrap(), None);
        assert_eq!(repo.find_eligible_chat_by_user_id(1).await.unwrap(), Some(10));
        assert_eq!(repo.find_eligible_chat_by_user_id(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_category_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        repo.upsert(&user(1, "alice")).await.unwrap();
        assert_eq!(repo.category(1).await.unwrap(), None);
        repo.set_category(1, "Компания 2").await.unwrap();
        assert_eq!(repo.category(1).await.unwrap().as_deref(), Some("Компания 2"));
    }

    #[tokio::test]
    async fn test_scheduled_broadcast_claimed_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let payload = BroadcastPayload {
            text: "hi".into(),
            ..Default::default()
        };
        repo.schedule(1_000, &payload).await.unwrap();
        repo.schedule(5_000, &payload).await.unwrap();

        assert!(repo.claim_due(999).await.unwrap().is_empty());
        let first = repo.claim_due(2_000).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].payload, payload);
        assert!(repo.claim_due(2_000).await.unwrap().is_empty());
        assert_eq!(repo.claim_due(6_000).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_released_broadcast_is_claimed_again() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let payload = BroadcastPayload {
            text: "hi".into(),
            ..Default::default()
        };
        let id = repo.schedule(1_000, &payload).await.unwrap();

        let claimed = repo.claim_due(2_000).await.unwrap();
        assert_eq!(claimed[0].id, id);
        repo.release(id).await.unwrap();

        let again = repo.claim_due(3_000).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, id);
        assert!(repo.claim_due(3_000).await.unwrap().is_empty());
    }
}
