//! Conversation log: an in-memory ring of immutable turns, plus an optional
//! SQLite-backed persisted log with async batch writing.
//! Persisted turns are buffered in a channel and flushed every 300ms so the
//! dialogue loop never waits on disk I/O.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub created_at: i64,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: crate::now_unix(),
        }
    }
}

/// Append-only, oldest-evicted ring of turns.
#[derive(Debug)]
pub struct ConversationLog {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Newest `n` turns, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

enum HistoryCommand {
    Append {
        user_id: String,
        turn: ConversationTurn,
    },
    Clear {
        user_id: String,
    },
}

/// Persisted per-user turn log. Best effort: failures are logged, never surfaced
/// to the dialogue.
pub struct HistoryStore {
    tx: mpsc::UnboundedSender<HistoryCommand>,
    read_conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open (or create) the database and spawn the flush loop.
    /// Each user keeps at most `capacity` turns.
    pub fn open(db_path: &Path, capacity: usize) -> Result<Arc<Self>> {
        let read_conn = Connection::open(db_path)?;
        read_conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        read_conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversation (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversation_user
                ON conversation(user_id, id);",
        )?;

        let write_conn = Connection::open(db_path)?;
        write_conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            tx,
            read_conn: Mutex::new(read_conn),
        });

        tokio::spawn(flush_loop(rx, write_conn, capacity.max(1)));
        info!(path = %db_path.display(), capacity, "history store opened");
        Ok(store)
    }

    /// Queue a turn for batch write. Never blocks.
    pub fn record(&self, user_id: &str, turn: ConversationTurn) {
        let cmd = HistoryCommand::Append {
            user_id: user_id.to_string(),
            turn,
        };
        if self.tx.send(cmd).is_err() {
            warn!("history channel closed, turn dropped");
        }
    }

    /// Queue removal of every persisted turn for `user_id`, ordered after pending writes.
    pub fn clear(&self, user_id: &str) {
        let cmd = HistoryCommand::Clear {
            user_id: user_id.to_string(),
        };
        if self.tx.send(cmd).is_err() {
            warn!("history channel closed, clear dropped");
        }
    }

    /// Newest `limit` turns for `user_id`, oldest first.
    pub fn recent(&self, user_id: &str, limit: usize) -> Vec<ConversationTurn> {
        let conn = self.read_conn.lock();
        let mut stmt = match conn.prepare(
            "SELECT role, text, created_at FROM conversation
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "history query prepare failed");
                return Vec::new();
            }
        };

        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                let role: String = row.get(0)?;
                Ok((role, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })
            .ok();

        let mut turns: Vec<ConversationTurn> = match rows {
            Some(iter) => iter
                .filter_map(|r| r.ok())
                .filter_map(|(role, text, created_at)| {
                    Role::parse(&role).map(|role| ConversationTurn {
                        role,
                        text,
                        created_at,
                    })
                })
                .collect(),
            None => Vec::new(),
        };
        turns.reverse();
        turns
    }
}

async fn flush_loop(
    mut rx: mpsc::UnboundedReceiver<HistoryCommand>,
    conn: Connection,
    capacity: usize,
) {
    let flush_interval = Duration::from_millis(300);
    let mut buffer: Vec<HistoryCommand> = Vec::with_capacity(32);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(flush_interval) => {}
            msg = rx.recv() => {
                match msg {
                    Some(cmd) => buffer.push(cmd),
                    None => {
                        if !buffer.is_empty() {
                            flush_batch(&conn, &buffer, capacity);
                        }
                        info!("history flush loop exiting (channel closed)");
                        return;
                    }
                }
            }
        }

        while let Ok(cmd) = rx.try_recv() {
            buffer.push(cmd);
        }

        if !buffer.is_empty() {
            flush_batch(&conn, &buffer, capacity);
            buffer.clear();
        }
    }
}

fn flush_batch(conn: &Connection, commands: &[HistoryCommand], capacity: usize) {
    let start = std::time::Instant::now();

    if let Err(e) = conn.execute_batch("BEGIN TRANSACTION") {
        warn!(error = %e, "history batch begin failed");
        return;
    }

    let mut touched: Vec<&str> = Vec::new();
    for cmd in commands {
        let result = match cmd {
            HistoryCommand::Append { user_id, turn } => {
                if !touched.contains(&user_id.as_str()) {
                    touched.push(user_id);
                }
                conn.execute(
                    "INSERT INTO conversation (user_id, role, text, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, turn.role.as_str(), turn.text, turn.created_at],
                )
            }
            HistoryCommand::Clear { user_id } => conn.execute(
                "DELETE FROM conversation WHERE user_id = ?1",
                params![user_id],
            ),
        };
        if let Err(e) = result {
            warn!(error = %e, "history write failed");
        }
    }

    for user_id in touched {
        if let Err(e) = conn.execute(
            "DELETE FROM conversation WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM conversation WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
            )",
            params![user_id, capacity as i64],
        ) {
            warn!(error = %e, user_id, "history prune failed");
        }
    }

    if let Err(e) = conn.execute_batch("COMMIT") {
        warn!(error = %e, "history batch commit failed");
    } else {
        debug!(
            count = commands.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "history batch flushed"
        );
    }
}
