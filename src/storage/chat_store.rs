use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Timestamps are stored as local wall-clock text so that date prefix
/// matching selects a calendar day.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    image_url TEXT,
    voice_url TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS apps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_name TEXT NOT NULL UNIQUE,
    exe_path TEXT NOT NULL
);
";

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub timestamp: String,
    /// Free text; older rows may carry `gemini` for assistant turns.
    pub role: String,
    pub content: String,
    pub image_url: Option<String>,
    pub voice_url: Option<String>,
}

impl StoredMessage {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

/// Outcome of [`ChatStore::save_note`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteStatus {
    Created,
    Appended,
    /// The exact line is already in that day's note.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RegisteredApp {
    pub app_name: String,
    pub exe_path: String,
}

/// Handle to the portal database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Open (creating if needed) the database at `url`, e.g. `sqlite://chat_history.db`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init().await?;
        tracing::info!(name: "storage.ready", url = %url, "Chat database ready");
        Ok(store)
    }

    /// Private in-memory database, one connection so every query sees it.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Record a message stamped with the current local time.
    ///
    /// Returns `None` without writing when there is neither text nor image.
    pub async fn save_message(
        &self,
        role: Role,
        content: &str,
        image_url: Option<&str>,
        voice_url: Option<&str>,
    ) -> Result<Option<i64>, sqlx::Error> {
        self.save_message_at(role, content, image_url, voice_url, Local::now().naive_local())
            .await
    }

    pub async fn save_message_at(
        &self,
        role: Role,
        content: &str,
        image_url: Option<&str>,
        voice_url: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<Option<i64>, sqlx::Error> {
        if content.is_empty() && image_url.is_none() {
            return Ok(None);
        }
        let result = sqlx::query(
            "INSERT INTO messages (role, content, timestamp, image_url, voice_url) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(role.as_str())
        .bind(content)
        .bind(at.format(TIMESTAMP_FORMAT).to_string())
        .bind(image_url)
        .bind(voice_url)
        .execute(&self.pool)
        .await?;
        Ok(Some(result.last_insert_rowid()))
    }

    pub async fn today_history(&self) -> Result<Vec<StoredMessage>, sqlx::Error> {
        self.history_for(Local::now().date_naive()).await
    }

    /// Messages of one calendar day in insertion order.
    pub async fn history_for(&self, day: NaiveDate) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let prefix = format!("{}%", day.format(DATE_FORMAT));
        sqlx::query_as::<_, StoredMessage>(
            "SELECT id, timestamp, role, content, image_url, voice_url FROM messages \
             WHERE timestamp LIKE ? ORDER BY id ASC",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
    }

    /// Create, append to, or leave alone the note for `date`.
    pub async fn save_note(&self, date: NaiveDate, content: &str) -> Result<NoteStatus, sqlx::Error> {
        let key = date.format(DATE_FORMAT).to_string();
        let content = content.trim();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT content FROM notes WHERE date = ?")
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?;

        let status = match existing {
            None => {
                sqlx::query("INSERT INTO notes (date, content) VALUES (?, ?)")
                    .bind(&key)
                    .bind(content)
                    .execute(&mut *tx)
                    .await?;
                NoteStatus::Created
            }
            Some((current,)) if current.lines().any(|line| line.trim() == content) => {
                NoteStatus::Duplicate
            }
            Some((current,)) => {
                sqlx::query("UPDATE notes SET content = ? WHERE date = ?")
                    .bind(format!("{current}\n{content}"))
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                NoteStatus::Appended
            }
        };

        tx.commit().await?;
        Ok(status)
    }

    pub async fn note(&self, date: NaiveDate) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT content FROM notes WHERE date = ?")
            .bind(date.format(DATE_FORMAT).to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(content,)| content))
    }

    /// Insert or replace the executable path registered under `name`.
    pub async fn register_app(&self, name: &str, exe_path: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO apps (app_name, exe_path) VALUES (?, ?) \
             ON CONFLICT(app_name) DO UPDATE SET exe_path = excluded.exe_path",
        )
        .bind(name)
        .bind(exe_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_app(&self, name: &str) -> Result<Option<RegisteredApp>, sqlx::Error> {
        sqlx::query_as::<_, RegisteredApp>("SELECT app_name, exe_path FROM apps WHERE app_name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }
}
