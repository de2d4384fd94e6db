use crate::db::models::{Message, Thread, ThreadSummary};
use crate::db::sqlite::{Storage, now, require_non_empty};
use crate::error::VetdeskError;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

impl Storage {
    pub async fn create_thread(&self, title: &str) -> Result<Thread, VetdeskError> {
        require_non_empty("title", title)?;
        let ts = now();
        let thread = sqlx::query_as::<_, Thread>(
            "INSERT INTO threads (title, created_at, updated_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(title.trim())
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(thread)
    }

    pub async fn get_thread(&self, id: i64) -> Result<Thread, VetdeskError> {
        sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("thread", id))
    }

    /// Threads with the most recent activity first.
    pub async fn list_thread_summaries(&self) -> Result<Vec<ThreadSummary>, VetdeskError> {
        let rows = sqlx::query(
            r#"SELECT t.id, t.title, t.created_at, t.updated_at,
                   (SELECT COUNT(*) FROM messages c WHERE c.thread_id = t.id) AS message_count,
                   m.id AS last_id, m.sender AS last_sender, m.body AS last_body,
                   m.created_at AS last_created_at
               FROM threads t
               LEFT JOIN messages m
                 ON m.id = (SELECT MAX(id) FROM messages WHERE thread_id = t.id)
               ORDER BY t.updated_at DESC, t.id DESC"#,
        )
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Self::row_to_summary).collect()
    }

    /// Append a message and bump the thread's `updated_at`.
    pub async fn create_message(
        &self,
        thread_id: i64,
        sender: &str,
        body: &str,
    ) -> Result<Message, VetdeskError> {
        require_non_empty("sender", sender)?;
        require_non_empty("body", body)?;
        let ts = now();
        let mut tx = self.pool().begin().await?;

        let touched = sqlx::query("UPDATE threads SET updated_at = ? WHERE id = ?")
            .bind(ts)
            .bind(thread_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if touched == 0 {
            return Err(VetdeskError::not_found("thread", thread_id));
        }
        let message = sqlx::query_as::<_, Message>(
            r#"INSERT INTO messages (thread_id, sender, body, created_at)
               VALUES (?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(thread_id)
        .bind(sender.trim())
        .bind(body)
        .bind(ts)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// The latest `limit` messages of a thread, oldest first.
    pub async fn list_messages(
        &self,
        thread_id: i64,
        limit: i64,
    ) -> Result<Vec<Message>, VetdeskError> {
        self.ensure_exists("threads", "thread", thread_id).await?;
        let rows = sqlx::query_as::<_, Message>(
            r#"SELECT * FROM (
                   SELECT * FROM messages WHERE thread_id = ? ORDER BY id DESC LIMIT ?
               ) ORDER BY id ASC"#,
        )
        .bind(thread_id)
        .bind(limit.max(1))
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Delete a thread and its messages. Returns the number of messages removed.
    pub async fn delete_thread(&self, id: i64) -> Result<u64, VetdeskError> {
        let mut tx = self.pool().begin().await?;
        let messages = sqlx::query("DELETE FROM messages WHERE thread_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let removed = sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("thread", id));
        }
        tx.commit().await?;
        Ok(messages)
    }

    fn row_to_summary(row: SqliteRow) -> Result<ThreadSummary, VetdeskError> {
        let id: i64 = row.try_get("id")?;
        let last_id: Option<i64> = row.try_get("last_id")?;
        let last_message = match last_id {
            Some(last_id) => Some(Message {
                id: last_id,
                thread_id: id,
                sender: row.try_get("last_sender")?,
                body: row.try_get("last_body")?,
                created_at: row.try_get::<DateTime<Utc>, _>("last_created_at")?,
            }),
            None => None,
        };
        Ok(ThreadSummary {
            thread: Thread {
                id,
                title: row.try_get("title")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
            message_count: row.try_get("message_count")?,
            last_message,
        })
    }
}
