use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::db::{ChatMessage, Intake, RecordUpdate, SessionRecord};

use super::{ChatStore, StoreError};

type MessageRow = (String, String, String, String, String);

type RecordRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
);

const RECORD_COLUMNS: &str = "id,name,number,email,organization,service,sub_service,feedback,final_message,created_at,modified_at";

#[derive(Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Returns whether a row matched `filter`.
    async fn apply_update(&self, filter: &str, key: &str, update: &RecordUpdate) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE session_records SET feedback=COALESCE(?,feedback), final_message=COALESCE(?,final_message), modified_at=? WHERE {filter}"
        ))
        .bind(&update.feedback)
        .bind(&update.final_message)
        .bind(format_ts(OffsetDateTime::now_utc())?)
        .bind(key)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn format_ts(ts: OffsetDateTime) -> Result<String, StoreError> {
    ts.format(&Rfc3339)
        .map_err(|err| StoreError::Corrupt(format!("unformattable timestamp {ts}: {err}")))
}

fn parse_ts(raw: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|err| StoreError::Corrupt(format!("bad timestamp {raw:?}: {err}")))
}

fn message_from_row((id, room_id, sender, text, created_at): MessageRow) -> Result<ChatMessage, StoreError> {
    Ok(ChatMessage {
        id: Uuid::parse_str(&id).map_err(|err| StoreError::Corrupt(format!("bad message id {id:?}: {err}")))?,
        user_id: room_id,
        sender: sender.parse().map_err(StoreError::Corrupt)?,
        text,
        timestamp: parse_ts(&created_at)?,
    })
}

fn record_from_row(row: RecordRow) -> Result<SessionRecord, StoreError> {
    let (id, name, number, email, organization, service, sub_service, feedback, final_message, created_at, modified_at) = row;

    Ok(SessionRecord {
        id,
        intake: Intake {
            name,
            number,
            email,
            organization,
            service,
            sub_service,
        },
        feedback,
        final_message,
        created_at: parse_ts(&created_at)?,
        modified_at: modified_at.as_deref().map(parse_ts).transpose()?,
    })
}

impl ChatStore for SqliteStore {
    async fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO messages (id,room_id,sender,text,created_at) VALUES (?,?,?,?,?)")
            .bind(message.id.to_string())
            .bind(&message.user_id)
            .bind(message.sender.as_str())
            .bind(&message.text)
            .bind(format_ts(message.timestamp)?)
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    async fn list_messages(&self, room_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        // rowid order is insertion order, which the relay keeps equal to
        // timestamp order within a room.
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,room_id,sender,text,created_at FROM messages WHERE room_id=? ORDER BY rowid",
        )
        .bind(room_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn insert_intake(&self, intake: &Intake) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord {
            id: Uuid::now_v7().to_string(),
            intake: intake.clone(),
            feedback: None,
            final_message: None,
            created_at: OffsetDateTime::now_utc(),
            modified_at: None,
        };

        sqlx::query(
            "INSERT INTO session_records (id,name,number,email,organization,service,sub_service,created_at) VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(&record.id)
        .bind(&intake.name)
        .bind(&intake.number)
        .bind(&intake.email)
        .bind(&intake.organization)
        .bind(&intake.service)
        .bind(&intake.sub_service)
        .bind(format_ts(record.created_at)?)
        .execute(&self.db_pool)
        .await?;

        Ok(record)
    }

    async fn find_record(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row: Option<RecordRow> =
            sqlx::query_as(&format!("SELECT {RECORD_COLUMNS} FROM session_records WHERE id=?"))
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        row.map(record_from_row).transpose()
    }

    async fn list_records(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM session_records ORDER BY rowid DESC"
        ))
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        self.apply_update("id=?", id, update)
            .await?
            .then_some(())
            .ok_or_else(|| StoreError::NotFound(format!("record {id}")))
    }

    async fn update_by_number(&self, number: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        self.apply_update(
            "id=(SELECT id FROM session_records WHERE number=? ORDER BY rowid DESC LIMIT 1)",
            number,
            update,
        )
        .await?
        .then_some(())
        .ok_or_else(|| StoreError::NotFound(format!("number {number}")))
    }
}
