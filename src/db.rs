use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// Which side of the conversation a connection (or a message) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "user")]
    Visitor,
    #[serde(alias = "admin")]
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Visitor => "visitor",
            Role::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visitor" | "user" => Ok(Role::Visitor),
            "agent" | "admin" => Ok(Role::Agent),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// A relayed chat line. Immutable once the relay has stamped it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Room id, i.e. the visitor identity the conversation belongs to.
    pub user_id: String,
    pub sender: Role,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Fields collected by the intake form before a room exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intake {
    pub name: String,
    pub number: String,
    pub email: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default, alias = "subService")]
    pub sub_service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    /// Visitor identity; doubles as the chat room id.
    pub id: String,
    #[serde(flatten)]
    pub intake: Intake,
    pub feedback: Option<String>,
    pub final_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
}

/// Partial update issued against the record matching a phone number.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub feedback: Option<String>,
    pub final_message: Option<String>,
}

impl RecordUpdate {
    pub fn feedback(label: impl Into<String>) -> Self {
        Self {
            feedback: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn final_message(text: impl Into<String>) -> Self {
        Self {
            final_message: Some(text.into()),
            ..Self::default()
        }
    }
}

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    Ok(db_pool)
}

/// Single-connection in-memory database; every pooled connection would
/// otherwise see its own empty database.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    Ok(db_pool)
}
