//! Durable persistence behind the relay: the append-only message log and the
//! intake records the relay updates at lifecycle boundaries.

mod sqlite;

use std::future::Future;

use thiserror::Error;

use crate::db::{ChatMessage, Intake, RecordUpdate, SessionRecord};

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("no record matches {0}")]
    NotFound(String),
}

/// Storage seam consumed by the relay engine.
///
/// One call is one write; implementations must not retry on their own, an
/// ambiguous retry could store a message twice.
pub trait ChatStore: Send + Sync + 'static {
    fn append_message(
        &self,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Messages of one room in persisted order (ascending timestamp).
    fn list_messages(
        &self,
        room_id: &str,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;

    fn insert_intake(
        &self,
        intake: &Intake,
    ) -> impl Future<Output = Result<SessionRecord, StoreError>> + Send;

    fn find_record(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send;

    /// All records, most recent first.
    fn list_records(&self) -> impl Future<Output = Result<Vec<SessionRecord>, StoreError>> + Send;

    /// Applies `update` to the record with this id.
    /// Fails with [`StoreError::NotFound`] when there is none.
    fn update_record(
        &self,
        id: &str,
        update: &RecordUpdate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Applies `update` to the newest record with this phone number.
    /// Fails with [`StoreError::NotFound`] when no record has it.
    fn update_by_number(
        &self,
        number: &str,
        update: &RecordUpdate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
