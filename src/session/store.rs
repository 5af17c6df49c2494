//! Session records persisted in the application database.
//!
//! Records are JSON-encoded into the `sessions` table. Loads ignore rows past
//! their expiry; [`sweep_expired`] deletes them in the background.

use crate::entities::session_record::{self, Entity as SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use std::{sync::Arc, time::Duration};
use tower_sessions::{
    session::{Id, Record},
    session_store::{self, ExpiredDeletion, SessionStore},
};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct DatabaseSessionStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseSessionStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn id_exists(&self, id: &Id) -> session_store::Result<bool> {
        let rows = SessionRecord::find_by_id(id.to_string())
            .count(&*self.db)
            .await
            .map_err(backend)?;
        Ok(rows > 0)
    }
}

fn backend(err: DbErr) -> session_store::Error {
    session_store::Error::Backend(err.to_string())
}

fn expires_at(record: &Record) -> DateTime<Utc> {
    DateTime::from_timestamp(record.expiry_date.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

#[async_trait]
impl SessionStore for DatabaseSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        while self.id_exists(&record.id).await? {
            record.id = Id::default();
        }
        self.save(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let data = serde_json::to_string(record)
            .map_err(|e| session_store::Error::Encode(e.to_string()))?;
        let row = session_record::ActiveModel {
            id: Set(record.id.to_string()),
            data: Set(data),
            expires_at: Set(expires_at(record)),
        };

        SessionRecord::insert(row)
            .on_conflict(
                OnConflict::column(session_record::Column::Id)
                    .update_columns([
                        session_record::Column::Data,
                        session_record::Column::ExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn load(&self, id: &Id) -> session_store::Result<Option<Record>> {
        let row = SessionRecord::find_by_id(id.to_string())
            .filter(session_record::Column::ExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await
            .map_err(backend)?;

        row.map(|row| {
            serde_json::from_str(&row.data)
                .map_err(|e| session_store::Error::Decode(e.to_string()))
        })
        .transpose()
    }

    async fn delete(&self, id: &Id) -> session_store::Result<()> {
        SessionRecord::delete_by_id(id.to_string())
            .exec(&*self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for DatabaseSessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let result = SessionRecord::delete_many()
            .filter(session_record::Column::ExpiresAt.lte(Utc::now()))
            .exec(&*self.db)
            .await
            .map_err(backend)?;
        if result.rows_affected > 0 {
            debug!(removed = result.rows_affected, "deleted expired sessions");
        }
        Ok(())
    }
}

/// Deletes expired sessions every `period`, forever.
pub async fn sweep_expired<S: ExpiredDeletion>(store: S, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if let Err(e) = store.delete_expired().await {
            warn!(error = %e, "expired session sweep failed");
        }
    }
}
