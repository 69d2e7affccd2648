use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::info;
use mongodb::{
    bson::{doc, Document},
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};

use crate::error::ApiError;
use crate::models::{AssignedComplaint, Complaint, Message, User, UserSummary};
use crate::store::ComplaintStore;

pub const USERS: &str = "users";
pub const COMPLAINTS: &str = "complaints";
pub const ASSIGNMENTS: &str = "assigned_complaint";
pub const MESSAGES: &str = "message";

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Result<Self, mongodb::error::Error> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        Ok(MongoDB { client, db })
    }

    /// Unique keys the documents rely on: one account per email and one
    /// ledger entry per complaint.
    pub async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.assignments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "complaintId": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.messages()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "complaintId": 1, "createdAt": 1 })
                    .build(),
            )
            .await?;
        info!("MongoDB indexes ensured on '{}'", self.db.name());
        Ok(())
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    pub fn complaints(&self) -> Collection<Complaint> {
        self.db.collection(COMPLAINTS)
    }

    pub fn assignments(&self) -> Collection<AssignedComplaint> {
        self.db.collection(ASSIGNMENTS)
    }

    pub fn messages(&self) -> Collection<Message> {
        self.db.collection(MESSAGES)
    }

    /// Contact cards for a set of user ids, for joining into listings.
    pub async fn user_summaries<I>(&self, ids: I) -> Result<HashMap<String, UserSummary>, ApiError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users: Vec<User> = self
            .users()
            .find(doc! { "_id": { "$in": ids } })
            .await?
            .try_collect()
            .await?;
        Ok(users
            .iter()
            .map(|u| (u.id.clone(), UserSummary::from(u)))
            .collect())
    }

    pub async fn find_complaints(&self, filter: Document) -> Result<Vec<Complaint>, ApiError> {
        let complaints = self
            .complaints()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(complaints)
    }
}

#[async_trait]
impl ComplaintStore for MongoDB {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, ApiError> {
        Ok(self.users().find_one(doc! { "_id": user_id }).await?)
    }

    async fn find_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>, ApiError> {
        Ok(self.complaints().find_one(doc! { "_id": complaint_id }).await?)
    }

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), ApiError> {
        self.complaints().insert_one(complaint).await?;
        Ok(())
    }

    async fn replace_complaint(&self, complaint: &Complaint) -> Result<(), ApiError> {
        let res = self
            .complaints()
            .replace_one(doc! { "_id": &complaint.id }, complaint)
            .await?;
        if res.matched_count == 0 {
            return Err(ApiError::not_found("Complaint not found"));
        }
        Ok(())
    }

    async fn find_assignment(
        &self,
        complaint_id: &str,
    ) -> Result<Option<AssignedComplaint>, ApiError> {
        Ok(self
            .assignments()
            .find_one(doc! { "complaintId": complaint_id })
            .await?)
    }

    async fn save_assignment(&self, record: &AssignedComplaint) -> Result<(), ApiError> {
        self.assignments()
            .replace_one(doc! { "complaintId": &record.complaint_id }, record)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete_assignment(&self, complaint_id: &str) -> Result<(), ApiError> {
        self.assignments()
            .delete_one(doc! { "complaintId": complaint_id })
            .await?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), ApiError> {
        self.messages().insert_one(message).await?;
        Ok(())
    }

    async fn list_messages(&self, complaint_id: &str) -> Result<Vec<Message>, ApiError> {
        let thread = self
            .messages()
            .find(doc! { "complaintId": complaint_id })
            .sort(doc! { "createdAt": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(thread)
    }

    async fn mark_read(&self, complaint_id: &str, reader_id: &str) -> Result<u64, ApiError> {
        let res = self
            .messages()
            .update_many(
                unread_by(complaint_id, reader_id),
                doc! { "$set": { "isRead": true } },
            )
            .await?;
        Ok(res.modified_count)
    }

    async fn purge_complaints(&self, complaint_ids: &[String]) -> Result<(), ApiError> {
        if complaint_ids.is_empty() {
            return Ok(());
        }
        let scope = thread_scope(complaint_ids);
        self.assignments().delete_many(scope.clone()).await?;
        self.messages().delete_many(scope).await?;
        self.complaints()
            .delete_many(doc! { "_id": { "$in": complaint_ids } })
            .await?;
        Ok(())
    }
}

/// Unread messages in a thread written by someone other than `reader_id`.
pub fn unread_by(complaint_id: &str, reader_id: &str) -> Document {
    doc! {
        "complaintId": complaint_id,
        "userId": { "$ne": reader_id },
        "isRead": false,
    }
}

/// Ledger entries and messages hanging off the given complaints.
pub fn thread_scope(complaint_ids: &[String]) -> Document {
    doc! { "complaintId": { "$in": complaint_ids } }
}

/// E11000: a unique index rejected the write.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_marking_skips_the_readers_own_messages() {
        assert_eq!(
            unread_by("c1", "u1"),
            doc! { "complaintId": "c1", "userId": { "$ne": "u1" }, "isRead": false }
        );
    }

    #[test]
    fn cascade_scope_covers_every_complaint() {
        let ids = vec!["c1".to_string(), "c2".to_string()];
        assert_eq!(
            thread_scope(&ids),
            doc! { "complaintId": { "$in": ["c1", "c2"] } }
        );
    }
}
