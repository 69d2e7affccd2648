// src/store.rs

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{AssignedComplaint, Complaint, Message, User};

/// The persistence the lifecycle engine needs. Complaints and the
/// assignment ledger are separate documents; nothing here spans both, so
/// the engine owns keeping them in step.
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, ApiError>;

    async fn find_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>, ApiError>;

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), ApiError>;

    /// Whole-document replace keyed by `_id`. Last writer wins.
    async fn replace_complaint(&self, complaint: &Complaint) -> Result<(), ApiError>;

    async fn find_assignment(
        &self,
        complaint_id: &str,
    ) -> Result<Option<AssignedComplaint>, ApiError>;

    /// Upsert keyed by `complaintId`.
    async fn save_assignment(&self, record: &AssignedComplaint) -> Result<(), ApiError>;

    async fn delete_assignment(&self, complaint_id: &str) -> Result<(), ApiError>;

    async fn insert_message(&self, message: &Message) -> Result<(), ApiError>;

    /// A complaint's thread, oldest first.
    async fn list_messages(&self, complaint_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Flags messages in the thread not written by `reader_id` as read.
    /// Returns how many changed.
    async fn mark_read(&self, complaint_id: &str, reader_id: &str) -> Result<u64, ApiError>;

    /// Deletes complaints with their ledger entries and threads.
    async fn purge_complaints(&self, complaint_ids: &[String]) -> Result<(), ApiError>;
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Which write to fail, for exercising the compensation paths.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Fault {
        ReplaceComplaint,
        SaveAssignment,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub users: Mutex<HashMap<String, User>>,
        pub complaints: Mutex<HashMap<String, Complaint>>,
        pub assignments: Mutex<HashMap<String, AssignedComplaint>>,
        pub fault: Mutex<Option<Fault>>,
        pub messages: Mutex<Vec<Message>>,
    }

    impl MemoryStore {
        pub fn add_user(&self, user: User) {
            self.users.lock().unwrap().insert(user.id.clone(), user);
        }

        pub fn complaint(&self, id: &str) -> Option<Complaint> {
            self.complaints.lock().unwrap().get(id).cloned()
        }

        pub fn assignment(&self, complaint_id: &str) -> Option<AssignedComplaint> {
            self.assignments.lock().unwrap().get(complaint_id).cloned()
        }

        pub fn assignment_count(&self, complaint_id: &str) -> usize {
            self.assignments
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.complaint_id == complaint_id)
                .count()
        }

        pub fn thread(&self, complaint_id: &str) -> Vec<Message> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.complaint_id == complaint_id)
                .cloned()
                .collect()
        }

        pub fn fail_on(&self, fault: Fault) {
            *self.fault.lock().unwrap() = Some(fault);
        }

        fn check(&self, op: Fault) -> Result<(), ApiError> {
            if *self.fault.lock().unwrap() == Some(op) {
                return Err(ApiError::internal(format!("injected failure on {:?}", op)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ComplaintStore for MemoryStore {
        async fn find_user(&self, user_id: &str) -> Result<Option<User>, ApiError> {
            Ok(self.users.lock().unwrap().get(user_id).cloned())
        }

        async fn find_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>, ApiError> {
            Ok(self.complaint(complaint_id))
        }

        async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), ApiError> {
            self.complaints
                .lock()
                .unwrap()
                .insert(complaint.id.clone(), complaint.clone());
            Ok(())
        }

        async fn replace_complaint(&self, complaint: &Complaint) -> Result<(), ApiError> {
            self.check(Fault::ReplaceComplaint)?;
            self.complaints
                .lock()
                .unwrap()
                .insert(complaint.id.clone(), complaint.clone());
            Ok(())
        }

        async fn find_assignment(
            &self,
            complaint_id: &str,
        ) -> Result<Option<AssignedComplaint>, ApiError> {
            Ok(self.assignment(complaint_id))
        }

        async fn save_assignment(&self, record: &AssignedComplaint) -> Result<(), ApiError> {
            self.check(Fault::SaveAssignment)?;
            self.assignments
                .lock()
                .unwrap()
                .insert(record.complaint_id.clone(), record.clone());
            Ok(())
        }

        async fn delete_assignment(&self, complaint_id: &str) -> Result<(), ApiError> {
            self.assignments.lock().unwrap().remove(complaint_id);
            Ok(())
        }

        async fn insert_message(&self, message: &Message) -> Result<(), ApiError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn list_messages(&self, complaint_id: &str) -> Result<Vec<Message>, ApiError> {
            let mut thread = self.thread(complaint_id);
            thread.sort_by_key(|m| m.created_at);
            Ok(thread)
        }

        async fn mark_read(&self, complaint_id: &str, reader_id: &str) -> Result<u64, ApiError> {
            let mut changed = 0;
            for message in self.messages.lock().unwrap().iter_mut() {
                if message.complaint_id == complaint_id
                    && message.user_id != reader_id
                    && !message.is_read
                {
                    message.is_read = true;
                    changed += 1;
                }
            }
            Ok(changed)
        }

        async fn purge_complaints(&self, complaint_ids: &[String]) -> Result<(), ApiError> {
            let doomed = |id: &String| complaint_ids.contains(id);
            self.assignments.lock().unwrap().retain(|id, _| !doomed(id));
            self.messages
                .lock()
                .unwrap()
                .retain(|m| !doomed(&m.complaint_id));
            self.complaints.lock().unwrap().retain(|id, _| !doomed(id));
            Ok(())
        }
    }
}
