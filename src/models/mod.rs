pub mod assignment;
pub mod complaint;
pub mod message;
pub mod user;

pub use assignment::{AssignedComplaint, AssignmentStatus};
pub use complaint::{Complaint, ComplaintStatus, Priority};
pub use message::{Attachment, Message, SenderType};
pub use user::{Role, User, UserProfile, UserSummary};

/// Fresh document id. Ids are UUID strings so they read the same in
/// MongoDB and in JSON responses.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
