// src/admin.rs
//
// Back-office endpoints: queue statistics, paged complaint listing,
// reassignment and deletions with their cascades.

use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use log::info;
use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::complaint::with_people;
use crate::error::ApiError;
use crate::lifecycle;
use crate::models::{AssignedComplaint, AssignmentStatus, Complaint, ComplaintStatus, Role, User};
use crate::store::ComplaintStore;
use crate::timestamp;
use crate::validation::{parse_field, Checks};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_agents: u64,
    pub total_complaints: u64,
    pub open_complaints: u64,
    pub resolved_complaints: u64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub agent_id: String,
    pub agent_name: String,
    pub assigned: u64,
    pub resolved: u64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

/// 1-based page and clamped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub page: i64,
    pub limit: i64,
}

impl Window {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Window {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit) as u64
    }

    pub fn pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit as u64)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignRequest {
    pub complaint_id: Option<String>,
    pub new_agent_id: Option<String>,
    pub agent_name: Option<String>,
}

/// Per-agent open and resolved counts from the ledger.
pub fn tally_agents(agents: &[User], records: &[AssignedComplaint]) -> Vec<AgentStats> {
    let mut counts: HashMap<&str, (u64, u64)> = HashMap::new();
    for record in records {
        let entry = counts.entry(record.agent_id.as_str()).or_default();
        match record.status {
            AssignmentStatus::Assigned | AssignmentStatus::InProgress => entry.0 += 1,
            AssignmentStatus::Resolved => entry.1 += 1,
            AssignmentStatus::Closed => {}
        }
    }
    agents
        .iter()
        .map(|agent| {
            let (assigned, resolved) = counts.get(agent.id.as_str()).copied().unwrap_or_default();
            AgentStats {
                agent_id: agent.id.clone(),
                agent_name: agent.full_name.clone(),
                assigned,
                resolved,
            }
        })
        .collect()
}

pub async fn dashboard_stats(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    let users = data.mongodb.users();
    let complaints = data.mongodb.complaints();
    let stats = DashboardStats {
        total_users: users
            .count_documents(doc! { "userType": Role::Customer.as_str() })
            .await?,
        total_agents: users
            .count_documents(doc! { "userType": Role::Agent.as_str() })
            .await?,
        total_complaints: complaints.count_documents(doc! {}).await?,
        open_complaints: complaints
            .count_documents(doc! { "status": ComplaintStatus::Open.as_str() })
            .await?,
        resolved_complaints: complaints
            .count_documents(doc! { "status": ComplaintStatus::Resolved.as_str() })
            .await?,
    };
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn list_complaints(
    data: web::Data<AppState>,
    caller: AuthUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    let window = Window::new(query.page, query.limit);
    let mut filter = doc! {};
    if let Some(status) = parse_field::<ComplaintStatus>("status", query.status.as_deref())? {
        filter.insert("status", status.as_str());
    }

    let collection = data.mongodb.complaints();
    let total = collection.count_documents(filter.clone()).await?;
    let page: Vec<Complaint> = collection
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .skip(window.skip())
        .limit(window.limit)
        .await?
        .try_collect()
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "complaints": with_people(&data.mongodb, page, true).await?,
        "total": total,
        "page": window.page,
        "pages": window.pages(total),
    })))
}

pub async fn reassign_complaint(
    data: web::Data<AppState>,
    caller: AuthUser,
    payload: web::Json<ReassignRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    let payload = payload.into_inner();
    Checks::new()
        .required("complaintId", payload.complaint_id.as_deref(), "Complaint id is required")
        .required("newAgentId", payload.new_agent_id.as_deref(), "New agent id is required")
        .finish()?;
    let complaint = lifecycle::reassign_complaint(
        &*data.mongodb,
        &caller,
        payload.complaint_id.as_deref().unwrap_or_default(),
        payload.new_agent_id.as_deref().unwrap_or_default(),
        payload.agent_name,
    )
    .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Complaint reassigned successfully",
        "complaint": complaint,
    })))
}

/// Deletes a complaint with its ledger entry and thread.
pub async fn remove_complaint<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
) -> Result<(), ApiError>
where
    S: ComplaintStore + ?Sized,
{
    caller.require(&[Role::Admin])?;
    let complaint = store
        .find_complaint(complaint_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Complaint not found"))?;
    store.purge_complaints(&[complaint.id.clone()]).await?;
    info!("Admin {} deleted complaint {}", caller.user_id, complaint.id);
    Ok(())
}

/// Complaint updates for an agent whose account is going away, applied in
/// order. Active work goes back to the open queue; resolved and closed
/// complaints keep their status, `resolvedAt` and review and only lose the
/// assignee.
pub fn agent_release(agent_id: &str, now: &DateTime<Utc>) -> [(Document, Document); 2] {
    let active = [
        ComplaintStatus::Assigned.as_str(),
        ComplaintStatus::InProgress.as_str(),
    ];
    [
        (
            doc! { "assignedAgent": agent_id, "status": { "$in": active.to_vec() } },
            doc! { "$set": {
                "status": ComplaintStatus::Open.as_str(),
                "assignedAgent": Bson::Null,
                "resolvedAt": Bson::Null,
                "updatedAt": timestamp::to_bson(now),
            } },
        ),
        (
            doc! { "assignedAgent": agent_id },
            doc! { "$set": {
                "assignedAgent": Bson::Null,
                "updatedAt": timestamp::to_bson(now),
            } },
        ),
    ]
}

pub async fn delete_complaint(
    data: web::Data<AppState>,
    caller: AuthUser,
    complaint_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    remove_complaint(&*data.mongodb, &caller, &complaint_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Complaint deleted successfully",
    })))
}

pub async fn delete_user(
    data: web::Data<AppState>,
    caller: AuthUser,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    if *user_id == caller.user_id {
        return Err(ApiError::validation("You cannot delete your own account"));
    }
    let user = data
        .mongodb
        .find_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let db = &data.mongodb;
    match user.user_type {
        Role::Customer => {
            let owned = db.find_complaints(doc! { "userId": &user.id }).await?;
            let ids: Vec<String> = owned.into_iter().map(|c| c.id).collect();
            db.purge_complaints(&ids).await?;
            db.messages().delete_many(doc! { "userId": &user.id }).await?;
        }
        Role::Agent => {
            db.assignments()
                .delete_many(doc! { "agentId": &user.id })
                .await?;
            for (filter, update) in agent_release(&user.id, &timestamp::now()) {
                db.complaints().update_many(filter, update).await?;
            }
        }
        Role::Admin => {}
    }
    db.users().delete_one(doc! { "_id": &user.id }).await?;
    info!(
        "Admin {} deleted {} account {}",
        caller.user_id, user.user_type, user.id
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "User deleted successfully",
    })))
}

pub async fn agent_stats(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    let agents: Vec<User> = data
        .mongodb
        .users()
        .find(doc! { "userType": Role::Agent.as_str() })
        .sort(doc! { "fullName": 1 })
        .await?
        .try_collect()
        .await?;
    let records: Vec<AssignedComplaint> = data
        .mongodb
        .assignments()
        .find(doc! {})
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(tally_agents(&agents, &records)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, name: &str) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            full_name: name.into(),
            email: format!("{}@example.com", id),
            password: "hash".into(),
            phone: "555".into(),
            user_type: Role::Agent,
            address: None,
            city: None,
            state: None,
            pincode: None,
            profile_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(complaint_id: &str, agent_id: &str, status: AssignmentStatus) -> AssignedComplaint {
        let now = Utc::now();
        AssignedComplaint {
            id: format!("a-{}", complaint_id),
            complaint_id: complaint_id.into(),
            agent_id: agent_id.into(),
            agent_name: "snapshot".into(),
            status,
            notes: None,
            assigned_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn window_defaults_and_clamps() {
        assert_eq!(Window::new(None, None), Window { page: 1, limit: 10 });
        assert_eq!(Window::new(Some(0), Some(500)), Window { page: 1, limit: 100 });
        assert_eq!(Window::new(Some(3), Some(-2)), Window { page: 3, limit: 1 });
        assert_eq!(Window::new(Some(3), Some(10)).skip(), 20);
    }

    #[test]
    fn far_pages_saturate_instead_of_overflowing() {
        let window = Window::new(Some(i64::MAX), Some(10));
        assert_eq!(window.skip(), i64::MAX as u64);
        assert_eq!(Window::new(Some(i64::MAX), Some(100)).skip(), i64::MAX as u64);
    }

    #[test]
    fn page_count_rounds_up() {
        let window = Window::new(None, Some(10));
        assert_eq!(window.pages(0), 0);
        assert_eq!(window.pages(10), 1);
        assert_eq!(window.pages(11), 2);
    }

    #[test]
    fn agents_without_records_report_zero() {
        let agents = vec![agent("g1", "Grace"), agent("g2", "Alan")];
        let records = vec![
            record("c1", "g1", AssignmentStatus::Assigned),
            record("c2", "g1", AssignmentStatus::InProgress),
            record("c3", "g1", AssignmentStatus::Resolved),
            record("c4", "g1", AssignmentStatus::Closed),
            record("c5", "gone", AssignmentStatus::Assigned),
        ];
        let stats = tally_agents(&agents, &records);
        assert_eq!(
            stats,
            vec![
                AgentStats { agent_id: "g1".into(), agent_name: "Grace".into(), assigned: 2, resolved: 1 },
                AgentStats { agent_id: "g2".into(), agent_name: "Alan".into(), assigned: 0, resolved: 0 },
            ]
        );
    }

    #[test]
    fn released_agent_reopens_only_active_work() {
        let now = Utc::now();
        let [(active_filter, reopen), (rest_filter, unassign)] = agent_release("g1", &now);

        assert_eq!(
            active_filter,
            doc! { "assignedAgent": "g1", "status": { "$in": ["assigned", "in-progress"] } }
        );
        let reopen = reopen.get_document("$set").unwrap();
        assert_eq!(reopen.get_str("status").unwrap(), "open");
        assert_eq!(reopen.get("resolvedAt"), Some(&Bson::Null));

        assert_eq!(rest_filter, doc! { "assignedAgent": "g1" });
        let unassign = unassign.get_document("$set").unwrap();
        assert_eq!(unassign.get("assignedAgent"), Some(&Bson::Null));
        assert!(unassign.get("status").is_none());
        assert!(unassign.get("resolvedAt").is_none());
    }

    fn admin() -> AuthUser {
        AuthUser {
            user_id: "boss".into(),
            email: "boss@example.com".into(),
            role: Role::Admin,
        }
    }

    fn complaint(id: &str) -> Complaint {
        let now = Utc::now();
        Complaint {
            id: id.into(),
            user_id: "cust".into(),
            name: "Meera Iyer".into(),
            email: "meera@example.com".into(),
            phone: "9876543210".into(),
            address: "12 Lake Road".into(),
            city: "Chennai".into(),
            state: "TN".into(),
            pincode: "600001".into(),
            description: "No dial tone".into(),
            category: "landline".into(),
            priority: crate::models::Priority::Medium,
            status: ComplaintStatus::InProgress,
            assigned_agent: Some("g1".into()),
            resolution: None,
            rating: None,
            feedback: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    fn note(id: &str, complaint_id: &str) -> crate::models::Message {
        crate::models::Message {
            id: id.into(),
            complaint_id: complaint_id.into(),
            user_id: "cust".into(),
            sender_type: crate::models::SenderType::Customer,
            sender_name: "Meera Iyer".into(),
            message: "any update?".into(),
            attachments: vec![],
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[actix_web::test]
    async fn deleting_a_complaint_takes_its_ledger_entry_and_thread() {
        use crate::store::memory::MemoryStore;

        let store = MemoryStore::default();
        for id in ["c1", "c2"] {
            store.insert_complaint(&complaint(id)).await.unwrap();
            store
                .save_assignment(&record(id, "g1", AssignmentStatus::InProgress))
                .await
                .unwrap();
            store.insert_message(&note(&format!("m-{}", id), id)).await.unwrap();
        }

        remove_complaint(&store, &admin(), "c1").await.unwrap();

        assert!(store.complaint("c1").is_none());
        assert!(store.assignment("c1").is_none());
        assert!(store.thread("c1").is_empty());
        assert!(store.complaint("c2").is_some());
        assert!(store.assignment("c2").is_some());
        assert_eq!(store.thread("c2").len(), 1);
    }

    #[actix_web::test]
    async fn complaint_deletion_is_admin_only_and_reports_missing() {
        use crate::store::memory::MemoryStore;

        let store = MemoryStore::default();
        store.insert_complaint(&complaint("c1")).await.unwrap();
        let agent = AuthUser {
            user_id: "g1".into(),
            email: "g1@example.com".into(),
            role: Role::Agent,
        };
        assert!(matches!(
            remove_complaint(&store, &agent, "c1").await,
            Err(ApiError::Authorization(_))
        ));
        assert!(store.complaint("c1").is_some());
        assert!(matches!(
            remove_complaint(&store, &admin(), "nope").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
