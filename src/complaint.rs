// src/complaint.rs

use actix_web::{web, HttpResponse};
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::MongoDB;
use crate::error::ApiError;
use crate::lifecycle::{self, CustomerUpdate, NewComplaint};
use crate::models::{Complaint, ComplaintStatus, Priority, Role, UserSummary};
use crate::store::ComplaintStore;
use crate::validation::{parse_field, Checks};

/// A complaint with the people around it joined in.
#[derive(Debug, Serialize)]
pub struct ComplaintView {
    #[serde(flatten)]
    pub complaint: Complaint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<UserSummary>,
}

/// Joins agent (and optionally customer) contact cards onto complaints.
pub async fn with_people(
    db: &MongoDB,
    complaints: Vec<Complaint>,
    include_customer: bool,
) -> Result<Vec<ComplaintView>, ApiError> {
    let ids = complaints.iter().flat_map(|c| {
        let customer = include_customer.then(|| c.user_id.clone());
        customer.into_iter().chain(c.assigned_agent.clone())
    });
    let people = db.user_summaries(ids.collect::<Vec<_>>()).await?;
    Ok(complaints
        .into_iter()
        .map(|complaint| ComplaintView {
            customer: include_customer
                .then(|| people.get(&complaint.user_id).cloned())
                .flatten(),
            agent: complaint
                .assigned_agent
                .as_ref()
                .and_then(|id| people.get(id).cloned()),
            complaint,
        })
        .collect())
}

/// Query string for the staff complaint queue.
#[derive(Debug, Deserialize)]
pub struct ComplaintFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
}

impl ComplaintFilter {
    pub fn to_document(&self) -> Result<Document, ApiError> {
        let mut filter = doc! {};
        if let Some(status) = parse_field::<ComplaintStatus>("status", self.status.as_deref())? {
            filter.insert("status", status.as_str());
        }
        if let Some(priority) = parse_field::<Priority>("priority", self.priority.as_deref())? {
            filter.insert("priority", priority.as_str());
        }
        Ok(filter)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub complaint_id: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
}

/// CREATE a complaint (customer)
pub async fn create_complaint(
    data: web::Data<AppState>,
    caller: AuthUser,
    payload: web::Json<NewComplaint>,
) -> Result<HttpResponse, ApiError> {
    let complaint =
        lifecycle::create_complaint(&*data.mongodb, &caller, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Complaint registered successfully",
        "complaint": complaint,
    })))
}

/// LIST the caller's own complaints (customer)
pub async fn my_complaints(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Customer])?;
    let complaints = data
        .mongodb
        .find_complaints(doc! { "userId": &caller.user_id })
        .await?;
    Ok(HttpResponse::Ok().json(with_people(&data.mongodb, complaints, false).await?))
}

/// GET a single complaint
pub async fn get_complaint(
    data: web::Data<AppState>,
    caller: AuthUser,
    complaint_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let complaint = data
        .mongodb
        .find_complaint(&complaint_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Complaint not found"))?;
    if !lifecycle::can_view(&caller, &complaint) {
        return Err(ApiError::forbidden("You can only view your own complaints"));
    }
    let include_customer = caller.role != Role::Customer;
    let view = with_people(&data.mongodb, vec![complaint], include_customer)
        .await?
        .pop()
        .ok_or_else(|| ApiError::internal("complaint view vanished"))?;
    Ok(HttpResponse::Ok().json(view))
}

/// UPDATE status / resolution / rating / feedback (owning customer)
pub async fn update_complaint(
    data: web::Data<AppState>,
    caller: AuthUser,
    complaint_id: web::Path<String>,
    payload: web::Json<CustomerUpdate>,
) -> Result<HttpResponse, ApiError> {
    let complaint = lifecycle::update_complaint_by_customer(
        &*data.mongodb,
        &caller,
        &complaint_id,
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Complaint updated successfully",
        "complaint": complaint,
    })))
}

/// LIST all complaints, filterable by status and priority (admin, agent)
pub async fn list_complaints(
    data: web::Data<AppState>,
    caller: AuthUser,
    query: web::Query<ComplaintFilter>,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin, Role::Agent])?;
    let complaints = data.mongodb.find_complaints(query.to_document()?).await?;
    Ok(HttpResponse::Ok().json(with_people(&data.mongodb, complaints, true).await?))
}

/// ASSIGN a complaint to an agent (admin)
pub async fn assign_complaint(
    data: web::Data<AppState>,
    caller: AuthUser,
    payload: web::Json<AssignRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    let payload = payload.into_inner();
    Checks::new()
        .required("complaintId", payload.complaint_id.as_deref(), "Complaint id is required")
        .required("agentId", payload.agent_id.as_deref(), "Agent id is required")
        .finish()?;
    let complaint = lifecycle::assign_complaint(
        &*data.mongodb,
        &caller,
        payload.complaint_id.as_deref().unwrap_or_default(),
        payload.agent_id.as_deref().unwrap_or_default(),
        payload.agent_name,
    )
    .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Complaint assigned successfully",
        "complaint": complaint,
    })))
}
