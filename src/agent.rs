// src/agent.rs

use actix_web::{web, HttpResponse};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use futures_util::TryStreamExt;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::lifecycle;
use crate::models::{AssignedComplaint, AssignmentStatus, Complaint, Role};
use crate::validation::{parse_field, Checks};

/// A ledger row with the complaint it points at.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedView {
    #[serde(flatten)]
    pub assignment: AssignedComplaint,
    pub complaint: Option<Complaint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub complaint_id: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// GET the caller's assignments, newest first
pub async fn assigned_complaints(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Agent])?;
    let records: Vec<AssignedComplaint> = data
        .mongodb
        .assignments()
        .find(doc! { "agentId": &caller.user_id })
        .sort(doc! { "assignedAt": -1 })
        .await?
        .try_collect()
        .await?;

    let ids: Vec<&str> = records.iter().map(|r| r.complaint_id.as_str()).collect();
    let complaints = data
        .mongodb
        .find_complaints(doc! { "_id": { "$in": ids } })
        .await?;

    let rows: Vec<AssignedView> = records
        .into_iter()
        .map(|assignment| AssignedView {
            complaint: complaints
                .iter()
                .find(|c| c.id == assignment.complaint_id)
                .cloned(),
            assignment,
        })
        .collect();
    Ok(HttpResponse::Ok().json(rows))
}

/// UPDATE status on an assigned complaint
pub async fn update_status(
    data: web::Data<AppState>,
    caller: AuthUser,
    payload: web::Json<StatusUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Agent])?;
    let payload = payload.into_inner();
    Checks::new()
        .required("complaintId", payload.complaint_id.as_deref(), "Complaint id is required")
        .required("status", payload.status.as_deref(), "Status is required")
        .finish()?;
    let status = parse_field::<AssignmentStatus>("status", payload.status.as_deref())?
        .ok_or_else(|| ApiError::validation("Status is required"))?;

    let complaint = lifecycle::update_status_by_agent(
        &*data.mongodb,
        &caller,
        payload.complaint_id.as_deref().unwrap_or_default(),
        status,
        payload.notes,
    )
    .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Status updated successfully",
        "complaint": complaint,
    })))
}

/// GET the number of open items on the caller's desk
pub async fn workload(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Agent])?;
    let workload = data
        .mongodb
        .assignments()
        .count_documents(doc! {
            "agentId": &caller.user_id,
            "status": { "$in": AssignmentStatus::active().to_vec() },
        })
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "workload": workload })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn assigned_row_keeps_ledger_fields_at_top_level() {
        let now = Utc::now();
        let view = AssignedView {
            assignment: AssignedComplaint {
                id: "a1".into(),
                complaint_id: "c1".into(),
                agent_id: "g1".into(),
                agent_name: "Grace".into(),
                status: AssignmentStatus::InProgress,
                notes: Some("called back".into()),
                assigned_at: now,
                updated_at: now,
            },
            complaint: None,
        };
        let json = serde_json::to_value(view).unwrap();
        assert_eq!(json["complaintId"], "c1");
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["notes"], "called back");
        assert!(json["complaint"].is_null());
    }
}
