// src/lifecycle.rs
//
// Complaint lifecycle and assignment engine. Every change to a complaint's
// status or assignee, and to an assignment record's status, goes through
// here. Writes go ledger-first, complaint-second; a failed complaint write
// restores the ledger entry it displaced.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{
    new_id, AssignedComplaint, AssignmentStatus, Complaint, ComplaintStatus, Priority, Role, User,
};
use crate::store::ComplaintStore;
use crate::timestamp;
use crate::validation::{parse_field, Checks};

/// Customer-supplied complaint details.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComplaint {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
}

/// Fields a customer may change on their own complaint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdate {
    pub status: Option<String>,
    pub resolution: Option<String>,
    pub rating: Option<i64>,
    pub feedback: Option<String>,
}

/// `resolvedAt` for a complaint moving to `next`: stamped on entering
/// resolved, kept on a repeated resolved, cleared for anything else.
pub fn resolved_at_after(
    current: &Complaint,
    next: ComplaintStatus,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match next {
        ComplaintStatus::Resolved if current.status == ComplaintStatus::Resolved => {
            current.resolved_at.or(Some(now))
        }
        ComplaintStatus::Resolved => Some(now),
        _ => None,
    }
}

fn with_status(current: &Complaint, status: ComplaintStatus, now: DateTime<Utc>) -> Complaint {
    let mut next = current.clone();
    next.resolved_at = resolved_at_after(current, status, now);
    next.status = status;
    next.updated_at = now;
    next
}

/// Owner, assigned agent, or any admin.
pub fn is_participant(caller: &AuthUser, complaint: &Complaint) -> bool {
    match caller.role {
        Role::Admin => true,
        Role::Customer => complaint.is_owned_by(&caller.user_id),
        Role::Agent => complaint.is_assigned_to(&caller.user_id),
    }
}

/// Agents and admins work the full queue; customers see their own.
pub fn can_view(caller: &AuthUser, complaint: &Complaint) -> bool {
    match caller.role {
        Role::Admin | Role::Agent => true,
        Role::Customer => complaint.is_owned_by(&caller.user_id),
    }
}

async fn require_complaint<S>(store: &S, complaint_id: &str) -> Result<Complaint, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    store
        .find_complaint(complaint_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Complaint not found"))
}

/// Loads a complaint and checks the caller takes part in its thread.
pub async fn authorize_thread<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
) -> Result<Complaint, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    let complaint = require_complaint(store, complaint_id).await?;
    if !is_participant(caller, &complaint) {
        return Err(ApiError::forbidden(
            "You are not a participant in this complaint",
        ));
    }
    Ok(complaint)
}

async fn require_agent<S>(store: &S, agent_id: &str) -> Result<User, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    let agent = store
        .find_user(agent_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    if agent.user_type != Role::Agent {
        return Err(ApiError::validation("Selected user is not an agent"));
    }
    Ok(agent)
}

enum LedgerWrite {
    Keep,
    Put {
        previous: Option<AssignedComplaint>,
        next: AssignedComplaint,
    },
}

async fn commit<S>(store: &S, complaint: &Complaint, ledger: LedgerWrite) -> Result<(), ApiError>
where
    S: ComplaintStore + ?Sized,
{
    let previous = match ledger {
        LedgerWrite::Keep => return store.replace_complaint(complaint).await,
        LedgerWrite::Put { previous, next } => {
            store.save_assignment(&next).await?;
            previous
        }
    };

    let err = match store.replace_complaint(complaint).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    warn!(
        "Complaint {} write failed, restoring its assignment record",
        complaint.id
    );
    let restored = match &previous {
        Some(record) => store.save_assignment(record).await,
        None => store.delete_assignment(&complaint.id).await,
    };
    if let Err(restore_err) = restored {
        error!(
            "Assignment record for complaint {} left inconsistent: {}",
            complaint.id, restore_err
        );
    }
    Err(err)
}

pub async fn create_complaint<S>(
    store: &S,
    caller: &AuthUser,
    input: NewComplaint,
) -> Result<Complaint, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    caller.require(&[Role::Customer])?;
    Checks::new()
        .required("name", input.name.as_deref(), "Name is required")
        .email("email", input.email.as_deref(), "Invalid email")
        .required("phone", input.phone.as_deref(), "Phone is required")
        .required("address", input.address.as_deref(), "Address is required")
        .required("city", input.city.as_deref(), "City is required")
        .required("state", input.state.as_deref(), "State is required")
        .required("pincode", input.pincode.as_deref(), "Pincode is required")
        .required("description", input.description.as_deref(), "Description is required")
        .required("category", input.category.as_deref(), "Category is required")
        .finish()?;
    let priority = parse_field::<Priority>("priority", input.priority.as_deref())?.unwrap_or_default();

    let field = |value: Option<String>| value.unwrap_or_default().trim().to_string();
    let now = timestamp::now();
    let complaint = Complaint {
        id: new_id(),
        user_id: caller.user_id.clone(),
        name: field(input.name),
        email: field(input.email),
        phone: field(input.phone),
        address: field(input.address),
        city: field(input.city),
        state: field(input.state),
        pincode: field(input.pincode),
        description: field(input.description),
        category: field(input.category),
        priority,
        status: ComplaintStatus::Open,
        assigned_agent: None,
        resolution: None,
        rating: None,
        feedback: None,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    };
    store.insert_complaint(&complaint).await?;
    info!("Complaint {} filed by {}", complaint.id, caller.user_id);
    Ok(complaint)
}

/// First assignment. Lands the complaint on in-progress and opens a ledger
/// entry at assigned; an already-assigned complaint goes through
/// `reassign_complaint` instead.
pub async fn assign_complaint<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
    agent_id: &str,
    agent_name: Option<String>,
) -> Result<Complaint, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    caller.require(&[Role::Admin])?;
    let current = require_complaint(store, complaint_id).await?;
    let agent = require_agent(store, agent_id).await?;
    if store.find_assignment(complaint_id).await?.is_some() {
        return Err(ApiError::validation(
            "Complaint is already assigned; use reassignment instead",
        ));
    }

    let now = timestamp::now();
    let record = AssignedComplaint {
        id: new_id(),
        complaint_id: current.id.clone(),
        agent_id: agent.id.clone(),
        agent_name: snapshot_name(agent_name, &agent),
        status: AssignmentStatus::Assigned,
        notes: None,
        assigned_at: now,
        updated_at: now,
    };
    let mut next = with_status(&current, ComplaintStatus::InProgress, now);
    next.assigned_agent = Some(agent.id.clone());

    commit(
        store,
        &next,
        LedgerWrite::Put {
            previous: None,
            next: record,
        },
    )
    .await?;
    info!("Complaint {} assigned to agent {}", next.id, agent.id);
    Ok(next)
}

/// Moves a complaint to another agent. Lands on assigned and rewrites the
/// single ledger entry in place.
pub async fn reassign_complaint<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
    agent_id: &str,
    agent_name: Option<String>,
) -> Result<Complaint, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    caller.require(&[Role::Admin])?;
    let current = require_complaint(store, complaint_id).await?;
    let agent = require_agent(store, agent_id).await?;
    let previous = store.find_assignment(complaint_id).await?;

    let now = timestamp::now();
    let record = match &previous {
        Some(existing) => AssignedComplaint {
            agent_id: agent.id.clone(),
            agent_name: snapshot_name(agent_name, &agent),
            status: AssignmentStatus::Assigned,
            updated_at: now,
            ..existing.clone()
        },
        None => AssignedComplaint {
            id: new_id(),
            complaint_id: current.id.clone(),
            agent_id: agent.id.clone(),
            agent_name: snapshot_name(agent_name, &agent),
            status: AssignmentStatus::Assigned,
            notes: None,
            assigned_at: now,
            updated_at: now,
        },
    };
    let mut next = with_status(&current, ComplaintStatus::Assigned, now);
    next.assigned_agent = Some(agent.id.clone());

    commit(store, &next, LedgerWrite::Put { previous, next: record }).await?;
    info!("Complaint {} reassigned to agent {}", next.id, agent.id);
    Ok(next)
}

fn snapshot_name(requested: Option<String>, agent: &User) -> String {
    requested
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| agent.full_name.clone())
}

/// Status change from the assigned agent. Callers without a ledger entry
/// for the complaint are refused before anything is read or written.
pub async fn update_status_by_agent<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
    status: AssignmentStatus,
    notes: Option<String>,
) -> Result<Complaint, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    caller.require(&[Role::Agent])?;
    let previous = match store.find_assignment(complaint_id).await? {
        Some(record) if record.agent_id == caller.user_id => record,
        _ => {
            return Err(ApiError::forbidden(
                "You are not authorized to update this complaint",
            ))
        }
    };
    let current = require_complaint(store, complaint_id).await?;

    let now = timestamp::now();
    let record = AssignedComplaint {
        status,
        notes,
        updated_at: now,
        ..previous.clone()
    };
    let next = with_status(&current, status.into(), now);

    commit(
        store,
        &next,
        LedgerWrite::Put {
            previous: Some(previous),
            next: record,
        },
    )
    .await?;
    info!(
        "Agent {} moved complaint {} to {}",
        caller.user_id, next.id, next.status
    );
    Ok(next)
}

/// Customer edits to their own complaint. Rating and feedback are only
/// taken once the complaint is resolved or closed.
pub async fn update_complaint_by_customer<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
    update: CustomerUpdate,
) -> Result<Complaint, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    caller.require(&[Role::Customer])?;
    let status = parse_field::<ComplaintStatus>("status", update.status.as_deref())?;
    let current = require_complaint(store, complaint_id).await?;
    if !current.is_owned_by(&caller.user_id) {
        return Err(ApiError::forbidden("You can only update your own complaints"));
    }

    let now = timestamp::now();
    let mut next = match status {
        Some(status) => with_status(&current, status, now),
        None => Complaint {
            updated_at: now,
            ..current.clone()
        },
    };

    let settled = matches!(
        next.status,
        ComplaintStatus::Resolved | ComplaintStatus::Closed
    );
    let rating_in_range = update.rating.map_or(true, |r| (1..=5).contains(&r));
    let wants_review = update.rating.is_some() || update.feedback.is_some();
    Checks::new()
        .check("rating", rating_in_range, "Rating must be between 1 and 5")
        .check(
            "feedback",
            !wants_review || settled,
            "Feedback can only be given once the complaint is resolved",
        )
        .finish()?;

    if let Some(resolution) = update.resolution {
        next.resolution = Some(resolution);
    }
    if let Some(rating) = update.rating {
        next.rating = Some(rating as u8);
    }
    if let Some(feedback) = update.feedback {
        next.feedback = Some(feedback);
    }

    let ledger = match (status, store.find_assignment(complaint_id).await?) {
        (Some(status), Some(record)) => match AssignmentStatus::from_complaint(status) {
            Some(mapped) if mapped != record.status => LedgerWrite::Put {
                next: AssignedComplaint {
                    status: mapped,
                    updated_at: now,
                    ..record.clone()
                },
                previous: Some(record),
            },
            _ => LedgerWrite::Keep,
        },
        _ => LedgerWrite::Keep,
    };

    commit(store, &next, ledger).await?;
    info!("Customer {} updated complaint {}", caller.user_id, next.id);
    Ok(next)
}
