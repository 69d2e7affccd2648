// src/messages.rs

use actix_web::{web, HttpResponse};
use log::info;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::lifecycle::authorize_thread;
use crate::models::{new_id, Attachment, Message, SenderType, UserSummary};
use crate::store::ComplaintStore;
use crate::timestamp;
use crate::validation::Checks;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub complaint_id: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Option<UserSummary>,
}

/// Stores a message from a participant. Admins read threads but do not
/// post in them.
pub async fn post_message<S>(
    store: &S,
    caller: &AuthUser,
    request: SendMessageRequest,
) -> Result<Message, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    Checks::new()
        .required("complaintId", request.complaint_id.as_deref(), "Complaint id is required")
        .required("message", request.message.as_deref(), "Message is required")
        .finish()?;
    let sender_type = SenderType::for_role(caller.role)
        .ok_or_else(|| ApiError::forbidden("Admins cannot post in complaint threads"))?;
    let complaint_id = request.complaint_id.unwrap_or_default();
    authorize_thread(store, caller, &complaint_id).await?;

    let sender = store
        .find_user(&caller.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let message = Message {
        id: new_id(),
        complaint_id,
        user_id: caller.user_id.clone(),
        sender_type,
        sender_name: sender.full_name,
        message: request.message.unwrap_or_default().trim().to_string(),
        attachments: request.attachments,
        is_read: false,
        created_at: timestamp::now(),
    };
    store.insert_message(&message).await?;
    info!(
        "Message {} posted to complaint {} by {}",
        message.id, message.complaint_id, caller.user_id
    );
    Ok(message)
}

pub async fn read_thread<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
) -> Result<Vec<Message>, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    let complaint = authorize_thread(store, caller, complaint_id).await?;
    store.list_messages(&complaint.id).await
}

/// Marks everything the caller did not write as read. Safe to repeat.
pub async fn mark_thread_read<S>(
    store: &S,
    caller: &AuthUser,
    complaint_id: &str,
) -> Result<u64, ApiError>
where
    S: ComplaintStore + ?Sized,
{
    let complaint = authorize_thread(store, caller, complaint_id).await?;
    store.mark_read(&complaint.id, &caller.user_id).await
}

/// POST a message into a complaint thread
pub async fn send_message(
    data: web::Data<AppState>,
    caller: AuthUser,
    payload: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    let message = post_message(&*data.mongodb, &caller, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Message sent successfully",
        "data": message,
    })))
}

/// GET a thread, oldest first
pub async fn get_messages(
    data: web::Data<AppState>,
    caller: AuthUser,
    complaint_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let thread = read_thread(&*data.mongodb, &caller, &complaint_id).await?;
    let senders = data
        .mongodb
        .user_summaries(thread.iter().map(|m| m.user_id.clone()).collect::<Vec<_>>())
        .await?;
    let views: Vec<MessageView> = thread
        .into_iter()
        .map(|message| MessageView {
            sender: senders.get(&message.user_id).cloned(),
            message,
        })
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn mark_read(
    data: web::Data<AppState>,
    caller: AuthUser,
    complaint_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let updated = mark_thread_read(&*data.mongodb, &caller, &complaint_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Messages marked as read",
        "updated": updated,
    })))
}
