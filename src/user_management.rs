// src/user_management.rs

use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use log::info;
use mongodb::bson::{doc, Bson, Document};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{Role, User, UserProfile};
use crate::store::ComplaintStore;
use crate::timestamp;
use crate::validation::{parse_field, Checks};

/// Editable profile fields. Email, role and password are not changed here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub profile_image: Option<String>,
}

impl ProfileUpdate {
    /// `$set` body for the fields present in the request.
    pub fn to_set(&self) -> Result<Document, ApiError> {
        Checks::new()
            .check(
                "fullName",
                self.full_name.as_deref().map_or(true, |v| !v.trim().is_empty()),
                "Full name cannot be empty",
            )
            .check(
                "phone",
                self.phone.as_deref().map_or(true, |v| !v.trim().is_empty()),
                "Phone number cannot be empty",
            )
            .finish()?;

        let mut set = Document::new();
        let fields = [
            ("fullName", &self.full_name),
            ("phone", &self.phone),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("pincode", &self.pincode),
            ("profileImage", &self.profile_image),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                set.insert(name, Bson::String(value.trim().to_string()));
            }
        }
        Ok(set)
    }
}

async fn list_users(data: &AppState, filter: Document) -> Result<Vec<UserProfile>, ApiError> {
    let users: Vec<User> = data
        .mongodb
        .users()
        .find(filter)
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;
    Ok(users.into_iter().map(UserProfile::from).collect())
}

pub async fn get_profile(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .mongodb
        .find_user(&caller.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

pub async fn update_profile(
    data: web::Data<AppState>,
    caller: AuthUser,
    payload: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, ApiError> {
    let mut set = payload.to_set()?;
    set.insert("updatedAt", timestamp::to_bson(&timestamp::now()));

    let res = data
        .mongodb
        .users()
        .update_one(doc! { "_id": &caller.user_id }, doc! { "$set": set })
        .await?;
    if res.matched_count == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    let user = data
        .mongodb
        .find_user(&caller.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!("User {} updated their profile", caller.user_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Profile updated successfully",
        "user": UserProfile::from(user),
    })))
}

pub async fn get_users(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    Ok(HttpResponse::Ok().json(list_users(&data, doc! {}).await?))
}

pub async fn get_users_by_type(
    data: web::Data<AppState>,
    caller: AuthUser,
    user_type: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    caller.require(&[Role::Admin])?;
    let role = parse_field::<Role>("userType", Some(user_type.as_str()))?
        .ok_or_else(|| ApiError::validation("User type is required"))?;
    let users = list_users(&data, doc! { "userType": role.as_str() }).await?;
    Ok(HttpResponse::Ok().json(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_present_fields_are_set() {
        let update = ProfileUpdate {
            city: Some(" Pune ".into()),
            profile_image: Some("https://cdn.example.com/a.png".into()),
            ..Default::default()
        };
        assert_eq!(
            update.to_set().unwrap(),
            doc! { "city": "Pune", "profileImage": "https://cdn.example.com/a.png" }
        );
    }

    #[test]
    fn blank_name_is_rejected() {
        let update = ProfileUpdate {
            full_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(update.to_set(), Err(ApiError::Validation { .. })));
    }
}
