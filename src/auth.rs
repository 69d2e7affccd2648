use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponse, ResponseError,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Duration;
use futures::future::{ok, ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::info;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::db::is_duplicate_key;
use crate::error::ApiError;
use crate::models::{new_id, Role, User, UserProfile};
use crate::store::ComplaintStore;
use crate::timestamp;
use crate::validation::{parse_field, Checks};

pub const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub user_type: Role,
    pub iat: usize,
    pub exp: usize,
}

/// The authenticated caller, as carried by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Access denied: insufficient permissions"))
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.user_type,
        }
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ApiError::unauthenticated("No token, authorization denied")),
        )
    }
}

pub fn create_jwt(user: &User, secret: &str) -> Result<String, ApiError> {
    let now = timestamp::now();
    let claims = Claims {
        user_id: user.id.clone(),
        email: user.email.clone(),
        user_type: user.user_type,
        iat: now.timestamp() as usize,
        exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extracts "Bearer <token>" from the Authorization header.
pub fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let value = req.headers().get(http::header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// Verifies a bearer token when one is present and stores the caller as an
/// `AuthUser` request extension. Requests without a token pass through;
/// handlers that need a caller reject them via the `AuthUser` extractor.
#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = bearer_token(&req) {
            let secret = req
                .app_data::<web::Data<AppState>>()
                .map(|state| state.config.jwt_secret.clone());
            let verified = match secret {
                Some(secret) => validate_jwt(&token, &secret)
                    .map_err(|_| ApiError::unauthenticated("Token is not valid")),
                None => Err(ApiError::internal("application state is not registered")),
            };
            match verified {
                Ok(claims) => {
                    req.extensions_mut().insert(AuthUser::from(claims));
                }
                Err(e) => {
                    let (req_parts, _payload) = req.into_parts();
                    let srv_resp = ServiceResponse::new(req_parts, e.error_response());
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionUser {
    id: String,
    full_name: String,
    email: String,
    phone: String,
    user_type: Role,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        SessionUser {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            user_type: user.user_type,
        }
    }
}

/// Role requested at signup. Admin accounts need the bootstrap switch.
pub fn signup_role(requested: Option<&str>, allow_admin: bool) -> Result<Role, ApiError> {
    let role = parse_field::<Role>("userType", requested)?.unwrap_or(Role::Customer);
    match role {
        Role::Customer | Role::Agent => Ok(role),
        Role::Admin if allow_admin => Ok(role),
        Role::Admin => Err(ApiError::forbidden("Admin accounts cannot be self-registered")),
    }
}

async fn hash_password(password: String) -> Result<String, ApiError> {
    web::block(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| ApiError::internal(format!("blocking pool: {}", e)))?
        .map_err(ApiError::from)
}

async fn password_matches(password: String, hashed: String) -> Result<bool, ApiError> {
    let matched = web::block(move || verify(password, &hashed))
        .await
        .map_err(|e| ApiError::internal(format!("blocking pool: {}", e)))?;
    Ok(matched.unwrap_or(false))
}

// Register Endpoint
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    Checks::new()
        .required("fullName", payload.full_name.as_deref(), "Full name is required")
        .email("email", payload.email.as_deref(), "Invalid email address")
        .min_len(
            "password",
            payload.password.as_deref(),
            6,
            "Password must be at least 6 characters",
        )
        .required("phone", payload.phone.as_deref(), "Phone number is required")
        .finish()?;
    let role = signup_role(payload.user_type.as_deref(), data.config.allow_admin_signup)?;

    let email = payload.email.unwrap_or_default().trim().to_lowercase();
    let users = data.mongodb.users();
    if users.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(ApiError::validation("User already exists"));
    }

    let now = timestamp::now();
    let user = User {
        id: new_id(),
        full_name: payload.full_name.unwrap_or_default().trim().to_string(),
        email,
        password: hash_password(payload.password.unwrap_or_default()).await?,
        phone: payload.phone.unwrap_or_default().trim().to_string(),
        user_type: role,
        address: None,
        city: None,
        state: None,
        pincode: None,
        profile_image: None,
        created_at: now,
        updated_at: now,
    };

    match users.insert_one(&user).await {
        Ok(_) => {}
        Err(e) if is_duplicate_key(&e) => return Err(ApiError::validation("User already exists")),
        Err(e) => return Err(e.into()),
    }
    info!("Registered {} account {}", user.user_type, user.id);

    let token = create_jwt(&user, &data.config.jwt_secret)?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "User registered successfully",
        "token": token,
        "user": SessionUser::from(&user),
    })))
}

// Login Endpoint
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let (email, password) = match (payload.email, payload.password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email.trim().to_lowercase(), password)
        }
        _ => return Err(ApiError::validation("Email and password are required")),
    };

    let user = data
        .mongodb
        .users()
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(|| ApiError::unauthenticated("Invalid credentials"))?;

    if !password_matches(password, user.password.clone()).await? {
        return Err(ApiError::unauthenticated("Invalid credentials"));
    }

    let token = create_jwt(&user, &data.config.jwt_secret)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Login successful",
        "token": token,
        "user": SessionUser::from(&user),
    })))
}

// Verify Endpoint
pub async fn verify_token(
    data: web::Data<AppState>,
    caller: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .mongodb
        .find_user(&caller.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Token verified",
        "user": UserProfile::from(user),
    })))
}
