// src/main.rs

mod admin;
mod agent;
mod app_state;
mod auth;
mod chat_server;
mod complaint;
mod config;
mod db;
mod error;
mod lifecycle;
mod messages;
mod models;
mod store;
mod timestamp;
mod user_management;
mod validation;
mod web_socket_server;


use std::io;
use std::sync::Arc;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError},
    http,
    middleware::Logger,
    web, App, Error, HttpRequest, HttpResponse, HttpServer,
};
use env_logger::Env;
use log::info;

use crate::app_state::AppState;
use crate::auth::{login, register, verify_token, Authentication};
use crate::chat_server::ComplaintRelay;
use crate::error::ApiError;
use crate::web_socket_server::ws_index;

fn json_error(err: JsonPayloadError, _: &HttpRequest) -> Error {
    ApiError::validation(format!("Invalid JSON body: {}", err)).into()
}

fn query_error(err: QueryPayloadError, _: &HttpRequest) -> Error {
    ApiError::validation(format!("Invalid query string: {}", err)).into()
}

fn path_error(err: PathError, _: &HttpRequest) -> Error {
    ApiError::validation(format!("Invalid path: {}", err)).into()
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "message": "Server is running" }))
}

/// Route table, shared by the server and the HTTP tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .route("/health", web::get().to(health))
        // WEBSOCKET route for realtime complaint rooms
        .service(web::resource("/ws").route(web::get().to(ws_index)))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .route("/register", web::post().to(register))
                        .route("/login", web::post().to(login))
                        .route("/verify", web::get().to(verify_token)),
                )
                // USERS
                .service(
                    web::scope("/users")
                        .route("/profile", web::get().to(user_management::get_profile))
                        .route("/profile", web::put().to(user_management::update_profile))
                        .route("/type/{user_type}", web::get().to(user_management::get_users_by_type))
                        .route("", web::get().to(user_management::get_users)),
                )
                // COMPLAINTS
                .service(
                    web::scope("/complaints")
                        .route("/my-complaints", web::get().to(complaint::my_complaints))
                        .route("/assign", web::post().to(complaint::assign_complaint))
                        .route("", web::post().to(complaint::create_complaint))
                        .route("", web::get().to(complaint::list_complaints))
                        .route("/{complaint_id}", web::get().to(complaint::get_complaint))
                        .route("/{complaint_id}", web::put().to(complaint::update_complaint)),
                )
                // AGENTS
                .service(
                    web::scope("/agents")
                        .route("/assigned", web::get().to(agent::assigned_complaints))
                        .route("/status", web::put().to(agent::update_status))
                        .route("/workload", web::get().to(agent::workload)),
                )
                // ADMIN
                .service(
                    web::scope("/admin")
                        .route("/dashboard/stats", web::get().to(admin::dashboard_stats))
                        .route("/complaints", web::get().to(admin::list_complaints))
                        .route("/complaints/reassign", web::put().to(admin::reassign_complaint))
                        .route("/complaints/{complaint_id}", web::delete().to(admin::delete_complaint))
                        .route("/users/{user_id}", web::delete().to(admin::delete_user))
                        .route("/agents/stats", web::get().to(admin::agent_stats)),
                )
                // MESSAGES
                .service(
                    web::scope("/messages")
                        .route("/send", web::post().to(messages::send_message))
                        .route("/{complaint_id}", web::get().to(messages::get_messages))
                        .route("/{complaint_id}/read", web::put().to(messages::mark_read)),
                ),
        );
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let mongodb = db::MongoDB::init(&config.mongo_uri, &config.database_name)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    mongodb
        .ensure_indexes()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let mongodb = Arc::new(mongodb);
    let relay = ComplaintRelay::new().start();

    let (host, port) = config.bind_addr();
    info!("Server running at http://{}:{}", host, port);
    info!("Allowed CORS Origin: {}", config.frontend_origin);

    let state = AppState {
        relay,
        mongodb,
        config,
    };

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&state.config.frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Authentication)
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind((host, port))?
    .run()
    .await
}
