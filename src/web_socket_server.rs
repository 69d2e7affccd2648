use actix::prelude::*;
use actix_web::{web, Error, HttpMessage, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{validate_jwt, AuthUser};
use crate::chat_server::{ComplaintRelay, Disconnect, JoinThread, LeaveThread, Relay, RoomEvent};
use crate::db::MongoDB;
use crate::error::ApiError;
use crate::lifecycle::authorize_thread;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames a client sends: `{"event": "...", "data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ClientEvent {
    JoinComplaint(String),
    SendMessage(Value),
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ServerEvent<'a> {
    Joined(&'a str),
    ReceiveMessage(&'a Value),
    Error { message: String },
}

pub struct WsSession {
    pub id: Uuid,
    pub hb: Instant,
    pub caller: AuthUser,
    pub relay: Addr<ComplaintRelay>,
    pub db: Arc<MongoDB>,
}

impl WsSession {
    pub fn new(caller: AuthUser, relay: Addr<ComplaintRelay>, db: Arc<MongoDB>) -> Self {
        WsSession {
            id: Uuid::new_v4(),
            hb: Instant::now(),
            caller,
            relay,
            db,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                info!("WebSocket session {} missed heartbeat, disconnecting", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn emit(&self, ctx: &mut ws::WebsocketContext<Self>, event: ServerEvent<'_>) {
        match serde_json::to_string(&event) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Could not encode event for session {}: {}", self.id, e),
        }
    }

    fn reject(&self, ctx: &mut ws::WebsocketContext<Self>, message: impl Into<String>) {
        self.emit(
            ctx,
            ServerEvent::Error {
                message: message.into(),
            },
        );
    }

    fn join(&mut self, complaint_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let db = self.db.clone();
        let caller = self.caller.clone();
        let fut = async move { authorize_thread(&*db, &caller, &complaint_id).await }
            .into_actor(self)
            .map(|res, act, ctx| match res {
                Ok(complaint) => {
                    act.relay.do_send(JoinThread {
                        session_id: act.id,
                        complaint_id: complaint.id.clone(),
                        addr: ctx.address().recipient(),
                    });
                    act.emit(ctx, ServerEvent::Joined(&complaint.id));
                }
                Err(e) => {
                    warn!("Session {} refused a complaint room: {}", act.id, e);
                    act.reject(ctx, e.to_string());
                }
            });
        ctx.spawn(fut);
    }

    /// Participation is checked again on every send: a reassigned agent
    /// loses the room as soon as they next post to it.
    fn relay_payload(&mut self, payload: Value, ctx: &mut ws::WebsocketContext<Self>) {
        let complaint_id = match payload.get("complaintId").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return self.reject(ctx, "send_message needs a complaintId"),
        };
        let db = self.db.clone();
        let caller = self.caller.clone();
        let relay = self.relay.clone();
        let session_id = self.id;
        let fut = async move {
            if let Err(e) = authorize_thread(&*db, &caller, &complaint_id).await {
                relay.do_send(LeaveThread {
                    session_id,
                    complaint_id,
                });
                return Err(e);
            }
            relay
                .send(Relay {
                    session_id,
                    complaint_id,
                    payload,
                })
                .await
                .map_err(|e| ApiError::internal(format!("relay unavailable: {}", e)))?
                .map_err(|_| ApiError::forbidden("Join the complaint before sending messages"))
        }
        .into_actor(self)
        .map(|res, act, ctx| match res {
            Ok(delivered) => debug!("Session {} relayed to {} peers", act.id, delivered),
            Err(e) => {
                warn!("Session {} could not relay: {}", act.id, e);
                act.reject(ctx, e.to_string());
            }
        });
        ctx.spawn(fut);
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket session {} opened by {}", self.id, self.caller.user_id);
        self.hb(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.relay.do_send(Disconnect { session_id: self.id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::JoinComplaint(complaint_id)) => self.join(complaint_id, ctx),
                Ok(ClientEvent::SendMessage(payload)) => self.relay_payload(payload, ctx),
                Err(e) => {
                    warn!("Session {} sent an unreadable frame: {}", self.id, e);
                    self.reject(ctx, "Unrecognized event");
                }
            },
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error on session {}: {}", self.id, e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<RoomEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: RoomEvent, ctx: &mut ws::WebsocketContext<Self>) {
        self.emit(ctx, ServerEvent::ReceiveMessage(&msg.payload));
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a websocket upgrade, so the token may
/// also arrive as `?token=`.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, Error> {
    let from_header = req.extensions().get::<AuthUser>().cloned();
    let caller = match (from_header, &query.token) {
        (Some(caller), _) => caller,
        (None, Some(token)) => validate_jwt(token, &data.config.jwt_secret)
            .map(AuthUser::from)
            .map_err(|_| ApiError::unauthenticated("Token is not valid"))?,
        (None, None) => return Err(ApiError::unauthenticated("No token, authorization denied").into()),
    };
    ws::start(
        WsSession::new(caller, data.relay.clone(), data.mongodb.clone()),
        &req,
        stream,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_use_socket_event_names() {
        let join: ClientEvent =
            serde_json::from_str(r#"{"event":"join_complaint","data":"c-42"}"#).unwrap();
        assert!(matches!(join, ClientEvent::JoinComplaint(ref id) if id == "c-42"));

        let send: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"complaintId":"c-42","message":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(send, ClientEvent::SendMessage(ref v) if v["message"] == "hi"));

        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"leave","data":1}"#).is_err());
    }

    #[test]
    fn server_frames_forward_payload_verbatim() {
        let payload = serde_json::json!({ "complaintId": "c-42", "message": "hi", "extra": [1, 2] });
        let text = serde_json::to_value(ServerEvent::ReceiveMessage(&payload)).unwrap();
        assert_eq!(text, serde_json::json!({ "event": "receive_message", "data": payload }));

        let err = serde_json::to_value(ServerEvent::Error { message: "nope".into() }).unwrap();
        assert_eq!(err["data"]["message"], "nope");
    }
}
