use crate::chat_server::ComplaintRelay;
use crate::config::Config;
use crate::db::MongoDB;
use actix::Addr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub relay: Addr<ComplaintRelay>,
    pub mongodb: Arc<MongoDB>,
    pub config: Config,
}
