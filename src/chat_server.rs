use actix::prelude::*;
use log::{info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Delivered to every session in a complaint's room.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct RoomEvent {
    pub complaint_id: String,
    pub payload: Value,
}

/// Adds a session to a complaint's room. Callers check participation
/// before sending this.
#[derive(Message)]
#[rtype(result = "()")]
pub struct JoinThread {
    pub session_id: Uuid,
    pub complaint_id: String,
    pub addr: Recipient<RoomEvent>,
}

/// Drops one room membership, e.g. after the session lost access to it.
#[derive(Message)]
#[rtype(result = "()")]
pub struct LeaveThread {
    pub session_id: Uuid,
    pub complaint_id: String,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub session_id: Uuid,
}

/// Fans `payload` out to the room, sender included. Only sessions that
/// joined the room may post to it.
#[derive(Message)]
#[rtype(result = "Result<usize, RelayError>")]
pub struct Relay {
    pub session_id: Uuid,
    pub complaint_id: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    NotJoined,
}

/// Room registry. Owned by one actor, so joins, leaves and sends are
/// applied one at a time through its mailbox.
#[derive(Default)]
pub struct ComplaintRelay {
    rooms: HashMap<String, HashMap<Uuid, Recipient<RoomEvent>>>,
    memberships: HashMap<Uuid, HashSet<String>>,
}

impl ComplaintRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn leave(&mut self, session_id: Uuid, complaint_id: &str) {
        if let Some(room) = self.rooms.get_mut(complaint_id) {
            room.remove(&session_id);
            if room.is_empty() {
                self.rooms.remove(complaint_id);
            }
        }
    }
}

impl Actor for ComplaintRelay {
    type Context = Context<Self>;
}

impl Handler<JoinThread> for ComplaintRelay {
    type Result = ();

    fn handle(&mut self, msg: JoinThread, _: &mut Context<Self>) {
        info!("Session {} joined complaint room {}", msg.session_id, msg.complaint_id);
        self.rooms
            .entry(msg.complaint_id.clone())
            .or_default()
            .insert(msg.session_id, msg.addr);
        self.memberships
            .entry(msg.session_id)
            .or_default()
            .insert(msg.complaint_id);
    }
}

impl Handler<Disconnect> for ComplaintRelay {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        let Some(joined) = self.memberships.remove(&msg.session_id) else {
            return;
        };
        for complaint_id in joined {
            self.leave(msg.session_id, &complaint_id);
        }
        info!("Session {} left all complaint rooms", msg.session_id);
    }
}

impl Handler<LeaveThread> for ComplaintRelay {
    type Result = ();

    fn handle(&mut self, msg: LeaveThread, _: &mut Context<Self>) {
        self.leave(msg.session_id, &msg.complaint_id);
        if let Some(joined) = self.memberships.get_mut(&msg.session_id) {
            joined.remove(&msg.complaint_id);
        }
        info!("Session {} left complaint room {}", msg.session_id, msg.complaint_id);
    }
}

impl Handler<Relay> for ComplaintRelay {
    type Result = Result<usize, RelayError>;

    fn handle(&mut self, msg: Relay, _: &mut Context<Self>) -> Self::Result {
        let room = match self.rooms.get(&msg.complaint_id) {
            Some(room) if room.contains_key(&msg.session_id) => room,
            _ => {
                warn!(
                    "Session {} tried to post to room {} without joining",
                    msg.session_id, msg.complaint_id
                );
                return Err(RelayError::NotJoined);
            }
        };
        for addr in room.values() {
            addr.do_send(RoomEvent {
                complaint_id: msg.complaint_id.clone(),
                payload: msg.payload.clone(),
            });
        }
        Ok(room.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Stands in for a websocket session and records what it receives.
    struct Probe {
        seen: Arc<Mutex<Vec<RoomEvent>>>,
    }

    impl Actor for Probe {
        type Context = Context<Self>;
    }

    impl Handler<RoomEvent> for Probe {
        type Result = ();

        fn handle(&mut self, msg: RoomEvent, _: &mut Context<Self>) {
            self.seen.lock().unwrap().push(msg);
        }
    }

    fn probe() -> (Recipient<RoomEvent>, Arc<Mutex<Vec<RoomEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let addr = Probe { seen: seen.clone() }.start();
        (addr.recipient(), seen)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[actix_web::test]
    async fn relays_to_the_whole_room_including_sender() {
        let relay = ComplaintRelay::new().start();
        let (customer, customer_seen) = probe();
        let (agent, agent_seen) = probe();
        let (outsider, outsider_seen) = probe();
        let (s1, s2, s3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        relay.do_send(JoinThread { session_id: s1, complaint_id: "c1".into(), addr: customer });
        relay.do_send(JoinThread { session_id: s2, complaint_id: "c1".into(), addr: agent });
        relay.do_send(JoinThread { session_id: s3, complaint_id: "c2".into(), addr: outsider });

        let payload = serde_json::json!({ "complaintId": "c1", "message": "hello" });
        let delivered = relay
            .send(Relay { session_id: s1, complaint_id: "c1".into(), payload: payload.clone() })
            .await
            .unwrap();
        assert_eq!(delivered, Ok(2));
        settle().await;

        assert_eq!(customer_seen.lock().unwrap()[0].payload, payload);
        assert_eq!(agent_seen.lock().unwrap().len(), 1);
        assert!(outsider_seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn posting_requires_membership() {
        let relay = ComplaintRelay::new().start();
        let (member, seen) = probe();
        let member_id = Uuid::new_v4();
        relay.do_send(JoinThread { session_id: member_id, complaint_id: "c1".into(), addr: member });

        let res = relay
            .send(Relay {
                session_id: Uuid::new_v4(),
                complaint_id: "c1".into(),
                payload: serde_json::json!({ "complaintId": "c1" }),
            })
            .await
            .unwrap();
        assert_eq!(res, Err(RelayError::NotJoined));
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn disconnect_drops_every_membership() {
        let relay = ComplaintRelay::new().start();
        let (leaving, _) = probe();
        let (staying, _) = probe();
        let (gone, kept) = (Uuid::new_v4(), Uuid::new_v4());
        relay.do_send(JoinThread { session_id: gone, complaint_id: "c1".into(), addr: leaving.clone() });
        relay.do_send(JoinThread { session_id: gone, complaint_id: "c2".into(), addr: leaving });
        relay.do_send(JoinThread { session_id: kept, complaint_id: "c1".into(), addr: staying });
        relay.do_send(Disconnect { session_id: gone });

        let payload = serde_json::json!({ "complaintId": "c1" });
        let to_c1 = relay
            .send(Relay { session_id: kept, complaint_id: "c1".into(), payload: payload.clone() })
            .await
            .unwrap();
        assert_eq!(to_c1, Ok(1));
        let from_gone = relay
            .send(Relay { session_id: gone, complaint_id: "c2".into(), payload })
            .await
            .unwrap();
        assert_eq!(from_gone, Err(RelayError::NotJoined));
    }

    #[actix_web::test]
    async fn leaving_one_room_keeps_the_others() {
        let relay = ComplaintRelay::new().start();
        let (session, seen) = probe();
        let id = Uuid::new_v4();
        relay.do_send(JoinThread { session_id: id, complaint_id: "c1".into(), addr: session.clone() });
        relay.do_send(JoinThread { session_id: id, complaint_id: "c2".into(), addr: session });
        relay.do_send(LeaveThread { session_id: id, complaint_id: "c1".into() });

        let payload = serde_json::json!({ "complaintId": "c1" });
        let to_c1 = relay
            .send(Relay { session_id: id, complaint_id: "c1".into(), payload })
            .await
            .unwrap();
        assert_eq!(to_c1, Err(RelayError::NotJoined));
        let to_c2 = relay
            .send(Relay {
                session_id: id,
                complaint_id: "c2".into(),
                payload: serde_json::json!({ "complaintId": "c2" }),
            })
            .await
            .unwrap();
        assert_eq!(to_c2, Ok(1));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
