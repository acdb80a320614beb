//! Connected player state
//!
//! Exactly one `Player` exists per identity at a time; it survives a
//! disconnect inside the registry's reconnection window. Rooms and
//! tournaments share it through `Arc`; the player itself points back at
//! rooms by id only, so there are no ownership cycles.

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::ws::protocol::ServerEnvelope;

/// Sender half of a connection's outbound message queue
pub type OutboundSender = mpsc::UnboundedSender<ServerEnvelope>;

pub struct Player {
    pub id: Uuid,
    pub is_bot: bool,
    // Leaf lock: nothing else is locked while this is held
    inner: Mutex<PlayerInner>,
}

struct PlayerInner {
    name: String,
    conn: Option<OutboundSender>,
    room: Option<Uuid>,
    spectating: Option<Uuid>,
    skin_id: String,
    ready_ack: Option<oneshot::Sender<()>>,
}

impl Player {
    pub fn new_human(id: Uuid, name: String, conn: OutboundSender) -> Self {
        Self {
            id,
            is_bot: false,
            inner: Mutex::new(PlayerInner {
                name,
                conn: Some(conn),
                room: None,
                spectating: None,
                skin_id: String::new(),
                ready_ack: None,
            }),
        }
    }

    pub fn new_bot(name: String, skin_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            is_bot: true,
            inner: Mutex::new(PlayerInner {
                name,
                conn: None,
                room: None,
                spectating: None,
                skin_id,
                ready_ack: None,
            }),
        }
    }

    /// Bots are always alive; humans need an open connection
    pub fn is_alive(&self) -> bool {
        if self.is_bot {
            return true;
        }
        self.inner
            .lock()
            .conn
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a message on the player's connection.
    /// Returns false when the player has no live connection.
    pub fn send(&self, msg: ServerEnvelope) -> bool {
        let inner = self.inner.lock();
        match &inner.conn {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Attach a fresh transport after a reconnect
    pub fn attach(&self, conn: OutboundSender, name: String) {
        let mut inner = self.inner.lock();
        inner.conn = Some(conn);
        inner.name = name;
    }

    /// Drop the transport on disconnect; the player object stays alive
    pub fn detach(&self) {
        self.inner.lock().conn = None;
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn set_name(&self, name: String) {
        self.inner.lock().name = name;
    }

    pub fn skin_id(&self) -> String {
        self.inner.lock().skin_id.clone()
    }

    pub fn set_skin_id(&self, skin_id: String) {
        self.inner.lock().skin_id = skin_id;
    }

    pub fn room(&self) -> Option<Uuid> {
        self.inner.lock().room
    }

    pub fn set_room(&self, room: Option<Uuid>) {
        self.inner.lock().room = room;
    }

    /// Clear the room back-reference only if it still points at `room_id`
    pub fn clear_room_if(&self, room_id: Uuid) {
        let mut inner = self.inner.lock();
        if inner.room == Some(room_id) {
            inner.room = None;
        }
    }

    pub fn spectating(&self) -> Option<Uuid> {
        self.inner.lock().spectating
    }

    pub fn set_spectating(&self, room: Option<Uuid>) {
        self.inner.lock().spectating = room;
    }

    pub fn clear_spectating_if(&self, room_id: Uuid) {
        let mut inner = self.inner.lock();
        if inner.spectating == Some(room_id) {
            inner.spectating = None;
        }
    }

    /// Arm the bracket ready-acknowledgment for this player, replacing any
    /// stale one from an abandoned prompt.
    pub fn arm_ready_ack(&self, tx: oneshot::Sender<()>) {
        self.inner.lock().ready_ack = Some(tx);
    }

    /// Consume the armed acknowledgment, if any
    pub fn take_ready_ack(&self) -> Option<oneshot::Sender<()>> {
        self.inner.lock().ready_ack.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_is_alive_without_a_connection() {
        let bot = Player::new_bot("Bot 1".into(), "classic".into());
        assert!(bot.is_alive());
        assert!(!bot.send(ServerEnvelope::notif(
            crate::ws::protocol::NotifLevel::Info,
            "ignored"
        )));
    }

    #[test]
    fn human_liveness_follows_the_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Player::new_human(Uuid::new_v4(), "alice".into(), tx);
        assert!(player.is_alive());

        drop(rx);
        assert!(!player.is_alive());

        player.detach();
        assert!(!player.is_alive());

        let (tx2, _rx2) = mpsc::unbounded_channel();
        player.attach(tx2, "alice".into());
        assert!(player.is_alive());
    }

    #[test]
    fn room_backref_clears_only_on_match() {
        let player = Player::new_bot("Bot 2".into(), String::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        player.set_room(Some(a));
        player.clear_room_if(b);
        assert_eq!(player.room(), Some(a));

        player.clear_room_if(a);
        assert_eq!(player.room(), None);
    }
}
