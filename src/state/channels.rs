use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{dto::ws::ServerMessage, state::identity::ConnectionId};

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ClientConnection {
    pub id: ConnectionId,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Live connections and the per-room broadcast groups they joined.
///
/// Delivery is fire-and-forget: closed channels are skipped and cleaned up when
/// their connection unregisters.
#[derive(Default)]
pub struct RoomChannels {
    connections: DashMap<ConnectionId, ClientConnection>,
    groups: DashMap<String, HashSet<ConnectionId>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a connection addressable.
    pub fn register(&self, connection: ClientConnection) {
        self.connections.insert(connection.id, connection);
    }

    /// Forget a connection and remove it from every group.
    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);
        self.leave_all(id);
    }

    /// Put a connection into the broadcast group of `pin`, leaving any other group.
    pub fn join(&self, pin: &str, id: ConnectionId) {
        self.leave_all(id);
        self.groups.entry(pin.to_owned()).or_default().insert(id);
    }

    /// Send a message to one connection. Returns `false` if it is gone.
    pub fn send(&self, id: ConnectionId, message: ServerMessage) -> bool {
        let Some(tx) = self.connections.get(&id).map(|conn| conn.tx.clone()) else {
            return false;
        };
        tx.send(message).is_ok()
    }

    /// Send a message to every connection of a room, returning how many received it.
    pub fn broadcast(&self, pin: &str, message: &ServerMessage) -> usize {
        let members: Vec<ConnectionId> = match self.groups.get(pin) {
            Some(group) => group.iter().copied().collect(),
            None => return 0,
        };

        let delivered = members
            .into_iter()
            .filter(|id| self.send(*id, message.clone()))
            .count();
        debug!(pin, delivered, "room broadcast");
        delivered
    }

    /// Disband the group of `pin`, returning how many connections it held.
    ///
    /// Connections stay registered; they just stop receiving that room's broadcasts.
    pub fn close_group(&self, pin: &str) -> usize {
        self.groups.remove(pin).map_or(0, |(_, group)| group.len())
    }

    #[cfg(test)]
    fn members(&self, pin: &str) -> usize {
        self.groups.get(pin).map_or(0, |group| group.len())
    }

    fn leave_all(&self, id: ConnectionId) {
        self.groups.iter_mut().for_each(|mut group| {
            group.remove(&id);
        });
        self.groups.retain(|_, group| !group.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn connect(channels: &RoomChannels) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        channels.register(ClientConnection { id, tx });
        (id, rx)
    }

    #[test]
    fn broadcast_reaches_only_group_members() {
        let channels = RoomChannels::new();
        let (a, mut rx_a) = connect(&channels);
        let (b, mut rx_b) = connect(&channels);
        let (_c, mut rx_c) = connect(&channels);
        channels.join("111111", a);
        channels.join("111111", b);

        let message = ServerMessage::PlayerJoined { name: "Alice".into() };
        assert_eq!(channels.broadcast("111111", &message), 2);

        assert_eq!(rx_a.try_recv().unwrap(), message);
        assert_eq!(rx_b.try_recv().unwrap(), message);
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn joining_another_room_leaves_the_previous_one() {
        let channels = RoomChannels::new();
        let (a, _rx) = connect(&channels);
        channels.join("111111", a);
        channels.join("222222", a);

        assert_eq!(channels.members("111111"), 0);
        assert_eq!(channels.members("222222"), 1);

        channels.unregister(a);
        assert_eq!(channels.members("222222"), 0);
        assert!(!channels.send(a, ServerMessage::PlayerJoined { name: "x".into() }));
    }

    #[test]
    fn closed_groups_stop_receiving_broadcasts() {
        let channels = RoomChannels::new();
        let (a, mut rx_a) = connect(&channels);
        channels.join("111111", a);

        assert_eq!(channels.close_group("111111"), 1);
        assert_eq!(channels.close_group("111111"), 0);
        let message = ServerMessage::PlayerJoined { name: "Bob".into() };
        assert_eq!(channels.broadcast("111111", &message), 0);
        assert!(rx_a.try_recv().is_err());
        assert!(channels.send(a, message));
    }
}
