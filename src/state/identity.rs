use dashmap::DashMap;
use uuid::Uuid;

/// Process-local identifier of a transport connection.
pub type ConnectionId = Uuid;

/// Role a connection authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Player,
}

/// Room, role and token triple a connection registered with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub pin: String,
    pub role: Role,
    pub token: Uuid,
}

impl Identity {
    pub fn host(pin: impl Into<String>, token: Uuid) -> Self {
        Self {
            pin: pin.into(),
            role: Role::Host,
            token,
        }
    }

    pub fn player(pin: impl Into<String>, token: Uuid) -> Self {
        Self {
            pin: pin.into(),
            role: Role::Player,
            token,
        }
    }
}

/// Weak connection -> identity index.
///
/// Nothing here is durable: a restart empties the registry and clients rebuild
/// their entries through the reconnect events.
#[derive(Default)]
pub struct IdentityRegistry {
    entries: DashMap<ConnectionId, Identity>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` to `identity`, replacing whatever it was bound to before.
    pub fn register(&self, connection: ConnectionId, identity: Identity) -> Option<Identity> {
        self.entries.insert(connection, identity)
    }

    pub fn remove(&self, connection: ConnectionId) -> Option<Identity> {
        self.entries.remove(&connection).map(|(_, identity)| identity)
    }

    /// Whether `connection` registered as exactly this role, pin and token.
    pub fn is_registered_as(&self, connection: ConnectionId, identity: &Identity) -> bool {
        self.entries
            .get(&connection)
            .is_some_and(|entry| entry.value() == identity)
    }

    /// Whether any live connection still carries `identity`.
    pub fn is_live(&self, identity: &Identity) -> bool {
        self.entries.iter().any(|entry| entry.value() == identity)
    }

    /// Unbind every connection registered under `pin`, returning how many were dropped.
    pub fn forget_pin(&self, pin: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, identity| identity.pin != pin);
        before.saturating_sub(self.entries.len())
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_scoped_to_the_exact_triple() {
        let registry = IdentityRegistry::new();
        let connection = Uuid::new_v4();
        let token = Uuid::new_v4();
        registry.register(connection, Identity::host("123456", token));

        assert!(registry.is_registered_as(connection, &Identity::host("123456", token)));
        assert!(!registry.is_registered_as(connection, &Identity::player("123456", token)));
        assert!(!registry.is_registered_as(connection, &Identity::host("654321", token)));
        assert!(!registry.is_registered_as(
            connection,
            &Identity::host("123456", Uuid::new_v4())
        ));
        assert!(!registry.is_registered_as(Uuid::new_v4(), &Identity::host("123456", token)));
    }

    #[test]
    fn liveness_tracks_every_connection_of_an_identity() {
        let registry = IdentityRegistry::new();
        let identity = Identity::player("123456", Uuid::new_v4());
        let (old, new) = (Uuid::new_v4(), Uuid::new_v4());
        registry.register(old, identity.clone());
        registry.register(new, identity.clone());

        assert_eq!(registry.remove(old), Some(identity.clone()));
        assert!(registry.is_live(&identity));

        registry.remove(new);
        assert!(!registry.is_live(&identity));
        assert!(registry.is_empty());
    }

    #[test]
    fn forgetting_a_pin_keeps_other_rooms() {
        let registry = IdentityRegistry::new();
        let closed = Identity::player("123456", Uuid::new_v4());
        let open = Identity::host("654321", Uuid::new_v4());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        registry.register(a, closed.clone());
        registry.register(b, Identity::host("123456", Uuid::new_v4()));
        registry.register(c, open.clone());

        assert_eq!(registry.forget_pin("123456"), 2);
        assert!(!registry.is_live(&closed));
        assert!(registry.is_registered_as(c, &open));
    }
}
