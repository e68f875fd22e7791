use std::time::Instant;

use entity::{ClientId, EntityId};
use netfabric::ConnId;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProxyState {
    Connected,
    Bound,
    Closing,
    Closed,
}

/// Per-connection state the gate's single consumer owns. `filter_keys` tracks every `(key,
/// value)` this proxy is currently indexed under so `GateService::remove_client` can clean up
/// the inverted index without a reverse scan.
pub struct ClientProxy {
    pub client_id: ClientId,
    pub conn_id: ConnId,
    pub state: ProxyState,
    pub entity_id: Option<EntityId>,
    pub last_heartbeat: Instant,
    pub filter_keys: Vec<(String, String)>,
}

impl ClientProxy {
    pub fn new(client_id: ClientId, conn_id: ConnId, now: Instant) -> ClientProxy {
        ClientProxy {
            client_id,
            conn_id,
            state: ProxyState::Connected,
            entity_id: None,
            last_heartbeat: now,
            filter_keys: Vec::new(),
        }
    }

    pub fn bind(&mut self, entity_id: EntityId) {
        self.entity_id = Some(entity_id);
        self.state = ProxyState::Bound;
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }

    pub fn is_stale(&self, now: Instant, heart_interval: std::time::Duration) -> bool {
        now.duration_since(self.last_heartbeat) > heart_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn binding_transitions_connected_to_bound() {
        let mut proxy = ClientProxy::new(ClientId::from_be_bytes([0; 8]), 0, Instant::now());
        assert_eq!(proxy.state, ProxyState::Connected);

        proxy.bind(EntityId::generate());
        assert_eq!(proxy.state, ProxyState::Bound);
        assert!(proxy.entity_id.is_some());
    }

    #[test]
    fn staleness_is_relative_to_last_heartbeat() {
        let now = Instant::now();
        let proxy = ClientProxy::new(ClientId::from_be_bytes([0; 8]), 0, now);

        assert!(!proxy.is_stale(now + Duration::from_secs(5), Duration::from_secs(10)));
        assert!(proxy.is_stale(now + Duration::from_secs(11), Duration::from_secs(10)));
    }
}
