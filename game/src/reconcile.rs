use std::time::{Duration, Instant};

use entity::{Entity, EntityId, EntityRegistry};
use hashbrown::HashMap;
use rand::Rng;
use rtlog::{warn, Logger};
use service::{service_entity_path, service_path, Registry, SERVICE_PREFIX};

const CHECK_INTERVAL: Duration = Duration::from_secs(60);
const RANDOM_DELAY_MAX_MS: u64 = 100;

/// Read side of persistence that reconciliation needs: whether a persistent service entity from
/// a prior run already exists in storage. Implemented by `PersistenceQueue` so there's a single
/// owner of the storage backend connection; this trait keeps that coupling one-directional.
pub trait PersistentLookup {
    fn list_entity_ids(&self, type_name: &'static str) -> Vec<EntityId>;
}

/// A service type this game process knows how to host -- its entity type name doubles as the
/// service name (`Service/<name>`).
#[derive(Debug, Clone, Copy)]
pub struct ServiceType {
    pub name: &'static str,
    pub persistent: bool,
}

/// Side effects the caller must perform after a reconciliation pass: entity creation/destruction
/// already happened against the local registry, but publishing to the dispatcher's registry and
/// announcing newly created entities cross the network boundary.
#[derive(Debug)]
pub enum ReconcileAction {
    Register { name: String, entity_id: EntityId, excl: bool },
    ScheduleRegister { name: String, at: Instant },
    Announce(EntityId),
}

pub struct ServiceReconciler {
    gid: u16,
    types: Vec<ServiceType>,
    next_check: Instant,
    scheduled: HashMap<String, Instant>,
    log: Logger,
}

impl ServiceReconciler {
    pub fn new(gid: u16, types: Vec<ServiceType>, now: Instant, log: Logger) -> ServiceReconciler {
        ServiceReconciler { gid, types, next_check: now, scheduled: HashMap::new(), log }
    }

    pub fn add_type(&mut self, svc_type: ServiceType) {
        self.types.push(svc_type);
    }

    /// Event-triggered reconciliation: called whenever the registry changes (a gossip update
    /// arrives) so convergence doesn't wait for the next periodic tick.
    pub fn trigger_now(&mut self, now: Instant) {
        self.next_check = now;
    }

    pub fn due(&self, now: Instant) -> bool {
        now >= self.next_check
    }

    /// Runs one full reconciliation pass. `registry` is this game's mirror of the dispatcher's
    /// `Service/*` registry, kept current by gossip frames from the dispatcher connections.
    pub fn reconcile(
        &mut self,
        now: Instant,
        registry: &Registry,
        entities: &mut EntityRegistry,
        storage: &dyn PersistentLookup,
    ) -> Vec<ReconcileAction> {
        self.next_check = now + CHECK_INTERVAL;
        let mut actions = Vec::new();

        let (disp_registered, disp_entity_ids) = self.scan_registry(registry);
        let need_local: Vec<&ServiceType> = self
            .types
            .iter()
            .filter(|t| disp_registered.get(t.name) == Some(&self.gid))
            .collect();
        let need_local_names: Vec<&str> = need_local.iter().map(|t| t.name).collect();

        // Destroy local entities of service types we no longer own.
        for svc_type in &self.types {
            if need_local_names.contains(&svc_type.name) {
                continue;
            }
            for id in entities.ids_of_type(svc_type.name) {
                entities.destroy(id);
            }
        }

        // Reconcile each type we are supposed to host.
        for svc_type in need_local {
            let local_ids = entities.ids_of_type(svc_type.name);
            let registered_id = disp_entity_ids.get(svc_type.name).copied();

            match local_ids.len() {
                0 => {
                    if let Some(id) = self.create_service_entity(svc_type, entities, storage) {
                        actions.push(ReconcileAction::Announce(id));
                        actions.push(ReconcileAction::Register {
                            name: svc_type.name.to_string(),
                            entity_id: id,
                            excl: true,
                        });
                    }
                }
                1 => {
                    let local_id = local_ids[0];
                    if registered_id != Some(local_id) {
                        actions.push(ReconcileAction::Register {
                            name: svc_type.name.to_string(),
                            entity_id: local_id,
                            excl: true,
                        });
                    }
                }
                _ => {
                    for id in local_ids {
                        if registered_id != Some(id) {
                            entities.destroy(id);
                        }
                    }
                }
            }
        }

        // Schedule registration for any known type not registered to any game yet.
        for svc_type in &self.types {
            if disp_registered.contains_key(svc_type.name) {
                self.scheduled.remove(svc_type.name);
                continue;
            }
            if self.scheduled.contains_key(svc_type.name) {
                continue;
            }

            let delay_ms = rand::thread_rng().gen_range(0..RANDOM_DELAY_MAX_MS);
            let at = now + Duration::from_millis(delay_ms);
            self.scheduled.insert(svc_type.name.to_string(), at);
            actions.push(ReconcileAction::ScheduleRegister { name: svc_type.name.to_string(), at });
        }

        actions
    }

    /// Drains scheduled registrations whose randomized delay has elapsed.
    pub fn due_registrations(&mut self, now: Instant) -> Vec<String> {
        let mut due = Vec::new();
        self.scheduled.retain(|name, at| {
            if now >= *at {
                due.push(name.clone());
                false
            } else {
                true
            }
        });
        due
    }

    fn scan_registry(&self, registry: &Registry) -> (HashMap<String, u16>, HashMap<String, EntityId>) {
        let mut registered = HashMap::new();
        let mut entity_ids = HashMap::new();

        for (path, entry) in registry.traverse_by_prefix(SERVICE_PREFIX) {
            let rest = &path[SERVICE_PREFIX.len()..];
            if let Some(name) = rest.strip_suffix("/EntityID") {
                if let Ok(bytes) = hex::decode(&entry.value) {
                    if bytes.len() == 16 {
                        let mut arr = [0u8; 16];
                        arr.copy_from_slice(&bytes);
                        entity_ids.insert(name.to_string(), EntityId::from_be_bytes(arr));
                    }
                }
            } else if !rest.contains('/') {
                if let Some(gid) = entry.value.strip_prefix("game").and_then(|g| g.parse::<u16>().ok()) {
                    registered.insert(rest.to_string(), gid);
                }
            } else {
                warn!(self.log, "ignoring unrecognized service registry sub-path"; "path" => %path);
            }
        }

        (registered, entity_ids)
    }

    fn create_service_entity(
        &self,
        svc_type: &ServiceType,
        entities: &mut EntityRegistry,
        storage: &dyn PersistentLookup,
    ) -> Option<EntityId> {
        let nil_space = entity::EntityId::nil_space_for_game(self.gid);

        if svc_type.persistent {
            if let Some(&id) = storage.list_entity_ids(svc_type.name).first() {
                let e = Entity::new(svc_type.name, id, nil_space, true);
                return entities.create_locally(e).ok();
            }
        }

        let id = EntityId::generate();
        let e = Entity::new(svc_type.name, id, nil_space, svc_type.persistent);
        entities.create_locally(e).ok()
    }
}

pub fn service_register_frame(name: &str, entity_id: EntityId, excl: bool) -> (String, String, bool) {
    (service_path(name), hex::encode(entity_id.to_be_bytes()), excl)
}

pub fn service_entity_id_path(name: &str) -> String {
    service_entity_path(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtlog::{Level, Logger};
    use service::RegisterOutcome;
    use std::cell::RefCell;
    use std::collections::HashMap as StdHashMap;

    fn test_logger() -> Logger {
        rtlog::logging::init("reconcile-test", Level::Error)
    }

    #[derive(Default)]
    struct MockStorage {
        data: RefCell<StdHashMap<&'static str, Vec<EntityId>>>,
    }

    impl PersistentLookup for MockStorage {
        fn list_entity_ids(&self, type_name: &'static str) -> Vec<EntityId> {
            self.data.borrow().get(type_name).cloned().unwrap_or_default()
        }
    }

    fn registry_with_entities() -> EntityRegistry {
        let mut reg = EntityRegistry::new();
        reg.register_type("Matchmaker", false);
        reg
    }

    #[test]
    fn creates_local_entity_when_needed_and_absent() {
        let mut disp = Registry::new();
        disp.register("Service/Matchmaker", "game1", 1, false);

        let mut entities = registry_with_entities();
        let mut storage = MockStorage::default();
        let mut reconciler =
            ServiceReconciler::new(1, vec![ServiceType { name: "Matchmaker", persistent: false }], Instant::now(), test_logger());

        let actions = reconciler.reconcile(Instant::now(), &disp, &mut entities, &storage);

        assert_eq!(entities.count_of_type("Matchmaker"), 1);
        assert!(actions.iter().any(|a| matches!(a, ReconcileAction::Announce(_))));
        assert!(actions.iter().any(|a| matches!(a, ReconcileAction::Register { excl: true, .. })));
    }

    #[test]
    fn destroys_local_entity_of_type_not_assigned_here() {
        let disp = Registry::new();

        let mut entities = registry_with_entities();
        entities.create_locally(Entity::new("Matchmaker", EntityId::generate(), EntityId::nil_space_for_game(1), false)).unwrap();

        let mut storage = MockStorage::default();
        let mut reconciler =
            ServiceReconciler::new(1, vec![ServiceType { name: "Matchmaker", persistent: false }], Instant::now(), test_logger());

        reconciler.reconcile(Instant::now(), &disp, &mut entities, &storage);

        assert_eq!(entities.count_of_type("Matchmaker"), 0);
    }

    #[test]
    fn republishes_when_registry_disagrees_with_local_entity() {
        let mut disp = Registry::new();
        disp.register("Service/Matchmaker", "game1", 1, false);
        disp.register("Service/Matchmaker/EntityID", hex::encode(EntityId::generate().to_be_bytes()), 1, false);

        let mut entities = registry_with_entities();
        let local_id = entities
            .create_locally(Entity::new("Matchmaker", EntityId::generate(), EntityId::nil_space_for_game(1), false))
            .unwrap();

        let mut storage = MockStorage::default();
        let mut reconciler =
            ServiceReconciler::new(1, vec![ServiceType { name: "Matchmaker", persistent: false }], Instant::now(), test_logger());

        let actions = reconciler.reconcile(Instant::now(), &disp, &mut entities, &storage);

        assert!(actions.iter().any(|a| matches!(
            a,
            ReconcileAction::Register { entity_id, excl: true, .. } if *entity_id == local_id
        )));
    }

    #[test]
    fn schedules_randomized_registration_for_unclaimed_service() {
        let disp = Registry::new();
        let mut entities = registry_with_entities();
        let mut storage = MockStorage::default();
        let now = Instant::now();
        let mut reconciler = ServiceReconciler::new(1, vec![ServiceType { name: "Matchmaker", persistent: false }], now, test_logger());

        let actions = reconciler.reconcile(now, &disp, &mut entities, &storage);
        assert!(actions.iter().any(|a| matches!(a, ReconcileAction::ScheduleRegister { .. })));

        let future = now + Duration::from_millis(RANDOM_DELAY_MAX_MS + 1);
        let due = reconciler.due_registrations(future);
        assert_eq!(due, vec!["Matchmaker".to_string()]);
    }

    #[test]
    fn register_outcome_reexport_compiles() {
        let mut reg = Registry::new();
        let outcome = reg.register("Service/X", "game1", 1, false);
        assert_eq!(outcome, RegisterOutcome::Registered);
    }
}
