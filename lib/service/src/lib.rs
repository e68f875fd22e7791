pub mod srvdis;

pub use srvdis::{service_entity_path, service_path, Entry, RegisterOutcome, Registry, SERVICE_PREFIX};
