pub mod attr;
pub mod client_id;
pub mod entity;
pub mod entity_id;
pub mod registry;
pub mod space;

pub use attr::{Attr, AttrMap};
pub use client_id::{ClientId, ClientIdGenerator};
pub use entity::{Entity, LifecycleState};
pub use entity_id::EntityId;
pub use registry::{EntityRegistry, RegistryError, TypeDescriptor};
pub use space::{new_nil_space, SpaceKind, NIL_SPACE_KIND, NIL_SPACE_TYPE};
