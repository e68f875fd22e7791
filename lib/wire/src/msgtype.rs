//! Message type ids carried in a frame's `u16` header field. Shared by every node so a packet's
//! purpose can be decided before its payload is even deserialized.

pub const HANDSHAKE_GAME: u16 = 1;
pub const HANDSHAKE_GATE: u16 = 2;
pub const HANDSHAKE_GAME_RESTORE: u16 = 3;
pub const HANDSHAKE_PEER: u16 = 4;

pub const ENTITY_ANNOUNCE: u16 = 10;
pub const PACKET_FORWARD: u16 = 11;
pub const ENTITY_UNKNOWN: u16 = 12;
pub const ENTITY_RETRACT: u16 = 13;

pub const ENTITY_CALL: u16 = 14;
/// `[gate_id u16][inner_type u16][inner_payload]`. A game-to-gate analog of `PACKET_FORWARD`:
/// the dispatcher unwraps the envelope and hands `inner_type`/`inner_payload` straight to the
/// named gate's connection. Used for directives addressed to a specific client (bind, filter-set)
/// since those target one gate, not an EntityID's owning game.
pub const GATE_FORWARD: u16 = 15;

/// `[target_gid u16][inner_type u16][inner_payload]`. A game-to-game analog of `GATE_FORWARD`:
/// the dispatcher unwraps the envelope and hands `inner_type`/`inner_payload` straight to the
/// named game's connection. Used for `CreateEntitySomewhere`, which has to reach a specific game
/// before that game has announced the entity and `PACKET_FORWARD`'s owner lookup has anything to
/// route by.
pub const GAME_FORWARD: u16 = 16;
/// Inner payload carried inside a `GAME_FORWARD` envelope:
/// `[type_name_len u16][type_name][entity_id 16][persistent u8]`. Asks the receiving game to
/// create an entity of the given type at the given id.
pub const ENTITY_CREATE_REQUEST: u16 = 17;

pub const SERVICE_REGISTER: u16 = 20;
pub const SERVICE_GOSSIP: u16 = 21;
pub const SERVICE_REGISTER_ENTITY_ID: u16 = 22;

pub const LBC_REPORT: u16 = 30;

pub const CLIENT_BIND: u16 = 40;
pub const CLIENT_FILTER_SET: u16 = 41;
pub const BROADCAST_FILTER: u16 = 42;
pub const CLIENT_DISCONNECT: u16 = 43;
pub const CLIENT_INBOUND: u16 = 44;
