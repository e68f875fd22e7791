/// Callbacks a game or gate process implements to react to dispatcher-cluster events: packet
/// delivery, disconnect notice, and the per-shard ownership query used to re-announce live
/// entities after a reconnect.
pub trait DispatcherDelegate {
    fn handle_dispatcher_packet(&mut self, shard_id: u16, msg_type: u16, payload: &[u8]);

    /// Called when the connection to a shard is lost. Gates treat this as fatal and shut down;
    /// games log and keep retrying via the owning `DispatcherClient`'s backoff.
    fn handle_dispatcher_disconnect(&mut self, shard_id: u16);

    /// Entity ids this process currently owns that are routed through `shard_id`. Empty for
    /// gates, which hold no entity state of their own.
    fn entity_ids_for_shard(&self, shard_id: u16) -> Vec<u128>;
}
