use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use entity::EntityId;
use rtlog::{error, o, warn, Logger};
use storage::EntityStore;

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct SaveJob {
    type_name: &'static str,
    id: EntityId,
    data: Vec<u8>,
}

enum Job {
    Save(SaveJob),
    /// Reconciliation's "0 local copies of a persistent service" case needs to know whether a
    /// prior incarnation's entity is already in storage. Routed through the same worker as
    /// writes so there's one owner of the backend connection; the caller blocks on the reply,
    /// which is fine off the hot path (reconciliation runs once a minute).
    ListEntityIds { type_name: &'static str, reply: Sender<Vec<EntityId>> },
}

/// Submits dirty entities to a background flusher thread. `pending()` lets the shutdown path
/// wait for the queue to drain before the process exits, per the persistence invariant: a
/// persistent dirty entity's write must complete before the game exits cleanly.
pub struct PersistenceQueue {
    sender: Sender<Job>,
    pending: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl PersistenceQueue {
    pub fn spawn(mut store: Box<dyn EntityStore>, log: Logger) -> PersistenceQueue {
        let (sender, receiver) = mpsc::channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = pending.clone();
        let worker_log = log.new(o!("component" => "persistence"));

        let handle = std::thread::spawn(move || {
            let mut retry: Vec<SaveJob> = Vec::new();

            loop {
                let mut batch = std::mem::take(&mut retry);
                let mut disconnected = false;

                match receiver.recv_timeout(FLUSH_POLL_INTERVAL) {
                    Ok(Job::Save(job)) => batch.push(job),
                    Ok(Job::ListEntityIds { type_name, reply }) => {
                        let _ = reply.send(store.list_entity_ids(type_name).unwrap_or_default());
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => disconnected = true,
                }

                while let Ok(job) = receiver.try_recv() {
                    match job {
                        Job::Save(job) => batch.push(job),
                        Job::ListEntityIds { type_name, reply } => {
                            let _ = reply.send(store.list_entity_ids(type_name).unwrap_or_default());
                        }
                    }
                }

                for job in batch {
                    match store.write(job.type_name, job.id, &job.data) {
                        Ok(()) => {
                            worker_pending.fetch_sub(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            error!(worker_log, "entity write failed, will retry"; "type" => job.type_name, "id" => %job.id, "error" => %e);
                            retry.push(job);
                        }
                    }
                }

                if disconnected && retry.is_empty() {
                    break;
                }
            }

            if !retry.is_empty() {
                warn!(worker_log, "persistence worker exiting with unflushed writes"; "count" => retry.len());
            }
        });

        PersistenceQueue { sender, pending, handle: Some(handle) }
    }

    pub fn enqueue(&self, type_name: &'static str, id: EntityId, data: Vec<u8>) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // The receiver only disconnects once this queue is dropped, so a failed send here would
        // mean the caller kept using the queue past shutdown -- a programming error.
        self.sender.send(Job::Save(SaveJob { type_name, id, data })).expect("persistence worker is still alive");
    }

    /// Blocks waiting for the worker's answer. Only called from service reconciliation, which
    /// runs at most once a minute -- not the hot path the "don't block the main consumer" rule
    /// is protecting.
    pub fn list_entity_ids(&self, type_name: &'static str) -> Vec<EntityId> {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.sender.send(Job::ListEntityIds { type_name, reply: reply_tx }).is_err() {
            return Vec::new();
        }
        reply_rx.recv_timeout(Duration::from_secs(5)).unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Blocks until every outstanding write has completed, then joins the worker thread. Called
    /// on the terminating and freezing shutdown paths before the process exits.
    pub fn drain_and_join(mut self) {
        while self.pending_count() > 0 {
            std::thread::sleep(Duration::from_millis(10));
        }
        let handle = self.handle.take();
        drop(self.sender);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl crate::reconcile::PersistentLookup for PersistenceQueue {
    fn list_entity_ids(&self, type_name: &'static str) -> Vec<EntityId> {
        PersistenceQueue::list_entity_ids(self, type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtlog::{Level, Logger};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct CountingStore {
        writes: Arc<Mutex<HashMap<(String, EntityId), Vec<u8>>>>,
    }

    impl EntityStore for CountingStore {
        fn write(&mut self, type_name: &str, id: EntityId, data: &[u8]) -> Result<(), storage::StorageError> {
            self.writes.lock().unwrap().insert((type_name.to_string(), id), data.to_vec());
            Ok(())
        }
        fn read(&mut self, type_name: &str, id: EntityId) -> Result<Vec<u8>, storage::StorageError> {
            self.writes
                .lock()
                .unwrap()
                .get(&(type_name.to_string(), id))
                .cloned()
                .ok_or(storage::StorageError::NotFound)
        }
        fn exists(&mut self, type_name: &str, id: EntityId) -> Result<bool, storage::StorageError> {
            Ok(self.writes.lock().unwrap().contains_key(&(type_name.to_string(), id)))
        }
        fn list_entity_ids(&mut self, type_name: &str) -> Result<Vec<EntityId>, storage::StorageError> {
            Ok(self.writes.lock().unwrap().keys().filter(|(t, _)| t == type_name).map(|(_, id)| *id).collect())
        }
    }

    fn test_logger() -> Logger {
        rtlog::logging::init("persistence-test", Level::Error)
    }

    #[test]
    fn enqueued_writes_drain_to_zero_pending() {
        let writes = Arc::new(Mutex::new(HashMap::new()));
        let store = Box::new(CountingStore { writes: writes.clone() });
        let queue = PersistenceQueue::spawn(store, test_logger());

        let id = EntityId::generate();
        queue.enqueue("Avatar", id, b"payload".to_vec());
        queue.drain_and_join();

        assert!(writes.lock().unwrap().contains_key(&("Avatar".to_string(), id)));
    }
}
