use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use tokio::sync::oneshot;

use caesar::replica::ClientNotifier;
use caesar::request::ClientId;
use caesar::request::Request;
use caesar::request::RequestId;
use caesar::request::SeqNumber;
use caesar::request::FIRST_SEQ;
use caesar::ReplicaId;

/// ClientManager tracks the requests submitted by the clients of one replica.
///
/// It hands out request ids, one sequence per client starting at `FIRST_SEQ`, and resolves the waiter of
/// a request when the replica executes it. Requests of other replicas' clients are executed here
/// too: they only bump the executed counter.
pub struct ClientManager {
    me: ReplicaId,
    seqs: Mutex<HashMap<ClientId, SeqNumber>>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<RequestId>>>,
    n_executed: AtomicU64,
    n_completed: AtomicU64,
}

impl ClientManager {
    pub fn new(me: ReplicaId) -> ClientManager {
        ClientManager {
            me,
            seqs: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            n_executed: AtomicU64::new(0),
            n_completed: AtomicU64::new(0),
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.me
    }

    /// next_request_id returns the next id of a client.
    pub fn next_request_id(&self, client_id: ClientId) -> RequestId {
        let mut seqs = self.seqs.lock().unwrap_or_else(|e| e.into_inner());
        let seq = seqs.entry(client_id).or_insert(FIRST_SEQ);
        let rid = RequestId::new(client_id, *seq);
        *seq += 1;
        rid
    }

    /// wait_for registers a request as pending. The returned receiver resolves once the
    /// replica executed it. Registering an id twice replaces the first waiter.
    pub fn wait_for(&self, rid: RequestId) -> oneshot::Receiver<RequestId> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(rid, tx);
        rx
    }

    pub fn n_pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// n_executed is the number of requests this replica executed, from any client.
    pub fn n_executed(&self) -> u64 {
        self.n_executed.load(Ordering::Relaxed)
    }

    /// n_completed is the number of local pending requests that completed.
    pub fn n_completed(&self) -> u64 {
        self.n_completed.load(Ordering::Relaxed)
    }
}

impl ClientNotifier for ClientManager {
    fn notify_client(&self, r: &Request) {
        self.n_executed.fetch_add(1, Ordering::Relaxed);

        let rid = r.id();
        let tx = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&rid)
        };

        if let Some(tx) = tx {
            self.n_completed.fetch_add(1, Ordering::Relaxed);
            if tx.send(rid).is_err() {
                debug!("replica {}: client of {} is gone", self.me, rid);
            }
        }
    }
}
