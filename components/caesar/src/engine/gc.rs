use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::mem;

use super::Caesar;
use super::HandlerError;
use super::Output;
use crate::message::Collect;
use crate::message::Message;
use crate::replication::ReplicationError;
use crate::request::ClientId;
use crate::request::RequestId;
use crate::request::SeqNumber;
use crate::request::FIRST_SEQ;
use crate::ReplicaId;

/// ClientRetired is the retired requests of one client: every sequence number from `FIRST_SEQ`
/// below `next`, and the ones in `others`.
#[derive(Debug)]
struct ClientRetired {
    next: SeqNumber,

    /// Retired out of order, above `next` or below `FIRST_SEQ`.
    others: BTreeSet<SeqNumber>,
}

impl Default for ClientRetired {
    fn default() -> Self {
        ClientRetired {
            next: FIRST_SEQ,
            others: BTreeSet::new(),
        }
    }
}

impl ClientRetired {
    fn contains(&self, seq: SeqNumber) -> bool {
        (seq >= FIRST_SEQ && seq < self.next) || self.others.contains(&seq)
    }

    fn insert(&mut self, seq: SeqNumber) {
        if seq != self.next {
            self.others.insert(seq);
            return;
        }

        self.next += 1;
        while self.others.remove(&self.next) {
            self.next += 1;
        }
    }
}

/// Collector tracks which replicas executed which requests.
/// A request executed by every replica is retired: nothing will ever wait for it again.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    /// Executed locally and not yet announced.
    pending: Vec<RequestId>,

    executed_by: HashMap<RequestId, HashSet<ReplicaId>>,

    retired: HashMap<ClientId, ClientRetired>,
    n_retired: usize,
}

impl Collector {
    pub fn is_retired(&self, rid: &RequestId) -> bool {
        match self.retired.get(&rid.client_id) {
            Some(c) => c.contains(rid.seq_number),
            None => false,
        }
    }

    fn insert_retired(&mut self, rid: RequestId) {
        self.retired
            .entry(rid.client_id)
            .or_default()
            .insert(rid.seq_number);
        self.n_retired += 1;
    }

    pub fn n_retired(&self) -> usize {
        self.n_retired
    }

    /// n_out_of_order returns the number of retired ids not covered by a client watermark.
    pub fn n_out_of_order(&self) -> usize {
        self.retired.values().map(|c| c.others.len()).sum()
    }
}

impl Caesar {
    pub fn n_retired(&self) -> usize {
        self.collector.n_retired()
    }

    /// collect queues a locally executed request to be announced.
    pub(crate) fn collect(&mut self, rid: RequestId, out: &mut Output) {
        self.collector.pending.push(rid);
        if self.collector.pending.len() >= self.conf.gc_batch {
            self.flush_collect(out);
        }
    }

    pub(crate) fn flush_collect(&mut self, out: &mut Output) {
        if self.collector.pending.is_empty() {
            return;
        }
        let executed = mem::take(&mut self.collector.pending);
        out.broadcast(Message::collect(0, executed));
    }

    pub(crate) fn handle_collect(
        &mut self,
        from: ReplicaId,
        m: Collect,
    ) -> Result<(), HandlerError> {
        let n = self.conf.n_replicas();
        if from >= n {
            return Err(ReplicationError::NoSuchReplica(from, n).into());
        }

        for rid in m.executed.into_iter() {
            if self.collector.is_retired(&rid) {
                continue;
            }

            let replicas = self.collector.executed_by.entry(rid).or_default();
            replicas.insert(from);
            if replicas.len() == n {
                self.retire(rid);
            }
        }
        Ok(())
    }

    /// retire removes a request executed by every replica.
    /// Its position stays as a watermark on its objects.
    fn retire(&mut self, rid: RequestId) {
        self.collector.executed_by.remove(&rid);
        self.collector.insert_retired(rid);

        if let Some(t) = self.requests.remove(&rid) {
            self.index.retire(&t.request);
        }
        self.promised.remove(&rid);
        self.rounds.remove(&rid);
        self.recoveries.remove(&rid);
        self.delivery.forget(&rid);

        debug!("replica {}: retired {}", self.me, rid);
    }
}
