use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Instant;

use super::Caesar;
use super::OrderKey;
use super::Output;
use crate::request::RequestId;
use crate::request::RequestStatus;

/// DeliveryQueue holds stable requests that wait for their predecessors.
#[derive(Debug, Default)]
pub(crate) struct DeliveryQueue {
    /// blocked[p] are the requests waiting for predecessor p.
    blocked: HashMap<RequestId, BTreeSet<RequestId>>,

    /// Predecessors not tracked by this replica and since when a request waits for them.
    unknown: HashMap<RequestId, Instant>,

    /// Requests handed to the application and not yet executed.
    released: HashSet<RequestId>,
}

impl DeliveryQueue {
    fn block(&mut self, pred: RequestId, rid: RequestId) {
        self.blocked.entry(pred).or_default().insert(rid);
    }

    pub fn unknown_preds(&self) -> Vec<(RequestId, Instant)> {
        self.unknown.iter().map(|(rid, t)| (*rid, *t)).collect()
    }

    /// forget drops everything about a retired request.
    pub fn forget(&mut self, rid: &RequestId) {
        self.blocked.remove(rid);
        self.unknown.remove(rid);
        self.released.remove(rid);
    }

    pub fn n_blocked(&self) -> usize {
        self.blocked.values().map(|ws| ws.len()).sum()
    }
}

/// Why a predecessor does not hold a request back.
enum Settled {
    Yes,
    No,
    Unknown,
}

impl Caesar {
    /// on_executed is called after the application executed a delivered request.
    pub fn on_executed(&mut self, rid: RequestId, now: Instant) -> Output {
        let mut out = Output::default();

        self.delivery.released.remove(&rid);
        match self.requests.get_mut(&rid) {
            Some(t) => {
                t.request.set_status(RequestStatus::Executed);
                t.touched = now;
            }
            None => {
                warn!("replica {}: executed unknown request {}", self.me, rid);
                return out;
            }
        }

        debug!("replica {}: executed {}", self.me, rid);

        self.collect(rid, &mut out);
        self.wake(rid, now, &mut out);
        out
    }

    /// n_waiting returns the number of stable requests held back by predecessors.
    pub fn n_waiting(&self) -> usize {
        self.delivery.n_blocked()
    }

    /// on_stable releases a newly stable request if it can be, and wakes up requests that waited
    /// for it.
    pub(crate) fn on_stable(&mut self, rid: RequestId, now: Instant, out: &mut Output) {
        self.delivery.unknown.remove(&rid);
        self.try_release(rid, now, out);
        self.wake(rid, now, out);
    }

    fn wake(&mut self, rid: RequestId, now: Instant, out: &mut Output) {
        if let Some(waiting) = self.delivery.blocked.remove(&rid) {
            for w in waiting.into_iter() {
                self.try_release(w, now, out);
            }
        }
    }

    /// try_release hands a stable request to the application once every predecessor is
    /// settled. Otherwise the request waits for the first unsettled predecessor.
    /// Every unknown predecessor is recorded at once so that they are all recovered together.
    fn try_release(&mut self, rid: RequestId, now: Instant, out: &mut Output) {
        if self.delivery.released.contains(&rid) {
            return;
        }

        let r = match self.requests.get(&rid) {
            Some(t) if t.request.status() == RequestStatus::Stable => &t.request,
            _ => return,
        };

        let key = r.key();
        let mut blocker = None;
        let mut unknown = vec![];
        for p in r.pred().iter() {
            match self.settled(p, key) {
                Settled::Yes => continue,
                Settled::No => {}
                Settled::Unknown => unknown.push(*p),
            }
            if blocker.is_none() {
                blocker = Some(*p);
            }
        }

        for p in unknown.into_iter() {
            self.delivery.unknown.entry(p).or_insert(now);
        }

        match blocker {
            Some(p) => {
                self.delivery.block(p, rid);
            }
            None => {
                let r = r.clone();
                debug!("replica {}: deliver {}", self.me, r);
                self.delivery.released.insert(rid);
                out.deliver(r);
            }
        }
    }

    /// settled tells whether predecessor `p` no longer holds back a request at `key`:
    /// it is executed or retired, or it is stable and ordered after the request, in which case
    /// it has the request as its own predecessor.
    fn settled(&self, p: &RequestId, key: OrderKey) -> Settled {
        if self.collector.is_retired(p) {
            return Settled::Yes;
        }

        match self.requests.get(p) {
            Some(t) => match t.request.status() {
                RequestStatus::Executed => Settled::Yes,
                RequestStatus::Stable if t.request.key() > key => Settled::Yes,
                _ => Settled::No,
            },
            None => Settled::Unknown,
        }
    }
}
