use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use super::delivery::DeliveryQueue;
use super::gc::Collector;
use super::ConflictIndex;
use super::HandlerError;
use super::OrderKey;
use super::Output;
use crate::conf::Config;
use crate::message::Message;
use crate::message::Phase;
use crate::message::RecoveredState;
use crate::replication::ProposalReplyInfo;
use crate::request::Position;
use crate::request::Request;
use crate::request::RequestId;
use crate::request::RequestStatus;
use crate::request::View;
use crate::ReplicaId;

/// View of the fast round of a request.
pub const FAST_VIEW: View = 0;

/// View of the slow or retry round that follows a failed fast round.
/// Both views belong to the replica a client submitted the request to. A recovery always runs in
/// a higher view.
pub const SLOW_VIEW: View = 1;

/// How many recovery timeouts a promise for a request this replica does not track is kept.
const UNTRACKED_PROMISE_TTL: u32 = 10;

/// Accepted is a value accepted in a view.
/// In the fast round a replica accepts what it votes for; in a slow round it accepts what the
/// coordinator of the view proposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Accepted {
    pub view: View,
    pub position: Position,
    pub pred: BTreeSet<RequestId>,
}

/// Ballot is what a replica holds for a request that is not decided yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Ballot {
    /// Position of the last proposal handled, the key of the request in the conflict index.
    pub position: Position,

    /// Every predecessor this replica voted or accepted with.
    pub pred: BTreeSet<RequestId>,

    /// The value accepted in the highest view.
    pub accepted: Option<Accepted>,
}

/// Tracked is the local state of a request.
#[derive(Debug)]
pub(crate) struct Tracked {
    /// The agreed value. Position and predecessors are only set once it is decided.
    pub request: Request,
    pub ballot: Ballot,

    /// Highest view promised for the request.
    pub promised: View,

    /// Last time anything happened to the request.
    pub touched: Instant,
}

impl Tracked {
    /// new starts tracking a request from the first proposal of it this replica sees.
    pub fn new(proposed: &Request, now: Instant) -> Tracked {
        let request = Request::new(
            proposed.id(),
            proposed.object_ids().to_vec(),
            proposed.payload().to_vec(),
        );

        Tracked {
            request,
            ballot: Ballot {
                position: proposed.position(),
                pred: proposed.pred().clone(),
                accepted: None,
            },
            promised: FAST_VIEW,
            touched: now,
        }
    }

    /// key is where the request is ordered: the agreed key once decided, otherwise the position
    /// of the last proposal.
    pub fn key(&self) -> OrderKey {
        if self.request.is_decided() {
            self.request.key()
        } else {
            (self.ballot.position, self.request.id())
        }
    }

    pub fn pred(&self) -> &BTreeSet<RequestId> {
        if self.request.is_decided() {
            self.request.pred()
        } else {
            &self.ballot.pred
        }
    }

    /// report is what this replica tells a replica recovering the request.
    /// A pending request is reported as SlowPending if it holds an accepted value, and as
    /// FastPending with what it last voted for otherwise.
    pub fn report(&self) -> RecoveredState {
        if self.request.is_decided() {
            return RecoveredState::new(&self.request);
        }

        let (status, view, position, pred) = match &self.ballot.accepted {
            Some(acc) => (RequestStatus::SlowPending, acc.view, acc.position, &acc.pred),
            None => (
                RequestStatus::FastPending,
                FAST_VIEW,
                self.ballot.position,
                &self.ballot.pred,
            ),
        };

        RecoveredState {
            status,
            accepted_view: view,
            position,
            pred: pred.iter().copied().collect(),
            object_ids: self.request.object_ids().to_vec(),
            payload: self.request.payload().to_vec(),
        }
    }
}

/// Round is a proposal this replica coordinates.
#[derive(Debug)]
pub(crate) struct Round {
    pub phase: Phase,
    pub view: View,
    pub info: ProposalReplyInfo,
    pub started: Instant,
}

/// RecoveryRound collects RecoveryReplies for a request this replica tries to take over.
#[derive(Debug)]
pub(crate) struct RecoveryRound {
    pub view: View,

    /// The request must not be voted on below this position again: a retry at it was rejected.
    pub floor: Position,

    /// replies[i] is None until replica i replies; an inner None means replica i does not know
    /// the request.
    pub replies: Vec<Option<Option<RecoveredState>>>,
    pub count: usize,
    pub started: Instant,
}

impl RecoveryRound {
    pub fn new(view: View, floor: Position, n_replicas: usize, started: Instant) -> Self {
        RecoveryRound {
            view,
            floor,
            replies: vec![None; n_replicas],
            count: 0,
            started,
        }
    }
}

/// Caesar is the consensus state machine of one replica.
///
/// It is driven by three kinds of events: a local client submission (`propose`), a message from
/// a peer (`handle_message`) and the passage of time (`tick`). Every call returns an `Output`
/// with the messages to send and the requests that are ready for execution. After the
/// application executed a delivered request the driver reports it with `on_executed`.
///
/// Requests are ordered by `(position, request id)`. For two conflicting stable requests the
/// lower one is always a predecessor of the higher one, which is what delivery relies on.
pub struct Caesar {
    pub(crate) me: ReplicaId,
    pub(crate) conf: Arc<Config>,

    /// Highest position this replica has seen.
    pub(crate) clock: Position,

    pub(crate) requests: HashMap<RequestId, Tracked>,

    /// Promises for requests this replica does not track, with the time they were made.
    pub(crate) promised: HashMap<RequestId, (View, Instant)>,

    pub(crate) index: ConflictIndex,
    pub(crate) rounds: HashMap<RequestId, Round>,
    pub(crate) recoveries: HashMap<RequestId, RecoveryRound>,
    pub(crate) delivery: DeliveryQueue,
    pub(crate) collector: Collector,
}

impl Caesar {
    pub fn new(me: ReplicaId, conf: Arc<Config>) -> Caesar {
        Caesar {
            me,
            conf,
            clock: 0,
            requests: HashMap::new(),
            promised: HashMap::new(),
            index: ConflictIndex::new(),
            rounds: HashMap::new(),
            recoveries: HashMap::new(),
            delivery: DeliveryQueue::default(),
            collector: Collector::default(),
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.me
    }

    pub fn conf(&self) -> &Config {
        &self.conf
    }

    /// request returns the local copy of a tracked request.
    /// Until the request is decided the copy has no position and no predecessors.
    pub fn request(&self, rid: &RequestId) -> Option<&Request> {
        self.requests.get(rid).map(|t| &t.request)
    }

    /// ballot_position returns where a tracked request is ordered on this replica right now:
    /// the agreed position once decided, the last proposed one before.
    pub fn ballot_position(&self, rid: &RequestId) -> Option<Position> {
        self.requests.get(rid).map(|t| t.key().0)
    }

    pub fn n_tracked(&self) -> usize {
        self.requests.len()
    }

    pub fn is_coordinating(&self, rid: &RequestId) -> bool {
        self.rounds.contains_key(rid)
    }

    pub fn coordinating_phase(&self, rid: &RequestId) -> Option<(Phase, View)> {
        self.rounds.get(rid).map(|r| (r.phase, r.view))
    }

    pub fn is_recovering(&self, rid: &RequestId) -> bool {
        self.recoveries.contains_key(rid)
    }

    pub fn is_retired(&self, rid: &RequestId) -> bool {
        self.collector.is_retired(rid)
    }

    /// propose starts the fast round of a request submitted by a local client.
    /// The request gets a position above everything this replica has seen.
    pub fn propose(&mut self, request: Request, now: Instant) -> Output {
        let mut out = Output::default();
        let rid = request.id();

        if self.requests.contains_key(&rid)
            || self.rounds.contains_key(&rid)
            || self.collector.is_retired(&rid)
        {
            warn!("replica {}: duplicated proposal {}", self.me, rid);
            return out;
        }

        let mut r = request;
        r.advance_position(self.clock + 1);
        r.set_status(RequestStatus::FastPending);
        self.observe(r.position());

        debug!("replica {}: propose {}", self.me, r);
        self.start_round(Phase::Fast, FAST_VIEW, r, now, &mut out);
        out
    }

    /// handle_message handles one message from replica `from`.
    /// A message that can not be applied is dropped and logged.
    pub fn handle_message(&mut self, from: ReplicaId, msg: Message, now: Instant) -> Output {
        let mut out = Output::default();
        let name = msg.name();

        let rst = match msg {
            Message::FastPropose(m) => {
                let r = m.to_request(RequestStatus::FastPending);
                self.handle_propose(from, Phase::Fast, r, now, &mut out)
            }
            Message::SlowPropose(m) => {
                let r = m.to_request(RequestStatus::SlowPending);
                self.handle_propose(from, Phase::Slow, r, now, &mut out)
            }
            Message::Retry(m) => {
                let r = m.to_request(RequestStatus::SlowPending);
                self.handle_propose(from, Phase::Retry, r, now, &mut out)
            }
            Message::FastProposeReply(m) => self.handle_reply(from, Phase::Fast, m, now, &mut out),
            Message::SlowProposeReply(m) => self.handle_reply(from, Phase::Slow, m, now, &mut out),
            Message::RetryReply(m) => self.handle_reply(from, Phase::Retry, m, now, &mut out),
            Message::Stable(m) => {
                let r = m.to_request(RequestStatus::Stable);
                self.handle_stable(r, now, &mut out)
            }
            Message::Recovery(m) => self.handle_recovery(from, m, now, &mut out),
            Message::RecoveryReply(m) => self.handle_recovery_reply(from, m, now, &mut out),
            Message::Collect(m) => self.handle_collect(from, m),
            Message::Barrier(m) => {
                debug!("replica {}: barrier from {}, view {}", self.me, from, m.view);
                Ok(())
            }
            Message::Alive(m) => {
                debug!(
                    "replica {}: replica {} is alive, executed {}",
                    self.me, from, m.executed
                );
                Ok(())
            }
        };

        if let Err(e) = rst {
            debug!("replica {}: drop {} from {}: {}", self.me, name, from, e);
        }

        out
    }

    /// tick drives everything that depends on time:
    /// fast rounds without enough replies, stuck rounds and requests whose coordinator is
    /// suspected. It also flushes pending garbage collection.
    pub fn tick(&mut self, now: Instant) -> Output {
        let mut out = Output::default();
        let timeout = self.conf.recovery_timeout();

        self.flush_collect(&mut out);
        self.expire_promises(now);

        let mut rids: Vec<RequestId> = self.rounds.keys().copied().collect();
        rids.sort();
        for rid in rids.into_iter() {
            let (phase, started) = match self.rounds.get(&rid) {
                Some(round) => (round.phase, round.started),
                None => continue,
            };
            let age = now.saturating_duration_since(started);
            if age >= timeout {
                info!("replica {}: round of {} timed out", self.me, rid);
                self.start_recovery(rid, now, &mut out);
            } else if phase == Phase::Fast && age >= timeout / 2 {
                self.check_round(rid, now, true, &mut out);
            }
        }

        let mut rids: Vec<RequestId> = self
            .recoveries
            .iter()
            .filter(|(_, rec)| now.saturating_duration_since(rec.started) >= timeout)
            .map(|(rid, _)| *rid)
            .collect();
        rids.sort();
        for rid in rids.into_iter() {
            self.start_recovery(rid, now, &mut out);
        }

        let suspect = self.suspect_timeout();
        let mut rids: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(rid, t)| {
                !t.request.is_decided()
                    && !self.rounds.contains_key(rid)
                    && !self.recoveries.contains_key(rid)
                    && now.saturating_duration_since(t.touched) >= suspect
            })
            .map(|(rid, _)| *rid)
            .collect();

        // predecessors this replica never heard of
        for (rid, since) in self.delivery.unknown_preds() {
            if !self.requests.contains_key(&rid)
                && !self.recoveries.contains_key(&rid)
                && !self.collector.is_retired(&rid)
                && now.saturating_duration_since(since) >= suspect
            {
                rids.push(rid);
            }
        }

        rids.sort();
        rids.dedup();
        for rid in rids.into_iter() {
            self.start_recovery(rid, now, &mut out);
        }

        out
    }

    /// suspect_timeout is how long a pending request may stay idle before this replica takes it
    /// over. Replicas wait for different durations so they do not all recover at once.
    pub(crate) fn suspect_timeout(&self) -> Duration {
        let timeout = self.conf.recovery_timeout();
        let n = self.conf.n_replicas() as u32;
        timeout + timeout * (self.me as u32) / n
    }

    pub(crate) fn observe(&mut self, position: Position) {
        if position > self.clock {
            self.clock = position;
        }
    }

    pub(crate) fn touch(&mut self, rid: &RequestId, now: Instant) {
        if let Some(t) = self.requests.get_mut(rid) {
            t.touched = now;
        }
    }

    pub(crate) fn promised_view(&self, rid: &RequestId) -> View {
        match self.requests.get(rid) {
            Some(t) => t.promised,
            None => self.promised.get(rid).map(|p| p.0).unwrap_or(FAST_VIEW),
        }
    }

    pub(crate) fn promise(&mut self, rid: RequestId, view: View, now: Instant) {
        if let Some(t) = self.requests.get_mut(&rid) {
            t.promised = t.promised.max(view);
            return;
        }

        let p = self.promised.entry(rid).or_insert((view, now));
        if p.0 <= view {
            *p = (view, now);
        }
    }

    /// expire_promises forgets promises for requests that never showed up here.
    /// A request that is proposed or decided anywhere reaches this replica long before.
    fn expire_promises(&mut self, now: Instant) {
        let ttl = self.conf.recovery_timeout() * UNTRACKED_PROMISE_TTL;
        let recoveries = &self.recoveries;
        self.promised.retain(|rid, (_, at)| {
            recoveries.contains_key(rid) || now.saturating_duration_since(*at) < ttl
        });
    }

    /// track starts tracking a request this replica has not seen before and returns its state.
    /// A promise made before the request showed up moves into it.
    pub(crate) fn track(&mut self, proposed: &Request, now: Instant) -> &mut Tracked {
        let rid = proposed.id();
        let mut t = Tracked::new(proposed, now);
        if let Some((view, _)) = self.promised.remove(&rid) {
            t.promised = view;
        }

        self.observe(proposed.position());
        self.index.insert(proposed.object_ids(), t.key());
        self.requests.entry(rid).or_insert(t)
    }

    /// update modifies a tracked request and keeps the conflict index in sync with its key.
    pub(crate) fn update<F>(&mut self, rid: &RequestId, f: F) -> bool
    where
        F: FnOnce(&mut Tracked),
    {
        let t = match self.requests.get_mut(rid) {
            Some(t) => t,
            None => return false,
        };

        self.index.remove(t.request.object_ids(), t.key());
        f(t);
        let key = t.key();
        self.index.insert(t.request.object_ids(), key);

        if key.0 > self.clock {
            self.clock = key.0;
        }
        true
    }

    /// next_view returns the smallest view above `above` that this replica owns.
    pub(crate) fn next_view(&self, above: View) -> View {
        let n = self.conf.n_replicas() as View;
        let me = self.me as View;
        let v = above - above.rem_euclid(n) + me;
        if v > above {
            v
        } else {
            v + n
        }
    }

    /// next_view_for returns a view for taking over `rid`: above everything promised or accepted
    /// for it and above the views of its original coordinator.
    pub(crate) fn next_view_for(&self, rid: &RequestId, above: View) -> View {
        let mut above = above.max(SLOW_VIEW).max(self.promised_view(rid));
        if let Some(t) = self.requests.get(rid) {
            above = above.max(t.request.view());
        }
        self.next_view(above)
    }

    pub(crate) fn check_retired(&self, rid: &RequestId) -> Result<(), HandlerError> {
        if self.collector.is_retired(rid) {
            return Err(HandlerError::Retired(*rid));
        }
        Ok(())
    }
}
