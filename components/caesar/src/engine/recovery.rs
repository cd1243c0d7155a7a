use std::time::Instant;

use super::Caesar;
use super::HandlerError;
use super::Output;
use super::RecoveryRound;
use super::FAST_VIEW;
use crate::message::Message;
use crate::message::Phase;
use crate::message::RecoveredState;
use crate::message::Recovery;
use crate::message::RecoveryReply;
use crate::replication::ReplicationError;
use crate::request::Position;
use crate::request::Request;
use crate::request::RequestId;
use crate::request::RequestStatus;
use crate::request::View;
use crate::ReplicaId;

impl Caesar {
    /// start_recovery takes over a request whose coordinator is suspected, with a view this
    /// replica owns.
    pub(crate) fn start_recovery(&mut self, rid: RequestId, now: Instant, out: &mut Output) {
        let (above, floor) = match self.recoveries.get(&rid) {
            Some(rec) => (rec.view, rec.floor),
            None => (FAST_VIEW, 0),
        };
        let above = match self.rounds.get(&rid) {
            Some(round) => above.max(round.view),
            None => above,
        };
        self.prepare(rid, above, floor, now, out);
    }

    /// prepare asks every replica to promise a view above `above` for `rid` and to report what
    /// it holds. The request will not be voted on below `floor`.
    pub(crate) fn prepare(
        &mut self,
        rid: RequestId,
        above: View,
        floor: Position,
        now: Instant,
        out: &mut Output,
    ) {
        let view = self.next_view_for(&rid, above);

        info!("replica {}: recover {} at view {}", self.me, rid, view);

        self.rounds.remove(&rid);
        self.recoveries.insert(
            rid,
            RecoveryRound::new(view, floor, self.conf.n_replicas(), now),
        );
        self.touch(&rid, now);
        out.broadcast(Message::recovery(view, rid));
    }

    /// handle_recovery promises the recovery view and reports what this replica holds.
    pub(crate) fn handle_recovery(
        &mut self,
        from: ReplicaId,
        m: Recovery,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), HandlerError> {
        let rid = m.request_id;
        self.check_retired(&rid)?;

        // A decided value never changes, whatever view asks for it.
        if let Some(t) = self.requests.get(&rid) {
            if t.request.is_decided() {
                out.send(from, Message::recovery_reply(m.view, rid, Some(t.report())));
                return Ok(());
            }
        }

        let promised = self.promised_view(&rid);
        if m.view < promised {
            out.send(from, Message::recovery_reply(promised, rid, None));
            return Err(HandlerError::StaleView(m.view, promised));
        }
        self.promise(rid, m.view, now);

        // A lower view round of this replica can not succeed any more.
        if from != self.me {
            if let Some(round) = self.rounds.get(&rid) {
                if round.view < m.view {
                    self.rounds.remove(&rid);
                }
            }
            if let Some(rec) = self.recoveries.get(&rid) {
                if rec.view < m.view {
                    self.recoveries.remove(&rid);
                }
            }
        }

        self.touch(&rid, now);
        let state = self.requests.get(&rid).map(|t| t.report());
        out.send(from, Message::recovery_reply(m.view, rid, state));
        Ok(())
    }

    /// handle_recovery_reply collects reports and resumes the request once a majority replied.
    ///
    /// A value that may have been chosen is kept unchanged, in this order:
    /// - a decided value is adopted as is,
    /// - the value accepted in the highest slow view is proposed again in the recovery view,
    /// - a value that a fast quorum may have accepted in the fast round is proposed in the
    ///   recovery view.
    ///
    /// Without any, nothing was chosen: the request is voted on again at the highest reported
    /// position with the predecessors of all reports.
    pub(crate) fn handle_recovery_reply(
        &mut self,
        from: ReplicaId,
        m: RecoveryReply,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), HandlerError> {
        let rid = m.request_id;
        let n = self.conf.n_replicas();
        let quorum = self.conf.quorum();

        let rec = self
            .recoveries
            .get_mut(&rid)
            .ok_or(HandlerError::NoRound(rid))?;

        if m.view < rec.view {
            return Err(HandlerError::StaleView(m.view, rec.view));
        }

        if m.view > rec.view {
            let stale = rec.view;
            self.recoveries.remove(&rid);
            self.promise(rid, m.view, now);
            info!(
                "replica {}: give up recovery of {} at view {}, seen {}",
                self.me, rid, stale, m.view
            );
            return Err(HandlerError::StaleView(stale, m.view));
        }

        if from >= n {
            return Err(ReplicationError::NoSuchReplica(from, n).into());
        }

        if rec.replies[from].is_none() {
            rec.count += 1;
        }
        rec.replies[from] = Some(m.state);

        if rec.count < quorum {
            return Ok(());
        }

        let rec = match self.recoveries.remove(&rid) {
            Some(rec) => rec,
            None => return Ok(()),
        };

        let n_replies = rec.count;
        let states: Vec<RecoveredState> = rec.replies.into_iter().flatten().flatten().collect();

        if let Some(st) = states.iter().find(|st| st.status.is_decided()) {
            let decided = recovered_request(rid, st, RequestStatus::Stable);
            info!("replica {}: recovered decided {}", self.me, decided);
            out.broadcast(Message::stable(st.accepted_view, &decided));
            return Ok(());
        }

        let accepted = states
            .iter()
            .filter(|st| st.status == RequestStatus::SlowPending && st.accepted_view > FAST_VIEW)
            .max_by_key(|st| st.accepted_view);

        let chosen = match accepted {
            Some(st) => Some(st),
            None => self.fast_chosen(&states, n_replies),
        };

        if let Some(st) = chosen {
            let mut r = recovered_request(rid, st, RequestStatus::SlowPending);
            r.set_view(rec.view);
            self.observe(r.position());

            info!(
                "replica {}: resume {} accepted at view {}, at view {}",
                self.me, r, st.accepted_view, rec.view
            );
            self.start_round(Phase::Slow, rec.view, r, now, out);
            return Ok(());
        }

        let best = states
            .iter()
            .max_by_key(|st| st.position)
            .ok_or(HandlerError::UnknownRequest(rid))?;

        let mut r = recovered_request(rid, best, RequestStatus::SlowPending);
        r.advance_position(rec.floor);
        for st in states.iter() {
            r.merge_pred(&st.pred);
        }
        r.set_view(rec.view);
        self.observe(r.position());

        info!("replica {}: vote again on {} at view {}", self.me, r, rec.view);
        self.start_round(Phase::Retry, rec.view, r, now, out);
        Ok(())
    }

    /// fast_chosen returns the value a fast quorum may have accepted in the fast round, given
    /// `n_replies` reports of which `states` know the request.
    ///
    /// Such a value is reported by at least `fast_quorum + n_replies - n` replicas. The fast
    /// quorum is large enough for at most one value to reach that.
    fn fast_chosen<'a>(
        &self,
        states: &'a [RecoveredState],
        n_replies: usize,
    ) -> Option<&'a RecoveredState> {
        let n = self.conf.n_replicas();
        let kept = (self.conf.fast_quorum() + n_replies).saturating_sub(n);
        if kept == 0 {
            return None;
        }

        let fast: Vec<&RecoveredState> = states
            .iter()
            .filter(|st| st.status == RequestStatus::SlowPending && st.accepted_view == FAST_VIEW)
            .collect();

        fast.iter()
            .find(|st| {
                let votes = fast
                    .iter()
                    .filter(|other| other.position == st.position && other.pred == st.pred)
                    .count();
                votes >= kept
            })
            .copied()
    }
}

fn recovered_request(rid: RequestId, st: &RecoveredState, status: RequestStatus) -> Request {
    let mut r = Request::from_parts(
        rid,
        st.object_ids.clone(),
        st.payload.clone(),
        st.position,
        st.accepted_view,
        status,
    );
    r.merge_pred(&st.pred);
    r
}
