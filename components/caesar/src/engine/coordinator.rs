use std::time::Instant;

use super::Caesar;
use super::HandlerError;
use super::Output;
use super::Round;
use super::SLOW_VIEW;
use crate::message::Message;
use crate::message::Phase;
use crate::message::ProposeReply;
use crate::replication::ProposalReplyInfo;
use crate::replication::ReplyOutcome;
use crate::request::Position;
use crate::request::Request;
use crate::request::RequestId;
use crate::request::View;
use crate::ReplicaId;

impl Caesar {
    /// start_round broadcasts the propose message of `phase` and waits for replies.
    pub(crate) fn start_round(
        &mut self,
        phase: Phase,
        view: View,
        r: Request,
        now: Instant,
        out: &mut Output,
    ) {
        let rid = r.id();
        debug!(
            "replica {}: start {:?} round of {} at {}, view {}",
            self.me,
            phase,
            rid,
            r.position(),
            view
        );

        let msg = Message::propose(phase, view, &r);
        let info = ProposalReplyInfo::new(r, &self.conf);

        self.recoveries.remove(&rid);
        self.rounds.insert(
            rid,
            Round {
                phase,
                view,
                info,
                started: now,
            },
        );
        out.broadcast(msg);
    }

    /// handle_reply adds a reply to the round in progress and moves the round forward.
    pub(crate) fn handle_reply(
        &mut self,
        from: ReplicaId,
        phase: Phase,
        reply: ProposeReply,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), HandlerError> {
        let rid = reply.request_id;
        self.touch(&rid, now);

        let round = self
            .rounds
            .get_mut(&rid)
            .ok_or(HandlerError::NoRound(rid))?;

        if round.phase != phase {
            return Err(HandlerError::DelayedReply(round.phase, phase));
        }

        if reply.view < round.view {
            return Err(HandlerError::StaleView(reply.view, round.view));
        }

        if reply.view > round.view {
            // Another replica took over the request.
            let stale = round.view;
            self.rounds.remove(&rid);
            self.promise(rid, reply.view, now);
            info!(
                "replica {}: give up round of {} at view {}, seen {}",
                self.me, rid, stale, reply.view
            );
            return Err(HandlerError::StaleView(stale, reply.view));
        }

        let outcome = round.info.add_reply(reply, from)?;
        if outcome == ReplyOutcome::Late {
            return Ok(());
        }

        self.check_round(rid, now, false, out);
        Ok(())
    }

    /// check_round finalizes the round of `rid` if its replies are enough to decide.
    ///
    /// A fast round is decided by a fast quorum, by replies from every replica, or, once
    /// `timed_out`, by a majority of replies. It makes the request stable only if a fast quorum
    /// voted ACK with the same predecessors and nobody voted NACK. Otherwise a value that may
    /// have been chosen that way is proposed in a slow round; without one, the position and the
    /// merged predecessors are proposed if nobody voted NACK, and voted on again above every
    /// NACKed position if somebody did.
    ///
    /// A retry round goes on with a slow round once a majority voted ACK. A NACK means the
    /// position is taken: the request is taken over again in a higher view before it is voted on
    /// above the NACKed position, since a value may be accepted by then.
    ///
    /// A slow round makes the request stable with a majority of ACKs.
    pub(crate) fn check_round(
        &mut self,
        rid: RequestId,
        now: Instant,
        timed_out: bool,
        out: &mut Output,
    ) {
        let quorum = self.conf.quorum();

        let round = match self.rounds.get(&rid) {
            Some(round) => round,
            None => return,
        };
        let info = &round.info;

        let next = match round.phase {
            Phase::Fast => {
                let decidable = info.is_fast_quorum()
                    || info.all_replied()
                    || (timed_out && info.count() >= quorum);
                if !decidable {
                    return;
                }
                self.after_fast_round(info)
            }
            Phase::Retry => {
                if let Some(p) = info.max_nack_position() {
                    Next::Prepare(p + 1)
                } else if info.ack_count() >= quorum {
                    Next::Accept(info.request().clone())
                } else {
                    return;
                }
            }
            Phase::Slow => {
                if info.ack_count() >= quorum {
                    Next::Decide(info.request().clone())
                } else {
                    return;
                }
            }
        };

        let mut round = match self.rounds.remove(&rid) {
            Some(round) => round,
            None => return,
        };
        round.info.set_done();

        // Only the fast round moves on to the view reserved for its slow round.
        let view = match round.phase {
            Phase::Fast => SLOW_VIEW,
            Phase::Slow | Phase::Retry => round.view,
        };

        match next {
            Next::Decide(r) => self.decide(r, round.view, out),
            Next::Accept(mut r) => {
                r.set_view(view);
                self.start_round(Phase::Slow, view, r, now, out);
            }
            Next::Retry(mut r) => {
                self.observe(r.position());
                r.set_view(view);
                self.start_round(Phase::Retry, view, r, now, out);
            }
            Next::Prepare(floor) => {
                info!(
                    "replica {}: retry of {} rejected at view {}, take over above {}",
                    self.me, rid, round.view, floor
                );
                self.observe(floor);
                self.prepare(rid, round.view, floor, now, out);
            }
        }
    }

    fn after_fast_round(&self, info: &ProposalReplyInfo) -> Next {
        let n = self.conf.n_replicas();
        let fast_quorum = self.conf.fast_quorum();
        let nacked = info.should_retry();
        let proposed = info.request();

        if let Some((pred, votes)) = info.most_common_ack() {
            let r = with_pred(proposed, pred);

            if votes >= fast_quorum && !nacked {
                return Next::Decide(r);
            }

            // A value chosen by a fast quorum has at least this many votes in any reply set.
            let kept = (fast_quorum + info.count()).saturating_sub(n);
            if kept > 0 && votes >= kept {
                return Next::Accept(r);
            }
        }

        if !nacked {
            return Next::Accept(proposed.clone());
        }

        let mut r = proposed.clone();
        if let Some(p) = info.max_nack_position() {
            r.advance_position(p + 1);
        }
        Next::Retry(r)
    }

    /// decide broadcasts the decided value. Every replica, including this one, installs it when
    /// the Stable message arrives.
    fn decide(&self, r: Request, view: View, out: &mut Output) {
        info!(
            "replica {}: decide {} at {}, view {}",
            self.me,
            r.id(),
            r.position(),
            view
        );
        out.broadcast(Message::stable(view, &r));
    }
}

/// What a finished round leads to.
enum Next {
    /// Broadcast Stable with the value.
    Decide(Request),

    /// Propose the value in a slow round.
    Accept(Request),

    /// Vote on the request again at a higher position.
    Retry(Request),

    /// Take the request over in a higher view. The position must stay above the value.
    Prepare(Position),
}

/// with_pred returns a copy of `proposed` with exactly `pred` as predecessors.
fn with_pred(proposed: &Request, pred: &[RequestId]) -> Request {
    let mut r = Request::from_parts(
        proposed.id(),
        proposed.object_ids().to_vec(),
        proposed.payload().to_vec(),
        proposed.position(),
        proposed.view(),
        proposed.status(),
    );
    r.merge_pred(pred);
    r
}
