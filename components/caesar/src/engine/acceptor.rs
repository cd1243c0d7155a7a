use std::time::Instant;

use super::Accepted;
use super::Caesar;
use super::HandlerError;
use super::Output;
use super::FAST_VIEW;
use crate::message::Message;
use crate::message::Phase;
use crate::message::ProposeReply;
use crate::message::Vote;
use crate::request::Request;
use crate::request::RequestStatus;
use crate::ReplicaId;

impl Caesar {
    /// handle_propose answers a FastPropose, SlowPropose or Retry.
    ///
    /// FastPropose and Retry ask this replica to vote on the proposed position. SlowPropose asks
    /// it to accept a value some majority already voted for: it is accepted as long as its view
    /// is not below the promised one, whatever this replica knows about conflicts.
    pub(crate) fn handle_propose(
        &mut self,
        from: ReplicaId,
        phase: Phase,
        proposed: Request,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), HandlerError> {
        let rid = proposed.id();
        let view = proposed.view();
        self.check_retired(&rid)?;
        self.observe(proposed.position());

        // Decided already: let the proposer learn the decided value.
        if let Some(t) = self.requests.get(&rid) {
            if t.request.is_decided() {
                out.send(from, Message::stable(t.request.view(), &t.request));
                return Ok(());
            }
        }

        let promised = self.promised_view(&rid);
        if view < promised {
            let reply = ProposeReply::nack(promised, rid, proposed.position());
            out.send(from, Message::reply(phase, reply));
            return Err(HandlerError::StaleView(view, promised));
        }

        if !self.requests.contains_key(&rid) {
            self.track(&proposed, now);
        }
        self.promise(rid, view, now);

        let vote = match phase {
            Phase::Fast | Phase::Retry => self.vote_for(phase, &proposed),
            Phase::Slow => self.accept(&proposed),
        };
        self.touch(&rid, now);

        out.send(
            from,
            Message::reply(
                phase,
                ProposeReply {
                    view,
                    request_id: rid,
                    vote,
                },
            ),
        );
        Ok(())
    }

    /// vote_for votes on `proposed` and records the vote in its ballot.
    /// An ACK in the fast round is also the value this replica accepts in the fast view.
    fn vote_for(&mut self, phase: Phase, proposed: &Request) -> Vote {
        let vote = self.vote(proposed);
        let position = proposed.position();

        if let Vote::Nack { max_position } = &vote {
            debug!(
                "replica {}: nack {} at {}, conflict at {}",
                self.me,
                proposed.id(),
                position,
                max_position
            );
        }

        self.update(&proposed.id(), |t| {
            t.ballot.position = position;
            t.request.set_status(proposed.status());

            if let Vote::Ack { pred } = &vote {
                t.ballot.pred.extend(pred.iter().copied());

                if phase == Phase::Fast && t.ballot.accepted.is_none() {
                    t.ballot.accepted = Some(Accepted {
                        view: FAST_VIEW,
                        position,
                        pred: pred.iter().copied().collect(),
                    });
                }
            }
        });

        vote
    }

    /// vote decides whether `proposed` may be ordered at its key.
    ///
    /// It is rejected if a conflicting request is ordered after it and does not already have it
    /// as a predecessor, or if its position is not above a retired conflicting request. The
    /// rejection carries the highest such position.
    /// Otherwise it is accepted with every conflicting request ordered before it as predecessors.
    pub(crate) fn vote(&self, proposed: &Request) -> Vote {
        let rid = proposed.id();
        let key = proposed.key();
        let oids = proposed.object_ids();

        let mut max_position = self.index.watermark(oids).filter(|w| *w >= key.0);

        for (position, other) in self.index.higher(oids, key).into_iter() {
            let ordered_before = match self.requests.get(&other) {
                Some(t) => t.pred().contains(&rid),
                None => false,
            };
            if !ordered_before {
                max_position = max_position.max(Some(position));
            }
        }

        match max_position {
            Some(max_position) => Vote::Nack { max_position },
            None => Vote::Ack {
                pred: self.index.lower(oids, key).into_iter().collect(),
            },
        }
    }

    /// accept replaces the accepted value with the one proposed in a slow round.
    /// The ACK carries no predecessors: the value is already complete.
    fn accept(&mut self, proposed: &Request) -> Vote {
        let view = proposed.view();

        self.update(&proposed.id(), |t| {
            t.ballot.position = proposed.position();
            t.ballot.pred.extend(proposed.pred().iter().copied());
            t.ballot.accepted = Some(Accepted {
                view,
                position: proposed.position(),
                pred: proposed.pred().clone(),
            });

            t.request.set_view(view);
            t.request.set_status(RequestStatus::SlowPending);
        });

        Vote::Ack { pred: vec![] }
    }

    /// handle_stable installs a decided value. A request is decided at most once; a later Stable
    /// of it changes nothing.
    pub(crate) fn handle_stable(
        &mut self,
        decided: Request,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), HandlerError> {
        let rid = decided.id();
        self.check_retired(&rid)?;

        self.rounds.remove(&rid);
        self.recoveries.remove(&rid);

        match self.requests.get(&rid).map(|t| t.request.is_decided()) {
            Some(true) => return Ok(()),
            Some(false) => {}
            None => {
                self.track(&decided, now);
            }
        }
        self.promise(rid, decided.view(), now);

        self.update(&rid, |t| {
            t.request
                .decide(decided.position(), decided.pred(), decided.view());
            t.touched = now;
        });

        if let Some(r) = self.request(&rid) {
            info!("replica {}: stable {}", self.me, r);
        }

        self.on_stable(rid, now, out);
        Ok(())
    }
}
