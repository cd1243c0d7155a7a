use super::ReplicationError;
use crate::conf::Config;
use crate::message::ProposeReply;
use crate::message::Vote;
use crate::request::Position;
use crate::request::Request;
use crate::request::RequestId;
use crate::request::View;
use crate::ReplicaId;

/// ReplyOutcome tells what `add_reply` did with a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// First reply from this sender. It is counted.
    Counted,

    /// The sender already replied. Its stored reply is replaced and `count` does not change.
    Replaced,

    /// The proposal is already finalized. The reply is dropped.
    Late,
}

/// ProposalReplyInfo tracks replies of one in-flight proposal.
/// It is owned by the coordinator of the proposal and is only touched by the thread that
/// handles the coordinator's messages.
#[derive(Debug, Clone)]
pub struct ProposalReplyInfo {
    request: Request,

    /// replies[i] is the most recent reply from replica i.
    replies: Vec<Option<ProposeReply>>,
    count: usize,
    done: bool,
    quorum: usize,
}

impl ProposalReplyInfo {
    pub fn new(request: Request, conf: &Config) -> Self {
        Self::with_quorum(request, conf.n_replicas(), conf.fast_quorum())
    }

    pub fn with_quorum(request: Request, n_replicas: usize, quorum: usize) -> Self {
        ProposalReplyInfo {
            request,
            replies: vec![None; n_replicas],
            count: 0,
            done: false,
            quorum,
        }
    }

    /// add_reply records a reply from replica `from` and merges the predecessors of an ACK into
    /// the owned request.
    pub fn add_reply(
        &mut self,
        reply: ProposeReply,
        from: ReplicaId,
    ) -> Result<ReplyOutcome, ReplicationError> {
        let n = self.replies.len();
        if from >= n {
            return Err(ReplicationError::NoSuchReplica(from, n));
        }

        if reply.request_id != self.request.id() {
            return Err(ReplicationError::WrongRequest(
                self.request.id(),
                reply.request_id,
            ));
        }

        if self.done {
            return Ok(ReplyOutcome::Late);
        }

        if let Vote::Ack { pred } = &reply.vote {
            self.request.merge_pred(pred);
        }

        let slot = &mut self.replies[from];
        let outcome = if slot.is_some() {
            ReplyOutcome::Replaced
        } else {
            self.count += 1;
            ReplyOutcome::Counted
        };
        *slot = Some(reply);

        Ok(outcome)
    }

    /// is_fast_quorum returns true if at least `quorum` replies are recorded, no matter they are
    /// ACK or NACK.
    pub fn is_fast_quorum(&self) -> bool {
        self.count >= self.quorum
    }

    /// should_retry returns true if any recorded reply is a NACK.
    pub fn should_retry(&self) -> bool {
        self.iter().any(|r| !r.is_ack())
    }

    pub fn all_replied(&self) -> bool {
        self.count == self.replies.len()
    }

    pub fn ack_count(&self) -> usize {
        self.iter().filter(|r| r.is_ack()).count()
    }

    /// most_common_ack returns the predecessors sent by the most ACKs and how many ACKs sent
    /// exactly them. Among groups of the same size the one seen first wins.
    pub fn most_common_ack(&self) -> Option<(&[RequestId], usize)> {
        let mut groups: Vec<(&[RequestId], usize)> = vec![];
        for r in self.iter() {
            let pred = match &r.vote {
                Vote::Ack { pred } => pred.as_slice(),
                Vote::Nack { .. } => continue,
            };
            match groups.iter_mut().find(|(p, _)| *p == pred) {
                Some(g) => g.1 += 1,
                None => groups.push((pred, 1)),
            }
        }

        let mut best: Option<(&[RequestId], usize)> = None;
        for g in groups.into_iter() {
            if best.map(|b| g.1 > b.1).unwrap_or(true) {
                best = Some(g);
            }
        }
        best
    }

    /// max_nack_position returns the highest position reported by NACKs.
    pub fn max_nack_position(&self) -> Option<Position> {
        self.iter()
            .filter_map(|r| match r.vote {
                Vote::Nack { max_position } => Some(max_position),
                Vote::Ack { .. } => None,
            })
            .max()
    }

    /// max_view returns the highest view seen in replies. A NACK for a stale view carries the
    /// view the acceptor promised.
    pub fn max_view(&self) -> Option<View> {
        self.iter().map(|r| r.view).max()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn reply(&self, from: ReplicaId) -> Option<&ProposeReply> {
        self.replies.get(from)?.as_ref()
    }

    /// set_done finalizes the proposal. It returns false if it was already done.
    pub fn set_done(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.done = true;
        true
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn iter(&self) -> impl Iterator<Item = &ProposeReply> {
        self.replies.iter().filter_map(|r| r.as_ref())
    }
}
