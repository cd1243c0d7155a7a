use std::fmt;

use crate::request::ObjectId;
use crate::request::Position;
use crate::request::Request;
use crate::request::RequestId;
use crate::request::RequestStatus;
use crate::request::View;

/// Phase is the kind of round a proposal belongs to.
/// Every phase has its own propose message and its own reply message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Fast,
    Slow,
    Retry,
}

/// Propose carries a request without predecessors, as in FastPropose and Retry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Propose {
    pub view: View,
    pub request_id: RequestId,
    pub object_ids: Vec<ObjectId>,
    pub position: Position,
    pub payload: Vec<u8>,
}

/// PredPropose carries a request along with its predecessors, as in SlowPropose and Stable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PredPropose {
    pub view: View,
    pub request_id: RequestId,
    pub object_ids: Vec<ObjectId>,
    pub pred: Vec<RequestId>,
    pub position: Position,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Vote {
    /// Accepted. `pred` is every conflicting request the acceptor orders before the proposal.
    Ack { pred: Vec<RequestId> },

    /// Rejected. `max_position` is the highest position among the requests that conflict.
    Nack { max_position: Position },
}

/// ProposeReply is the answer to any of the three propose messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposeReply {
    pub view: View,
    pub request_id: RequestId,
    pub vote: Vote,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    pub view: View,
    pub request_id: RequestId,
}

/// RecoveredState is what a replica knows about a request being recovered.
///
/// With status Stable or Executed, `position` and `pred` are the decided value. With SlowPending
/// they are the value the replica accepted in `accepted_view`. With FastPending the replica
/// accepted nothing: they are the last position it voted on and every predecessor it voted with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredState {
    pub status: RequestStatus,

    /// The view in which the reported value was accepted or decided.
    pub accepted_view: View,
    pub position: Position,
    pub pred: Vec<RequestId>,
    pub object_ids: Vec<ObjectId>,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryReply {
    pub view: View,
    pub request_id: RequestId,

    /// None if the replica has never seen the request.
    pub state: Option<RecoveredState>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Barrier {
    pub view: View,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Alive {
    pub view: View,
    pub executed: i64,
}

/// Collect announces requests that are executed by the sender.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collect {
    pub view: View,
    pub executed: Vec<RequestId>,
}

/// Message is everything replicas send to each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    FastPropose(Propose),
    FastProposeReply(ProposeReply),
    SlowPropose(PredPropose),
    SlowProposeReply(ProposeReply),
    Retry(Propose),
    RetryReply(ProposeReply),
    Stable(PredPropose),
    Recovery(Recovery),
    RecoveryReply(RecoveryReply),
    Barrier(Barrier),
    Alive(Alive),
    Collect(Collect),
}

impl Propose {
    pub fn new(view: View, r: &Request) -> Propose {
        Propose {
            view,
            request_id: r.id(),
            object_ids: r.object_ids().to_vec(),
            position: r.position(),
            payload: r.payload().to_vec(),
        }
    }

    /// to_request rebuilds the proposed request with the given status.
    pub fn to_request(&self, status: RequestStatus) -> Request {
        Request::from_parts(
            self.request_id,
            self.object_ids.clone(),
            self.payload.clone(),
            self.position,
            self.view,
            status,
        )
    }
}

impl PredPropose {
    pub fn new(view: View, r: &Request) -> PredPropose {
        PredPropose {
            view,
            request_id: r.id(),
            object_ids: r.object_ids().to_vec(),
            pred: r.pred().iter().copied().collect(),
            position: r.position(),
            payload: r.payload().to_vec(),
        }
    }

    pub fn to_request(&self, status: RequestStatus) -> Request {
        let mut r = Request::from_parts(
            self.request_id,
            self.object_ids.clone(),
            self.payload.clone(),
            self.position,
            self.view,
            status,
        );
        r.merge_pred(&self.pred);
        r
    }
}

impl ProposeReply {
    pub fn ack(view: View, request_id: RequestId, pred: Vec<RequestId>) -> ProposeReply {
        ProposeReply {
            view,
            request_id,
            vote: Vote::Ack { pred },
        }
    }

    pub fn nack(view: View, request_id: RequestId, max_position: Position) -> ProposeReply {
        ProposeReply {
            view,
            request_id,
            vote: Vote::Nack { max_position },
        }
    }

    pub fn is_ack(&self) -> bool {
        match self.vote {
            Vote::Ack { .. } => true,
            Vote::Nack { .. } => false,
        }
    }
}

impl RecoveredState {
    /// new reports the value held by a request.
    pub fn new(r: &Request) -> RecoveredState {
        RecoveredState {
            status: r.status(),
            accepted_view: r.view(),
            position: r.position(),
            pred: r.pred().iter().copied().collect(),
            object_ids: r.object_ids().to_vec(),
            payload: r.payload().to_vec(),
        }
    }
}

/// Factory of protocol messages.
///
/// ```ignore
/// let m = Message::fast_propose(&request);
/// let bytes = m.encode();
/// assert_eq!(m, Message::decode(&bytes)?);
/// ```
impl Message {
    pub fn fast_propose(r: &Request) -> Message {
        Message::FastPropose(Propose::new(r.view(), r))
    }

    pub fn slow_propose(view: View, r: &Request) -> Message {
        Message::SlowPropose(PredPropose::new(view, r))
    }

    pub fn retry(view: View, r: &Request) -> Message {
        Message::Retry(Propose::new(view, r))
    }

    pub fn stable(view: View, r: &Request) -> Message {
        Message::Stable(PredPropose::new(view, r))
    }

    /// propose builds the propose message of a phase.
    pub fn propose(phase: Phase, view: View, r: &Request) -> Message {
        match phase {
            Phase::Fast => Message::FastPropose(Propose::new(view, r)),
            Phase::Slow => Message::slow_propose(view, r),
            Phase::Retry => Message::retry(view, r),
        }
    }

    /// reply wraps a reply into the reply message of a phase.
    pub fn reply(phase: Phase, reply: ProposeReply) -> Message {
        match phase {
            Phase::Fast => Message::FastProposeReply(reply),
            Phase::Slow => Message::SlowProposeReply(reply),
            Phase::Retry => Message::RetryReply(reply),
        }
    }

    pub fn recovery(view: View, request_id: RequestId) -> Message {
        Message::Recovery(Recovery { view, request_id })
    }

    pub fn recovery_reply(
        view: View,
        request_id: RequestId,
        state: Option<RecoveredState>,
    ) -> Message {
        Message::RecoveryReply(RecoveryReply {
            view,
            request_id,
            state,
        })
    }

    pub fn collect(view: View, executed: Vec<RequestId>) -> Message {
        Message::Collect(Collect { view, executed })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::FastPropose(_) => "FastPropose",
            Message::FastProposeReply(_) => "FastProposeReply",
            Message::SlowPropose(_) => "SlowPropose",
            Message::SlowProposeReply(_) => "SlowProposeReply",
            Message::Retry(_) => "Retry",
            Message::RetryReply(_) => "RetryReply",
            Message::Stable(_) => "Stable",
            Message::Recovery(_) => "Recovery",
            Message::RecoveryReply(_) => "RecoveryReply",
            Message::Barrier(_) => "Barrier",
            Message::Alive(_) => "Alive",
            Message::Collect(_) => "Collect",
        }
    }

    pub fn view(&self) -> View {
        match self {
            Message::FastPropose(m) | Message::Retry(m) => m.view,
            Message::SlowPropose(m) | Message::Stable(m) => m.view,
            Message::FastProposeReply(m)
            | Message::SlowProposeReply(m)
            | Message::RetryReply(m) => m.view,
            Message::Recovery(m) => m.view,
            Message::RecoveryReply(m) => m.view,
            Message::Barrier(m) => m.view,
            Message::Alive(m) => m.view,
            Message::Collect(m) => m.view,
        }
    }

    /// request_id returns the request a message is about, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Message::FastPropose(m) | Message::Retry(m) => Some(m.request_id),
            Message::SlowPropose(m) | Message::Stable(m) => Some(m.request_id),
            Message::FastProposeReply(m)
            | Message::SlowProposeReply(m)
            | Message::RetryReply(m) => Some(m.request_id),
            Message::Recovery(m) => Some(m.request_id),
            Message::RecoveryReply(m) => Some(m.request_id),
            Message::Barrier(_) | Message::Alive(_) | Message::Collect(_) => None,
        }
    }

    /// as_reply returns the phase and the reply if it is one of the propose replies.
    pub fn as_reply(&self) -> Option<(Phase, &ProposeReply)> {
        match self {
            Message::FastProposeReply(m) => Some((Phase::Fast, m)),
            Message::SlowProposeReply(m) => Some((Phase::Slow, m)),
            Message::RetryReply(m) => Some((Phase::Retry, m)),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(view:{}", self.name(), self.view())?;
        if let Some(rid) = self.request_id() {
            write!(f, ", rid:{}", rid)?;
        }
        write!(f, ")")
    }
}
