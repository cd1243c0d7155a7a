use std::collections::BTreeSet;
use std::fmt;

use super::Conflict;
use super::RequestStatus;

pub type ClientId = i32;
pub type SeqNumber = i32;
pub type ObjectId = i32;

/// Sequence number of the first request of a client.
pub const FIRST_SEQ: SeqNumber = 1;

/// Position is the logical slot used to linearize conflicting requests.
pub type Position = i64;

/// View is the ballot of a coordination attempt for a request.
pub type View = i32;

/// RequestId identifies a client command: the `seq_number`-th command of a client.
/// It is ordered by client id first, which is also the tie-breaker of two requests at the same
/// position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId {
    pub client_id: ClientId,
    pub seq_number: SeqNumber,
}

impl RequestId {
    /// Number of bytes of an encoded RequestId: two 4-byte integers.
    pub const BYTE_SIZE: usize = 8;

    pub fn new(client_id: ClientId, seq_number: SeqNumber) -> RequestId {
        RequestId {
            client_id,
            seq_number,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client_id, self.seq_number)
    }
}

impl<A: Into<ClientId> + Copy, B: Into<SeqNumber> + Copy> From<(A, B)> for RequestId {
    fn from(t: (A, B)) -> RequestId {
        RequestId {
            client_id: t.0.into(),
            seq_number: t.1.into(),
        }
    }
}

impl<A: Into<ClientId> + Copy, B: Into<SeqNumber> + Copy> From<&(A, B)> for RequestId {
    fn from(t: &(A, B)) -> RequestId {
        RequestId {
            client_id: t.0.into(),
            seq_number: t.1.into(),
        }
    }
}

/// Request is one client command along with the ordering metadata the protocol attaches to it.
///
/// `id`, `object_ids` and `payload` never change after creation.
/// `position`, `pred`, `status` and `view` are only written by the engine and never move back:
/// - `pred` grows by union,
/// - `position` only moves upward,
/// - `status` and `view` only move forward.
///
/// A replica keeps its tentative votes for a request apart from the request itself, so the copy
/// of a pending request holds no position or predecessors until the agreed value is installed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    id: RequestId,
    object_ids: Vec<ObjectId>,
    payload: Vec<u8>,

    position: Position,
    pred: BTreeSet<RequestId>,
    status: RequestStatus,
    view: View,
}

impl Request {
    pub fn new(id: RequestId, object_ids: Vec<ObjectId>, payload: Vec<u8>) -> Request {
        Request {
            id,
            object_ids,
            payload,
            ..Default::default()
        }
    }

    /// from_parts rebuilds a request received from a peer.
    pub(crate) fn from_parts(
        id: RequestId,
        object_ids: Vec<ObjectId>,
        payload: Vec<u8>,
        position: Position,
        view: View,
        status: RequestStatus,
    ) -> Request {
        Request {
            id,
            object_ids,
            payload,
            position,
            pred: BTreeSet::new(),
            status,
            view,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn object_ids(&self) -> &[ObjectId] {
        &self.object_ids
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn pred(&self) -> &BTreeSet<RequestId> {
        &self.pred
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// key is the total order of requests: by position, then by id.
    pub fn key(&self) -> (Position, RequestId) {
        (self.position, self.id)
    }

    pub fn is_decided(&self) -> bool {
        self.status.is_decided()
    }

    /// merge_pred unions `ids` into pred and returns the number of newly added ids.
    /// A request is never its own predecessor.
    pub(crate) fn merge_pred<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a RequestId>,
    {
        let mut added = 0;
        for id in ids {
            if *id != self.id && self.pred.insert(*id) {
                added += 1;
            }
        }
        added
    }

    /// advance_position moves the request to `position` if it is higher than the current one.
    pub(crate) fn advance_position(&mut self, position: Position) -> bool {
        if position > self.position {
            self.position = position;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_status(&mut self, status: RequestStatus) -> bool {
        if status > self.status {
            self.status = status;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_view(&mut self, view: View) -> bool {
        if view > self.view {
            self.view = view;
            true
        } else {
            false
        }
    }

    /// decide installs the agreed position and predecessors and makes the request Stable.
    /// Installing a value never lowers the position or removes a predecessor.
    pub(crate) fn decide(&mut self, position: Position, pred: &BTreeSet<RequestId>, view: View) {
        self.advance_position(position);
        self.merge_pred(pred);
        self.set_view(view);
        self.set_status(RequestStatus::Stable);
    }
}

impl Conflict for Request {
    /// Two requests conflict iff they touch at least one common object.
    fn conflict(&self, with: &Self) -> bool {
        if self.id == with.id {
            return false;
        }
        self.object_ids
            .iter()
            .any(|oid| with.object_ids.contains(oid))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{id:{}, objs:{:?}, pos:{}, view:{}, status:{:?}, pred:[",
            self.id, self.object_ids, self.position, self.view, self.status
        )?;
        for (i, p) in self.pred.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "]}}")
    }
}
