use std::convert::TryFrom;

use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;

use super::*;
use crate::request::ObjectId;
use crate::request::RequestId;
use crate::request::RequestStatus;

pub const FAST_PROPOSE: u8 = 0;
pub const FAST_PROPOSE_REPLY: u8 = 1;
pub const SLOW_PROPOSE: u8 = 2;
pub const SLOW_PROPOSE_REPLY: u8 = 3;
pub const RETRY: u8 = 4;
pub const RETRY_REPLY: u8 = 5;
pub const STABLE: u8 = 6;
pub const RECOVERY: u8 = 7;
pub const RECOVERY_REPLY: u8 = 8;
pub const BARRIER: u8 = 9;
pub const ALIVE: u8 = 10;
pub const COLLECT: u8 = 11;

const ACK: u8 = 0;
const NACK: u8 = 1;

/// Message type byte plus view.
const HEADER_SIZE: usize = 1 + 4;

/// Wire is implemented by every message body.
/// All integers are big-endian. Sequences are prefixed with an i32 count.
trait Wire {
    fn body_size(&self) -> usize;
    fn put(&self, buf: &mut BytesMut);
    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

/// Reader reads fields from a received buffer and never reads past its end.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, field: &'static str, want: usize) -> Result<(), DecodeError> {
        let remain = self.buf.remaining();
        if remain < want {
            return Err(DecodeError::Truncated(field, want, remain));
        }
        Ok(())
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        self.need(field, 1)?;
        Ok(self.buf.get_u8())
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        self.need(field, 4)?;
        Ok(self.buf.get_i32())
    }

    fn i64(&mut self, field: &'static str) -> Result<i64, DecodeError> {
        self.need(field, 8)?;
        Ok(self.buf.get_i64())
    }

    /// len reads a count prefix and checks that `len * elt_size` bytes are present,
    /// before anything is allocated for them.
    fn len(&mut self, field: &'static str, elt_size: usize) -> Result<usize, DecodeError> {
        let l = self.i32(field)?;
        let n = usize::try_from(l).map_err(|_| DecodeError::BadLength(field, l))?;
        self.need(field, n * elt_size)?;
        Ok(n)
    }

    fn request_id(&mut self) -> Result<RequestId, DecodeError> {
        let client_id = self.i32("client_id")?;
        let seq_number = self.i32("seq_number")?;
        Ok(RequestId::new(client_id, seq_number))
    }

    fn request_ids(&mut self, field: &'static str) -> Result<Vec<RequestId>, DecodeError> {
        let n = self.len(field, RequestId::BYTE_SIZE)?;
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            ids.push(self.request_id()?);
        }
        Ok(ids)
    }

    fn object_ids(&mut self) -> Result<Vec<ObjectId>, DecodeError> {
        let n = self.len("object_ids", 4)?;
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            ids.push(self.buf.get_i32());
        }
        Ok(ids)
    }

    fn payload(&mut self) -> Result<Vec<u8>, DecodeError> {
        let n = self.len("payload", 1)?;
        let p = self.buf[..n].to_vec();
        self.buf.advance(n);
        Ok(p)
    }
}

fn put_request_id(buf: &mut BytesMut, id: &RequestId) {
    buf.put_i32(id.client_id);
    buf.put_i32(id.seq_number);
}

fn put_request_ids(buf: &mut BytesMut, ids: &[RequestId]) {
    buf.put_i32(ids.len() as i32);
    for id in ids.iter() {
        put_request_id(buf, id);
    }
}

fn put_object_ids(buf: &mut BytesMut, ids: &[ObjectId]) {
    buf.put_i32(ids.len() as i32);
    for id in ids.iter() {
        buf.put_i32(*id);
    }
}

fn put_payload(buf: &mut BytesMut, p: &[u8]) {
    buf.put_i32(p.len() as i32);
    buf.put_slice(p);
}

fn ids_size(n: usize) -> usize {
    4 + n * RequestId::BYTE_SIZE
}

fn objs_size(n: usize) -> usize {
    4 + n * 4
}

fn payload_size(n: usize) -> usize {
    4 + n
}

impl Wire for Propose {
    fn body_size(&self) -> usize {
        RequestId::BYTE_SIZE
            + objs_size(self.object_ids.len())
            + 8
            + payload_size(self.payload.len())
    }

    fn put(&self, buf: &mut BytesMut) {
        put_request_id(buf, &self.request_id);
        put_object_ids(buf, &self.object_ids);
        buf.put_i64(self.position);
        put_payload(buf, &self.payload);
    }

    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Propose {
            view,
            request_id: r.request_id()?,
            object_ids: r.object_ids()?,
            position: r.i64("position")?,
            payload: r.payload()?,
        })
    }
}

impl Wire for PredPropose {
    fn body_size(&self) -> usize {
        RequestId::BYTE_SIZE
            + objs_size(self.object_ids.len())
            + ids_size(self.pred.len())
            + 8
            + payload_size(self.payload.len())
    }

    fn put(&self, buf: &mut BytesMut) {
        put_request_id(buf, &self.request_id);
        put_object_ids(buf, &self.object_ids);
        put_request_ids(buf, &self.pred);
        buf.put_i64(self.position);
        put_payload(buf, &self.payload);
    }

    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(PredPropose {
            view,
            request_id: r.request_id()?,
            object_ids: r.object_ids()?,
            pred: r.request_ids("pred")?,
            position: r.i64("position")?,
            payload: r.payload()?,
        })
    }
}

impl Wire for ProposeReply {
    fn body_size(&self) -> usize {
        let vote = match &self.vote {
            Vote::Ack { pred } => ids_size(pred.len()),
            Vote::Nack { .. } => 8,
        };
        RequestId::BYTE_SIZE + 1 + vote
    }

    fn put(&self, buf: &mut BytesMut) {
        put_request_id(buf, &self.request_id);
        match &self.vote {
            Vote::Ack { pred } => {
                buf.put_u8(ACK);
                put_request_ids(buf, pred);
            }
            Vote::Nack { max_position } => {
                buf.put_u8(NACK);
                buf.put_i64(*max_position);
            }
        }
    }

    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError> {
        let request_id = r.request_id()?;
        let vote = match r.u8("vote")? {
            ACK => Vote::Ack {
                pred: r.request_ids("pred")?,
            },
            NACK => Vote::Nack {
                max_position: r.i64("max_position")?,
            },
            b => return Err(DecodeError::BadStatus("vote", b)),
        };
        Ok(ProposeReply {
            view,
            request_id,
            vote,
        })
    }
}

impl Wire for Recovery {
    fn body_size(&self) -> usize {
        RequestId::BYTE_SIZE
    }

    fn put(&self, buf: &mut BytesMut) {
        put_request_id(buf, &self.request_id);
    }

    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Recovery {
            view,
            request_id: r.request_id()?,
        })
    }
}

impl Wire for RecoveryReply {
    fn body_size(&self) -> usize {
        let state = match &self.state {
            None => 0,
            Some(st) => {
                1 + 4
                    + 8
                    + ids_size(st.pred.len())
                    + objs_size(st.object_ids.len())
                    + payload_size(st.payload.len())
            }
        };
        RequestId::BYTE_SIZE + 1 + state
    }

    fn put(&self, buf: &mut BytesMut) {
        put_request_id(buf, &self.request_id);
        match &self.state {
            None => buf.put_u8(0),
            Some(st) => {
                buf.put_u8(1);
                buf.put_u8(st.status.to_u8());
                buf.put_i32(st.accepted_view);
                buf.put_i64(st.position);
                put_request_ids(buf, &st.pred);
                put_object_ids(buf, &st.object_ids);
                put_payload(buf, &st.payload);
            }
        }
    }

    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError> {
        let request_id = r.request_id()?;
        let state = match r.u8("known")? {
            0 => None,
            1 => {
                let b = r.u8("status")?;
                let status =
                    RequestStatus::from_u8(b).ok_or(DecodeError::BadStatus("status", b))?;
                Some(RecoveredState {
                    status,
                    accepted_view: r.i32("accepted_view")?,
                    position: r.i64("position")?,
                    pred: r.request_ids("pred")?,
                    object_ids: r.object_ids()?,
                    payload: r.payload()?,
                })
            }
            b => return Err(DecodeError::BadStatus("known", b)),
        };
        Ok(RecoveryReply {
            view,
            request_id,
            state,
        })
    }
}

impl Wire for Barrier {
    fn body_size(&self) -> usize {
        0
    }

    fn put(&self, _buf: &mut BytesMut) {}

    fn get(view: i32, _r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Barrier { view })
    }
}

impl Wire for Alive {
    fn body_size(&self) -> usize {
        8
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_i64(self.executed);
    }

    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Alive {
            view,
            executed: r.i64("executed")?,
        })
    }
}

impl Wire for Collect {
    fn body_size(&self) -> usize {
        ids_size(self.executed.len())
    }

    fn put(&self, buf: &mut BytesMut) {
        put_request_ids(buf, &self.executed);
    }

    fn get(view: i32, r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Collect {
            view,
            executed: r.request_ids("executed")?,
        })
    }
}

impl Message {
    /// msg_type returns the leading discriminant byte of the encoded message.
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::FastPropose(_) => FAST_PROPOSE,
            Message::FastProposeReply(_) => FAST_PROPOSE_REPLY,
            Message::SlowPropose(_) => SLOW_PROPOSE,
            Message::SlowProposeReply(_) => SLOW_PROPOSE_REPLY,
            Message::Retry(_) => RETRY,
            Message::RetryReply(_) => RETRY_REPLY,
            Message::Stable(_) => STABLE,
            Message::Recovery(_) => RECOVERY,
            Message::RecoveryReply(_) => RECOVERY_REPLY,
            Message::Barrier(_) => BARRIER,
            Message::Alive(_) => ALIVE,
            Message::Collect(_) => COLLECT,
        }
    }

    /// byte_size is the exact length of `encode()`.
    pub fn byte_size(&self) -> usize {
        HEADER_SIZE + self.body().body_size()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.byte_size());
        self.encode_to(&mut buf);
        buf.to_vec()
    }

    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.byte_size());
        buf.put_u8(self.msg_type());
        buf.put_i32(self.view());
        self.body().put(buf);
    }

    /// decode parses exactly one message from `buf`.
    /// Any malformed input is reported as an error, the caller decides to drop it.
    pub fn decode(buf: &[u8]) -> Result<Message, DecodeError> {
        let mut r = Reader { buf };
        let t = r.u8("type")?;
        let view = r.i32("view")?;

        let m = match t {
            FAST_PROPOSE => Message::FastPropose(Propose::get(view, &mut r)?),
            FAST_PROPOSE_REPLY => Message::FastProposeReply(ProposeReply::get(view, &mut r)?),
            SLOW_PROPOSE => Message::SlowPropose(PredPropose::get(view, &mut r)?),
            SLOW_PROPOSE_REPLY => Message::SlowProposeReply(ProposeReply::get(view, &mut r)?),
            RETRY => Message::Retry(Propose::get(view, &mut r)?),
            RETRY_REPLY => Message::RetryReply(ProposeReply::get(view, &mut r)?),
            STABLE => Message::Stable(PredPropose::get(view, &mut r)?),
            RECOVERY => Message::Recovery(Recovery::get(view, &mut r)?),
            RECOVERY_REPLY => Message::RecoveryReply(RecoveryReply::get(view, &mut r)?),
            BARRIER => Message::Barrier(Barrier::get(view, &mut r)?),
            ALIVE => Message::Alive(Alive::get(view, &mut r)?),
            COLLECT => Message::Collect(Collect::get(view, &mut r)?),
            _ => return Err(DecodeError::UnknownType(t)),
        };

        let remain = r.buf.remaining();
        if remain > 0 {
            return Err(DecodeError::Trailing(remain));
        }

        Ok(m)
    }

    fn body(&self) -> &dyn Wire {
        match self {
            Message::FastPropose(m) | Message::Retry(m) => m,
            Message::SlowPropose(m) | Message::Stable(m) => m,
            Message::FastProposeReply(m)
            | Message::SlowProposeReply(m)
            | Message::RetryReply(m) => m,
            Message::Recovery(m) => m,
            Message::RecoveryReply(m) => m,
            Message::Barrier(m) => m,
            Message::Alive(m) => m,
            Message::Collect(m) => m,
        }
    }
}
