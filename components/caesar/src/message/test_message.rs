use crate::message::*;
use crate::request::RequestStatus;

#[cfg(test)]
use pretty_assertions::assert_eq;

fn all_messages() -> Vec<Message> {
    let mut r = req!((1, 2), [3, 4], "set x");
    r.advance_position(7);
    r.merge_pred(&reqids![(5, 6), (7, 8)]);
    r.set_status(RequestStatus::SlowPending);
    r.set_view(4);

    vec![
        Message::fast_propose(&r),
        Message::reply(
            Phase::Fast,
            ProposeReply::ack(0, r.id(), reqids![(5, 6)]),
        ),
        Message::slow_propose(3, &r),
        Message::reply(Phase::Slow, ProposeReply::nack(3, r.id(), 12)),
        Message::retry(6, &r),
        Message::reply(Phase::Retry, ProposeReply::ack(6, r.id(), vec![])),
        Message::stable(6, &r),
        Message::recovery(8, r.id()),
        Message::recovery_reply(8, r.id(), None),
        Message::recovery_reply(8, r.id(), Some(RecoveredState::new(&r))),
        Message::Barrier(Barrier { view: 2 }),
        Message::Alive(Alive {
            view: 2,
            executed: 1 << 40,
        }),
        Message::collect(0, reqids![(1, 1), (2, 2), (3, 3)]),
        Message::collect(0, vec![]),
    ]
}

#[test]
fn test_message_encode_decode() {
    for m in all_messages().iter() {
        let bytes = m.encode();
        assert_eq!(m.byte_size(), bytes.len(), "{}", m);
        assert_eq!(m.msg_type(), bytes[0], "{}", m);

        let got = Message::decode(&bytes).unwrap();
        assert_eq!(m, &got);
    }
}

#[test]
fn test_message_encode_to_appends() {
    let msgs = all_messages();
    let mut buf = bytes::BytesMut::new();
    let mut offsets = vec![];

    for m in msgs.iter() {
        offsets.push(buf.len());
        m.encode_to(&mut buf);
    }
    offsets.push(buf.len());

    for (i, m) in msgs.iter().enumerate() {
        let got = Message::decode(&buf[offsets[i]..offsets[i + 1]]).unwrap();
        assert_eq!(m, &got);
    }
}

#[test]
fn test_message_types() {
    let want: Vec<u8> = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 8, 9, 10, 11, 11];
    let got: Vec<u8> = all_messages().iter().map(|m| m.msg_type()).collect();
    assert_eq!(want, got);
}

#[test]
fn test_message_reply_layout() {
    let ack = Message::reply(Phase::Fast, ProposeReply::ack(2, reqid!(1, 2), reqids![(3, 4)]));
    assert_eq!(
        vec![
            1, // type
            0, 0, 0, 2, // view
            0, 0, 0, 1, 0, 0, 0, 2, // request id
            0, // ack
            0, 0, 0, 1, // pred count
            0, 0, 0, 3, 0, 0, 0, 4, // pred[0]
        ],
        ack.encode()
    );

    let nack = Message::reply(Phase::Retry, ProposeReply::nack(2, reqid!(1, 2), 258));
    assert_eq!(
        vec![
            5, // type
            0, 0, 0, 2, // view
            0, 0, 0, 1, 0, 0, 0, 2, // request id
            1, // nack
            0, 0, 0, 0, 0, 0, 1, 2, // max position
        ],
        nack.encode()
    );
}

#[test]
fn test_message_propose_layout() {
    let mut r = req!((1, 2), [9], "ab");
    r.advance_position(3);

    assert_eq!(
        vec![
            0, // type
            0, 0, 0, 0, // view
            0, 0, 0, 1, 0, 0, 0, 2, // request id
            0, 0, 0, 1, 0, 0, 0, 9, // object ids
            0, 0, 0, 0, 0, 0, 0, 3, // position
            0, 0, 0, 2, b'a', b'b', // payload
        ],
        Message::fast_propose(&r).encode()
    );
}

#[test]
fn test_message_decode_error() {
    let fast = Message::fast_propose(&req!((1, 2), [3], "xyz")).encode();
    let reply = Message::reply(Phase::Slow, ProposeReply::nack(0, reqid!(1, 1), 3)).encode();

    let mut bad_vote = reply.clone();
    bad_vote[13] = 7;

    let mut negative_len = fast.clone();
    negative_len[13..17].copy_from_slice(&(-1i32).to_be_bytes());

    let mut huge_len = fast.clone();
    huge_len[13..17].copy_from_slice(&(1i32 << 30).to_be_bytes());

    let mut trailing = fast.clone();
    trailing.push(0);

    let cases: Vec<(Vec<u8>, DecodeError)> = vec![
        (vec![], DecodeError::Truncated("type", 1, 0)),
        (vec![42, 0, 0, 0, 0], DecodeError::UnknownType(42)),
        (vec![0, 0, 0], DecodeError::Truncated("view", 4, 2)),
        (fast[..fast.len() - 1].to_vec(), DecodeError::Truncated("payload", 3, 2)),
        (reply[..20].to_vec(), DecodeError::Truncated("max_position", 8, 6)),
        (bad_vote, DecodeError::BadStatus("vote", 7)),
        (negative_len, DecodeError::BadLength("object_ids", -1)),
        (huge_len, DecodeError::Truncated("object_ids", 4 << 30, 19)),
        (trailing, DecodeError::Trailing(1)),
    ];

    for (bs, want) in cases.into_iter() {
        assert_eq!(Err(want), Message::decode(&bs), "{:?}", bs);
    }
}

#[test]
fn test_message_recovery_reply_bad_status() {
    let r = req!((1, 2), [3]);
    let mut bs = Message::recovery_reply(1, r.id(), Some(RecoveredState::new(&r))).encode();

    // type, view, request id, known
    assert_eq!(1, bs[13]);
    bs[14] = 9;
    assert_eq!(
        Err(DecodeError::BadStatus("status", 9)),
        Message::decode(&bs)
    );

    bs[13] = 2;
    assert_eq!(Err(DecodeError::BadStatus("known", 2)), Message::decode(&bs));
}

#[test]
fn test_message_to_request() {
    let mut r = req!((1, 2), [3, 4], "foo");
    r.advance_position(5);
    r.merge_pred(&reqids![(9, 9)]);

    let m = PredPropose::new(3, &r);
    let got = m.to_request(RequestStatus::SlowPending);
    assert_eq!(r.id(), got.id());
    assert_eq!(r.object_ids(), got.object_ids());
    assert_eq!(r.payload(), got.payload());
    assert_eq!(5, got.position());
    assert_eq!(3, got.view());
    assert_eq!(r.pred(), got.pred());
    assert_eq!(RequestStatus::SlowPending, got.status());

    // no pred in a fast propose
    let got = Propose::new(0, &r).to_request(RequestStatus::FastPending);
    assert!(got.pred().is_empty());
    assert_eq!(5, got.position());
}

#[test]
fn test_message_phase() {
    let reply = ProposeReply::ack(1, reqid!(1, 1), vec![]);

    for phase in vec![Phase::Fast, Phase::Slow, Phase::Retry].into_iter() {
        let m = Message::reply(phase, reply.clone());
        assert_eq!(Some((phase, &reply)), m.as_reply());
        assert_eq!(Some(reqid!(1, 1)), m.request_id());
        assert_eq!(1, m.view());
    }

    assert_eq!(None, Message::recovery(1, reqid!(1, 1)).as_reply());
    assert_eq!(None, Message::collect(0, vec![]).request_id());
    assert_eq!(
        "Recovery(view:1, rid:1:1)",
        format!("{}", Message::recovery(1, reqid!(1, 1)))
    );
}
