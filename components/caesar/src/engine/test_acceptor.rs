use std::sync::Arc;
use std::time::Instant;

use crate::conf::Config;
use crate::engine::Caesar;
use crate::engine::Output;
use crate::engine::Target;
use crate::message::Message;
use crate::message::ProposeReply;
use crate::message::Vote;
use crate::request::Request;
use crate::request::RequestId;
use crate::request::RequestStatus;

#[cfg(test)]
use pretty_assertions::assert_eq;

fn new_engine(n: usize) -> Caesar {
    Caesar::new(0, Arc::new(Config::new(n)))
}

fn at(mut r: Request, position: i64) -> Request {
    r.advance_position(position);
    r
}

fn with_pred(mut r: Request, pred: &[RequestId]) -> Request {
    r.merge_pred(pred);
    r
}

fn reply_to(to: usize, msg: Message) -> Output {
    Output {
        messages: vec![(Target::Replica(to), msg)],
        deliveries: vec![],
    }
}

#[test]
fn test_acceptor_vote() {
    let now = Instant::now();
    let mut c = new_engine(3);

    let a = at(req!((1, 1), [1]), 1);
    let b = at(req!((2, 1), [1]), 2);
    let x = at(req!((3, 1), [1]), 1);
    let y = at(req!((4, 1), [2]), 1);

    let cases = vec![
        // first request on object 1
        (&a, ProposeReply::ack(0, a.id(), vec![])),
        // ordered after a
        (&b, ProposeReply::ack(0, b.id(), reqids![(1, 1)])),
        // ordered between a and b, but b does not wait for it
        (&x, ProposeReply::nack(0, x.id(), 2)),
        // no conflict
        (&y, ProposeReply::ack(0, y.id(), vec![])),
    ];

    for (r, want) in cases.into_iter() {
        let out = c.handle_message(1, Message::fast_propose(r), now);
        assert_eq!(reply_to(1, Message::FastProposeReply(want)), out, "{}", r);
    }

    // votes are kept in the ballot, the request itself is not decided
    let local_b: Vec<RequestId> = c.requests[&b.id()].pred().iter().copied().collect();
    assert_eq!(reqids![(1, 1)], local_b);
    assert_eq!(0, c.request(&b.id()).unwrap().position());
    assert!(c.request(&b.id()).unwrap().pred().is_empty());

    // an ACK in the fast round is the value accepted in view 0
    let st = c.requests[&b.id()].report();
    assert_eq!(RequestStatus::SlowPending, st.status);
    assert_eq!((0, 2, reqids![(1, 1)]), (st.accepted_view, st.position, st.pred));

    // a rejected proposal is still tracked so that later votes see it
    assert_eq!(RequestStatus::FastPending, c.request(&x.id()).unwrap().status());
    assert_eq!(Some(1), c.ballot_position(&x.id()));
    assert_eq!(None, c.requests[&x.id()].ballot.accepted);

    assert_eq!(2, c.clock);
}

#[test]
fn test_acceptor_vote_higher_request_waits_for_proposal() {
    let now = Instant::now();
    let mut c = new_engine(3);

    let x = at(req!((3, 1), [1]), 1);
    let b = with_pred(at(req!((2, 1), [1]), 2), &[x.id()]);

    // b is proposed with x as a predecessor before x is proposed.
    let out = c.handle_message(2, Message::slow_propose(1, &b), now);
    assert_eq!(
        reply_to(2, Message::SlowProposeReply(ProposeReply::ack(1, b.id(), vec![]))),
        out
    );

    let out = c.handle_message(1, Message::fast_propose(&x), now);
    assert_eq!(
        reply_to(1, Message::FastProposeReply(ProposeReply::ack(0, x.id(), vec![]))),
        out
    );
}

#[test]
fn test_acceptor_vote_by_key() {
    let c = {
        let now = Instant::now();
        let mut c = new_engine(3);
        let a = at(req!((2, 1), [1]), 3);
        c.handle_message(1, Message::fast_propose(&a), now);
        c
    };

    // same position: the request id decides the order
    let cases = vec![
        (at(req!((1, 1), [1]), 3), Vote::Nack { max_position: 3 }),
        (at(req!((3, 1), [1]), 3), Vote::Ack { pred: reqids![(2, 1)] }),
        (at(req!((1, 1), [1]), 4), Vote::Ack { pred: reqids![(2, 1)] }),
        (at(req!((9, 1), [1]), 2), Vote::Nack { max_position: 3 }),
        (at(req!((9, 1), [7]), 2), Vote::Ack { pred: vec![] }),
    ];

    for (r, want) in cases.into_iter() {
        assert_eq!(want, c.vote(&r), "{}", r);
    }
}

#[test]
fn test_acceptor_stale_view() {
    let now = Instant::now();
    let mut c = new_engine(3);

    let a = at(req!((1, 1), [1]), 1);

    let out = c.handle_message(1, Message::slow_propose(4, &a), now);
    assert_eq!(
        reply_to(1, Message::SlowProposeReply(ProposeReply::ack(4, a.id(), vec![]))),
        out
    );
    assert_eq!(4, c.promised_view(&a.id()));

    // A lower view is rejected with the promised view.
    let b = at(req!((1, 1), [1]), 2);
    let out = c.handle_message(2, Message::retry(1, &b), now);
    assert_eq!(
        reply_to(2, Message::RetryReply(ProposeReply::nack(4, a.id(), 2))),
        out
    );

    // and does not change the local copy
    assert_eq!(Some(1), c.ballot_position(&a.id()));
    assert_eq!(4, c.request(&a.id()).unwrap().view());
}

#[test]
fn test_acceptor_accept_moves_forward() {
    let now = Instant::now();
    let mut c = new_engine(3);

    let a = at(req!((1, 1), [1]), 1);
    c.handle_message(1, Message::fast_propose(&a), now);

    let a2 = with_pred(at(req!((1, 1), [1]), 3), &reqids![(5, 5)]);
    c.handle_message(1, Message::slow_propose(1, &a2), now);

    let local = c.request(&a.id()).unwrap();
    assert_eq!(1, local.view());
    assert_eq!(RequestStatus::SlowPending, local.status());

    let st = c.requests[&a.id()].report();
    assert_eq!(RequestStatus::SlowPending, st.status);
    assert_eq!((1, 3, reqids![(5, 5)]), (st.accepted_view, st.position, st.pred));
    assert_eq!(Some(3), c.ballot_position(&a.id()));

    // the conflict index follows the new key
    assert_eq!(1, c.index.len(1));
    assert_eq!(
        Vote::Ack {
            pred: reqids![(1, 1)]
        },
        c.vote(&at(req!((2, 1), [1]), 4))
    );
}

#[test]
fn test_acceptor_decided_request_answers_stable() {
    let now = Instant::now();
    let mut c = new_engine(3);

    let a = with_pred(at(req!((1, 1), [1]), 2), &reqids![(2, 1)]);
    c.handle_message(2, Message::stable(3, &a), now);

    let local = c.request(&a.id()).unwrap().clone();
    assert_eq!(RequestStatus::Stable, local.status());
    assert_eq!(3, local.view());

    let proposed = at(req!((1, 1), [1]), 1);
    let out = c.handle_message(1, Message::fast_propose(&proposed), now);
    assert_eq!(reply_to(1, Message::stable(3, &local)), out);

    // a second Stable of the same request changes nothing
    let other = at(req!((1, 1), [1]), 9);
    let out = c.handle_message(1, Message::stable(5, &other), now);
    assert!(out.is_empty());
    assert_eq!(&local, c.request(&a.id()).unwrap());
}

#[test]
fn test_acceptor_accept_ignores_conflicts() {
    let now = Instant::now();
    let mut c = new_engine(3);

    let a = at(req!((1, 1), [1]), 2);
    c.handle_message(1, Message::fast_propose(&a), now);

    // a vote on b would be rejected: a is ordered after it without waiting for it
    let b = at(req!((0, 1), [1]), 1);
    assert_eq!(Vote::Nack { max_position: 2 }, c.vote(&b));

    // but a value proposed in a slow round is accepted on its view alone
    let out = c.handle_message(2, Message::slow_propose(3, &b), now);
    assert_eq!(
        reply_to(2, Message::SlowProposeReply(ProposeReply::ack(3, b.id(), vec![]))),
        out
    );

    let st = c.requests[&b.id()].report();
    assert_eq!(RequestStatus::SlowPending, st.status);
    assert_eq!((3, 1), (st.accepted_view, st.position));
    assert_eq!(3, c.promised_view(&b.id()));
}

#[test]
fn test_acceptor_stable_decides_once() {
    let now = Instant::now();
    let mut c = new_engine(3);

    let a = with_pred(at(req!((1, 1), [1]), 5), &reqids![(7, 7)]);
    c.handle_message(1, Message::slow_propose(1, &a), now);

    // decided at a lower position and without (7, 7)
    let decided = with_pred(at(req!((1, 1), [1]), 2), &reqids![(8, 8)]);
    c.handle_message(1, Message::stable(1, &decided), now);

    let local = c.request(&a.id()).unwrap().clone();
    assert_eq!(2, local.position());
    assert_eq!(
        reqids![(8, 8)],
        local.pred().iter().copied().collect::<Vec<_>>()
    );
    assert_eq!(RequestStatus::Stable, local.status());

    // the decided key replaces the one voted on
    assert_eq!(Some(2), c.ballot_position(&a.id()));
    assert_eq!(1, c.index.len(1));
    assert_eq!(
        Vote::Nack { max_position: 2 },
        c.vote(&at(req!((0, 1), [1]), 1))
    );

    // neither a later Stable nor a later proposal moves it
    let other = with_pred(at(req!((1, 1), [1]), 9), &reqids![(9, 9)]);
    c.handle_message(2, Message::stable(4, &other), now);
    c.handle_message(2, Message::slow_propose(4, &other), now);
    assert_eq!(&local, c.request(&a.id()).unwrap());
}
