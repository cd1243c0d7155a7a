use std::sync::Arc;
use std::time::Instant;

use crate::conf::Config;
use crate::engine::Caesar;
use crate::message::Message;
use crate::request::Request;
use crate::request::RequestId;
use crate::request::RequestStatus;

#[cfg(test)]
use pretty_assertions::assert_eq;

fn stable(position: i64, r: Request, pred: &[RequestId]) -> Message {
    let mut r = r;
    r.advance_position(position);
    r.merge_pred(pred);
    Message::stable(1, &r)
}

fn ids(rs: &[Request]) -> Vec<RequestId> {
    rs.iter().map(|r| r.id()).collect()
}

fn new_engine() -> Caesar {
    Caesar::new(0, Arc::new(Config::new(3)))
}

#[test]
fn test_delivery_in_predecessor_order() {
    let now = Instant::now();
    let mut c = new_engine();

    let a = req!((1, 1), [1]);
    let b = req!((2, 1), [1]);
    let x = req!((3, 1), [2]);

    // b arrives before its predecessor a.
    let out = c.handle_message(1, stable(2, b.clone(), &[a.id()]), now);
    assert_eq!(Vec::<RequestId>::new(), ids(&out.deliveries));
    assert_eq!(1, c.n_waiting());

    // unrelated requests are not held back
    let out = c.handle_message(1, stable(3, x.clone(), &[]), now);
    assert_eq!(vec![x.id()], ids(&out.deliveries));

    let out = c.handle_message(1, stable(1, a.clone(), &[]), now);
    assert_eq!(vec![a.id()], ids(&out.deliveries));
    assert_eq!(1, c.n_waiting());

    // b is released once a is executed, not before.
    let out = c.on_executed(a.id(), now);
    assert_eq!(vec![b.id()], ids(&out.deliveries));
    assert_eq!(0, c.n_waiting());

    assert_eq!(RequestStatus::Executed, c.request(&a.id()).unwrap().status());
    assert_eq!(RequestStatus::Stable, c.request(&b.id()).unwrap().status());

    let out = c.on_executed(b.id(), now);
    assert!(out.deliveries.is_empty());
}

#[test]
fn test_delivery_mutual_predecessors() {
    // Both requests have each other as predecessor: the lower key goes first.
    let cases = vec![true, false];

    for a_first in cases.into_iter() {
        let now = Instant::now();
        let mut c = new_engine();

        let a = req!((2, 1), [1]);
        let b = req!((1, 1), [1]);

        let ma = stable(1, a.clone(), &[b.id()]);
        let mb = stable(2, b.clone(), &[a.id()]);

        let mut delivered = vec![];
        let msgs = if a_first { vec![ma, mb] } else { vec![mb, ma] };
        for m in msgs.into_iter() {
            let out = c.handle_message(2, m, now);
            delivered.extend(ids(&out.deliveries));
        }
        assert_eq!(vec![a.id()], delivered, "a_first: {}", a_first);

        let out = c.on_executed(a.id(), now);
        assert_eq!(vec![b.id()], ids(&out.deliveries), "a_first: {}", a_first);
    }
}

#[test]
fn test_delivery_waits_for_pending_predecessor() {
    let now = Instant::now();
    let mut c = new_engine();

    let a = req!((1, 1), [1]);
    let b = req!((2, 1), [1]);

    // a is known but only pending
    c.handle_message(1, Message::fast_propose(&at(a.clone(), 3)), now);

    // Even though a will be ordered after b, b must wait until a is stable.
    let out = c.handle_message(1, stable(1, b.clone(), &[a.id()]), now);
    assert!(out.deliveries.is_empty());

    let out = c.handle_message(1, stable(3, a.clone(), &[b.id()]), now);
    assert_eq!(vec![b.id()], ids(&out.deliveries));

    let out = c.on_executed(b.id(), now);
    assert_eq!(vec![a.id()], ids(&out.deliveries));
}

#[test]
fn test_delivery_unknown_predecessor() {
    let now = Instant::now();
    let mut c = new_engine();

    let a = req!((1, 1), [1]);
    let b = req!((2, 1), [1]);
    let x = req!((3, 1), [1]);

    let unknown = |c: &Caesar| -> Vec<RequestId> {
        let mut rids: Vec<RequestId> = c
            .delivery
            .unknown_preds()
            .into_iter()
            .map(|(rid, _)| rid)
            .collect();
        rids.sort();
        rids
    };

    // b waits for a, but both a and x are looked for.
    c.handle_message(1, stable(3, b.clone(), &[a.id(), x.id()]), now);
    assert_eq!(vec![a.id(), x.id()], unknown(&c));
    assert_eq!(1, c.n_waiting());

    c.handle_message(1, stable(1, a.clone(), &[]), now);
    assert_eq!(vec![x.id()], unknown(&c));

    c.handle_message(1, stable(2, x.clone(), &[a.id()]), now);
    assert!(unknown(&c).is_empty());
}

#[test]
fn test_delivery_executed_unknown_request() {
    let now = Instant::now();
    let mut c = new_engine();

    let out = c.on_executed(reqid!(1, 1), now);
    assert!(out.is_empty());
}

fn at(mut r: Request, position: i64) -> Request {
    r.advance_position(position);
    r
}
