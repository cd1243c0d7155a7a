use std::sync::Arc;
use std::time::Instant;

use crate::conf::Config;
use crate::engine::Caesar;
use crate::engine::Output;
use crate::engine::Target;
use crate::message::Message;
use crate::message::ProposeReply;
use crate::request::Request;
use crate::request::RequestId;
use crate::testutil::SimCluster;

#[cfg(test)]
use pretty_assertions::assert_eq;

fn at(mut r: Request, position: i64) -> Request {
    r.advance_position(position);
    r
}

fn engine_with_batch(gc_batch: usize) -> Caesar {
    let mut conf = Config::new(3);
    conf.gc_batch = gc_batch;
    Caesar::new(0, Arc::new(conf))
}

/// retired_engine returns an engine on which `a` at position 5 is executed everywhere.
fn retired_engine(a: &Request) -> Caesar {
    let now = Instant::now();
    let mut c = engine_with_batch(1);

    c.handle_message(1, Message::stable(1, &at(a.clone(), 5)), now);
    c.on_executed(a.id(), now);
    for from in 0..3 {
        c.handle_message(from, Message::collect(0, vec![a.id()]), now);
    }
    c
}

#[test]
fn test_gc_collect_batch() {
    let now = Instant::now();
    let a = req!((1, 1), [1]);
    let b = req!((2, 1), [2]);

    let cases = vec![
        // gc_batch, output of executing a, output of executing b
        (1, vec![a.id()], vec![b.id()]),
        (2, vec![], vec![a.id(), b.id()]),
    ];

    for (batch, want_a, want_b) in cases.into_iter() {
        let mut c = engine_with_batch(batch);
        c.handle_message(1, Message::stable(1, &at(a.clone(), 1)), now);
        c.handle_message(1, Message::stable(1, &at(b.clone(), 1)), now);

        let collected = |out: Output| -> Vec<_> {
            out.messages
                .into_iter()
                .filter_map(|(target, m)| match m {
                    Message::Collect(col) => {
                        assert_eq!(Target::All, target);
                        Some(col.executed)
                    }
                    _ => None,
                })
                .flatten()
                .collect()
        };

        assert_eq!(want_a, collected(c.on_executed(a.id(), now)), "batch {}", batch);
        assert_eq!(want_b, collected(c.on_executed(b.id(), now)), "batch {}", batch);
    }
}

#[test]
fn test_gc_flush_on_tick() {
    let now = Instant::now();
    let mut c = engine_with_batch(16);

    let a = req!((1, 1), [1]);
    c.handle_message(1, Message::stable(1, &at(a.clone(), 1)), now);

    let out = c.on_executed(a.id(), now);
    assert!(out.messages.is_empty());

    let out = c.tick(now);
    assert_eq!(
        vec![(Target::All, Message::collect(0, vec![a.id()]))],
        out.messages
    );

    // nothing left to flush
    let out = c.tick(now);
    assert!(out.is_empty());
}

#[test]
fn test_gc_retire() {
    let now = Instant::now();
    let mut c = engine_with_batch(1);

    let a = req!((1, 1), [1]);
    c.handle_message(1, Message::stable(1, &at(a.clone(), 5)), now);
    c.on_executed(a.id(), now);

    // not every replica executed it yet
    c.handle_message(0, Message::collect(0, vec![a.id()]), now);
    c.handle_message(1, Message::collect(0, vec![a.id()]), now);
    c.handle_message(1, Message::collect(0, vec![a.id()]), now);
    assert!(!c.is_retired(&a.id()));

    // unknown replica
    c.handle_message(7, Message::collect(0, vec![a.id()]), now);
    assert!(!c.is_retired(&a.id()));

    c.handle_message(2, Message::collect(0, vec![a.id()]), now);
    assert!(c.is_retired(&a.id()));
    assert_eq!(1, c.n_retired());
    assert_eq!(0, c.n_tracked());
    assert_eq!(0, c.index.len(1));
    assert_eq!(Some(5), c.index.watermark(&[1]));
}

#[test]
fn test_gc_retired_request() {
    let now = Instant::now();
    let a = req!((1, 1), [1]);
    let mut c = retired_engine(&a);
    assert!(c.is_retired(&a.id()));

    // Late messages of a retired request are dropped.
    let cases = vec![
        Message::fast_propose(&at(a.clone(), 1)),
        Message::slow_propose(3, &at(a.clone(), 1)),
        Message::stable(3, &at(a.clone(), 1)),
        Message::recovery(4, a.id()),
    ];
    for m in cases.into_iter() {
        let out = c.handle_message(1, m.clone(), now);
        assert!(out.is_empty(), "{}", m);
    }
    assert_eq!(0, c.n_tracked());

    assert!(c.propose(a.clone(), now).is_empty());

    // A retired predecessor does not hold anything back.
    let x = req!((2, 1), [1]);
    let mut sx = at(x.clone(), 9);
    sx.merge_pred(&[a.id()]);
    let out = c.handle_message(1, Message::stable(1, &sx), now);
    assert_eq!(vec![x.id()], out.deliveries.iter().map(|r| r.id()).collect::<Vec<_>>());
}

#[test]
fn test_gc_watermark_rejects_lower_position() {
    let now = Instant::now();
    let a = req!((1, 1), [1, 2]);
    let mut c = retired_engine(&a);

    let cases = vec![
        (at(req!((2, 1), [1]), 3), ProposeReply::nack(0, reqid!(2, 1), 5)),
        (at(req!((3, 1), [2]), 5), ProposeReply::nack(0, reqid!(3, 1), 5)),
        // (2, 1) is tracked even though it was rejected
        (
            at(req!((4, 1), [1]), 6),
            ProposeReply::ack(0, reqid!(4, 1), reqids![(2, 1)]),
        ),
        (at(req!((5, 1), [3]), 1), ProposeReply::ack(0, reqid!(5, 1), vec![])),
    ];

    for (r, want) in cases.into_iter() {
        let out = c.handle_message(1, Message::fast_propose(&r), now);
        assert_eq!(
            vec![(Target::Replica(1), Message::FastProposeReply(want))],
            out.messages,
            "{}",
            r
        );
    }
}

#[test]
fn test_gc_cluster() {
    let mut conf = Config::new(3);
    conf.gc_batch = 1;
    let mut sim = SimCluster::with_conf(conf);

    let a = req!((1, 1), [1]);
    let b = req!((2, 1), [1]);

    sim.propose(0, a.clone());
    sim.run();

    for rid in 0..3 {
        assert!(sim.replicas[rid].is_retired(&a.id()));
        assert_eq!(0, sim.replicas[rid].n_tracked());
    }

    // A later request on the same object is ordered above the retired one.
    sim.propose(1, b.clone());
    sim.run();

    for rid in 0..3 {
        assert_eq!(vec![a.id(), b.id()], sim.delivered_ids(rid));
        assert!(sim.replicas[rid].is_retired(&b.id()));
        assert_eq!(2, sim.replicas[rid].n_retired());
    }
}

#[test]
fn test_gc_retired_watermark_per_client() {
    let now = Instant::now();
    let mut c = engine_with_batch(1);

    let retire = |c: &mut Caesar, rid: RequestId| {
        for from in 0..3 {
            c.handle_message(from, Message::collect(0, vec![rid]), now);
        }
    };

    // retired, ids retired out of order afterwards
    let cases = vec![
        (reqid!(1, 2), 1),
        (reqid!(1, 3), 2),
        // fills the gap: 1 to 3 are below the watermark of client 1
        (reqid!(1, 1), 0),
        (reqid!(1, 5), 1),
        (reqid!(2, 1), 1),
        (reqid!(2, 2), 1),
        (reqid!(1, 0), 2),
    ];

    for (i, (rid, want)) in cases.iter().enumerate() {
        retire(&mut c, *rid);
        assert!(c.is_retired(rid), "{}", rid);
        assert_eq!(*want, c.collector.n_out_of_order(), "{}", rid);
        assert_eq!(i + 1, c.n_retired(), "{}", rid);
    }

    for rid in reqids![(1, 4), (1, 6), (2, 3), (3, 1), (1, -1)].iter() {
        assert!(!c.is_retired(rid), "{}", rid);
    }

    // retiring twice counts once
    retire(&mut c, reqid!(1, 2));
    assert_eq!(cases.len(), c.n_retired());
}

#[test]
fn test_gc_expire_untracked_promise() {
    let now = Instant::now();
    let mut c = engine_with_batch(1);
    let timeout = c.conf().recovery_timeout();

    // A promise for a request this replica never saw.
    let b = reqid!(2, 1);
    c.handle_message(2, Message::recovery(5, b), now);
    assert_eq!(5, c.promised_view(&b));
    assert_eq!(0, c.n_tracked());

    // A promise for a request this replica recovers itself.
    let x = reqid!(3, 1);
    let mut out = Output::default();
    c.start_recovery(x, now, &mut out);
    c.handle_message(0, Message::recovery(3, x), now);
    assert_eq!(3, c.promised_view(&x));

    c.tick(now + timeout * 9);
    assert_eq!(5, c.promised_view(&b));

    c.tick(now + timeout * 10);
    assert_eq!(0, c.promised_view(&b));
    assert_eq!(3, c.promised_view(&x));

    // a promise moves into the request once it shows up
    c.handle_message(2, Message::recovery(8, b), now + timeout * 10);
    c.handle_message(2, Message::slow_propose(8, &at(req!((2, 1), [1]), 1)), now);
    assert!(!c.promised.contains_key(&b));
    assert_eq!(8, c.requests[&b].promised);
}
