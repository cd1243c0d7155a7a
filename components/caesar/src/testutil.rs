use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;

use crate::conf::Config;
use crate::engine::Caesar;
use crate::engine::Target;
use crate::message::Message;
use crate::replica::Application;
use crate::replica::ApplicationError;
use crate::replica::ClientNotifier;
use crate::request::Request;
use crate::request::RequestId;
use crate::ReplicaId;

#[macro_export]
#[allow(unused_macros)]
macro_rules! reqid {
    ($client_id:expr, $seq:expr) => {
        $crate::request::RequestId::from(($client_id, $seq))
    };
}

#[macro_export]
#[allow(unused_macros)]
macro_rules! reqids {
    [$(($client_id:expr, $seq:expr)),*] => {
        vec![$($crate::request::RequestId::from(($client_id, $seq))),*]
    }
}

/// Create a just initialized request.
/// supported pattern:
/// req!(request_id, [object_ids])
/// req!(request_id, [object_ids], payload)
///
/// Example:
/// ```
/// #[macro_use] extern crate caesar;
///
/// let r = req!((1, 2), [3, 4], "put x");
/// assert_eq!(&[3, 4], r.object_ids());
/// ```
#[macro_export]
#[allow(unused_macros)]
macro_rules! req {
    ($id:expr, [$($oid:expr),*]) => {
        $crate::request::Request::new(
            $crate::request::RequestId::from($id),
            vec![$($oid),*],
            vec![],
        )
    };

    ($id:expr, [$($oid:expr),*], $payload:expr) => {
        $crate::request::Request::new(
            $crate::request::RequestId::from($id),
            vec![$($oid),*],
            $payload.as_bytes().to_vec(),
        )
    };
}

/// SimCluster runs several engines against a deterministic in-memory network.
/// Every message goes through the wire codec. Messages are delivered in FIFO order unless a test
/// pumps them one by one.
pub struct SimCluster {
    pub replicas: Vec<Caesar>,

    /// In-flight messages: (from, to, encoded message).
    pub queue: VecDeque<(ReplicaId, ReplicaId, Vec<u8>)>,

    pub crashed: HashSet<ReplicaId>,

    /// Requests handed to the delivery pipeline, per replica, in order.
    pub delivered: Vec<Vec<Request>>,

    /// Whether delivered requests are reported back as executed immediately.
    pub auto_execute: bool,

    pub now: Instant,
}

impl SimCluster {
    pub fn new(n: usize) -> Self {
        Self::with_conf(Config::new(n))
    }

    pub fn with_conf(conf: Config) -> Self {
        let n = conf.n_replicas();
        let conf = Arc::new(conf);
        let replicas = (0..n).map(|i| Caesar::new(i, conf.clone())).collect();

        SimCluster {
            replicas,
            queue: VecDeque::new(),
            crashed: HashSet::new(),
            delivered: vec![vec![]; n],
            auto_execute: true,
            now: Instant::now(),
        }
    }

    pub fn propose(&mut self, at: ReplicaId, request: Request) {
        let out = self.replicas[at].propose(request, self.now);
        self.apply(at, out);
    }

    pub fn crash(&mut self, rid: ReplicaId) {
        self.crashed.insert(rid);
    }

    /// step delivers the first in-flight message. It returns false if there is none.
    pub fn step(&mut self) -> bool {
        let (from, to, bytes) = match self.queue.pop_front() {
            Some(m) => m,
            None => return false,
        };

        if self.crashed.contains(&from) || self.crashed.contains(&to) {
            return true;
        }

        let msg = Message::decode(&bytes).unwrap();
        let out = self.replicas[to].handle_message(from, msg, self.now);
        self.apply(to, out);
        true
    }

    /// run delivers messages until the network is quiet.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// step_until delivers messages one by one until `f` holds. It returns false if the network
    /// went quiet first.
    pub fn step_until<F>(&mut self, f: F) -> bool
    where
        F: Fn(&SimCluster) -> bool,
    {
        while !f(self) {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// drop_messages removes in-flight messages for which `f(from, to, msg)` returns true.
    pub fn drop_messages<F>(&mut self, f: F)
    where
        F: Fn(ReplicaId, ReplicaId, &Message) -> bool,
    {
        self.queue.retain(|(from, to, bytes)| {
            let msg = Message::decode(bytes).unwrap();
            !f(*from, *to, &msg)
        });
    }

    /// in_flight returns the decoded in-flight messages.
    pub fn in_flight(&self) -> Vec<(ReplicaId, ReplicaId, Message)> {
        self.queue
            .iter()
            .map(|(from, to, bytes)| (*from, *to, Message::decode(bytes).unwrap()))
            .collect()
    }

    /// advance moves the clock forward and ticks every live replica.
    pub fn advance(&mut self, d: Duration) {
        self.now += d;
        for rid in 0..self.replicas.len() {
            if self.crashed.contains(&rid) {
                continue;
            }
            let out = self.replicas[rid].tick(self.now);
            self.apply(rid, out);
        }
    }

    pub fn execute(&mut self, at: ReplicaId, id: RequestId) {
        let out = self.replicas[at].on_executed(id, self.now);
        self.apply(at, out);
    }

    pub fn delivered_ids(&self, rid: ReplicaId) -> Vec<RequestId> {
        self.delivered[rid].iter().map(|r| r.id()).collect()
    }

    pub fn request(&self, rid: ReplicaId, id: RequestId) -> Option<&Request> {
        self.replicas[rid].request(&id)
    }

    fn apply(&mut self, from: ReplicaId, out: crate::engine::Output) {
        let n = self.replicas.len();
        for (target, msg) in out.messages.iter() {
            let bytes = msg.encode();
            match target {
                Target::All => {
                    for to in 0..n {
                        self.queue.push_back((from, to, bytes.clone()));
                    }
                }
                Target::Replica(to) => self.queue.push_back((from, *to, bytes)),
            }
        }

        for r in out.deliveries.into_iter() {
            let id = r.id();
            self.delivered[from].push(r);
            if self.auto_execute {
                self.execute(from, id);
            }
        }
    }
}

/// RecordingApp remembers the order in which requests are executed.
/// A request whose payload is `fail` can not be executed.
#[derive(Debug, Default)]
pub struct RecordingApp {
    pub executed: Mutex<Vec<RequestId>>,
}

impl RecordingApp {
    pub fn executed(&self) -> Vec<RequestId> {
        self.executed.lock().unwrap().clone()
    }
}

impl Application for RecordingApp {
    fn create_request(
        &self,
        id: RequestId,
        _read: bool,
        _access_mode: i32,
        _batch_size: usize,
        _n_replicas: usize,
    ) -> Request {
        Request::new(id, vec![id.seq_number], vec![])
    }

    fn execute_request(&self, r: &Request) -> Result<(), ApplicationError> {
        if r.payload() == b"fail" {
            return Err(ApplicationError::Failed(format!("{}", r.id())));
        }
        self.executed.lock().unwrap().push(r.id());
        Ok(())
    }

    fn total_objects(&self) -> usize {
        0
    }
}

/// ChannelNotifier sends `(replica, request id)` for every notification.
pub struct ChannelNotifier {
    pub me: ReplicaId,
    pub tx: UnboundedSender<(ReplicaId, RequestId)>,
}

impl ClientNotifier for ChannelNotifier {
    fn notify_client(&self, r: &Request) {
        let _ = self.tx.send((self.me, r.id()));
    }
}
