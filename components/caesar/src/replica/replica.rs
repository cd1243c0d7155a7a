use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::Application;
use super::ClientNotifier;
use super::Dispatcher;
use super::ReplicaError;
use crate::conf::Config;
use crate::engine::Caesar;
use crate::engine::Output;
use crate::engine::Target;
use crate::message::Message;
use crate::request::Request;
use crate::request::RequestId;
use crate::transport::MessageHandler;
use crate::transport::Transport;
use crate::ReplicaId;

/// Event is everything a replica reacts to.
#[derive(Debug)]
pub enum Event {
    /// A request from a local client.
    Submit(Request),

    /// An encoded message from a peer.
    Received(ReplicaId, Vec<u8>),

    /// A delivery thread executed a request.
    Executed(RequestId),

    /// A delivery thread failed. The replica stops.
    Halt(ReplicaError),

    Stop,
}

/// Inbox is the MessageHandler of a replica: it only queues what it receives.
pub struct Inbox {
    tx: UnboundedSender<Event>,
}

impl MessageHandler for Inbox {
    fn on_message_received(&self, from: ReplicaId, bytes: Vec<u8>) {
        // A stopped replica drops everything.
        let _ = self.tx.send(Event::Received(from, bytes));
    }
}

/// Replica runs a consensus engine in its own task and executes what it decides.
///
/// ```ignore
/// let mut r = Replica::start(0, conf, transport, app, notifier)?;
/// transport.register(0, r.inbox())?;
/// r.submit(request);
/// r.stop();
/// r.join().await?;
/// ```
pub struct Replica {
    me: ReplicaId,
    tx: UnboundedSender<Event>,
    join_handle: Option<JoinHandle<Result<(), ReplicaError>>>,
}

impl Replica {
    /// start spawns the replica on the current tokio runtime, along with its delivery threads.
    pub fn start(
        me: ReplicaId,
        conf: Arc<Config>,
        transport: Arc<dyn Transport>,
        app: Arc<dyn Application>,
        notifier: Arc<dyn ClientNotifier>,
    ) -> Result<Replica, ReplicaError> {
        conf.check()?;

        let (tx, rx) = unbounded_channel();
        let dispatcher = Dispatcher::start(me, conf.num_threads, app, notifier, tx.clone())?;

        let actor = Actor {
            me,
            engine: Caesar::new(me, conf.clone()),
            transport,
            dispatcher,
            events: rx,
        };
        let join_handle = tokio::spawn(actor.run(conf.tick()));

        Ok(Replica {
            me,
            tx,
            join_handle: Some(join_handle),
        })
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.me
    }

    /// inbox returns the handler to register to a transport.
    pub fn inbox(&self) -> Arc<dyn MessageHandler> {
        Arc::new(Inbox {
            tx: self.tx.clone(),
        })
    }

    /// submit proposes a request. Completion is reported through the ClientNotifier.
    pub fn submit(&self, r: Request) {
        let rid = r.id();
        if self.tx.send(Event::Submit(r)).is_err() {
            warn!("replica {}: stopped, drop submitted {}", self.me, rid);
        }
    }

    pub fn stop(&self) {
        let _ = self.tx.send(Event::Stop);
    }

    /// join waits for the replica to stop. It returns the error that halted it, if any.
    pub async fn join(&mut self) -> Result<(), ReplicaError> {
        let j = self.join_handle.take().ok_or(ReplicaError::NotStarted)?;
        j.await.map_err(|e| ReplicaError::Join(e.to_string()))?
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Actor {
    me: ReplicaId,
    engine: Caesar,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    events: UnboundedReceiver<Event>,
}

impl Actor {
    async fn run(mut self, tick: Duration) -> Result<(), ReplicaError> {
        let mut ticker = tokio::time::interval(tick);
        info!(
            "replica {}: started with {} delivery threads",
            self.me,
            self.dispatcher.n_workers()
        );

        let rst = loop {
            let out = tokio::select! {
                ev = self.events.recv() => match ev {
                    None | Some(Event::Stop) => break Ok(()),
                    Some(Event::Halt(e)) => {
                        crit!("replica {}: halt: {}", self.me, e);
                        break Err(e);
                    }
                    Some(ev) => self.handle(ev),
                },
                _ = ticker.tick() => self.engine.tick(Instant::now()),
            };

            if let Err(e) = self.apply(out) {
                break Err(e);
            }
        };

        let Actor { me, dispatcher, .. } = self;
        let joined = tokio::task::spawn_blocking(move || dispatcher.join()).await;
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("replica {}: {}", me, e),
            Err(e) => warn!("replica {}: failed to join delivery threads: {}", me, e),
        }

        info!("replica {}: stopped", me);
        rst
    }

    fn handle(&mut self, ev: Event) -> Output {
        let now = Instant::now();
        match ev {
            Event::Submit(r) => self.engine.propose(r, now),
            Event::Received(from, bytes) => match Message::decode(&bytes) {
                Ok(m) => self.engine.handle_message(from, m, now),
                Err(e) => {
                    warn!(
                        "replica {}: drop undecodable message from {}: {}",
                        self.me, from, e
                    );
                    Output::default()
                }
            },
            Event::Executed(rid) => self.engine.on_executed(rid, now),
            Event::Halt(_) | Event::Stop => Output::default(),
        }
    }

    /// apply sends the messages of an engine output and hands its deliveries to the
    /// delivery threads.
    fn apply(&mut self, out: Output) -> Result<(), ReplicaError> {
        for (target, msg) in out.messages.into_iter() {
            let bytes = msg.encode();
            let rst = match target {
                Target::All => self.transport.broadcast(self.me, bytes),
                Target::Replica(to) => self.transport.send(self.me, to, bytes),
            };
            if let Err(e) = rst {
                debug!("replica {}: failed to send {}: {}", self.me, msg, e);
            }
        }

        for r in out.deliveries.into_iter() {
            self.dispatcher.dispatch(r)?;
        }
        Ok(())
    }
}
