use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use tokio::sync::mpsc::UnboundedSender;

use super::Application;
use super::ClientNotifier;
use super::Event;
use super::ReplicaError;
use crate::request::Request;
use crate::ReplicaId;

/// Dispatcher executes released requests on a fixed pool of delivery threads.
///
/// A request goes to the thread of its smallest object id, so requests on one object run in
/// the order they are released. After executing a request a thread notifies the client and then
/// reports `Event::Executed` to the replica, which may release the requests waiting for it.
pub struct Dispatcher {
    workers: Vec<Sender<Request>>,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start(
        me: ReplicaId,
        num_threads: usize,
        app: Arc<dyn Application>,
        notifier: Arc<dyn ClientNotifier>,
        events: UnboundedSender<Event>,
    ) -> Result<Dispatcher, ReplicaError> {
        let mut workers = Vec::with_capacity(num_threads);
        let mut handles = Vec::with_capacity(num_threads);

        for i in 0..num_threads.max(1) {
            let (tx, rx) = unbounded();
            let app = app.clone();
            let notifier = notifier.clone();
            let events = events.clone();

            let h = thread::Builder::new()
                .name(format!("delivery-{}-{}", me, i))
                .spawn(move || work(me, i, rx, app, notifier, events))
                .map_err(|e| ReplicaError::Spawn(e.to_string()))?;

            workers.push(tx);
            handles.push(h);
        }

        Ok(Dispatcher { workers, handles })
    }

    pub fn n_workers(&self) -> usize {
        self.workers.len()
    }

    /// worker_of returns the index of the thread that runs `r`.
    pub fn worker_of(&self, r: &Request) -> usize {
        let n = self.workers.len() as i32;
        match r.object_ids().iter().min() {
            Some(oid) => oid.rem_euclid(n) as usize,
            None => 0,
        }
    }

    pub fn dispatch(&self, r: Request) -> Result<(), ReplicaError> {
        let i = self.worker_of(&r);
        self.workers[i].send(r).map_err(|_| ReplicaError::Stopped)
    }

    /// join lets every thread finish what is queued and waits for them.
    pub fn join(self) -> Result<(), ReplicaError> {
        let Dispatcher { workers, handles } = self;
        drop(workers);

        for h in handles.into_iter() {
            h.join()
                .map_err(|_| ReplicaError::Join("delivery thread panicked".to_string()))?;
        }
        Ok(())
    }
}

fn work(
    me: ReplicaId,
    i: usize,
    rx: Receiver<Request>,
    app: Arc<dyn Application>,
    notifier: Arc<dyn ClientNotifier>,
    events: UnboundedSender<Event>,
) {
    for r in rx.iter() {
        if let Err(e) = app.execute_request(&r) {
            crit!("replica {}: delivery-{} failed to execute {}: {}", me, i, r.id(), e);
            let _ = events.send(Event::Halt(e.into()));
            return;
        }

        notifier.notify_client(&r);

        if events.send(Event::Executed(r.id())).is_err() {
            // replica stopped
            return;
        }
    }
    debug!("replica {}: delivery-{} quit", me, i);
}
