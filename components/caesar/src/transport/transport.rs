use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::RwLock;

use crate::ReplicaId;

quick_error! {
    #[derive(Debug, Eq, PartialEq)]
    pub enum TransportError {
        NoSuchReplica(rid: ReplicaId, n: usize) {
            display("replica {} not in a set of {}", rid, n)
        }

        Disconnected(from: ReplicaId, to: ReplicaId) {
            display("{} -> {} is disconnected", from, to)
        }

        NoHandler(rid: ReplicaId) {
            display("replica {} has not registered a handler", rid)
        }
    }
}

/// MessageHandler receives encoded messages from peers.
pub trait MessageHandler: Send + Sync {
    /// on_message_received must return quickly and never block: queue the message and handle it
    /// somewhere else.
    fn on_message_received(&self, from: ReplicaId, bytes: Vec<u8>);
}

/// Transport delivers encoded messages between replicas. There is no delivery guarantee.
pub trait Transport: Send + Sync {
    fn n_replicas(&self) -> usize;

    fn send(&self, from: ReplicaId, to: ReplicaId, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// broadcast sends to every replica including `from` itself.
    /// A replica that can not be reached is skipped.
    fn broadcast(&self, from: ReplicaId, bytes: Vec<u8>) -> Result<(), TransportError> {
        for to in 0..self.n_replicas() {
            if let Err(e) = self.send(from, to, bytes.clone()) {
                debug!("broadcast from {}: {}", from, e);
            }
        }
        Ok(())
    }
}

/// LocalNetwork connects replicas running in the same process.
/// A replica can be disconnected to simulate a crash: messages from or to it are dropped.
pub struct LocalNetwork {
    handlers: RwLock<Vec<Option<Arc<dyn MessageHandler>>>>,
    connected: Vec<AtomicBool>,
}

impl LocalNetwork {
    pub fn new(n: usize) -> LocalNetwork {
        LocalNetwork {
            handlers: RwLock::new((0..n).map(|_| None).collect()),
            connected: (0..n).map(|_| AtomicBool::new(true)).collect(),
        }
    }

    pub fn register(
        &self,
        rid: ReplicaId,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), TransportError> {
        let n = self.connected.len();
        let mut handlers = self.handlers.write().map_err(|_| TransportError::NoHandler(rid))?;
        let slot = handlers
            .get_mut(rid)
            .ok_or(TransportError::NoSuchReplica(rid, n))?;
        *slot = Some(handler);
        Ok(())
    }

    pub fn disconnect(&self, rid: ReplicaId) {
        if let Some(c) = self.connected.get(rid) {
            c.store(false, Ordering::SeqCst);
        }
    }

    pub fn reconnect(&self, rid: ReplicaId) {
        if let Some(c) = self.connected.get(rid) {
            c.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_connected(&self, rid: ReplicaId) -> bool {
        self.connected
            .get(rid)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Transport for LocalNetwork {
    fn n_replicas(&self) -> usize {
        self.connected.len()
    }

    fn send(&self, from: ReplicaId, to: ReplicaId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let n = self.n_replicas();
        if from >= n {
            return Err(TransportError::NoSuchReplica(from, n));
        }
        if to >= n {
            return Err(TransportError::NoSuchReplica(to, n));
        }

        if !self.is_connected(from) || !self.is_connected(to) {
            return Err(TransportError::Disconnected(from, to));
        }

        let handler = {
            let handlers = self.handlers.read().map_err(|_| TransportError::NoHandler(to))?;
            handlers[to].clone()
        };

        match handler {
            Some(h) => {
                h.on_message_received(from, bytes);
                Ok(())
            }
            None => Err(TransportError::NoHandler(to)),
        }
    }
}
