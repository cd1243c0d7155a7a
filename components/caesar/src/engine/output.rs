use crate::message::Message;
use crate::request::Request;
use crate::ReplicaId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// Every replica, including the sender itself.
    All,
    Replica(ReplicaId),
}

/// Output is what the engine asks its driver to do after handling an event.
/// The engine never performs IO itself.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Output {
    pub messages: Vec<(Target, Message)>,

    /// Stable requests whose predecessors are all settled, in the order they are released.
    pub deliveries: Vec<Request>,
}

impl Output {
    pub fn broadcast(&mut self, msg: Message) {
        self.messages.push((Target::All, msg));
    }

    pub fn send(&mut self, to: ReplicaId, msg: Message) {
        self.messages.push((Target::Replica(to), msg));
    }

    pub fn deliver(&mut self, r: Request) {
        self.deliveries.push(r);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.deliveries.is_empty()
    }
}
