#[macro_use]
extern crate quick_error;

#[macro_use]
extern crate slog_global;

#[macro_use]
pub mod testutil;

pub mod conf;
pub mod engine;
pub mod message;
pub mod replica;
pub mod replication;
pub mod request;
pub mod transport;

pub use conf::Config;
pub use engine::Caesar;
pub use message::Message;
pub use replica::Replica;
pub use replication::ProposalReplyInfo;
pub use request::{Request, RequestId, RequestStatus};

/// Index of a replica in the replica set, `0..n`.
pub type ReplicaId = usize;
