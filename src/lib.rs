#[macro_use]
extern crate quick_error;

#[macro_use]
extern crate slog_global;

pub mod client;
pub mod kv;
pub mod registry;
pub mod server;
pub mod setup;

pub use client::ClientManager;
pub use kv::KeyValue;
pub use registry::SharedObjectRegistry;
pub use server::Cluster;
pub use server::ServerError;
