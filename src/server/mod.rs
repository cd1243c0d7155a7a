mod cluster;
mod errors;
mod workload;

pub use cluster::*;
pub use errors::*;
pub use workload::*;
