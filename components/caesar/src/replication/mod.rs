mod errors;
mod quorums;
mod reply_info;

pub use errors::*;
pub use quorums::*;
pub use reply_info::*;
