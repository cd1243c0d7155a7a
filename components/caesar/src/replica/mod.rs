mod dispatcher;
mod errors;
mod replica;
mod service;

pub use dispatcher::*;
pub use errors::*;
pub use replica::*;
pub use service::*;
