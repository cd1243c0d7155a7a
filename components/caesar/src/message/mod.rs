mod codec;
mod errors;
mod message;

pub use codec::*;
pub use errors::*;
pub use message::*;

#[cfg(test)]
mod test_message;
