mod acceptor;
mod caesar;
mod conflict;
mod coordinator;
mod delivery;
mod errors;
mod gc;
mod output;
mod recovery;

pub use self::caesar::*;
pub use conflict::*;
pub use errors::*;
pub use output::*;

#[cfg(test)]
mod test_acceptor;
#[cfg(test)]
mod test_delivery;
#[cfg(test)]
mod test_gc;
