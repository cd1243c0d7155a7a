mod log_format;
mod setup;

pub use log_format::*;
pub use setup::*;

#[cfg(test)]
mod test_format;
#[cfg(test)]
mod test_setup;
