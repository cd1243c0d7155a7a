mod errors;
mod registry;

pub use errors::*;
pub use registry::*;

#[cfg(test)]
mod test_registry;
