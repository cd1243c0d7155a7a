mod conflict;
pub use conflict::*;

mod request;
pub use request::*;

mod status;
pub use status::*;
