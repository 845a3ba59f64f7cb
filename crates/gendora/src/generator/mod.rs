mod encoder;
mod error;
mod interface;
mod slot_source;

pub use encoder::*;
pub use error::*;
pub use interface::*;
pub use slot_source::*;
