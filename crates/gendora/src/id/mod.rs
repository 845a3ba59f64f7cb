mod metadata;
mod snowflake;

pub use metadata::*;
pub use snowflake::*;
