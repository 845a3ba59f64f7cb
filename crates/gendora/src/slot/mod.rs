mod allocator;
mod config;
mod error;
mod heartbeat;
mod owner;
mod state;
#[cfg(test)]
mod tests;

pub use allocator::*;
pub use config::*;
pub use error::*;
pub use owner::*;
pub use state::*;
