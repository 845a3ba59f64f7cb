#![doc = include_str!("../README.md")]

mod error;
mod generator;
mod id;
mod slot;
mod store;
mod sync;
mod time;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::slot::*;
pub use crate::store::*;
pub use crate::time::*;
