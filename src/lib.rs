#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod accessor;
mod batch;
mod diff;
mod equality;
mod error;
mod mutator;
mod node;
mod observer;
mod path;
mod store;
mod value;

pub use accessor::*;
pub use equality::*;
pub use error::*;
pub use mutator::*;
pub use observer::*;
pub use store::*;
pub use value::*;
