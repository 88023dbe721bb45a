mod error;
mod manager;
mod participant;
mod scope;

pub use ::anyhow::Context;
pub use error::*;
pub use manager::*;
pub use participant::*;
pub(crate) use scope::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
