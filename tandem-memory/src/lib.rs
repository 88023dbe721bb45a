mod isolation;
mod participant;
mod store;
mod transaction;

pub use isolation::*;
pub use participant::*;
pub use store::*;
pub(crate) use transaction::*;
