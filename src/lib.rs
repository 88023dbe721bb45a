pub use tandem_core::*;
