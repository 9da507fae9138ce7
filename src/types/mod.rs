//! Type definitions

pub mod b2b_import;
pub mod customer;
pub mod messages;
pub mod upload;

pub use b2b_import::*;
pub use customer::*;
pub use messages::*;
pub use upload::*;
