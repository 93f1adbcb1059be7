pub mod command;
pub mod error;
pub mod repository;

pub use command::*;
pub use error::*;
pub use repository::*;
