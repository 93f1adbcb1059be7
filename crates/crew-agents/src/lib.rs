pub mod command;
pub mod error;
pub mod session;
pub mod types;

pub use command::*;
pub use error::*;
pub use session::*;
pub use types::*;
