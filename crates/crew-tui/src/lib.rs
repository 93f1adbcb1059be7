pub mod action;
pub mod app;
pub mod backend;
pub mod error;
pub mod event;
pub mod forms;
pub mod model;
pub mod notifications;
pub mod runner;
pub mod ui;

pub use action::*;
pub use app::*;
pub use backend::*;
pub use error::*;
pub use event::*;
pub use forms::*;
pub use model::*;
pub use notifications::*;
pub use runner::*;
pub use ui::*;
