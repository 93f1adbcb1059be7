//! crew service crate: storage, task operations, agent tools and dispatch.

pub mod chat;
pub mod dispatch;
pub mod mcp;
pub mod persistence;
pub mod service;
pub mod tools;
pub mod turn;

pub use chat::*;
pub use dispatch::*;
// mcp is not glob-reexported; its JSON-RPC constants read better qualified.
pub use mcp::McpServer;
pub use persistence::*;
pub use service::*;
pub use tools::*;
pub use turn::*;
