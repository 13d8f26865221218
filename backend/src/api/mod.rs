//! API handlers.

pub mod guard;
pub mod mcp;
pub mod stateless;
