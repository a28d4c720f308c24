//! Component definitions for the ECS world.
//!
//! Components are pure data structs attached to entities.
//! They have no behavior - that lives in systems.

mod actors;
mod anatomy;
mod common;

pub use actors::*;
pub use anatomy::*;
pub use common::*;
