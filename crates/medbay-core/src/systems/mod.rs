//! Systems - logic that operates on components

mod anatomy;
mod bus;
mod detachment;
mod doafter;
mod initializer;
mod surgery;

pub use anatomy::*;
pub use bus::*;
pub use detachment::*;
pub use doafter::*;
pub use initializer::*;
pub use surgery::*;
