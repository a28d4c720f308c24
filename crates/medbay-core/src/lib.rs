//! MedBay Core - Anatomy Graph and Surgery Engine
//!
//! An ECS-based model of bodies made of body parts made of organs, with a
//! layered surgical procedure state machine that opens, closes and mutates
//! that graph under validated, time-delayed actions.
//!
//! # Architecture
//!
//! The engine uses an Entity Component System (ECS) architecture via `hecs`:
//! - **Entities**: Bodies, body parts, organs, detached-part stubs, actors, tools
//! - **Components**: Pure data attached to entities (Body, BodyPart, Organ, Hands, etc.)
//! - **Systems**: Graph operations, structure initialization, surgery
//!   validation and commit, the do-after queue and the detachment coordinator
//!
//! Pure rules (catalog, layer state machine, tool math, structure planning)
//! live in `medbay-logic` and carry no ECS dependency.
//!
//! # Example
//!
//! ```rust,no_run
//! use medbay_core::prelude::*;
//!
//! let mut engine = SurgeryEngine::with_bundled_content(SurgeryConfig::default()).unwrap();
//! let body = engine.spawn_body("Human", Vec3::ZERO);
//! engine.body_ready(body);
//!
//! loop {
//!     engine.update(1.0 / 30.0);
//! }
//! ```

pub mod components;
pub mod engine;
pub mod persistence;
pub mod systems;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::engine::SurgeryEngine;
    pub use crate::systems::{DetachReason, Notification, NotificationKind, ProcedureRequest};
    pub use medbay_logic::anatomy::{DamageType, PartType, Symmetry};
    pub use medbay_logic::catalog::{Layer, ProcedureId};
    pub use medbay_logic::config::SurgeryConfig;
    pub use medbay_logic::rejection::SurgeryRejection;
}
