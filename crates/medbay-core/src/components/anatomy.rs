//! Anatomy components: bodies, body parts, organs and detached stubs.
//!
//! Containment is stored on both ends. A body lists its root parts and its
//! loose organs, a part lists its child parts (keyed by slot) and organs,
//! and every part and organ carries a `body` back-reference that is kept in
//! sync by the graph operations in `systems::anatomy`.

use hecs::Entity;
use medbay_logic::anatomy::{PartType, Symmetry};
use medbay_logic::layers::SurgeryLayerState;
use std::collections::BTreeMap;

/// Root anatomical entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub species: String,
    /// Parts with no parent. The torso is first once initialized.
    pub root_parts: Vec<Entity>,
    /// Organs not assigned to any part.
    pub loose_organs: Vec<Entity>,
}

impl Body {
    pub fn new(species: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            root_parts: Vec::new(),
            loose_organs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyPart {
    pub part_type: PartType,
    pub symmetry: Symmetry,
    /// Organ category tag used to look up surgery entries.
    pub category: String,
    /// Prototype this part was spawned from.
    pub prototype: String,
    /// Owning body, `None` while detached.
    pub body: Option<Entity>,
    pub parent: Option<Entity>,
    /// Slot id under `parent`.
    pub slot: Option<String>,
    pub children: BTreeMap<String, Entity>,
    pub organs: Vec<Entity>,
    /// Fixed organ slot categories. `None` accepts any organ.
    pub organ_slots: Option<Vec<String>>,
}

impl BodyPart {
    pub fn new(part_type: PartType, symmetry: Symmetry, category: impl Into<String>) -> Self {
        Self {
            part_type,
            symmetry,
            category: category.into(),
            prototype: String::new(),
            body: None,
            parent: None,
            slot: None,
            children: BTreeMap::new(),
            organs: Vec::new(),
            organ_slots: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.body.is_some()
    }
}

/// Where an organ currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganContainer {
    Part(Entity),
    /// The body's flat loose-organ slot.
    Body(Entity),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Organ {
    pub category: String,
    /// Set by propagation from the container, never by the organ itself.
    pub body: Option<Entity>,
    pub container: Option<OrganContainer>,
    /// Integrity consumed while installed.
    pub integrity_cost: i32,
}

impl Organ {
    pub fn new(category: impl Into<String>, integrity_cost: i32) -> Self {
        Self {
            category: category.into(),
            body: None,
            container: None,
            integrity_cost,
        }
    }
}

/// Marks an organ as a brain, the anchor for mind transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Brain;

/// Added once the structure initializer has run on a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyInitialized;

/// The body is lying down; detached limbs fall to the side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prone;

/// Standalone world entity standing in for a part that left its body.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedPart {
    /// The original part, while it still exists.
    pub original: Option<Entity>,
    pub part_type: PartType,
    pub symmetry: Symmetry,
    pub category: String,
}

/// Surgery record of one body part, keyed by organ entity.
pub type PartSurgery = SurgeryLayerState<Entity>;
