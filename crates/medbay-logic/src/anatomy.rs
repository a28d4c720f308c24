//! Anatomy vocabulary shared by the catalog and the entity graph.
//!
//! Body-part kind is tagged data on a uniform record, never a type
//! hierarchy: behavior dispatches by matching on [`PartType`].

use serde::{Deserialize, Serialize};

/// Coarse body-part kind. Hands and feet are fused organs of arms and legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartType {
    Head,
    Torso,
    Arm,
    Leg,
}

impl PartType {
    pub fn is_limb(self) -> bool {
        matches!(self, PartType::Arm | PartType::Leg)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symmetry {
    #[default]
    None,
    Left,
    Right,
}

impl Symmetry {
    /// Lateral sign used when something falls to this side: left is -1.
    pub fn lateral_sign(self) -> Option<f32> {
        match self {
            Symmetry::None => None,
            Symmetry::Left => Some(-1.0),
            Symmetry::Right => Some(1.0),
        }
    }
}

/// Damage types relevant to improvised surgical tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Blunt,
    Slash,
    Piercing,
    Heat,
}

/// Well-known organ category tags. Categories are free-form strings; these
/// are the ones the core itself attaches meaning to.
pub mod categories {
    pub const ARM_LEFT: &str = "ArmLeft";
    pub const ARM_RIGHT: &str = "ArmRight";
    pub const LEG_LEFT: &str = "LegLeft";
    pub const LEG_RIGHT: &str = "LegRight";

    /// The four categories a detach-limb procedure may target.
    pub const LIMBS: [&str; 4] = [ARM_LEFT, ARM_RIGHT, LEG_LEFT, LEG_RIGHT];

    pub fn is_limb(category: &str) -> bool {
        LIMBS.contains(&category)
    }
}
