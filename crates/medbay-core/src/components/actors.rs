//! Actor-side components: hands, tools, weapons and minds.

use hecs::Entity;
use medbay_logic::anatomy::DamageType;
use serde::{Deserialize, Serialize};

/// Items an actor is holding. `active` indexes into `held`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hands {
    pub held: Vec<Entity>,
    pub active: usize,
}

impl Hands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holds(&self, item: Entity) -> bool {
        self.held.contains(&item)
    }

    pub fn active_item(&self) -> Option<Entity> {
        self.held.get(self.active).copied()
    }

    /// Pick up an item and make it the active one.
    pub fn pick_up(&mut self, item: Entity) {
        match self.held.iter().position(|h| *h == item) {
            Some(index) => self.active = index,
            None => {
                self.held.push(item);
                self.active = self.held.len() - 1;
            }
        }
    }

    pub fn drop_item(&mut self, item: Entity) -> bool {
        let Some(index) = self.held.iter().position(|h| *h == item) else {
            return false;
        };
        self.held.remove(index);
        if index < self.active || self.active >= self.held.len() {
            self.active = self.active.saturating_sub(1);
        }
        true
    }
}

/// Tool tags an item satisfies (e.g. "Scalpel", "Saw").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub tags: Vec<String>,
}

impl Tool {
    pub fn new(tags: &[&str]) -> Self {
        Self {
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Damage an item deals when swung.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MeleeWeapon {
    pub damage: Vec<(DamageType, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MindId(pub u32);

/// The entity currently holding a player's mind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindContainer {
    pub mind: MindId,
}

/// Minimal marker that lets a non-body entity (a brain) keep a mind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MindCapable;

/// Abilities granted to whichever entity holds the mind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantedAbilities {
    pub abilities: Vec<String>,
}
