//! Save/Load functionality for persisting anatomy state
//!
//! Uses bincode for efficient binary serialization of the entire world.
//! Components are serialized individually then reconstructed on load.
//! Entity references are stored as raw entity bits and every entity is
//! respawned under its original handle, so references stay valid.

use hecs::{Entity, EntityBuilder, World};
use medbay_logic::anatomy::{PartType, Symmetry};
use medbay_logic::layers::SurgeryLayerState;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

use crate::components::*;

/// Version number for save file format (increment when format changes)
const SAVE_VERSION: u32 = 1;

/// Serializable snapshot of the world
#[derive(Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    /// Simulation time in seconds
    pub sim_time: f64,
    /// All entities with their components
    pub entities: Vec<SerializableEntity>,
}

fn bits(entity: Entity) -> u64 {
    entity.to_bits().get()
}

fn handle(bits: u64) -> Result<Entity, SaveError> {
    Entity::from_bits(bits).ok_or(SaveError::BadEntity(bits))
}

fn handles(bits: &[u64]) -> Result<Vec<Entity>, SaveError> {
    bits.iter().map(|b| handle(*b)).collect()
}

fn maybe_handle(bits: Option<u64>) -> Result<Option<Entity>, SaveError> {
    bits.map(handle).transpose()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    pub species: String,
    pub root_parts: Vec<u64>,
    pub loose_organs: Vec<u64>,
}

impl From<&Body> for BodyRecord {
    fn from(body: &Body) -> Self {
        Self {
            species: body.species.clone(),
            root_parts: body.root_parts.iter().map(|e| bits(*e)).collect(),
            loose_organs: body.loose_organs.iter().map(|e| bits(*e)).collect(),
        }
    }
}

impl BodyRecord {
    fn restore(self) -> Result<Body, SaveError> {
        Ok(Body {
            species: self.species,
            root_parts: handles(&self.root_parts)?,
            loose_organs: handles(&self.loose_organs)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_type: PartType,
    pub symmetry: Symmetry,
    pub category: String,
    pub prototype: String,
    pub body: Option<u64>,
    pub parent: Option<u64>,
    pub slot: Option<String>,
    pub children: Vec<(String, u64)>,
    pub organs: Vec<u64>,
    pub organ_slots: Option<Vec<String>>,
}

impl From<&BodyPart> for PartRecord {
    fn from(part: &BodyPart) -> Self {
        Self {
            part_type: part.part_type,
            symmetry: part.symmetry,
            category: part.category.clone(),
            prototype: part.prototype.clone(),
            body: part.body.map(bits),
            parent: part.parent.map(bits),
            slot: part.slot.clone(),
            children: part
                .children
                .iter()
                .map(|(slot, e)| (slot.clone(), bits(*e)))
                .collect(),
            organs: part.organs.iter().map(|e| bits(*e)).collect(),
            organ_slots: part.organ_slots.clone(),
        }
    }
}

impl PartRecord {
    fn restore(self) -> Result<BodyPart, SaveError> {
        let mut children = std::collections::BTreeMap::new();
        for (slot, child) in self.children {
            children.insert(slot, handle(child)?);
        }
        Ok(BodyPart {
            part_type: self.part_type,
            symmetry: self.symmetry,
            category: self.category,
            prototype: self.prototype,
            body: maybe_handle(self.body)?,
            parent: maybe_handle(self.parent)?,
            slot: self.slot,
            children,
            organs: handles(&self.organs)?,
            organ_slots: self.organ_slots,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ContainerRecord {
    Part(u64),
    Body(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganRecord {
    pub category: String,
    pub body: Option<u64>,
    pub container: Option<ContainerRecord>,
    pub integrity_cost: i32,
}

impl From<&Organ> for OrganRecord {
    fn from(organ: &Organ) -> Self {
        Self {
            category: organ.category.clone(),
            body: organ.body.map(bits),
            container: organ.container.map(|c| match c {
                OrganContainer::Part(e) => ContainerRecord::Part(bits(e)),
                OrganContainer::Body(e) => ContainerRecord::Body(bits(e)),
            }),
            integrity_cost: organ.integrity_cost,
        }
    }
}

impl OrganRecord {
    fn restore(self) -> Result<Organ, SaveError> {
        let container = match self.container {
            Some(ContainerRecord::Part(b)) => Some(OrganContainer::Part(handle(b)?)),
            Some(ContainerRecord::Body(b)) => Some(OrganContainer::Body(handle(b)?)),
            None => None,
        };
        Ok(Organ {
            category: self.category,
            body: maybe_handle(self.body)?,
            container,
            integrity_cost: self.integrity_cost,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachedRecord {
    pub original: Option<u64>,
    pub part_type: PartType,
    pub symmetry: Symmetry,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandsRecord {
    pub held: Vec<u64>,
    pub active: usize,
}

/// All possible components for an entity, serialized as optionals
#[derive(Serialize, Deserialize, Default)]
pub struct SerializableEntity {
    pub id: u64,
    pub transform: Option<Transform>,

    // Anatomy
    pub body: Option<BodyRecord>,
    pub part: Option<PartRecord>,
    pub organ: Option<OrganRecord>,
    pub surgery: Option<SurgeryLayerState<u64>>,
    pub detached: Option<DetachedRecord>,
    pub brain: bool,
    pub initialized: bool,
    pub prone: bool,

    // Actors
    pub hands: Option<HandsRecord>,
    pub tool: Option<Tool>,
    pub melee: Option<MeleeWeapon>,
    pub mind: Option<MindContainer>,
    pub mind_capable: bool,
    pub abilities: Option<GrantedAbilities>,
}

/// Extract all entities from a world into serializable form
fn serialize_entities(world: &World) -> Vec<SerializableEntity> {
    let mut entities = Vec::new();

    for entity_ref in world.iter() {
        let mut se = SerializableEntity {
            id: bits(entity_ref.entity()),
            ..Default::default()
        };

        if let Some(c) = entity_ref.get::<&Transform>() {
            se.transform = Some(*c);
        }
        if let Some(c) = entity_ref.get::<&Body>() {
            se.body = Some(BodyRecord::from(&*c));
        }
        if let Some(c) = entity_ref.get::<&BodyPart>() {
            se.part = Some(PartRecord::from(&*c));
        }
        if let Some(c) = entity_ref.get::<&Organ>() {
            se.organ = Some(OrganRecord::from(&*c));
        }
        if let Some(c) = entity_ref.get::<&PartSurgery>() {
            se.surgery = Some(c.map_organs(|o| Some(bits(o))));
        }
        if let Some(c) = entity_ref.get::<&DetachedPart>() {
            se.detached = Some(DetachedRecord {
                original: c.original.map(bits),
                part_type: c.part_type,
                symmetry: c.symmetry,
                category: c.category.clone(),
            });
        }
        se.brain = entity_ref.has::<Brain>();
        se.initialized = entity_ref.has::<BodyInitialized>();
        se.prone = entity_ref.has::<Prone>();

        if let Some(c) = entity_ref.get::<&Hands>() {
            se.hands = Some(HandsRecord {
                held: c.held.iter().map(|e| bits(*e)).collect(),
                active: c.active,
            });
        }
        if let Some(c) = entity_ref.get::<&Tool>() {
            se.tool = Some((*c).clone());
        }
        if let Some(c) = entity_ref.get::<&MeleeWeapon>() {
            se.melee = Some((*c).clone());
        }
        if let Some(c) = entity_ref.get::<&MindContainer>() {
            se.mind = Some(*c);
        }
        se.mind_capable = entity_ref.has::<MindCapable>();
        if let Some(c) = entity_ref.get::<&GrantedAbilities>() {
            se.abilities = Some((*c).clone());
        }

        entities.push(se);
    }

    entities
}

/// Respawn serialized entities under their saved handles
fn deserialize_entities(world: &mut World, entities: Vec<SerializableEntity>) -> Result<(), SaveError> {
    for se in entities {
        let entity = handle(se.id)?;
        let mut builder = EntityBuilder::new();

        if let Some(c) = se.transform {
            builder.add(c);
        }
        if let Some(c) = se.body {
            builder.add(c.restore()?);
        }
        if let Some(c) = se.part {
            builder.add(c.restore()?);
        }
        if let Some(c) = se.organ {
            builder.add(c.restore()?);
        }
        if let Some(c) = se.surgery {
            let state: PartSurgery = c.map_organs(|b| Entity::from_bits(b));
            builder.add(state);
        }
        if let Some(c) = se.detached {
            builder.add(DetachedPart {
                original: maybe_handle(c.original)?,
                part_type: c.part_type,
                symmetry: c.symmetry,
                category: c.category,
            });
        }
        if se.brain {
            builder.add(Brain);
        }
        if se.initialized {
            builder.add(BodyInitialized);
        }
        if se.prone {
            builder.add(Prone);
        }
        if let Some(c) = se.hands {
            builder.add(Hands {
                held: handles(&c.held)?,
                active: c.active,
            });
        }
        if let Some(c) = se.tool {
            builder.add(c);
        }
        if let Some(c) = se.melee {
            builder.add(c);
        }
        if let Some(c) = se.mind {
            builder.add(c);
        }
        if se.mind_capable {
            builder.add(MindCapable);
        }
        if let Some(c) = se.abilities {
            builder.add(c);
        }

        world.spawn_at(entity, builder.build());
    }
    Ok(())
}

/// Save the complete world to a writer
pub fn save_world<W: Write>(mut writer: W, world: &World, sim_time: f64) -> Result<(), SaveError> {
    let save_data = SaveData {
        version: SAVE_VERSION,
        sim_time,
        entities: serialize_entities(world),
    };

    bincode::serialize_into(&mut writer, &save_data)?;
    writer.flush()?;
    log::info!("saved {} entities", save_data.entities.len());
    Ok(())
}

/// Load a world from a reader
pub fn load_world<R: Read>(reader: R) -> Result<LoadedWorld, SaveError> {
    let save_data: SaveData = bincode::deserialize_from(reader)?;

    if save_data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: save_data.version,
        });
    }

    let mut world = World::new();
    deserialize_entities(&mut world, save_data.entities)?;

    Ok(LoadedWorld {
        world,
        sim_time: save_data.sim_time,
    })
}

/// Result of loading a world
pub struct LoadedWorld {
    pub world: World,
    pub sim_time: f64,
}

/// Errors that can occur during save/load
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("invalid entity handle {0:#x} in save data")]
    BadEntity(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SurgeryEngine;
    use medbay_logic::catalog::Layer;
    use medbay_logic::config::SurgeryConfig;
    use std::collections::HashSet;

    #[test]
    fn test_save_load_roundtrip() {
        let mut engine =
            SurgeryEngine::with_bundled_content(SurgeryConfig::default().with_seed(5)).unwrap();
        let body = engine.spawn_body("Human", Vec3::ZERO);
        engine.body_ready(body);
        let _ = engine
            .world
            .insert_one(body, MindContainer { mind: MindId(9) });
        let torso = engine.query_children(body, Some(PartType::Torso), None)[0];
        let surgeon = engine.spawn_actor(Vec3::ZERO);
        let scalpel = engine.spawn_tool(&["Scalpel"], &[]);
        engine.give(surgeon, scalpel);
        engine
            .request_by_name(surgeon, body, torso, "RetractSkin", None)
            .unwrap();
        engine.update(3.0);

        let mut save_buffer = Vec::new();
        engine.save(&mut save_buffer).expect("Save failed");

        let mut loaded =
            SurgeryEngine::with_bundled_content(SurgeryConfig::default().with_seed(5)).unwrap();
        loaded.load(&save_buffer[..]).expect("Load failed");

        assert!((loaded.sim_time - engine.sim_time).abs() < 1e-9);
        let before: HashSet<Entity> = engine.query_children(body, None, None).into_iter().collect();
        let after: HashSet<Entity> = loaded.query_children(body, None, None).into_iter().collect();
        assert_eq!(before, after);
        assert_eq!(
            loaded.performed(torso, Layer::Skin),
            engine.performed(torso, Layer::Skin)
        );
        assert!(loaded.is_open(torso, Layer::Skin));
        assert_eq!(loaded.installed_integrity(body), engine.installed_integrity(body));
        assert_eq!(loaded.world.get::<&MindContainer>(body).unwrap().mind, MindId(9));
        assert!(loaded.world.get::<&Hands>(surgeon).unwrap().holds(scalpel));
        assert!(loaded.world.get::<&BodyInitialized>(body).is_ok());
    }

    #[test]
    fn test_version_mismatch() {
        let data = SaveData {
            version: SAVE_VERSION + 1,
            sim_time: 0.0,
            entities: Vec::new(),
        };
        let bytes = bincode::serialize(&data).unwrap();
        assert!(matches!(
            load_world(&bytes[..]),
            Err(SaveError::VersionMismatch { .. })
        ));
    }
}
