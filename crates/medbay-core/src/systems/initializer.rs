//! Structure initializer - builds a body's part tree from its species
//!
//! Runs once per body on the body-ready signal. The species structure is
//! planned by `medbay_logic::structure` (validation, cycle detection, torso
//! first); this system spawns the planned parts with their default organs,
//! attaches them in order, and migrates loose organs into parts by the
//! species placement rules. Faulty entries are logged and skipped.

use hecs::{Entity, World};
use medbay_logic::structure::{placement_targets, plan_structure, PartPrototype, SpeciesCatalog};
use std::collections::HashMap;

use super::anatomy::{attach_part, remove_organ};
use super::bus::{Notification, NotificationBus};
use crate::components::{
    Body, BodyInitialized, BodyPart, Brain, Organ, OrganContainer, PartSurgery,
};

/// Spawn a detached part and the organs its prototype starts with.
pub fn spawn_part(world: &mut World, prototype: &PartPrototype) -> Entity {
    let part = world.spawn((
        BodyPart {
            prototype: prototype.id.clone(),
            organ_slots: prototype.organ_slots.clone(),
            ..BodyPart::new(prototype.part_type, prototype.symmetry, prototype.category.clone())
        },
        PartSurgery::new(),
    ));

    let mut organs = Vec::with_capacity(prototype.organs.len());
    for template in &prototype.organs {
        let organ = world.spawn((Organ {
            container: Some(OrganContainer::Part(part)),
            ..Organ::new(template.category.clone(), template.integrity_cost)
        },));
        if template.brain {
            let _ = world.insert_one(organ, Brain);
        }
        organs.push(organ);
    }
    if let Ok(mut p) = world.get::<&mut BodyPart>(part) {
        p.organs = organs;
    }
    part
}

fn despawn_part(world: &mut World, part: Entity) {
    let organs = world
        .get::<&BodyPart>(part)
        .map(|p| p.organs.clone())
        .unwrap_or_default();
    for organ in organs {
        let _ = world.despawn(organ);
    }
    let _ = world.despawn(part);
}

/// Build the body's parts. Returns how many parts were attached; a body
/// that was already initialized is left alone and returns 0.
pub fn initialize_body(
    world: &mut World,
    bus: &mut NotificationBus,
    species: &SpeciesCatalog,
    body: Entity,
) -> usize {
    if world.get::<&BodyInitialized>(body).is_ok() {
        return 0;
    }
    let species_id = match world.get::<&Body>(body) {
        Ok(b) => b.species.clone(),
        Err(_) => {
            log::warn!("initialize: {:?} has no body component", body);
            return 0;
        }
    };
    let _ = world.insert_one(body, BodyInitialized);

    let Some(structure) = species.structure(&species_id) else {
        log::error!("initialize: no structure for species '{}'", species_id);
        return 0;
    };
    let plan = plan_structure(structure, species);

    let mut spawned: HashMap<usize, Entity> = HashMap::new();
    let mut attached = Vec::new();
    for planned in &plan.order {
        let entry = &structure.parts[planned.entry];
        let Some(prototype) = species.prototype(&entry.prototype) else {
            continue;
        };
        let parent = match planned.parent {
            Some(index) => match spawned.get(&index) {
                Some(parent) => Some(*parent),
                None => {
                    log::error!(
                        "initialize {}: parent of '{}' was not spawned, skipping",
                        species_id,
                        entry.prototype
                    );
                    continue;
                }
            },
            None => None,
        };

        let part = spawn_part(world, prototype);
        if attach_part(world, bus, part, body, parent, planned.slot.as_deref()) {
            spawned.insert(planned.entry, part);
            attached.push(part);
        } else {
            log::error!(
                "initialize {}: could not attach '{}', rolled back",
                species_id,
                entry.prototype
            );
            despawn_part(world, part);
        }
    }

    let loose = world
        .get::<&Body>(body)
        .map(|b| b.loose_organs.clone())
        .unwrap_or_default();
    for organ in loose {
        let category = match world.get::<&Organ>(organ) {
            Ok(o) => o.category.clone(),
            Err(_) => continue,
        };
        for target_type in placement_targets(&structure.placement, &category) {
            let target = attached.iter().copied().find(|p| {
                world
                    .get::<&BodyPart>(*p)
                    .map(|bp| bp.part_type == target_type)
                    .unwrap_or(false)
            });
            let Some(target) = target else {
                continue;
            };
            if remove_organ(world, bus, organ, Some(target)).is_ok() {
                log::debug!("initialize: moved {} into {:?}", category, target_type);
                break;
            }
        }
    }

    log::info!(
        "initialized {:?} as {}: {} parts, {} structure issues",
        body,
        species_id,
        attached.len(),
        plan.issues.len()
    );
    bus.publish(Notification::BodyInitialized {
        body,
        parts: attached.len(),
    });
    attached.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::anatomy::{insert_loose_organ, query_children};
    use medbay_logic::anatomy::PartType;
    use medbay_logic::content::bundled_species;

    #[test]
    fn test_minimal_species_torso_first() {
        let species = bundled_species().unwrap();
        let mut world = World::new();
        let mut bus = NotificationBus::new();
        let body = world.spawn((Body::new("Minimal"),));

        assert_eq!(initialize_body(&mut world, &mut bus, &species, body), 3);
        let roots = world.get::<&Body>(body).unwrap().root_parts.clone();
        assert_eq!(roots.len(), 1);
        let torso = (*world.get::<&BodyPart>(roots[0]).unwrap()).clone();
        assert_eq!(torso.part_type, PartType::Torso);
        assert_eq!(torso.parent, None);
        assert_eq!(query_children(&world, body, None, None).len(), 3);

        // second signal is ignored
        assert_eq!(initialize_body(&mut world, &mut bus, &species, body), 0);
        assert_eq!(query_children(&world, body, None, None).len(), 3);
    }

    #[test]
    fn test_loose_organs_migrate_by_rule() {
        let species = bundled_species().unwrap();
        let mut world = World::new();
        let mut bus = NotificationBus::new();
        let body = world.spawn((Body::new("Minimal"),));
        let brain = world.spawn((Organ::new("Brain", 3), Brain));
        let liver = world.spawn((Organ::new("Liver", 1),));
        insert_loose_organ(&mut world, &mut bus, body, brain).unwrap();
        insert_loose_organ(&mut world, &mut bus, body, liver).unwrap();

        initialize_body(&mut world, &mut bus, &species, body);

        let head = query_children(&world, body, Some(PartType::Head), None)[0];
        let torso = query_children(&world, body, Some(PartType::Torso), None)[0];
        assert_eq!(
            world.get::<&Organ>(brain).unwrap().container,
            Some(OrganContainer::Part(head))
        );
        assert_eq!(
            world.get::<&Organ>(liver).unwrap().container,
            Some(OrganContainer::Part(torso))
        );
        assert_eq!(world.get::<&Organ>(liver).unwrap().body, Some(body));
        assert!(world.get::<&Body>(body).unwrap().loose_organs.is_empty());
    }

    #[test]
    fn test_unknown_species_is_logged_not_fatal() {
        let species = bundled_species().unwrap();
        let mut world = World::new();
        let mut bus = NotificationBus::new();
        let body = world.spawn((Body::new("Slime"),));
        assert_eq!(initialize_body(&mut world, &mut bus, &species, body), 0);
        assert!(world.get::<&BodyInitialized>(body).is_ok());
    }
}
