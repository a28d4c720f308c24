//! Anatomy graph - attach, detach, insert and remove on the part/organ tree
//!
//! Every part and organ carries a `body` back-reference. The operations
//! here are the only writers of containment, and they keep the reference
//! equal to the body the node is reachable from: attaching propagates the
//! body to the whole subtree, detaching clears it the same way. Because of
//! that, membership queries are a flat scan over parts rather than a walk.

use hecs::{Entity, World};
use medbay_logic::anatomy::{PartType, Symmetry};
use medbay_logic::rejection::SurgeryRejection;
use std::collections::HashSet;

use super::bus::{DetachReason, Notification, NotificationBus};
use crate::components::{Body, BodyPart, Brain, Hands, Organ, OrganContainer, PartSurgery};

/// Parts (pre-order, root first) and organs nested under `root`, inclusive.
pub fn subtree(world: &World, root: Entity) -> (Vec<Entity>, Vec<Entity>) {
    let mut parts = Vec::new();
    let mut organs = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![root];

    while let Some(entity) = stack.pop() {
        if !visited.insert(entity) {
            continue;
        }
        let Ok(part) = world.get::<&BodyPart>(entity) else {
            continue;
        };
        parts.push(entity);
        organs.extend(part.organs.iter().copied());
        stack.extend(part.children.values().rev().copied());
    }
    (parts, organs)
}

fn set_body(world: &World, parts: &[Entity], organs: &[Entity], body: Option<Entity>) {
    for &part in parts {
        if let Ok(mut p) = world.get::<&mut BodyPart>(part) {
            p.body = body;
        }
    }
    for &organ in organs {
        if let Ok(mut o) = world.get::<&mut Organ>(organ) {
            o.body = body;
        }
    }
}

/// Attach a detached part to a body, under `parent` at `slot` or as a root
/// part. Returns false without mutating anything if the attachment is not
/// legal.
pub fn attach_part(
    world: &mut World,
    bus: &mut NotificationBus,
    part: Entity,
    body: Entity,
    parent: Option<Entity>,
    slot: Option<&str>,
) -> bool {
    if world.get::<&Body>(body).is_err() {
        log::warn!("attach: {:?} is not a body", body);
        return false;
    }
    match world.get::<&BodyPart>(part) {
        Ok(p) if p.body.is_none() && p.parent.is_none() => {}
        Ok(_) => {
            log::warn!("attach: {:?} is already attached", part);
            return false;
        }
        Err(_) => return false,
    }

    let slot = match parent {
        Some(parent) => {
            let Some(slot) = slot else {
                return false;
            };
            if parent == part {
                return false;
            }
            match world.get::<&BodyPart>(parent) {
                Ok(p) if p.body == Some(body) && !p.children.contains_key(slot) => {}
                _ => return false,
            }
            Some(slot.to_string())
        }
        None => None,
    };

    match (parent, slot.as_ref()) {
        (Some(parent), Some(slot)) => {
            if let Ok(mut p) = world.get::<&mut BodyPart>(parent) {
                p.children.insert(slot.clone(), part);
            }
        }
        _ => {
            if let Ok(mut b) = world.get::<&mut Body>(body) {
                b.root_parts.push(part);
            }
        }
    }
    if let Ok(mut p) = world.get::<&mut BodyPart>(part) {
        p.parent = parent;
        p.slot = slot.clone();
    }

    let (parts, organs) = subtree(world, part);
    set_body(world, &parts, &organs, Some(body));

    bus.publish(Notification::PartAttached {
        part,
        body,
        parent,
        slot,
    });
    for p in parts {
        bus.publish(Notification::PartAddedToBody { body, part: p });
    }
    for o in organs {
        bus.publish(Notification::OrganAddedToBody { body, organ: o });
    }
    true
}

/// Detach a part from its body. Its own children and organs stay with it.
/// Returns false if the part has no body.
pub fn detach_part(
    world: &mut World,
    bus: &mut NotificationBus,
    part: Entity,
    reason: DetachReason,
) -> bool {
    let (old_body, old_parent, slot) = match world.get::<&BodyPart>(part) {
        Ok(p) => match p.body {
            Some(body) => (body, p.parent, p.slot.clone()),
            None => return false,
        },
        Err(_) => return false,
    };

    if let (Some(parent), Some(slot)) = (old_parent, slot.as_deref()) {
        if let Ok(mut p) = world.get::<&mut BodyPart>(parent) {
            if p.children.get(slot) == Some(&part) {
                p.children.remove(slot);
            }
        }
    }
    if let Ok(mut b) = world.get::<&mut Body>(old_body) {
        b.root_parts.retain(|p| *p != part);
    }
    if let Ok(mut p) = world.get::<&mut BodyPart>(part) {
        p.parent = None;
        p.slot = None;
    }

    let (parts, organs) = subtree(world, part);
    set_body(world, &parts, &organs, None);

    bus.publish(Notification::PartDetached {
        part,
        old_body,
        old_parent,
        reason,
    });
    for p in parts {
        bus.publish(Notification::PartRemovedFromBody {
            body: old_body,
            part: p,
        });
    }
    for o in organs {
        bus.publish(Notification::OrganRemovedFromBody {
            body: old_body,
            organ: o,
        });
    }
    true
}

/// Whether `part`'s organ slots would take `organ`.
pub fn check_organ_slot(
    world: &World,
    part: Entity,
    organ: Entity,
) -> Result<(), SurgeryRejection> {
    let category = world
        .get::<&Organ>(organ)
        .map(|o| o.category.clone())
        .map_err(|_| SurgeryRejection::InvalidEntity)?;
    let p = world
        .get::<&BodyPart>(part)
        .map_err(|_| SurgeryRejection::InvalidEntity)?;

    if let Some(slots) = &p.organ_slots {
        if !slots.contains(&category) {
            return Err(SurgeryRejection::NoSlotForOrgan);
        }
        let filled = p.organs.iter().any(|o| {
            *o != organ
                && world
                    .get::<&Organ>(*o)
                    .map(|other| other.category == category)
                    .unwrap_or(false)
        });
        if filled {
            return Err(SurgeryRejection::SlotFilled);
        }
    }
    Ok(())
}

/// Place a free organ into a part. The organ takes the part's body.
pub fn insert_organ(
    world: &mut World,
    bus: &mut NotificationBus,
    part: Entity,
    organ: Entity,
) -> Result<(), SurgeryRejection> {
    match world.get::<&Organ>(organ) {
        Ok(o) if o.container.is_some() => return Err(SurgeryRejection::OrganAlreadyInBody),
        Ok(_) => {}
        Err(_) => return Err(SurgeryRejection::InvalidEntity),
    }
    check_organ_slot(world, part, organ)?;

    let body = {
        let mut p = world
            .get::<&mut BodyPart>(part)
            .map_err(|_| SurgeryRejection::InvalidEntity)?;
        p.organs.push(organ);
        p.body
    };
    if let Ok(mut o) = world.get::<&mut Organ>(organ) {
        o.container = Some(OrganContainer::Part(part));
        o.body = body;
    }

    bus.publish(Notification::OrganInserted { organ, part });
    if let Some(body) = body {
        bus.publish(Notification::OrganAddedToBody { body, organ });
    }
    Ok(())
}

/// Place a free organ into a body's flat loose-organ slot.
pub fn insert_loose_organ(
    world: &mut World,
    bus: &mut NotificationBus,
    body: Entity,
    organ: Entity,
) -> Result<(), SurgeryRejection> {
    match world.get::<&Organ>(organ) {
        Ok(o) if o.container.is_some() => return Err(SurgeryRejection::OrganAlreadyInBody),
        Ok(_) => {}
        Err(_) => return Err(SurgeryRejection::InvalidEntity),
    }
    {
        let mut b = world
            .get::<&mut Body>(body)
            .map_err(|_| SurgeryRejection::InvalidEntity)?;
        b.loose_organs.push(organ);
    }
    if let Ok(mut o) = world.get::<&mut Organ>(organ) {
        o.container = Some(OrganContainer::Body(body));
        o.body = Some(body);
    }
    bus.publish(Notification::OrganAddedToBody { body, organ });
    Ok(())
}

/// Take an organ out of its container.
///
/// A body-part destination receives it (its slots are checked before
/// anything moves); an actor with hands picks it up; anything else leaves
/// it lying free in the world.
pub fn remove_organ(
    world: &mut World,
    bus: &mut NotificationBus,
    organ: Entity,
    destination: Option<Entity>,
) -> Result<(), SurgeryRejection> {
    let container = world
        .get::<&Organ>(organ)
        .map(|o| o.container)
        .map_err(|_| SurgeryRejection::InvalidEntity)?;
    let Some(container) = container else {
        return Err(SurgeryRejection::OrganNotInBodyPart);
    };
    let to_part = destination.filter(|d| world.get::<&BodyPart>(*d).is_ok());
    if let Some(part) = to_part {
        check_organ_slot(world, part, organ)?;
    }

    let (from_part, old_body) = match container {
        OrganContainer::Part(part) => {
            let old_body = match world.get::<&mut BodyPart>(part) {
                Ok(mut p) => {
                    p.organs.retain(|o| *o != organ);
                    p.body
                }
                Err(_) => None,
            };
            (Some(part), old_body)
        }
        OrganContainer::Body(body) => {
            if let Ok(mut b) = world.get::<&mut Body>(body) {
                b.loose_organs.retain(|o| *o != organ);
            }
            (None, Some(body))
        }
    };
    if let Ok(mut o) = world.get::<&mut Organ>(organ) {
        o.container = None;
        o.body = None;
    }

    bus.publish(Notification::OrganRemoved {
        organ,
        part: from_part,
        old_body,
    });
    if let Some(body) = old_body {
        bus.publish(Notification::OrganRemovedFromBody { body, organ });
    }

    if let Some(part) = to_part {
        return insert_organ(world, bus, part, organ);
    }
    if let Some(actor) = destination {
        if let Ok(mut hands) = world.get::<&mut Hands>(actor) {
            hands.pick_up(organ);
        }
    }
    Ok(())
}

/// Every part whose `body` is `body`, at any depth, optionally filtered.
pub fn query_children(
    world: &World,
    body: Entity,
    part_type: Option<PartType>,
    symmetry: Option<Symmetry>,
) -> Vec<Entity> {
    world
        .query::<&BodyPart>()
        .iter()
        .filter(|(_, p)| {
            p.body == Some(body)
                && part_type.map_or(true, |t| p.part_type == t)
                && symmetry.map_or(true, |s| p.symmetry == s)
        })
        .map(|(entity, _)| entity)
        .collect()
}

/// First brain organ nested anywhere under `part`.
pub fn find_brain(world: &World, part: Entity) -> Option<Entity> {
    let (_, organs) = subtree(world, part);
    organs
        .into_iter()
        .find(|o| world.get::<&Brain>(*o).is_ok())
}

/// Total integrity cost of every organ installed in `body`.
pub fn installed_integrity(world: &World, body: Entity) -> i32 {
    world
        .query::<&Organ>()
        .iter()
        .filter(|(_, o)| o.body == Some(body))
        .map(|(_, o)| o.integrity_cost)
        .sum()
}

/// Sum of surgery penalties over the body's parts.
pub fn surgery_penalty(world: &World, body: Entity) -> i32 {
    world
        .query::<(&BodyPart, &PartSurgery)>()
        .iter()
        .filter(|(_, (p, _))| p.body == Some(body))
        .map(|(_, (_, s))| s.penalty)
        .sum()
}
