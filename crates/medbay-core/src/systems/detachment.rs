//! Detachment and gibbing coordinator
//!
//! Reacts to parts leaving a body and to whole-body destruction. A part
//! that leaves gets a standalone detached-part stub in the world. If it
//! carries a brain while its old body holds the mind, the mind follows the
//! brain. Gibbing walks every part once, moves the mind to the first brain
//! found (only if the body still has it), detaches everything and scatters
//! the stubs and loose organs.

use hecs::{Entity, World};
use medbay_logic::config::SurgeryConfig;
use rand::Rng;
use std::collections::HashSet;

use super::anatomy::{detach_part, remove_organ, subtree};
use super::bus::{DetachReason, Notification, NotificationBus};
use crate::components::{
    Body, BodyPart, Brain, DetachedPart, GrantedAbilities, MindCapable, MindContainer, Transform,
    Vec3,
};

/// Spawn a detached-part stub for `part` at `at`.
pub fn spawn_stub(
    world: &mut World,
    bus: &mut NotificationBus,
    part: Entity,
    at: Transform,
) -> Option<Entity> {
    let stub = world.get::<&BodyPart>(part).ok().map(|p| DetachedPart {
        original: Some(part),
        part_type: p.part_type,
        symmetry: p.symmetry,
        category: p.category.clone(),
    })?;
    let stub = world.spawn((stub, at));
    bus.publish(Notification::DetachedPartSpawned {
        stub,
        original: part,
    });
    Some(stub)
}

/// Move a mind and its granted abilities from one entity to another.
pub fn move_mind(world: &mut World, bus: &mut NotificationBus, from: Entity, to: Entity) -> bool {
    if from == to || !world.contains(to) {
        return false;
    }
    let Ok(container) = world.remove_one::<MindContainer>(from) else {
        return false;
    };
    let abilities = world.remove_one::<GrantedAbilities>(from).ok();
    let _ = world.remove_one::<MindCapable>(from);

    if world.get::<&Body>(to).is_ok() {
        let _ = world.insert_one(to, container);
    } else {
        let _ = world.insert(to, (container, MindCapable));
    }
    if let Some(abilities) = abilities {
        let _ = world.insert_one(to, abilities);
    }

    log::info!("mind {:?} moved from {:?} to {:?}", container.mind, from, to);
    bus.publish(Notification::MindTransferred {
        mind: container.mind,
        from,
        to,
    });
    true
}

fn brains_of(world: &World, part: Entity) -> Vec<Entity> {
    world
        .get::<&BodyPart>(part)
        .map(|p| {
            p.organs
                .iter()
                .copied()
                .filter(|o| world.get::<&Brain>(*o).is_ok())
                .collect()
        })
        .unwrap_or_default()
}

/// React to a part leaving its body. Gib detaches are handled by the gib
/// pass itself. Returns the spawned stub.
pub fn on_part_detached(
    world: &mut World,
    bus: &mut NotificationBus,
    part: Entity,
    old_body: Entity,
    reason: DetachReason,
) -> Option<Entity> {
    if reason == DetachReason::Gib {
        return None;
    }

    if world.get::<&MindContainer>(old_body).is_ok() {
        let (parts, _) = subtree(world, part);
        if let Some(brain) = parts.iter().find_map(|p| brains_of(world, *p).first().copied()) {
            move_mind(world, bus, old_body, brain);
        }
    }

    let at = world
        .get::<&Transform>(part)
        .or_else(|_| world.get::<&Transform>(old_body))
        .map(|t| *t)
        .unwrap_or_default();
    spawn_stub(world, bus, part, at)
}

/// React to a part joining a body: a mind riding on a brain in that part
/// returns to a body that has none.
pub fn on_part_attached(
    world: &mut World,
    bus: &mut NotificationBus,
    part: Entity,
    body: Entity,
) -> bool {
    if world.get::<&MindContainer>(body).is_ok() {
        return false;
    }
    let (_, organs) = subtree(world, part);
    let carrier = organs
        .into_iter()
        .find(|o| world.get::<&Brain>(*o).is_ok() && world.get::<&MindContainer>(*o).is_ok());
    match carrier {
        Some(brain) => move_mind(world, bus, brain, body),
        None => false,
    }
}

fn scatter<R: Rng>(rng: &mut R, origin: Transform, radius: f32) -> Transform {
    if radius <= 0.0 {
        return origin;
    }
    Transform {
        position: origin.position
            + Vec3::new(rng.gen_range(-1.0..=1.0), 0.0, rng.gen_range(-1.0..=1.0)) * radius,
        rotation: rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI),
    }
}

/// Destroy a body into its parts. Returns the drop set: one stub per part
/// plus every loose organ.
pub fn gib_body<R: Rng>(
    world: &mut World,
    bus: &mut NotificationBus,
    config: &SurgeryConfig,
    rng: &mut R,
    body: Entity,
) -> Vec<Entity> {
    let Ok((roots, loose)) = world
        .get::<&Body>(body)
        .map(|b| (b.root_parts.clone(), b.loose_organs.clone()))
    else {
        return Vec::new();
    };
    let origin = world
        .get::<&Transform>(body)
        .map(|t| *t)
        .unwrap_or_default();

    // every part once, organ slots skipped
    let mut visited = HashSet::new();
    let mut parts = Vec::new();
    let mut stack: Vec<Entity> = roots.into_iter().rev().collect();
    while let Some(part) = stack.pop() {
        if !visited.insert(part) {
            continue;
        }
        let Ok(p) = world.get::<&BodyPart>(part) else {
            continue;
        };
        parts.push(part);
        stack.extend(p.children.values().rev().copied());
    }

    if world.get::<&MindContainer>(body).is_ok() {
        if let Some(brain) = parts.iter().find_map(|p| brains_of(world, *p).first().copied()) {
            move_mind(world, bus, body, brain);
        }
    }

    for &part in parts.iter().rev() {
        detach_part(world, bus, part, DetachReason::Gib);
    }

    let mut drops = Vec::with_capacity(parts.len() + loose.len());
    for &part in &parts {
        let at = scatter(rng, origin, config.gib_scatter);
        if let Some(stub) = spawn_stub(world, bus, part, at) {
            drops.push(stub);
        }
    }
    for organ in loose {
        if remove_organ(world, bus, organ, None).is_ok() {
            let _ = world.insert_one(organ, scatter(rng, origin, config.gib_scatter));
            drops.push(organ);
        }
    }

    log::info!("gibbed {:?} into {} pieces", body, drops.len());
    bus.publish(Notification::BodyGibbed {
        body,
        drops: drops.clone(),
    });
    drops
}

/// Gib a detached-part stub: the original part's organs fall out as
/// giblets. Minds are never moved here. The stub itself is left for the
/// caller to destroy.
pub fn gib_detached_part<R: Rng>(
    world: &mut World,
    bus: &mut NotificationBus,
    config: &SurgeryConfig,
    rng: &mut R,
    stub: Entity,
) -> Vec<Entity> {
    let Ok(original) = world.get::<&DetachedPart>(stub).map(|d| d.original) else {
        return Vec::new();
    };
    let origin = world
        .get::<&Transform>(stub)
        .map(|t| *t)
        .unwrap_or_default();

    // a stub whose limb is back on a body no longer owns anything
    let organs = original
        .and_then(|part| world.get::<&BodyPart>(part).ok())
        .filter(|p| p.body.is_none())
        .map(|p| p.organs.clone())
        .unwrap_or_default();
    let mut drops = Vec::with_capacity(organs.len());
    for organ in organs {
        if remove_organ(world, bus, organ, None).is_ok() {
            let _ = world.insert_one(organ, scatter(rng, origin, config.gib_scatter));
            drops.push(organ);
        }
    }
    log::info!("gibbed stub {:?} into {} organs", stub, drops.len());
    drops
}
