//! Property tests for body back-references under random attach/detach.

use hecs::{Entity, World};
use medbay_core::components::{Body, BodyPart, Organ};
use medbay_core::systems::{
    attach_part, detach_part, insert_organ, subtree, DetachReason, NotificationBus,
};
use medbay_logic::anatomy::{PartType, Symmetry};
use proptest::prelude::*;
use std::collections::HashSet;

struct Anatomy {
    world: World,
    bus: NotificationBus,
    body: Entity,
    /// (part, parent index, slot)
    parts: Vec<(Entity, Option<usize>, &'static str)>,
}

fn anatomy() -> Anatomy {
    let mut world = World::new();
    let mut bus = NotificationBus::new();
    let body = world.spawn((Body::new("Human"),));

    let layout: [(PartType, Symmetry, &str, Option<usize>, &'static str); 5] = [
        (PartType::Torso, Symmetry::None, "Torso", None, ""),
        (PartType::Head, Symmetry::None, "Head", Some(0), "head"),
        (PartType::Arm, Symmetry::Left, "ArmLeft", Some(0), "left_arm"),
        (PartType::Arm, Symmetry::Right, "ArmRight", Some(0), "right_arm"),
        (PartType::Leg, Symmetry::Left, "LegLeft", Some(2), "stump"),
    ];

    let mut parts = Vec::new();
    for (part_type, symmetry, category, parent, slot) in layout {
        let part = world.spawn((BodyPart::new(part_type, symmetry, category),));
        let organ = world.spawn((Organ::new(format!("{}Organ", category), 1),));
        insert_organ(&mut world, &mut bus, part, organ).unwrap();
        parts.push((part, parent, slot));
    }
    for i in 0..parts.len() {
        let (part, parent, slot) = parts[i];
        let parent = parent.map(|p| parts[p].0);
        assert!(attach_part(&mut world, &mut bus, part, body, parent, parent.map(|_| slot)));
    }
    bus.clear();

    Anatomy {
        world,
        bus,
        body,
        parts,
    }
}

fn assert_back_references(world: &World, body: Entity) {
    let roots = world.get::<&Body>(body).unwrap().root_parts.clone();
    let mut reachable = HashSet::new();
    for root in roots {
        assert_eq!(world.get::<&BodyPart>(root).unwrap().parent, None);
        let (parts, organs) = subtree(world, root);
        for part in parts {
            assert_eq!(world.get::<&BodyPart>(part).unwrap().body, Some(body));
            reachable.insert(part);
        }
        for organ in organs {
            assert_eq!(world.get::<&Organ>(organ).unwrap().body, Some(body));
        }
    }

    for (entity, part) in world.query::<&BodyPart>().iter() {
        if !reachable.contains(&entity) {
            assert_eq!(part.body, None);
            for organ in &part.organs {
                assert_eq!(world.get::<&Organ>(*organ).unwrap().body, None);
            }
        }
        if let (Some(parent), Some(slot)) = (part.parent, part.slot.as_ref()) {
            let parent = world.get::<&BodyPart>(parent).unwrap();
            assert_eq!(parent.children.get(slot), Some(&entity));
        }
    }
}

proptest! {
    #[test]
    fn body_references_follow_reachability(
        ops in prop::collection::vec((0usize..5, any::<bool>()), 1..40)
    ) {
        let mut a = anatomy();
        assert_back_references(&a.world, a.body);

        for (index, attach) in ops {
            let (part, parent, slot) = a.parts[index];
            if attach {
                let parent = parent.map(|p| a.parts[p].0);
                attach_part(&mut a.world, &mut a.bus, part, a.body, parent, parent.map(|_| slot));
            } else {
                let was_attached = a.world.get::<&BodyPart>(part).unwrap().body.is_some();
                let detached = detach_part(&mut a.world, &mut a.bus, part, DetachReason::Other);
                prop_assert_eq!(detached, was_attached);
                if detached {
                    let (parts, organs) = subtree(&a.world, part);
                    for p in parts {
                        prop_assert_eq!(a.world.get::<&BodyPart>(p).unwrap().body, None);
                    }
                    for o in organs {
                        prop_assert_eq!(a.world.get::<&Organ>(o).unwrap().body, None);
                    }
                }
            }
            assert_back_references(&a.world, a.body);
            a.bus.clear();
        }
    }
}
