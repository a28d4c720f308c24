//! Surgery - procedure request validation and commit
//!
//! A request is validated when it is made and validated again, in full,
//! when its do-after completes. Nothing decided at request time is trusted
//! at commit: the part may have been detached, the organ taken, the tool
//! dropped or another surgeon may have closed the layer in between. A
//! failed re-validation is a rejection with no mutation.

use hecs::{Entity, World};
use medbay_logic::anatomy::categories;
use medbay_logic::catalog::{
    CategoryEntry, Layer, ProcedureCatalog, ProcedureDefinition, ProcedureEffect, ProcedureId,
};
use medbay_logic::config::SurgeryConfig;
use medbay_logic::layers::StepOutcome;
use medbay_logic::rejection::SurgeryRejection;
use medbay_logic::structure::SpeciesCatalog;
use medbay_logic::tools::{procedure_duration, resolve_tool, HeldItem};
use rand::Rng;

use super::anatomy::{attach_part, check_organ_slot, detach_part, insert_organ, remove_organ};
use super::bus::{DetachReason, Notification, NotificationBus};
use crate::components::{
    Body, BodyPart, DetachedPart, Hands, MeleeWeapon, Organ, OrganContainer, PartSurgery, Prone,
    Tool, Transform, Vec3,
};

/// A request to perform one procedure step.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureRequest {
    pub actor: Entity,
    pub body: Entity,
    pub part: Entity,
    pub procedure: ProcedureId,
    pub layer: Layer,
    /// The organ worked on, or the held limb for attach-limb.
    pub organ: Option<Entity>,
    pub allow_improvised: bool,
}

impl ProcedureRequest {
    pub fn new(
        actor: Entity,
        body: Entity,
        part: Entity,
        procedure: ProcedureId,
        layer: Layer,
    ) -> Self {
        Self {
            actor,
            body,
            part,
            procedure,
            layer,
            organ: None,
            allow_improvised: true,
        }
    }

    pub fn with_organ(mut self, organ: Entity) -> Self {
        self.organ = Some(organ);
        self
    }

    pub fn improvised(mut self, allow: bool) -> Self {
        self.allow_improvised = allow;
        self
    }
}

/// Read-only catalogs and tuning the surgery systems consult.
#[derive(Clone, Copy)]
pub struct SurgeryContext<'a> {
    pub procedures: &'a ProcedureCatalog,
    pub species: &'a SpeciesCatalog,
    pub config: &'a SurgeryConfig,
}

/// Result of a passing validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedProcedure {
    pub tool: Entity,
    pub improvised: bool,
    /// Seconds until commit.
    pub duration: f32,
    /// The actor holds the organ or limb being placed.
    pub in_hand: bool,
}

/// Enumerate an actor's held items with their tool tags and melee damage.
pub fn held_items(world: &World, hands: &Hands) -> Vec<HeldItem<Entity>> {
    hands
        .held
        .iter()
        .map(|&item| HeldItem {
            item,
            tags: world
                .get::<&Tool>(item)
                .map(|t| t.tags.clone())
                .unwrap_or_default(),
            melee: world
                .get::<&MeleeWeapon>(item)
                .map(|m| m.damage.clone())
                .unwrap_or_default(),
        })
        .collect()
}

/// The limb part a held item stands for: the part itself, or the original
/// behind a detached-part stub.
pub fn held_limb(world: &World, held: Entity) -> Option<(Entity, Option<Entity>)> {
    if world.get::<&BodyPart>(held).is_ok() {
        return Some((held, None));
    }
    let original = world.get::<&DetachedPart>(held).ok()?.original?;
    world.get::<&BodyPart>(original).ok()?;
    Some((original, Some(held)))
}

/// Run every check a request must pass, in order.
pub fn validate_request(
    world: &World,
    ctx: &SurgeryContext,
    request: &ProcedureRequest,
) -> Result<ValidatedProcedure, SurgeryRejection> {
    let hands = world
        .get::<&Hands>(request.actor)
        .map_err(|_| SurgeryRejection::InvalidEntity)?;
    let species = world
        .get::<&Body>(request.body)
        .map(|b| b.species.clone())
        .map_err(|_| SurgeryRejection::InvalidEntity)?;
    let part = world
        .get::<&BodyPart>(request.part)
        .map_err(|_| SurgeryRejection::InvalidEntity)?;
    if let Some(organ) = request.organ {
        if !world.contains(organ) {
            return Err(SurgeryRejection::InvalidEntity);
        }
    }

    match part.body {
        None => return Err(SurgeryRejection::BodyPartDetached),
        Some(body) if body != request.body => return Err(SurgeryRejection::BodyPartNotInBody),
        Some(_) => {}
    }

    let def = ctx
        .procedures
        .get(request.procedure)
        .ok_or(SurgeryRejection::UnknownProcedure)?;
    if def.layer != request.layer {
        return Err(SurgeryRejection::LayerMismatch);
    }
    let entry = ctx
        .procedures
        .entry(&species, &part.category)
        .ok_or(SurgeryRejection::UnknownSpeciesOrCategory)?;
    if !entry.contains(def.id) {
        return Err(SurgeryRejection::ProcedureNotApplicable);
    }

    let held = held_items(world, &hands);
    let tool = resolve_tool(def, &held, request.allow_improvised, ctx.config)
        .ok_or(SurgeryRejection::MissingTool)?;

    check_structure(world, ctx, request, def, &part, &hands)?;

    let state = world.get::<&PartSurgery>(request.part).ok();
    let empty = PartSurgery::new();
    let state = state.as_deref().unwrap_or(&empty);
    if state.has_performed(def, request.organ) {
        return Err(SurgeryRejection::AlreadyDone);
    }
    state.check_prerequisites(def, ctx.procedures, entry, request.organ)?;

    Ok(ValidatedProcedure {
        tool: tool.item,
        improvised: tool.improvised,
        duration: procedure_duration(def, &tool, ctx.config),
        in_hand: def.effect.is_in_hand(),
    })
}

/// Structural legality of limb and organ procedures.
fn check_structure(
    world: &World,
    ctx: &SurgeryContext,
    request: &ProcedureRequest,
    def: &ProcedureDefinition,
    part: &BodyPart,
    hands: &Hands,
) -> Result<(), SurgeryRejection> {
    match def.effect {
        ProcedureEffect::LayerStep => Ok(()),
        ProcedureEffect::DetachLimb => {
            if !part.part_type.is_limb() || !categories::is_limb(&part.category) {
                return Err(SurgeryRejection::InvalidLimbType);
            }
            if part.parent.is_none() {
                return Err(SurgeryRejection::CannotDetachLimb);
            }
            Ok(())
        }
        ProcedureEffect::AttachLimb => {
            let held = request.organ.ok_or(SurgeryRejection::OrganNotInHand)?;
            if !hands.holds(held) {
                return Err(SurgeryRejection::OrganNotInHand);
            }
            let (limb, _) = held_limb(world, held).ok_or(SurgeryRejection::InvalidLimbType)?;
            let limb = world
                .get::<&BodyPart>(limb)
                .map_err(|_| SurgeryRejection::InvalidEntity)?;
            if !limb.part_type.is_limb() {
                return Err(SurgeryRejection::InvalidLimbType);
            }
            if limb.body.is_some() || limb.parent.is_some() {
                return Err(SurgeryRejection::OrganAlreadyInBody);
            }
            let slot = ctx
                .species
                .slot_for(limb.part_type, limb.symmetry)
                .ok_or(SurgeryRejection::NoSlotForOrgan)?;
            if part.children.contains_key(&slot.id) {
                return Err(SurgeryRejection::SlotFilled);
            }
            Ok(())
        }
        ProcedureEffect::InsertOrgan => {
            let organ = request.organ.ok_or(SurgeryRejection::OrganNotInHand)?;
            if !hands.holds(organ) {
                return Err(SurgeryRejection::OrganNotInHand);
            }
            match world.get::<&Organ>(organ) {
                Ok(o) if o.container.is_some() => return Err(SurgeryRejection::OrganAlreadyInBody),
                Ok(_) => {}
                Err(_) => return Err(SurgeryRejection::InvalidEntity),
            }
            check_organ_slot(world, request.part, organ)
        }
        ProcedureEffect::OrganRemovalStep
        | ProcedureEffect::RemoveOrgan
        | ProcedureEffect::OrganInsertionStep => {
            let organ = request.organ.ok_or(SurgeryRejection::OrganNotInBodyPart)?;
            let container = world
                .get::<&Organ>(organ)
                .map(|o| o.container)
                .map_err(|_| SurgeryRejection::InvalidEntity)?;
            if container != Some(OrganContainer::Part(request.part)) {
                return Err(SurgeryRejection::OrganNotInBodyPart);
            }
            Ok(())
        }
    }
}

/// Where a detached limb comes to rest. Off a prone body it lands to its
/// own side, rotated flat.
fn landing_transform<R: Rng>(
    world: &World,
    config: &SurgeryConfig,
    rng: &mut R,
    body: Entity,
    part: &BodyPart,
) -> Transform {
    let origin = world
        .get::<&Transform>(body)
        .map(|t| *t)
        .unwrap_or_default();
    if world.get::<&Prone>(body).is_err() {
        return origin;
    }
    let side = part
        .symmetry
        .lateral_sign()
        .unwrap_or_else(|| if rng.gen_bool(0.5) { -1.0 } else { 1.0 });
    Transform {
        position: origin.position + Vec3::new(side * config.prone_limb_offset, 0.0, 0.0),
        rotation: origin.rotation + side * std::f32::consts::FRAC_PI_2,
    }
}

/// Re-validate and commit a request.
pub fn apply_procedure<R: Rng>(
    world: &mut World,
    bus: &mut NotificationBus,
    ctx: &SurgeryContext,
    rng: &mut R,
    request: &ProcedureRequest,
) -> Result<StepOutcome, SurgeryRejection> {
    validate_request(world, ctx, request)?;

    let def = ctx
        .procedures
        .get(request.procedure)
        .ok_or(SurgeryRejection::UnknownProcedure)?;
    let entry = resolve_entry(world, ctx, request)?;

    match def.effect {
        ProcedureEffect::LayerStep
        | ProcedureEffect::OrganRemovalStep
        | ProcedureEffect::OrganInsertionStep => {}
        ProcedureEffect::RemoveOrgan => {
            let organ = request.organ.ok_or(SurgeryRejection::OrganNotInBodyPart)?;
            remove_organ(world, bus, organ, Some(request.actor))?;
        }
        ProcedureEffect::InsertOrgan => {
            let organ = request.organ.ok_or(SurgeryRejection::OrganNotInHand)?;
            insert_organ(world, bus, request.part, organ)?;
            if let Ok(mut hands) = world.get::<&mut Hands>(request.actor) {
                hands.drop_item(organ);
            }
        }
        ProcedureEffect::DetachLimb => detach_limb(world, bus, ctx.config, rng, request)?,
        ProcedureEffect::AttachLimb => attach_limb(world, bus, ctx, request)?,
    }

    if world.get::<&PartSurgery>(request.part).is_err() {
        let _ = world.insert_one(request.part, PartSurgery::new());
    }
    let (outcome, penalty) = {
        let mut state = world
            .get::<&mut PartSurgery>(request.part)
            .map_err(|_| SurgeryRejection::InvalidEntity)?;
        let outcome = state.record(def, ctx.procedures, entry, request.organ);
        (outcome, state.penalty)
    };

    if let Some(damage) = def.tool.damage {
        bus.publish(Notification::DamageRequested {
            target: request.body,
            damage_type: damage.damage_type,
            amount: damage.amount,
        });
    }
    bus.publish(Notification::ProcedureCompleted {
        actor: request.actor,
        body: request.body,
        part: request.part,
        procedure: def.id,
        layer: def.layer,
        organ: request.organ,
    });
    bus.publish(Notification::SurgeryStateChanged {
        body: request.body,
        part: request.part,
        penalty,
    });
    log::debug!(
        "{:?} performed {} on {:?} (penalty {:+})",
        request.actor,
        def.name,
        request.part,
        outcome.penalty_delta
    );
    Ok(outcome)
}

fn resolve_entry<'a>(
    world: &World,
    ctx: &SurgeryContext<'a>,
    request: &ProcedureRequest,
) -> Result<&'a CategoryEntry, SurgeryRejection> {
    let species = world
        .get::<&Body>(request.body)
        .map(|b| b.species.clone())
        .map_err(|_| SurgeryRejection::InvalidEntity)?;
    let category = world
        .get::<&BodyPart>(request.part)
        .map(|p| p.category.clone())
        .map_err(|_| SurgeryRejection::InvalidEntity)?;
    ctx.procedures
        .entry(&species, &category)
        .ok_or(SurgeryRejection::UnknownSpeciesOrCategory)
}

fn detach_limb<R: Rng>(
    world: &mut World,
    bus: &mut NotificationBus,
    config: &SurgeryConfig,
    rng: &mut R,
    request: &ProcedureRequest,
) -> Result<(), SurgeryRejection> {
    let (landing, fused) = {
        let part = world
            .get::<&BodyPart>(request.part)
            .map_err(|_| SurgeryRejection::InvalidEntity)?;
        let landing = landing_transform(world, config, rng, request.body, &part);
        let fused: Vec<Entity> = part
            .organs
            .iter()
            .copied()
            .filter(|o| {
                world
                    .get::<&Organ>(*o)
                    .map(|organ| config.fused_limb_organs.contains(&organ.category))
                    .unwrap_or(false)
            })
            .collect();
        (landing, fused)
    };

    // hands and feet fall separately
    for organ in fused {
        if remove_organ(world, bus, organ, None).is_ok() {
            let _ = world.insert_one(organ, landing);
        }
    }
    let _ = world.insert_one(request.part, landing);
    if !detach_part(world, bus, request.part, DetachReason::Surgery) {
        return Err(SurgeryRejection::BodyPartDetached);
    }
    Ok(())
}

fn attach_limb(
    world: &mut World,
    bus: &mut NotificationBus,
    ctx: &SurgeryContext,
    request: &ProcedureRequest,
) -> Result<(), SurgeryRejection> {
    let held = request.organ.ok_or(SurgeryRejection::OrganNotInHand)?;
    let (limb, _) = held_limb(world, held).ok_or(SurgeryRejection::InvalidLimbType)?;
    let slot = {
        let l = world
            .get::<&BodyPart>(limb)
            .map_err(|_| SurgeryRejection::InvalidEntity)?;
        ctx.species
            .slot_for(l.part_type, l.symmetry)
            .map(|s| s.id.clone())
            .ok_or(SurgeryRejection::NoSlotForOrgan)?
    };

    if !attach_part(world, bus, limb, request.body, Some(request.part), Some(&slot)) {
        return Err(SurgeryRejection::SlotFilled);
    }
    if let Ok(mut hands) = world.get::<&mut Hands>(request.actor) {
        hands.drop_item(held);
    }
    // the bare limb may have been carried instead of its stub
    let stubs: Vec<Entity> = world
        .query::<&DetachedPart>()
        .iter()
        .filter(|(_, d)| d.original == Some(limb))
        .map(|(e, _)| e)
        .collect();
    for stub in stubs {
        let _ = world.despawn(stub);
    }
    if let Ok(mut state) = world.get::<&mut PartSurgery>(limb) {
        state.forget_effect(ProcedureEffect::DetachLimb, ctx.procedures);
    }
    let _ = world.remove_one::<Transform>(limb);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::anatomy::query_children;
    use crate::systems::initializer::initialize_body;
    use medbay_logic::anatomy::{PartType, Symmetry};
    use medbay_logic::content::{bundled_procedures, bundled_species};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        world: World,
        bus: NotificationBus,
        procedures: ProcedureCatalog,
        species: SpeciesCatalog,
        config: SurgeryConfig,
        rng: StdRng,
        body: Entity,
        surgeon: Entity,
    }

    impl Fixture {
        fn new() -> Self {
            let species = bundled_species().unwrap();
            let mut world = World::new();
            let mut bus = NotificationBus::new();
            let body = world.spawn((Body::new("Human"), Transform::default()));
            initialize_body(&mut world, &mut bus, &species, body);
            let surgeon = world.spawn((Hands::new(), Transform::default()));
            Self {
                world,
                bus,
                procedures: bundled_procedures().unwrap(),
                species,
                config: SurgeryConfig::default(),
                rng: StdRng::seed_from_u64(7),
                body,
                surgeon,
            }
        }

        fn give(&mut self, tags: &[&str]) -> Entity {
            let item = self.world.spawn((Tool::new(tags),));
            self.world
                .get::<&mut Hands>(self.surgeon)
                .unwrap()
                .pick_up(item);
            item
        }

        fn part(&self, part_type: PartType) -> Entity {
            query_children(&self.world, self.body, Some(part_type), None)[0]
        }

        fn request(&self, part: Entity, name: &str) -> ProcedureRequest {
            let id = self.procedures.lookup(name).unwrap();
            let layer = self.procedures.get(id).unwrap().layer;
            ProcedureRequest::new(self.surgeon, self.body, part, id, layer)
        }

        fn perform(&mut self, request: &ProcedureRequest) -> Result<StepOutcome, SurgeryRejection> {
            let ctx = SurgeryContext {
                procedures: &self.procedures,
                species: &self.species,
                config: &self.config,
            };
            apply_procedure(&mut self.world, &mut self.bus, &ctx, &mut self.rng, request)
        }

        fn step(
            &mut self,
            part: Entity,
            name: &str,
            organ: Option<Entity>,
        ) -> Result<StepOutcome, SurgeryRejection> {
            let mut request = self.request(part, name);
            request.organ = organ;
            self.perform(&request)
        }

        fn validate(&self, request: &ProcedureRequest) -> Result<ValidatedProcedure, SurgeryRejection> {
            let ctx = SurgeryContext {
                procedures: &self.procedures,
                species: &self.species,
                config: &self.config,
            };
            validate_request(&self.world, &ctx, request)
        }
    }

    #[test]
    fn test_validation_order() {
        let mut f = Fixture::new();
        let torso = f.part(PartType::Torso);

        let mut wrong_layer = f.request(torso, "RetractSkin");
        wrong_layer.layer = Layer::Tissue;
        assert_eq!(f.validate(&wrong_layer), Err(SurgeryRejection::LayerMismatch));

        let unknown = ProcedureRequest::new(f.surgeon, f.body, torso, ProcedureId(999), Layer::Skin);
        assert_eq!(f.validate(&unknown), Err(SurgeryRejection::UnknownProcedure));

        assert_eq!(
            f.validate(&f.request(torso, "RetractSkin")),
            Err(SurgeryRejection::MissingTool)
        );
        f.give(&["Scalpel"]);
        let ok = f.validate(&f.request(torso, "RetractSkin")).unwrap();
        assert!(!ok.improvised);
        assert_eq!(ok.duration, 2.0);

        let arm = f.part(PartType::Arm);
        f.give(&["Saw"]);
        assert_eq!(
            f.validate(&f.request(torso, "DetachLimb")),
            Err(SurgeryRejection::ProcedureNotApplicable)
        );
        assert_eq!(
            f.validate(&f.request(arm, "DetachLimb")),
            Err(SurgeryRejection::LayerNotOpen)
        );

        let other = f.world.spawn((Body::new("Human"),));
        let mut foreign = f.request(torso, "RetractSkin");
        foreign.body = other;
        assert_eq!(f.validate(&foreign), Err(SurgeryRejection::BodyPartNotInBody));
    }

    #[test]
    fn test_improvised_tool_is_slower() {
        let mut f = Fixture::new();
        let torso = f.part(PartType::Torso);
        f.give(&["Knife"]);
        let v = f.validate(&f.request(torso, "RetractSkin")).unwrap();
        assert!(v.improvised);
        assert_eq!(v.duration, 3.0);
        assert_eq!(
            f.validate(&f.request(torso, "RetractSkin").improvised(false)),
            Err(SurgeryRejection::MissingTool)
        );
    }

    #[test]
    fn test_detach_limb_drops_hand_and_lands_to_its_side() {
        let mut f = Fixture::new();
        f.world.insert_one(f.body, Prone).unwrap();
        let arm = query_children(&f.world, f.body, Some(PartType::Arm), Some(Symmetry::Left))[0];
        f.give(&["Scalpel", "Retractor", "Saw"]);
        for name in ["RetractSkin", "RetractTissue", "SawBone", "DetachLimb"] {
            f.step(arm, name, None).unwrap();
        }

        let part = (*f.world.get::<&BodyPart>(arm).unwrap()).clone();
        assert_eq!(part.body, None);
        assert!(part.organs.is_empty());
        let landing = *f.world.get::<&Transform>(arm).unwrap();
        assert!(landing.position.x < 0.0);

        let detach = f.procedures.lookup("DetachLimb").unwrap();
        assert!(f.world.get::<&PartSurgery>(arm).unwrap().organ.contains(&detach));
        assert_eq!(
            f.validate(&f.request(arm, "RetractSkin")),
            Err(SurgeryRejection::BodyPartDetached)
        );
    }

    #[test]
    fn test_organ_removal_hands_organ_to_surgeon() {
        let mut f = Fixture::new();
        let torso = f.part(PartType::Torso);
        let heart = f.world.get::<&BodyPart>(torso).unwrap().organs[0];
        f.give(&["Scalpel", "Retractor", "Saw", "Hemostat"]);
        for name in ["RetractSkin", "RetractTissue", "SawBone"] {
            f.step(torso, name, None).unwrap();
        }
        assert_eq!(
            f.step(torso, "RemoveOrgan", Some(heart)),
            Err(SurgeryRejection::LayerNotOpen)
        );
        f.step(torso, "ClampVessels", Some(heart)).unwrap();
        f.step(torso, "RemoveOrgan", Some(heart)).unwrap();

        assert!(f.world.get::<&Hands>(f.surgeon).unwrap().holds(heart));
        assert_eq!(f.world.get::<&Organ>(heart).unwrap().container, None);
        assert!(f.world.get::<&PartSurgery>(torso).unwrap().removal.is_empty());

        f.step(torso, "InsertOrgan", Some(heart)).unwrap();
        assert_eq!(f.world.get::<&Organ>(heart).unwrap().body, Some(f.body));
        assert!(!f.world.get::<&Hands>(f.surgeon).unwrap().holds(heart));
    }
}
