//! Surgery engine - main entry point for running the anatomy simulation

use hecs::{Entity, World};
use medbay_logic::anatomy::{DamageType, PartType, Symmetry};
use medbay_logic::catalog::{CatalogError, Layer, ProcedureCatalog, ProcedureId};
use medbay_logic::config::{validate_config, SurgeryConfig};
use medbay_logic::content::{bundled_procedures, bundled_species};
use medbay_logic::rejection::SurgeryRejection;
use medbay_logic::structure::SpeciesCatalog;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{Read, Write};

use crate::components::*;
use crate::persistence::{load_world, save_world, SaveError};
use crate::systems::*;

/// Main surgery engine
pub struct SurgeryEngine {
    /// ECS world containing all entities
    pub world: World,
    /// Tick-scoped notifications
    pub bus: NotificationBus,
    pub procedures: ProcedureCatalog,
    pub species: SpeciesCatalog,
    pub config: SurgeryConfig,
    /// Pending timed procedures
    pub doafters: DoAfterQueue,
    /// Simulation time in seconds since start
    pub sim_time: f64,
    rng: StdRng,
}

impl SurgeryEngine {
    pub fn new(procedures: ProcedureCatalog, species: SpeciesCatalog, config: SurgeryConfig) -> Self {
        for problem in validate_config(&config) {
            log::warn!("surgery config: {}", problem);
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            world: World::new(),
            bus: NotificationBus::new(),
            procedures,
            species,
            config,
            doafters: DoAfterQueue::new(),
            sim_time: 0.0,
            rng,
        }
    }

    /// Engine over the bundled human content.
    pub fn with_bundled_content(config: SurgeryConfig) -> Result<Self, CatalogError> {
        Ok(Self::new(bundled_procedures()?, bundled_species()?, config))
    }

    fn context(&self) -> SurgeryContext<'_> {
        SurgeryContext {
            procedures: &self.procedures,
            species: &self.species,
            config: &self.config,
        }
    }

    /// Spawn an empty body. Call [`Self::body_ready`] to build its parts.
    pub fn spawn_body(&mut self, species: &str, position: Vec3) -> Entity {
        self.world
            .spawn((Body::new(species), Transform::at(position)))
    }

    /// Spawn an actor with empty hands.
    pub fn spawn_actor(&mut self, position: Vec3) -> Entity {
        self.world.spawn((Hands::new(), Transform::at(position)))
    }

    /// Spawn a tool item.
    pub fn spawn_tool(&mut self, tags: &[&str], melee: &[(DamageType, f32)]) -> Entity {
        let item = self.world.spawn((Tool::new(tags),));
        if !melee.is_empty() {
            let _ = self.world.insert_one(
                item,
                MeleeWeapon {
                    damage: melee.to_vec(),
                },
            );
        }
        item
    }

    /// Put an item in an actor's hands and make it active.
    pub fn give(&mut self, actor: Entity, item: Entity) -> bool {
        match self.world.get::<&mut Hands>(actor) {
            Ok(mut hands) => {
                hands.pick_up(item);
                true
            }
            Err(_) => false,
        }
    }

    /// Body-ready signal: build the body's structure once.
    pub fn body_ready(&mut self, body: Entity) -> usize {
        let parts = initialize_body(&mut self.world, &mut self.bus, &self.species, body);
        self.flush();
        parts
    }

    /// Validate a procedure request and schedule its do-after.
    pub fn request_procedure(
        &mut self,
        request: ProcedureRequest,
    ) -> Result<DoAfterId, SurgeryRejection> {
        let validated = match validate_request(&self.world, &self.context(), &request) {
            Ok(v) => v,
            Err(reason) => {
                log::debug!(
                    "{:?} rejected {:?}: {}",
                    request.actor,
                    request.procedure,
                    reason.code()
                );
                return Err(reason);
            }
        };
        let id = self
            .doafters
            .schedule(&self.world, request, &validated, self.sim_time);
        log::debug!(
            "scheduled {:?} for {:.2}s{}",
            id,
            validated.duration,
            if validated.improvised { " (improvised)" } else { "" }
        );
        Ok(id)
    }

    /// Look a procedure up by name and request it on its own layer.
    pub fn request_by_name(
        &mut self,
        actor: Entity,
        body: Entity,
        part: Entity,
        name: &str,
        organ: Option<Entity>,
    ) -> Result<DoAfterId, SurgeryRejection> {
        let id = self
            .procedures
            .lookup(name)
            .ok_or(SurgeryRejection::UnknownProcedure)?;
        let layer = self
            .procedures
            .get(id)
            .map(|d| d.layer)
            .ok_or(SurgeryRejection::UnknownProcedure)?;
        let mut request = ProcedureRequest::new(actor, body, part, id, layer);
        request.organ = organ;
        self.request_procedure(request)
    }

    /// Cancel a pending do-after. The actor is told it was interrupted.
    pub fn cancel_procedure(&mut self, id: DoAfterId) -> bool {
        let Some(pending) = self.doafters.cancel(id) else {
            return false;
        };
        self.reject(&pending.request, SurgeryRejection::DoAfterFailed);
        self.flush();
        true
    }

    fn reject(&mut self, request: &ProcedureRequest, reason: SurgeryRejection) {
        self.bus.publish(Notification::ProcedureRejected {
            actor: request.actor,
            procedure: request.procedure,
            reason,
        });
    }

    /// Advance the simulation by `delta_seconds`.
    pub fn update(&mut self, delta_seconds: f32) {
        self.sim_time += delta_seconds as f64;

        let interrupted = self.doafters.take_interrupted(&self.world, &self.config);
        for (pending, cause) in interrupted {
            log::debug!("{:?} interrupted: {:?}", pending.id, cause);
            self.reject(&pending.request, SurgeryRejection::DoAfterFailed);
        }

        for pending in self.doafters.take_due(self.sim_time) {
            let ctx = SurgeryContext {
                procedures: &self.procedures,
                species: &self.species,
                config: &self.config,
            };
            let result = apply_procedure(
                &mut self.world,
                &mut self.bus,
                &ctx,
                &mut self.rng,
                &pending.request,
            );
            if let Err(reason) = result {
                log::warn!(
                    "{:?} failed at commit: {}",
                    pending.request.procedure,
                    reason.code()
                );
                self.reject(&pending.request, reason);
            }
            // reactions land before the next commit re-validates
            self.flush();
        }

        self.flush();
    }

    /// Deliver pending notifications: coordinator reactions first, then
    /// subscribers, until nothing is left.
    pub fn flush(&mut self) {
        while self.bus.has_pending() {
            for notification in self.bus.take_pending() {
                match &notification {
                    Notification::PartDetached {
                        part,
                        old_body,
                        reason,
                        ..
                    } => {
                        on_part_detached(&mut self.world, &mut self.bus, *part, *old_body, *reason);
                    }
                    Notification::PartAttached { part, body, .. } => {
                        on_part_attached(&mut self.world, &mut self.bus, *part, *body);
                    }
                    _ => {}
                }
                self.bus.dispatch(&notification);
            }
        }
    }

    /// Destroy a body into detached parts and loose organs.
    pub fn gib(&mut self, body: Entity) -> Vec<Entity> {
        let drops = gib_body(
            &mut self.world,
            &mut self.bus,
            &self.config,
            &mut self.rng,
            body,
        );
        self.flush();
        drops
    }

    /// Gib a detached-part stub, dropping its original part's organs.
    pub fn gib_stub(&mut self, stub: Entity) -> Vec<Entity> {
        let drops = gib_detached_part(
            &mut self.world,
            &mut self.bus,
            &self.config,
            &mut self.rng,
            stub,
        );
        self.flush();
        drops
    }

    pub fn query_children(
        &self,
        body: Entity,
        part_type: Option<PartType>,
        symmetry: Option<Symmetry>,
    ) -> Vec<Entity> {
        query_children(&self.world, body, part_type, symmetry)
    }

    pub fn is_open(&self, part: Entity, layer: Layer) -> bool {
        let Some(entry) = self.entry_for(part) else {
            return false;
        };
        self.world
            .get::<&PartSurgery>(part)
            .map(|s| s.is_open(layer, entry))
            .unwrap_or(false)
    }

    fn entry_for(&self, part: Entity) -> Option<&medbay_logic::catalog::CategoryEntry> {
        let p = self.world.get::<&BodyPart>(part).ok()?;
        let body = p.body?;
        let species = self.world.get::<&Body>(body).ok()?.species.clone();
        self.procedures.entry(&species, &p.category)
    }

    /// Performed ids on one layer of a part.
    pub fn performed(&self, part: Entity, layer: Layer) -> Vec<ProcedureId> {
        self.world
            .get::<&PartSurgery>(part)
            .map(|s| s.performed(layer).to_vec())
            .unwrap_or_default()
    }

    pub fn installed_integrity(&self, body: Entity) -> i32 {
        installed_integrity(&self.world, body)
    }

    pub fn surgery_penalty(&self, body: Entity) -> i32 {
        surgery_penalty(&self.world, body)
    }

    /// Save the world. Pending do-afters are not saved.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        save_world(writer, &self.world, self.sim_time)
    }

    /// Replace the world with a saved one. Pending do-afters and queued
    /// notifications are dropped.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), SaveError> {
        let loaded = load_world(reader)?;
        self.world = loaded.world;
        self.sim_time = loaded.sim_time;
        self.doafters.clear();
        self.bus.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SurgeryEngine {
        SurgeryEngine::with_bundled_content(SurgeryConfig::default().with_seed(1)).unwrap()
    }

    #[test]
    fn test_request_then_commit_after_duration() {
        let mut engine = engine();
        let body = engine.spawn_body("Human", Vec3::ZERO);
        assert_eq!(engine.body_ready(body), 6);
        let torso = engine.query_children(body, Some(PartType::Torso), None)[0];
        let surgeon = engine.spawn_actor(Vec3::new(0.5, 0.0, 0.0));
        let scalpel = engine.spawn_tool(&["Scalpel"], &[]);
        engine.give(surgeon, scalpel);

        engine
            .request_by_name(surgeon, body, torso, "RetractSkin", None)
            .unwrap();
        engine.update(1.0);
        assert!(engine.performed(torso, Layer::Skin).is_empty());
        engine.update(1.5);
        assert!(engine.is_open(torso, Layer::Skin));
        assert_eq!(engine.surgery_penalty(body), 1);
        assert!(engine.doafters.is_empty());
    }

    #[test]
    fn test_cancel_notifies_actor() {
        let mut engine = engine();
        let body = engine.spawn_body("Human", Vec3::ZERO);
        engine.body_ready(body);
        let torso = engine.query_children(body, Some(PartType::Torso), None)[0];
        let surgeon = engine.spawn_actor(Vec3::ZERO);
        let scalpel = engine.spawn_tool(&["Scalpel"], &[]);
        engine.give(surgeon, scalpel);

        let rejected = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = rejected.clone();
        engine.bus.subscribe(
            NotificationKind::ProcedureRejected,
            Box::new(move |n: &Notification| sink.borrow_mut().push(n.clone())),
        );

        let id = engine
            .request_by_name(surgeon, body, torso, "RetractSkin", None)
            .unwrap();
        assert!(engine.cancel_procedure(id));
        assert!(!engine.cancel_procedure(id));
        engine.update(5.0);

        assert!(engine.performed(torso, Layer::Skin).is_empty());
        assert_eq!(rejected.borrow().len(), 1);
        assert!(matches!(
            rejected.borrow()[0],
            Notification::ProcedureRejected {
                reason: SurgeryRejection::DoAfterFailed,
                ..
            }
        ));
    }
}
