//! Do-after queue - timed, cancelable procedure actions
//!
//! A validated request becomes a pending do-after. Each tick the queue is
//! checked for interruptions (movement, hand change, dropped items, reach,
//! vanished entities) and finished entries are handed back for commit.
//! Steps where the actor holds the organ or limb being placed may
//! reposition and switch hands freely.

use hecs::{Entity, World};
use medbay_logic::config::SurgeryConfig;
use serde::{Deserialize, Serialize};

use super::surgery::{ProcedureRequest, ValidatedProcedure};
use crate::components::{Hands, Transform, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DoAfterId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    Moved,
    HandChanged,
    ToolDropped,
    OrganDropped,
    OutOfReach,
    TargetGone,
    /// Cancelled by request.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingProcedure {
    pub id: DoAfterId,
    pub request: ProcedureRequest,
    pub tool: Entity,
    pub started_at: f64,
    pub finishes_at: f64,
    /// Movement and hand changes do not cancel.
    pub relaxed: bool,
    actor_start: Option<Vec3>,
    active_item: Option<Entity>,
}

impl PendingProcedure {
    /// Why this do-after can no longer continue, if anything.
    pub fn interruption(&self, world: &World, config: &SurgeryConfig) -> Option<CancelReason> {
        let request = &self.request;
        let involved = [request.actor, request.body, request.part];
        if involved.iter().any(|e| !world.contains(*e))
            || request.organ.map(|o| !world.contains(o)).unwrap_or(false)
        {
            return Some(CancelReason::TargetGone);
        }

        let Ok(hands) = world.get::<&Hands>(request.actor) else {
            return Some(CancelReason::TargetGone);
        };
        if !hands.holds(self.tool) {
            return Some(CancelReason::ToolDropped);
        }
        if self.relaxed {
            if let Some(organ) = request.organ {
                if !hands.holds(organ) {
                    return Some(CancelReason::OrganDropped);
                }
            }
        } else if hands.active_item() != self.active_item {
            return Some(CancelReason::HandChanged);
        }

        let actor_at = position(world, request.actor);
        if !self.relaxed {
            if let (Some(start), Some(now)) = (self.actor_start, actor_at) {
                if start.distance(&now) > config.movement_cancel_threshold {
                    return Some(CancelReason::Moved);
                }
            }
        }
        if let (Some(actor), Some(body)) = (actor_at, position(world, request.body)) {
            if actor.distance(&body) > config.reach_distance {
                return Some(CancelReason::OutOfReach);
            }
        }
        None
    }
}

fn position(world: &World, entity: Entity) -> Option<Vec3> {
    world.get::<&Transform>(entity).ok().map(|t| t.position)
}

/// Pending do-afters in schedule order.
#[derive(Debug, Clone, Default)]
pub struct DoAfterQueue {
    next_id: u64,
    pending: Vec<PendingProcedure>,
}

impl DoAfterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &mut self,
        world: &World,
        request: ProcedureRequest,
        validated: &ValidatedProcedure,
        now: f64,
    ) -> DoAfterId {
        let id = DoAfterId(self.next_id);
        self.next_id += 1;
        let active_item = world
            .get::<&Hands>(request.actor)
            .ok()
            .and_then(|h| h.active_item());
        self.pending.push(PendingProcedure {
            id,
            actor_start: position(world, request.actor),
            active_item,
            request,
            tool: validated.tool,
            started_at: now,
            finishes_at: now + validated.duration as f64,
            relaxed: validated.in_hand,
        });
        id
    }

    pub fn cancel(&mut self, id: DoAfterId) -> Option<PendingProcedure> {
        let index = self.pending.iter().position(|p| p.id == id)?;
        Some(self.pending.remove(index))
    }

    pub fn get(&self, id: DoAfterId) -> Option<&PendingProcedure> {
        self.pending.iter().find(|p| p.id == id)
    }

    pub fn pending(&self) -> &[PendingProcedure] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove and return every interrupted do-after with its reason.
    pub fn take_interrupted(
        &mut self,
        world: &World,
        config: &SurgeryConfig,
    ) -> Vec<(PendingProcedure, CancelReason)> {
        let mut interrupted = Vec::new();
        let mut kept = Vec::with_capacity(self.pending.len());
        for pending in self.pending.drain(..) {
            match pending.interruption(world, config) {
                Some(reason) => interrupted.push((pending, reason)),
                None => kept.push(pending),
            }
        }
        self.pending = kept;
        interrupted
    }

    /// Remove and return every do-after finished by `now`, in schedule order.
    pub fn take_due(&mut self, now: f64) -> Vec<PendingProcedure> {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.finishes_at <= now);
        self.pending = waiting;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Body, BodyPart, Tool};
    use medbay_logic::anatomy::{PartType, Symmetry};
    use medbay_logic::catalog::{Layer, ProcedureId};

    struct Setup {
        world: World,
        actor: Entity,
        tool: Entity,
        request: ProcedureRequest,
    }

    fn setup() -> Setup {
        let mut world = World::new();
        let body = world.spawn((Body::new("Human"), Transform::default()));
        let part = world.spawn((BodyPart::new(PartType::Torso, Symmetry::None, "Torso"),));
        let tool = world.spawn((Tool::new(&["Scalpel"]),));
        let mut hands = Hands::new();
        hands.pick_up(tool);
        let actor = world.spawn((hands, Transform::at(Vec3::new(1.0, 0.0, 0.0))));
        let request = ProcedureRequest::new(actor, body, part, ProcedureId(0), Layer::Skin);
        Setup {
            world,
            actor,
            tool,
            request,
        }
    }

    fn validated(tool: Entity, in_hand: bool) -> ValidatedProcedure {
        ValidatedProcedure {
            tool,
            improvised: false,
            duration: 2.0,
            in_hand,
        }
    }

    #[test]
    fn test_due_entries_come_out_in_order() {
        let s = setup();
        let mut queue = DoAfterQueue::new();
        let a = queue.schedule(&s.world, s.request.clone(), &validated(s.tool, false), 0.0);
        let b = queue.schedule(&s.world, s.request.clone(), &validated(s.tool, false), 1.0);
        assert!(queue.take_due(1.5).is_empty());
        let due = queue.take_due(3.0);
        assert_eq!(due.iter().map(|p| p.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_movement_cancels_unless_relaxed() {
        let s = setup();
        let mut queue = DoAfterQueue::new();
        let strict = queue.schedule(&s.world, s.request.clone(), &validated(s.tool, false), 0.0);
        let relaxed = queue.schedule(&s.world, s.request.clone(), &validated(s.tool, true), 0.0);

        s.world.get::<&mut Transform>(s.actor).unwrap().position = Vec3::new(0.0, 1.0, 0.0);
        let interrupted = queue.take_interrupted(&s.world, &SurgeryConfig::default());
        assert_eq!(interrupted.len(), 1);
        assert_eq!(interrupted[0].0.id, strict);
        assert_eq!(interrupted[0].1, CancelReason::Moved);
        assert_eq!(queue.pending()[0].id, relaxed);
    }

    #[test]
    fn test_dropped_tool_reach_and_cancel() {
        let mut s = setup();
        let mut queue = DoAfterQueue::new();
        let id = queue.schedule(&s.world, s.request.clone(), &validated(s.tool, true), 0.0);

        s.world.get::<&mut Transform>(s.actor).unwrap().position = Vec3::new(5.0, 0.0, 0.0);
        assert_eq!(
            queue.get(id).unwrap().interruption(&s.world, &SurgeryConfig::default()),
            Some(CancelReason::OutOfReach)
        );
        s.world.get::<&mut Hands>(s.actor).unwrap().drop_item(s.tool);
        assert_eq!(
            queue.get(id).unwrap().interruption(&s.world, &SurgeryConfig::default()),
            Some(CancelReason::ToolDropped)
        );
        s.world.despawn(s.request.part).unwrap();
        assert_eq!(
            queue.get(id).unwrap().interruption(&s.world, &SurgeryConfig::default()),
            Some(CancelReason::TargetGone)
        );

        assert!(queue.cancel(id).is_some());
        assert!(queue.cancel(id).is_none());
    }
}
