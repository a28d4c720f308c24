//! Notification bus - publish/subscribe for graph and surgery reactions
//!
//! Graph operations and surgery commits publish notifications instead of
//! calling collaborators directly. The engine drains the bus once per tick:
//! the detachment coordinator reacts first, then every subscriber
//! registered for that notification kind. Reactions may publish further
//! notifications, which are delivered in the same flush.

use hecs::Entity;
use medbay_logic::anatomy::DamageType;
use medbay_logic::catalog::{Layer, ProcedureId};
use medbay_logic::rejection::SurgeryRejection;
use crate::components::MindId;

/// Why a part left its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    Surgery,
    /// Part of a whole-body gib; the gib pass handles stubs and minds itself.
    Gib,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PartAttached {
        part: Entity,
        body: Entity,
        parent: Option<Entity>,
        slot: Option<String>,
    },
    PartAddedToBody {
        body: Entity,
        part: Entity,
    },
    /// Carries the previous body and parent; the part no longer has them.
    PartDetached {
        part: Entity,
        old_body: Entity,
        old_parent: Option<Entity>,
        reason: DetachReason,
    },
    PartRemovedFromBody {
        body: Entity,
        part: Entity,
    },
    OrganInserted {
        organ: Entity,
        part: Entity,
    },
    OrganRemoved {
        organ: Entity,
        part: Option<Entity>,
        old_body: Option<Entity>,
    },
    OrganAddedToBody {
        body: Entity,
        organ: Entity,
    },
    OrganRemovedFromBody {
        body: Entity,
        organ: Entity,
    },
    BodyInitialized {
        body: Entity,
        parts: usize,
    },
    ProcedureCompleted {
        actor: Entity,
        body: Entity,
        part: Entity,
        procedure: ProcedureId,
        layer: Layer,
        organ: Option<Entity>,
    },
    ProcedureRejected {
        actor: Entity,
        procedure: ProcedureId,
        reason: SurgeryRejection,
    },
    /// Surgery-derived state of a part changed; integrity and UI listeners refresh.
    SurgeryStateChanged {
        body: Entity,
        part: Entity,
        penalty: i32,
    },
    /// Negative amounts heal.
    DamageRequested {
        target: Entity,
        damage_type: DamageType,
        amount: f32,
    },
    DetachedPartSpawned {
        stub: Entity,
        original: Entity,
    },
    BodyGibbed {
        body: Entity,
        drops: Vec<Entity>,
    },
    MindTransferred {
        mind: MindId,
        from: Entity,
        to: Entity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    PartAttached,
    PartAddedToBody,
    PartDetached,
    PartRemovedFromBody,
    OrganInserted,
    OrganRemoved,
    OrganAddedToBody,
    OrganRemovedFromBody,
    BodyInitialized,
    ProcedureCompleted,
    ProcedureRejected,
    SurgeryStateChanged,
    DamageRequested,
    DetachedPartSpawned,
    BodyGibbed,
    MindTransferred,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::PartAttached { .. } => NotificationKind::PartAttached,
            Notification::PartAddedToBody { .. } => NotificationKind::PartAddedToBody,
            Notification::PartDetached { .. } => NotificationKind::PartDetached,
            Notification::PartRemovedFromBody { .. } => NotificationKind::PartRemovedFromBody,
            Notification::OrganInserted { .. } => NotificationKind::OrganInserted,
            Notification::OrganRemoved { .. } => NotificationKind::OrganRemoved,
            Notification::OrganAddedToBody { .. } => NotificationKind::OrganAddedToBody,
            Notification::OrganRemovedFromBody { .. } => NotificationKind::OrganRemovedFromBody,
            Notification::BodyInitialized { .. } => NotificationKind::BodyInitialized,
            Notification::ProcedureCompleted { .. } => NotificationKind::ProcedureCompleted,
            Notification::ProcedureRejected { .. } => NotificationKind::ProcedureRejected,
            Notification::SurgeryStateChanged { .. } => NotificationKind::SurgeryStateChanged,
            Notification::DamageRequested { .. } => NotificationKind::DamageRequested,
            Notification::DetachedPartSpawned { .. } => NotificationKind::DetachedPartSpawned,
            Notification::BodyGibbed { .. } => NotificationKind::BodyGibbed,
            Notification::MindTransferred { .. } => NotificationKind::MindTransferred,
        }
    }
}

pub type Handler = Box<dyn FnMut(&Notification)>;

/// Tick-scoped notification queue with per-kind subscribers.
#[derive(Default)]
pub struct NotificationBus {
    pending: Vec<Notification>,
    handlers: Vec<(NotificationKind, Handler)>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    pub fn subscribe(&mut self, kind: NotificationKind, handler: Handler) {
        self.handlers.push((kind, handler));
    }

    /// Take everything published since the last call, in publish order.
    pub fn take_pending(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> &[Notification] {
        &self.pending
    }

    /// Deliver one notification to every subscriber of its kind.
    pub fn dispatch(&mut self, notification: &Notification) {
        let kind = notification.kind();
        for (k, handler) in self.handlers.iter_mut() {
            if *k == kind {
                handler(notification);
            }
        }
    }

    /// Drop queued notifications without delivering them.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("pending", &self.pending)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hecs::World;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_subscribers_only_see_their_kind() {
        let mut world = World::new();
        let body = world.spawn(());
        let part = world.spawn(());

        let mut bus = NotificationBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(
            NotificationKind::PartAddedToBody,
            Box::new(move |n: &Notification| sink.borrow_mut().push(n.clone())),
        );

        bus.publish(Notification::PartAddedToBody { body, part });
        bus.publish(Notification::BodyInitialized { body, parts: 1 });
        assert_eq!(bus.pending().len(), 2);
        for n in bus.take_pending() {
            bus.dispatch(&n);
        }

        assert!(!bus.has_pending());
        assert_eq!(
            *seen.borrow(),
            vec![Notification::PartAddedToBody { body, part }]
        );
    }
}
