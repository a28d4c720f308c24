//! Per-part surgery layer state machine.
//!
//! A [`SurgeryLayerState`] records which procedures have been performed on
//! the Skin, Tissue and Organ layers of one body part, plus per-organ
//! removal and insertion progress. Whether a layer is open is always
//! derived from the performed lists and the part's [`CategoryEntry`], never
//! stored.
//!
//! The state is generic over the organ handle so the same machine runs on
//! ECS entities and on plain integers in tests.

use crate::catalog::{
    CategoryEntry, Layer, OrganFlow, Prerequisite, ProcedureCatalog, ProcedureDefinition,
    ProcedureEffect, ProcedureId, StepRole,
};
use crate::rejection::SurgeryRejection;
use serde::{Deserialize, Serialize};

/// Steps performed against one specific organ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganProgress<O> {
    pub organ: O,
    pub steps: Vec<ProcedureId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeryLayerState<O> {
    pub skin: Vec<ProcedureId>,
    pub tissue: Vec<ProcedureId>,
    pub organ: Vec<ProcedureId>,
    pub removal: Vec<OrganProgress<O>>,
    pub insertion: Vec<OrganProgress<O>>,
    /// Integrity penalty accumulated by performed steps.
    pub penalty: i32,
}

impl<O> Default for SurgeryLayerState<O> {
    fn default() -> Self {
        Self {
            skin: Vec::new(),
            tissue: Vec::new(),
            organ: Vec::new(),
            removal: Vec::new(),
            insertion: Vec::new(),
            penalty: 0,
        }
    }
}

/// What a committed step changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub penalty_delta: i32,
    /// Ids removed by an undo, a re-open or the cascade, in removal order.
    pub removed: Vec<ProcedureId>,
}

impl<O: Copy + PartialEq> SurgeryLayerState<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn performed(&self, layer: Layer) -> &[ProcedureId] {
        match layer {
            Layer::Skin => &self.skin,
            Layer::Tissue => &self.tissue,
            Layer::Organ => &self.organ,
        }
    }

    fn performed_mut(&mut self, layer: Layer) -> &mut Vec<ProcedureId> {
        match layer {
            Layer::Skin => &mut self.skin,
            Layer::Tissue => &mut self.tissue,
            Layer::Organ => &mut self.organ,
        }
    }

    /// Derived open predicate. Tissue requires skin, the organ layer is open
    /// exactly when tissue is.
    pub fn is_open(&self, layer: Layer, entry: &CategoryEntry) -> bool {
        match layer {
            Layer::Skin => self.layer_open_by_itself(Layer::Skin, entry),
            Layer::Tissue => {
                self.is_open(Layer::Skin, entry) && self.layer_open_by_itself(Layer::Tissue, entry)
            }
            Layer::Organ => self.is_open(Layer::Tissue, entry),
        }
    }

    fn layer_open_by_itself(&self, layer: Layer, entry: &CategoryEntry) -> bool {
        let performed = self.performed(layer);
        entry.opening(layer).iter().all(|id| performed.contains(id))
            && !entry.closing(layer).iter().any(|id| performed.contains(id))
    }

    fn records(&self, flow: OrganFlow) -> &[OrganProgress<O>] {
        match flow {
            OrganFlow::Removal => &self.removal,
            OrganFlow::Insertion => &self.insertion,
        }
    }

    fn records_mut(&mut self, flow: OrganFlow) -> &mut Vec<OrganProgress<O>> {
        match flow {
            OrganFlow::Removal => &mut self.removal,
            OrganFlow::Insertion => &mut self.insertion,
        }
    }

    pub fn organ_steps(&self, flow: OrganFlow, organ: O) -> &[ProcedureId] {
        self.records(flow)
            .iter()
            .find(|r| r.organ == organ)
            .map(|r| r.steps.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `def` is already recorded for this part (or for `organ`, for
    /// organ-scoped steps).
    pub fn has_performed(&self, def: &ProcedureDefinition, organ: Option<O>) -> bool {
        if !is_recorded(def.effect) {
            return false;
        }
        match def.effect.organ_flow() {
            Some(flow) => organ
                .map(|o| self.organ_steps(flow, o).contains(&def.id))
                .unwrap_or(false),
            None => self.performed(def.layer).contains(&def.id),
        }
    }

    fn step_performed(&self, id: ProcedureId, catalog: &ProcedureCatalog, organ: Option<O>) -> bool {
        let Some(def) = catalog.get(id) else {
            return false;
        };
        match def.effect.organ_flow() {
            Some(flow) => organ
                .map(|o| self.organ_steps(flow, o).contains(&id))
                .unwrap_or(false),
            None => self.performed(def.layer).contains(&id),
        }
    }

    /// First prerequisite of `def` that does not hold, if any.
    pub fn unmet_prerequisite(
        &self,
        def: &ProcedureDefinition,
        catalog: &ProcedureCatalog,
        entry: &CategoryEntry,
        organ: Option<O>,
    ) -> Option<Prerequisite> {
        def.prerequisites.iter().copied().find(|p| match *p {
            Prerequisite::LayerOpen(layer) => !self.is_open(layer, entry),
            Prerequisite::LayerClosed(layer) => self.is_open(layer, entry),
            Prerequisite::Step(id) => !self.step_performed(id, catalog, organ),
        })
    }

    pub fn check_prerequisites(
        &self,
        def: &ProcedureDefinition,
        catalog: &ProcedureCatalog,
        entry: &CategoryEntry,
        organ: Option<O>,
    ) -> Result<(), SurgeryRejection> {
        match self.unmet_prerequisite(def, catalog, entry, organ) {
            None => Ok(()),
            Some(Prerequisite::LayerClosed(_)) => Err(SurgeryRejection::LayerNotClosed),
            Some(_) => Err(SurgeryRejection::LayerNotOpen),
        }
    }

    /// Record a committed step and run undo/cascade bookkeeping.
    ///
    /// Callers validate first; this never rejects.
    pub fn record(
        &mut self,
        def: &ProcedureDefinition,
        catalog: &ProcedureCatalog,
        entry: &CategoryEntry,
        organ: Option<O>,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        if let Some(flow) = def.effect.organ_flow() {
            if let Some(organ) = organ {
                outcome.penalty_delta += def.penalty;
                if def.is_terminal_removal() {
                    self.clear_organ(organ);
                } else {
                    let records = self.records_mut(flow);
                    match records.iter_mut().find(|r| r.organ == organ) {
                        Some(record) => record.steps.push(def.id),
                        None => records.push(OrganProgress {
                            organ,
                            steps: vec![def.id],
                        }),
                    }
                }
            }
            self.penalty += outcome.penalty_delta;
            return outcome;
        }

        match def.role {
            StepRole::Open | StepRole::Step => {
                if def.role == StepRole::Open {
                    // re-opening retracts any close that undid this step
                    let undoing: Vec<ProcedureId> = self
                        .performed(def.layer)
                        .iter()
                        .copied()
                        .filter(|id| catalog.get(*id).and_then(|d| d.undoes) == Some(def.id))
                        .collect();
                    for id in undoing {
                        self.remove_step(def.layer, id);
                        outcome.penalty_delta -= penalty_of(catalog, id);
                        outcome.removed.push(id);
                    }
                }
                if is_recorded(def.effect) && !self.performed(def.layer).contains(&def.id) {
                    self.performed_mut(def.layer).push(def.id);
                }
                outcome.penalty_delta += def.penalty;
                self.penalty += outcome.penalty_delta;
            }
            StepRole::Close => {
                outcome.penalty_delta += def.penalty;
                self.performed_mut(def.layer).push(def.id);
                if let Some(target) = def.undoes {
                    if self.remove_step(def.layer, target) {
                        outcome.penalty_delta -= penalty_of(catalog, target);
                        outcome.removed.push(target);
                    }
                }
                self.penalty += outcome.penalty_delta;

                let cascaded = self.cascade(catalog, entry);
                for (id, refund) in cascaded {
                    outcome.penalty_delta -= refund;
                    outcome.removed.push(id);
                }

                // nothing left to keep closed: those layers are pristine again
                for layer in Layer::ALL {
                    for id in self.orphaned_closes(layer, catalog) {
                        self.remove_step(layer, id);
                        if id != def.id {
                            outcome.removed.push(id);
                        }
                    }
                }
            }
        }

        outcome
    }

    /// Closing steps recorded on a layer that has no opening step left.
    fn orphaned_closes(&self, layer: Layer, catalog: &ProcedureCatalog) -> Vec<ProcedureId> {
        let role = |id: &ProcedureId| catalog.get(*id).map(|d| d.role);
        let performed = self.performed(layer);
        if performed.iter().any(|id| role(id) == Some(StepRole::Open)) {
            return Vec::new();
        }
        performed
            .iter()
            .copied()
            .filter(|id| role(id) == Some(StepRole::Close))
            .collect()
    }

    /// Remove every performed non-closing step whose prerequisites no longer
    /// hold, until none remain. Returns removed ids with refunded penalties.
    pub fn cascade(
        &mut self,
        catalog: &ProcedureCatalog,
        entry: &CategoryEntry,
    ) -> Vec<(ProcedureId, i32)> {
        let mut removed = Vec::new();
        loop {
            let mut changed = false;

            for layer in Layer::ALL {
                let performed = self.performed(layer).to_vec();
                for id in performed {
                    let Some(def) = catalog.get(id) else {
                        continue;
                    };
                    if def.is_closing() {
                        continue;
                    }
                    if self.unmet_prerequisite(def, catalog, entry, None).is_some() {
                        self.remove_step(layer, id);
                        self.penalty -= def.penalty;
                        removed.push((id, def.penalty));
                        changed = true;
                    }
                }
            }

            for flow in [OrganFlow::Removal, OrganFlow::Insertion] {
                let organs: Vec<O> = self.records(flow).iter().map(|r| r.organ).collect();
                for organ in organs {
                    let steps = self.organ_steps(flow, organ).to_vec();
                    for id in steps {
                        let Some(def) = catalog.get(id) else {
                            continue;
                        };
                        if self
                            .unmet_prerequisite(def, catalog, entry, Some(organ))
                            .is_some()
                        {
                            if let Some(record) =
                                self.records_mut(flow).iter_mut().find(|r| r.organ == organ)
                            {
                                record.steps.retain(|s| *s != id);
                            }
                            self.penalty -= def.penalty;
                            removed.push((id, def.penalty));
                            changed = true;
                        }
                    }
                }
                self.records_mut(flow).retain(|r| !r.steps.is_empty());
            }

            if !changed {
                break;
            }
        }
        removed
    }

    /// Forget part-wide steps with the given effect. Penalties stay.
    pub fn forget_effect(
        &mut self,
        effect: ProcedureEffect,
        catalog: &ProcedureCatalog,
    ) -> Vec<ProcedureId> {
        let mut forgotten = Vec::new();
        for layer in Layer::ALL {
            self.performed_mut(layer).retain(|id| {
                let matches = catalog.get(*id).map(|d| d.effect) == Some(effect);
                if matches {
                    forgotten.push(*id);
                }
                !matches
            });
        }
        forgotten
    }

    /// Drop all removal and insertion progress for an organ.
    pub fn clear_organ(&mut self, organ: O) {
        self.removal.retain(|r| r.organ != organ);
        self.insertion.retain(|r| r.organ != organ);
    }

    fn remove_step(&mut self, layer: Layer, id: ProcedureId) -> bool {
        let list = self.performed_mut(layer);
        let before = list.len();
        list.retain(|s| *s != id);
        list.len() != before
    }

    /// Map the organ handle type, e.g. to raw ids for persistence.
    pub fn map_organs<P, F: FnMut(O) -> Option<P>>(&self, mut f: F) -> SurgeryLayerState<P> {
        let mut map = |records: &[OrganProgress<O>]| {
            records
                .iter()
                .filter_map(|r| {
                    f(r.organ).map(|organ| OrganProgress {
                        organ,
                        steps: r.steps.clone(),
                    })
                })
                .collect::<Vec<_>>()
        };
        let removal = map(&self.removal);
        let insertion = map(&self.insertion);
        SurgeryLayerState {
            skin: self.skin.clone(),
            tissue: self.tissue.clone(),
            organ: self.organ.clone(),
            removal,
            insertion,
            penalty: self.penalty,
        }
    }
}

/// Attach-limb and terminal removal change topology only; they leave no
/// record behind.
fn is_recorded(effect: ProcedureEffect) -> bool {
    !matches!(
        effect,
        ProcedureEffect::AttachLimb | ProcedureEffect::RemoveOrgan
    )
}

fn penalty_of(catalog: &ProcedureCatalog, id: ProcedureId) -> i32 {
    catalog.get(id).map(|d| d.penalty).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        RawCatalog, RawPrerequisite, RawProcedure, RawSurgeryEntry, ToolRequirement,
    };

    fn step(id: &str, layer: Layer, role: StepRole, penalty: i32) -> RawProcedure {
        RawProcedure {
            id: id.to_string(),
            layer,
            role,
            effect: ProcedureEffect::LayerStep,
            tool: ToolRequirement {
                tag: "Scalpel".into(),
                time: 1.0,
                damage: None,
            },
            improvised: vec![],
            prerequisites: vec![],
            undoes: None,
            penalty,
        }
    }

    fn catalog() -> ProcedureCatalog {
        let mut close_incision = step("CloseIncision", Layer::Skin, StepRole::Close, 0);
        close_incision.undoes = Some("RetractSkin".into());
        close_incision.prerequisites = vec![RawPrerequisite::LayerOpen(Layer::Skin)];

        let mut retract_tissue = step("RetractTissue", Layer::Tissue, StepRole::Open, 2);
        retract_tissue.prerequisites = vec![RawPrerequisite::LayerOpen(Layer::Skin)];

        let mut saw = step("SawBone", Layer::Tissue, StepRole::Open, 2);
        saw.prerequisites = vec![RawPrerequisite::Step("RetractTissue".into())];

        let mut set_bone = step("SetBone", Layer::Tissue, StepRole::Close, 0);
        set_bone.undoes = Some("SawBone".into());

        let mut clamp = step("Clamp", Layer::Organ, StepRole::Step, 1);
        clamp.effect = ProcedureEffect::OrganRemovalStep;
        clamp.prerequisites = vec![RawPrerequisite::LayerOpen(Layer::Organ)];

        let mut extract = step("Extract", Layer::Organ, StepRole::Step, 1);
        extract.effect = ProcedureEffect::RemoveOrgan;
        extract.prerequisites = vec![RawPrerequisite::Step("Clamp".into())];

        let procedures = vec![
            step("RetractSkin", Layer::Skin, StepRole::Open, 1),
            close_incision,
            retract_tissue,
            saw,
            set_bone,
            clamp,
            extract,
        ];
        let names = procedures.iter().map(|p| p.id.clone()).collect();
        ProcedureCatalog::from_raw(RawCatalog {
            procedures,
            surgeries: vec![RawSurgeryEntry {
                species: "Human".into(),
                category: "Torso".into(),
                procedures: names,
            }],
        })
    }

    fn perform(
        state: &mut SurgeryLayerState<u32>,
        catalog: &ProcedureCatalog,
        name: &str,
        organ: Option<u32>,
    ) -> Result<StepOutcome, SurgeryRejection> {
        let entry = catalog.entry("Human", "Torso").unwrap();
        let def = catalog.get(catalog.lookup(name).unwrap()).unwrap();
        if state.has_performed(def, organ) {
            return Err(SurgeryRejection::AlreadyDone);
        }
        state.check_prerequisites(def, catalog, entry, organ)?;
        Ok(state.record(def, catalog, entry, organ))
    }

    fn id(catalog: &ProcedureCatalog, name: &str) -> ProcedureId {
        catalog.lookup(name).unwrap()
    }

    #[test]
    fn test_open_and_close_skin() {
        let catalog = catalog();
        let entry = catalog.entry("Human", "Torso").unwrap();
        let mut state = SurgeryLayerState::<u32>::new();

        assert!(!state.is_open(Layer::Skin, entry));
        perform(&mut state, &catalog, "RetractSkin", None).unwrap();
        assert_eq!(state.skin, vec![id(&catalog, "RetractSkin")]);
        assert!(state.is_open(Layer::Skin, entry));
        assert_eq!(state.penalty, 1);

        perform(&mut state, &catalog, "CloseIncision", None).unwrap();
        assert!(state.skin.is_empty());
        assert!(!state.is_open(Layer::Skin, entry));
        assert_eq!(state.penalty, 0);
    }

    #[test]
    fn test_tissue_requires_open_skin() {
        let catalog = catalog();
        let mut state = SurgeryLayerState::<u32>::new();
        assert_eq!(
            perform(&mut state, &catalog, "RetractTissue", None),
            Err(SurgeryRejection::LayerNotOpen)
        );
        perform(&mut state, &catalog, "RetractSkin", None).unwrap();
        assert_eq!(
            perform(&mut state, &catalog, "RetractSkin", None),
            Err(SurgeryRejection::AlreadyDone)
        );
        perform(&mut state, &catalog, "RetractTissue", None).unwrap();
    }

    #[test]
    fn test_closing_skin_cascades_through_tissue_and_organs() {
        let catalog = catalog();
        let entry = catalog.entry("Human", "Torso").unwrap();
        let mut state = SurgeryLayerState::<u32>::new();
        for name in ["RetractSkin", "RetractTissue", "SawBone"] {
            perform(&mut state, &catalog, name, None).unwrap();
        }
        assert!(state.is_open(Layer::Organ, entry));
        perform(&mut state, &catalog, "Clamp", Some(7)).unwrap();
        assert_eq!(state.penalty, 6);

        let outcome = perform(&mut state, &catalog, "CloseIncision", None).unwrap();
        assert!(state.skin.is_empty());
        assert!(state.tissue.is_empty());
        assert!(state.removal.is_empty());
        assert_eq!(state.penalty, 0);
        assert_eq!(outcome.removed.len(), 4);
    }

    #[test]
    fn test_partial_close_is_recorded_and_reopen_round_trips() {
        let catalog = catalog();
        let entry = catalog.entry("Human", "Torso").unwrap();
        let mut state = SurgeryLayerState::<u32>::new();
        for name in ["RetractSkin", "RetractTissue", "SawBone"] {
            perform(&mut state, &catalog, name, None).unwrap();
        }
        let before = state.clone();

        perform(&mut state, &catalog, "SetBone", None).unwrap();
        assert_eq!(
            state.tissue,
            vec![id(&catalog, "RetractTissue"), id(&catalog, "SetBone")]
        );
        assert!(!state.is_open(Layer::Tissue, entry));
        assert!(state.is_open(Layer::Skin, entry));

        perform(&mut state, &catalog, "SawBone", None).unwrap();
        assert_eq!(state.tissue, before.tissue);
        assert_eq!(state.penalty, before.penalty);
        assert!(state.is_open(Layer::Organ, entry));
    }

    #[test]
    fn test_closing_skin_drops_partial_tissue_close() {
        let catalog = catalog();
        let entry = catalog.entry("Human", "Torso").unwrap();
        let mut state = SurgeryLayerState::<u32>::new();
        for name in ["RetractSkin", "RetractTissue", "SawBone", "SetBone"] {
            perform(&mut state, &catalog, name, None).unwrap();
        }
        assert_eq!(state.tissue, vec![id(&catalog, "RetractTissue"), id(&catalog, "SetBone")]);

        let outcome = perform(&mut state, &catalog, "CloseIncision", None).unwrap();
        assert!(state.skin.is_empty());
        assert!(state.tissue.is_empty());
        assert!(outcome.removed.contains(&id(&catalog, "SetBone")));
        assert!(!state.is_open(Layer::Tissue, entry));
        assert_eq!(state.penalty, 0);
    }

    #[test]
    fn test_organ_progress_is_per_organ() {
        let catalog = catalog();
        let mut state = SurgeryLayerState::<u32>::new();
        for name in ["RetractSkin", "RetractTissue", "SawBone"] {
            perform(&mut state, &catalog, name, None).unwrap();
        }
        perform(&mut state, &catalog, "Clamp", Some(1)).unwrap();
        assert_eq!(
            perform(&mut state, &catalog, "Extract", Some(2)),
            Err(SurgeryRejection::LayerNotOpen)
        );
        perform(&mut state, &catalog, "Extract", Some(1)).unwrap();
        assert!(state.organ_steps(OrganFlow::Removal, 1).is_empty());
    }

    #[test]
    fn test_map_organs() {
        let catalog = catalog();
        let mut state = SurgeryLayerState::<u32>::new();
        for name in ["RetractSkin", "RetractTissue", "SawBone"] {
            perform(&mut state, &catalog, name, None).unwrap();
        }
        perform(&mut state, &catalog, "Clamp", Some(3)).unwrap();
        let mapped: SurgeryLayerState<u64> = state.map_organs(|o| Some(o as u64 * 10));
        assert_eq!(mapped.removal[0].organ, 30);
        assert_eq!(mapped.tissue, state.tissue);
    }
}
