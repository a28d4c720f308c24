//! Procedure catalog: immutable, externally authored surgery definitions.
//!
//! Content is authored with string ids. At load time every reference
//! (prerequisite steps, `undoes` targets, per-category procedure lists) is
//! resolved once into a dense [`ProcedureId`] index, so validation never
//! compares strings. Entries with dangling references are configuration
//! faults: they are logged and skipped, the rest of the catalog still loads.

use crate::anatomy::DamageType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Species key that matches any species lacking a specific entry.
pub const ANY_SPECIES: &str = "*";

/// Interned procedure index into [`ProcedureCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcedureId(pub u32);

impl ProcedureId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Successive depths of surgical access on a body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Skin,
    Tissue,
    Organ,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Skin, Layer::Tissue, Layer::Organ];
}

/// Whether a step opens its layer, closes it, or is neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepRole {
    Open,
    Close,
    #[default]
    Step,
}

/// Per-organ progress list a step is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrganFlow {
    Removal,
    Insertion,
}

/// Structural effect applied when a procedure commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcedureEffect {
    /// Recorded in the part-wide list for its layer.
    #[default]
    LayerStep,
    /// Recorded in the organ's removal progress.
    OrganRemovalStep,
    /// Terminal step of an organ-removal flow: frees the organ.
    RemoveOrgan,
    /// Recorded in the organ's insertion progress.
    OrganInsertionStep,
    /// Places a held organ into the part and starts its insertion progress.
    InsertOrgan,
    DetachLimb,
    AttachLimb,
}

impl ProcedureEffect {
    pub fn organ_flow(self) -> Option<OrganFlow> {
        match self {
            ProcedureEffect::OrganRemovalStep | ProcedureEffect::RemoveOrgan => {
                Some(OrganFlow::Removal)
            }
            ProcedureEffect::OrganInsertionStep | ProcedureEffect::InsertOrgan => {
                Some(OrganFlow::Insertion)
            }
            _ => None,
        }
    }

    /// Steps where the actor holds the organ or limb being worked on.
    pub fn is_in_hand(self) -> bool {
        matches!(
            self,
            ProcedureEffect::InsertOrgan | ProcedureEffect::AttachLimb
        )
    }

    /// Steps that must name an organ (or held limb) in the request.
    pub fn needs_organ(self) -> bool {
        self.organ_flow().is_some() || self == ProcedureEffect::AttachLimb
    }
}

/// Damage (positive) or healing (negative) dealt when a step commits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageSpec {
    pub damage_type: DamageType,
    pub amount: f32,
}

/// The tool a procedure is designed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub tag: String,
    /// Base duration in seconds.
    pub time: f32,
    #[serde(default)]
    pub damage: Option<DamageSpec>,
}

/// An acceptable substitute for the primary tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImprovisedTool {
    /// Any item with this tag. Duration is multiplied flatly.
    Tag {
        tag: String,
        #[serde(default)]
        time_multiplier: Option<f32>,
    },
    /// Any weapon dealing this damage type. Speed scales with damage.
    Damage {
        damage_type: DamageType,
        #[serde(default)]
        baseline: Option<f32>,
    },
}

/// Prerequisite as authored, with string step references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawPrerequisite {
    LayerOpen(Layer),
    LayerClosed(Layer),
    Step(String),
}

/// Prerequisite with resolved step references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prerequisite {
    LayerOpen(Layer),
    LayerClosed(Layer),
    Step(ProcedureId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProcedure {
    pub id: String,
    pub layer: Layer,
    #[serde(default)]
    pub role: StepRole,
    #[serde(default)]
    pub effect: ProcedureEffect,
    pub tool: ToolRequirement,
    #[serde(default)]
    pub improvised: Vec<ImprovisedTool>,
    #[serde(default)]
    pub prerequisites: Vec<RawPrerequisite>,
    #[serde(default)]
    pub undoes: Option<String>,
    #[serde(default)]
    pub penalty: i32,
}

/// Which procedures apply to a (species, organ category) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSurgeryEntry {
    pub species: String,
    pub category: String,
    pub procedures: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCatalog {
    pub procedures: Vec<RawProcedure>,
    #[serde(default)]
    pub surgeries: Vec<RawSurgeryEntry>,
}

/// A resolved, immutable procedure definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDefinition {
    pub id: ProcedureId,
    pub name: String,
    pub layer: Layer,
    pub role: StepRole,
    pub effect: ProcedureEffect,
    pub tool: ToolRequirement,
    pub improvised: Vec<ImprovisedTool>,
    pub prerequisites: Vec<Prerequisite>,
    pub undoes: Option<ProcedureId>,
    pub penalty: i32,
}

impl ProcedureDefinition {
    pub fn is_terminal_removal(&self) -> bool {
        self.effect == ProcedureEffect::RemoveOrgan
    }

    pub fn is_closing(&self) -> bool {
        self.role == StepRole::Close
    }
}

/// Resolved catalog entry for one (species, category) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryEntry {
    pub procedures: Vec<ProcedureId>,
    pub skin_open: Vec<ProcedureId>,
    pub skin_close: Vec<ProcedureId>,
    pub tissue_open: Vec<ProcedureId>,
    pub tissue_close: Vec<ProcedureId>,
}

impl CategoryEntry {
    pub fn contains(&self, id: ProcedureId) -> bool {
        self.procedures.contains(&id)
    }

    /// Opening steps of a layer. The organ layer has none of its own.
    pub fn opening(&self, layer: Layer) -> &[ProcedureId] {
        match layer {
            Layer::Skin => &self.skin_open,
            Layer::Tissue => &self.tissue_open,
            Layer::Organ => &[],
        }
    }

    pub fn closing(&self, layer: Layer) -> &[ProcedureId] {
        match layer {
            Layer::Skin => &self.skin_close,
            Layer::Tissue => &self.tissue_close,
            Layer::Organ => &[],
        }
    }

    fn push(&mut self, def: &ProcedureDefinition) {
        if self.procedures.contains(&def.id) {
            return;
        }
        self.procedures.push(def.id);
        let list = match (def.layer, def.role) {
            (Layer::Skin, StepRole::Open) => &mut self.skin_open,
            (Layer::Skin, StepRole::Close) => &mut self.skin_close,
            (Layer::Tissue, StepRole::Open) => &mut self.tissue_open,
            (Layer::Tissue, StepRole::Close) => &mut self.tissue_close,
            _ => return,
        };
        list.push(def.id);
    }
}

/// A content authoring fault found while resolving the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogIssue {
    #[error("procedure '{0}' is defined more than once; later definitions ignored")]
    DuplicateProcedure(String),
    #[error("procedure '{procedure}' references unknown or skipped procedure '{reference}'")]
    UnknownReference { procedure: String, reference: String },
    #[error("procedure '{procedure}' undoes '{target}', which is not an opening step of the same layer")]
    InvalidUndo { procedure: String, target: String },
    #[error("surgery entry {species}/{category} lists unknown procedure '{procedure}'")]
    UnknownEntryProcedure {
        species: String,
        category: String,
        procedure: String,
    },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse procedure catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The resolved procedure catalog.
#[derive(Debug, Clone, Default)]
pub struct ProcedureCatalog {
    definitions: Vec<ProcedureDefinition>,
    by_name: HashMap<String, ProcedureId>,
    entries: HashMap<(String, String), CategoryEntry>,
    issues: Vec<CatalogIssue>,
}

impl ProcedureCatalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    /// Resolve authored content. Faulty procedures are skipped, and so is
    /// anything that depends on them, until the set is stable.
    pub fn from_raw(raw: RawCatalog) -> Self {
        let mut issues = Vec::new();

        let mut candidates: Vec<&RawProcedure> = Vec::new();
        let mut seen = HashSet::new();
        for procedure in &raw.procedures {
            if seen.insert(procedure.id.as_str()) {
                candidates.push(procedure);
            } else {
                issues.push(CatalogIssue::DuplicateProcedure(procedure.id.clone()));
            }
        }

        let by_raw_name: HashMap<&str, &RawProcedure> =
            candidates.iter().map(|p| (p.id.as_str(), *p)).collect();
        let mut valid: HashSet<&str> = by_raw_name.keys().copied().collect();

        loop {
            let mut dropped = Vec::new();
            for procedure in &candidates {
                if !valid.contains(procedure.id.as_str()) {
                    continue;
                }
                if let Some(issue) = Self::check_references(procedure, &valid, &by_raw_name) {
                    dropped.push(procedure.id.as_str());
                    issues.push(issue);
                }
            }
            if dropped.is_empty() {
                break;
            }
            for name in dropped {
                valid.remove(name);
            }
        }

        let mut by_name = HashMap::new();
        for procedure in candidates.iter().filter(|p| valid.contains(p.id.as_str())) {
            let id = ProcedureId(by_name.len() as u32);
            by_name.insert(procedure.id.clone(), id);
        }

        let mut definitions = Vec::with_capacity(by_name.len());
        for procedure in candidates.iter().filter(|p| valid.contains(p.id.as_str())) {
            // every reference was checked against `valid` above
            let resolve = |name: &str| by_name.get(name).copied();
            let prerequisites = procedure
                .prerequisites
                .iter()
                .filter_map(|p| match p {
                    RawPrerequisite::LayerOpen(l) => Some(Prerequisite::LayerOpen(*l)),
                    RawPrerequisite::LayerClosed(l) => Some(Prerequisite::LayerClosed(*l)),
                    RawPrerequisite::Step(s) => resolve(s).map(Prerequisite::Step),
                })
                .collect();
            definitions.push(ProcedureDefinition {
                id: ProcedureId(definitions.len() as u32),
                name: procedure.id.clone(),
                layer: procedure.layer,
                role: procedure.role,
                effect: procedure.effect,
                tool: procedure.tool.clone(),
                improvised: procedure.improvised.clone(),
                prerequisites,
                undoes: procedure.undoes.as_deref().and_then(resolve),
                penalty: procedure.penalty,
            });
        }

        let mut entries: HashMap<(String, String), CategoryEntry> = HashMap::new();
        for entry in &raw.surgeries {
            let resolved = entries
                .entry((entry.species.clone(), entry.category.clone()))
                .or_default();
            for name in &entry.procedures {
                match by_name.get(name) {
                    Some(id) => resolved.push(&definitions[id.index()]),
                    None => issues.push(CatalogIssue::UnknownEntryProcedure {
                        species: entry.species.clone(),
                        category: entry.category.clone(),
                        procedure: name.clone(),
                    }),
                }
            }
        }

        for issue in &issues {
            log::error!("procedure catalog: {}", issue);
        }
        log::info!(
            "procedure catalog loaded: {} procedures, {} surgery entries, {} issues",
            definitions.len(),
            entries.len(),
            issues.len()
        );

        Self {
            definitions,
            by_name,
            entries,
            issues,
        }
    }

    fn check_references(
        procedure: &RawProcedure,
        valid: &HashSet<&str>,
        by_name: &HashMap<&str, &RawProcedure>,
    ) -> Option<CatalogIssue> {
        let step_refs = procedure.prerequisites.iter().filter_map(|p| match p {
            RawPrerequisite::Step(s) => Some(s.as_str()),
            _ => None,
        });
        for reference in step_refs.chain(procedure.undoes.as_deref()) {
            if !valid.contains(reference) {
                return Some(CatalogIssue::UnknownReference {
                    procedure: procedure.id.clone(),
                    reference: reference.to_string(),
                });
            }
        }
        if let Some(target) = procedure.undoes.as_deref() {
            let ok = by_name
                .get(target)
                .map(|t| t.role == StepRole::Open && t.layer == procedure.layer)
                .unwrap_or(false);
            if !ok || procedure.role != StepRole::Close {
                return Some(CatalogIssue::InvalidUndo {
                    procedure: procedure.id.clone(),
                    target: target.to_string(),
                });
            }
        }
        None
    }

    pub fn get(&self, id: ProcedureId) -> Option<&ProcedureDefinition> {
        self.definitions.get(id.index())
    }

    /// Map an authored id string to its interned index.
    pub fn lookup(&self, name: &str) -> Option<ProcedureId> {
        self.by_name.get(name).copied()
    }

    /// Resolve the entry for a species and category, falling back to the
    /// wildcard species.
    pub fn entry(&self, species: &str, category: &str) -> Option<&CategoryEntry> {
        self.entries
            .get(&(species.to_string(), category.to_string()))
            .or_else(|| {
                self.entries
                    .get(&(ANY_SPECIES.to_string(), category.to_string()))
            })
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcedureDefinition> {
        self.definitions.iter()
    }

    pub fn issues(&self) -> &[CatalogIssue] {
        &self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(tag: &str) -> ToolRequirement {
        ToolRequirement {
            tag: tag.to_string(),
            time: 1.0,
            damage: None,
        }
    }

    fn procedure(id: &str, layer: Layer, role: StepRole) -> RawProcedure {
        RawProcedure {
            id: id.to_string(),
            layer,
            role,
            effect: ProcedureEffect::LayerStep,
            tool: tool("Scalpel"),
            improvised: vec![],
            prerequisites: vec![],
            undoes: None,
            penalty: 1,
        }
    }

    #[test]
    fn test_interning_and_entries() {
        let mut close = procedure("Close", Layer::Skin, StepRole::Close);
        close.undoes = Some("Open".to_string());
        let raw = RawCatalog {
            procedures: vec![procedure("Open", Layer::Skin, StepRole::Open), close],
            surgeries: vec![RawSurgeryEntry {
                species: "Human".into(),
                category: "Torso".into(),
                procedures: vec!["Open".into(), "Close".into()],
            }],
        };
        let catalog = ProcedureCatalog::from_raw(raw);
        assert!(catalog.issues().is_empty());

        let open = catalog.lookup("Open").unwrap();
        let close = catalog.lookup("Close").unwrap();
        assert_eq!(catalog.get(close).unwrap().undoes, Some(open));

        let entry = catalog.entry("Human", "Torso").unwrap();
        assert_eq!(entry.skin_open, vec![open]);
        assert_eq!(entry.skin_close, vec![close]);
        assert!(catalog.entry("Human", "Head").is_none());
    }

    #[test]
    fn test_dangling_references_are_skipped_transitively() {
        let mut a = procedure("A", Layer::Tissue, StepRole::Open);
        a.prerequisites = vec![RawPrerequisite::Step("Missing".into())];
        let mut b = procedure("B", Layer::Tissue, StepRole::Open);
        b.prerequisites = vec![RawPrerequisite::Step("A".into())];
        let c = procedure("C", Layer::Skin, StepRole::Open);

        let catalog = ProcedureCatalog::from_raw(RawCatalog {
            procedures: vec![a, b, c],
            surgeries: vec![],
        });

        assert!(catalog.lookup("A").is_none());
        assert!(catalog.lookup("B").is_none());
        assert_eq!(catalog.lookup("C"), Some(ProcedureId(0)));
        assert_eq!(catalog.issues().len(), 2);
    }

    #[test]
    fn test_duplicate_and_invalid_undo() {
        let mut bad_undo = procedure("Close", Layer::Tissue, StepRole::Close);
        bad_undo.undoes = Some("Open".into());
        let catalog = ProcedureCatalog::from_raw(RawCatalog {
            procedures: vec![
                procedure("Open", Layer::Skin, StepRole::Open),
                procedure("Open", Layer::Skin, StepRole::Open),
                bad_undo,
            ],
            surgeries: vec![],
        });
        assert_eq!(catalog.len(), 1);
        assert!(matches!(
            catalog.issues()[0],
            CatalogIssue::DuplicateProcedure(_)
        ));
        assert!(catalog
            .issues()
            .iter()
            .any(|i| matches!(i, CatalogIssue::InvalidUndo { .. })));
    }

    #[test]
    fn test_wildcard_species_fallback() {
        let catalog = ProcedureCatalog::from_raw(RawCatalog {
            procedures: vec![procedure("Open", Layer::Skin, StepRole::Open)],
            surgeries: vec![RawSurgeryEntry {
                species: ANY_SPECIES.into(),
                category: "ArmLeft".into(),
                procedures: vec!["Open".into(), "Nope".into()],
            }],
        });
        assert!(catalog.entry("Lizard", "ArmLeft").is_some());
        assert_eq!(catalog.issues().len(), 1);
    }

    #[test]
    fn test_from_json_parse_error() {
        assert!(ProcedureCatalog::from_json("{ not json").is_err());
    }
}
