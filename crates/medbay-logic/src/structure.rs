//! Species body structures: declarative part lists and their spawn order.
//!
//! A species lists its parts as (prototype, parent prototype, slot) entries.
//! [`plan_structure`] validates the list and returns a spawn order with
//! parents before children and the torso forced first. Authoring faults are
//! reported as [`StructureIssue`]s and only the offending entries are
//! skipped; planning never fails outright.

use crate::anatomy::{PartType, Symmetry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// An organ a part prototype starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganTemplate {
    pub category: String,
    #[serde(default)]
    pub integrity_cost: i32,
    #[serde(default)]
    pub brain: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartPrototype {
    pub id: String,
    pub part_type: PartType,
    #[serde(default)]
    pub symmetry: Symmetry,
    /// Organ category tag used to resolve the surgery catalog entry.
    pub category: String,
    /// Fixed organ slot categories. `None` accepts any organ.
    #[serde(default)]
    pub organ_slots: Option<Vec<String>>,
    #[serde(default)]
    pub organs: Vec<OrganTemplate>,
}

/// A named attachment point for a child part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub id: String,
    #[serde(default)]
    pub accepts: Option<PartType>,
    #[serde(default)]
    pub symmetry: Option<Symmetry>,
}

impl SlotDefinition {
    pub fn accepts_part(&self, part_type: PartType, symmetry: Symmetry) -> bool {
        self.accepts.map(|t| t == part_type).unwrap_or(true)
            && self.symmetry.map(|s| s == symmetry).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEntry {
    pub prototype: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub slot: Option<String>,
}

/// Where a loose organ goes during migration. `category: None` matches all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRule {
    #[serde(default)]
    pub category: Option<String>,
    pub target: PartType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesStructure {
    pub species: String,
    pub parts: Vec<StructureEntry>,
    #[serde(default = "default_placement_rules")]
    pub placement: Vec<PlacementRule>,
}

pub fn default_placement_rules() -> Vec<PlacementRule> {
    vec![
        PlacementRule {
            category: Some("Brain".into()),
            target: PartType::Head,
        },
        PlacementRule {
            category: Some("Eyes".into()),
            target: PartType::Head,
        },
        PlacementRule {
            category: None,
            target: PartType::Torso,
        },
    ]
}

/// Part types to try, in rule order, for an organ of `category`.
pub fn placement_targets<'a>(
    rules: &'a [PlacementRule],
    category: &'a str,
) -> impl Iterator<Item = PartType> + 'a {
    rules
        .iter()
        .filter(move |r| r.category.as_deref().map(|c| c == category).unwrap_or(true))
        .map(|r| r.target)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSpeciesCatalog {
    pub prototypes: Vec<PartPrototype>,
    pub slots: Vec<SlotDefinition>,
    pub species: Vec<SpeciesStructure>,
}

/// Read-only species content: part prototypes, slots and structures.
#[derive(Debug, Clone, Default)]
pub struct SpeciesCatalog {
    prototypes: HashMap<String, PartPrototype>,
    slots: Vec<SlotDefinition>,
    slot_index: HashMap<String, usize>,
    structures: HashMap<String, SpeciesStructure>,
}

impl SpeciesCatalog {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawSpeciesCatalog = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_raw(raw: RawSpeciesCatalog) -> Self {
        let mut catalog = Self::default();
        for prototype in raw.prototypes {
            if catalog.prototypes.contains_key(&prototype.id) {
                log::error!("duplicate part prototype '{}' ignored", prototype.id);
                continue;
            }
            catalog.prototypes.insert(prototype.id.clone(), prototype);
        }
        for slot in raw.slots {
            if catalog.slot_index.contains_key(&slot.id) {
                log::error!("duplicate slot definition '{}' ignored", slot.id);
                continue;
            }
            catalog.slot_index.insert(slot.id.clone(), catalog.slots.len());
            catalog.slots.push(slot);
        }
        for structure in raw.species {
            catalog.structures.insert(structure.species.clone(), structure);
        }
        catalog
    }

    pub fn prototype(&self, id: &str) -> Option<&PartPrototype> {
        self.prototypes.get(id)
    }

    pub fn slot(&self, id: &str) -> Option<&SlotDefinition> {
        self.slot_index.get(id).map(|i| &self.slots[*i])
    }

    /// First declared slot that accepts a part of this type and side.
    pub fn slot_for(&self, part_type: PartType, symmetry: Symmetry) -> Option<&SlotDefinition> {
        self.slots
            .iter()
            .find(|s| s.accepts.is_some() && s.accepts_part(part_type, symmetry))
    }

    pub fn structure(&self, species: &str) -> Option<&SpeciesStructure> {
        self.structures.get(species)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureIssue {
    #[error("part '{0}' is listed more than once")]
    DuplicateEntry(String),
    #[error("part '{0}' uses unknown prototype")]
    UnknownPrototype(String),
    #[error("part '{part}' declares unknown parent '{parent}'")]
    UnknownParent { part: String, parent: String },
    #[error("part '{0}' has a parent but no slot id")]
    MissingSlot(String),
    #[error("part '{part}' uses unknown slot '{slot}'")]
    UnknownSlot { part: String, slot: String },
    #[error("slot '{slot}' does not accept part '{part}'")]
    SlotRejectsPart { part: String, slot: String },
    #[error("circular part dependency: '{from}' -> '{to}'")]
    Cycle { from: String, to: String },
    #[error("structure has no torso")]
    MissingTorso,
    #[error("extra torso '{0}' ignored")]
    ExtraTorso(String),
    #[error("torso '{0}' declares a parent; treated as root")]
    TorsoHasParent(String),
}

/// One part to spawn, with its parent as an index into the entry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPart {
    pub entry: usize,
    pub parent: Option<usize>,
    pub slot: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructurePlan {
    pub order: Vec<PlannedPart>,
    pub issues: Vec<StructureIssue>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// Validate a species structure and compute its spawn order.
pub fn plan_structure(structure: &SpeciesStructure, catalog: &SpeciesCatalog) -> StructurePlan {
    let entries = &structure.parts;
    let mut issues = Vec::new();
    let mut skipped = vec![false; entries.len()];

    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        if index.contains_key(entry.prototype.as_str()) {
            issues.push(StructureIssue::DuplicateEntry(entry.prototype.clone()));
            skipped[i] = true;
        } else {
            index.insert(entry.prototype.as_str(), i);
        }
    }

    let mut parent: Vec<Option<usize>> = vec![None; entries.len()];
    for (i, entry) in entries.iter().enumerate() {
        if skipped[i] {
            continue;
        }
        let Some(prototype) = catalog.prototype(&entry.prototype) else {
            issues.push(StructureIssue::UnknownPrototype(entry.prototype.clone()));
            skipped[i] = true;
            continue;
        };
        let Some(parent_id) = entry.parent.as_deref() else {
            continue;
        };
        let Some(&p) = index.get(parent_id) else {
            issues.push(StructureIssue::UnknownParent {
                part: entry.prototype.clone(),
                parent: parent_id.to_string(),
            });
            skipped[i] = true;
            continue;
        };
        let Some(slot_id) = entry.slot.as_deref() else {
            issues.push(StructureIssue::MissingSlot(entry.prototype.clone()));
            skipped[i] = true;
            continue;
        };
        match catalog.slot(slot_id) {
            None => {
                issues.push(StructureIssue::UnknownSlot {
                    part: entry.prototype.clone(),
                    slot: slot_id.to_string(),
                });
                skipped[i] = true;
                continue;
            }
            Some(slot) if !slot.accepts_part(prototype.part_type, prototype.symmetry) => {
                issues.push(StructureIssue::SlotRejectsPart {
                    part: entry.prototype.clone(),
                    slot: slot_id.to_string(),
                });
                skipped[i] = true;
                continue;
            }
            Some(_) => {}
        }
        parent[i] = Some(p);
    }

    let torsos: Vec<usize> = (0..entries.len())
        .filter(|i| !skipped[*i])
        .filter(|i| {
            catalog
                .prototype(&entries[*i].prototype)
                .map(|p| p.part_type == PartType::Torso)
                .unwrap_or(false)
        })
        .collect();
    let torso = torsos
        .iter()
        .copied()
        .find(|i| entries[*i].parent.is_none())
        .or_else(|| torsos.first().copied());
    match torso {
        None => issues.push(StructureIssue::MissingTorso),
        Some(t) => {
            for &other in torsos.iter().filter(|i| **i != t) {
                issues.push(StructureIssue::ExtraTorso(entries[other].prototype.clone()));
                skipped[other] = true;
            }
            if entries[t].parent.is_some() {
                issues.push(StructureIssue::TorsoHasParent(entries[t].prototype.clone()));
                parent[t] = None;
            }
        }
    }

    // Iterative DFS over parent links; post-order puts parents first.
    let mut marks = vec![Mark::Unvisited; entries.len()];
    let mut post_order = Vec::with_capacity(entries.len());
    let mut cycle_found = false;
    for start in 0..entries.len() {
        if skipped[start] || marks[start] != Mark::Unvisited {
            continue;
        }
        let mut stack = vec![(start, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                marks[node] = Mark::Visited;
                post_order.push(node);
                continue;
            }
            if marks[node] != Mark::Unvisited {
                continue;
            }
            marks[node] = Mark::Visiting;
            stack.push((node, true));
            let Some(p) = parent[node] else {
                continue;
            };
            if skipped[p] {
                continue;
            }
            match marks[p] {
                Mark::Unvisited => stack.push((p, false)),
                Mark::Visiting => {
                    if !cycle_found {
                        issues.push(StructureIssue::Cycle {
                            from: entries[node].prototype.clone(),
                            to: entries[p].prototype.clone(),
                        });
                        cycle_found = true;
                    }
                    // every entry on the loop is skipped
                    let mut cursor = p;
                    loop {
                        skipped[cursor] = true;
                        match parent[cursor] {
                            Some(next) if next != p && !skipped[next] => cursor = next,
                            _ => break,
                        }
                    }
                }
                Mark::Visited => {}
            }
        }
    }

    let mut order: Vec<usize> = post_order.into_iter().filter(|i| !skipped[*i]).collect();
    if let Some(t) = torso.filter(|t| !skipped[*t]) {
        if let Some(pos) = order.iter().position(|i| *i == t) {
            order.remove(pos);
            order.insert(0, t);
        }
    }

    for issue in &issues {
        log::error!("species '{}' structure: {}", structure.species, issue);
    }

    StructurePlan {
        order: order
            .into_iter()
            .map(|i| PlannedPart {
                entry: i,
                parent: parent[i],
                slot: if parent[i].is_some() {
                    entries[i].slot.clone()
                } else {
                    None
                },
            })
            .collect(),
        issues,
    }
}
