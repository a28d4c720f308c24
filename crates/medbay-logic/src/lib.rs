//! Pure surgery logic for MedBay.
//!
//! This crate contains everything about anatomy and surgery that does not
//! need an entity store. Functions take plain data and return results, so
//! the layer state machine, catalog resolution and structure validation are
//! unit-testable on their own and shared by the ECS engine and the harness.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`anatomy`] | Part types, symmetry, damage types, organ category tags |
//! | [`catalog`] | Procedure definitions, interned ids, per-(species, category) entries |
//! | [`config`] | Tunable surgery parameters and their validation |
//! | [`content`] | Bundled demo procedure catalog and species structures |
//! | [`layers`] | Per-part Skin/Tissue/Organ state machine with cascading invalidation |
//! | [`rejection`] | User-visible rejection taxonomy |
//! | [`structure`] | Species part lists, slot definitions, topological spawn order |
//! | [`tools`] | Primary/improvised tool resolution and speed multipliers |

pub mod anatomy;
pub mod catalog;
pub mod config;
pub mod content;
pub mod layers;
pub mod rejection;
pub mod structure;
pub mod tools;
