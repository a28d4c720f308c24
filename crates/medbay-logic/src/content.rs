//! Bundled demo content: a human species and a basic procedure set.
//!
//! Real deployments load their own catalogs; these back the harness, the
//! benchmarks and the test suites.

use crate::catalog::{CatalogError, ProcedureCatalog};
use crate::structure::SpeciesCatalog;

pub const PROCEDURES_JSON: &str = include_str!("../../../data/procedures.json");
pub const SPECIES_JSON: &str = include_str!("../../../data/species.json");

pub fn bundled_procedures() -> Result<ProcedureCatalog, CatalogError> {
    ProcedureCatalog::from_json(PROCEDURES_JSON)
}

pub fn bundled_species() -> Result<SpeciesCatalog, serde_json::Error> {
    SpeciesCatalog::from_json(SPECIES_JSON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::plan_structure;

    #[test]
    fn test_bundled_content_is_clean() {
        let procedures = bundled_procedures().unwrap();
        assert!(procedures.issues().is_empty(), "{:?}", procedures.issues());
        assert!(procedures.lookup("RetractSkin").is_some());
        assert!(procedures.entry("Human", "ArmLeft").is_some());

        let species = bundled_species().unwrap();
        for name in ["Human", "Minimal"] {
            let structure = species.structure(name).unwrap();
            let plan = plan_structure(structure, &species);
            assert!(plan.issues.is_empty(), "{name}: {:?}", plan.issues);
            assert_eq!(plan.order.len(), structure.parts.len());
        }
    }
}
