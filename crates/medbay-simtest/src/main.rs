//! MedBay Headless Surgery Harness
//!
//! Validates bundled content and runs end-to-end surgery scenarios
//! in-process. No rendering, no networking.
//!
//! Usage:
//!   cargo run -p medbay-simtest
//!   cargo run -p medbay-simtest -- --verbose

use hecs::Entity;
use medbay_core::prelude::*;
use medbay_logic::content::{bundled_procedures, bundled_species, SPECIES_JSON};
use medbay_logic::structure::plan_structure;
use serde::Deserialize;

// ── Species list (same JSON the engine loads) ───────────────────────────

#[derive(Debug, Deserialize)]
struct SpeciesFile {
    species: Vec<SpeciesName>,
}

#[derive(Debug, Deserialize)]
struct SpeciesName {
    species: String,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(name: &str, passed: bool, detail: impl Into<String>) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail: detail.into(),
    }
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== MedBay Surgery Harness ===\n");

    let mut results = Vec::new();

    // 1. Bundled content
    results.extend(validate_content(verbose));

    // 2. Body initialization
    results.extend(validate_bodies(verbose));

    // 3. Layer open/close round trip
    results.extend(validate_layers(verbose));

    // 4. Limb detachment
    results.extend(validate_detachment(verbose));

    // 5. Gibbing and mind transfer
    results.extend(validate_gibbing(verbose));

    // 6. Do-after interruption and commit re-validation
    results.extend(validate_doafters(verbose));

    // 7. Save/load
    results.extend(validate_persistence(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Scenario helpers ────────────────────────────────────────────────────

struct Ward {
    engine: SurgeryEngine,
    body: Entity,
    surgeon: Entity,
}

impl Ward {
    fn new(species: &str, tools: &[&str]) -> Option<Self> {
        let mut engine =
            SurgeryEngine::with_bundled_content(SurgeryConfig::default().with_seed(42)).ok()?;
        let body = engine.spawn_body(species, Vec3::ZERO);
        engine.body_ready(body);
        let surgeon = engine.spawn_actor(Vec3::new(0.5, 0.0, 0.0));
        for tag in tools {
            let tool = engine.spawn_tool(&[*tag], &[]);
            engine.give(surgeon, tool);
        }
        Some(Self {
            engine,
            body,
            surgeon,
        })
    }

    fn part(&self, part_type: PartType, symmetry: Option<Symmetry>) -> Option<Entity> {
        self.engine
            .query_children(self.body, Some(part_type), symmetry)
            .first()
            .copied()
    }

    /// Request a step and wait for it to commit. Returns the request-time
    /// rejection, if any.
    fn perform(&mut self, part: Entity, name: &str) -> Result<(), SurgeryRejection> {
        self.engine
            .request_by_name(self.surgeon, self.body, part, name, None)?;
        self.engine.update(10.0);
        Ok(())
    }

    fn performed_names(&self, part: Entity, layer: Layer) -> Vec<String> {
        self.engine
            .performed(part, layer)
            .into_iter()
            .filter_map(|id| self.engine.procedures.get(id).map(|d| d.name.clone()))
            .collect()
    }
}

fn setup_failed(section: &str) -> Vec<TestResult> {
    vec![check(
        &format!("{}_setup", section),
        false,
        "could not build engine from bundled content",
    )]
}

// ── 1. Content ──────────────────────────────────────────────────────────

fn validate_content(verbose: bool) -> Vec<TestResult> {
    println!("--- Bundled Content ---");
    let mut results = Vec::new();

    let procedures = match bundled_procedures() {
        Ok(p) => p,
        Err(e) => {
            results.push(check("procedures_parse", false, format!("{}", e)));
            return results;
        }
    };
    results.push(check(
        "procedures_clean",
        procedures.issues().is_empty(),
        format!(
            "{} procedures, {} issues",
            procedures.len(),
            procedures.issues().len()
        ),
    ));

    let species = match bundled_species() {
        Ok(s) => s,
        Err(e) => {
            results.push(check("species_parse", false, format!("{}", e)));
            return results;
        }
    };
    let names: Vec<String> = match serde_json::from_str::<SpeciesFile>(SPECIES_JSON) {
        Ok(f) => f.species.into_iter().map(|s| s.species).collect(),
        Err(e) => {
            results.push(check("species_list", false, format!("{}", e)));
            return results;
        }
    };

    for name in &names {
        let Some(structure) = species.structure(name) else {
            results.push(check(&format!("structure_{}", name), false, "missing"));
            continue;
        };
        let plan = plan_structure(structure, &species);
        let torso_first = plan
            .order
            .first()
            .and_then(|p| structure.parts.get(p.entry))
            .and_then(|e| species.prototype(&e.prototype))
            .map(|p| p.part_type == PartType::Torso)
            .unwrap_or(false);
        results.push(check(
            &format!("structure_{}", name),
            plan.issues.is_empty() && torso_first,
            format!(
                "{} parts planned, torso first: {}, issues: {:?}",
                plan.order.len(),
                torso_first,
                plan.issues
            ),
        ));
        if verbose {
            println!("  {}: {} parts", name, plan.order.len());
        }
    }

    results
}

// ── 2. Bodies ───────────────────────────────────────────────────────────

fn validate_bodies(verbose: bool) -> Vec<TestResult> {
    println!("--- Body Initialization ---");
    let mut results = Vec::new();
    let Some(mut ward) = Ward::new("Minimal", &[]) else {
        return setup_failed("bodies");
    };

    let parts = ward.engine.query_children(ward.body, None, None);
    let all_owned = parts.iter().all(|p| {
        ward.engine
            .world
            .get::<&BodyPart>(*p)
            .map(|bp| bp.body == Some(ward.body))
            .unwrap_or(false)
    });
    results.push(check(
        "minimal_parts",
        parts.len() == 3 && all_owned,
        format!("{} parts, all owned by body: {}", parts.len(), all_owned),
    ));

    let again = ward.engine.body_ready(ward.body);
    results.push(check(
        "init_idempotent",
        again == 0,
        format!("second init spawned {} parts", again),
    ));

    if verbose {
        println!("  minimal body: {:?}", parts);
    }
    results
}

// ── 3. Layers ───────────────────────────────────────────────────────────

fn validate_layers(_verbose: bool) -> Vec<TestResult> {
    println!("--- Layer State Machine ---");
    let mut results = Vec::new();
    let Some(mut ward) = Ward::new("Human", &["Scalpel", "Cautery", "Retractor"]) else {
        return setup_failed("layers");
    };
    let Some(torso) = ward.part(PartType::Torso, None) else {
        return setup_failed("layers");
    };

    let opened = ward.perform(torso, "RetractSkin");
    let skin = ward.performed_names(torso, Layer::Skin);
    results.push(check(
        "skin_open",
        opened.is_ok() && skin == ["RetractSkin"] && ward.engine.is_open(torso, Layer::Skin),
        format!(
            "skin steps {:?}, penalty {}",
            skin,
            ward.engine.surgery_penalty(ward.body)
        ),
    ));
    results.push(check(
        "skin_open_penalty",
        ward.engine.surgery_penalty(ward.body) == 1,
        format!("penalty {}", ward.engine.surgery_penalty(ward.body)),
    ));

    let closed = ward.perform(torso, "CloseIncision");
    let skin = ward.performed_names(torso, Layer::Skin);
    results.push(check(
        "skin_closed",
        closed.is_ok()
            && skin.is_empty()
            && !ward.engine.is_open(torso, Layer::Skin)
            && ward.engine.surgery_penalty(ward.body) == 0,
        format!(
            "skin steps {:?}, penalty {}",
            skin,
            ward.engine.surgery_penalty(ward.body)
        ),
    ));

    let tissue = ward.perform(torso, "RetractTissue");
    results.push(check(
        "tissue_needs_skin",
        tissue == Err(SurgeryRejection::LayerNotOpen),
        match tissue {
            Ok(()) => "accepted".to_string(),
            Err(r) => r.code().to_string(),
        },
    ));

    results
}

// ── 4. Detachment ───────────────────────────────────────────────────────

fn validate_detachment(_verbose: bool) -> Vec<TestResult> {
    println!("--- Limb Detachment ---");
    let mut results = Vec::new();
    let Some(mut ward) = Ward::new("Human", &["Scalpel", "Retractor", "Saw"]) else {
        return setup_failed("detachment");
    };
    let Some(arm) = ward.part(PartType::Arm, Some(Symmetry::Left)) else {
        return setup_failed("detachment");
    };

    let steps = ["RetractSkin", "RetractTissue", "SawBone", "DetachLimb"];
    let failures: Vec<String> = steps
        .iter()
        .filter_map(|s| ward.perform(arm, s).err().map(|r| format!("{}: {}", s, r.code())))
        .collect();
    results.push(check(
        "arm_steps_accepted",
        failures.is_empty(),
        if failures.is_empty() {
            "all steps accepted".to_string()
        } else {
            failures.join(", ")
        },
    ));

    let detached = ward
        .engine
        .world
        .get::<&BodyPart>(arm)
        .map(|p| p.body.is_none())
        .unwrap_or(false);
    let stubs = ward
        .engine
        .world
        .query::<&DetachedPart>()
        .iter()
        .filter(|(_, d)| d.original == Some(arm))
        .count();
    let recorded = ward
        .performed_names(arm, Layer::Organ)
        .contains(&"DetachLimb".to_string());
    results.push(check(
        "arm_detached",
        detached && stubs == 1 && recorded,
        format!(
            "detached: {}, stubs: {}, recorded: {}",
            detached, stubs, recorded
        ),
    ));

    results
}

// ── 5. Gibbing ──────────────────────────────────────────────────────────

fn validate_gibbing(_verbose: bool) -> Vec<TestResult> {
    println!("--- Gibbing ---");
    let mut results = Vec::new();
    let Some(mut ward) = Ward::new("Human", &[]) else {
        return setup_failed("gibbing");
    };
    let _ = ward
        .engine
        .world
        .insert_one(ward.body, MindContainer { mind: MindId(1) });
    let Some(head) = ward.part(PartType::Head, None) else {
        return setup_failed("gibbing");
    };

    let drops = ward.engine.gib(ward.body);
    let brain = ward
        .engine
        .world
        .query::<(&Organ, &Brain)>()
        .iter()
        .map(|(e, _)| e)
        .next();
    let mind_on_brain = brain
        .map(|b| ward.engine.world.get::<&MindContainer>(b).is_ok())
        .unwrap_or(false);
    results.push(check(
        "gib_drops_every_part",
        drops.len() == 6 && ward.engine.query_children(ward.body, None, None).is_empty(),
        format!("{} drops", drops.len()),
    ));
    results.push(check(
        "gib_moves_mind",
        mind_on_brain && ward.engine.world.get::<&MindContainer>(ward.body).is_err(),
        format!("mind on brain: {}", mind_on_brain),
    ));

    let head_stub = drops.iter().copied().find(|d| {
        ward.engine
            .world
            .get::<&DetachedPart>(*d)
            .map(|s| s.original == Some(head))
            .unwrap_or(false)
    });
    let Some(head_stub) = head_stub else {
        results.push(check("gib_head_stub", false, "no stub for head"));
        return results;
    };
    ward.engine.bus.clear();
    let giblets = ward.engine.gib_stub(head_stub);
    let still_on_brain = brain
        .map(|b| ward.engine.world.get::<&MindContainer>(b).is_ok())
        .unwrap_or(false);
    results.push(check(
        "gib_stub_keeps_mind",
        giblets.len() == 2 && still_on_brain,
        format!("{} giblets, mind on brain: {}", giblets.len(), still_on_brain),
    ));

    results
}

// ── 6. Do-afters ────────────────────────────────────────────────────────

fn validate_doafters(_verbose: bool) -> Vec<TestResult> {
    println!("--- Do-afters ---");
    let mut results = Vec::new();
    let Some(mut ward) = Ward::new("Human", &["Scalpel"]) else {
        return setup_failed("doafters");
    };
    let Some(torso) = ward.part(PartType::Torso, None) else {
        return setup_failed("doafters");
    };

    let scheduled = ward
        .engine
        .request_by_name(ward.surgeon, ward.body, torso, "RetractSkin", None);
    if let Ok(mut t) = ward.engine.world.get::<&mut Transform>(ward.surgeon) {
        t.position = Vec3::new(0.0, 0.0, 1.2);
    }
    ward.engine.update(10.0);
    results.push(check(
        "move_cancels",
        scheduled.is_ok() && ward.engine.performed(torso, Layer::Skin).is_empty(),
        format!(
            "scheduled: {}, skin steps: {}",
            scheduled.is_ok(),
            ward.engine.performed(torso, Layer::Skin).len()
        ),
    ));

    let Some(arm) = ward.part(PartType::Arm, Some(Symmetry::Right)) else {
        return setup_failed("doafters");
    };
    let scheduled = ward
        .engine
        .request_by_name(ward.surgeon, ward.body, arm, "RetractSkin", None);
    ward.engine.gib(ward.body);
    ward.engine.update(10.0);
    results.push(check(
        "commit_revalidates",
        scheduled.is_ok() && ward.engine.performed(arm, Layer::Skin).is_empty(),
        "step on a part detached mid-wait is rejected",
    ));

    results
}

// ── 7. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(_verbose: bool) -> Vec<TestResult> {
    println!("--- Save/Load ---");
    let mut results = Vec::new();
    let Some(mut ward) = Ward::new("Human", &["Scalpel"]) else {
        return setup_failed("persistence");
    };
    let Some(torso) = ward.part(PartType::Torso, None) else {
        return setup_failed("persistence");
    };
    let _ = ward.perform(torso, "RetractSkin");

    let mut buffer = Vec::new();
    if let Err(e) = ward.engine.save(&mut buffer) {
        results.push(check("save", false, format!("{}", e)));
        return results;
    }
    let Ok(mut restored) =
        SurgeryEngine::with_bundled_content(SurgeryConfig::default().with_seed(42))
    else {
        return setup_failed("persistence");
    };
    if let Err(e) = restored.load(&buffer[..]) {
        results.push(check("load", false, format!("{}", e)));
        return results;
    }

    let same_parts = restored.query_children(ward.body, None, None).len()
        == ward.engine.query_children(ward.body, None, None).len();
    let same_skin = restored.performed(torso, Layer::Skin) == ward.engine.performed(torso, Layer::Skin);
    results.push(check(
        "save_load_roundtrip",
        same_parts && same_skin && restored.is_open(torso, Layer::Skin),
        format!(
            "{} bytes, parts match: {}, skin match: {}",
            buffer.len(),
            same_parts,
            same_skin
        ),
    ));

    results
}
