//! Tool resolution for surgical procedures.
//!
//! The primary tool tag is searched across every held item first. Only when
//! no held item carries it are the improvised alternatives tried, in
//! declaration order. Damage-matched improvisation scales speed with the
//! weapon's damage against a baseline; tag-matched improvisation applies a
//! flat duration multiplier.

use crate::anatomy::DamageType;
use crate::catalog::{ImprovisedTool, ProcedureDefinition};
use crate::config::SurgeryConfig;

/// What the core knows about one held item.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldItem<I> {
    pub item: I,
    pub tags: Vec<String>,
    pub melee: Vec<(DamageType, f32)>,
}

impl<I> HeldItem<I> {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn damage_of(&self, damage_type: DamageType) -> f32 {
        self.melee
            .iter()
            .filter(|(t, _)| *t == damage_type)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

/// The item chosen to perform a procedure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolMatch<I> {
    pub item: I,
    pub improvised: bool,
    /// Applied to the procedure's base time. Below 1.0 is faster.
    pub time_multiplier: f32,
}

/// Speed factor for a damage-matched improvised tool, clamped to the
/// configured range. `damage == baseline` is normal speed. An inverted
/// range is read with its bounds swapped.
pub fn damage_speed(damage: f32, baseline: f32, config: &SurgeryConfig) -> f32 {
    let baseline = if baseline > 0.0 {
        baseline
    } else {
        config.damage_speed_baseline
    };
    let (a, b) = (config.min_speed_multiplier, config.max_speed_multiplier);
    (damage / baseline).max(a.min(b)).min(a.max(b))
}

pub fn resolve_tool<I: Copy>(
    def: &ProcedureDefinition,
    held: &[HeldItem<I>],
    allow_improvised: bool,
    config: &SurgeryConfig,
) -> Option<ToolMatch<I>> {
    if let Some(item) = held.iter().find(|h| h.has_tag(&def.tool.tag)) {
        return Some(ToolMatch {
            item: item.item,
            improvised: false,
            time_multiplier: 1.0,
        });
    }
    if !allow_improvised {
        return None;
    }

    for alternative in &def.improvised {
        match alternative {
            ImprovisedTool::Tag {
                tag,
                time_multiplier,
            } => {
                if let Some(item) = held.iter().find(|h| h.has_tag(tag)) {
                    return Some(ToolMatch {
                        item: item.item,
                        improvised: true,
                        time_multiplier: time_multiplier
                            .unwrap_or(config.improvised_time_multiplier),
                    });
                }
            }
            ImprovisedTool::Damage {
                damage_type,
                baseline,
            } => {
                let best = held
                    .iter()
                    .map(|h| (h, h.damage_of(*damage_type)))
                    .filter(|(_, damage)| *damage > 0.0)
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                if let Some((item, damage)) = best {
                    let speed = damage_speed(
                        damage,
                        baseline.unwrap_or(config.damage_speed_baseline),
                        config,
                    );
                    return Some(ToolMatch {
                        item: item.item,
                        improvised: true,
                        time_multiplier: 1.0 / speed,
                    });
                }
            }
        }
    }
    None
}

/// Seconds a procedure takes with the matched tool.
pub fn procedure_duration<I>(
    def: &ProcedureDefinition,
    tool: &ToolMatch<I>,
    config: &SurgeryConfig,
) -> f32 {
    (def.tool.time * tool.time_multiplier * config.duration_scale).max(0.0)
}
