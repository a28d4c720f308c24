//! Rejection taxonomy for surgical requests.
//!
//! Every validation failure is a value surfaced to the initiating actor.
//! Nothing in the surgery path panics on bad input or drifted state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum SurgeryRejection {
    #[error("that is not something you can operate on")]
    InvalidEntity,
    #[error("that body part is not attached to this body")]
    BodyPartNotInBody,
    #[error("no surgery is known for this species and body part")]
    UnknownSpeciesOrCategory,
    #[error("no such procedure")]
    UnknownProcedure,
    #[error("that procedure cannot be performed on this body part")]
    ProcedureNotApplicable,
    #[error("that procedure belongs to a different layer")]
    LayerMismatch,
    #[error("you need the right tool in hand")]
    MissingTool,
    #[error("that step has already been done")]
    AlreadyDone,
    #[error("you need to open the layer first")]
    LayerNotOpen,
    #[error("you need to close the layer first")]
    LayerNotClosed,
    #[error("that organ is already in a body")]
    OrganAlreadyInBody,
    #[error("that organ is not in this body part")]
    OrganNotInBodyPart,
    #[error("you need to hold the organ")]
    OrganNotInHand,
    #[error("that slot is already filled")]
    SlotFilled,
    #[error("there is no place for that organ here")]
    NoSlotForOrgan,
    #[error("that limb cannot be detached")]
    CannotDetachLimb,
    #[error("that is not a limb")]
    InvalidLimbType,
    #[error("that body part is detached")]
    BodyPartDetached,
    #[error("you were interrupted")]
    DoAfterFailed,
}

impl SurgeryRejection {
    /// Stable machine-readable code for this rejection.
    pub fn code(self) -> &'static str {
        match self {
            SurgeryRejection::InvalidEntity => "invalid-entity",
            SurgeryRejection::BodyPartNotInBody => "body-part-not-in-body",
            SurgeryRejection::UnknownSpeciesOrCategory => "unknown-species-or-category",
            SurgeryRejection::UnknownProcedure => "unknown-procedure",
            SurgeryRejection::ProcedureNotApplicable => "procedure-not-applicable",
            SurgeryRejection::LayerMismatch => "layer-mismatch",
            SurgeryRejection::MissingTool => "missing-tool",
            SurgeryRejection::AlreadyDone => "already-done",
            SurgeryRejection::LayerNotOpen => "layer-not-open",
            SurgeryRejection::LayerNotClosed => "layer-not-closed",
            SurgeryRejection::OrganAlreadyInBody => "organ-already-in-body",
            SurgeryRejection::OrganNotInBodyPart => "organ-not-in-body-part",
            SurgeryRejection::OrganNotInHand => "organ-not-in-hand",
            SurgeryRejection::SlotFilled => "slot-filled",
            SurgeryRejection::NoSlotForOrgan => "no-slot-for-organ",
            SurgeryRejection::CannotDetachLimb => "cannot-detach-limb",
            SurgeryRejection::InvalidLimbType => "invalid-limb-type",
            SurgeryRejection::BodyPartDetached => "body-part-detached",
            SurgeryRejection::DoAfterFailed => "doafter-failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_kebab_case() {
        let all = [
            SurgeryRejection::InvalidEntity,
            SurgeryRejection::LayerNotOpen,
            SurgeryRejection::DoAfterFailed,
            SurgeryRejection::UnknownSpeciesOrCategory,
        ];
        for r in all {
            let code = r.code();
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '-'), "{code}");
        }
        assert_eq!(SurgeryRejection::LayerNotOpen.code(), "layer-not-open");
    }

    #[test]
    fn test_display_is_user_facing() {
        assert_eq!(
            SurgeryRejection::MissingTool.to_string(),
            "you need the right tool in hand"
        );
    }
}
