//! Dialog state machine
//!
//! [`next_state`] is a pure function of the current state, the cell flags and
//! the incoming event. The dialog table runs it while holding the owning
//! bucket lock, applies the resulting state/flags/reference adjustments and
//! hands the number of references to release back to the caller, who releases
//! them after the lock is dropped.
//!
//! ## Reference accounting
//!
//! A dialog normally carries one reference for the table ("hash" reference)
//! and one per outstanding transaction callback. `unref` counts every
//! reference the transition gives up:
//!
//! | transition                                   | released references       |
//! |----------------------------------------------|---------------------------|
//! | transaction destroyed, UNCONFIRMED/EARLY     | transaction + hash (2)    |
//! | transaction destroyed, CONFIRMED_NA/CONFIRMED | transaction (1)          |
//! | transaction destroyed, DELETED               | transaction (1), may be last |
//! | failure response, UNCONFIRMED/EARLY          | hash (1)                  |
//! | BYE, CONFIRMED_NA/CONFIRMED                  | hash (1)                  |
//!
//! A late 2xx on a DELETED dialog that never saw a BYE takes the hash
//! reference back (`reclaim`) and revives the dialog as CONFIRMED_NA.

use super::dialog_state::{DialogEvent, DialogFlags, DialogState};

/// Outcome of a valid transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the event
    pub state: DialogState,
    /// References to release once the bucket lock is dropped
    pub unref: u32,
    /// Take one reference back (late 2xx revival)
    pub reclaim: bool,
    /// Mark the dialog as having seen a BYE
    pub set_bye: bool,
}

impl Transition {
    fn to(state: DialogState) -> Self {
        Self {
            state,
            unref: 0,
            reclaim: false,
            set_bye: false,
        }
    }

    fn stay(state: DialogState) -> Self {
        Self::to(state)
    }

    fn releasing(mut self, unref: u32) -> Self {
        self.unref = unref;
        self
    }
}

/// Compute the transition for `event` in `state`.
///
/// Returns `None` for an event that is not valid in the current state; the
/// caller logs it as a protocol anomaly and leaves the dialog untouched.
pub fn next_state(state: DialogState, flags: DialogFlags, event: DialogEvent) -> Option<Transition> {
    use DialogEvent as E;
    use DialogState as S;

    let transition = match (event, state) {
        (E::TransactionDestroyed, S::Unconfirmed | S::Early) => {
            Transition::to(S::Deleted).releasing(2)
        }
        (E::TransactionDestroyed, S::ConfirmedNa | S::Confirmed | S::Deleted) => {
            Transition::stay(state).releasing(1)
        }

        (E::ProvisionalResponse, S::Unconfirmed | S::Early) => Transition::to(S::Early),

        (E::FailureResponse, S::Unconfirmed | S::Early) => Transition::to(S::Deleted).releasing(1),

        (E::SuccessResponse, S::Unconfirmed | S::Early) => Transition::to(S::ConfirmedNa),
        (E::SuccessResponse, S::ConfirmedNa | S::Confirmed) => Transition::stay(state),
        (E::SuccessResponse, S::Deleted) => {
            if flags.contains(DialogFlags::HAS_BYE) {
                return None;
            }
            Transition {
                reclaim: true,
                ..Transition::to(S::ConfirmedNa)
            }
        }

        (E::RequestAck, S::ConfirmedNa) => Transition::to(S::Confirmed),
        (E::RequestAck, S::Confirmed | S::Deleted) => Transition::stay(state),

        (E::RequestBye, S::ConfirmedNa | S::Confirmed) => Transition {
            set_bye: true,
            ..Transition::to(S::Deleted).releasing(1)
        },
        (E::RequestBye, S::Deleted) => Transition::stay(state),

        (E::RequestPrack, S::Early | S::ConfirmedNa) => Transition::stay(state),

        (E::Request, S::ConfirmedNa | S::Confirmed) => Transition::stay(state),

        _ => return None,
    };

    Some(transition)
}
