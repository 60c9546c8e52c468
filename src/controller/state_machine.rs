use strum_macros::{Display, EnumString};

use crate::room::models::RoomStatus;
use crate::shared::AppError;

impl RoomStatus {
    /// Whether `self -> next` is an edge of the room lifecycle.
    ///
    /// `lobby -> waiting -> playing -> finished`, `finished -> waiting` for a
    /// new round, and `closed`/`ended` from any non-terminal status.
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        use RoomStatus::*;

        match (self, next) {
            (Lobby, Waiting) | (Waiting, Playing) | (Playing, Finished) | (Finished, Waiting) => {
                true
            }
            (from, Closed | Ended) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn transition_to(self, next: RoomStatus) -> Result<RoomStatus, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Who decides that the whole room is `finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum CompletionPolicy {
    /// The host finishing flips the room, others may still be playing
    HostFinishes,
    /// The room flips once nobody is still playing
    AllFinished,
}
