//! Application state machine.
//!
//! The transition table is a pure function; [`StateMachine`] wraps it with
//! the current state and logs ignored events.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Initial,
    Calibrating,
    /// Reserved for hosts that show a confirmation step; no transition leads here.
    Calibrated,
    CalibrationFailed,
    StartRunningSession,
    RunningSession,
    SessionEnded,
}

impl AppState {
    pub const ALL: [AppState; 7] = [
        AppState::Initial,
        AppState::Calibrating,
        AppState::Calibrated,
        AppState::CalibrationFailed,
        AppState::StartRunningSession,
        AppState::RunningSession,
        AppState::SessionEnded,
    ];
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEvent {
    StartCalibration,
    EndCalibration,
    CalibrationFailed,
    StartRunSession,
    Running,
    EndRunSession,
}

impl AppEvent {
    pub const ALL: [AppEvent; 6] = [
        AppEvent::StartCalibration,
        AppEvent::EndCalibration,
        AppEvent::CalibrationFailed,
        AppEvent::StartRunSession,
        AppEvent::Running,
        AppEvent::EndRunSession,
    ];
}

/// Next state for `(state, event)`, or `None` when the pair is not a
/// transition.
pub fn transition(state: AppState, event: AppEvent) -> Option<AppState> {
    use AppEvent as E;
    use AppState as S;
    let next = match (state, event) {
        (S::Initial, E::StartCalibration) => S::Calibrating,
        (S::Initial, E::CalibrationFailed) => S::CalibrationFailed,
        (S::Calibrating, E::EndCalibration) => S::Initial,
        (S::Calibrating, E::CalibrationFailed) => S::CalibrationFailed,
        (S::Calibrating, E::StartRunSession) => S::StartRunningSession,
        (S::Calibrating, E::Running) => S::RunningSession,
        (S::StartRunningSession, E::Running) => S::RunningSession,
        (S::RunningSession, E::EndRunSession) => S::SessionEnded,
        (S::RunningSession, E::StartCalibration) => S::Calibrating,
        (S::SessionEnded, E::StartCalibration) => S::Calibrating,
        (S::CalibrationFailed, E::StartCalibration) => S::Calibrating,
        _ => return None,
    };
    Some(next)
}

#[derive(Clone, Debug, Default)]
pub struct StateMachine {
    state: AppState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    /// Apply `event` and return the resulting state. Unknown pairs leave the
    /// state unchanged.
    pub fn handle(&mut self, event: AppEvent) -> AppState {
        match transition(self.state, event) {
            Some(next) => {
                log::info!("state {} -> {next} on {event:?}", self.state);
                self.state = next;
            }
            None => {
                log::warn!("ignored {event:?} in state {}", self.state);
            }
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [(AppState, AppEvent, AppState); 11] = [
        (AppState::Initial, AppEvent::StartCalibration, AppState::Calibrating),
        (AppState::Initial, AppEvent::CalibrationFailed, AppState::CalibrationFailed),
        (AppState::Calibrating, AppEvent::EndCalibration, AppState::Initial),
        (AppState::Calibrating, AppEvent::CalibrationFailed, AppState::CalibrationFailed),
        (AppState::Calibrating, AppEvent::StartRunSession, AppState::StartRunningSession),
        (AppState::Calibrating, AppEvent::Running, AppState::RunningSession),
        (AppState::StartRunningSession, AppEvent::Running, AppState::RunningSession),
        (AppState::RunningSession, AppEvent::EndRunSession, AppState::SessionEnded),
        (AppState::RunningSession, AppEvent::StartCalibration, AppState::Calibrating),
        (AppState::SessionEnded, AppEvent::StartCalibration, AppState::Calibrating),
        (AppState::CalibrationFailed, AppEvent::StartCalibration, AppState::Calibrating),
    ];

    #[test]
    fn listed_transitions() {
        for (from, event, to) in TABLE {
            assert_eq!(transition(from, event), Some(to), "{from:?} + {event:?}");
        }
    }

    #[test]
    fn every_other_pair_is_ignored() {
        for state in AppState::ALL {
            for event in AppEvent::ALL {
                if TABLE.iter().any(|(s, e, _)| *s == state && *e == event) {
                    continue;
                }
                assert_eq!(transition(state, event), None, "{state:?} + {event:?}");
            }
        }
    }

    #[test]
    fn machine_keeps_state_on_ignored_event() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.handle(AppEvent::EndRunSession), AppState::Initial);
        assert_eq!(sm.handle(AppEvent::StartCalibration), AppState::Calibrating);
        assert_eq!(sm.handle(AppEvent::StartRunSession), AppState::StartRunningSession);
        assert_eq!(sm.handle(AppEvent::EndCalibration), AppState::StartRunningSession);
        assert_eq!(sm.handle(AppEvent::Running), AppState::RunningSession);
        assert_eq!(sm.handle(AppEvent::EndRunSession), AppState::SessionEnded);
    }

    #[test]
    fn calibrated_has_no_way_in() {
        for state in AppState::ALL {
            for event in AppEvent::ALL {
                assert_ne!(transition(state, event), Some(AppState::Calibrated));
            }
        }
    }
}
