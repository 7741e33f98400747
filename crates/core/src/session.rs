//! Per-connection session state
//!
//! Phase machine: `Idle -> Listening -> Thinking -> Speaking -> (Interrupted -> Listening)`.
//! The phase and the in-flight flag live in one value owned by the session's
//! handler; every transition goes through a method here so the two never
//! drift apart.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conversation::{History, Message};
use crate::latency::TurnMetrics;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Connected, not yet recording
    Idle,
    /// Accepting user audio
    Listening,
    /// Final transcript accepted, waiting on context/generation
    Thinking,
    /// Synthesized audio is being delivered
    Speaking,
    /// Barge-in detected; transient, always followed by Listening
    Interrupted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Listening => "listening",
            Phase::Thinking => "thinking",
            Phase::Speaking => "speaking",
            Phase::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Conversation state for one connection
#[derive(Debug)]
pub struct SessionState {
    id: String,
    personality_id: Option<String>,
    history: History,
    phase: Phase,
    in_flight: bool,
    metrics: TurnMetrics,
}

impl SessionState {
    pub fn new(id: impl Into<String>, personality_id: Option<String>, max_history: usize) -> Self {
        Self {
            id: id.into(),
            personality_id,
            history: History::new(max_history),
            phase: Phase::Idle,
            in_flight: false,
            metrics: TurnMetrics::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn personality_id(&self) -> Option<&str> {
        self.personality_id.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Is a turn currently in flight
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn push_message(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn metrics(&self) -> &TurnMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut TurnMetrics {
        &mut self.metrics
    }

    fn transition(&mut self, to: Phase) {
        if self.phase != to {
            tracing::debug!(session_id = %self.id, from = %self.phase, to = %to, "Phase transition");
            self.phase = to;
        }
    }

    /// Enter Listening unless a turn owns the phase
    pub fn start_listening(&mut self) {
        if !self.in_flight && self.phase != Phase::Speaking {
            self.transition(Phase::Listening);
        }
    }

    /// Claim the single turn slot.
    ///
    /// Returns `false` (and changes nothing) when a turn is already in flight.
    pub fn try_begin_turn(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        self.metrics.reset();
        self.metrics.mark_stt_end();
        self.transition(Phase::Thinking);
        true
    }

    /// Synthesized audio is about to be delivered
    pub fn begin_speaking(&mut self) {
        self.transition(Phase::Speaking);
    }

    /// Release the turn slot after generation completed.
    ///
    /// The phase stays Speaking when audio is still being delivered.
    pub fn finish_turn(&mut self, audio_pending: bool) {
        self.in_flight = false;
        self.metrics.reset();
        if !audio_pending {
            self.transition(Phase::Listening);
        }
    }

    /// Release the turn slot after an upstream failure
    pub fn abort_turn(&mut self) {
        self.in_flight = false;
        self.metrics.reset();
        self.transition(Phase::Listening);
    }

    /// All audio for the last turn has been delivered
    pub fn finish_speaking(&mut self) {
        if !self.in_flight && self.phase == Phase::Speaking {
            self.transition(Phase::Listening);
        }
    }

    /// Barge-in applies only while speaking with no turn in flight
    pub fn can_barge_in(&self) -> bool {
        self.phase == Phase::Speaking && !self.in_flight
    }

    /// Speaking -> Interrupted -> Listening; returns whether it happened
    pub fn interrupt(&mut self) -> bool {
        if !self.can_barge_in() {
            return false;
        }
        self.transition(Phase::Interrupted);
        self.transition(Phase::Listening);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionState {
        SessionState::new("s1", None, 20)
    }

    #[test]
    fn test_initial_phase_is_idle() {
        let s = session();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(!s.in_flight());
    }

    #[test]
    fn test_turn_exclusivity() {
        let mut s = session();
        s.start_listening();
        assert!(s.try_begin_turn());
        assert_eq!(s.phase(), Phase::Thinking);
        assert!(!s.try_begin_turn());
        assert!(s.in_flight());
    }

    #[test]
    fn test_finish_turn_with_pending_audio_keeps_speaking() {
        let mut s = session();
        s.try_begin_turn();
        s.begin_speaking();
        s.finish_turn(true);
        assert_eq!(s.phase(), Phase::Speaking);
        assert!(!s.in_flight());

        s.finish_speaking();
        assert_eq!(s.phase(), Phase::Listening);
    }

    #[test]
    fn test_interrupt_requires_speaking_without_turn() {
        let mut s = session();
        s.try_begin_turn();
        s.begin_speaking();
        assert!(!s.interrupt());
        assert_eq!(s.phase(), Phase::Speaking);

        s.finish_turn(true);
        assert!(s.interrupt());
        assert_eq!(s.phase(), Phase::Listening);
    }

    #[test]
    fn test_abort_returns_to_listening() {
        let mut s = session();
        s.try_begin_turn();
        s.abort_turn();
        assert_eq!(s.phase(), Phase::Listening);
        assert!(s.try_begin_turn());
    }

    #[test]
    fn test_history_cap_applies() {
        let mut s = SessionState::new("s1", None, 2);
        s.push_message(Message::user("a"));
        s.push_message(Message::assistant("b"));
        s.push_message(Message::user("c"));
        assert_eq!(s.history().len(), 2);
    }
}
