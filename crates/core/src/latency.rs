//! Per-turn latency bookkeeping
//!
//! A turn's user-perceived latency is the sum of three components:
//! - STT endpoint: final transcript accepted -> generation request issued
//! - First token: generation request issued -> first token received
//! - First audio: synthesis request issued -> first audio chunk received
//!
//! A component whose timestamps were never recorded counts as zero.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Timestamps collected over one turn
#[derive(Debug, Clone, Default)]
pub struct TurnMetrics {
    recording_started: Option<Instant>,
    stt_end: Option<Instant>,
    generation_start: Option<Instant>,
    first_token: Option<Instant>,
    synthesis_start: Option<Instant>,
    first_audio: Option<Instant>,
}

impl TurnMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_recording_started(&mut self) {
        self.recording_started = Some(Instant::now());
    }

    /// Overwrites any earlier value
    pub fn mark_stt_end(&mut self) {
        self.mark_stt_end_at(Instant::now());
    }

    pub fn mark_stt_end_at(&mut self, at: Instant) {
        self.stt_end = Some(at);
    }

    pub fn mark_generation_start(&mut self) {
        self.mark_generation_start_at(Instant::now());
    }

    pub fn mark_generation_start_at(&mut self, at: Instant) {
        self.generation_start = Some(at);
    }

    /// Only the first call per turn is kept
    pub fn mark_first_token(&mut self) {
        self.mark_first_token_at(Instant::now());
    }

    pub fn mark_first_token_at(&mut self, at: Instant) {
        self.first_token.get_or_insert(at);
    }

    /// Only the first call per turn is kept
    pub fn mark_synthesis_start(&mut self) {
        self.mark_synthesis_start_at(Instant::now());
    }

    pub fn mark_synthesis_start_at(&mut self, at: Instant) {
        self.synthesis_start.get_or_insert(at);
    }

    /// Only the first call per turn is kept
    pub fn mark_first_audio(&mut self) {
        self.mark_first_audio_at(Instant::now());
    }

    pub fn mark_first_audio_at(&mut self, at: Instant) {
        self.first_audio.get_or_insert(at);
    }

    /// Time between start_recording and the accepted final transcript
    pub fn capture_duration(&self) -> Option<Duration> {
        span(self.recording_started, self.stt_end)
    }

    pub fn has_first_audio(&self) -> bool {
        self.first_audio.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn span(start: Option<Instant>, end: Option<Instant>) -> Option<Duration> {
    match (start, end) {
        (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
        _ => None,
    }
}

fn millis(d: Option<Duration>) -> Option<u64> {
    d.map(|d| d.as_millis() as u64)
}

/// Derived latency components for one turn, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnLatency {
    pub stt_endpoint_ms: Option<u64>,
    pub llm_first_token_ms: Option<u64>,
    pub tts_first_frame_ms: Option<u64>,
    pub total_latency_ms: u64,
}

impl TurnLatency {
    pub fn from_metrics(metrics: &TurnMetrics) -> Self {
        let stt_endpoint_ms = millis(span(metrics.stt_end, metrics.generation_start));
        let llm_first_token_ms = millis(span(metrics.generation_start, metrics.first_token));
        let tts_first_frame_ms = millis(span(metrics.synthesis_start, metrics.first_audio));

        Self {
            stt_endpoint_ms,
            llm_first_token_ms,
            tts_first_frame_ms,
            total_latency_ms: stt_endpoint_ms.unwrap_or(0)
                + llm_first_token_ms.unwrap_or(0)
                + tts_first_frame_ms.unwrap_or(0),
        }
    }
}

/// Finalizes turns and reports budget violations
#[derive(Debug, Clone)]
pub struct TurnLatencyTracker {
    budget_ms: u64,
    turns: u64,
}

impl TurnLatencyTracker {
    pub fn new(budget_ms: u64) -> Self {
        Self { budget_ms, turns: 0 }
    }

    pub fn budget_ms(&self) -> u64 {
        self.budget_ms
    }

    /// Number of turns finalized so far
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Derive the turn's latency and warn when it exceeds the budget
    pub fn finalize(&mut self, session_id: &str, metrics: &TurnMetrics) -> TurnLatency {
        self.turns += 1;
        let latency = TurnLatency::from_metrics(metrics);

        tracing::debug!(
            session_id = %session_id,
            turn = self.turns,
            stt_endpoint_ms = ?latency.stt_endpoint_ms,
            llm_first_token_ms = ?latency.llm_first_token_ms,
            tts_first_frame_ms = ?latency.tts_first_frame_ms,
            total_ms = latency.total_latency_ms,
            "Turn latency"
        );

        if latency.total_latency_ms > self.budget_ms {
            tracing::warn!(
                session_id = %session_id,
                total_ms = latency.total_latency_ms,
                budget_ms = self.budget_ms,
                "High latency detected"
            );
        }

        latency
    }
}
