//! Turn-level metrics

use metrics::{counter, histogram};
use voice_bridge_core::TurnLatency;

pub fn record_turn_completed(latency: &TurnLatency) {
    counter!("voice_bridge_turns_completed_total").increment(1);

    if let Some(ms) = latency.stt_endpoint_ms {
        histogram!("voice_bridge_stt_endpoint_ms").record(ms as f64);
    }
    if let Some(ms) = latency.llm_first_token_ms {
        histogram!("voice_bridge_llm_first_token_ms").record(ms as f64);
    }
    if let Some(ms) = latency.tts_first_frame_ms {
        histogram!("voice_bridge_tts_first_frame_ms").record(ms as f64);
    }
    histogram!("voice_bridge_total_latency_ms").record(latency.total_latency_ms as f64);
}

/// Final transcript dropped because a turn was in flight
pub fn record_turn_dropped() {
    counter!("voice_bridge_turns_dropped_total").increment(1);
}

pub fn record_barge_in() {
    counter!("voice_bridge_barge_ins_total").increment(1);
}

/// `kind` is one of stt, llm, tts, rag
pub fn record_upstream_error(kind: &'static str) {
    counter!("voice_bridge_upstream_errors_total", "kind" => kind).increment(1);
}
