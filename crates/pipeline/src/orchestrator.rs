//! Voice Turn Orchestrator
//!
//! One `PipelineOrchestrator` runs per client connection as a single task.
//! Client input, transcription events, the context fetch, generation tokens
//! and synthesis chunks are multiplexed with `tokio::select!`, so every
//! phase transition happens on one owner and no locks are needed.
//!
//! Turn flow: final transcript -> context -> prompt -> token stream ->
//! batched synthesis -> audio. At most one turn is in flight; a final
//! transcript arriving meanwhile is dropped, not queued.

use std::collections::VecDeque;
use std::future::pending;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use voice_bridge_config::Settings;
use voice_bridge_core::{
    format_context_for_prompt, AudioFramer, ContextRetrieval, ContextSnippet, Generation,
    GenerationEvent, GenerationStream, Message, Phase, SessionState, Synthesis, SynthesisEvent,
    SynthesisStream, TranscriptEvent, Transcription, TranscriptionStream, TurnLatencyTracker,
    UpstreamError, DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_FRAME_MS, DEFAULT_MAX_HISTORY,
    DEFAULT_SAMPLE_RATE,
};
use voice_bridge_llm::PromptBuilder;
use voice_bridge_persistence::{compile_system_prompt, SessionStore};

use crate::metrics;
use crate::protocol::{
    ClientControl, ClientInput, Outbound, ServerEvent, StatusMessage, CONNECTED_MESSAGE,
};
use crate::PipelineError;

/// External collaborators shared by every session
#[derive(Clone)]
pub struct Capabilities {
    pub transcription: Arc<dyn Transcription>,
    pub generation: Arc<dyn Generation>,
    pub synthesis: Arc<dyn Synthesis>,
    pub retrieval: Arc<dyn ContextRetrieval>,
    pub store: Arc<dyn SessionStore>,
}

/// Per-session tunables
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub activity_threshold: f64,
    /// Tokens buffered before the first synthesis call of a turn
    pub token_batch_threshold: usize,
    pub history_window: usize,
    pub max_history: usize,
    pub context_top_k: usize,
    pub latency_budget_ms: u64,
    /// Used instead of the default prompt when no personality is active
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_ms: DEFAULT_FRAME_MS,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            token_batch_threshold: 15,
            history_window: 10,
            max_history: DEFAULT_MAX_HISTORY,
            context_top_k: 3,
            latency_budget_ms: 220,
            system_prompt: None,
        }
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            sample_rate: settings.audio.sample_rate,
            frame_ms: settings.audio.frame_ms,
            activity_threshold: settings.audio.activity_threshold,
            token_batch_threshold: settings.pipeline.token_batch_threshold,
            history_window: settings.pipeline.history_window,
            max_history: settings.pipeline.max_history,
            context_top_k: settings.pipeline.context_top_k,
            latency_budget_ms: settings.pipeline.latency_budget_ms,
            system_prompt: settings.pipeline.system_prompt.clone(),
        }
    }
}

enum TurnStage {
    FetchingContext(JoinHandle<Vec<ContextSnippet>>),
    Generating(GenerationStream),
}

/// The turn currently in flight
struct ActiveTurn {
    user_text: String,
    stage: TurnStage,
    batch: String,
    batch_tokens: usize,
    synthesis_started: bool,
}

enum TurnStep {
    Context(Vec<ContextSnippet>),
    Generation(Option<GenerationEvent>),
}

struct SpeechJob {
    text: String,
    ends_audio: bool,
}

struct ActiveSpeech {
    stream: SynthesisStream,
    ends_audio: bool,
}

/// Serializes synthesis calls; a job starts only after the previous one
/// completed or failed.
struct SpeechQueue {
    synthesis: Arc<dyn Synthesis>,
    current: Option<ActiveSpeech>,
    pending: VecDeque<SpeechJob>,
}

impl SpeechQueue {
    fn new(synthesis: Arc<dyn Synthesis>) -> Self {
        Self {
            synthesis,
            current: None,
            pending: VecDeque::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    fn enqueue(&mut self, job: SpeechJob) {
        self.pending.push_back(job);
        if self.current.is_none() {
            self.start_next();
        }
    }

    fn start_next(&mut self) {
        if let Some(job) = self.pending.pop_front() {
            tracing::debug!(chars = job.text.len(), "Starting synthesis");
            self.current = Some(ActiveSpeech {
                stream: self.synthesis.stream_synthesis(job.text),
                ends_audio: job.ends_audio,
            });
        }
    }

    /// Let the last job signal end-of-audio; `false` if there is none
    fn mark_last_ends_audio(&mut self) -> bool {
        if let Some(job) = self.pending.back_mut() {
            job.ends_audio = true;
            return true;
        }
        match self.current.as_mut() {
            Some(current) => {
                current.ends_audio = true;
                true
            }
            None => false,
        }
    }

    /// Drop queued jobs and detach the running one.
    ///
    /// The detached call completes in the background with its output
    /// discarded, so the next turn's synthesis starts immediately.
    fn interrupt(&mut self) {
        self.pending.clear();
        if let Some(current) = self.current.take() {
            let mut stream = current.stream;
            tokio::spawn(async move { while stream.recv().await.is_some() {} });
        }
    }

    async fn next_event(&mut self) -> Option<SynthesisEvent> {
        match self.current.as_mut() {
            Some(current) => current.stream.recv().await,
            None => pending().await,
        }
    }
}

async fn next_transcript(stream: &mut Option<TranscriptionStream>) -> Option<TranscriptEvent> {
    match stream.as_mut() {
        Some(stream) => stream.next_event().await,
        None => pending().await,
    }
}

async fn next_turn_step(turn: &mut Option<ActiveTurn>) -> TurnStep {
    let Some(turn) = turn.as_mut() else {
        return pending().await;
    };
    match &mut turn.stage {
        TurnStage::FetchingContext(fetch) => match fetch.await {
            Ok(snippets) => TurnStep::Context(snippets),
            Err(e) => {
                tracing::warn!(error = %e, "Context fetch task failed, continuing without context");
                TurnStep::Context(Vec::new())
            }
        },
        TurnStage::Generating(stream) => TurnStep::Generation(stream.recv().await),
    }
}

/// Per-session pipeline
pub struct PipelineOrchestrator {
    caps: Capabilities,
    config: OrchestratorConfig,
    framer: AudioFramer,
    prompt: PromptBuilder,
    session: SessionState,
    tracker: TurnLatencyTracker,
    transcription: Option<TranscriptionStream>,
    turn: Option<ActiveTurn>,
    speech: SpeechQueue,
    outbound: mpsc::Sender<Outbound>,
    phase_tx: watch::Sender<Phase>,
}

impl PipelineOrchestrator {
    /// Create the session, greet the client and open transcription.
    ///
    /// A transcription failure here is reported to the client and leaves the
    /// session usable; `start_recording` retries the connection.
    pub async fn connect(
        caps: Capabilities,
        config: OrchestratorConfig,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<Self, PipelineError> {
        let personality = match caps.store.active_personality().await {
            Ok(personality) => personality,
            Err(e) => {
                tracing::warn!(error = %e, "Error fetching personality, using default prompt");
                None
            }
        };
        let system_prompt = match (&personality, &config.system_prompt) {
            (None, Some(custom)) => custom.clone(),
            _ => compile_system_prompt(personality.as_ref()),
        };

        let record = caps
            .store
            .create_session(personality.as_ref().and_then(|p| p.id.clone()))
            .await?;
        tracing::info!(
            session_id = %record.session_id,
            personality = ?personality.as_ref().and_then(|p| p.name.as_deref()),
            "Session started"
        );

        let session = SessionState::new(record.session_id, record.personality_id, config.max_history);
        let (phase_tx, _) = watch::channel(session.phase());

        let mut orchestrator = Self {
            framer: AudioFramer::new(config.sample_rate, config.frame_ms)
                .with_activity_threshold(config.activity_threshold),
            prompt: PromptBuilder::new(system_prompt, config.history_window),
            tracker: TurnLatencyTracker::new(config.latency_budget_ms),
            speech: SpeechQueue::new(caps.synthesis.clone()),
            transcription: None,
            turn: None,
            session,
            caps,
            config,
            outbound,
            phase_tx,
        };

        orchestrator
            .emit(ServerEvent::Connected {
                session_id: orchestrator.session.id().to_string(),
                message: CONNECTED_MESSAGE.to_string(),
            })
            .await?;
        orchestrator.open_transcription().await?;

        Ok(orchestrator)
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Observe phase changes from outside the session task
    pub fn phase_watch(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// Drive the session until the client goes away or shutdown is signalled,
    /// then tear it down.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<ClientInput>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let result = tokio::select! {
                input = inbound.recv() => match input {
                    Some(ClientInput::Audio(bytes)) => self.on_client_audio(&bytes).await,
                    Some(ClientInput::Text(text)) => self.on_client_text(&text).await,
                    None => {
                        tracing::debug!(session_id = %self.session.id(), "Client input closed");
                        break;
                    }
                },
                event = next_transcript(&mut self.transcription) => self.on_transcript(event).await,
                step = next_turn_step(&mut self.turn) => match step {
                    TurnStep::Context(snippets) => self.on_context(snippets).await,
                    TurnStep::Generation(event) => self.on_generation(event).await,
                },
                event = self.speech.next_event() => self.on_synthesis(event).await,
                _ = shutdown.changed() => {
                    tracing::info!(session_id = %self.session.id(), "Shutdown requested");
                    break;
                }
            };

            if let Err(e) = result {
                tracing::warn!(session_id = %self.session.id(), error = %e, "Session transport failed");
                break;
            }
            self.publish_phase();
        }

        self.teardown().await;
    }

    /// Release upstream resources held by this session
    pub async fn teardown(mut self) {
        let session_id = self.session.id().to_string();

        if let Some(stream) = self.transcription.take() {
            stream.close();
        }
        if let Some(ActiveTurn {
            stage: TurnStage::FetchingContext(fetch),
            ..
        }) = self.turn.take()
        {
            fetch.abort();
        }
        self.caps.retrieval.clear_session(&session_id);
        if let Err(e) = self.caps.store.destroy_session(&session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "Error destroying session");
        }

        tracing::info!(
            session_id = %session_id,
            turns = self.tracker.turns(),
            "Session closed"
        );
    }

    fn publish_phase(&self) {
        let phase = self.session.phase();
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
    }

    async fn emit(&self, event: ServerEvent) -> Result<(), PipelineError> {
        self.outbound
            .send(Outbound::Event(event))
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    async fn emit_status(&self, status: StatusMessage) -> Result<(), PipelineError> {
        self.emit(ServerEvent::status(status)).await
    }

    async fn report_upstream(&self, error: UpstreamError) -> Result<(), PipelineError> {
        tracing::error!(session_id = %self.session.id(), kind = error.kind(), error = %error, "Upstream error");
        metrics::record_upstream_error(error.kind());
        self.emit(ServerEvent::error(error.client_message())).await
    }

    async fn open_transcription(&mut self) -> Result<(), PipelineError> {
        match self.caps.transcription.connect().await {
            Ok(stream) => {
                tracing::debug!(
                    session_id = %self.session.id(),
                    provider = self.caps.transcription.name(),
                    "Transcription connected"
                );
                self.transcription = Some(stream);
                Ok(())
            }
            Err(e) => self.report_upstream(e).await,
        }
    }

    async fn on_client_audio(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        let frames = self.framer.frame(bytes);

        if self.session.can_barge_in() && frames.iter().any(|f| self.framer.is_active(f)) {
            self.barge_in().await?;
        }

        if !self.session.in_flight() {
            if let Some(stream) = &self.transcription {
                for frame in frames {
                    stream.send_audio(frame);
                }
            }
        }
        Ok(())
    }

    async fn barge_in(&mut self) -> Result<(), PipelineError> {
        if !self.session.interrupt() {
            return Ok(());
        }
        tracing::info!(session_id = %self.session.id(), "Barge-in detected, stopping speech");
        metrics::record_barge_in();

        self.speech.interrupt();
        self.emit(ServerEvent::AudioInterrupted).await?;
        self.emit_status(StatusMessage::Listening).await
    }

    async fn on_client_text(&mut self, text: &str) -> Result<(), PipelineError> {
        let control = match serde_json::from_str::<ClientControl>(text) {
            Ok(control) => control,
            Err(e) => {
                tracing::warn!(session_id = %self.session.id(), error = %e, "Ignoring malformed control message");
                return Ok(());
            }
        };

        match control {
            ClientControl::StartRecording => {
                self.session.metrics_mut().mark_recording_started();
                self.session.start_listening();
                self.emit_status(StatusMessage::Listening).await?;

                if self.transcription.is_none() {
                    tracing::info!(session_id = %self.session.id(), "Reconnecting transcription");
                    self.open_transcription().await?;
                }
            }
            ClientControl::StopRecording => {
                // Provisional; replaced when a final transcript is accepted
                if !self.session.in_flight() {
                    self.session.metrics_mut().mark_stt_end();
                }
            }
        }
        Ok(())
    }

    async fn on_transcript(&mut self, event: Option<TranscriptEvent>) -> Result<(), PipelineError> {
        match event {
            Some(TranscriptEvent::Partial(text)) => self.emit(ServerEvent::TranscriptPartial { text }).await,
            Some(TranscriptEvent::Final(text)) => self.on_final_transcript(text).await,
            Some(TranscriptEvent::Endpoint) => {
                tracing::debug!(session_id = %self.session.id(), "Speech endpoint detected");
                Ok(())
            }
            Some(TranscriptEvent::Error(e)) => {
                if let Some(stream) = self.transcription.take() {
                    stream.close();
                }
                self.report_upstream(UpstreamError::Transcription(e)).await
            }
            None => {
                tracing::warn!(session_id = %self.session.id(), "Transcription connection closed");
                self.transcription = None;
                Ok(())
            }
        }
    }

    async fn on_final_transcript(&mut self, text: String) -> Result<(), PipelineError> {
        if !self.session.try_begin_turn() {
            tracing::debug!(session_id = %self.session.id(), "Turn in flight, dropping final transcript");
            metrics::record_turn_dropped();
            return Ok(());
        }
        tracing::info!(session_id = %self.session.id(), text = %text, "Final transcript");

        self.emit(ServerEvent::TranscriptFinal { text: text.clone() }).await?;
        self.emit_status(StatusMessage::Thinking).await?;

        self.remember(Message::user(text.clone())).await;

        let retrieval = self.caps.retrieval.clone();
        let session_id = self.session.id().to_string();
        let query = text.clone();
        let top_k = self.config.context_top_k;
        let fetch = tokio::spawn(async move { retrieval.fetch_context(&query, &session_id, top_k).await });

        self.turn = Some(ActiveTurn {
            user_text: text,
            stage: TurnStage::FetchingContext(fetch),
            batch: String::new(),
            batch_tokens: 0,
            synthesis_started: false,
        });
        Ok(())
    }

    async fn on_context(&mut self, snippets: Vec<ContextSnippet>) -> Result<(), PipelineError> {
        let Some(turn) = self.turn.as_mut() else {
            return Ok(());
        };
        tracing::debug!(session_id = %self.session.id(), snippets = snippets.len(), "Context ready");

        let context = format_context_for_prompt(&snippets);
        let messages = self.prompt.build(self.session.history(), &turn.user_text, &context);

        self.session.metrics_mut().mark_generation_start();
        turn.stage = TurnStage::Generating(self.caps.generation.stream_completion(messages));
        Ok(())
    }

    async fn on_generation(&mut self, event: Option<GenerationEvent>) -> Result<(), PipelineError> {
        match event {
            Some(GenerationEvent::Token { text, is_first }) => self.on_token(text, is_first).await,
            Some(GenerationEvent::Complete(full_text)) => self.on_generation_complete(full_text).await,
            Some(GenerationEvent::Error(e)) => self.abort_turn(UpstreamError::Generation(e)).await,
            None => {
                self.abort_turn(UpstreamError::Generation("stream ended without completion".to_string()))
                    .await
            }
        }
    }

    async fn on_token(&mut self, text: String, is_first: bool) -> Result<(), PipelineError> {
        if is_first {
            self.session.metrics_mut().mark_first_token();
        }

        let threshold = self.config.token_batch_threshold;
        let Some(turn) = self.turn.as_mut() else {
            return Ok(());
        };
        turn.batch.push_str(&text);
        turn.batch_tokens += 1;

        let flush = if turn.batch_tokens >= threshold && !turn.synthesis_started {
            turn.synthesis_started = true;
            turn.batch_tokens = 0;
            Some(std::mem::take(&mut turn.batch))
        } else {
            None
        };

        self.emit(ServerEvent::ResponseToken { text }).await?;

        if let Some(batch) = flush {
            self.speak(batch, false).await?;
        }
        Ok(())
    }

    async fn on_generation_complete(&mut self, full_text: String) -> Result<(), PipelineError> {
        let Some(turn) = self.turn.take() else {
            return Ok(());
        };

        if !turn.batch.is_empty() {
            self.speak(turn.batch, true).await?;
        } else if !self.speech.mark_last_ends_audio() {
            self.emit(ServerEvent::AudioEnd).await?;
        }

        self.remember(Message::assistant(full_text)).await;

        let latency = self.tracker.finalize(self.session.id(), self.session.metrics());
        if let Err(e) = self.caps.store.record_latency(self.session.id(), &latency).await {
            tracing::warn!(session_id = %self.session.id(), error = %e, "Error recording latency");
        }
        metrics::record_turn_completed(&latency);

        self.emit_status(StatusMessage::Ready).await?;
        self.session.finish_turn(!self.speech.is_idle());
        Ok(())
    }

    /// Contain an upstream failure to the current turn
    async fn abort_turn(&mut self, error: UpstreamError) -> Result<(), PipelineError> {
        self.turn = None;
        self.speech.interrupt();
        self.session.abort_turn();
        self.report_upstream(error).await
    }

    async fn speak(&mut self, text: String, ends_audio: bool) -> Result<(), PipelineError> {
        if self.session.phase() != Phase::Speaking {
            self.session.begin_speaking();
            self.emit_status(StatusMessage::Speaking).await?;
        }
        self.session.metrics_mut().mark_synthesis_start();
        self.speech.enqueue(SpeechJob { text, ends_audio });
        Ok(())
    }

    async fn on_synthesis(&mut self, event: Option<SynthesisEvent>) -> Result<(), PipelineError> {
        match event {
            Some(SynthesisEvent::Audio(chunk)) => {
                if self.session.in_flight() {
                    self.session.metrics_mut().mark_first_audio();
                }
                self.outbound
                    .send(Outbound::Audio(chunk))
                    .await
                    .map_err(|_| PipelineError::ChannelClosed)
            }
            Some(SynthesisEvent::Complete) => {
                let ends_audio = self.speech.current.take().is_some_and(|c| c.ends_audio);
                if ends_audio {
                    self.emit(ServerEvent::AudioEnd).await?;
                }
                self.speech.start_next();
                if self.speech.is_idle() {
                    self.session.finish_speaking();
                }
                Ok(())
            }
            Some(SynthesisEvent::Error(e)) => self.on_synthesis_failed(e).await,
            None => self.on_synthesis_failed("stream ended without completion".to_string()).await,
        }
    }

    async fn on_synthesis_failed(&mut self, error: String) -> Result<(), PipelineError> {
        self.speech.current = None;
        self.speech.pending.clear();
        if self.session.in_flight() {
            self.turn = None;
            self.session.abort_turn();
        } else {
            self.session.finish_speaking();
        }
        self.report_upstream(UpstreamError::Synthesis(error)).await
    }

    /// Append to the session history and mirror it to the store
    async fn remember(&mut self, message: Message) {
        if let Err(e) = self.caps.store.append_message(self.session.id(), &message).await {
            tracing::warn!(session_id = %self.session.id(), error = %e, "Error persisting message");
        }
        self.session.push_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentSynthesis;

    impl Synthesis for SilentSynthesis {
        fn stream_synthesis(&self, _text: String) -> SynthesisStream {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move {
                let _ = tx.send(SynthesisEvent::Complete).await;
            });
            rx
        }
    }

    #[tokio::test]
    async fn test_speech_queue_serializes_jobs() {
        let mut queue = SpeechQueue::new(Arc::new(SilentSynthesis));
        assert!(queue.is_idle());

        queue.enqueue(SpeechJob { text: "one".into(), ends_audio: false });
        queue.enqueue(SpeechJob { text: "two".into(), ends_audio: false });
        assert!(queue.current.is_some());
        assert_eq!(queue.pending.len(), 1);

        assert!(queue.mark_last_ends_audio());
        assert!(queue.pending.back().is_some_and(|j| j.ends_audio));
    }

    #[tokio::test]
    async fn test_interrupt_detaches_current_and_clears_pending() {
        let mut queue = SpeechQueue::new(Arc::new(SilentSynthesis));
        queue.enqueue(SpeechJob { text: "one".into(), ends_audio: false });
        queue.enqueue(SpeechJob { text: "two".into(), ends_audio: true });

        queue.interrupt();
        assert!(queue.pending.is_empty());
        assert!(queue.current.is_none());
        assert!(queue.is_idle());
        assert!(!queue.mark_last_ends_audio());

        // A job enqueued after the interrupt starts right away
        queue.enqueue(SpeechJob { text: "three".into(), ends_audio: true });
        assert!(queue.current.as_ref().is_some_and(|c| c.ends_audio));
        assert_eq!(queue.next_event().await, Some(SynthesisEvent::Complete));
    }

    // Sessions are spawned onto the runtime
    #[allow(dead_code)]
    fn run_future_is_send(
        orchestrator: PipelineOrchestrator,
        inbound: mpsc::Receiver<ClientInput>,
        shutdown: watch::Receiver<bool>,
    ) {
        fn assert_send<T: Send + 'static>(_: T) {}
        assert_send(orchestrator.run(inbound, shutdown));
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.pipeline.token_batch_threshold = 7;
        let config = OrchestratorConfig::from(&settings);
        assert_eq!(config.token_batch_threshold, 7);
        assert_eq!(config.sample_rate, 24_000);
        assert_eq!(config.history_window, 10);
    }
}
