//! Scripted capability adapters and a session harness
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use voice_bridge_core::{
    AudioFrame, ContextRetrieval, ContextSnippet, Generation, GenerationSender, GenerationStream,
    Message, Phase, Synthesis, SynthesisEvent, SynthesisStream, TranscriptEvent, Transcription,
    TranscriptionStream, UpstreamError,
};
use voice_bridge_persistence::InMemorySessionStore;
use voice_bridge_pipeline::{
    Capabilities, ClientInput, OrchestratorConfig, Outbound, PipelineOrchestrator, ServerEvent,
};

pub const WAIT: Duration = Duration::from_secs(2);

/// 20ms at 24kHz
pub const FRAME_SAMPLES: usize = 480;

/// Little-endian PCM with every sample set to `amplitude`
pub fn pcm(amplitude: i16, samples: usize) -> Vec<u8> {
    (0..samples).flat_map(|_| amplitude.to_le_bytes()).collect()
}

pub fn tokens(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[derive(Default)]
pub struct ScriptedTranscription {
    pub frames: Arc<Mutex<Vec<AudioFrame>>>,
    events: Mutex<Option<mpsc::Sender<TranscriptEvent>>>,
    pub connects: AtomicUsize,
    failures_left: AtomicUsize,
}

impl ScriptedTranscription {
    /// Fail the next `n` connection attempts
    pub fn failing(n: usize) -> Self {
        let stt = Self::default();
        stt.failures_left.store(n, Ordering::SeqCst);
        stt
    }

    pub fn is_connected(&self) -> bool {
        self.events.lock().is_some()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub async fn emit(&self, event: TranscriptEvent) {
        let tx = self.events.lock().clone();
        let tx = tx.expect("transcription not connected");
        tx.send(event).await.expect("session dropped transcription");
    }
}

#[async_trait]
impl Transcription for ScriptedTranscription {
    async fn connect(&self) -> Result<TranscriptionStream, UpstreamError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(UpstreamError::Transcription("connection refused".into()));
        }

        let (audio_tx, mut audio_rx) = mpsc::channel::<AudioFrame>(256);
        let (event_tx, event_rx) = mpsc::channel(64);
        *self.events.lock() = Some(event_tx);

        let frames = self.frames.clone();
        tokio::spawn(async move {
            while let Some(frame) = audio_rx.recv().await {
                frames.lock().push(frame);
            }
        });

        Ok(TranscriptionStream::new(audio_tx, event_rx))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub enum Reply {
    Tokens(Vec<String>),
    Fail(String),
}

#[derive(Default)]
pub struct ScriptedGeneration {
    replies: Mutex<VecDeque<Reply>>,
    /// When set, every completion waits for one permit before streaming
    pub gate: Option<Arc<Notify>>,
    pub prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGeneration {
    pub fn replying(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt(&self) -> Vec<Message> {
        self.prompts.lock().last().cloned().unwrap_or_default()
    }
}

impl Generation for ScriptedGeneration {
    fn stream_completion(&self, messages: Vec<Message>) -> GenerationStream {
        self.prompts.lock().push(messages);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::Tokens(tokens(&["Okay", "."])));
        let gate = self.gate.clone();

        let (mut sender, rx) = GenerationSender::channel(64);
        tokio::spawn(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            match reply {
                Reply::Tokens(parts) => {
                    for part in parts {
                        if !sender.token(&part).await {
                            return;
                        }
                    }
                    sender.complete().await;
                }
                Reply::Fail(e) => sender.fail(e).await,
            }
        });
        rx
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedSynthesis {
    pub texts: Mutex<Vec<String>>,
    pub chunks: usize,
    /// When set, every call waits for one permit before producing audio
    pub gate: Option<Arc<Notify>>,
    pub fail: AtomicBool,
    active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl Default for ScriptedSynthesis {
    fn default() -> Self {
        Self {
            texts: Mutex::new(Vec::new()),
            chunks: 2,
            gate: None,
            fail: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ScriptedSynthesis {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

impl Synthesis for ScriptedSynthesis {
    fn stream_synthesis(&self, text: String) -> SynthesisStream {
        self.texts.lock().push(text);
        let (tx, rx) = mpsc::channel(16);
        let chunks = self.chunks;
        let gate = self.gate.clone();
        let fail = self.fail.load(Ordering::SeqCst);
        let active = self.active.clone();
        let max_active = self.max_active.clone();

        tokio::spawn(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = gate {
                gate.notified().await;
            }
            if fail {
                active.fetch_sub(1, Ordering::SeqCst);
                let _ = tx.send(SynthesisEvent::Error("voice unavailable".into())).await;
                return;
            }
            for _ in 0..chunks {
                if tx.send(SynthesisEvent::Audio(pcm(100, 64))).await.is_err() {
                    active.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
                tokio::task::yield_now().await;
            }
            active.fetch_sub(1, Ordering::SeqCst);
            let _ = tx.send(SynthesisEvent::Complete).await;
        });
        rx
    }
}

#[derive(Default)]
pub struct ScriptedRetrieval {
    pub snippets: Vec<ContextSnippet>,
    pub queries: Mutex<Vec<String>>,
    pub cleared: Mutex<Vec<String>>,
}

#[async_trait]
impl ContextRetrieval for ScriptedRetrieval {
    async fn fetch_context(&self, query: &str, _session_id: &str, top_k: usize) -> Vec<ContextSnippet> {
        self.queries.lock().push(query.to_string());
        self.snippets.iter().take(top_k).cloned().collect()
    }

    fn clear_session(&self, session_id: &str) {
        self.cleared.lock().push(session_id.to_string());
    }
}

/// Adapters for one harness; swap any field before starting
pub struct Adapters {
    pub transcription: Arc<ScriptedTranscription>,
    pub generation: Arc<ScriptedGeneration>,
    pub synthesis: Arc<ScriptedSynthesis>,
    pub retrieval: Arc<ScriptedRetrieval>,
    pub store: Arc<InMemorySessionStore>,
}

impl Default for Adapters {
    fn default() -> Self {
        Self {
            transcription: Arc::new(ScriptedTranscription::default()),
            generation: Arc::new(ScriptedGeneration::default()),
            synthesis: Arc::new(ScriptedSynthesis::default()),
            retrieval: Arc::new(ScriptedRetrieval::default()),
            store: Arc::new(InMemorySessionStore::new(20)),
        }
    }
}

/// One running session wired to scripted adapters
pub struct Harness {
    pub transcription: Arc<ScriptedTranscription>,
    pub generation: Arc<ScriptedGeneration>,
    pub synthesis: Arc<ScriptedSynthesis>,
    pub retrieval: Arc<ScriptedRetrieval>,
    pub store: Arc<InMemorySessionStore>,
    pub session_id: String,
    pub phase: watch::Receiver<Phase>,
    inbound: Option<mpsc::Sender<ClientInput>>,
    outbound: mpsc::Receiver<Outbound>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Harness {
    pub async fn start(adapters: Adapters) -> Self {
        Self::start_with(adapters, OrchestratorConfig::default()).await
    }

    pub async fn start_with(adapters: Adapters, config: OrchestratorConfig) -> Self {
        let caps = Capabilities {
            transcription: adapters.transcription.clone(),
            generation: adapters.generation.clone(),
            synthesis: adapters.synthesis.clone(),
            retrieval: adapters.retrieval.clone(),
            store: adapters.store.clone(),
        };

        let (out_tx, mut outbound) = mpsc::channel(1024);
        let orchestrator = PipelineOrchestrator::connect(caps, config, out_tx)
            .await
            .expect("session should connect");
        let session_id = orchestrator.session_id().to_string();
        let phase = orchestrator.phase_watch();

        let first = timeout(WAIT, outbound.recv()).await.expect("connected event");
        assert!(matches!(
            first,
            Some(Outbound::Event(ServerEvent::Connected { session_id: ref id, .. })) if *id == session_id
        ));

        let (in_tx, in_rx) = mpsc::channel(64);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(orchestrator.run(in_rx, shutdown_rx));

        Self {
            transcription: adapters.transcription,
            generation: adapters.generation,
            synthesis: adapters.synthesis,
            retrieval: adapters.retrieval,
            store: adapters.store,
            session_id,
            phase,
            inbound: Some(in_tx),
            outbound,
            shutdown,
            task: Some(task),
        }
    }

    async fn input(&self, input: ClientInput) {
        self.inbound
            .as_ref()
            .expect("inbound closed")
            .send(input)
            .await
            .expect("session task gone");
    }

    pub async fn send_text(&self, text: &str) {
        self.input(ClientInput::Text(text.to_string())).await;
    }

    pub async fn send_audio(&self, bytes: Vec<u8>) {
        self.input(ClientInput::Audio(bytes)).await;
    }

    pub async fn start_recording(&self) {
        self.send_text(r#"{"type":"start_recording"}"#).await;
    }

    pub async fn final_transcript(&self, text: &str) {
        self.transcription.emit(TranscriptEvent::Final(text.to_string())).await;
    }

    pub async fn next(&mut self) -> Outbound {
        timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for outbound message")
            .expect("outbound closed")
    }

    /// Next JSON event, skipping audio
    pub async fn next_event(&mut self) -> ServerEvent {
        loop {
            if let Outbound::Event(event) = self.next().await {
                return event;
            }
        }
    }

    /// Everything up to and including the first message matching `done`
    pub async fn collect_until(&mut self, done: impl Fn(&Outbound) -> bool) -> Vec<Outbound> {
        let mut seen = Vec::new();
        loop {
            let msg = self.next().await;
            let stop = done(&msg);
            seen.push(msg);
            if stop {
                return seen;
            }
        }
    }

    pub async fn collect_until_event(&mut self, event: ServerEvent) -> Vec<Outbound> {
        let target = Outbound::Event(event);
        self.collect_until(move |msg| *msg == target).await
    }

    /// Nothing arrives within `within`
    pub async fn assert_quiet(&mut self, within: Duration) {
        if let Ok(msg) = timeout(within, self.outbound.recv()).await {
            panic!("expected no outbound message, got {:?}", msg);
        }
    }

    pub async fn wait_for_phase(&mut self, phase: Phase) {
        timeout(WAIT, self.phase.wait_for(|p| *p == phase))
            .await
            .expect("timed out waiting for phase")
            .expect("phase channel closed");
    }

    /// Client disconnect; waits for teardown
    pub async fn disconnect(&mut self) {
        self.inbound.take();
        if let Some(task) = self.task.take() {
            timeout(WAIT, task).await.expect("teardown timed out").expect("session task panicked");
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            timeout(WAIT, task).await.expect("teardown timed out").expect("session task panicked");
        }
    }
}

/// Poll `cond` until it holds
pub async fn eventually(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn events(messages: &[Outbound]) -> Vec<ServerEvent> {
    messages
        .iter()
        .filter_map(|m| match m {
            Outbound::Event(e) => Some(e.clone()),
            Outbound::Audio(_) => None,
        })
        .collect()
}

pub fn audio_chunks(messages: &[Outbound]) -> usize {
    messages.iter().filter(|m| matches!(m, Outbound::Audio(_))).count()
}

pub fn count(messages: &[Outbound], event: &ServerEvent) -> usize {
    events(messages).iter().filter(|e| *e == event).count()
}
