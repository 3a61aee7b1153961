use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::{
    start_stream_observed, AiError, CancelToken, ChatMessage, Role, StreamDelta, StreamOutcome,
    StreamState, Transport,
};
use crate::config::AIConfig;
use crate::prompt::{generate_strategy_prompt, StrategyForm};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WizardStep {
    Input,
    Preview,
    Result,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Rejected before any request; transcript and step are untouched.
    #[error("cannot {action} while on the {step:?} step")]
    WrongStep {
        action: &'static str,
        step: WizardStep,
    },
    #[error(transparent)]
    Ai(#[from] AiError),
}

impl SessionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Ai(e) if e.is_cancelled())
    }
}

/// In-memory chat transcript, oldest first.
///
/// Only appends and edits to the last message are allowed; the last message
/// belongs to the running stream until it settles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything and seed with the synthesized prompt.
    pub fn start(&mut self, prompt: impl Into<String>) {
        self.messages.clear();
        self.messages.push(ChatMessage::user(prompt));
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
    }

    pub fn begin_assistant(&mut self) {
        self.messages.push(ChatMessage::assistant_placeholder());
    }

    pub fn apply_delta(&mut self, delta: &StreamDelta) {
        if let Some(last) = self.messages.last_mut() {
            last.apply_delta(delta);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn last_assistant_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

enum TurnSeed {
    Analysis(String),
    FollowUp(String),
}

struct SessionInner {
    config: AIConfig,
    form: StrategyForm,
    prompt: String,
    step: WizardStep,
    conversation: Conversation,
    in_flight: Option<CancelToken>,
    generation: u64,
    loading: bool,
    stream_state: StreamState,
    last_error: Option<AiError>,
}

/// One wizard run: form, prompt preview and the analysis conversation.
///
/// At most one stream is in flight. Starting another turn stops the running
/// one first, and a stopped stream never touches the transcript again.
pub struct AnalysisSession {
    pub id: String,
    pub started_at: String,
    inner: Mutex<SessionInner>,
}

impl AnalysisSession {
    pub fn new(config: AIConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            inner: Mutex::new(SessionInner {
                config,
                form: StrategyForm::default(),
                prompt: String::new(),
                step: WizardStep::Input,
                conversation: Conversation::new(),
                in_flight: None,
                generation: 0,
                loading: false,
                stream_state: StreamState::Idle,
                last_error: None,
            }),
        }
    }

    pub fn config(&self) -> AIConfig {
        self.inner.lock().config.clone()
    }

    /// Replace the config wholesale; the next turn picks it up.
    pub fn update_config(&self, config: AIConfig) {
        self.inner.lock().config = config;
    }

    pub fn step(&self) -> WizardStep {
        self.inner.lock().step
    }

    pub fn form(&self) -> StrategyForm {
        self.inner.lock().form.clone()
    }

    pub fn prompt(&self) -> String {
        self.inner.lock().prompt.clone()
    }

    /// Render the prompt for `form` and move to the preview step.
    pub fn preview(&self, form: StrategyForm) -> String {
        let prompt = generate_strategy_prompt(&form);
        let mut inner = self.inner.lock();
        inner.form = form;
        inner.prompt = prompt.clone();
        inner.step = WizardStep::Preview;
        prompt
    }

    /// Hand edits made to the previewed prompt.
    pub fn edit_prompt(&self, prompt: impl Into<String>) {
        self.inner.lock().prompt = prompt.into();
    }

    pub fn back_to_input(&self) {
        self.inner.lock().step = WizardStep::Input;
    }

    /// Start a fresh conversation seeded with the previewed prompt and stream
    /// the first answer. Only allowed from the preview step.
    pub async fn submit_analysis<F>(
        &self,
        transport: &dyn Transport,
        on_delta: F,
    ) -> Result<StreamOutcome, SessionError>
    where
        F: FnMut(&StreamDelta),
    {
        let prompt = {
            let mut inner = self.inner.lock();
            if inner.step != WizardStep::Preview {
                return Err(SessionError::WrongStep {
                    action: "submit an analysis",
                    step: inner.step,
                });
            }
            if inner.prompt.trim().is_empty() {
                inner.prompt = generate_strategy_prompt(&inner.form);
            }
            inner.prompt.clone()
        };
        self.run_turn(transport, TurnSeed::Analysis(prompt), on_delta)
            .await
    }

    /// Append a user question to the conversation and stream the reply.
    /// Blank questions are ignored and yield `Ok(None)`.
    pub async fn ask_follow_up<F>(
        &self,
        transport: &dyn Transport,
        question: &str,
        on_delta: F,
    ) -> Result<Option<StreamOutcome>, SessionError>
    where
        F: FnMut(&StreamDelta),
    {
        let step = self.step();
        if step != WizardStep::Result {
            return Err(SessionError::WrongStep {
                action: "ask a follow-up",
                step,
            });
        }
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }
        self.run_turn(transport, TurnSeed::FollowUp(question.to_string()), on_delta)
            .await
            .map(Some)
    }

    async fn run_turn<F>(
        &self,
        transport: &dyn Transport,
        seed: TurnSeed,
        mut on_delta: F,
    ) -> Result<StreamOutcome, SessionError>
    where
        F: FnMut(&StreamDelta),
    {
        let (history, config, cancel, generation) = {
            let mut inner = self.inner.lock();
            if let Err(e) = inner.config.validate() {
                log::warn!("[{}] {}", self.id, e);
                inner.last_error = Some(e.clone());
                return Err(e.into());
            }

            if let Some(previous) = inner.in_flight.take() {
                log::info!("[{}] Stopping previous stream for a new turn", self.id);
                previous.cancel();
            }

            match seed {
                TurnSeed::Analysis(prompt) => {
                    inner.conversation.start(prompt);
                    inner.step = WizardStep::Result;
                }
                TurnSeed::FollowUp(question) => inner.conversation.push_user(question),
            }

            let history = inner.conversation.messages().to_vec();
            inner.conversation.begin_assistant();

            let cancel = CancelToken::new();
            inner.generation += 1;
            inner.in_flight = Some(cancel.clone());
            inner.loading = true;
            inner.stream_state = StreamState::Requesting;
            inner.last_error = None;
            (history, inner.config.clone(), cancel, inner.generation)
        };

        let result = start_stream_observed(
            transport,
            &history,
            &config,
            |delta| {
                {
                    let mut inner = self.inner.lock();
                    // A newer turn may own the last message by now.
                    if cancel.is_cancelled() {
                        return;
                    }
                    inner.conversation.apply_delta(&delta);
                }
                on_delta(&delta);
            },
            |state| {
                let mut inner = self.inner.lock();
                if !cancel.is_cancelled() {
                    inner.stream_state = state;
                }
            },
            &cancel,
        )
        .await;

        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.in_flight = None;
            inner.loading = false;
            inner.stream_state = StreamState::settled(&result);
            if let Err(e) = &result {
                if e.is_user_visible() {
                    inner.last_error = Some(e.clone());
                }
            }
        }

        match &result {
            Ok(outcome) => log::info!("[{}] Turn completed with {} delta(s)", self.id, outcome.deltas),
            Err(AiError::Cancelled) => log::info!("[{}] Turn stopped by user", self.id),
            Err(e) => log::error!("[{}] Turn failed: {}", self.id, e),
        }
        result.map_err(SessionError::from)
    }

    /// Handle for stopping the running stream from elsewhere (a signal
    /// handler, another task). `None` when idle.
    pub fn stop_handle(&self) -> Option<CancelToken> {
        self.inner.lock().in_flight.clone()
    }

    pub fn stop(&self) {
        if let Some(token) = self.inner.lock().in_flight.as_ref() {
            token.cancel();
        }
    }

    /// New session: stop streaming, drop the transcript, back to the form.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if let Some(token) = inner.in_flight.take() {
            token.cancel();
        }
        inner.generation += 1;
        inner.conversation.clear();
        inner.form = StrategyForm::default();
        inner.prompt.clear();
        inner.step = WizardStep::Input;
        inner.loading = false;
        inner.stream_state = StreamState::Idle;
        inner.last_error = None;
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().conversation.messages().to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().loading
    }

    pub fn stream_state(&self) -> StreamState {
        self.inner.lock().stream_state
    }

    pub fn last_error(&self) -> Option<AiError> {
        self.inner.lock().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        self.inner.lock().last_error = None;
    }

    /// Finished text of the latest answer, for export.
    pub fn report_markdown(&self) -> Option<String> {
        self.inner
            .lock()
            .conversation
            .last_assistant_content()
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }
}
