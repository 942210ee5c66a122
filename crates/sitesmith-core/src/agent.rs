//! The START/THINK/OBSERVE/OUTPUT agent loop run over each chunk.
//!
//! The conversation is an append-only [`Transcript`] value. [`advance`] is a
//! pure step from `(transcript, reply)` to the next [`Turn`]; [`AgentLoop`]
//! only adds the model calls, the turn limit and progress reporting.

use crate::budget::Chunk;
use crate::merge::Fragment;
use crate::model::{complete_with_timeout, LanguageModel, Message};
use crate::progress::ProgressSink;
use crate::repair::repair;
use crate::{prompts, Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Start,
    Think,
    Observe,
    Output,
}

impl StepKind {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "START" => Some(Self::Start),
            "THINK" => Some(Self::Think),
            "OBSERVE" => Some(Self::Observe),
            "OUTPUT" => Some(Self::Output),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::Think => "THINK",
            Self::Observe => "OBSERVE",
            Self::Output => "OUTPUT",
        };
        f.write_str(name)
    }
}

/// One model reply in the step protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Start(String),
    Think(String),
    Observe(String),
    /// Terminal step; carries the fragment payload as the model sent it.
    Output(Value),
}

impl AgentStep {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Start(_) => StepKind::Start,
            Self::Think(_) => StepKind::Think,
            Self::Observe(_) => StepKind::Observe,
            Self::Output(_) => StepKind::Output,
        }
    }

    /// Parse a raw model reply.
    pub fn parse(reply: &str) -> Result<Self> {
        Self::from_value(&repair(reply)?)
    }

    /// Build a step from a repaired `{step, content}` object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let name = value.get("step").and_then(Value::as_str).unwrap_or_default();
        let kind = StepKind::from_name(name).ok_or_else(|| Error::UnrecoverableFormat {
            reason: format!("unknown step kind {:?}", name),
            cleaned: value.to_string(),
        })?;

        let content = value.get("content").cloned().unwrap_or(Value::Null);
        let text = || match &content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };

        Ok(match kind {
            StepKind::Start => Self::Start(text()),
            StepKind::Think => Self::Think(text()),
            StepKind::Observe => Self::Observe(text()),
            StepKind::Output => Self::Output(content),
        })
    }

    /// Text shown to progress observers.
    pub fn summary(&self) -> String {
        match self {
            Self::Start(s) | Self::Think(s) | Self::Observe(s) => s.clone(),
            Self::Output(_) => "fragment ready".to_string(),
        }
    }
}

/// Append-only conversation sent to the model on every turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
        }
    }

    /// A one-shot request with a single user message.
    pub fn single(user: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(user)],
        }
    }

    /// The transcript extended by one assistant turn.
    pub fn with_assistant(mut self, reply: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(reply));
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Outcome of feeding one reply into the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Non-terminal step; continue with the extended transcript.
    Continue {
        transcript: Transcript,
        step: AgentStep,
    },
    /// OUTPUT reached; the raw fragment payload.
    Output(Value),
    /// The reply could not be understood.
    Abort(String),
}

/// Advance the conversation by one model reply.
pub fn advance(transcript: Transcript, reply: &str) -> Turn {
    match AgentStep::parse(reply) {
        Ok(AgentStep::Output(payload)) => Turn::Output(payload),
        Ok(step) => Turn::Continue {
            transcript: transcript.with_assistant(reply),
            step,
        },
        Err(e) => Turn::Abort(e.to_string()),
    }
}

/// What the loop is asked to do with each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentTask {
    /// Merge relevant inspiration code into the user's site.
    Enhance,
    /// Reproduce the captured page as clean static code.
    Clone,
}

/// Drives one chunk through the step protocol until OUTPUT.
pub struct AgentLoop {
    model: Arc<dyn LanguageModel>,
    sink: Arc<dyn ProgressSink>,
    task: AgentTask,
    max_turns: usize,
    timeout: Duration,
}

impl AgentLoop {
    pub fn new(model: Arc<dyn LanguageModel>, sink: Arc<dyn ProgressSink>, task: AgentTask) -> Self {
        Self {
            model,
            sink,
            task,
            max_turns: 12,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the loop for one chunk. Failures yield the empty fragment.
    pub async fn run(&self, chunk: &Chunk, query: &str, user_site: &str) -> Fragment {
        let mut transcript = Transcript::new(
            prompts::agent_system(self.task == AgentTask::Clone),
            prompts::agent_user(query, user_site, &chunk.text),
        );

        for turn in 0..self.max_turns {
            let reply = match self.call(transcript.messages()).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(chunk = chunk.index, turn, error = %e, "model call failed");
                    self.sink
                        .emit(&format!("[chunk {}] model call failed, skipping", chunk.index));
                    return Fragment::default();
                }
            };

            match advance(transcript, &reply) {
                Turn::Continue {
                    transcript: next,
                    step,
                } => {
                    debug!(chunk = chunk.index, turn, step = %step.kind(), "agent step");
                    self.sink.emit(&format!(
                        "[chunk {}] {}: {}",
                        chunk.index,
                        step.kind(),
                        step.summary()
                    ));
                    transcript = next;
                }
                Turn::Output(payload) => {
                    self.sink
                        .emit(&format!("[chunk {}] OUTPUT received", chunk.index));
                    return self.correct(chunk.index, &payload).await;
                }
                Turn::Abort(reason) => {
                    warn!(chunk = chunk.index, turn, %reason, "unparsable agent reply");
                    self.sink.emit(&format!(
                        "[chunk {}] unreadable reply, skipping",
                        chunk.index
                    ));
                    return Fragment::default();
                }
            }
        }

        warn!(chunk = chunk.index, max_turns = self.max_turns, "turn limit reached");
        self.sink.emit(&format!(
            "[chunk {}] no OUTPUT after {} turns, skipping",
            chunk.index, self.max_turns
        ));
        Fragment::default()
    }

    async fn call(&self, messages: &[Message]) -> Result<String> {
        complete_with_timeout(self.model.as_ref(), messages, self.timeout).await
    }

    /// Re-emit the OUTPUT payload as clean JSON, falling back to the payload itself.
    async fn correct(&self, index: usize, payload: &Value) -> Fragment {
        let text = match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let request = Transcript::single(prompts::correction(&text));
        match self.call(request.messages()).await.and_then(|r| repair(&r)) {
            Ok(value) => Fragment::from_value(&value),
            Err(e) => {
                debug!(chunk = index, error = %e, "correction failed, using raw payload");
                match payload {
                    Value::Object(_) => Fragment::from_value(payload),
                    _ => match repair(&text) {
                        Ok(value) => Fragment::from_value(&value),
                        Err(e) => {
                            warn!(chunk = index, error = %e, "OUTPUT payload unreadable");
                            Fragment::default()
                        }
                    },
                }
            }
        }
    }
}
