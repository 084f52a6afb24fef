//! The control loop — a single-session, strictly sequential state machine.
//!
//! One session drives one conversation at a time: assemble context, call the
//! provider, parse the response, dispatch the tool, persist, repeat. The
//! loop runs autonomously between pause points; the only human touchpoints
//! are the two designated pauses (clarifying question, no-tool turn) and a
//! single confirmation of the very first proposed action of a task.
//!
//! ```text
//! AwaitingUserInput --submit--> ModelCallPending --parse--> DispatchingTool
//!        ^                          |      \                    |
//!        |                          |       \-- completion --> Completed
//!        +-- pause / question ------+        \-- bad parse --> Failed
//!                                             \-- provider err -> Failed
//! ```

use std::sync::Arc;

use codecrafter_core::error::ProviderError;
use codecrafter_core::memory::ConversationStore;
use codecrafter_core::provider::{ChatTurn, Provider};
use codecrafter_core::tool::{
    DispatchOutcome, ToolInvocation, ToolRegistry, ASK_FOLLOWUP_QUESTION, ATTEMPT_COMPLETION,
};
use codecrafter_core::turn::{
    frame_tool_error, frame_tool_success, normalize_tool_framing, TurnRole,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::ContextRetriever;
use crate::parser::parse_response;
use crate::prompt::system_prompt;

const COMPLETION_SUMMARY_LEN: usize = 200;

/// Loop states. `Completed` and `Failed` are terminal for the current task;
/// a fresh `submit` starts the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    ModelCallPending,
    DispatchingTool,
    Completed,
    Failed,
}

/// What the loop surfaced at a stopping or reporting point.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The model produced reasoning with no action — a valid pause.
    Pause { thinking: String },

    /// The model asked the user a clarifying question.
    Question {
        thinking: String,
        question: String,
        options: Vec<String>,
    },

    /// The first action of a task, awaiting the one pre-loop confirmation.
    ActionProposed {
        thinking: String,
        invocation: ToolInvocation,
    },

    /// A tool was dispatched; the loop is ready for the next model call.
    Acted {
        thinking: String,
        invocation: ToolInvocation,
        outcome: DispatchOutcome,
    },

    /// The model declared the task complete.
    Completed { thinking: String, result: String },
}

/// Unrecoverable errors that end the current autonomous run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Could not parse model output: {reason}\nRaw response:\n{raw}")]
    Parse { reason: String, raw: String },

    #[error("Loop is in state {state:?}, which does not accept {operation}")]
    InvalidState {
        state: LoopState,
        operation: &'static str,
    },
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Model override passed to the provider (None = provider default).
    pub model: Option<String>,
    /// Maximum turns loaded per model call.
    pub history_limit: usize,
    /// Upper bound on model calls per task; exceeding it pauses the loop.
    pub max_iterations: u32,
    /// Whether the persistent store is consulted for history.
    pub memory_enabled: bool,
    /// Whether the first proposed action of a task needs confirmation.
    pub require_confirmation: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: None,
            history_limit: 50,
            max_iterations: 25,
            memory_enabled: true,
            require_confirmation: true,
        }
    }
}

/// One interactive session: exactly one conversation advanced at a time.
pub struct Session {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    retriever: ContextRetriever,
    options: SessionOptions,
    system_prompt: String,

    state: LoopState,
    /// Session-local history fallback for when the store is unavailable or
    /// memory is disabled. Holds raw (unnormalized) content, like the store.
    fallback_history: Vec<(TurnRole, String)>,
    /// The first action of the task, parked until the user confirms it.
    pending: Option<(String, ToolInvocation)>,
    /// Set once the task's first action has been confirmed (or confirmation
    /// is disabled); later actions run without asking.
    task_started: bool,
    /// Model calls made for the current task.
    iterations: u32,
}

impl Session {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        retriever: ContextRetriever,
        options: SessionOptions,
    ) -> Self {
        let system_prompt = system_prompt(&registry);
        Self {
            provider,
            registry,
            store,
            retriever,
            options,
            system_prompt,
            state: LoopState::AwaitingUserInput,
            fallback_history: Vec::new(),
            pending: None,
            task_started: false,
            iterations: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Feed fresh user text into the loop.
    ///
    /// Valid from `AwaitingUserInput` and from the terminal states (which a
    /// new task exits). The input is context-enriched, persisted, and one
    /// model call is made; the returned outcome says where the loop stopped
    /// or, for `Acted`, that `step()` should be called to continue.
    pub async fn submit(&mut self, user_text: &str) -> Result<TurnOutcome, AgentError> {
        if self.state == LoopState::ModelCallPending || self.state == LoopState::DispatchingTool {
            return Err(AgentError::InvalidState {
                state: self.state,
                operation: "submit",
            });
        }

        // A new task after completion/failure starts with a clean slate.
        if self.state == LoopState::Completed || self.state == LoopState::Failed {
            self.task_started = false;
            self.pending = None;
        }
        self.iterations = 0;

        let enriched = self.retriever.enrich(user_text).await;
        self.record_turn(TurnRole::User, &enriched, None, None, None)
            .await;

        self.state = LoopState::ModelCallPending;
        self.advance().await
    }

    /// Continue the autonomous loop after an `Acted` outcome.
    pub async fn step(&mut self) -> Result<TurnOutcome, AgentError> {
        if self.state != LoopState::ModelCallPending {
            return Err(AgentError::InvalidState {
                state: self.state,
                operation: "step",
            });
        }
        self.advance().await
    }

    /// Confirm the pending first action of the task and dispatch it.
    pub async fn approve_pending(&mut self) -> Result<TurnOutcome, AgentError> {
        let Some((thinking, invocation)) = self.pending.take() else {
            return Err(AgentError::InvalidState {
                state: self.state,
                operation: "approve_pending",
            });
        };
        self.task_started = true;
        Ok(self.dispatch_and_record(thinking, invocation).await)
    }

    /// Decline the pending first action. History is kept as-is: the model
    /// turn proposing the action stays recorded, and the loop waits for the
    /// user's next message.
    pub fn decline_pending(&mut self) {
        if self.pending.take().is_some() {
            info!("First action declined by user; keeping history, awaiting input");
            self.state = LoopState::AwaitingUserInput;
        }
    }

    /// One model call plus its branch. Re-entered via `step()` after tool
    /// dispatches, so the machine is observable between iterations.
    async fn advance(&mut self) -> Result<TurnOutcome, AgentError> {
        self.iterations += 1;
        if self.iterations > self.options.max_iterations {
            warn!(
                iterations = self.iterations,
                "Max iterations reached, pausing for user guidance"
            );
            self.state = LoopState::AwaitingUserInput;
            return Ok(TurnOutcome::Pause {
                thinking: "Reached the maximum number of autonomous steps for this task. \
                           Please review progress and provide further guidance."
                    .into(),
            });
        }

        self.state = LoopState::ModelCallPending;
        let history = self.build_history().await;

        let completion = match self
            .provider
            .generate(
                &history,
                self.options.model.as_deref(),
                Some(&self.system_prompt),
            )
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                self.state = LoopState::Failed;
                return Err(AgentError::Provider(e));
            }
        };

        self.record_turn(TurnRole::Model, &completion.content, None, None, None)
            .await;

        let parsed = match parse_response(&completion.content) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.state = LoopState::Failed;
                let codecrafter_core::error::ParseError::Malformed { reason } = e;
                return Err(AgentError::Parse {
                    reason,
                    raw: completion.content,
                });
            }
        };

        let Some(invocation) = parsed.invocation else {
            debug!("Model paused with no action");
            self.state = LoopState::AwaitingUserInput;
            return Ok(TurnOutcome::Pause {
                thinking: parsed.thinking,
            });
        };

        match invocation.name.as_str() {
            ASK_FOLLOWUP_QUESTION => {
                let question = invocation
                    .parameters
                    .get("question")
                    .cloned()
                    .unwrap_or_else(|| "No question found.".into());
                let options = invocation
                    .parameters
                    .get("options")
                    .map(|raw| {
                        raw.split(',')
                            .map(|o| o.trim().to_string())
                            .filter(|o| !o.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();

                self.state = LoopState::AwaitingUserInput;
                Ok(TurnOutcome::Question {
                    thinking: parsed.thinking,
                    question,
                    options,
                })
            }

            ATTEMPT_COMPLETION => {
                let result = invocation
                    .parameters
                    .get("result")
                    .cloned()
                    .unwrap_or_else(|| "Task completed".into());

                let summary: String = result.chars().take(COMPLETION_SUMMARY_LEN).collect();
                if self.options.memory_enabled {
                    if let Err(e) = self.store.complete(&summary).await {
                        warn!("Failed to finalize conversation: {e}");
                    }
                }

                // The conversation is finished either way; the next task
                // starts from an empty session buffer.
                self.fallback_history.clear();
                self.task_started = false;
                self.state = LoopState::Completed;
                info!("Task completed");
                Ok(TurnOutcome::Completed {
                    thinking: parsed.thinking,
                    result,
                })
            }

            _ => {
                if self.options.require_confirmation && !self.task_started {
                    self.pending = Some((parsed.thinking.clone(), invocation.clone()));
                    self.state = LoopState::AwaitingUserInput;
                    return Ok(TurnOutcome::ActionProposed {
                        thinking: parsed.thinking,
                        invocation,
                    });
                }
                self.task_started = true;
                Ok(self.dispatch_and_record(parsed.thinking, invocation).await)
            }
        }
    }

    /// Dispatch one invocation (at most once), record the framed result, and
    /// leave the loop ready for the next model call. A caught tool error is
    /// fed back as text — the loop stays autonomous.
    async fn dispatch_and_record(
        &mut self,
        thinking: String,
        invocation: ToolInvocation,
    ) -> TurnOutcome {
        self.state = LoopState::DispatchingTool;
        info!(tool = %invocation.name, "Dispatching tool");

        let outcome = self.registry.dispatch(&invocation).await;

        let framed = match &outcome {
            DispatchOutcome::Success(text) => frame_tool_success(&invocation.name, text),
            DispatchOutcome::Error(text) => {
                warn!(tool = %invocation.name, "Tool returned error result");
                frame_tool_error(&invocation.name, text)
            }
        };
        self.record_turn(
            TurnRole::User,
            &framed,
            Some(&invocation.name),
            Some(&invocation.parameters),
            Some(outcome.text()),
        )
        .await;

        match &outcome {
            DispatchOutcome::Success(_) => {
                self.retriever
                    .record_tool_outcome(&invocation.name, &invocation.parameters, true)
                    .await;
            }
            DispatchOutcome::Error(text) => {
                self.retriever.record_error_solution(&invocation, text).await;
            }
        }

        self.state = LoopState::ModelCallPending;
        TurnOutcome::Acted {
            thinking,
            invocation,
            outcome,
        }
    }

    /// Persist a turn best-effort and mirror it into the session buffer.
    async fn record_turn(
        &mut self,
        role: TurnRole,
        content: &str,
        tool_name: Option<&str>,
        tool_parameters: Option<&std::collections::BTreeMap<String, String>>,
        tool_result: Option<&str>,
    ) {
        if self.options.memory_enabled {
            if let Err(e) = self
                .store
                .save_turn(role, content, tool_name, tool_parameters, tool_result)
                .await
            {
                warn!("Failed to persist turn: {e}");
            }
        }
        self.fallback_history.push((role, content.to_string()));
    }

    /// Assemble the provider history: the persistent store when memory is
    /// enabled and has content, otherwise the session buffer. Both paths
    /// normalize tool-result framing to plain text.
    async fn build_history(&self) -> Vec<ChatTurn> {
        if self.options.memory_enabled {
            match self.store.history(self.options.history_limit).await {
                Ok(turns) if !turns.is_empty() => {
                    return turns
                        .into_iter()
                        .map(|t| ChatTurn {
                            role: t.role,
                            // Already normalized by the store; normalizing
                            // again is a no-op by design.
                            text: normalize_tool_framing(&t.content),
                        })
                        .collect();
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to load history, using session buffer: {e}"),
            }
        }

        self.fallback_history
            .iter()
            .map(|(role, content)| ChatTurn {
                role: *role,
                text: normalize_tool_framing(content),
            })
            .collect()
    }
}
