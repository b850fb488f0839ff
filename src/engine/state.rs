use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::submit::SubmitOutcome;
use crate::executor::text_input::InjectionTier;
use crate::perception::session::SessionState;

/// Lifecycle of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionState {
    Idle,
    PromptFound,
    SessionChecked,
    InputReady,
    Injected,
    Submitted,
    CleanedUp,
    AbortedNoPrompt,
    AbortedError,
}

impl InjectionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InjectionState::CleanedUp | InjectionState::AbortedNoPrompt | InjectionState::AbortedError
        )
    }

    /// Message-driven runs skip the session check, so `PromptFound` may go
    /// straight to `InputReady`.
    pub fn can_advance_to(self, next: InjectionState) -> bool {
        use InjectionState::*;
        matches!(
            (self, next),
            (Idle, PromptFound)
                | (Idle, AbortedNoPrompt)
                | (PromptFound, SessionChecked)
                | (PromptFound, InputReady)
                | (PromptFound, AbortedError)
                | (SessionChecked, InputReady)
                | (SessionChecked, AbortedError)
                | (InputReady, Injected)
                | (InputReady, AbortedError)
                | (Injected, Submitted)
                | (Submitted, CleanedUp)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Url,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Sign-in page. The address keeps its prompt for a retry after sign-in.
    LoggedOut,
    ElementTimeout,
    InjectionFailed,
}

/// What happened during one run. Created at the start of the run and handed
/// back at the end; nothing survives between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub entry: EntryPoint,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub states: Vec<InjectionState>,
    pub session: Option<SessionState>,
    pub injection_tier: Option<InjectionTier>,
    pub submit: Option<SubmitOutcome>,
    pub abort: Option<AbortReason>,
    pub error: Option<String>,
    pub cleanup_ran: bool,
}

impl RunReport {
    pub fn new(entry: EntryPoint) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entry,
            started_at: Utc::now(),
            finished_at: None,
            states: vec![InjectionState::Idle],
            session: None,
            injection_tier: None,
            submit: None,
            abort: None,
            error: None,
            cleanup_ran: false,
        }
    }

    pub fn state(&self) -> InjectionState {
        self.states
            .last()
            .copied()
            .unwrap_or(InjectionState::Idle)
    }

    pub fn advance(&mut self, next: InjectionState) {
        let current = self.state();
        debug_assert!(
            current.can_advance_to(next),
            "invalid transition {current:?} -> {next:?}"
        );
        if !current.can_advance_to(next) {
            tracing::error!(run_id = %self.run_id, from = ?current, to = ?next, "invalid state transition");
        }
        tracing::debug!(run_id = %self.run_id, from = ?current, to = ?next, "state transition");
        self.states.push(next);
    }

    pub fn abort(&mut self, reason: AbortReason, error: impl Into<String>) {
        self.abort = Some(reason);
        self.error = Some(error.into());
        self.advance(InjectionState::AbortedError);
    }

    pub fn injected(&self) -> bool {
        self.states.contains(&InjectionState::Injected)
    }

    pub fn visited(&self, state: InjectionState) -> bool {
        self.states.contains(&state)
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        tracing::info!(
            run_id = %self.run_id,
            entry = ?self.entry,
            state = ?self.state(),
            abort = ?self.abort,
            submit = ?self.submit,
            cleanup_ran = self.cleanup_ran,
            "injection run finished"
        );
        self
    }
}
