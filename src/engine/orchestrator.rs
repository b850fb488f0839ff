use std::sync::Arc;
use std::time::Duration;

use crate::channel::url::{cleanup, extract_prompt};
use crate::config::{InjectorConfig, RuntimeMode};
use crate::dom::Document;
use crate::engine::state::{AbortReason, EntryPoint, InjectionState, RunReport};
use crate::errors::InjectorError;
use crate::executor::submit::SubmissionTrigger;
use crate::executor::text_input::inject_text;
use crate::perception::readiness::{MutationObserver, ReadinessWaiter};
use crate::perception::session::SessionGuard;

/// Sequences one injection run against a document and owns the failure policy.
///
/// Steps never overlap: each await settles before the next step starts, and
/// at most one readiness wait is active per run.
pub struct Orchestrator {
    config: Arc<InjectorConfig>,
    doc: Arc<dyn Document>,
    waiter: ReadinessWaiter,
    mode: RuntimeMode,
}

impl Orchestrator {
    pub fn new(doc: Arc<dyn Document>, config: Arc<InjectorConfig>, mode: RuntimeMode) -> Self {
        let waiter = ReadinessWaiter::for_document(doc.as_ref());
        tracing::debug!(observer = waiter.observer_name(), mode = ?mode, "orchestrator ready");
        Self {
            config,
            doc,
            waiter,
            mode,
        }
    }

    /// Uses `observer` instead of probing the document for one.
    pub fn with_observer(
        doc: Arc<dyn Document>,
        config: Arc<InjectorConfig>,
        mode: RuntimeMode,
        observer: Arc<dyn MutationObserver>,
    ) -> Self {
        Self {
            config,
            doc,
            waiter: ReadinessWaiter::new(observer),
            mode,
        }
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// Page-load entry: prompt from the address, session check, delivery,
    /// then address cleanup on every path except "no prompt" and "signed out".
    pub async fn run_from_url(&self) -> RunReport {
        let mut report = RunReport::new(EntryPoint::Url);
        let param = self.config.prompt_param.as_str();
        let location = self.doc.location();

        let Some(prompt) = extract_prompt(&location, param) else {
            tracing::debug!(param, "no prompt in address");
            report.advance(InjectionState::AbortedNoPrompt);
            return report.finish();
        };
        report.advance(InjectionState::PromptFound);
        tracing::info!(
            run_id = %report.run_id,
            chars = prompt.chars().count(),
            "prompt found in address"
        );

        let session = SessionGuard::new(&self.config.session).classify(&location, self.doc.as_ref());
        report.session = Some(session);
        if session.blocks_injection() {
            tracing::warn!(
                run_id = %report.run_id,
                location = %location,
                "signed out; keeping the prompt in the address for a retry"
            );
            report.abort(AbortReason::LoggedOut, "target page is a sign-in page");
            return report.finish();
        }
        report.advance(InjectionState::SessionChecked);

        self.deliver(&prompt, &mut report).await;

        report.cleanup_ran = true;
        cleanup(self.doc.as_ref(), param);
        if report.state() == InjectionState::Submitted {
            report.advance(InjectionState::CleanedUp);
        }
        report.finish()
    }

    /// Message entry: starts at the readiness wait, leaves the address alone.
    pub async fn run_from_message(&self, prompt: &str) -> RunReport {
        let mut report = RunReport::new(EntryPoint::Message);
        if prompt.is_empty() {
            report.advance(InjectionState::AbortedNoPrompt);
            return report.finish();
        }
        report.advance(InjectionState::PromptFound);
        self.deliver(prompt, &mut report).await;
        report.finish()
    }

    /// Readiness wait, text injection, submission. Leaves the report in
    /// `Submitted` or `AbortedError`.
    async fn deliver(&self, prompt: &str, report: &mut RunReport) {
        let doc = self.doc.as_ref();
        let timing = &self.config.timing;
        let input_locators = &self.config.locators.input;

        let input = match self
            .waiter
            .wait_for(doc, input_locators, timing.readiness_timeout())
            .await
        {
            Ok(el) => el,
            Err(e) => {
                tracing::warn!(run_id = %report.run_id, error = %e, "input never became ready");
                report.abort(AbortReason::ElementTimeout, e.to_string());
                return;
            }
        };
        report.advance(InjectionState::InputReady);

        self.settle(timing.pre_injection_delay()).await;

        match inject_text(doc, input, prompt) {
            Some(tier) => {
                report.injection_tier = Some(tier);
                report.advance(InjectionState::Injected);
            }
            None => {
                tracing::warn!(
                    run_id = %report.run_id,
                    locators = %input_locators,
                    "input rejected the prompt"
                );
                let e = InjectorError::InjectionFailed(format!(
                    "no injection strategy took effect on {input_locators}"
                ));
                report.abort(AbortReason::InjectionFailed, e.to_string());
                return;
            }
        }

        self.settle(timing.post_injection_delay()).await;

        // The text is visible either way; a failed submit is left to the user.
        let outcome = SubmissionTrigger::from_config(&self.config).submit(doc).await;
        if !outcome.is_submitted() {
            tracing::warn!(
                run_id = %report.run_id,
                locators = %self.config.locators.submit,
                attempts = outcome.attempts(),
                "prompt injected but not submitted"
            );
        }
        report.submit = Some(outcome);
        report.advance(InjectionState::Submitted);
    }

    async fn settle(&self, delay: Duration) {
        if self.mode == RuntimeMode::Live && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
