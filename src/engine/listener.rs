use tokio::sync::{mpsc, oneshot};

use crate::channel::message::{InboundMessage, Reply};
use crate::config::RuntimeMode;
use crate::engine::orchestrator::Orchestrator;
use crate::errors::{InjectorError, InjectorResult};

const INBOX_CAPACITY: usize = 32;

struct Envelope {
    prompt: String,
    reply: oneshot::Sender<Reply>,
}

/// Cloneable sender side of a running [`MessageListener`].
///
/// Liveness and unknown-action replies are answered here, so they never wait
/// behind a run that is still in progress. Only `injectPrompt` is queued.
#[derive(Clone)]
pub struct InjectorHandle {
    tx: mpsc::Sender<Envelope>,
}

impl InjectorHandle {
    /// Posts a raw inbound message and waits for its single reply.
    pub async fn send(&self, payload: serde_json::Value) -> InjectorResult<Reply> {
        if self.tx.is_closed() {
            return Err(InjectorError::Channel("listener is not running".into()));
        }

        let prompt = match InboundMessage::parse(&payload) {
            InboundMessage::InjectPrompt { prompt } => prompt,
            InboundMessage::Ping => return Ok(Reply::alive()),
            InboundMessage::Unrecognized => {
                tracing::debug!(payload = %payload, "unknown action");
                return Ok(Reply::unknown_action());
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                prompt,
                reply: reply_tx,
            })
            .await
            .map_err(|_| InjectorError::Channel("listener is not running".into()))?;
        reply_rx
            .await
            .map_err(|_| InjectorError::Channel("listener dropped the reply".into()))
    }
}

/// Owns the orchestrator and runs queued prompts one at a time, so two runs
/// never interleave on the same page.
pub struct MessageListener {
    orchestrator: Orchestrator,
    rx: mpsc::Receiver<Envelope>,
}

impl MessageListener {
    pub fn new(orchestrator: Orchestrator) -> (Self, InjectorHandle) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        (Self { orchestrator, rx }, InjectorHandle { tx })
    }

    /// In live mode, runs the page-load flow first, then serves queued prompts
    /// until every handle is dropped.
    pub async fn run(mut self) {
        if self.orchestrator.mode() == RuntimeMode::Live {
            self.orchestrator.run_from_url().await;
        }

        while let Some(envelope) = self.rx.recv().await {
            let report = self.orchestrator.run_from_message(&envelope.prompt).await;
            if envelope.reply.send(Reply::injection(report.injected())).is_err() {
                tracing::debug!("message sender went away before the reply");
            }
        }
        tracing::info!("message listener exited");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::time::{Duration, Instant};

    use super::*;
    use crate::channel::message::ReplyStatus;
    use crate::config::InjectorConfig;
    use crate::dom::{Document, ElementRef, ElementSpec, MemoryDocument};

    fn page(url: &str) -> (Arc<MemoryDocument>, ElementRef, ElementRef) {
        let doc = Arc::new(MemoryDocument::new(url));
        doc.append(
            doc.body(),
            ElementSpec::new("a").attr("href", "https://accounts.google.com/SignOutOptions"),
        );
        let editor = doc.append(
            doc.body(),
            ElementSpec::new("div")
                .class("ql-editor")
                .attr("contenteditable", "true"),
        );
        let send = doc.append(doc.body(), ElementSpec::new("button").class("send-button"));
        (doc, editor, send)
    }

    fn spawn(doc: &Arc<MemoryDocument>, mode: RuntimeMode) -> InjectorHandle {
        let doc: Arc<dyn Document> = doc.clone();
        let orchestrator = Orchestrator::new(doc, Arc::new(InjectorConfig::default()), mode);
        let (listener, handle) = MessageListener::new(orchestrator);
        tokio::spawn(listener.run());
        handle
    }

    #[tokio::test(start_paused = true)]
    async fn answers_ping_and_unknown_actions() {
        let (doc, _, _) = page("https://gemini.google.com/app");
        let handle = spawn(&doc, RuntimeMode::Test);

        assert_eq!(handle.send(json!({"action": "ping"})).await.unwrap(), Reply::alive());
        assert_eq!(
            handle.send(json!({"action": "toggleWidth"})).await.unwrap(),
            Reply::Status {
                status: ReplyStatus::UnknownAction
            }
        );
        assert_eq!(
            handle.send(json!({"action": "injectPrompt", "prompt": ""})).await.unwrap(),
            Reply::unknown_action()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inject_prompt_reports_success() {
        let (doc, editor, send) = page("https://gemini.google.com/app");
        let handle = spawn(&doc, RuntimeMode::Test);

        let reply = handle
            .send(json!({"action": "injectPrompt", "prompt": "Summarise this"}))
            .await
            .unwrap();
        assert_eq!(reply, Reply::injection(true));
        assert_eq!(doc.text_content(editor), "Summarise this");
        assert_eq!(doc.click_count(send), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inject_prompt_without_input_reports_failure() {
        let doc = Arc::new(MemoryDocument::new("https://gemini.google.com/app"));
        let handle = spawn(&doc, RuntimeMode::Test);

        let reply = handle
            .send(json!({"action": "injectPrompt", "prompt": "hello"}))
            .await
            .unwrap();
        assert_eq!(reply, Reply::injection(false));
    }

    #[tokio::test(start_paused = true)]
    async fn live_mode_runs_the_address_flow_before_messages() {
        let (doc, editor, send) = page("https://gemini.google.com/app?bg_prompt=From%20the%20omnibox");
        let handle = spawn(&doc, RuntimeMode::Live);

        // The listener only reads its inbox after the page-load run.
        assert_eq!(handle.send(json!({"action": "ping"})).await.unwrap(), Reply::alive());
        assert_eq!(doc.text_content(editor), "From the omnibox");
        assert_eq!(doc.click_count(send), 1);
        assert_eq!(doc.location(), "https://gemini.google.com/app");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_leaves_the_address_alone() {
        let (doc, _, send) = page("https://gemini.google.com/app?bg_prompt=x");
        let handle = spawn(&doc, RuntimeMode::Test);

        assert_eq!(handle.send(json!({"action": "ping"})).await.unwrap(), Reply::alive());
        assert_eq!(doc.click_count(send), 0);
        assert!(doc.location().contains("bg_prompt=x"));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_is_answered_while_a_run_is_pending() {
        // Prompt in the address but no composer: the page-load run sits in its
        // readiness wait for the full timeout.
        let doc = Arc::new(MemoryDocument::new("https://gemini.google.com/app?bg_prompt=hi"));
        let handle = spawn(&doc, RuntimeMode::Live);
        tokio::task::yield_now().await;

        let started = Instant::now();
        assert_eq!(handle.send(json!({"action": "ping"})).await.unwrap(), Reply::alive());
        assert_eq!(
            handle.send(json!({"action": "toggleWidth"})).await.unwrap(),
            Reply::unknown_action()
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn prompts_wait_for_the_run_in_progress() {
        let doc = Arc::new(MemoryDocument::new("https://gemini.google.com/app?bg_prompt=hi"));
        let handle = spawn(&doc, RuntimeMode::Live);
        tokio::task::yield_now().await;

        let started = Instant::now();
        let reply = handle
            .send(json!({"action": "injectPrompt", "prompt": "second"}))
            .await
            .unwrap();
        assert_eq!(reply, Reply::injection(false));
        // Page-load wait, then this message's own wait.
        let timeout = InjectorConfig::default().timing.readiness_timeout();
        assert!(started.elapsed() >= timeout * 2);
    }

    #[tokio::test]
    async fn send_fails_once_listener_is_gone() {
        let doc = Arc::new(MemoryDocument::new("https://gemini.google.com/app"));
        let doc: Arc<dyn Document> = doc;
        let orchestrator =
            Orchestrator::new(doc, Arc::new(InjectorConfig::default()), RuntimeMode::Test);
        let (listener, handle) = MessageListener::new(orchestrator);
        drop(listener);

        assert!(matches!(
            handle.send(json!({"action": "ping"})).await,
            Err(InjectorError::Channel(_))
        ));
    }
}
