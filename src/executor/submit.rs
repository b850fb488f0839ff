use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::InjectorConfig;
use crate::dom::{DomEvent, Document};
use crate::perception::locator::LocatorList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Clicked { attempts: u32 },
    /// No attempt ever located the control.
    NotFound { attempts: u32 },
    /// The control was located but never enabled.
    StayedDisabled { attempts: u32 },
}

impl SubmitOutcome {
    pub fn is_submitted(self) -> bool {
        matches!(self, SubmitOutcome::Clicked { .. })
    }

    pub fn attempts(self) -> u32 {
        match self {
            SubmitOutcome::Clicked { attempts }
            | SubmitOutcome::NotFound { attempts }
            | SubmitOutcome::StayedDisabled { attempts } => attempts,
        }
    }
}

/// Clicks the submit control, retrying a bounded number of times while it is
/// missing or disabled.
pub struct SubmissionTrigger<'a> {
    locators: &'a LocatorList,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<'a> SubmissionTrigger<'a> {
    pub fn new(locators: &'a LocatorList, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            locators,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(config: &'a InjectorConfig) -> Self {
        Self::new(
            &config.locators.submit,
            config.timing.submit_max_attempts,
            config.timing.submit_retry_delay(),
        )
    }

    pub async fn submit(&self, doc: &dyn Document) -> SubmitOutcome {
        let mut seen_disabled = false;

        for attempt in 1..=self.max_attempts {
            match self.locators.resolve(doc, None) {
                Some(el) if !doc.is_disabled(el) => {
                    doc.dispatch_event(
                        el,
                        DomEvent::Click {
                            bubbles: true,
                            cancelable: true,
                        },
                    );
                    tracing::info!(attempt, "submit control clicked");
                    return SubmitOutcome::Clicked { attempts: attempt };
                }
                Some(_) => {
                    seen_disabled = true;
                    tracing::debug!(attempt, max = self.max_attempts, "submit control disabled");
                }
                None => {
                    tracing::debug!(attempt, max = self.max_attempts, "submit control not found");
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        let outcome = if seen_disabled {
            SubmitOutcome::StayedDisabled {
                attempts: self.max_attempts,
            }
        } else {
            SubmitOutcome::NotFound {
                attempts: self.max_attempts,
            }
        };
        tracing::warn!(
            locators = %self.locators,
            attempts = self.max_attempts,
            outcome = ?outcome,
            "submit attempts exhausted"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dom::{ElementSpec, MemoryDocument};

    const DELAY: Duration = Duration::from_millis(200);

    fn locators() -> LocatorList {
        LocatorList::new(["button.send-button", "button[aria-label*=Send]"])
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_enabled_control_once() {
        let doc = MemoryDocument::new("https://app.test/");
        let button = doc.append(doc.body(), ElementSpec::new("button").attr("aria-label", "Send"));
        let list = locators();

        let outcome = SubmissionTrigger::new(&list, 3, DELAY).submit(&doc).await;
        assert_eq!(outcome, SubmitOutcome::Clicked { attempts: 1 });
        assert_eq!(doc.click_count(button), 1);
        assert_eq!(
            doc.events(),
            vec![(button, DomEvent::Click { bubbles: true, cancelable: true })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn absent_control_exhausts_attempts() {
        let doc = MemoryDocument::new("https://app.test/");
        let list = locators();

        let started = tokio::time::Instant::now();
        let outcome = SubmissionTrigger::new(&list, 3, DELAY).submit(&doc).await;
        assert_eq!(outcome, SubmitOutcome::NotFound { attempts: 3 });
        assert!(!outcome.is_submitted());
        // Two gaps between three attempts, no trailing wait.
        assert_eq!(started.elapsed(), DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_control_is_never_clicked() {
        let doc = MemoryDocument::new("https://app.test/");
        let button = doc.append(
            doc.body(),
            ElementSpec::new("button")
                .class("send-button")
                .attr("aria-disabled", "true"),
        );
        let list = locators();

        let started = tokio::time::Instant::now();
        let outcome = SubmissionTrigger::new(&list, 5, DELAY).submit(&doc).await;
        assert_eq!(outcome, SubmitOutcome::StayedDisabled { attempts: 5 });
        assert_eq!(outcome.attempts(), 5);
        assert_eq!(started.elapsed(), DELAY * 4);
        assert_eq!(doc.click_count(button), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_once_control_becomes_enabled() {
        let doc = Arc::new(MemoryDocument::new("https://app.test/"));
        let button = doc.append(
            doc.body(),
            ElementSpec::new("button").class("send-button").attr("disabled", ""),
        );
        {
            let doc = doc.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                doc.remove_attribute(button, "disabled");
            });
        }
        let list = locators();

        let outcome = SubmissionTrigger::new(&list, 3, DELAY).submit(doc.as_ref()).await;
        assert_eq!(outcome, SubmitOutcome::Clicked { attempts: 2 });
        assert_eq!(doc.click_count(button), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_control_is_found_on_a_retry() {
        let doc = Arc::new(MemoryDocument::new("https://app.test/"));
        let late = {
            let doc = doc.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                doc.append(doc.body(), ElementSpec::new("button").class("send-button"))
            })
        };
        let list = locators();

        let outcome = SubmissionTrigger::new(&list, 3, DELAY).submit(doc.as_ref()).await;
        assert_eq!(outcome, SubmitOutcome::Clicked { attempts: 3 });
        assert_eq!(doc.click_count(late.await.unwrap()), 1);
    }

    #[test]
    fn zero_attempts_is_treated_as_one() {
        let list = locators();
        let trigger = SubmissionTrigger::new(&list, 0, DELAY);
        assert_eq!(trigger.max_attempts, 1);
    }
}
