//! Seam between the orchestrator and the host page.
//!
//! Everything the injector knows about the page goes through [`Document`]: it
//! never holds a privileged handle into the target application, only what an
//! observer of the page can see and do.

pub mod memory;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::InjectorResult;

pub use memory::{ElementSpec, MemoryDocument};

/// Opaque handle to one element of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub(crate) usize);

/// Platform text-editing commands (`document.execCommand` in a browser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    SelectAll,
    InsertText(String),
}

/// Synthetic events the injector may dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomEvent {
    /// `beforeinput` with `inputType = insertText`.
    BeforeInput { data: String },
    /// `input` with `inputType = insertText`.
    Input { data: String },
    /// Pointer click.
    Click { bubbles: bool, cancelable: bool },
}

/// One batch of subtree mutations, as a mutation observer would deliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationBatch {
    ChildList { target: ElementRef },
    Attributes { target: ElementRef, name: String },
    CharacterData { target: ElementRef },
}

pub trait Document: Send + Sync {
    /// First element under `root` (whole document when `None`) matching `selector`.
    fn query_selector(
        &self,
        root: Option<ElementRef>,
        selector: &str,
    ) -> InjectorResult<Option<ElementRef>>;

    /// True for a `disabled` attribute or `aria-disabled="true"`.
    fn is_disabled(&self, el: ElementRef) -> bool;

    fn text_content(&self, el: ElementRef) -> String;

    fn set_text_content(&self, el: ElementRef, text: &str);

    fn focus(&self, el: ElementRef);

    /// Runs an editing command against the focused element. Returns the
    /// command's own success flag.
    fn exec_command(&self, command: EditCommand) -> bool;

    /// Returns false when the event was cancelled.
    fn dispatch_event(&self, el: ElementRef, event: DomEvent) -> bool;

    /// Current address of the page.
    fn location(&self) -> String;

    /// Rewrites the current history entry. No navigation, no reload.
    fn replace_location(&self, url: &str) -> InjectorResult<()>;

    /// Mutation notifications for the whole body subtree, if the host has any.
    fn mutation_feed(&self) -> Option<broadcast::Sender<MutationBatch>>;
}
