// Writes text into a reactive editor. Reactive frameworks ignore raw content
// writes, so the text has to arrive through an edit the framework observes.
use serde::{Deserialize, Serialize};

use crate::dom::{DomEvent, Document, EditCommand, ElementRef};

/// Which strategy got the text in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionTier {
    /// Focus, select all, platform insert-text command.
    EditCommand,
    /// Clear, `beforeinput`, content write, `input`.
    SyntheticEvents,
}

/// Replaces the content of `el` with `text`. `None` means neither tier worked.
pub fn inject_text(doc: &dyn Document, el: ElementRef, text: &str) -> Option<InjectionTier> {
    if insert_via_edit_command(doc, el, text) {
        tracing::debug!(chars = text.chars().count(), "text inserted via edit command");
        return Some(InjectionTier::EditCommand);
    }

    tracing::debug!("insert-text command refused; falling back to synthetic input events");
    if insert_via_synthetic_events(doc, el, text) {
        tracing::debug!(chars = text.chars().count(), "text inserted via synthetic events");
        return Some(InjectionTier::SyntheticEvents);
    }

    tracing::warn!(chars = text.chars().count(), "both injection tiers failed");
    None
}

fn insert_via_edit_command(doc: &dyn Document, el: ElementRef, text: &str) -> bool {
    doc.focus(el);
    if !doc.exec_command(EditCommand::SelectAll) {
        return false;
    }
    doc.exec_command(EditCommand::InsertText(text.to_string()))
}

fn insert_via_synthetic_events(doc: &dyn Document, el: ElementRef, text: &str) -> bool {
    doc.focus(el);
    doc.set_text_content(el, "");
    doc.dispatch_event(
        el,
        DomEvent::BeforeInput {
            data: text.to_string(),
        },
    );
    doc.set_text_content(el, text);
    doc.dispatch_event(
        el,
        DomEvent::Input {
            data: text.to_string(),
        },
    );
    doc.text_content(el) == text
}
