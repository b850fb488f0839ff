use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, ElementRef};

/// Ordered fallback selectors for one target. Order is preference: several
/// entries may describe different versions of the same UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocatorList(Vec<String>);

impl LocatorList {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(selectors.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First element matching any entry, trying entries in list order.
    /// `root` scopes the search; `None` searches the whole document.
    pub fn resolve(&self, doc: &dyn Document, root: Option<ElementRef>) -> Option<ElementRef> {
        for selector in &self.0 {
            match doc.query_selector(root, selector) {
                Ok(Some(el)) => return Some(el),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(selector = %selector, error = %e, "skipping unusable locator");
                }
            }
        }
        None
    }
}

impl fmt::Display for LocatorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementSpec, MemoryDocument};

    #[test]
    fn earlier_entries_win_over_document_order() {
        let doc = MemoryDocument::new("https://app.test/");
        let textarea = doc.append(doc.body(), ElementSpec::new("textarea"));
        let editor = doc.append(
            doc.body(),
            ElementSpec::new("div").attr("contenteditable", "true"),
        );

        let list = LocatorList::new(["div[contenteditable=true]", "textarea"]);
        assert_eq!(list.resolve(&doc, None), Some(editor));

        let list = LocatorList::new(["textarea", "div[contenteditable=true]"]);
        assert_eq!(list.resolve(&doc, None), Some(textarea));
    }

    #[test]
    fn falls_through_missing_and_invalid_entries() {
        let doc = MemoryDocument::new("https://app.test/");
        let button = doc.append(doc.body(), ElementSpec::new("button").class("send-button"));
        let list = LocatorList::new(["button[", "button.old-send", "button.send-button"]);
        assert_eq!(list.resolve(&doc, None), Some(button));
    }

    #[test]
    fn root_scopes_the_search() {
        let doc = MemoryDocument::new("https://app.test/");
        doc.append(doc.body(), ElementSpec::new("button").id("outside"));
        let form = doc.append(doc.body(), ElementSpec::new("form"));
        let inside = doc.append(form, ElementSpec::new("button").id("inside"));

        let list = LocatorList::new(["button"]);
        assert_eq!(list.resolve(&doc, Some(form)), Some(inside));
        assert_ne!(list.resolve(&doc, None), Some(inside));
    }

    #[test]
    fn nothing_matches() {
        let doc = MemoryDocument::new("https://app.test/");
        assert_eq!(LocatorList::new(["textarea"]).resolve(&doc, None), None);
        assert_eq!(LocatorList::default().resolve(&doc, None), None);
    }

    #[test]
    fn displays_as_bracketed_list() {
        let list = LocatorList::new(["a", "b.c"]);
        assert_eq!(list.to_string(), "[a, b.c]");
    }
}
