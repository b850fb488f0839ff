use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

use scraper::{Html, Selector};
use tokio::sync::broadcast;

use crate::dom::{DomEvent, Document, EditCommand, ElementRef, MutationBatch};
use crate::errors::{InjectorError, InjectorResult};

const MUTATION_CAPACITY: usize = 64;
const ROOT: usize = 0;
const BODY: usize = 1;
/// Carries the arena index of each element through a rendered snapshot.
const NODE_ATTR: &str = "data-autoprompt-node";

/// Declarative element description used to build a [`MemoryDocument`].
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        let name = name.to_lowercase();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((name, value.to_string())),
        }
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(mut self, class: &str) -> Self {
        match self.attributes.iter_mut().find(|(k, _)| *k == "class") {
            Some((_, v)) => {
                v.push(' ');
                v.push_str(class);
            }
            None => self.attributes.push(("class".into(), class.to_string())),
        }
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    /// What the page's own reactive framework believes the content is.
    model: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug)]
struct Inner {
    nodes: Vec<Node>,
    location: String,
    history_replacements: u32,
    focused: Option<usize>,
    selection: Option<usize>,
    exec_commands_enabled: bool,
    events: Vec<(ElementRef, DomEvent)>,
}

fn escape_html(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn parse_selector(selector: &str) -> InjectorResult<Selector> {
    Selector::parse(selector).map_err(|e| InjectorError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn node_index(el: scraper::ElementRef<'_>) -> Option<usize> {
    el.value().attr(NODE_ATTR)?.parse().ok()
}

impl Inner {
    fn attribute(&self, node: usize, name: &str) -> Option<&str> {
        self.nodes[node]
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn insert(&mut self, parent: usize, spec: ElementSpec) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            tag: spec.tag,
            attributes: spec.attributes,
            text: spec.text,
            model: String::new(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(idx);
        for child in spec.children {
            self.insert(idx, child);
        }
        self.nodes[idx].model = self.text_of(idx);
        idx
    }

    fn detach(&mut self, node: usize) {
        if let Some(parent) = self.nodes[node].parent.take() {
            self.nodes[parent].children.retain(|&c| c != node);
        }
    }

    /// HTML snapshot of everything still attached to the root, each element
    /// tagged with its arena index.
    fn render(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>");
        self.render_node(ROOT, &mut out);
        out
    }

    fn render_node(&self, node: usize, out: &mut String) {
        let n = &self.nodes[node];
        out.push('<');
        out.push_str(&n.tag);
        for (name, value) in n.attributes.iter().filter(|(k, _)| k != NODE_ATTR) {
            let _ = write!(out, " {name}=\"");
            escape_html(value, out);
            out.push('"');
        }
        let _ = write!(out, " {NODE_ATTR}=\"{node}\">");
        escape_html(&n.text, out);
        for &child in &n.children {
            self.render_node(child, out);
        }
        let _ = write!(out, "</{}>", n.tag);
    }

    fn text_of(&self, node: usize) -> String {
        let mut out = self.nodes[node].text.clone();
        for &child in &self.nodes[node].children {
            out.push_str(&self.text_of(child));
        }
        out
    }

    fn replace_text(&mut self, node: usize, text: &str) {
        for child in std::mem::take(&mut self.nodes[node].children) {
            self.nodes[child].parent = None;
        }
        self.nodes[node].text = text.to_string();
    }

    fn is_editable(&self, node: usize) -> bool {
        matches!(self.nodes[node].tag.as_str(), "textarea" | "input")
            || matches!(self.attribute(node, "contenteditable"), Some("" | "true"))
    }
}

/// Headless, thread-safe document.
///
/// Emulates the parts of a browser page the injector touches: a queryable
/// element tree, focus and selection, the insert-text editing command, a
/// reactive model that only follows trusted edits and `input` events, the
/// history slot, and subtree mutation notifications.
pub struct MemoryDocument {
    inner: Mutex<Inner>,
    mutations: Option<broadcast::Sender<MutationBatch>>,
}

impl MemoryDocument {
    /// Empty `<html><body></body></html>` page at `location`.
    pub fn new(location: &str) -> Self {
        let (tx, _) = broadcast::channel(MUTATION_CAPACITY);
        Self::build(location, Some(tx))
    }

    /// Same as [`MemoryDocument::new`] for hosts without mutation notifications.
    pub fn without_mutation_feed(location: &str) -> Self {
        Self::build(location, None)
    }

    fn build(location: &str, mutations: Option<broadcast::Sender<MutationBatch>>) -> Self {
        let mut inner = Inner {
            nodes: vec![Node {
                tag: "html".into(),
                attributes: Vec::new(),
                text: String::new(),
                model: String::new(),
                parent: None,
                children: Vec::new(),
            }],
            location: location.to_string(),
            history_replacements: 0,
            focused: None,
            selection: None,
            exec_commands_enabled: true,
            events: Vec::new(),
        };
        inner.insert(ROOT, ElementSpec::new("body"));
        Self {
            inner: Mutex::new(inner),
            mutations,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, batch: MutationBatch) {
        if let Some(tx) = &self.mutations {
            // No subscribers is the normal case.
            let _ = tx.send(batch);
        }
    }

    pub fn body(&self) -> ElementRef {
        ElementRef(BODY)
    }

    /// Appends `spec` (and its children) under `parent`, notifying observers once.
    pub fn append(&self, parent: ElementRef, spec: ElementSpec) -> ElementRef {
        let idx = self.lock().insert(parent.0, spec);
        self.publish(MutationBatch::ChildList { target: parent });
        ElementRef(idx)
    }

    pub fn remove(&self, el: ElementRef) {
        let parent = {
            let mut inner = self.lock();
            let parent = inner.nodes[el.0].parent;
            inner.detach(el.0);
            parent
        };
        if let Some(parent) = parent {
            self.publish(MutationBatch::ChildList {
                target: ElementRef(parent),
            });
        }
    }

    pub fn set_attribute(&self, el: ElementRef, name: &str, value: &str) {
        let name = name.to_lowercase();
        {
            let mut inner = self.lock();
            let attrs = &mut inner.nodes[el.0].attributes;
            match attrs.iter_mut().find(|(k, _)| *k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.clone(), value.to_string())),
            }
        }
        self.publish(MutationBatch::Attributes { target: el, name });
    }

    pub fn remove_attribute(&self, el: ElementRef, name: &str) {
        let name = name.to_lowercase();
        self.lock().nodes[el.0].attributes.retain(|(k, _)| *k != name);
        self.publish(MutationBatch::Attributes { target: el, name });
    }

    pub fn attribute(&self, el: ElementRef, name: &str) -> Option<String> {
        self.lock().attribute(el.0, name).map(str::to_string)
    }

    /// Makes the editing commands report failure, like a host that lacks them.
    pub fn set_exec_commands_enabled(&self, enabled: bool) {
        self.lock().exec_commands_enabled = enabled;
    }

    pub fn history_replacements(&self) -> u32 {
        self.lock().history_replacements
    }

    pub fn focused(&self) -> Option<ElementRef> {
        self.lock().focused.map(ElementRef)
    }

    /// Content as seen by the page's reactive framework.
    pub fn model_value(&self, el: ElementRef) -> String {
        self.lock().nodes[el.0].model.clone()
    }

    pub fn events(&self) -> Vec<(ElementRef, DomEvent)> {
        self.lock().events.clone()
    }

    pub fn click_count(&self, el: ElementRef) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|(target, ev)| *target == el && matches!(ev, DomEvent::Click { .. }))
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.mutations.as_ref().map_or(0, |tx| tx.receiver_count())
    }
}

impl Document for MemoryDocument {
    fn query_selector(
        &self,
        root: Option<ElementRef>,
        selector: &str,
    ) -> InjectorResult<Option<ElementRef>> {
        let parsed = parse_selector(selector)?;
        let snapshot = Html::parse_document(&self.lock().render());

        let found = match root {
            None => snapshot.select(&parsed).find_map(node_index),
            Some(root) => {
                let scope = parse_selector(&format!("[{NODE_ATTR}=\"{}\"]", root.0))?;
                // A detached root has no descendants to search.
                snapshot
                    .select(&scope)
                    .next()
                    .and_then(|scope| scope.select(&parsed).find_map(node_index))
            }
        };
        Ok(found.map(ElementRef))
    }

    fn is_disabled(&self, el: ElementRef) -> bool {
        let inner = self.lock();
        inner.attribute(el.0, "disabled").is_some()
            || inner
                .attribute(el.0, "aria-disabled")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn text_content(&self, el: ElementRef) -> String {
        self.lock().text_of(el.0)
    }

    fn set_text_content(&self, el: ElementRef, text: &str) {
        self.lock().replace_text(el.0, text);
        self.publish(MutationBatch::CharacterData { target: el });
    }

    fn focus(&self, el: ElementRef) {
        let mut inner = self.lock();
        if inner.focused != Some(el.0) {
            inner.selection = None;
        }
        inner.focused = Some(el.0);
    }

    fn exec_command(&self, command: EditCommand) -> bool {
        let target = {
            let mut inner = self.lock();
            if !inner.exec_commands_enabled {
                return false;
            }
            let Some(focused) = inner.focused else {
                return false;
            };
            if !inner.is_editable(focused) {
                return false;
            }
            match command {
                EditCommand::SelectAll => {
                    inner.selection = Some(focused);
                    return true;
                }
                EditCommand::InsertText(text) => {
                    let el = ElementRef(focused);
                    inner.events.push((el, DomEvent::BeforeInput { data: text.clone() }));
                    if inner.selection.take() == Some(focused) {
                        inner.replace_text(focused, &text);
                    } else {
                        inner.nodes[focused].text.push_str(&text);
                    }
                    inner.nodes[focused].model = inner.text_of(focused);
                    inner.events.push((el, DomEvent::Input { data: text }));
                    el
                }
            }
        };
        self.publish(MutationBatch::CharacterData { target });
        true
    }

    fn dispatch_event(&self, el: ElementRef, event: DomEvent) -> bool {
        let mut inner = self.lock();
        if matches!(event, DomEvent::Input { .. }) {
            inner.nodes[el.0].model = inner.text_of(el.0);
        }
        inner.events.push((el, event));
        true
    }

    fn location(&self) -> String {
        self.lock().location.clone()
    }

    fn replace_location(&self, url: &str) -> InjectorResult<()> {
        let mut inner = self.lock();
        let current = url::Url::parse(&inner.location)?;
        let next = url::Url::parse(url)?;
        if current.origin() != next.origin() {
            return Err(InjectorError::UrlCleanup(format!(
                "cannot replace {} with cross-origin {}",
                inner.location, url
            )));
        }
        inner.location = next.to_string();
        inner.history_replacements += 1;
        Ok(())
    }

    fn mutation_feed(&self) -> Option<broadcast::Sender<MutationBatch>> {
        self.mutations.clone()
    }
}
