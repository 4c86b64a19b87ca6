//! Page seam
//!
//! Everything the adapter does to a chat page goes through [`Page`]. A browser binding
//! implements it against a live DOM; [`HtmlPage`] implements it over a static HTML
//! snapshot and records every action, which is what the CLI dry runs and tests use.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use mosaic_core::Attachment;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("Element {0} no longer exists")]
    StaleHandle(ElementHandle),

    #[error("No element has focus")]
    NoFocus,

    #[error("Page unavailable: {0}")]
    Unavailable(String),
}

/// Opaque reference to an element, valid until the page content is replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the adapter needs to know about a located element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub handle: ElementHandle,
    /// Lower-case tag name
    pub tag: String,
    /// Rich-text surface (`contenteditable`)
    pub editable: bool,
    pub disabled: bool,
    pub class_name: String,
    pub aria_label: Option<String>,
}

impl Element {
    /// Plain form field driven through its value property
    pub fn is_form_field(&self) -> bool {
        matches!(self.tag.as_str(), "textarea" | "input")
    }
}

/// Editing commands applied to the focused element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    SelectAll,
    Delete,
    InsertText(String),
}

/// Synthetic DOM events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticEvent {
    Input,
    Change,
    KeyDown { key: String },
    Paste { files: Vec<Attachment> },
    DragEnter { files: Vec<Attachment> },
    DragOver { files: Vec<Attachment> },
    Drop { files: Vec<Attachment> },
}

impl SyntheticEvent {
    pub fn enter() -> Self {
        SyntheticEvent::KeyDown {
            key: "Enter".to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyntheticEvent::Input => "input",
            SyntheticEvent::Change => "change",
            SyntheticEvent::KeyDown { .. } => "keydown",
            SyntheticEvent::Paste { .. } => "paste",
            SyntheticEvent::DragEnter { .. } => "dragenter",
            SyntheticEvent::DragOver { .. } => "dragover",
            SyntheticEvent::Drop { .. } => "drop",
        }
    }
}

/// Operations on one page
#[async_trait]
pub trait Page: Send + Sync {
    /// All elements matching `selector`, in document order
    async fn query_all(&self, selector: &str) -> Result<Vec<Element>, PageError>;

    async fn parent(&self, element: ElementHandle) -> Result<Option<Element>, PageError>;

    async fn focus(&self, element: ElementHandle) -> Result<(), PageError>;

    /// Apply an editing command to the focused element; false when the page refused it
    async fn exec_command(&self, command: EditCommand) -> Result<bool, PageError>;

    /// Assign through the native value setter, bypassing framework wrappers
    async fn set_native_value(&self, element: ElementHandle, value: &str) -> Result<(), PageError>;

    async fn dispatch(&self, element: ElementHandle, event: SyntheticEvent) -> Result<(), PageError>;

    async fn click(&self, element: ElementHandle) -> Result<(), PageError>;

    /// Counter bumped on every DOM mutation
    fn mutations(&self) -> watch::Receiver<u64>;

    /// Serialized HTML of the current document
    async fn snapshot(&self) -> Result<String, PageError>;
}

/// One recorded page action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Focus(ElementHandle),
    Command(EditCommand),
    SetValue { element: ElementHandle, value: String },
    Event { element: ElementHandle, event: &'static str, files: usize },
    Click(ElementHandle),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Focus(el) => write!(f, "focus {}", el),
            Action::Command(EditCommand::SelectAll) => write!(f, "execCommand selectAll"),
            Action::Command(EditCommand::Delete) => write!(f, "execCommand delete"),
            Action::Command(EditCommand::InsertText(text)) => {
                write!(f, "execCommand insertText ({} chars)", text.chars().count())
            }
            Action::SetValue { element, value } => {
                write!(f, "set value {} ({} chars)", element, value.chars().count())
            }
            Action::Event { element, event, files } if *files > 0 => {
                write!(f, "dispatch {} on {} ({} files)", event, element, files)
            }
            Action::Event { element, event, .. } => write!(f, "dispatch {} on {}", event, element),
            Action::Click(el) => write!(f, "click {}", el),
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    html: String,
    focused: Option<ElementHandle>,
    values: HashMap<ElementHandle, String>,
    journal: Vec<Action>,
}

/// In-memory page over an HTML snapshot
///
/// Handles are document-order element indices. Edits are tracked as per-element
/// values rather than rewriting the markup.
pub struct HtmlPage {
    state: Mutex<PageState>,
    mutations: watch::Sender<u64>,
}

impl HtmlPage {
    pub fn new(html: impl Into<String>) -> Self {
        let html = html.into();
        debug!(bytes = html.len(), "HtmlPage::new: called");
        let (mutations, _) = watch::channel(0);
        Self {
            state: Mutex::new(PageState {
                html,
                ..Default::default()
            }),
            mutations,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PageState>, PageError> {
        self.state
            .lock()
            .map_err(|_| PageError::Unavailable("page state poisoned".to_string()))
    }

    /// Swap in new content, as if the page re-rendered
    pub fn replace(&self, html: impl Into<String>) -> Result<(), PageError> {
        debug!("HtmlPage::replace: called");
        {
            let mut state = self.lock()?;
            state.html = html.into();
            state.focused = None;
            state.values.clear();
        }
        self.mutations.send_modify(|n| *n += 1);
        Ok(())
    }

    /// Every action applied so far, in order
    pub fn journal(&self) -> Vec<Action> {
        self.lock().map(|s| s.journal.clone()).unwrap_or_default()
    }

    /// Current value of an element as edited through this page
    pub fn value_of(&self, element: ElementHandle) -> Option<String> {
        self.lock().ok().and_then(|s| s.values.get(&element).cloned())
    }

    fn record(&self, action: Action) -> Result<(), PageError> {
        debug!(%action, "HtmlPage::record: called");
        self.lock()?.journal.push(action);
        Ok(())
    }

    fn ensure_exists(&self, element: ElementHandle) -> Result<(), PageError> {
        let html = self.lock()?.html.clone();
        let doc = Html::parse_document(&html);
        if elements(&doc).len() > element.0 {
            Ok(())
        } else {
            Err(PageError::StaleHandle(element))
        }
    }
}

fn describe(handle: ElementHandle, el: ElementRef<'_>) -> Element {
    let value = el.value();
    let editable = matches!(value.attr("contenteditable"), Some("true") | Some(""));
    let disabled = value.attr("disabled").is_some()
        || value.attr("aria-disabled") == Some("true")
        || value.classes().any(|c| c == "disabled");
    Element {
        handle,
        tag: value.name().to_ascii_lowercase(),
        editable,
        disabled,
        class_name: value.attr("class").unwrap_or_default().to_string(),
        aria_label: value.attr("aria-label").map(str::to_string),
    }
}

/// Every element in document order; a handle is an index into this list
fn elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element().descendants().filter_map(ElementRef::wrap).collect()
}

#[async_trait]
impl Page for HtmlPage {
    async fn query_all(&self, selector: &str) -> Result<Vec<Element>, PageError> {
        let html = self.lock()?.html.clone();
        let parsed = Selector::parse(selector).map_err(|_| PageError::InvalidSelector(selector.to_string()))?;
        let doc = Html::parse_document(&html);
        let index: HashMap<_, usize> = elements(&doc).iter().enumerate().map(|(i, el)| (el.id(), i)).collect();
        let found = doc
            .select(&parsed)
            .filter_map(|el| index.get(&el.id()).map(|i| describe(ElementHandle(*i), el)))
            .collect();
        Ok(found)
    }

    async fn parent(&self, element: ElementHandle) -> Result<Option<Element>, PageError> {
        let html = self.lock()?.html.clone();
        let doc = Html::parse_document(&html);
        let all = elements(&doc);
        let el = all.get(element.0).ok_or(PageError::StaleHandle(element))?;
        let parent = el
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|p| all.iter().position(|candidate| *candidate == p))
            .map(|i| describe(ElementHandle(i), all[i]));
        Ok(parent)
    }

    async fn focus(&self, element: ElementHandle) -> Result<(), PageError> {
        self.ensure_exists(element)?;
        self.lock()?.focused = Some(element);
        self.record(Action::Focus(element))
    }

    async fn exec_command(&self, command: EditCommand) -> Result<bool, PageError> {
        {
            let mut state = self.lock()?;
            let focused = state.focused.ok_or(PageError::NoFocus)?;
            let value = state.values.entry(focused).or_default();
            match &command {
                EditCommand::SelectAll => {}
                EditCommand::Delete => value.clear(),
                EditCommand::InsertText(text) => value.push_str(text),
            }
        }
        self.record(Action::Command(command))?;
        Ok(true)
    }

    async fn set_native_value(&self, element: ElementHandle, value: &str) -> Result<(), PageError> {
        self.ensure_exists(element)?;
        self.lock()?.values.insert(element, value.to_string());
        self.record(Action::SetValue {
            element,
            value: value.to_string(),
        })
    }

    async fn dispatch(&self, element: ElementHandle, event: SyntheticEvent) -> Result<(), PageError> {
        self.ensure_exists(element)?;
        let files = match &event {
            SyntheticEvent::Paste { files }
            | SyntheticEvent::DragEnter { files }
            | SyntheticEvent::DragOver { files }
            | SyntheticEvent::Drop { files } => files.len(),
            _ => 0,
        };
        self.record(Action::Event {
            element,
            event: event.name(),
            files,
        })
    }

    async fn click(&self, element: ElementHandle) -> Result<(), PageError> {
        self.ensure_exists(element)?;
        self.record(Action::Click(element))
    }

    fn mutations(&self) -> watch::Receiver<u64> {
        self.mutations.subscribe()
    }

    async fn snapshot(&self) -> Result<String, PageError> {
        Ok(self.lock()?.html.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = r#"<html><body>
        <div class="composer"><textarea id="prompt" aria-label="Message"></textarea></div>
        <div contenteditable="true" class="ProseMirror"></div>
        <button class="send" disabled>Send</button>
    </body></html>"#;

    #[tokio::test]
    async fn test_query_all_describes_elements() {
        let page = HtmlPage::new(FORM);

        let textareas = page.query_all("textarea").await.unwrap();
        assert_eq!(textareas.len(), 1);
        assert!(textareas[0].is_form_field());
        assert_eq!(textareas[0].aria_label.as_deref(), Some("Message"));

        let editors = page.query_all(".ProseMirror").await.unwrap();
        assert!(editors[0].editable);

        let buttons = page.query_all("button").await.unwrap();
        assert!(buttons[0].disabled);
        assert_eq!(buttons[0].class_name, "send");
    }

    #[tokio::test]
    async fn test_disabled_class_marks_element_disabled() {
        let page = HtmlPage::new(r#"<div class="send-button-container disabled"></div><div class="send-button-container"></div>"#);
        let containers = page.query_all(".send-button-container").await.unwrap();
        assert!(containers[0].disabled);
        assert!(!containers[1].disabled);
    }

    #[tokio::test]
    async fn test_invalid_selector_is_an_error() {
        let page = HtmlPage::new(FORM);
        assert!(matches!(
            page.query_all("[[nope").await,
            Err(PageError::InvalidSelector(_))
        ));
    }

    #[tokio::test]
    async fn test_parent_lookup() {
        let page = HtmlPage::new(FORM);
        let textarea = page.query_all("textarea").await.unwrap().remove(0);
        let parent = page.parent(textarea.handle).await.unwrap().unwrap();
        assert_eq!(parent.class_name, "composer");
    }

    #[tokio::test]
    async fn test_edit_commands_replace_focused_value() {
        let page = HtmlPage::new(FORM);
        let editor = page.query_all(".ProseMirror").await.unwrap().remove(0);

        assert_eq!(
            page.exec_command(EditCommand::InsertText("x".into())).await,
            Err(PageError::NoFocus)
        );

        page.focus(editor.handle).await.unwrap();
        page.exec_command(EditCommand::InsertText("old".into())).await.unwrap();
        page.exec_command(EditCommand::SelectAll).await.unwrap();
        page.exec_command(EditCommand::Delete).await.unwrap();
        page.exec_command(EditCommand::InsertText("new".into())).await.unwrap();

        assert_eq!(page.value_of(editor.handle).as_deref(), Some("new"));
        assert_eq!(page.journal().len(), 5);
    }

    #[tokio::test]
    async fn test_replace_bumps_mutation_counter_and_invalidates_handles() {
        let page = HtmlPage::new(FORM);
        let mut rx = page.mutations();
        let button = page.query_all("button").await.unwrap().remove(0);

        page.replace("<html><body></body></html>").unwrap();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(page.click(button.handle).await, Err(PageError::StaleHandle(button.handle)));
    }
}
