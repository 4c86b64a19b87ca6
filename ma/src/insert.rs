//! Text insertion strategies

use serde::Serialize;
use tracing::debug;

use crate::page::{EditCommand, Element, Page, PageError, SyntheticEvent};
use crate::profile::InsertStrategy;

/// The concrete insertion used for one element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Insertion {
    RichText,
    NativeSetter,
}

/// Resolve a profile strategy against the element actually located
pub fn choose(strategy: InsertStrategy, element: &Element) -> Insertion {
    match strategy {
        InsertStrategy::RichText => Insertion::RichText,
        InsertStrategy::NativeSetter => Insertion::NativeSetter,
        InsertStrategy::Auto if element.editable => Insertion::RichText,
        InsertStrategy::Auto if element.is_form_field() => Insertion::NativeSetter,
        InsertStrategy::Auto => Insertion::RichText,
    }
}

/// Replace the element's content with `text`
pub async fn insert_text(page: &dyn Page, element: &Element, insertion: Insertion, text: &str) -> Result<(), PageError> {
    debug!(handle = %element.handle, ?insertion, chars = text.chars().count(), "insert_text: called");
    page.focus(element.handle).await?;
    match insertion {
        Insertion::RichText => {
            page.exec_command(EditCommand::SelectAll).await?;
            page.exec_command(EditCommand::Delete).await?;
            if !page.exec_command(EditCommand::InsertText(text.to_string())).await? {
                debug!("insert_text: insertText refused by page");
            }
        }
        Insertion::NativeSetter => {
            page.set_native_value(element.handle, text).await?;
            page.dispatch(element.handle, SyntheticEvent::Input).await?;
            page.dispatch(element.handle, SyntheticEvent::Change).await?;
        }
    }
    Ok(())
}
