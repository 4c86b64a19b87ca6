//! Element location with a mutation-driven bounded wait

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::page::{Element, Page, PageError};

/// An element and the selector that found it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub selector: String,
    pub element: Element,
}

/// First element matching any selector, trying selectors in declared order
///
/// A selector the page cannot parse counts as a miss.
pub async fn find_first(page: &dyn Page, selectors: &[&str]) -> Result<Option<Located>, PageError> {
    for selector in selectors {
        match page.query_all(selector).await {
            Ok(found) => {
                if let Some(element) = found.into_iter().next() {
                    return Ok(Some(Located {
                        selector: selector.to_string(),
                        element,
                    }));
                }
            }
            Err(PageError::InvalidSelector(sel)) => warn!(%sel, "Skipping unparsable selector"),
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Wait until any selector matches, re-checking after every DOM mutation
///
/// Gives up once `budget` has elapsed, after one last check.
pub async fn wait_for_any(page: &dyn Page, selectors: &[&str], budget: Duration) -> Result<Option<Located>, PageError> {
    debug!(?selectors, ?budget, "wait_for_any: called");
    let deadline = Instant::now() + budget;
    // Subscribe before the first check so a mutation in between is not lost
    let mut mutations = page.mutations();

    loop {
        if let Some(found) = find_first(page, selectors).await? {
            debug!(selector = %found.selector, "wait_for_any: found");
            return Ok(Some(found));
        }

        match tokio::time::timeout_at(deadline, mutations.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => {
                // Page stopped reporting mutations; nothing will change before the deadline
                tokio::time::sleep_until(deadline).await;
                break;
            }
            Err(_) => break,
        }
    }

    debug!("wait_for_any: budget spent, final check");
    find_first(page, selectors).await
}
