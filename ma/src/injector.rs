//! Injection state machine
//!
//! Runs one prompt into one page: locate the input, insert text, hand over images,
//! submit. Every step degrades rather than fails; only a page error aborts the run.

use std::fmt;

use mosaic_core::Attachment;
use mosaic_core::attachment;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AdapterConfig;
use crate::insert::{self, Insertion};
use crate::locator::{self, Located};
use crate::page::{Element, Page, PageError, SyntheticEvent};
use crate::profile::{GENERIC_INPUTS, SubmitCandidate, TargetProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionState {
    Idle,
    LocatingInput,
    Inserting,
    AwaitingImages,
    Submitting,
    Done,
    TimedOut,
}

impl fmt::Display for InjectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InjectionState::Idle => "idle",
            InjectionState::LocatingInput => "locating-input",
            InjectionState::Inserting => "inserting",
            InjectionState::AwaitingImages => "awaiting-images",
            InjectionState::Submitting => "submitting",
            InjectionState::Done => "done",
            InjectionState::TimedOut => "timed-out",
        };
        write!(f, "{}", name)
    }
}

/// How the prompt was submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitMethod {
    /// Clicked the first enabled control found by this candidate
    Clicked(String),
    /// Clicked, then pressed Enter on the input as well
    ClickedThenEnter(String),
    /// No control found; synthetic Enter on the input
    EnterKey,
}

/// Trace of one injection run
#[derive(Debug, Clone, Serialize)]
pub struct InjectionReport {
    pub states: Vec<InjectionState>,
    /// Selector that found the input surface
    pub located: Option<String>,
    pub insertion: Option<Insertion>,
    pub submit: Option<SubmitMethod>,
    #[serde(rename = "attachments-delivered")]
    pub attachments_delivered: usize,
}

impl InjectionReport {
    fn new() -> Self {
        Self {
            states: vec![InjectionState::Idle],
            located: None,
            insertion: None,
            submit: None,
            attachments_delivered: 0,
        }
    }

    fn enter(&mut self, state: InjectionState) {
        debug!(%state, "InjectionReport::enter: called");
        self.states.push(state);
    }

    pub fn state(&self) -> InjectionState {
        self.states.last().copied().unwrap_or(InjectionState::Idle)
    }

    pub fn succeeded(&self) -> bool {
        self.state() == InjectionState::Done
    }
}

/// Drives one page through the injection states for one target profile
pub struct Injector<'a> {
    page: &'a dyn Page,
    profile: &'static TargetProfile,
    config: &'a AdapterConfig,
    /// Target accepts image attachments
    images: bool,
}

impl<'a> Injector<'a> {
    pub fn new(page: &'a dyn Page, profile: &'static TargetProfile, config: &'a AdapterConfig, images: bool) -> Self {
        Self {
            page,
            profile,
            config,
            images,
        }
    }

    pub async fn run(&self, text: &str, attachments: &[Attachment]) -> Result<InjectionReport, PageError> {
        debug!(
            profile = self.profile.name,
            chars = text.chars().count(),
            attachments = attachments.len(),
            "Injector::run: called"
        );
        let mut report = InjectionReport::new();

        report.enter(InjectionState::LocatingInput);
        let Some(input) = self.locate_input().await? else {
            warn!(profile = self.profile.name, "Input surface not found");
            report.enter(InjectionState::TimedOut);
            return Ok(report);
        };
        report.located = Some(input.selector.clone());

        if !text.is_empty() {
            report.enter(InjectionState::Inserting);
            let insertion = insert::choose(self.profile.insert, &input.element);
            insert::insert_text(self.page, &input.element, insertion, text).await?;
            report.insertion = Some(insertion);
        }

        let files = self.deliverable_images(attachments);
        if !files.is_empty() {
            report.enter(InjectionState::AwaitingImages);
            report.attachments_delivered = self.hand_over_images(&input.element, files).await?;
        }

        report.enter(InjectionState::Submitting);
        tokio::time::sleep(self.config.submit_delay(self.profile)).await;
        report.submit = Some(self.submit(&input.element).await?);

        report.enter(InjectionState::Done);
        info!(
            profile = self.profile.name,
            located = ?report.located,
            submit = ?report.submit,
            "Injection complete"
        );
        Ok(report)
    }

    /// Profile selectors within the budget, then the fallback once, then the generic set
    async fn locate_input(&self) -> Result<Option<Located>, PageError> {
        let found = locator::wait_for_any(self.page, self.profile.input, self.config.locate_timeout()).await?;
        if found.is_some() {
            return Ok(found);
        }
        if let Some(fallback) = self.profile.fallback {
            debug!(%fallback, "Injector::locate_input: trying fallback");
            if let Some(found) = locator::find_first(self.page, &[fallback]).await? {
                return Ok(Some(found));
            }
        }
        debug!("Injector::locate_input: trying generic inputs");
        locator::find_first(self.page, GENERIC_INPUTS).await
    }

    /// Attachments this target will receive; an invalid batch is withheld entirely
    fn deliverable_images(&self, attachments: &[Attachment]) -> Vec<Attachment> {
        if attachments.is_empty() {
            return Vec::new();
        }
        if !self.images {
            info!(profile = self.profile.name, "Target does not accept images, sending text only");
            return Vec::new();
        }
        if let Err(e) = attachment::validate_batch(attachments) {
            warn!(error = %e, "Attachment batch rejected, sending text only");
            return Vec::new();
        }
        attachments.to_vec()
    }

    async fn hand_over_images(&self, input: &Element, files: Vec<Attachment>) -> Result<usize, PageError> {
        let count = files.len();
        self.page.focus(input.handle).await?;
        self.page
            .dispatch(input.handle, SyntheticEvent::Paste { files: files.clone() })
            .await?;

        if let Some(zone) = locator::find_first(self.page, self.profile.drop_zones).await? {
            tokio::time::sleep(self.config.drop_delay()).await;
            let handle = zone.element.handle;
            self.page
                .dispatch(handle, SyntheticEvent::DragEnter { files: files.clone() })
                .await?;
            self.page
                .dispatch(handle, SyntheticEvent::DragOver { files: files.clone() })
                .await?;
            self.page.dispatch(handle, SyntheticEvent::Drop { files }).await?;
        }

        tokio::time::sleep(self.config.image_settle(count)).await;
        Ok(count)
    }

    async fn submit(&self, input: &Element) -> Result<SubmitMethod, PageError> {
        for candidate in self.profile.submit {
            if let Some(button) = self.resolve(candidate).await?
                && !button.disabled
            {
                self.page.click(button.handle).await?;
                if self.profile.enter_after_click {
                    self.page.dispatch(input.handle, SyntheticEvent::enter()).await?;
                    return Ok(SubmitMethod::ClickedThenEnter(candidate.to_string()));
                }
                return Ok(SubmitMethod::Clicked(candidate.to_string()));
            }
        }
        debug!("Injector::submit: no enabled control, pressing Enter");
        self.page.dispatch(input.handle, SyntheticEvent::enter()).await?;
        Ok(SubmitMethod::EnterKey)
    }

    async fn resolve(&self, candidate: &SubmitCandidate) -> Result<Option<Element>, PageError> {
        match candidate {
            SubmitCandidate::Css(selector) => Ok(locator::find_first(self.page, &[*selector])
                .await?
                .map(|l| l.element)),
            SubmitCandidate::ParentOf(selector) => match locator::find_first(self.page, &[*selector]).await? {
                Some(child) => self.page.parent(child.element.handle).await,
                None => Ok(None),
            },
            SubmitCandidate::AriaContains(keyword) => {
                let buttons = self.page.query_all("button").await?;
                Ok(buttons.into_iter().find(|b| {
                    b.aria_label
                        .as_deref()
                        .is_some_and(|label| label.to_lowercase().contains(*keyword))
                }))
            }
            SubmitCandidate::ClassContains(keyword) => {
                let buttons = self.page.query_all("button").await?;
                Ok(buttons
                    .into_iter()
                    .find(|b| b.class_name.to_lowercase().contains(*keyword)))
            }
        }
    }
}
