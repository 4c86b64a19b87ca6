//! Synthesis: merge several targets' answers through one chosen target

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::coordinator::{Collection, CoordinatorHandle, Route};
use crate::request::{InjectionRequest, MAX_TEXT_CHARS, ValidationError};
use crate::target::{TargetId, TargetRegistry};

/// Fewest answers worth synthesizing
pub const MIN_ANSWERS: usize = 2;

/// Instruction appended after the labelled answers
pub const MERGE_INSTRUCTION: &str = "Merge the answers above into one response. \
Where they disagree, work out which is correct and say why. \
Fix any errors you find, keep everything that is useful, and drop repetition. \
Reply with the unified answer only.";

const TRUNCATION_MARK: &str = "\n[...]";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("Synthesis needs at least {MIN_ANSWERS} answers, got {0}")]
    InsufficientAnswers(usize),

    #[error("Unknown synthesis target: {0}")]
    UnknownDestination(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Could not reach coordinator: {0}")]
    Coordinator(String),
}

/// What a successful synthesis sent, and where
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutcome {
    #[serde(rename = "request-id")]
    pub request_id: Uuid,
    pub destination: TargetId,
    pub sources: Vec<TargetId>,
    pub route: Route,
    #[serde(rename = "prompt-chars")]
    pub prompt_chars: usize,
}

/// Collects answers and routes a merged prompt to a single destination
#[derive(Clone)]
pub struct Synthesizer {
    handle: CoordinatorHandle,
    registry: TargetRegistry,
}

impl Synthesizer {
    pub fn new(handle: CoordinatorHandle, registry: TargetRegistry) -> Self {
        debug!("Synthesizer::new: called");
        Self { handle, registry }
    }

    /// Collect from `sources`, then synthesize into `destination`
    pub async fn synthesize(
        &self,
        sources: &[TargetId],
        destination: &TargetId,
        timeout: Duration,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        debug!(?sources, %destination, ?timeout, "Synthesizer::synthesize: called");
        self.check_destination(destination)?;
        let collection = self
            .handle
            .collect(sources, timeout)
            .await
            .map_err(|e| SynthesisError::Coordinator(e.to_string()))?;
        self.synthesize_from(&collection, destination).await
    }

    /// Synthesize from answers already collected
    pub async fn synthesize_from(
        &self,
        collection: &Collection,
        destination: &TargetId,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        debug!(answers = collection.len(), %destination, "Synthesizer::synthesize_from: called");
        self.check_destination(destination)?;
        if collection.len() < MIN_ANSWERS {
            return Err(SynthesisError::InsufficientAnswers(collection.len()));
        }

        let prompt = build_meta_prompt(&collection.answers, &self.registry);
        let prompt_chars = prompt.chars().count();
        let request = InjectionRequest::text(prompt)?;
        let request_id = request.id();

        let route = self
            .handle
            .deliver(destination, request)
            .await
            .map_err(|e| SynthesisError::Coordinator(e.to_string()))?;

        info!(%destination, sources = collection.len(), prompt_chars, "Synthesis delivered");
        Ok(SynthesisOutcome {
            request_id,
            destination: destination.clone(),
            sources: collection.answers.iter().map(|(t, _)| t.clone()).collect(),
            route,
            prompt_chars,
        })
    }

    fn check_destination(&self, destination: &TargetId) -> Result<(), SynthesisError> {
        if self.registry.contains(destination.as_str()) {
            Ok(())
        } else {
            Err(SynthesisError::UnknownDestination(destination.to_string()))
        }
    }
}

/// Build the merge prompt: each answer under its source's display name, then the instruction
///
/// When the answers would push the prompt past the text ceiling, each is cut in
/// proportion to its length so the result always fits.
pub fn build_meta_prompt(answers: &[(TargetId, String)], registry: &TargetRegistry) -> String {
    debug!(answers = answers.len(), "build_meta_prompt: called");
    let labels: Vec<String> = answers.iter().map(|(id, _)| registry.display_name(id)).collect();
    let bodies: Vec<&str> = answers.iter().map(|(_, text)| text.as_str()).collect();

    let full = render(&labels, &bodies);
    if full.chars().count() <= MAX_TEXT_CHARS {
        return full;
    }

    let overhead = render(&labels, &vec![""; bodies.len()]).chars().count()
        + TRUNCATION_MARK.chars().count() * bodies.len();
    let budget = MAX_TEXT_CHARS.saturating_sub(overhead);
    let lengths: Vec<usize> = bodies.iter().map(|b| b.chars().count()).collect();
    let total: usize = lengths.iter().sum();

    let cut: Vec<String> = bodies
        .iter()
        .zip(&lengths)
        .map(|(body, len)| {
            let allowance = budget * len / total.max(1);
            if *len <= allowance {
                body.to_string()
            } else {
                let mut kept: String = body.chars().take(allowance).collect();
                kept.push_str(TRUNCATION_MARK);
                kept
            }
        })
        .collect();
    let cut_refs: Vec<&str> = cut.iter().map(String::as_str).collect();

    debug!(budget, total, "build_meta_prompt: truncated answers");
    render(&labels, &cut_refs)
}

fn render(labels: &[String], bodies: &[&str]) -> String {
    let mut prompt = format!(
        "Several assistants answered the same question. Their answers follow ({}).\n\n",
        labels.join(", ")
    );
    for (label, body) in labels.iter().zip(bodies) {
        prompt.push_str("### ");
        prompt.push_str(label);
        prompt.push('\n');
        prompt.push_str(body.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str(MERGE_INSTRUCTION);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorConfig};
    use crate::protocol::Message;
    use crate::transport::{Transport, TransportError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        posted: Mutex<Vec<(TargetId, Message)>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn post(&self, target_id: &TargetId, message: Message) -> Result<(), TransportError> {
            self.posted.lock().unwrap().push((target_id.clone(), message));
            Ok(())
        }
    }

    fn answers(list: &[(&str, &str)]) -> Collection {
        Collection {
            answers: list
                .iter()
                .map(|(id, text)| (TargetId::from(*id), text.to_string()))
                .collect(),
            missing: Vec::new(),
        }
    }

    fn start() -> (Synthesizer, Arc<Recorder>, CoordinatorHandle) {
        let recorder = Arc::new(Recorder::default());
        let coord = Coordinator::new(CoordinatorConfig::default(), TargetRegistry::builtin(), recorder.clone());
        let handle = coord.handle();
        tokio::spawn(coord.run());
        (Synthesizer::new(handle.clone(), TargetRegistry::builtin()), recorder, handle)
    }

    #[test]
    fn test_meta_prompt_labels_answers_by_display_name() {
        let registry = TargetRegistry::builtin();
        let prompt = build_meta_prompt(
            &answers(&[("chatgpt", "Paris"), ("claude", "Paris, France")]).answers,
            &registry,
        );
        assert!(prompt.contains("### ChatGPT\nParis\n"));
        assert!(prompt.contains("### Claude\nParis, France\n"));
        assert!(prompt.ends_with(MERGE_INSTRUCTION));
    }

    #[test]
    fn test_meta_prompt_never_exceeds_ceiling() {
        let registry = TargetRegistry::builtin();
        let big = "a".repeat(80_000);
        let small = "b".repeat(20_000);
        let prompt = build_meta_prompt(
            &[
                (TargetId::from("chatgpt"), big),
                (TargetId::from("gemini"), small),
            ],
            &registry,
        );
        assert!(prompt.chars().count() <= MAX_TEXT_CHARS);
        assert!(prompt.contains(TRUNCATION_MARK));

        // Larger answer keeps a proportionally larger share
        let a = prompt.matches('a').count();
        let b = prompt.matches('b').count();
        assert!(a > 3 * b);
    }

    #[tokio::test]
    async fn test_single_answer_is_rejected_without_sending() {
        let (synth, recorder, handle) = start();
        let result = synth
            .synthesize_from(&answers(&[("chatgpt", "only one")]), &TargetId::from("claude"))
            .await;
        assert_eq!(result.unwrap_err(), SynthesisError::InsufficientAnswers(1));
        assert!(recorder.posted.lock().unwrap().is_empty());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_two_answers_produce_exactly_one_injection() {
        let (synth, recorder, handle) = start();
        let outcome = synth
            .synthesize_from(&answers(&[("chatgpt", "A1"), ("gemini", "A2")]), &TargetId::from("claude"))
            .await
            .unwrap();

        assert_eq!(outcome.route, Route::Direct);
        assert_eq!(outcome.sources.len(), 2);

        let posted = recorder.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0.as_str(), "claude");
        match &posted[0].1 {
            Message::Inject { text, attachments, .. } => {
                assert!(text.contains("A1") && text.contains("A2"));
                assert!(attachments.is_empty());
            }
            other => panic!("Wrong message: {:?}", other),
        }
        drop(posted);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_destination_is_rejected() {
        let (synth, recorder, handle) = start();
        let result = synth
            .synthesize_from(&answers(&[("chatgpt", "A1"), ("gemini", "A2")]), &TargetId::from("bard"))
            .await;
        assert!(matches!(result, Err(SynthesisError::UnknownDestination(_))));
        assert!(recorder.posted.lock().unwrap().is_empty());
        handle.shutdown().await.unwrap();
    }
}
