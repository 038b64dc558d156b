//! Conversation state: transcript, question history and the single in-flight request.
//!
//! The orchestrator never performs IO besides the history store. A successful
//! `submit` hands back the question to send; the caller runs the request and
//! feeds the outcome into `complete`.

use crate::error::ChatError;
use crate::history::{HistoryList, HistoryStore};
use crate::render::{self, Rendered};

/// Answers are split into fragments on this bullet marker.
pub const FRAGMENT_DELIMITER: &str = "* ";

pub fn split_fragments(answer: &str) -> Vec<String> {
    answer
        .split(FRAGMENT_DELIMITER)
        .map(|fragment| fragment.trim().to_string())
        .collect()
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub fragments: Vec<String>,
    pub rendered: Vec<Rendered>,
}

impl Answer {
    fn new(fragments: Vec<String>) -> Self {
        let rendered = render::render_answer(&fragments);
        Answer { fragments, rendered }
    }

    pub fn plain_text(&self) -> String {
        self.fragments.join("\n\n")
    }
}

#[derive(Debug, Clone)]
pub enum Turn {
    Question(String),
    Answer(Answer),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting { question: String },
    Error,
}

pub struct Conversation {
    store: HistoryStore,
    history: HistoryList,
    turns: Vec<Turn>,
    phase: Phase,
    error: Option<String>,
    selected: Option<String>,
}

impl Conversation {
    pub fn new(store: HistoryStore) -> Self {
        let history = store.load();
        tracing::info!(entries = history.len(), "loaded question history");
        Conversation {
            store,
            history,
            turns: Vec::new(),
            phase: Phase::Idle,
            error: None,
            selected: None,
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[cfg(test)]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.phase, Phase::Submitting { .. })
    }

    pub fn last_answer(&self) -> Option<&Answer> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Answer(answer) => Some(answer),
            Turn::Question(_) => None,
        })
    }

    /// Whether the ask button should be enabled for the given typed text.
    pub fn can_submit(&self, typed: &str) -> bool {
        !self.is_submitting() && (!typed.trim().is_empty() || self.selected.is_some())
    }

    /// Starts a round from the input field. Typed text takes precedence over a
    /// selected history entry and is recorded in history; a replay is not.
    ///
    /// Returns the question to send, or `None` when the submit is rejected.
    pub fn submit(&mut self, typed: &str) -> Option<String> {
        if self.is_submitting() {
            tracing::debug!("submit ignored: a request is already in flight");
            return None;
        }

        let question = if !typed.trim().is_empty() {
            let question = typed.trim_end_matches(['\n', '\r']).to_string();
            self.remember(&question);
            question
        } else if let Some(selected) = self.selected.clone() {
            selected
        } else {
            return None;
        };

        self.error = None;
        self.phase = Phase::Submitting {
            question: question.clone(),
        };
        tracing::info!("submitting question");
        Some(question)
    }

    /// Replays a history entry. The entry becomes the payload regardless of
    /// what is in the input field.
    pub fn select_history(&mut self, entry: &str) -> Option<String> {
        if entry.trim().is_empty() || self.is_submitting() {
            return None;
        }
        self.selected = Some(entry.to_string());
        self.submit("")
    }

    /// Settles the in-flight request. Returns `true` when an answer was appended.
    pub fn complete(&mut self, result: Result<String, ChatError>) -> bool {
        let question = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Submitting { question } => question,
            other => {
                tracing::warn!("dropping response with no request in flight");
                self.phase = other;
                return false;
            }
        };

        match result {
            Ok(text) => {
                let fragments = split_fragments(&text);
                tracing::info!(fragments = fragments.len(), "answer received");
                self.turns.push(Turn::Question(question));
                self.turns.push(Turn::Answer(Answer::new(fragments)));
                self.selected = None;
                self.error = None;
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, detail = err.detail(), "question failed");
                self.error = Some(err.to_string());
                self.phase = Phase::Error;
                false
            }
        }
    }

    pub fn clear_chat(&mut self) {
        self.turns.clear();
        self.error = None;
        if self.phase == Phase::Error {
            self.phase = Phase::Idle;
        }
    }

    pub fn clear_history(&mut self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!("clearing stored history failed: {:#}", e);
        }
        self.history.clear();
        self.selected = None;
    }

    fn remember(&mut self, question: &str) {
        self.history.insert(0, question.to_string());
        if let Err(e) = self.store.save(&self.history) {
            tracing::warn!("persisting history failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::new(HistoryStore::open_in_memory().unwrap())
    }

    fn answered(conv: &mut Conversation, question: &str, answer: &str) {
        let sent = conv.submit(question).expect("submit accepted");
        assert_eq!(sent, question);
        assert!(conv.complete(Ok(answer.to_string())));
    }

    #[test]
    fn splits_on_bullet_marker_and_trims() {
        assert_eq!(
            split_fragments("Intro text* Point one* Point two"),
            vec!["Intro text", "Point one", "Point two"]
        );
    }

    #[test]
    fn keeps_empty_fragments() {
        assert_eq!(split_fragments("* a"), vec!["", "a"]);
        assert_eq!(split_fragments(""), vec![""]);
    }

    #[test]
    fn submit_prepends_to_history_and_persists() {
        let mut conv = conversation();
        answered(&mut conv, "first", "a");
        answered(&mut conv, "second", "b");

        assert_eq!(conv.history(), ["second", "first"]);
        assert_eq!(conv.store.load(), vec!["second", "first"]);
    }

    #[test]
    fn history_is_recorded_before_the_request_settles() {
        let mut conv = conversation();
        conv.submit("pending").unwrap();
        assert_eq!(conv.history(), ["pending"]);
        assert!(conv.turns().is_empty());
    }

    #[test]
    fn second_submit_while_in_flight_is_noop() {
        let mut conv = conversation();
        assert!(conv.submit("one").is_some());
        assert!(conv.submit("two").is_none());
        assert!(conv.select_history("one").is_none());

        assert_eq!(conv.history(), ["one"]);
        assert!(conv.turns().is_empty());
        assert_eq!(
            conv.phase(),
            &Phase::Submitting {
                question: "one".to_string()
            }
        );
    }

    #[test]
    fn empty_input_without_selection_is_rejected() {
        let mut conv = conversation();
        assert!(!conv.can_submit("   "));
        assert!(conv.submit("  \n").is_none());
        assert_eq!(conv.phase(), &Phase::Idle);
        assert!(conv.history().is_empty());
    }

    #[test]
    fn success_appends_question_and_fragmented_answer() {
        let mut conv = conversation();
        answered(&mut conv, "list points", "Intro text* Point one* Point two");

        assert_eq!(conv.turns().len(), 2);
        assert!(matches!(&conv.turns()[0], Turn::Question(q) if q == "list points"));
        let Turn::Answer(answer) = &conv.turns()[1] else {
            panic!("expected answer turn");
        };
        assert_eq!(answer.fragments, vec!["Intro text", "Point one", "Point two"]);
        assert_eq!(answer.rendered.len(), 3);
        assert_eq!(conv.phase(), &Phase::Idle);
    }

    #[test]
    fn rate_limit_sets_exact_message_and_keeps_log() {
        let mut conv = conversation();
        answered(&mut conv, "earlier", "ok");

        conv.submit("again").unwrap();
        assert!(!conv.complete(Err(ChatError::RateLimited)));

        assert_eq!(
            conv.error(),
            Some("⏳ You are chatting too fast! Please wait 1-2 minutes.")
        );
        assert_eq!(conv.phase(), &Phase::Error);
        assert_eq!(conv.turns().len(), 2);
        assert_eq!(conv.history(), ["again", "earlier"]);
    }

    #[test]
    fn server_error_message_contains_status() {
        let mut conv = conversation();
        conv.submit("q").unwrap();
        conv.complete(Err(ChatError::Upstream {
            status: 500,
            reason: "Internal Server Error".into(),
        }));
        assert!(conv.error().unwrap().contains("500"));
    }

    #[test]
    fn next_submit_clears_error() {
        let mut conv = conversation();
        conv.submit("q").unwrap();
        conv.complete(Err(ChatError::Network("reset".into())));
        assert!(conv.error().is_some());

        answered(&mut conv, "retry", "fine");
        assert!(conv.error().is_none());
        assert_eq!(conv.phase(), &Phase::Idle);
    }

    #[test]
    fn clear_chat_keeps_history() {
        let mut conv = conversation();
        answered(&mut conv, "q", "a");
        conv.submit("boom").unwrap();
        conv.complete(Err(ChatError::RateLimited));

        conv.clear_chat();
        assert!(conv.turns().is_empty());
        assert!(conv.error().is_none());
        assert_eq!(conv.phase(), &Phase::Idle);
        assert_eq!(conv.history(), ["boom", "q"]);
    }

    #[test]
    fn clear_history_keeps_chat() {
        let mut conv = conversation();
        answered(&mut conv, "q", "a");

        conv.clear_history();
        assert!(conv.history().is_empty());
        assert!(conv.store.load().is_empty());
        assert_eq!(conv.turns().len(), 2);
    }

    #[test]
    fn selecting_history_replays_entry_without_typed_input() {
        let mut conv = conversation();
        answered(&mut conv, "how do closures capture?", "a");

        let sent = conv.select_history("how do closures capture?");
        assert_eq!(sent.as_deref(), Some("how do closures capture?"));
        assert_eq!(conv.selected(), Some("how do closures capture?"));
        assert_eq!(conv.history().len(), 1);

        assert!(conv.complete(Ok("again".into())));
        assert_eq!(conv.turns().len(), 4);
        assert!(conv.selected().is_none());
    }

    #[test]
    fn cannot_submit_while_in_flight() {
        let mut conv = conversation();
        conv.submit("first").unwrap();
        assert!(!conv.can_submit("text"));
        assert!(!conv.can_submit(""));
    }

    #[test]
    fn failed_replay_keeps_selection_submittable() {
        let mut conv = conversation();
        conv.select_history("replayed entry").unwrap();
        conv.complete(Err(ChatError::RateLimited));

        assert_eq!(conv.selected(), Some("replayed entry"));
        assert!(conv.can_submit(""));
        assert_eq!(conv.submit("").as_deref(), Some("replayed entry"));
    }

    #[test]
    fn blank_history_entry_does_not_submit() {
        let mut conv = conversation();
        assert!(conv.select_history("   ").is_none());
        assert_eq!(conv.phase(), &Phase::Idle);
    }

    #[test]
    fn repeated_question_is_not_deduplicated() {
        let mut conv = conversation();
        answered(&mut conv, "same", "a");
        answered(&mut conv, "same", "b");

        assert_eq!(conv.history(), ["same", "same"]);
        assert_eq!(conv.turns().len(), 4);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut conv = conversation();
        assert!(!conv.complete(Ok("unexpected".into())));
        assert!(conv.turns().is_empty());
        assert_eq!(conv.phase(), &Phase::Idle);
    }

    #[test]
    fn history_loaded_from_store_at_construction() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.save(&["older".to_string()]).unwrap();
        let mut conv = Conversation::new(store);
        assert_eq!(conv.history(), ["older"]);

        answered(&mut conv, "newer", "a");
        assert_eq!(conv.history(), ["newer", "older"]);
    }

    #[test]
    fn last_answer_joins_fragments() {
        let mut conv = conversation();
        answered(&mut conv, "q", "Intro* one");
        assert_eq!(conv.last_answer().unwrap().plain_text(), "Intro\n\none");
    }
}
