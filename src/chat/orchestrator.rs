//! Question → intent → query → Markdown answer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chat::answer::{bullets, render};
use crate::chat::intent::{classify, plan, Intent, QueryPlan};
use crate::chat::normalize::{resolve, MatchQuality};
use crate::chat::query::QueryOp;
use crate::core::{Field, Schedule};
use crate::providers::{ChatMessage, CompletionClient, CompletionRequest, ImageAttachment};

/// Columns searched for a named entity, in priority order
pub const ENTITY_COLUMNS: [Field; 4] = [Field::User, Field::Pm, Field::ProjectDescr, Field::Client];

const GENERAL_SYSTEM_PROMPT: &str = "You are the assistant of a resource-planning tool. \
Answer general questions briefly. Never invent project, person, client or allocation data.";

const PHRASING_SYSTEM_PROMPT: &str = "Rephrase the facts below as one short paragraph in the language \
of the question. Use only names and numbers that appear in the facts.";

const STATIC_GENERAL_ANSWER: &str = "I can answer questions about the scheduling data: people, projects, \
clients, status and monthly allocations. Try \"Dammi info su <name>\", \"Quanti progetti per stato?\" \
or \"FTE totale per utente\".";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Values listed when an entity is not found
    pub suggestion_limit: usize,
    /// Timeout of external model calls
    pub timeout_secs: u64,
    /// Let the model add a phrasing paragraph above data answers
    pub phrase_with_llm: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self { suggestion_limit: 10, timeout_secs: 30, phrase_with_llm: false }
    }
}

/// How a question was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    General,
    Answered(QueryOp),
    NotFound { column: Field, subject: String },
    Suggested { column: Field, subject: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub outcome: Outcome,
    /// Markdown shown to the user
    pub text: String,
}

pub struct Orchestrator<'a> {
    schedule: &'a Schedule,
    settings: ChatSettings,
    llm: Option<&'a dyn CompletionClient>,
}

enum Resolved {
    Op(QueryOp),
    Approximate { column: Field, subject: String, values: Vec<String> },
    Missing { column: Field, subject: String },
    NoSubject,
}

impl<'a> Orchestrator<'a> {
    pub fn new(schedule: &'a Schedule, settings: ChatSettings) -> Self {
        Self { schedule, settings, llm: None }
    }

    pub fn with_llm(mut self, llm: &'a dyn CompletionClient) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Known entity values, used by the classifier
    fn entities(&self) -> Vec<String> {
        ENTITY_COLUMNS.iter().flat_map(|f| self.schedule.distinct(*f)).collect()
    }

    /// Answer one question. `history` holds the earlier turns of the conversation.
    pub fn respond(&self, question: &str, history: &[ChatMessage], images: &[ImageAttachment]) -> Reply {
        let entities = self.entities();
        let intent = classify(question, entities.iter().map(String::as_str));
        debug!("question classified as {:?}", intent);
        if intent == Intent::General {
            return Reply { outcome: Outcome::General, text: self.general_answer(question, history, images) };
        }

        match self.resolve_plan(plan(question)) {
            Resolved::Op(op) => {
                info!("running {:?}", op);
                let facts = render(&op.execute(self.schedule));
                let text = self.phrase(question, &facts, images);
                Reply { outcome: Outcome::Answered(op), text }
            }
            Resolved::Approximate { column, subject, values } => {
                let shown: Vec<&String> = values.iter().take(self.settings.suggestion_limit).collect();
                let text = format!(
                    "No exact match for \"{}\" in {}. Did you mean one of:\n\n{}",
                    subject,
                    column,
                    bullets(&shown)
                );
                Reply { outcome: Outcome::Suggested { column, subject }, text }
            }
            Resolved::Missing { column, subject } => {
                let text = self.not_found(column, &subject);
                Reply { outcome: Outcome::NotFound { column, subject }, text }
            }
            Resolved::NoSubject => Reply { outcome: Outcome::General, text: STATIC_GENERAL_ANSWER.to_string() },
        }
    }

    /// Convenience wrapper returning only the Markdown text
    pub fn answer(&self, question: &str, history: &[ChatMessage], images: &[ImageAttachment]) -> String {
        self.respond(question, history, images).text
    }

    fn resolve_plan(&self, plan: QueryPlan) -> Resolved {
        let (column, subject) = match plan {
            QueryPlan::Lookup { column, subject } => (column, subject),
            QueryPlan::CountBy { column } => return Resolved::Op(QueryOp::CountBy { column }),
            QueryPlan::ListDistinct { column } => return Resolved::Op(QueryOp::ListDistinct { column }),
            QueryPlan::AggregateByColumn { column } => {
                return Resolved::Op(QueryOp::AggregateByColumn { column });
            }
        };
        if subject.is_empty() {
            return Resolved::NoSubject;
        }

        let mut order: Vec<Field> = column.into_iter().collect();
        order.extend(ENTITY_COLUMNS.iter().copied().filter(|f| Some(*f) != column));

        let mut approximate: Option<(Field, Vec<String>)> = None;
        for field in &order {
            let candidates = self.schedule.distinct(*field);
            match resolve(&subject, candidates.iter().map(String::as_str)) {
                Some(r) if r.quality == MatchQuality::Exact => {
                    debug!("resolved '{}' to {} {:?}", subject, field, r.values);
                    return Resolved::Op(QueryOp::EntityProfile { column: *field, values: r.values });
                }
                Some(r) => {
                    if approximate.is_none() {
                        approximate = Some((*field, r.values));
                    }
                }
                None => {}
            }
        }
        match approximate {
            Some((column, values)) => Resolved::Approximate { column, subject, values },
            None => Resolved::Missing { column: column.unwrap_or(Field::User), subject },
        }
    }

    fn not_found(&self, column: Field, subject: &str) -> String {
        let mut available = self.schedule.distinct(column);
        available.sort();
        if available.is_empty() {
            return format!("Not found: no {column} matches \"{subject}\", and the dataset has no {column} values.");
        }
        let shown: Vec<&String> = available.iter().take(self.settings.suggestion_limit).collect();
        let mut text = format!(
            "Not found: no {} matches \"{}\". Did you mean one of:\n\n{}",
            column,
            subject,
            bullets(&shown)
        );
        if available.len() > shown.len() {
            text.push_str(&format!("\n({} of {} values shown)\n", shown.len(), available.len()));
        }
        text
    }

    fn general_answer(&self, question: &str, history: &[ChatMessage], images: &[ImageAttachment]) -> String {
        let Some(llm) = self.llm else {
            return STATIC_GENERAL_ANSWER.to_string();
        };
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(question));
        let request = CompletionRequest {
            system: Some(GENERAL_SYSTEM_PROMPT.to_string()),
            messages,
            images: images.to_vec(),
        };
        match llm.complete(&request) {
            Ok(text) => text,
            Err(e) => {
                warn!("general answer failed: {}", e);
                format!("⚠️ {e}")
            }
        }
    }

    /// Facts stay verbatim; the model may only add a paragraph above them
    fn phrase(&self, question: &str, facts: &str, images: &[ImageAttachment]) -> String {
        let llm = match self.llm {
            Some(llm) if self.settings.phrase_with_llm => llm,
            _ => return facts.to_string(),
        };
        let request = CompletionRequest {
            system: Some(PHRASING_SYSTEM_PROMPT.to_string()),
            messages: vec![ChatMessage::user(format!("Question: {question}\n\nFacts:\n{facts}"))],
            images: images.to_vec(),
        };
        match llm.complete(&request) {
            Ok(text) => format!("{text}\n\n{facts}"),
            Err(e) => {
                warn!("phrasing failed: {}", e);
                format!("{facts}\n⚠️ {e}\n")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Lovs, ScheduleRecord};
    use crate::providers::LlmError;
    use std::cell::RefCell;

    struct Canned {
        reply: Result<String, LlmError>,
        seen: RefCell<Vec<CompletionRequest>>,
    }

    impl CompletionClient for Canned {
        fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.seen.borrow_mut().push(request.clone());
            self.reply.clone()
        }
    }

    fn canned(reply: Result<String, LlmError>) -> Canned {
        Canned { reply, seen: RefCell::new(Vec::new()) }
    }

    fn schedule() -> Schedule {
        let rec = |user: &str, project: &str, client: &str| ScheduleRecord {
            user: Some(user.into()),
            project_descr: Some(project.into()),
            client: Some(client.into()),
            months: [Some(2); 12],
            ..Default::default()
        };
        Schedule::new(
            vec![rec("M. Sorrentino", "Apollo", "Acme"), rec("L. Verdi", "Hermes", "Initech")],
            Lovs::default(),
        )
    }

    #[test]
    fn test_general_question_without_llm_is_static() {
        let s = schedule();
        let reply = Orchestrator::new(&s, ChatSettings::default()).respond("Ciao!", &[], &[]);
        assert_eq!(reply.outcome, Outcome::General);
        assert_eq!(reply.text, STATIC_GENERAL_ANSWER);
    }

    #[test]
    fn test_general_question_passes_history_and_images() {
        let s = schedule();
        let llm = canned(Ok("Hello!".into()));
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hey")];
        let images = vec![ImageAttachment { mime_type: "image/png".into(), data: "AAAA".into() }];
        let text = Orchestrator::new(&s, ChatSettings::default()).with_llm(&llm).answer("Ciao!", &history, &images);

        assert_eq!(text, "Hello!");
        let seen = llm.seen.borrow();
        assert_eq!(seen[0].messages.len(), 3);
        assert_eq!(seen[0].images, images);
    }

    #[test]
    fn test_llm_failure_becomes_warning() {
        let s = schedule();
        let llm = canned(Err(LlmError::Timeout(30)));
        let text = Orchestrator::new(&s, ChatSettings::default()).with_llm(&llm).answer("Ciao!", &[], &[]);
        assert_eq!(text, "⚠️ request timed out after 30s");
    }

    #[test]
    fn test_phrasing_keeps_facts_verbatim() {
        let s = schedule();
        let settings = ChatSettings { phrase_with_llm: true, ..Default::default() };
        let plain = Orchestrator::new(&s, ChatSettings::default()).answer("info su Apollo", &[], &[]);

        let llm = canned(Ok("Apollo is staffed by M. Sorrentino.".into()));
        let phrased = Orchestrator::new(&s, settings.clone()).with_llm(&llm).answer("info su Apollo", &[], &[]);
        assert_eq!(phrased, format!("Apollo is staffed by M. Sorrentino.\n\n{plain}"));

        let failing = canned(Err(LlmError::Quota));
        let degraded = Orchestrator::new(&s, settings).with_llm(&failing).answer("info su Apollo", &[], &[]);
        assert!(degraded.starts_with(&plain));
        assert!(degraded.contains("⚠️ quota or rate limit exceeded"));
    }

    #[test]
    fn test_lookup_prefers_mentioned_column() {
        let s = schedule();
        let reply = Orchestrator::new(&s, ChatSettings::default()).respond("info su cliente Acme", &[], &[]);
        assert_eq!(
            reply.outcome,
            Outcome::Answered(QueryOp::EntityProfile { column: Field::Client, values: vec!["Acme".into()] })
        );
    }

    #[test]
    fn test_token_overlap_only_suggests() {
        let s = schedule();
        let reply = Orchestrator::new(&s, ChatSettings::default()).respond("Dammi info su Giulia Verdi", &[], &[]);
        assert_eq!(
            reply.outcome,
            Outcome::Suggested { column: Field::User, subject: "giulia verdi".into() }
        );
        assert!(reply.text.contains("- L. Verdi"));
        assert!(!reply.text.contains("| Month |"));
    }
}
