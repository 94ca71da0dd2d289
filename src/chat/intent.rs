//! Keyword-based intent classification and query planning.

use lazy_static::lazy_static;
use regex::Regex;

use crate::chat::normalize::{contains_tokens, normalize};
use crate::core::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    General,
    DataQuery,
}

/// What a data question asks for, before entity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// Look up a person, project, or client named in the question
    Lookup { column: Option<Field>, subject: String },
    CountBy { column: Field },
    ListDistinct { column: Field },
    AggregateByColumn { column: Field },
}

const DATA_KEYWORDS: &[&str] = &[
    "project", "projects", "progetto", "progetti", "commessa", "commesse",
    "user", "users", "utente", "utenti", "risorsa", "risorse", "persona", "persone",
    "client", "clients", "customer", "customers", "cliente", "clienti",
    "status", "stato", "stati", "fte", "pm", "project manager", "allocation", "allocazione",
    "allocazioni", "planned", "actual", "progress", "avanzamento", "delivery", "item type",
    "quanti", "quante", "how many", "count", "conta", "numero", "list", "lista", "elenco",
    "elenca", "totale", "total", "info su", "dammi info", "informazioni su", "info about",
    "details", "dettagli", "schedule", "pianificazione",
];

const MONTH_WORDS: &[&str] = &[
    "gennaio", "febbraio", "marzo", "aprile", "maggio", "giugno", "luglio", "agosto",
    "settembre", "ottobre", "novembre", "dicembre",
    "january", "february", "march", "april", "june", "july", "august",
    "september", "october", "november", "december",
    "gen", "feb", "mar", "apr", "mag", "giu", "lug", "ago", "set", "ott", "nov", "dic",
    "mese", "mesi", "month", "months", "monthly", "mensile",
];

const COUNT_WORDS: &[&str] = &["quanti", "quante", "how many", "count", "conta", "numero", "number of"];
const LIST_WORDS: &[&str] = &["list", "lista", "elenco", "elenca", "which", "quali", "all", "tutti", "tutte"];
const AGGREGATE_WORDS: &[&str] = &[
    "fte", "totale", "totali", "total", "totals", "sum", "somma", "allocation", "allocazione", "carico",
    "workload",
];

/// Words that never name an entity
const STOPWORDS: &[&str] = &[
    "dammi", "dimmi", "mostra", "mostrami", "cerca", "trova", "info", "informazioni", "dettagli",
    "su", "sul", "sulla", "sullo", "di", "del", "della", "dello", "dei", "delle", "per", "a", "al",
    "il", "lo", "la", "i", "gli", "le", "un", "una", "e", "chi", "cosa", "che", "quale", "ci", "sono",
    "abbiamo", "ogni", "da", "ha", "hanno", "con", "by", "each", "in", "are", "there", "do", "we",
    "give", "me", "show", "tell", "find", "about", "on", "for", "of", "the", "is", "who", "what",
    "details", "information", "please", "has", "have", "with", "group", "grouped", "raggruppa",
];

const COLUMN_WORDS: &[(&str, Field)] = &[
    ("project manager", Field::Pm),
    ("pm", Field::Pm),
    ("user", Field::User),
    ("users", Field::User),
    ("utente", Field::User),
    ("utenti", Field::User),
    ("risorsa", Field::User),
    ("risorse", Field::User),
    ("persona", Field::User),
    ("persone", Field::User),
    ("project", Field::ProjectDescr),
    ("projects", Field::ProjectDescr),
    ("progetto", Field::ProjectDescr),
    ("progetti", Field::ProjectDescr),
    ("commessa", Field::ProjectDescr),
    ("commesse", Field::ProjectDescr),
    ("client", Field::Client),
    ("clients", Field::Client),
    ("customer", Field::Client),
    ("customers", Field::Client),
    ("cliente", Field::Client),
    ("clienti", Field::Client),
    ("status", Field::Status),
    ("stato", Field::Status),
    ("stati", Field::Status),
    ("item type", Field::ItemType),
    ("delivery", Field::DeliveryType),
];

fn keyword_regex<'a>(words: impl IntoIterator<Item = &'a &'a str>) -> Regex {
    let alternatives: Vec<String> = words.into_iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"\b(?:{})\b", alternatives.join("|"))).expect("keyword list is a valid pattern")
}

lazy_static! {
    static ref DATA_RE: Regex = keyword_regex(DATA_KEYWORDS.iter().chain(MONTH_WORDS));
    static ref COUNT_RE: Regex = keyword_regex(COUNT_WORDS);
    static ref AGGREGATE_RE: Regex = keyword_regex(AGGREGATE_WORDS);
    static ref FILLERS: Vec<Vec<&'static str>> = STOPWORDS
        .iter()
        .chain(COUNT_WORDS)
        .chain(LIST_WORDS)
        .chain(AGGREGATE_WORDS)
        .chain(MONTH_WORDS)
        .map(|phrase| phrase.split(' ').collect())
        .collect();
}

/// Classify a question. `entities` are known values (users, projects, clients) that
/// also mark a question as a data query when mentioned.
pub fn classify<'a, I>(question: &str, entities: I) -> Intent
where
    I: IntoIterator<Item = &'a str>,
{
    let q = normalize(question);
    if q.is_empty() {
        return Intent::General;
    }
    if DATA_RE.is_match(&q) {
        return Intent::DataQuery;
    }
    let mentioned = entities.into_iter().any(|e| {
        let e = normalize(e);
        e.len() >= 3 && contains_tokens(&q, &e)
    });
    if mentioned { Intent::DataQuery } else { Intent::General }
}

/// Column keywords in the question as (position, phrase length, column)
fn column_mentions(question: &str) -> Vec<(usize, usize, Field)> {
    let padded = format!(" {} ", normalize(question));
    let mut mentions: Vec<(usize, usize, Field)> = COLUMN_WORDS
        .iter()
        .filter_map(|(word, field)| padded.find(&format!(" {word} ")).map(|pos| (pos, word.len(), *field)))
        .collect();
    // position ascending, longest phrase first on ties
    mentions.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    mentions
}

/// The first column the question talks about
pub fn target_column(question: &str) -> Option<Field> {
    column_mentions(question).first().map(|m| m.2)
}

/// The last column mentioned, which is the grouping column in "X per Y"
fn grouping_column(question: &str) -> Option<Field> {
    column_mentions(question).last().map(|m| m.2)
}

fn strip_phrase(mut text: String, phrase: &str) -> String {
    let padded = format!(" {phrase} ");
    while text.contains(&padded) {
        text = text.replace(&padded, " ");
    }
    text
}

/// Leading or trailing filler phrase lengths, in tokens
fn filler_len(tokens: &[&str], at_end: bool) -> usize {
    FILLERS
        .iter()
        .filter(|phrase| {
            if at_end { tokens.ends_with(phrase.as_slice()) } else { tokens.starts_with(phrase.as_slice()) }
        })
        .map(Vec::len)
        .max()
        .unwrap_or(0)
}

/// A single letter followed by a name token is an initial ("a bianchi"), not an article
fn starts_with_initial(tokens: &[&str]) -> bool {
    tokens.len() > 1 && tokens[0].len() == 1 && filler_len(&tokens[1..], false) == 0
}

/// The name the question asks about: column keywords are dropped anywhere, filler
/// words only around the name, so initials and particles inside it survive.
pub fn extract_subject(question: &str) -> String {
    let mut q = format!(" {} ", normalize(question));
    for (word, _) in COLUMN_WORDS {
        q = strip_phrase(q, word);
    }
    let tokens: Vec<&str> = q.split(' ').filter(|t| !t.is_empty()).collect();

    let mut subject = tokens.as_slice();
    while !starts_with_initial(subject) {
        match filler_len(subject, false) {
            0 => break,
            n => subject = &subject[n..],
        }
    }
    loop {
        match filler_len(subject, true) {
            0 => break,
            n => subject = &subject[..subject.len() - n],
        }
    }
    subject.join(" ")
}

/// Pick the query operation for a data question
pub fn plan(question: &str) -> QueryPlan {
    let q = normalize(question);
    let subject = extract_subject(question);
    if !subject.is_empty() {
        return QueryPlan::Lookup { column: target_column(question), subject };
    }

    let grouping = grouping_column(question);
    if COUNT_RE.is_match(&q) {
        return QueryPlan::CountBy { column: grouping.unwrap_or(Field::Status) };
    }
    if AGGREGATE_RE.is_match(&q) {
        return QueryPlan::AggregateByColumn { column: grouping.unwrap_or(Field::User) };
    }
    match grouping {
        Some(Field::Status) => QueryPlan::CountBy { column: Field::Status },
        Some(column) => QueryPlan::ListDistinct { column },
        None => QueryPlan::Lookup { column: None, subject },
    }
}
