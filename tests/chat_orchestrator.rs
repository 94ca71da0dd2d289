//! Question answering against a scheduling dataset

use pretty_assertions::assert_eq;
use resplan::chat::{ChatSession, ChatSettings, Orchestrator, Outcome, QueryOp};
use resplan::core::{Field, Lovs, MONTHS, Schedule, ScheduleRecord};
use resplan::providers::{CompletionClient, CompletionRequest, LlmError};
use resplan::services::sample::sample_schedule;

fn month_totals(schedule: &Schedule, user: &str) -> [i64; 12] {
    let mut totals = [0i64; 12];
    for r in schedule.records.iter().filter(|r| r.user.as_deref() == Some(user)) {
        for (slot, v) in totals.iter_mut().zip(r.months.iter()) {
            *slot += v.unwrap_or(0);
        }
    }
    totals
}

#[test]
fn test_info_on_a_known_user() {
    let schedule = sample_schedule(2025);
    let orchestrator = Orchestrator::new(&schedule, ChatSettings::default());
    let reply = orchestrator.respond("Dammi info su M. Sorrentino", &[], &[]);

    assert_eq!(
        reply.outcome,
        Outcome::Answered(QueryOp::EntityProfile { column: Field::User, values: vec!["M. Sorrentino".into()] })
    );

    let totals = month_totals(&schedule, "M. Sorrentino");
    for (month, total) in MONTHS.iter().zip(totals.iter()) {
        assert!(reply.text.contains(&format!("| {} | {} |", month, total)), "missing {month} row");
    }
    let grand: i64 = totals.iter().sum();
    assert!(reply.text.contains(&format!("| **Total** | **{}** |", grand)));

    let records = schedule.records.iter().filter(|r| r.user.as_deref() == Some("M. Sorrentino")).count();
    assert!(reply.text.contains(&format!("({} records)", records)));
}

#[test]
fn test_initial_tells_apart_users_sharing_a_surname() {
    let person = |user: &str, project: &str, months: [Option<i64>; 12]| ScheduleRecord {
        project_descr: Some(project.into()),
        user: Some(user.into()),
        months,
        ..Default::default()
    };
    let schedule = Schedule::new(
        vec![
            person("A. Bianchi", "Apollo", [Some(4); 12]),
            person("L. Bianchi", "Zeus", [Some(11); 12]),
            person("A. Bianchi", "Hermes", [Some(2); 12]),
        ],
        Lovs::default(),
    );
    let orchestrator = Orchestrator::new(&schedule, ChatSettings::default());

    let reply = orchestrator.respond("Dammi info su A. Bianchi", &[], &[]);
    assert_eq!(
        reply.outcome,
        Outcome::Answered(QueryOp::EntityProfile { column: Field::User, values: vec!["A. Bianchi".into()] })
    );
    for month in MONTHS {
        assert!(reply.text.contains(&format!("| {} | 6 |", month)), "missing {month} row");
    }
    assert!(reply.text.contains("| **Total** | **72** |"));
    assert!(!reply.text.contains("Zeus"));

    let reply = orchestrator.respond("Dammi info su L. Bianchi", &[], &[]);
    assert_eq!(
        reply.outcome,
        Outcome::Answered(QueryOp::EntityProfile { column: Field::User, values: vec!["L. Bianchi".into()] })
    );
}

#[test]
fn test_unknown_user_lists_at_most_ten_values() {
    let records = (0..15)
        .map(|i| ScheduleRecord {
            project_descr: Some(format!("Progetto{:02}", i)),
            user: Some(format!("Persona{:02}", i)),
            months: [Some(3); 12],
            ..Default::default()
        })
        .collect();
    let schedule = Schedule::new(records, Lovs::default());
    let orchestrator = Orchestrator::new(&schedule, ChatSettings::default());
    let reply = orchestrator.respond("Dammi info su Zebedeo Quarantotto", &[], &[]);

    assert_eq!(
        reply.outcome,
        Outcome::NotFound { column: Field::User, subject: "zebedeo quarantotto".into() }
    );
    assert!(reply.text.starts_with("Not found"));
    let listed: Vec<&str> = reply.text.lines().filter(|l| l.starts_with("- ")).collect();
    assert_eq!(listed.len(), 10);
    assert!(listed.iter().all(|l| l.starts_with("- Persona")));
    assert!(reply.text.contains("(10 of 15 values shown)"));
    // nothing that looks like data
    assert!(!reply.text.contains("| Month |"));
    assert!(!reply.text.contains("Progetto"));
}

#[test]
fn test_status_counts_and_distinct_clients() {
    let schedule = sample_schedule(2025);
    let orchestrator = Orchestrator::new(&schedule, ChatSettings::default());

    let reply = orchestrator.respond("Quanti progetti per status?", &[], &[]);
    assert_eq!(reply.outcome, Outcome::Answered(QueryOp::CountBy { column: Field::Status }));
    assert!(reply.text.contains("| STATUS | Records |"));

    let reply = orchestrator.respond("Elenco clienti", &[], &[]);
    assert_eq!(reply.outcome, Outcome::Answered(QueryOp::ListDistinct { column: Field::Client }));
    for client in schedule.distinct(Field::Client) {
        assert!(reply.text.contains(&format!("- {client}")));
    }
}

struct Unreachable;

impl CompletionClient for Unreachable {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        Err(LlmError::Network("connection refused".into()))
    }
}

#[test]
fn test_session_keeps_history_and_survives_llm_errors() {
    let schedule = sample_schedule(2025);
    let llm = Unreachable;
    let orchestrator = Orchestrator::new(&schedule, ChatSettings::default()).with_llm(&llm);
    let mut session = ChatSession::new();

    let general = session.ask(&orchestrator, "Ciao, come stai?", &[]);
    assert_eq!(general.text, "⚠️ network error: connection refused");

    let data = session.ask(&orchestrator, "Dammi info su M. Sorrentino", &[]);
    assert!(matches!(data.outcome, Outcome::Answered(_)));
    assert_eq!(session.messages().len(), 4);
}
