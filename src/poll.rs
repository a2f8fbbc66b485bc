//! Poll answer window, eligibility gate and answer submission.
//!
//! Every submission is validated completely before anything is written;
//! after that each answer is stored or forwarded on its own.

use crate::calendar::Calendar;
use crate::discipline::{self, DisciplineTeacher};
use crate::error::{EngineError, EngineResult};
use crate::moderation::{ModerationChannel, ModerationRequest};
use crate::questions::{self, Question, QuestionCategory};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const USER_STATE_APPROVED: &str = "APPROVED";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    pub question_id: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTimeBorders {
    pub start_poll: DateTime<Utc>,
    pub end_poll: DateTime<Utc>,
}

pub fn poll_var_names(year: i64, semester: i64) -> (String, String) {
    (
        format!("START_POLL_{}_{}", year, semester),
        format!("END_POLL_{}_{}", year, semester),
    )
}

pub fn poll_time_borders(cal: &Calendar) -> EngineResult<PollTimeBorders> {
    let current = cal.current_semester()?;
    let (start_name, end_name) = poll_var_names(current.year, current.semester);
    Ok(PollTimeBorders {
        start_poll: cal.date_var(&start_name)?,
        end_poll: cal.date_var(&end_name)?,
    })
}

pub fn check_sending_time(cal: &Calendar) -> EngineResult<()> {
    let borders = poll_time_borders(cal)?;
    let now = cal.now();
    if now < borders.start_poll || now > borders.end_poll {
        return Err(EngineError::WrongTime);
    }
    Ok(())
}

pub fn check_answer_in_database(
    conn: &Connection,
    discipline_teacher_id: &str,
    user_id: &str,
) -> EngineResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM answers WHERE discipline_teacher_id = ? AND user_id = ? LIMIT 1",
            (discipline_teacher_id, user_id),
            |r| r.get(0),
        )
        .optional()?;
    if found.is_some() {
        return Err(EngineError::AnswerAlreadyInDatabase);
    }
    Ok(())
}

pub fn is_removed(conn: &Connection, discipline_teacher_id: &str, user_id: &str) -> EngineResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM removed_discipline_teachers
             WHERE discipline_teacher_id = ? AND user_id = ?",
            (discipline_teacher_id, user_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl Eligibility {
    fn denied(reason: &'static str) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

pub fn eligible_for_poll(
    cal: &Calendar,
    discipline_teacher_id: &str,
    user_id: &str,
) -> EngineResult<Eligibility> {
    let conn = cal.conn();
    let dt = discipline::discipline_teacher(conn, discipline_teacher_id)?;
    if !cal.is_previous_semester(dt.year, dt.semester)? {
        return Ok(Eligibility::denied("wrong_semester"));
    }
    if is_removed(conn, &dt.id, user_id)? {
        return Ok(Eligibility::denied("removed"));
    }
    if let Err(EngineError::AnswerAlreadyInDatabase) = check_answer_in_database(conn, &dt.id, user_id) {
        return Ok(Eligibility::denied("already_answered"));
    }
    Ok(Eligibility {
        eligible: true,
        reason: None,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSheet {
    pub discipline_teacher_id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub subject: String,
    pub categories: Vec<QuestionCategory>,
}

pub fn get_questions(
    cal: &Calendar,
    discipline_teacher_id: &str,
    user_id: &str,
) -> EngineResult<QuestionSheet> {
    let conn = cal.conn();
    check_answer_in_database(conn, discipline_teacher_id, user_id)?;
    check_sending_time(cal)?;
    let dt = discipline::discipline_teacher(conn, discipline_teacher_id)?;
    if is_removed(conn, &dt.id, user_id)? {
        return Err(EngineError::NoPermission);
    }
    let questions = questions::applicable_questions(conn, &dt.id)?;
    Ok(QuestionSheet {
        discipline_teacher_id: dt.id,
        teacher_id: dt.teacher_id,
        teacher_name: dt.teacher_name,
        subject: dt.subject_name,
        categories: questions::sort_by_categories(questions),
    })
}

pub fn check_excessive_questions(questions: &[Question], answers: &[AnswerInput]) -> EngineResult<()> {
    for answer in answers {
        if !questions.iter().any(|q| q.id == answer.question_id) {
            return Err(EngineError::ExcessiveAnswer);
        }
    }
    Ok(())
}

pub fn check_required_questions(questions: &[Question], answers: &[AnswerInput]) -> EngineResult<()> {
    for question in questions.iter().filter(|q| q.is_required) {
        if !answers.iter().any(|a| a.question_id == question.id) {
            return Err(EngineError::NotEnoughAnswers);
        }
    }
    Ok(())
}

pub fn check_answered_questions(
    conn: &Connection,
    discipline_teacher_id: &str,
    answers: &[AnswerInput],
    user_id: &str,
) -> EngineResult<()> {
    let mut stmt = conn.prepare(
        "SELECT 1 FROM answers WHERE discipline_teacher_id = ? AND user_id = ? AND question_id = ?",
    )?;
    for answer in answers {
        if stmt.exists((discipline_teacher_id, user_id, &answer.question_id))? {
            return Err(EngineError::AlreadyAnswered(answer.question_id.clone()));
        }
    }
    Ok(())
}

pub fn check_is_unique(answers: &[AnswerInput]) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for answer in answers {
        if !seen.insert(answer.question_id.as_str()) {
            return Err(EngineError::ExcessiveAnswer);
        }
    }
    Ok(())
}

fn check_user_approved(conn: &Connection, user_id: &str) -> EngineResult<()> {
    let state: Option<String> = conn
        .query_row("SELECT state FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?;
    match state {
        None => Err(EngineError::InvalidEntityId("user".to_string())),
        Some(s) if s == USER_STATE_APPROVED => Ok(()),
        Some(_) => Err(EngineError::NoPermission),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub stored: usize,
    pub forwarded: usize,
    pub forward_failures: usize,
}

pub fn send_answers(
    cal: &Calendar,
    moderation: &dyn ModerationChannel,
    discipline_teacher_id: &str,
    answers: &[AnswerInput],
    user_id: &str,
) -> EngineResult<SubmissionReport> {
    let conn = cal.conn();
    let questions = questions::applicable_questions(conn, discipline_teacher_id)?;
    check_excessive_questions(&questions, answers)?;
    check_required_questions(&questions, answers)?;
    check_answered_questions(conn, discipline_teacher_id, answers, user_id)?;
    check_is_unique(answers)?;
    check_sending_time(cal)?;

    check_user_approved(conn, user_id)?;
    if is_removed(conn, discipline_teacher_id, user_id)? {
        return Err(EngineError::NoPermission);
    }

    let dt = discipline::discipline_teacher(conn, discipline_teacher_id)?;
    if !cal.is_previous_semester(dt.year, dt.semester)? {
        return Err(EngineError::WrongTime);
    }

    let mut report = SubmissionReport::default();
    for answer in answers {
        let free_text = questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .map(|q| q.kind.is_free_text())
            .unwrap_or(false);
        if free_text {
            match moderation.verify_response(&moderation_request(&dt, user_id, answer)) {
                Ok(()) => report.forwarded += 1,
                Err(e) => {
                    tracing::warn!(
                        discipline_teacher_id = %dt.id,
                        question_id = %answer.question_id,
                        "moderation forward failed: {e:#}"
                    );
                    report.forward_failures += 1;
                }
            }
        } else {
            store_answer(conn, &dt.id, user_id, answer)?;
            report.stored += 1;
        }
    }

    tracing::info!(
        discipline_teacher_id = %dt.id,
        user_id,
        stored = report.stored,
        forwarded = report.forwarded,
        "poll answers accepted"
    );
    Ok(report)
}

fn moderation_request(dt: &DisciplineTeacher, user_id: &str, answer: &AnswerInput) -> ModerationRequest {
    ModerationRequest {
        discipline_teacher_id: dt.id.clone(),
        subject: dt.subject_name.clone(),
        teacher_name: dt.teacher_name.clone(),
        user_id: user_id.to_string(),
        response: answer.value.clone(),
        question_id: answer.question_id.clone(),
    }
}

fn store_answer(
    conn: &Connection,
    discipline_teacher_id: &str,
    user_id: &str,
    answer: &AnswerInput,
) -> EngineResult<()> {
    let res = conn.execute(
        "INSERT INTO answers(discipline_teacher_id, user_id, question_id, value) VALUES(?, ?, ?, ?)",
        (discipline_teacher_id, user_id, &answer.question_id, &answer.value),
    );
    match res {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(EngineError::AlreadyAnswered(answer.question_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(q: &str) -> AnswerInput {
        AnswerInput {
            question_id: q.to_string(),
            value: "1".to_string(),
        }
    }

    fn question(id: &str, required: bool) -> Question {
        Question {
            id: id.to_string(),
            category: "c".to_string(),
            name: id.to_string(),
            text: String::new(),
            order: 0,
            is_required: required,
            is_shown: true,
            criteria: None,
            kind: questions::QuestionType::Toggle,
        }
    }

    #[test]
    fn batch_checks_reject_contract_violations() {
        let set = vec![question("q1", true), question("q2", true), question("q5", true)];
        assert!(matches!(
            check_required_questions(&set, &[answer("q1"), answer("q5")]),
            Err(EngineError::NotEnoughAnswers)
        ));
        assert!(matches!(
            check_excessive_questions(&set, &[answer("q1"), answer("q3")]),
            Err(EngineError::ExcessiveAnswer)
        ));
        assert!(matches!(
            check_is_unique(&[answer("q1"), answer("q2"), answer("q2")]),
            Err(EngineError::ExcessiveAnswer)
        ));
        let full = [answer("q1"), answer("q2"), answer("q5")];
        assert!(check_required_questions(&set, &full).is_ok());
        assert!(check_excessive_questions(&set, &full).is_ok());
        assert!(check_is_unique(&full).is_ok());
    }

    use crate::calendar::tests::{test_conn, utc};
    use crate::calendar::{set_date_var, set_semester};
    use crate::discipline::{DisciplineKind, TeacherRole};

    struct OfflineModeration;

    impl ModerationChannel for OfflineModeration {
        fn verify_response(&self, _request: &ModerationRequest) -> anyhow::Result<()> {
            anyhow::bail!("moderation bot is offline")
        }
    }

    struct Fixture {
        conn: Connection,
        dt: String,
        toggle: String,
        scale: String,
        text: String,
    }

    /// A lecturer of a 2022/2 discipline, polled during 2023/1.
    fn fixture() -> Fixture {
        let conn = test_conn();
        set_semester(&conn, 2022, 2, utc(2022, 2, 7, 0, 0)).expect("2022/2");
        set_semester(&conn, 2023, 1, utc(2022, 9, 5, 0, 0)).expect("2023/1");
        set_date_var(&conn, "START_POLL_2023_1", utc(2022, 11, 1, 0, 0)).expect("start");
        set_date_var(&conn, "END_POLL_2023_1", utc(2022, 12, 31, 0, 0)).expect("end");

        let group = discipline::get_or_create_group(&conn, "KI-21").expect("group");
        conn.execute(
            "INSERT INTO users(id, group_id, state) VALUES('u1', ?, 'APPROVED')",
            [&group],
        )
        .expect("user");
        let subject = discipline::get_or_create_subject(&conn, "Algorithms").expect("subject");
        let discipline_id = discipline::get_or_create_discipline(&conn, &subject, &group, 2022, 2)
            .expect("discipline");
        let teacher = discipline::get_or_create_teacher(&conn, "Franko", "Ivan", "Yakovych")
            .expect("teacher");
        let type_id = discipline::ensure_discipline_type(&conn, &discipline_id, DisciplineKind::Lecture)
            .expect("type");
        let dt = discipline::ensure_discipline_teacher(&conn, &teacher, &discipline_id).expect("dt");
        discipline::ensure_teacher_role(&conn, &dt, &type_id, TeacherRole::Lecturer).expect("role");

        let create = |name: &str, kind: &str| {
            let input: questions::QuestionInput = serde_json::from_value(serde_json::json!({
                "category": "Teaching",
                "name": name,
                "type": kind,
                "roles": [{ "role": "LECTURER", "isRequired": true }]
            }))
            .expect("question input");
            questions::create_question(&conn, &input).expect("question")
        };
        let toggle = create("Starts on time", "TOGGLE");
        let scale = create("Explains clearly", "SCALE");
        let text = create("Anything else", "TEXT");
        Fixture {
            conn,
            dt,
            toggle,
            scale,
            text,
        }
    }

    fn stored_answers(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM answers", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn failed_forward_does_not_fail_the_submission() {
        let f = fixture();
        let cal = Calendar::new(&f.conn, utc(2022, 12, 1, 10, 0));
        let answers = [
            answer(&f.toggle),
            answer(&f.scale),
            AnswerInput {
                question_id: f.text.clone(),
                value: "More examples please".to_string(),
            },
        ];
        let report = send_answers(&cal, &OfflineModeration, &f.dt, &answers, "u1").expect("submitted");
        assert_eq!(report.stored, 2);
        assert_eq!(report.forwarded, 0);
        assert_eq!(report.forward_failures, 1);
        assert_eq!(stored_answers(&f.conn), 2);
        let text_rows: i64 = f
            .conn
            .query_row(
                "SELECT COUNT(*) FROM answers WHERE question_id = ?",
                [&f.text],
                |r| r.get(0),
            )
            .expect("count text");
        assert_eq!(text_rows, 0);
    }

    #[test]
    fn unique_violation_on_insert_reports_the_question() {
        let f = fixture();
        store_answer(&f.conn, &f.dt, "u1", &answer(&f.scale)).expect("first insert");
        match store_answer(&f.conn, &f.dt, "u1", &answer(&f.scale)) {
            Err(EngineError::AlreadyAnswered(question_id)) => assert_eq!(question_id, f.scale),
            other => panic!("expected AlreadyAnswered, got {other:?}"),
        }
        assert!(store_answer(&f.conn, &f.dt, "u2", &answer(&f.scale)).is_ok());
        assert_eq!(stored_answers(&f.conn), 2);
    }

    #[test]
    fn poll_variables_are_keyed_by_semester() {
        assert_eq!(
            poll_var_names(2023, 2),
            ("START_POLL_2023_2".to_string(), "END_POLL_2023_2".to_string())
        );
    }
}
