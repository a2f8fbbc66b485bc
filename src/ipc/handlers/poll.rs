use crate::calendar::Calendar;
use crate::ipc::helpers::{db_conn, parse_params, request_now, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::moderation::OutboxModeration;
use crate::poll::{self, AnswerInput};
use crate::questions::{self, QuestionInput};
use serde_json::json;

fn handle_time_borders(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    respond(req, poll::poll_time_borders(&cal))
}

fn handle_questions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let dt_id = match required_str(req, "disciplineTeacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    respond(req, poll::get_questions(&cal, &dt_id, &user_id))
}

fn handle_questions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let inputs: Vec<QuestionInput> = match parse_params(req, Some("questions")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = questions::create_questions(conn, &inputs).map(|ids| json!({ "ids": ids }));
    respond(req, result)
}

fn handle_answers_send(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let dt_id = match required_str(req, "disciplineTeacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let answers: Vec<AnswerInput> = match parse_params(req, Some("answers")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    let moderation = OutboxModeration::new(conn, now);
    let result = poll::send_answers(&cal, &moderation, &dt_id, &answers, &user_id);
    if let Err(e) = &result {
        tracing::info!(
            discipline_teacher_id = %dt_id,
            user_id = %user_id,
            code = e.code(),
            "poll submission rejected"
        );
    }
    respond(req, result)
}

fn handle_eligible(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let dt_id = match required_str(req, "disciplineTeacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    respond(req, poll::eligible_for_poll(&cal, &dt_id, &user_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "poll.timeBorders" => Some(handle_time_borders(state, req)),
        "poll.questions.list" => Some(handle_questions_list(state, req)),
        "poll.questions.create" => Some(handle_questions_create(state, req)),
        "poll.answers.send" => Some(handle_answers_send(state, req)),
        "poll.eligible" => Some(handle_eligible(state, req)),
        _ => None,
    }
}
