use crate::calendar::Calendar;
use crate::ipc::helpers::{
    db_conn, optional_i64, optional_str, parse_params, request_now, required_i64, required_str,
    respond,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, EventFilter, EventInfoPatch, ImportPair, NewEvent};
use serde_json::json;

fn handle_general_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let week = match optional_i64(req, "week") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter: EventFilter = match parse_params(req, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    respond(req, schedule::general_group_events(&cal, &group_id, week, filter))
}

fn handle_group_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let week = match optional_i64(req, "week") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter: EventFilter = match parse_params(req, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    respond(req, schedule::group_events(&cal, &group_id, &user_id, week, filter))
}

fn handle_day_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day = match optional_i64(req, "day") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter: EventFilter = match parse_params(req, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = optional_str(req, "userId");
    let cal = Calendar::new(conn, now);
    respond(
        req,
        schedule::day_filtered_events(&cal, &group_id, user_id.as_deref(), day, filter),
    )
}

fn handle_event_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let event_id = match required_str(req, "eventId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let week = match optional_i64(req, "week") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    let result = schedule::event_for_id(&cal, &event_id, week)
        .map(|event| json!({ "event": event, "week": week }));
    respond(req, result)
}

fn handle_event_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: NewEvent = match parse_params(req, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    respond(req, schedule::create_group_event(&cal, &input))
}

fn handle_event_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let event_id = match required_str(req, "eventId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, schedule::delete_event(conn, &event_id))
}

fn handle_event_info_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let event_id = match required_str(req, "eventId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let week = match required_i64(req, "week") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch: EventInfoPatch = match parse_params(req, Some("patch")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cal = Calendar::new(conn, now);
    let result = schedule::update_event_info(&cal, &event_id, week, &patch)
        .map(|info| json!({ "eventInfo": info }));
    respond(req, result)
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let year = match required_i64(req, "year") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester = match required_i64(req, "semester") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let pairs: Vec<ImportPair> = match parse_params(req, Some("pairs")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, schedule::import_pairs(conn, year, semester, &pairs, now))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.general.list" => Some(handle_general_list(state, req)),
        "schedule.group.list" => Some(handle_group_list(state, req)),
        "schedule.day.list" => Some(handle_day_list(state, req)),
        "schedule.event.get" => Some(handle_event_get(state, req)),
        "schedule.event.create" => Some(handle_event_create(state, req)),
        "schedule.event.delete" => Some(handle_event_delete(state, req)),
        "schedule.event.info.update" => Some(handle_event_info_update(state, req)),
        "schedule.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
