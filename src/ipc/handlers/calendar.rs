use crate::calendar::{self, Calendar};
use crate::error::{EngineError, EngineResult};
use crate::ipc::helpers::{
    db_conn, optional_i64, request_now, required_i64, required_instant, required_str, respond,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_semesters_set(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let start_date = match required_instant(req, "startDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = calendar::set_semester(conn, year, semester, start_date).map(|()| {
        tracing::info!(year, semester, start = %start_date, "semester stored");
        json!({ "year": year, "semester": semester, "startDate": start_date })
    });
    respond(req, result)
}

fn handle_semesters_get(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = calendar::check_year_and_semester(year, semester)
        .and_then(|()| Calendar::new(conn, now).get_semester(year, semester));
    respond(req, result)
}

fn handle_semesters_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = Calendar::new(conn, now)
        .semesters()
        .map(|semesters| json!({ "semesters": semesters }));
    respond(req, result)
}

fn handle_date_vars_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match required_instant(req, "date") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result =
        calendar::set_date_var(conn, &name, date).map(|()| json!({ "name": name, "date": date }));
    respond(req, result)
}

fn handle_date_vars_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = Calendar::new(conn, now)
        .date_var(&name)
        .map(|date| json!({ "name": name, "date": date }));
    respond(req, result)
}

fn current(cal: &Calendar) -> EngineResult<serde_json::Value> {
    let semester = cal.current_semester()?;
    let week = cal.current_week()?;
    // Sunday has no academic day; the rest of the answer is still useful.
    let day = match cal.current_day() {
        Ok(d) => Some(d),
        Err(EngineError::InvalidDay) => None,
        Err(e) => return Err(e),
    };
    Ok(json!({
        "semester": semester,
        "week": week,
        "day": day,
        "now": cal.now(),
    }))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, current(&Calendar::new(conn, now)))
}

fn handle_week(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
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
    let result = match week {
        Some(w) => cal.dates_of_week(w).map(|b| (w, b)),
        None => cal
            .current_week()
            .and_then(|w| cal.dates_of_current_week().map(|b| (w, b))),
    }
    .map(|(week, bounds)| {
        json!({
            "week": week,
            "startOfWeek": bounds.start_of_week,
            "endOfWeek": bounds.end_of_week,
        })
    });
    respond(req, result)
}

fn handle_day(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let now = match request_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = Calendar::new(conn, now)
        .current_day()
        .map(|day| json!({ "day": day }));
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.semesters.set" => Some(handle_semesters_set(state, req)),
        "calendar.semesters.get" => Some(handle_semesters_get(state, req)),
        "calendar.semesters.list" => Some(handle_semesters_list(state, req)),
        "calendar.dateVars.set" => Some(handle_date_vars_set(state, req)),
        "calendar.dateVars.get" => Some(handle_date_vars_get(state, req)),
        "calendar.current" => Some(handle_current(state, req)),
        "calendar.week" => Some(handle_week(state, req)),
        "calendar.day" => Some(handle_day(state, req)),
        _ => None,
    }
}
