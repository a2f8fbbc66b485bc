use crate::grants::{self, NewRole};
use crate::ipc::helpers::{db_conn, parse_params, respond};
use crate::ipc::types::{AppState, Request};

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: NewRole = match parse_params(req, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, grants::create_role(conn, &input))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roles.create" => Some(handle_create(state, req)),
        _ => None,
    }
}
