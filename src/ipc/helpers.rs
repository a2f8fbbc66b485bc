use crate::calendar::parse_instant;
use crate::error::EngineResult;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an integer", key), None)),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    optional_i64(req, key)?
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_instant(req: &Request, key: &str) -> Result<DateTime<Utc>, serde_json::Value> {
    let raw = required_str(req, key)?;
    parse_instant(&raw)
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} is not a date: {}", key, raw), None))
}

/// The instant every calendar decision of this request is made against.
pub fn request_now(req: &Request) -> Result<DateTime<Utc>, serde_json::Value> {
    match optional_str(req, "now") {
        Some(raw) => parse_instant(&raw)
            .ok_or_else(|| err(&req.id, "bad_params", format!("now is not a date: {}", raw), None)),
        None => Ok(Utc::now()),
    }
}

/// Deserializes `params[key]`, or the whole params object when `key` is None.
pub fn parse_params<T: DeserializeOwned>(
    req: &Request,
    key: Option<&str>,
) -> Result<T, serde_json::Value> {
    let value = match key {
        Some(k) => req
            .params
            .get(k)
            .cloned()
            .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", k), None))?,
        None => req.params.clone(),
    };
    serde_json::from_value(value).map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

pub fn respond<T: Serialize>(req: &Request, result: EngineResult<T>) -> serde_json::Value {
    match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(json) => ok(&req.id, json),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => {
            tracing::debug!(method = %req.method, code = e.code(), "request rejected: {e}");
            engine_err(&req.id, &e)
        }
    }
}
