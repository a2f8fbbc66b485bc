//! Roles and their permission grants.
//!
//! A role's weight is derived from how specific its grants are, so more
//! narrowly scoped roles outrank broad ones. It is computed when the role is
//! stored and never looked up from a fixed table.

use crate::error::{EngineError, EngineResult};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const WILDCARD: &str = "*";

/// Number of concrete (non-wildcard) segments in a dotted permission.
pub fn grant_weight(permission: &str) -> usize {
    permission
        .split('.')
        .filter(|segment| !segment.is_empty() && *segment != WILDCARD)
        .count()
}

pub fn role_weight<'a, I>(grants: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    grants.into_iter().map(grant_weight).max().unwrap_or(0)
}

fn check_permission(permission: &str) -> EngineResult<()> {
    if permission.is_empty() || permission.split('.').any(|s| s.trim().is_empty()) {
        return Err(EngineError::InvalidQuery(format!(
            "malformed permission '{}'",
            permission
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub grants: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedRole {
    pub id: String,
    pub name: String,
    pub weight: usize,
    pub grants: Vec<String>,
}

pub fn create_role(conn: &Connection, input: &NewRole) -> EngineResult<CreatedRole> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(EngineError::ObjectIsRequired("name".to_string()));
    }
    let mut grants: Vec<String> = Vec::new();
    for raw in &input.grants {
        let permission = raw.trim();
        check_permission(permission)?;
        if !grants.iter().any(|g| g == permission) {
            grants.push(permission.to_string());
        }
    }
    let weight = role_weight(grants.iter().map(String::as_str));

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO roles(id, name, weight) VALUES(?, ?, ?)",
        (&id, name, weight as i64),
    )?;
    for permission in &grants {
        tx.execute(
            "INSERT INTO grants(role_id, permission) VALUES(?, ?)",
            (&id, permission),
        )?;
    }
    tx.commit()?;

    tracing::info!(role_id = %id, weight, "role created");
    Ok(CreatedRole {
        id,
        name: name.to_string(),
        weight,
        grants,
    })
}
