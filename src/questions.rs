//! Question-set resolution shared by the poll gate and answer submission.
//!
//! Only reads; nothing here depends on the poll or schedule modules.

use crate::discipline::{self, TeacherRole};
use crate::error::{EngineError, EngineResult};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Toggle,
    Text,
    Scale,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Toggle => "TOGGLE",
            QuestionType::Text => "TEXT",
            QuestionType::Scale => "SCALE",
        }
    }

    pub fn parse(s: &str) -> Option<QuestionType> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TOGGLE" => Some(QuestionType::Toggle),
            "TEXT" => Some(QuestionType::Text),
            "SCALE" => Some(QuestionType::Scale),
            _ => None,
        }
    }

    /// Free-text answers go through moderation instead of being stored.
    pub fn is_free_text(self) -> bool {
        self == QuestionType::Text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub category: String,
    pub name: String,
    pub text: String,
    pub order: i64,
    pub is_required: bool,
    pub is_shown: bool,
    pub criteria: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCategory {
    pub name: String,
    pub count: usize,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRoleInput {
    pub role: TeacherRole,
    #[serde(default = "default_true")]
    pub is_shown: bool,
    #[serde(default)]
    pub is_required: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub roles: Vec<QuestionRoleInput>,
}

fn default_true() -> bool {
    true
}

fn insert_question(conn: &Connection, input: &QuestionInput) -> EngineResult<String> {
    if input.name.trim().is_empty() {
        return Err(EngineError::ObjectIsRequired("name".to_string()));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO questions(id, category, name, text, sort_order, is_required, criteria, type)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            input.category.trim(),
            input.name.trim(),
            &input.text,
            input.order,
            input.is_required,
            &input.criteria,
            input.kind.as_str(),
        ),
    )?;
    for role in &input.roles {
        conn.execute(
            "INSERT INTO question_roles(question_id, role, is_shown, is_required) VALUES(?, ?, ?, ?)
             ON CONFLICT(question_id, role) DO UPDATE SET
               is_shown = excluded.is_shown,
               is_required = excluded.is_required",
            (&id, role.role.as_str(), role.is_shown, role.is_required),
        )?;
    }
    Ok(id)
}

pub fn create_question(conn: &Connection, input: &QuestionInput) -> EngineResult<String> {
    let tx = conn.unchecked_transaction()?;
    let id = insert_question(&tx, input)?;
    tx.commit()?;
    Ok(id)
}

/// Stores a batch of questions; one invalid entry leaves nothing behind.
pub fn create_questions(conn: &Connection, inputs: &[QuestionInput]) -> EngineResult<Vec<String>> {
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        ids.push(insert_question(&tx, input)?);
    }
    tx.commit()?;
    tracing::info!(created = ids.len(), "questions created");
    Ok(ids)
}

/// Questions linked to `role`, one row per link.
fn questions_for_role(conn: &Connection, role: TeacherRole) -> EngineResult<Vec<Question>> {
    let mut stmt = conn.prepare(
        "SELECT q.id, q.category, q.name, q.text, q.sort_order, q.is_required, q.criteria, q.type,
                qr.is_shown, qr.is_required
         FROM questions q
         JOIN question_roles qr ON qr.question_id = q.id
         WHERE qr.role = ?
         ORDER BY q.sort_order, q.id",
    )?;
    let rows = stmt
        .query_map([role.as_str()], |r| {
            let kind_raw: String = r.get(7)?;
            let question_required: bool = r.get(5)?;
            let role_required: bool = r.get(9)?;
            Ok((
                Question {
                    id: r.get(0)?,
                    category: r.get(1)?,
                    name: r.get(2)?,
                    text: r.get(3)?,
                    order: r.get(4)?,
                    is_required: question_required || role_required,
                    is_shown: r.get(8)?,
                    criteria: r.get(6)?,
                    kind: QuestionType::Toggle,
                },
                kind_raw,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (mut q, kind_raw) in rows {
        q.kind = QuestionType::parse(&kind_raw).ok_or_else(|| {
            EngineError::InvalidQuery(format!("question {} has unknown type {}", q.id, kind_raw))
        })?;
        out.push(q);
    }
    Ok(out)
}

/// Collapses questions reached through several roles into one entry each,
/// keeping first-seen order. A question stays required or shown if any of
/// its links says so.
pub fn unify_questions(questions: Vec<Question>) -> Vec<Question> {
    let mut out: Vec<Question> = Vec::new();
    for q in questions {
        match out.iter_mut().find(|existing| existing.id == q.id) {
            Some(existing) => {
                existing.is_required |= q.is_required;
                existing.is_shown |= q.is_shown;
            }
            None => out.push(q),
        }
    }
    out.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    out
}

pub fn questions_for_roles(conn: &Connection, roles: &[TeacherRole]) -> EngineResult<Vec<Question>> {
    let mut all = Vec::new();
    for role in roles {
        all.extend(questions_for_role(conn, *role)?);
    }
    Ok(unify_questions(all))
}

/// The question set a student answers about one discipline teacher: the
/// teacher's own roles together with every role present in the discipline.
pub fn applicable_questions(conn: &Connection, discipline_teacher_id: &str) -> EngineResult<Vec<Question>> {
    let dt = discipline::discipline_teacher(conn, discipline_teacher_id)?;
    let mut roles = discipline::teacher_roles(conn, &dt.id)?;
    for role in discipline::discipline_roles(conn, &dt.discipline_id)? {
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    questions_for_roles(conn, &roles)
}

pub fn sort_by_categories(questions: Vec<Question>) -> Vec<QuestionCategory> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, Vec<Question>> = HashMap::new();
    for q in questions {
        if !by_name.contains_key(&q.category) {
            order.push(q.category.clone());
        }
        by_name.entry(q.category.clone()).or_default().push(q);
    }
    order
        .into_iter()
        .map(|name| {
            let questions = by_name.remove(&name).unwrap_or_default();
            QuestionCategory {
                count: questions.len(),
                name,
                questions,
            }
        })
        .collect()
}
