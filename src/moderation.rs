use crate::db::to_ms;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

/// A free-text poll answer that has to be reviewed before it is recorded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRequest {
    pub discipline_teacher_id: String,
    pub subject: String,
    pub teacher_name: String,
    pub user_id: String,
    pub response: String,
    pub question_id: String,
}

/// Where free-text answers are forwarded. Delivery is fire-and-forget for the
/// submitter: a failure here never fails the submission.
pub trait ModerationChannel {
    fn verify_response(&self, request: &ModerationRequest) -> anyhow::Result<()>;
}

/// Queues moderation requests in the workspace for the notification bot to
/// pick up.
pub struct OutboxModeration<'a> {
    conn: &'a Connection,
    queued_at: DateTime<Utc>,
}

impl<'a> OutboxModeration<'a> {
    pub fn new(conn: &'a Connection, queued_at: DateTime<Utc>) -> Self {
        Self { conn, queued_at }
    }
}

impl ModerationChannel for OutboxModeration<'_> {
    fn verify_response(&self, request: &ModerationRequest) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO moderation_outbox(
               id, discipline_teacher_id, subject, teacher_name, user_id, response, question_id, created_ms
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &request.discipline_teacher_id,
                &request.subject,
                &request.teacher_name,
                &request.user_id,
                &request.response,
                &request.question_id,
                to_ms(self.queued_at),
            ),
        )?;
        Ok(())
    }
}
