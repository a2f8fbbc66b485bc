use serde_json::json;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Request-scoped failures of the scheduling and poll engine.
///
/// None of these are fatal to the daemon; every variant is reported back to
/// the caller with a stable code from [`EngineError::code`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid {0} id")]
    InvalidEntityId(String),
    #[error("no semester contains the current date")]
    DataNotFound,
    #[error("week is not valid")]
    InvalidWeek,
    #[error("day must be between 1 and 6")]
    InvalidDay,
    #[error("date is not valid for the current semester")]
    InvalidDate,
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("operation is not available at this time")]
    WrongTime,
    #[error("answer does not match the question set")]
    ExcessiveAnswer,
    #[error("not all required questions are answered")]
    NotEnoughAnswers,
    #[error("question {0} is already answered")]
    AlreadyAnswered(String),
    #[error("answers for this teacher are already recorded")]
    AnswerAlreadyInDatabase,
    #[error("no permission")]
    NoPermission,
    #[error("{0} is required")]
    ObjectIsRequired(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidEntityId(_) => "invalid_entity_id",
            Self::DataNotFound => "data_not_found",
            Self::InvalidWeek => "invalid_week",
            Self::InvalidDay => "invalid_day",
            Self::InvalidDate => "invalid_date",
            Self::InvalidQuery(_) => "invalid_query",
            Self::WrongTime => "wrong_time",
            Self::ExcessiveAnswer => "excessive_answer",
            Self::NotEnoughAnswers => "not_enough_answers",
            Self::AlreadyAnswered(_) => "already_answered",
            Self::AnswerAlreadyInDatabase => "answer_already_in_database",
            Self::NoPermission => "no_permission",
            Self::ObjectIsRequired(_) => "object_is_required",
            Self::Database(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::AlreadyAnswered(question_id) => Some(json!({ "questionId": question_id })),
            Self::ObjectIsRequired(field) => Some(json!({ "field": field })),
            Self::NotFound(what) | Self::InvalidEntityId(what) => {
                Some(json!({ "entity": what }))
            }
            _ => None,
        }
    }
}
