mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    Conflict,
    /// A row the write refers to does not exist.
    NotFound,
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> StoreError {
        let code = e.as_database_error()
            .and_then(|de| de.code())
            .map(|code| code.into_owned());
        match code.as_deref() {
            Some("23505") => StoreError::Conflict,
            Some("23503") => StoreError::NotFound,
            _ => StoreError::Sqlx(e),
        }
    }
}

/// Persistence for questions, choices, votes and users.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn find_question(&self, id: QuestionId) -> Result<Option<Question>, StoreError>;

    /// Questions with `pub_date <= now`, newest first.
    async fn find_published_questions(&self, now: Timestamp, limit: usize) -> Result<Vec<Question>, StoreError>;

    async fn find_choices(&self, question_id: QuestionId) -> Result<Vec<Choice>, StoreError>;

    /// The choice, only if it belongs to `question_id`.
    async fn find_choice(&self, question_id: QuestionId, choice_id: ChoiceId) -> Result<Option<Choice>, StoreError>;

    async fn tally_choices(&self, question_id: QuestionId) -> Result<Vec<ChoiceTally>, StoreError>;

    async fn find_vote(&self, user_id: UserId, question_id: QuestionId) -> Result<Option<Vote>, StoreError>;

    /// Inserts the vote or, if the user already voted on the question,
    /// points the existing vote at `choice_id`. Atomic.
    async fn upsert_vote(&self, user_id: UserId, question_id: QuestionId, choice_id: ChoiceId)
    -> Result<VoteOutcome, StoreError>;

    async fn create_question(&self, question: &NewQuestion) -> Result<QuestionDetail, StoreError>;

    async fn create_choice(&self, question_id: QuestionId, choice_text: &str) -> Result<Choice, StoreError>;

    /// Removes the question with its choices and votes. `false` if it did not exist.
    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError>;

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError>;
}
