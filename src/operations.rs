use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::{auth, model::*, util};
use crate::store::{PollStore, StoreError};

#[cfg(test)]
use mockall::automock;

/// How many questions the index shows.
pub const INDEX_SIZE: usize = 5;

/// Longest question or choice text, in characters. Matches the `varchar(200)` columns.
pub const MAX_TEXT_LEN: usize = 200;
/// Longest username, in characters. Matches `app_user.username`.
pub const MAX_USERNAME_LEN: usize = 150;

#[derive(Debug)]
pub enum GetQuestionError {
    NotFound,
    Unexpected,
}

impl From<StoreError> for GetQuestionError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Unexpected
    }
}

#[derive(Debug)]
pub enum DetailError {
    NotFound,
    NotVotable,
    Unexpected,
}

impl From<StoreError> for DetailError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Unexpected
    }
}

#[derive(Debug)]
pub enum VoteError {
    QuestionNotFound,
    NotVotable,
    /// The submitted choice is missing or belongs to another question. Carries
    /// the question so the caller can show it again.
    NoChoiceSelected(QuestionDetail),
    Unexpected,
}

impl From<StoreError> for VoteError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Unexpected
    }
}

#[derive(Debug)]
pub enum LoginError {
    BadCredentials,
    Unexpected,
}

impl From<StoreError> for LoginError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Unexpected
    }
}

#[derive(Debug)]
pub enum CreateUserError {
    Blank,
    TooLong,
    UsernameTaken(String),
    Unexpected,
}

#[derive(Debug)]
pub enum CreateQuestionError {
    BlankText,
    /// Question or choice text longer than `MAX_TEXT_LEN`.
    TooLong(String),
    EndBeforePublication,
    DuplicateChoice(String),
    Unexpected,
}

impl From<StoreError> for CreateQuestionError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Unexpected
    }
}

#[derive(Debug)]
pub enum AddChoiceError {
    QuestionNotFound,
    BlankText,
    TooLong,
    DuplicateChoice(String),
    Unexpected,
}

impl From<StoreError> for AddChoiceError {
    fn from(e: StoreError) -> Self {
        log_store_error(e);
        Self::Unexpected
    }
}

fn log_store_error(e: StoreError) {
    match e {
        StoreError::Sqlx(e) => {
            error!("unexpected sql error: {:?}", e);
            if let Some(e) = e.into_database_error() {
                error!("{}", e.message())
            };
        },
        other => error!("unexpected store error: {:?}", other),
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PollOperationsT {
    /// The newest published questions, at most `INDEX_SIZE` of them.
    async fn latest_questions(&self) -> Result<Vec<Question>, GetQuestionError>;
    /// The question and its choices, if voting on it is open right now.
    async fn get_votable_question(&self, question_id: QuestionId) -> Result<QuestionDetail, DetailError>;
    async fn get_results(&self, question_id: QuestionId) -> Result<QuestionResults, GetQuestionError>;
    /// The choice `user` currently has on the question, if any.
    async fn current_choice(&self, user: &User, question_id: QuestionId) -> Result<Option<ChoiceId>, GetQuestionError>;
    async fn vote(&self, user: &User, question_id: QuestionId, choice_id: Option<ChoiceId>)
    -> Result<VoteOutcome, VoteError>;
    async fn login(&self, username: &str, password: &str) -> Result<User, LoginError>;
    async fn create_user(&self, username: &str, password: &str) -> Result<User, CreateUserError>;
    async fn create_question(&self, request: &NewQuestion) -> Result<QuestionDetail, CreateQuestionError>;
    async fn add_choice(&self, question_id: QuestionId, choice_text: &str) -> Result<Choice, AddChoiceError>;
    async fn delete_question(&self, question_id: QuestionId) -> Result<(), GetQuestionError>;
}

#[derive(Clone)]
pub struct PollOperations {
    store: Arc<dyn PollStore>,
}

impl PollOperations {
    pub fn new(store: Arc<dyn PollStore>) -> PollOperations {
        PollOperations {
            store
        }
    }
}

#[async_trait]
impl PollOperationsT for PollOperations {

    async fn latest_questions(&self) -> Result<Vec<Question>, GetQuestionError> {
        Ok(self.store.find_published_questions(Utc::now(), INDEX_SIZE).await?)
    }

    async fn get_votable_question(&self, question_id: QuestionId) -> Result<QuestionDetail, DetailError> {
        let question = self.store.find_question(question_id)
            .await?
            .ok_or(DetailError::NotFound)?;

        if !question.can_vote() {
            debug!("question {} is outside its voting window", question_id);
            return Err(DetailError::NotVotable);
        }

        let choices = self.store.find_choices(question_id).await?;
        Ok(QuestionDetail {
            question,
            choices,
        })
    }

    async fn get_results(&self, question_id: QuestionId) -> Result<QuestionResults, GetQuestionError> {
        let question = self.store.find_question(question_id)
            .await?
            .ok_or(GetQuestionError::NotFound)?;
        let choices = self.store.tally_choices(question_id).await?;
        Ok(QuestionResults {
            question,
            choices,
        })
    }

    async fn current_choice(&self, user: &User, question_id: QuestionId) -> Result<Option<ChoiceId>, GetQuestionError> {
        Ok(self.store.find_vote(user.id, question_id)
            .await?
            .map(|v| v.choice_id))
    }

    async fn vote(&self, user: &User, question_id: QuestionId, choice_id: Option<ChoiceId>)
    -> Result<VoteOutcome, VoteError> {
        let question = self.store.find_question(question_id)
            .await?
            .ok_or(VoteError::QuestionNotFound)?;

        if !question.can_vote() {
            return Err(VoteError::NotVotable);
        }

        let choice = match choice_id {
            Some(choice_id) => self.store.find_choice(question_id, choice_id).await?,
            None => None,
        };

        let choice = match choice {
            Some(choice) => choice,
            None => {
                let choices = self.store.find_choices(question_id).await?;
                return Err(VoteError::NoChoiceSelected(QuestionDetail {
                    question,
                    choices,
                }));
            }
        };

        let outcome = self.store.upsert_vote(user.id, question_id, choice.id).await?;
        info!("user {} vote on question {}: {:?} choice {}", user.id, question_id, outcome, choice.id);
        Ok(outcome)
    }

    async fn login(&self, username: &str, password: &str) -> Result<User, LoginError> {
        let credentials = self.store.find_credentials(username).await?;
        match credentials {
            Some(credentials) if auth::verify_password(password, &credentials.password_hash) =>
                Ok(credentials.user),
            _ => {
                info!("failed login for [{}]", username);
                Err(LoginError::BadCredentials)
            }
        }
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<User, CreateUserError> {
        let username = util::non_blank(username).ok_or(CreateUserError::Blank)?;
        if password.is_empty() {
            return Err(CreateUserError::Blank);
        }
        if !util::fits(username, MAX_USERNAME_LEN) {
            return Err(CreateUserError::TooLong);
        }

        let password_hash = auth::hash_password(password)
            .map_err(|e| {
                error!("Failed to hash password: {}", e);
                CreateUserError::Unexpected
            })?;

        self.store.create_user(username, &password_hash)
            .await
            .map_err(|e| match e {
                StoreError::Conflict => CreateUserError::UsernameTaken(username.to_owned()),
                e => {
                    log_store_error(e);
                    CreateUserError::Unexpected
                }
            })
    }

    async fn create_question(&self, request: &NewQuestion) -> Result<QuestionDetail, CreateQuestionError> {
        let question_text = util::non_blank(&request.question_text)
            .ok_or(CreateQuestionError::BlankText)?;
        if !util::fits(question_text, MAX_TEXT_LEN) {
            return Err(CreateQuestionError::TooLong(question_text.to_owned()));
        }

        if let Some(end_date) = request.end_date {
            if end_date < request.pub_date {
                return Err(CreateQuestionError::EndBeforePublication);
            }
        }

        let mut choices = Vec::with_capacity(request.choices.len());
        for choice in request.choices.iter() {
            let choice = util::non_blank(choice).ok_or(CreateQuestionError::BlankText)?;
            if !util::fits(choice, MAX_TEXT_LEN) {
                return Err(CreateQuestionError::TooLong(choice.to_owned()));
            }
            choices.push(choice.to_owned());
        }

        if let Some(duplicate) = util::first_duplicate(choices.iter()) {
            return Err(CreateQuestionError::DuplicateChoice(duplicate.clone()));
        }

        let request = NewQuestion {
            question_text: question_text.to_owned(),
            pub_date: request.pub_date,
            end_date: request.end_date,
            choices,
        };
        let created = self.store.create_question(&request).await?;
        info!("created question {} with {} choices", created.question.id, created.choices.len());
        Ok(created)
    }

    async fn add_choice(&self, question_id: QuestionId, choice_text: &str) -> Result<Choice, AddChoiceError> {
        let choice_text = util::non_blank(choice_text).ok_or(AddChoiceError::BlankText)?;
        if !util::fits(choice_text, MAX_TEXT_LEN) {
            return Err(AddChoiceError::TooLong);
        }

        let _question = self.store.find_question(question_id).await?
            .ok_or(AddChoiceError::QuestionNotFound)?;

        let existing = self.store.find_choices(question_id).await?;
        if existing.iter().any(|c| c.choice_text == choice_text) {
            return Err(AddChoiceError::DuplicateChoice(choice_text.to_owned()));
        }

        self.store.create_choice(question_id, choice_text)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AddChoiceError::QuestionNotFound,
                e => AddChoiceError::from(e),
            })
    }

    async fn delete_question(&self, question_id: QuestionId) -> Result<(), GetQuestionError> {
        if self.store.delete_question(question_id).await? {
            info!("deleted question {}", question_id);
            Ok(())
        } else {
            Err(GetQuestionError::NotFound)
        }
    }
}
