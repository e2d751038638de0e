mod transaction;

pub use transaction::*;

use async_trait::async_trait;
use sqlx::{migrate::Migrator, PgPool};

use crate::model::*;
use crate::store::{PollStore, StoreError};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PollsDb {
    pool: PgPool
}

#[derive(sqlx::FromRow, Debug, Eq, PartialEq)]
pub struct QuestionRow {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: Timestamp,
    pub end_date: Option<Timestamp>,
}

#[derive(sqlx::FromRow, Debug, Eq, PartialEq)]
pub struct ChoiceRow {
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub choice_text: String,
}

#[derive(sqlx::FromRow, Debug, Eq, PartialEq)]
pub struct TallyRow {
    pub id: ChoiceId,
    pub choice_text: String,
    pub votes: i64,
}

#[derive(sqlx::FromRow, Debug, Eq, PartialEq)]
pub struct VoteRow {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
}

#[derive(sqlx::FromRow, Debug, Eq, PartialEq)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Question {
        Question {
            id: row.id,
            question_text: row.question_text,
            pub_date: row.pub_date,
            end_date: row.end_date,
        }
    }
}

impl From<ChoiceRow> for Choice {
    fn from(row: ChoiceRow) -> Choice {
        Choice {
            id: row.id,
            question_id: row.question_id,
            choice_text: row.choice_text,
        }
    }
}

impl From<TallyRow> for ChoiceTally {
    fn from(row: TallyRow) -> ChoiceTally {
        ChoiceTally {
            id: row.id,
            choice_text: row.choice_text,
            votes: row.votes,
        }
    }
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Vote {
        Vote {
            id: row.id,
            user_id: row.user_id,
            question_id: row.question_id,
            choice_id: row.choice_id,
        }
    }
}

impl From<UserRow> for Credentials {
    fn from(row: UserRow) -> Credentials {
        Credentials {
            user: User {
                id: row.id,
                username: row.username,
            },
            password_hash: row.password_hash,
        }
    }
}

impl PollsDb {
    pub fn new(db_pool: PgPool) -> PollsDb {
        PollsDb{ pool: db_pool }
    }

    pub async fn new_transaction(&self) -> Result<PollsTransaction, sqlx::Error> {
        PollsTransaction::new(&self.pool).await
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await
    }
}

#[async_trait]
impl PollStore for PollsDb {
    async fn find_question(&self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let row = tx.select_question(id).await?;
        tx.commit().await?;
        Ok(row.map(Question::from))
    }

    async fn find_published_questions(&self, now: Timestamp, limit: usize) -> Result<Vec<Question>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let rows = tx.select_published_questions(now, limit as i64).await?;
        tx.commit().await?;
        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn find_choices(&self, question_id: QuestionId) -> Result<Vec<Choice>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let rows = tx.select_choices(question_id).await?;
        tx.commit().await?;
        Ok(rows.into_iter().map(Choice::from).collect())
    }

    async fn find_choice(&self, question_id: QuestionId, choice_id: ChoiceId) -> Result<Option<Choice>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let row = tx.select_choice(question_id, choice_id).await?;
        tx.commit().await?;
        Ok(row.map(Choice::from))
    }

    async fn tally_choices(&self, question_id: QuestionId) -> Result<Vec<ChoiceTally>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let rows = tx.select_tallies(question_id).await?;
        tx.commit().await?;
        Ok(rows.into_iter().map(ChoiceTally::from).collect())
    }

    async fn find_vote(&self, user_id: UserId, question_id: QuestionId) -> Result<Option<Vote>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let row = tx.select_vote(user_id, question_id).await?;
        tx.commit().await?;
        Ok(row.map(Vote::from))
    }

    async fn upsert_vote(&self, user_id: UserId, question_id: QuestionId, choice_id: ChoiceId)
    -> Result<VoteOutcome, StoreError> {
        let mut tx = self.new_transaction().await?;
        let inserted = tx.upsert_vote(user_id, question_id, choice_id).await?;
        tx.commit().await?;
        Ok(if inserted { VoteOutcome::Created } else { VoteOutcome::Replaced })
    }

    async fn create_question(&self, question: &NewQuestion) -> Result<QuestionDetail, StoreError> {
        let mut tx = self.new_transaction().await?;
        let created = tx.insert_question(&question.question_text, question.pub_date, question.end_date)
            .await?;
        let mut choices = Vec::with_capacity(question.choices.len());
        for text in question.choices.iter() {
            choices.push(Choice::from(tx.insert_choice(created.id, text).await?));
        }
        tx.commit().await?;
        Ok(QuestionDetail {
            question: Question::from(created),
            choices,
        })
    }

    async fn create_choice(&self, question_id: QuestionId, choice_text: &str) -> Result<Choice, StoreError> {
        let mut tx = self.new_transaction().await?;
        let row = tx.insert_choice(question_id, choice_text).await?;
        tx.commit().await?;
        Ok(Choice::from(row))
    }

    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError> {
        let mut tx = self.new_transaction().await?;
        let done = tx.delete_question(id).await?;
        tx.commit().await?;
        Ok(done.rows_affected() > 0)
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut tx = self.new_transaction().await?;
        let row = tx.insert_user(username, password_hash).await?;
        tx.commit().await?;
        Ok(Credentials::from(row).user)
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError> {
        let mut tx = self.new_transaction().await?;
        let row = tx.select_user_by_name(username).await?;
        tx.commit().await?;
        Ok(row.map(Credentials::from))
    }
}
