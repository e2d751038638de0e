use sqlx::{PgPool, Postgres, Transaction, postgres::PgQueryResult};

use super::*;

/// One unit of work against the polls schema. Dropped without `commit` it
/// rolls back.
pub struct PollsTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PollsTransaction {

    pub async fn new(db: &PgPool) -> Result<PollsTransaction, sqlx::Error> {
        Ok(PollsTransaction {
            tx: db.begin().await?
        })
    }

    pub async fn select_question(&mut self, id: QuestionId)
    -> Result<Option<QuestionRow>, sqlx::Error> {
        sqlx::query_as::<_, QuestionRow>(
            "select id, question_text, pub_date, end_date from question where id = $1"
        ).bind(id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    pub async fn select_published_questions(&mut self, now: Timestamp, limit: i64)
    -> Result<Vec<QuestionRow>, sqlx::Error> {
        sqlx::query_as::<_, QuestionRow>(
            "select id, question_text, pub_date, end_date from question \
            where pub_date <= $1 \
            order by pub_date desc, id desc \
            limit $2"
        ).bind(now)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
    }

    pub async fn insert_question(&mut self, question_text: &str, pub_date: Timestamp, end_date: Option<Timestamp>)
    -> Result<QuestionRow, sqlx::Error> {
        sqlx::query_as::<_, QuestionRow>(
            "insert into question(question_text, pub_date, end_date) values ($1, $2, $3) \
            returning id, question_text, pub_date, end_date"
        ).bind(question_text)
        .bind(pub_date)
        .bind(end_date)
        .fetch_one(&mut *self.tx)
        .await
    }

    pub async fn delete_question(&mut self, id: QuestionId)
    -> Result<PgQueryResult, sqlx::Error> {
        sqlx::query("delete from question where id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
    }

    pub async fn select_choices(&mut self, question_id: QuestionId)
    -> Result<Vec<ChoiceRow>, sqlx::Error> {
        sqlx::query_as::<_, ChoiceRow>(
            "select id, question_id, choice_text from choice where question_id = $1 order by id"
        ).bind(question_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    pub async fn select_choice(&mut self, question_id: QuestionId, choice_id: ChoiceId)
    -> Result<Option<ChoiceRow>, sqlx::Error> {
        sqlx::query_as::<_, ChoiceRow>(
            "select id, question_id, choice_text from choice where id = $1 and question_id = $2"
        ).bind(choice_id)
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    pub async fn insert_choice(&mut self, question_id: QuestionId, choice_text: &str)
    -> Result<ChoiceRow, sqlx::Error> {
        sqlx::query_as::<_, ChoiceRow>(
            "insert into choice(question_id, choice_text) values ($1, $2) \
            returning id, question_id, choice_text"
        ).bind(question_id)
        .bind(choice_text)
        .fetch_one(&mut *self.tx)
        .await
    }

    /// Vote counts are derived from the vote rows on every read.
    pub async fn select_tallies(&mut self, question_id: QuestionId)
    -> Result<Vec<TallyRow>, sqlx::Error> {
        sqlx::query_as::<_, TallyRow>(
            "select c.id, c.choice_text, count(v.id) as votes \
            from choice c left join vote v on v.choice_id = c.id \
            where c.question_id = $1 \
            group by c.id, c.choice_text \
            order by c.id"
        ).bind(question_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    pub async fn select_vote(&mut self, user_id: UserId, question_id: QuestionId)
    -> Result<Option<VoteRow>, sqlx::Error> {
        sqlx::query_as::<_, VoteRow>(
            "select id, user_id, question_id, choice_id from vote where user_id = $1 and question_id = $2"
        ).bind(user_id)
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    /// Returns `true` when a new row was inserted, `false` when an existing
    /// vote was repointed.
    pub async fn upsert_vote(&mut self, user_id: UserId, question_id: QuestionId, choice_id: ChoiceId)
    -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "insert into vote(user_id, question_id, choice_id) values ($1, $2, $3) \
            on conflict (user_id, question_id) do update set choice_id = excluded.choice_id \
            returning (xmax = 0)"
        ).bind(user_id)
        .bind(question_id)
        .bind(choice_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    pub async fn insert_user(&mut self, username: &str, password_hash: &str)
    -> Result<UserRow, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "insert into app_user(username, password_hash) values ($1, $2) \
            returning id, username, password_hash"
        ).bind(username)
        .bind(password_hash)
        .fetch_one(&mut *self.tx)
        .await
    }

    pub async fn select_user_by_name(&mut self, username: &str)
    -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "select id, username, password_hash from app_user where username = $1"
        ).bind(username)
        .fetch_optional(&mut *self.tx)
        .await
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
