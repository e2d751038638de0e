use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use itertools::Itertools;

use super::{PollStore, StoreError};
use crate::model::*;

#[derive(Default)]
struct Tables {
    next_id: i64,
    questions: BTreeMap<QuestionId, Question>,
    choices: BTreeMap<ChoiceId, Choice>,
    votes: BTreeMap<i64, Vote>,
    users: BTreeMap<UserId, Credentials>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn choices_of(&self, question_id: QuestionId) -> impl Iterator<Item = &Choice> {
        self.choices.values().filter(move |c| c.question_id == question_id)
    }

    fn insert_choice(&mut self, question_id: QuestionId, choice_text: &str) -> Choice {
        let choice = Choice {
            id: self.next_id(),
            question_id,
            choice_text: choice_text.to_owned(),
        };
        self.choices.insert(choice.id, choice.clone());
        choice
    }
}

/// `PollStore` kept in process memory. Every call holds one lock for its
/// whole duration, so each operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn find_question(&self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        Ok(self.lock().questions.get(&id).cloned())
    }

    async fn find_published_questions(&self, now: Timestamp, limit: usize) -> Result<Vec<Question>, StoreError> {
        let tables = self.lock();
        Ok(tables.questions.values()
            .filter(|q| q.is_published_at(now))
            .sorted_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_choices(&self, question_id: QuestionId) -> Result<Vec<Choice>, StoreError> {
        Ok(self.lock().choices_of(question_id).cloned().collect())
    }

    async fn find_choice(&self, question_id: QuestionId, choice_id: ChoiceId) -> Result<Option<Choice>, StoreError> {
        Ok(self.lock().choices.get(&choice_id)
            .filter(|c| c.question_id == question_id)
            .cloned())
    }

    async fn tally_choices(&self, question_id: QuestionId) -> Result<Vec<ChoiceTally>, StoreError> {
        let tables = self.lock();
        let counts = tables.votes.values()
            .filter(|v| v.question_id == question_id)
            .map(|v| v.choice_id)
            .counts();
        Ok(tables.choices_of(question_id)
            .map(|c| ChoiceTally {
                id: c.id,
                choice_text: c.choice_text.clone(),
                votes: counts.get(&c.id).copied().unwrap_or(0) as i64,
            })
            .collect())
    }

    async fn find_vote(&self, user_id: UserId, question_id: QuestionId) -> Result<Option<Vote>, StoreError> {
        Ok(self.lock().votes.values()
            .find(|v| v.user_id == Some(user_id) && v.question_id == question_id)
            .cloned())
    }

    async fn upsert_vote(&self, user_id: UserId, question_id: QuestionId, choice_id: ChoiceId)
    -> Result<VoteOutcome, StoreError> {
        let mut tables = self.lock();
        let belongs = tables.choices.get(&choice_id)
            .map(|c| c.question_id == question_id)
            .unwrap_or(false);
        if !belongs || !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }

        let existing = tables.votes.values_mut()
            .find(|v| v.user_id == Some(user_id) && v.question_id == question_id);
        if let Some(vote) = existing {
            vote.choice_id = choice_id;
            return Ok(VoteOutcome::Replaced);
        }

        let id = tables.next_id();
        tables.votes.insert(id, Vote {
            id,
            user_id: Some(user_id),
            question_id,
            choice_id,
        });
        Ok(VoteOutcome::Created)
    }

    async fn create_question(&self, question: &NewQuestion) -> Result<QuestionDetail, StoreError> {
        let mut tables = self.lock();
        let created = Question {
            id: tables.next_id(),
            question_text: question.question_text.clone(),
            pub_date: question.pub_date,
            end_date: question.end_date,
        };
        tables.questions.insert(created.id, created.clone());
        let choices = question.choices.iter()
            .map(|text| tables.insert_choice(created.id, text))
            .collect();
        Ok(QuestionDetail {
            question: created,
            choices,
        })
    }

    async fn create_choice(&self, question_id: QuestionId, choice_text: &str) -> Result<Choice, StoreError> {
        let mut tables = self.lock();
        if !tables.questions.contains_key(&question_id) {
            return Err(StoreError::NotFound);
        }
        Ok(tables.insert_choice(question_id, choice_text))
    }

    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        if tables.questions.remove(&id).is_none() {
            return Ok(false);
        }
        tables.choices.retain(|_, c| c.question_id != id);
        tables.votes.retain(|_, v| v.question_id != id);
        Ok(true)
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut tables = self.lock();
        if tables.users.values().any(|c| c.user.username == username) {
            return Err(StoreError::Conflict);
        }
        let user = User {
            id: tables.next_id(),
            username: username.to_owned(),
        };
        tables.users.insert(user.id, Credentials {
            user: user.clone(),
            password_hash: password_hash.to_owned(),
        });
        Ok(user)
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError> {
        Ok(self.lock().users.values()
            .find(|c| c.user.username == username)
            .cloned())
    }
}
