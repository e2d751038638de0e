use chrono::{DateTime, Duration, offset::Utc};
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;
pub type QuestionId = i64;
pub type ChoiceId = i64;
pub type UserId = i64;

/// A poll prompt together with the window during which it can be voted on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: Timestamp,
    pub end_date: Option<Timestamp>,
}

impl Question {
    pub fn is_published_at(&self, now: Timestamp) -> bool {
        self.pub_date <= now
    }

    pub fn is_published(&self) -> bool {
        self.is_published_at(Utc::now())
    }

    /// Voting is open on `[pub_date, end_date]`, both ends inclusive. A
    /// question without an end date stays open once published.
    pub fn can_vote_at(&self, now: Timestamp) -> bool {
        match self.end_date {
            None => self.pub_date <= now,
            Some(end_date) => self.pub_date <= now && now <= end_date,
        }
    }

    pub fn can_vote(&self) -> bool {
        self.can_vote_at(Utc::now())
    }

    pub fn was_published_recently_at(&self, now: Timestamp) -> bool {
        now - Duration::days(1) <= self.pub_date && self.pub_date <= now
    }

    pub fn was_published_recently(&self) -> bool {
        self.was_published_recently_at(Utc::now())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub choice_text: String,
}

/// A choice with the number of votes currently pointing at it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChoiceTally {
    pub id: ChoiceId,
    pub choice_text: String,
    pub votes: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Created,
    Replaced,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(User),
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewQuestion {
    pub question_text: String,
    pub pub_date: Timestamp,
    pub end_date: Option<Timestamp>,
    pub choices: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuestionDetail {
    pub question: Question,
    pub choices: Vec<Choice>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuestionResults {
    pub question: Question,
    pub choices: Vec<ChoiceTally>,
}

impl QuestionResults {
    pub fn total_votes(&self) -> i64 {
        self.choices.iter().map(|c| c.votes).sum()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub level: Level,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: Timestamp,
    pub end_date: Option<Timestamp>,
    pub was_published_recently: bool,
    pub can_vote: bool,
}

impl QuestionSummary {
    pub fn at(question: Question, now: Timestamp) -> QuestionSummary {
        QuestionSummary {
            was_published_recently: question.was_published_recently_at(now),
            can_vote: question.can_vote_at(now),
            id: question.id,
            question_text: question.question_text,
            pub_date: question.pub_date,
            end_date: question.end_date,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct IndexPage {
    pub latest_question_list: Vec<QuestionSummary>,
    pub messages: Vec<FlashMessage>,
}

#[derive(Serialize, Deserialize)]
pub struct DetailPage {
    pub question: Question,
    pub choices: Vec<Choice>,
    pub selected_choice: Option<ChoiceId>,
    pub error_message: Option<String>,
    pub messages: Vec<FlashMessage>,
}

#[derive(Serialize, Deserialize)]
pub struct ResultsPage {
    pub question: Question,
    pub choices: Vec<ChoiceTally>,
    pub total_votes: i64,
    pub messages: Vec<FlashMessage>,
}

#[derive(Serialize, Deserialize)]
pub struct LoginPage {
    pub username: Option<String>,
    pub error_message: Option<String>,
    pub messages: Vec<FlashMessage>,
}
