use std::{
    error::Error,
    fmt::{self, Display},
    sync::Arc,
};

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use log::info;
use sqlx::postgres::PgPoolOptions;

use polls_site::config::AppConfig;
use polls_site::db::PollsDb;
use polls_site::model::{NewQuestion, QuestionId, Timestamp};
use polls_site::operations::{PollOperations, PollOperationsT};

/// Day offsets are limited to a century either side of now.
const MAX_OFFSET_DAYS: i64 = 36_500;

#[derive(Debug)]
struct BasicError(String);

impl Display for BasicError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}
impl Error for BasicError {}

fn fail<T>(message: String) -> Result<T, Box<dyn Error>> {
    Err(Box::new(BasicError(message)))
}

#[derive(Parser, Debug)]
#[command(name = "polls_admin")]
#[command(about = "Manages users, questions and choices of the polls site", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Create a user who can log in and vote
    CreateUser {
        username: String,
        password: String,
    },
    /// Create a question with its choices
    CreateQuestion {
        text: String,
        /// Days from now until publication (negative for the past)
        #[arg(allow_negative_numbers = true,
              value_parser = clap::value_parser!(i64).range(-MAX_OFFSET_DAYS..=MAX_OFFSET_DAYS))]
        pub_offset_days: i64,
        /// Days from now until voting closes; open-ended when absent
        #[arg(long, value_name = "END_OFFSET_DAYS", allow_negative_numbers = true,
              value_parser = clap::value_parser!(i64).range(-MAX_OFFSET_DAYS..=MAX_OFFSET_DAYS))]
        ends: Option<i64>,
        choices: Vec<String>,
    },
    /// Add a choice to an existing question
    AddChoice {
        question_id: QuestionId,
        text: String,
    },
    /// Delete a question together with its choices and votes
    DeleteQuestion {
        question_id: QuestionId,
    },
}

fn offset_from(now: Timestamp, days: i64) -> Result<Timestamp, Box<dyn Error>> {
    match Duration::try_days(days).and_then(|offset| now.checked_add_signed(offset)) {
        Some(date) => Ok(date),
        None => fail(format!("offset of {} days is out of range", days)),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.db_url)
        .await?;
    let db = PollsDb::new(pool);
    db.migrate().await?;
    let ops = PollOperations::new(Arc::new(db));

    match command {
        Command::CreateUser { username, password } => {
            let user = ops.create_user(&username, &password)
                .await
                .or_else(|e| fail(format!("Failed to create user: {:?}", e)))?;
            info!("created user {}", user.id);
            println!("user {} [{}]", user.id, user.username);
        },
        Command::CreateQuestion { text, pub_offset_days, ends, choices } => {
            let now = Utc::now();
            let request = NewQuestion {
                question_text: text,
                pub_date: offset_from(now, pub_offset_days)?,
                end_date: ends.map(|days| offset_from(now, days)).transpose()?,
                choices,
            };
            let detail = ops.create_question(&request)
                .await
                .or_else(|e| fail(format!("Failed to create question: {:?}", e)))?;
            println!("question {} [{}]", detail.question.id, detail.question.question_text);
            for choice in detail.choices {
                println!("  choice {} [{}]", choice.id, choice.choice_text);
            }
        },
        Command::AddChoice { question_id, text } => {
            let choice = ops.add_choice(question_id, &text)
                .await
                .or_else(|e| fail(format!("Failed to add choice: {:?}", e)))?;
            println!("choice {} [{}]", choice.id, choice.choice_text);
        },
        Command::DeleteQuestion { question_id } => {
            ops.delete_question(question_id)
                .await
                .or_else(|e| fail(format!("Failed to delete question {}: {:?}", question_id, e)))?;
            println!("deleted question {}", question_id);
        },
    }

    Ok(())
}
