mod accounts;
pub mod session;

use actix_session::Session;
use actix_web::{error, http::header, web, HttpResponse, Result};
use actix_web::web::{Data, Form, Json, Path, ServiceConfig};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    model::*,
    operations::{DetailError, GetQuestionError, PollOperationsT, VoteError},
};
use self::session::{flash, take_messages};

pub use accounts::{LOGIN_PATH, LOGOUT_PATH};

pub const ROOT_PATH: &str = "/";
pub const INDEX_PATH: &str = "/polls/";
pub const DETAIL_PATH: &str = "/polls/{question_id}/";
pub const RESULTS_PATH: &str = "/polls/{question_id}/results/";
pub const VOTE_PATH: &str = "/polls/{question_id}/vote/";

pub const VOTING_NOT_ALLOWED: &str = "Voting is not allowed";
pub const LOGIN_REQUIRED: &str = "Please login first";
pub const NO_CHOICE_SELECTED: &str = "You didn't select a choice.";

pub fn detail_url(question_id: QuestionId) -> String {
    format!("/polls/{}/", question_id)
}

pub fn results_url(question_id: QuestionId) -> String {
    format!("/polls/{}/results/", question_id)
}

pub(crate) fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

#[derive(Deserialize)]
pub struct VoteForm {
    pub choice: Option<String>,
}

impl VoteForm {
    /// The selected choice id. Anything that is not an integer counts as no
    /// selection.
    fn choice_id(&self) -> Option<ChoiceId> {
        self.choice.as_deref()
            .and_then(|c| c.trim().parse::<ChoiceId>().ok())
    }
}

async fn root_handler() -> HttpResponse {
    redirect(INDEX_PATH)
}

async fn index_handler<A: 'static + PollOperationsT>(
    ops: Data<A>,
    session: Session) -> Result<Json<IndexPage>>
{
    let questions = ops.latest_questions()
        .await
        .map_err(|_| error::ErrorInternalServerError("Failed to list questions"))?;
    let now = Utc::now();
    Ok(Json(IndexPage {
        latest_question_list: questions.into_iter()
            .map(|q| QuestionSummary::at(q, now))
            .collect(),
        messages: take_messages(&session),
    }))
}

async fn detail_handler<A: 'static + PollOperationsT>(
    ops: Data<A>,
    path: Path<QuestionId>,
    identity: Identity,
    session: Session) -> Result<HttpResponse>
{
    let question_id = path.into_inner();
    let detail = match ops.get_votable_question(question_id).await {
        Ok(detail) => detail,
        Err(DetailError::NotFound) => return Err(error::ErrorNotFound("Question not found")),
        Err(DetailError::NotVotable) => {
            flash(&session, Level::Error, VOTING_NOT_ALLOWED);
            return Ok(redirect(INDEX_PATH));
        },
        Err(DetailError::Unexpected) => return Err(error::ErrorInternalServerError("Failed to load question")),
    };

    let user = match identity {
        Identity::User(user) => user,
        Identity::Anonymous => {
            flash(&session, Level::Error, LOGIN_REQUIRED);
            return Ok(redirect(LOGIN_PATH));
        },
    };

    let selected_choice = ops.current_choice(&user, question_id)
        .await
        .map_err(|_| error::ErrorInternalServerError("Failed to load vote"))?;

    Ok(HttpResponse::Ok().json(DetailPage {
        question: detail.question,
        choices: detail.choices,
        selected_choice,
        error_message: None,
        messages: take_messages(&session),
    }))
}

async fn results_handler<A: 'static + PollOperationsT>(
    ops: Data<A>,
    path: Path<QuestionId>,
    session: Session) -> Result<Json<ResultsPage>>
{
    let results = ops.get_results(path.into_inner())
        .await
        .map_err(|e| match e {
            GetQuestionError::NotFound => error::ErrorNotFound("Question not found"),
            GetQuestionError::Unexpected => error::ErrorInternalServerError("Failed to load results"),
        })?;
    let total_votes = results.total_votes();
    Ok(Json(ResultsPage {
        question: results.question,
        choices: results.choices,
        total_votes,
        messages: take_messages(&session),
    }))
}

async fn vote_handler<A: 'static + PollOperationsT>(
    ops: Data<A>,
    path: Path<QuestionId>,
    identity: Identity,
    session: Session,
    body: Option<Form<VoteForm>>) -> Result<HttpResponse>
{
    let user = match identity {
        Identity::User(user) => user,
        Identity::Anonymous => {
            flash(&session, Level::Error, LOGIN_REQUIRED);
            return Ok(redirect(LOGIN_PATH));
        },
    };

    // a missing or unreadable form is the same as no selection
    let choice_id = body.and_then(|form| form.choice_id());
    let question_id = path.into_inner();
    match ops.vote(&user, question_id, choice_id).await {
        Ok(_) => Ok(redirect(&results_url(question_id))),
        Err(VoteError::QuestionNotFound) => Err(error::ErrorNotFound("Question not found")),
        Err(VoteError::NotVotable) => {
            flash(&session, Level::Error, VOTING_NOT_ALLOWED);
            Ok(redirect(INDEX_PATH))
        },
        Err(VoteError::NoChoiceSelected(detail)) => Ok(HttpResponse::Ok().json(DetailPage {
            question: detail.question,
            choices: detail.choices,
            selected_choice: None,
            error_message: Some(NO_CHOICE_SELECTED.to_owned()),
            messages: take_messages(&session),
        })),
        Err(VoteError::Unexpected) => Err(error::ErrorInternalServerError("Failed to record vote")),
    }
}

pub fn config<A: 'static + PollOperationsT>(cfg: &mut ServiceConfig) {
    cfg.route(ROOT_PATH, web::get().to(root_handler))
        .route(INDEX_PATH, web::get().to(index_handler::<A>))
        .route(DETAIL_PATH, web::get().to(detail_handler::<A>))
        .route(RESULTS_PATH, web::get().to(results_handler::<A>))
        .route(VOTE_PATH, web::post().to(vote_handler::<A>))
        .configure(accounts::config::<A>)
    ;
}


#[cfg(test)]
mod tests {
    use actix_web::App;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use chrono::Duration;
    use mockall::predicate::eq;

    use crate::operations::{LoginError, MockPollOperationsT};
    use super::test_support::*;
    use super::*;

    fn mock_question(id: QuestionId, days: i64) -> Question {
        Question {
            id,
            question_text: format!("Question {}", id),
            pub_date: Utc::now() + Duration::days(days),
            end_date: None,
        }
    }

    fn mock_detail(id: QuestionId) -> QuestionDetail {
        QuestionDetail {
            question: mock_question(id, -1),
            choices: (1..=3)
                .map(|n| Choice {
                    id: id * 10 + n,
                    question_id: id,
                    choice_text: format!("Choice {}", n),
                })
                .collect(),
        }
    }

    fn mock_user() -> User {
        User {
            id: 1,
            username: "testuser".to_owned(),
        }
    }

    /// Expects one successful login for `mock_user`.
    fn expect_login(mock_ops: &mut MockPollOperationsT) {
        mock_ops.expect_login()
            .return_once(|_, _| Ok(mock_user()));
    }

    macro_rules! init_app {
        ($mock_ops:expr) => {
            test::init_service(
                App::new()
                    .wrap(session_middleware())
                    .app_data(Data::new($mock_ops))
                    .configure(config::<MockPollOperationsT>)
            ).await
        };
    }

    macro_rules! log_in {
        ($app:expr) => {{
            let request = test::TestRequest::post()
                .uri(LOGIN_PATH)
                .set_form(&[("username", "testuser"), ("password", "FatChance!")])
                .to_request();
            let response = test::call_service(&$app, request).await;
            assert_eq!(StatusCode::FOUND, response.status());
            session_cookie(&response).expect("login should set a session cookie")
        }};
    }

    /// Follows a redirect to the login page and checks the flash it carries.
    macro_rules! assert_login_required {
        ($app:expr, $response:expr) => {{
            let cookie = session_cookie(&$response).expect("flash should be stored in the session");
            let request = test::TestRequest::get().uri(LOGIN_PATH).cookie(cookie).to_request();
            let page: LoginPage = test::call_and_read_body_json(&$app, request).await;
            assert_eq!(
                vec!(FlashMessage { level: Level::Error, text: LOGIN_REQUIRED.to_owned() }),
                page.messages
            );
        }};
    }

    #[actix_web::test]
    async fn root_redirects_to_index() {
        let app = init_app!(MockPollOperationsT::new());

        let request = test::TestRequest::get().uri(ROOT_PATH).to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(StatusCode::FOUND, response.status());
        assert_eq!(INDEX_PATH, location(&response));
    }

    #[actix_web::test]
    async fn index_lists_latest() {
        let mut mock_ops = MockPollOperationsT::new();
        let questions = vec!(mock_question(2, -5), mock_question(1, -30));
        mock_ops.expect_latest_questions()
            .return_once(move || Ok(questions));
        let app = init_app!(mock_ops);

        let request = test::TestRequest::get().uri(INDEX_PATH).to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(StatusCode::OK, response.status());
        let page: IndexPage = test::read_body_json(response).await;
        let ids: Vec<QuestionId> = page.latest_question_list.iter().map(|q| q.id).collect();
        assert_eq!(vec!(2, 1), ids);
        assert!(page.latest_question_list.iter().all(|q| q.can_vote));
        assert!(page.messages.is_empty());
    }

    #[actix_web::test]
    async fn index_empty() {
        let mut mock_ops = MockPollOperationsT::new();
        mock_ops.expect_latest_questions()
            .return_once(|| Ok(vec!()));
        let app = init_app!(mock_ops);

        let request = test::TestRequest::get().uri(INDEX_PATH).to_request();
        let page: IndexPage = test::call_and_read_body_json(&app, request).await;

        assert!(page.latest_question_list.is_empty());
    }

    mod detail {
        use super::*;

        #[actix_web::test]
        async fn missing_question() {
            let mut mock_ops = MockPollOperationsT::new();
            mock_ops.expect_get_votable_question()
                .return_once(|_| Err(DetailError::NotFound));
            let app = init_app!(mock_ops);

            let request = test::TestRequest::get().uri(&detail_url(99)).to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::NOT_FOUND, response.status());
        }

        #[actix_web::test]
        async fn not_votable_redirects_to_index_with_message() {
            let mut mock_ops = MockPollOperationsT::new();
            mock_ops.expect_get_votable_question()
                .with(eq(5))
                .return_once(|_| Err(DetailError::NotVotable));
            mock_ops.expect_latest_questions()
                .return_once(|| Ok(vec!()));
            let app = init_app!(mock_ops);

            let request = test::TestRequest::get().uri(&detail_url(5)).to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::FOUND, response.status());
            assert_eq!(INDEX_PATH, location(&response));

            // the message shows up once on the index
            let cookie = session_cookie(&response).expect("flash should be stored in the session");
            let request = test::TestRequest::get().uri(INDEX_PATH).cookie(cookie).to_request();
            let page: IndexPage = test::call_and_read_body_json(&app, request).await;
            assert_eq!(
                vec!(FlashMessage { level: Level::Error, text: VOTING_NOT_ALLOWED.to_owned() }),
                page.messages
            );
        }

        #[actix_web::test]
        async fn anonymous_redirects_to_login() {
            let mut mock_ops = MockPollOperationsT::new();
            mock_ops.expect_get_votable_question()
                .return_once(|id| Ok(mock_detail(id)));
            let app = init_app!(mock_ops);

            let request = test::TestRequest::get().uri(&detail_url(5)).to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::FOUND, response.status());
            assert_eq!(LOGIN_PATH, location(&response));
            assert_login_required!(app, response);
        }

        #[actix_web::test]
        async fn logged_in_sees_question() {
            let mut mock_ops = MockPollOperationsT::new();
            expect_login(&mut mock_ops);
            mock_ops.expect_get_votable_question()
                .with(eq(5))
                .return_once(|id| Ok(mock_detail(id)));
            mock_ops.expect_current_choice()
                .withf(|user, question_id| user.id == 1 && *question_id == 5)
                .return_once(|_, _| Ok(Some(52)));
            let app = init_app!(mock_ops);
            let cookie = log_in!(app);

            let request = test::TestRequest::get().uri(&detail_url(5)).cookie(cookie).to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::OK, response.status());
            let page: DetailPage = test::read_body_json(response).await;
            assert_eq!("Question 5", page.question.question_text);
            assert_eq!(3, page.choices.len());
            assert_eq!(Some(52), page.selected_choice);
            assert_eq!(None, page.error_message);
        }
    }

    mod vote {
        use super::*;

        #[actix_web::test]
        async fn anonymous_redirects_to_login() {
            let mut mock_ops = MockPollOperationsT::new();
            mock_ops.expect_vote().never();
            let app = init_app!(mock_ops);

            let request = test::TestRequest::post()
                .uri("/polls/5/vote/")
                .set_form(&[("choice", "51")])
                .to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::FOUND, response.status());
            assert_eq!(LOGIN_PATH, location(&response));
            assert_login_required!(app, response);
        }

        #[actix_web::test]
        async fn anonymous_without_form_redirects_to_login() {
            let mut mock_ops = MockPollOperationsT::new();
            mock_ops.expect_vote().never();
            let app = init_app!(mock_ops);

            let request = test::TestRequest::post().uri("/polls/5/vote/").to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::FOUND, response.status());
            assert_eq!(LOGIN_PATH, location(&response));
            assert_login_required!(app, response);
        }

        #[actix_web::test]
        async fn logged_in_without_form_shows_error() {
            let mut mock_ops = MockPollOperationsT::new();
            expect_login(&mut mock_ops);
            mock_ops.expect_vote()
                .withf(|user, question_id, choice_id| {
                    user.id == 1 && *question_id == 5 && choice_id.is_none()
                })
                .return_once(|_, question_id, _| Err(VoteError::NoChoiceSelected(mock_detail(question_id))));
            let app = init_app!(mock_ops);
            let cookie = log_in!(app);

            let request = test::TestRequest::post()
                .uri("/polls/5/vote/")
                .cookie(cookie)
                .to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::OK, response.status());
            let page: DetailPage = test::read_body_json(response).await;
            assert_eq!(Some(NO_CHOICE_SELECTED.to_owned()), page.error_message);
            assert_eq!(5, page.question.id);
        }

        #[actix_web::test]
        async fn success_redirects_to_results() {
            let mut mock_ops = MockPollOperationsT::new();
            expect_login(&mut mock_ops);
            mock_ops.expect_vote()
                .withf(|user, question_id, choice_id| {
                    user.id == 1 && *question_id == 5 && *choice_id == Some(51)
                })
                .return_once(|_, _, _| Ok(VoteOutcome::Created));
            let app = init_app!(mock_ops);
            let cookie = log_in!(app);

            let request = test::TestRequest::post()
                .uri("/polls/5/vote/")
                .cookie(cookie)
                .set_form(&[("choice", "51")])
                .to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::FOUND, response.status());
            assert_eq!(results_url(5), location(&response));
        }

        #[actix_web::test]
        async fn missing_choice_shows_error() {
            let mut mock_ops = MockPollOperationsT::new();
            expect_login(&mut mock_ops);
            mock_ops.expect_vote()
                .withf(|_, _, choice_id| choice_id.is_none())
                .return_once(|_, question_id, _| Err(VoteError::NoChoiceSelected(mock_detail(question_id))));
            let app = init_app!(mock_ops);
            let cookie = log_in!(app);

            let request = test::TestRequest::post()
                .uri("/polls/5/vote/")
                .cookie(cookie)
                .set_form(&[("choice", "not a number")])
                .to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::OK, response.status());
            let page: DetailPage = test::read_body_json(response).await;
            assert_eq!(Some(NO_CHOICE_SELECTED.to_owned()), page.error_message);
            assert_eq!(5, page.question.id);
        }

        #[actix_web::test]
        async fn closed_question_redirects_to_index() {
            let mut mock_ops = MockPollOperationsT::new();
            expect_login(&mut mock_ops);
            mock_ops.expect_vote()
                .return_once(|_, _, _| Err(VoteError::NotVotable));
            let app = init_app!(mock_ops);
            let cookie = log_in!(app);

            let request = test::TestRequest::post()
                .uri("/polls/5/vote/")
                .cookie(cookie)
                .set_form(&[("choice", "51")])
                .to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::FOUND, response.status());
            assert_eq!(INDEX_PATH, location(&response));
        }

        #[actix_web::test]
        async fn missing_question() {
            let mut mock_ops = MockPollOperationsT::new();
            expect_login(&mut mock_ops);
            mock_ops.expect_vote()
                .return_once(|_, _, _| Err(VoteError::QuestionNotFound));
            let app = init_app!(mock_ops);
            let cookie = log_in!(app);

            let request = test::TestRequest::post()
                .uri("/polls/99/vote/")
                .cookie(cookie)
                .set_form(&[("choice", "1")])
                .to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::NOT_FOUND, response.status());
        }
    }

    mod results {
        use super::*;

        #[actix_web::test]
        async fn shows_tallies() {
            let mut mock_ops = MockPollOperationsT::new();
            mock_ops.expect_get_results()
                .with(eq(5))
                .return_once(|id| Ok(QuestionResults {
                    question: mock_question(id, -1),
                    choices: vec!(
                        ChoiceTally { id: 51, choice_text: "Choice 1".to_owned(), votes: 3 },
                        ChoiceTally { id: 52, choice_text: "Choice 2".to_owned(), votes: 1 },
                    ),
                }));
            let app = init_app!(mock_ops);

            let request = test::TestRequest::get().uri(&results_url(5)).to_request();
            let page: ResultsPage = test::call_and_read_body_json(&app, request).await;

            assert_eq!(4, page.total_votes);
            assert_eq!(3, page.choices[0].votes);
        }

        #[actix_web::test]
        async fn missing_question() {
            let mut mock_ops = MockPollOperationsT::new();
            mock_ops.expect_get_results()
                .return_once(|_| Err(GetQuestionError::NotFound));
            let app = init_app!(mock_ops);

            let request = test::TestRequest::get().uri(&results_url(5)).to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::NOT_FOUND, response.status());
        }

        #[actix_web::test]
        async fn non_numeric_id() {
            let app = init_app!(MockPollOperationsT::new());

            let request = test::TestRequest::get().uri("/polls/abc/results/").to_request();
            let response = test::call_service(&app, request).await;

            assert_eq!(StatusCode::NOT_FOUND, response.status());
        }
    }

    #[actix_web::test]
    async fn failed_login_is_not_a_session() {
        let mut mock_ops = MockPollOperationsT::new();
        mock_ops.expect_login()
            .return_once(|_, _| Err(LoginError::BadCredentials));
        mock_ops.expect_get_votable_question()
            .return_once(|id| Ok(mock_detail(id)));
        let app = init_app!(mock_ops);

        let request = test::TestRequest::post()
            .uri(LOGIN_PATH)
            .set_form(&[("username", "testuser"), ("password", "wrong")])
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(StatusCode::OK, response.status());

        let mut request = test::TestRequest::get().uri(&detail_url(5));
        if let Some(cookie) = session_cookie(&response) {
            request = request.cookie(cookie);
        }
        let response = test::call_service(&app, request.to_request()).await;
        assert_eq!(LOGIN_PATH, location(&response));
    }
}
