//! End-to-end HTTP tests against an in-memory store and the dummy LLM.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use quizroom::config::Config;
use quizroom::llm::providers;
use quizroom::subsystems::comms::{AppState, build_router};
use quizroom::subsystems::hub::{GameEvent, GameHub};
use quizroom::subsystems::quizgen::QuizGenerator;
use quizroom::subsystems::store::QuizStore;

struct TestApp {
    router: Router,
    hub: Arc<GameHub>,
}

fn app() -> TestApp {
    app_with(Config::test_default())
}

fn app_with(cfg: Config) -> TestApp {
    let provider = providers::build(&cfg.llm, None).unwrap();
    let hub = Arc::new(GameHub::default());
    let state = AppState {
        server_name: Arc::from("test"),
        store: Arc::new(QuizStore::in_memory().unwrap()),
        hub: hub.clone(),
        quizgen: Arc::new(QuizGenerator::new(Arc::new(provider), cfg.quizgen.clone())),
        rooms: cfg.rooms.clone(),
    };
    TestApp { router: build_router(state), hub }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = self.router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    async fn create_sample_quiz(&self) -> Value {
        let (status, quiz) = self.post("/api/quiz", sample_quiz()).await;
        assert_eq!(status, StatusCode::OK, "{quiz}");
        quiz
    }
}

/// Serve a chat-completions endpoint on localhost whose answer is always
/// `content`, and point an app at it.
async fn app_with_model_reply(content: &'static str) -> TestApp {
    let reply = json!({
        "choices": [ { "message": { "role": "assistant", "content": content } } ]
    });
    let model = Router::new().route(
        "/v1/chat/completions",
        axum::routing::post(move || {
            let reply = reply.clone();
            async move { axum::Json(reply) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, model).await.unwrap() });

    let mut cfg = Config::test_default();
    cfg.llm.provider = "openai".into();
    cfg.llm.openai.api_base_url = format!("http://{addr}/v1/chat/completions");
    cfg.llm.openai.timeout_seconds = 5;
    app_with(cfg)
}

fn sample_quiz() -> Value {
    json!({
        "title": "Geografia",
        "description": "Capitais",
        "timePerQuestion": 20,
        "questions": [
            {
                "text": "Capital de Portugal?",
                "type": "MULTIPLE_CHOICE",
                "orderIndex": 1,
                "pointsBase": 100,
                "options": [
                    { "text": "Lisboa", "isCorrect": true, "optionIndex": "A" },
                    { "text": "Porto", "isCorrect": false, "optionIndex": "B" }
                ]
            },
            {
                "text": "Capital de Itália?",
                "type": "WRITTEN",
                "orderIndex": 2,
                "pointsBase": 200,
                "options": [ { "text": "Roma", "isCorrect": true, "optionIndex": "1" } ]
            }
        ]
    })
}

#[tokio::test]
async fn test_health_reports_ok() {
    let app = app();
    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["llm"], "dummy");
}

#[tokio::test]
async fn test_quiz_crud() {
    let app = app();
    let quiz = app.create_sample_quiz().await;
    let id = quiz["quizId"].as_str().unwrap().to_string();
    assert_eq!(quiz["questions"].as_array().unwrap().len(), 2);
    assert!(quiz["questions"][0]["options"][0]["optionId"].is_string());

    let (status, list) = app.get("/api/quiz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["title"], "Geografia");

    let (status, fetched) = app.get(&format!("/api/quiz/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["questions"][1]["type"], "WRITTEN");

    let (status, body) = app.call(Method::DELETE, &format!("/api/quiz/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (status, body) = app.get(&format!("/api/quiz/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_bad_input_gets_json_errors() {
    let app = app();

    let (status, body) = app.get("/api/quiz/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = app.post("/api/quiz", json!({ "title": "", "timePerQuestion": 10 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("title"));

    let (status, body) = app.post("/api/quiz", json!({ "nonsense": true })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_question_endpoints() {
    let app = app();
    let quiz = app.create_sample_quiz().await;
    let quiz_id = quiz["quizId"].as_str().unwrap();

    let (status, q) = app
        .post(
            &format!("/api/quiz/{quiz_id}/question"),
            json!({
                "text": "Capital de Espanha?",
                "type": "WRITTEN",
                "orderIndex": 3,
                "pointsBase": 50,
                "options": [ { "text": "Madrid", "isCorrect": true, "optionIndex": 1 } ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{q}");
    let qid = q["questionId"].as_str().unwrap().to_string();
    assert_eq!(q["options"][0]["optionIndex"], "1");

    let (_, list) = app.get(&format!("/api/quiz/{quiz_id}/question")).await;
    assert_eq!(list.as_array().unwrap().len(), 3);
    assert!(list[0].get("options").is_none());

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/question/{qid}"),
            Some(json!({ "text": "Capital de Espanha (país)?", "type": "WRITTEN", "orderIndex": 3, "pointsBase": 80 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, fetched) = app.get(&format!("/api/question/{qid}")).await;
    assert_eq!(fetched["pointsBase"], 80);

    let (status, _) = app.call(Method::DELETE, &format!("/api/question/{qid}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/question/{qid}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_question_for_missing_quiz_is_bad_request() {
    let app = app();
    let (status, body) = app
        .post(
            "/api/quiz/6f1b1d8e-2c1a-4d0e-9a57-2f7c3f1a9b10/question",
            json!({ "text": "x?", "type": "WRITTEN", "pointsBase": 1,
                    "options": [ { "text": "y", "isCorrect": true, "optionIndex": "1" } ] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn test_register_player() {
    let app = app();
    let (status, profile) = app
        .post("/api/playerprofile/register", json!({ "externalRef": "uid-1", "displayName": "Ana" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["country"], "PT");

    let (status, _) = app
        .post("/api/playerprofile/register", json!({ "firebaseUid": "uid-1", "displayName": "Ana" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.post("/api/playerprofile/register", json!({ "displayName": "Ana" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_room_creation_rules() {
    let app = app();
    let (status, _) = app.post("/api/room", json!({ "quizId": "00000000-0000-0000-0000-000000000000" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post("/api/room", json!({ "quizId": "6f1b1d8e-2c1a-4d0e-9a57-2f7c3f1a9b10" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("does not exist"));

    let quiz = app.create_sample_quiz().await;
    let (status, room) = app.post("/api/room", json!({ "quizId": quiz["quizId"] })).await;
    assert_eq!(status, StatusCode::OK);
    let pin = room["pinCode"].as_str().unwrap();
    assert_eq!(pin.len(), 6);

    let (status, details) = app.get(&format!("/api/room/{pin}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["status"], "WAITING");
    assert_eq!(details["maxPlayers"], 50);

    let (status, _) = app.get("/api/room/000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_game_flow() {
    let app = app();
    let quiz = app.create_sample_quiz().await;
    let mc = &quiz["questions"][0];
    let written = &quiz["questions"][1];
    let lisboa = mc["options"][0]["optionId"].clone();

    let (_, room) = app.post("/api/room", json!({ "quizId": quiz["quizId"] })).await;
    let pin = room["pinCode"].as_str().unwrap().to_string();
    let mut events = app.hub.subscribe(&pin).await;

    let (status, ana) = app.post(&format!("/api/room/{pin}/join"), json!({ "nickname": "ana" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.recv().await.unwrap(), GameEvent::PlayerJoined { nickname: "ana".into() });
    let (_, rui) = app.post(&format!("/api/room/{pin}/join"), json!({ "nickname": "rui" })).await;
    events.recv().await.unwrap();

    let (status, _) = app.post(&format!("/api/room/{pin}/join"), json!({ "nickname": "ana" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Not started yet.
    let (status, _) = app
        .post("/api/answer", json!({ "roomPlayerId": ana["roomPlayerId"], "questionId": mc["questionId"], "selectedOptionId": lisboa }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, started) = app.post(&format!("/api/room/{pin}/start"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "STARTED");
    assert_eq!(events.recv().await.unwrap(), GameEvent::GameStarted);

    let (status, out) = app
        .post("/api/answer", json!({ "roomPlayerId": ana["roomPlayerId"], "questionId": mc["questionId"], "selectedOptionId": lisboa }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out, json!({ "correct": true, "pointsEarned": 100, "totalPoints": 100 }));
    assert_eq!(events.recv().await.unwrap(), GameEvent::PlayerAnswered { player_name: "ana".into() });

    let (status, _) = app
        .post("/api/answer", json!({ "roomPlayerId": ana["roomPlayerId"], "questionId": mc["questionId"], "selectedOptionId": lisboa }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, out) = app
        .post("/api/answer", json!({ "roomPlayerId": rui["roomPlayerId"], "questionId": written["questionId"], "answerText": " ROMA " }))
        .await;
    assert_eq!(out["pointsEarned"], 200);

    let (status, board) = app.get(&format!("/api/room/{pin}/leaderboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board[0]["nickname"], "rui");
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[1]["nickname"], "ana");
    assert_eq!(board[1]["rank"], 2);

    let (_, players) = app.get(&format!("/api/room/{pin}/players")).await;
    assert_eq!(players[0]["currentQuestionIndex"], 1);

    let (status, finished) = app.post(&format!("/api/room/{pin}/finish"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["status"], "FINISHED");
    assert!(finished["finishedAt"].is_string());

    let (status, _) = app.post(&format!("/api/room/{pin}/start"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_room_player_answer_is_not_found() {
    let app = app();
    let (status, body) = app
        .post(
            "/api/answer",
            json!({ "roomPlayerId": "6f1b1d8e-2c1a-4d0e-9a57-2f7c3f1a9b10",
                    "questionId": "6f1b1d8e-2c1a-4d0e-9a57-2f7c3f1a9b11",
                    "answerText": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_generate_draft_and_save() {
    let app = app();
    let (status, draft) = app.post("/api/quiz/generate", json!({ "theme": "capitais" })).await;
    assert_eq!(status, StatusCode::OK, "{draft}");
    assert!(draft.get("quizId").is_none());
    assert_eq!(draft["questions"].as_array().unwrap().len(), 2);

    let (_, list) = app.get("/api/quiz").await;
    assert!(list.as_array().unwrap().is_empty());

    let (status, saved) = app.post("/api/quiz/generate", json!({ "theme": "capitais", "save": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(saved["quizId"].is_string());
    let (_, list) = app.get("/api/quiz").await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = app.post("/api/quiz/generate", json!({ "theme": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_keeps_a_quiz_without_questions() {
    let app = app_with_model_reply(r#"{"Title":"Rios","Description":"d"}"#).await;
    let (status, draft) = app.post("/api/quiz/generate", json!({ "theme": "rios" })).await;
    assert_eq!(status, StatusCode::OK, "{draft}");
    assert_eq!(draft["title"], "Rios");
    assert_eq!(draft["questions"], json!([]));
    assert_eq!(draft["timePerQuestion"], 30);
}

#[tokio::test]
async fn test_generate_with_unreadable_reply_is_bad_gateway() {
    let app = app_with_model_reply("Sorry, I cannot help with that.").await;
    let (status, body) = app.post("/api/quiz/generate", json!({ "theme": "rios" })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "bad_gateway");
}
