//! Axum handlers for `/api/*` routes.
//!
//! Store calls are blocking (SQLite), so they run on the blocking pool via
//! [`with_store`]. Lifecycle handlers publish to the room hub after the
//! store commits.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ApiError, ApiJson, AppState};
use crate::subsystems::hub::GameEvent;
use crate::subsystems::store::{
    NewQuestion, NewQuiz, QuestionUpdate, QuizStore, Room, RoomStatus, StoreError, Submission,
};

const PIN_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateRequest {
    #[serde(default)]
    theme: String,
    #[serde(default)]
    save: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RegisterRequest {
    #[serde(default, alias = "firebaseUid")]
    external_ref: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateRoomRequest {
    quiz_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct JoinRequest {
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    player_id: Option<Uuid>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&QuizStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
        .map_err(ApiError::from)
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid {what} id '{raw}'")))
}

fn message(text: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "message": text.into() }))
}

fn draw_pin() -> String {
    rand::rng().random_range(PIN_RANGE).to_string()
}

/// A quiz that should exist because the client references it by id.
fn missing_quiz_is_bad_request(quiz_id: Uuid) -> impl FnOnce(ApiError) -> ApiError {
    move |e| match e {
        ApiError::NotFound(_) => ApiError::BadRequest(format!("quiz {quiz_id} does not exist")),
        other => other,
    }
}

// ── Health ────────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(state): State<AppState>) -> Result<Response, ApiError> {
    with_store(&state, |s| s.ping()).await?;
    let live_rooms = state.hub.room_count().await;
    let body = json!({
        "status": "ok",
        "name": &*state.server_name,
        "db": "ok",
        "llm": state.quizgen.provider_name(),
        "liveRooms": live_rooms,
    });
    Ok(Json(body).into_response())
}

// ── Quizzes ───────────────────────────────────────────────────────────────────

/// POST /api/quiz
pub(super) async fn create_quiz(
    State(state): State<AppState>,
    ApiJson(quiz): ApiJson<NewQuiz>,
) -> Result<Response, ApiError> {
    let created = with_store(&state, move |s| s.create_quiz(&quiz)).await?;
    Ok(Json(created).into_response())
}

/// GET /api/quiz
pub(super) async fn list_quizzes(State(state): State<AppState>) -> Result<Response, ApiError> {
    let quizzes = with_store(&state, |s| s.list_quizzes()).await?;
    Ok(Json(quizzes).into_response())
}

/// GET /api/quiz/{id}
pub(super) async fn get_quiz(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = parse_id(&id, "quiz")?;
    let quiz = with_store(&state, move |s| s.get_quiz(id)).await?;
    Ok(Json(quiz).into_response())
}

/// DELETE /api/quiz/{id}
pub(super) async fn delete_quiz(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = parse_id(&id, "quiz")?;
    with_store(&state, move |s| s.delete_quiz(id)).await?;
    Ok(message(format!("quiz {id} deleted")).into_response())
}

/// POST /api/quiz/generate: draft with the LLM; `save` also persists it.
pub(super) async fn generate_quiz(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> Result<Response, ApiError> {
    let draft = state.quizgen.generate(&req.theme).await?;
    if !req.save {
        return Ok(Json(draft).into_response());
    }
    let saved = with_store(&state, move |s| s.create_quiz(&draft)).await?;
    info!(quiz_id = %saved.quiz_id, "generated quiz saved");
    Ok(Json(saved).into_response())
}

// ── Questions ─────────────────────────────────────────────────────────────────

/// POST /api/quiz/{quizId}/question
pub(super) async fn add_question(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
    ApiJson(question): ApiJson<NewQuestion>,
) -> Result<Response, ApiError> {
    let quiz_id = parse_id(&quiz_id, "quiz")?;
    let created = with_store(&state, move |s| s.add_question(quiz_id, &question))
        .await
        .map_err(missing_quiz_is_bad_request(quiz_id))?;
    Ok(Json(created).into_response())
}

/// GET /api/quiz/{quizId}/question
pub(super) async fn list_questions(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<Response, ApiError> {
    let quiz_id = parse_id(&quiz_id, "quiz")?;
    let questions = with_store(&state, move |s| s.list_questions(quiz_id)).await?;
    Ok(Json(questions).into_response())
}

/// GET /api/question/{id}
pub(super) async fn get_question(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = parse_id(&id, "question")?;
    let question = with_store(&state, move |s| s.get_question(id)).await?;
    Ok(Json(question).into_response())
}

/// PUT /api/question/{id}
pub(super) async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<QuestionUpdate>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "question")?;
    with_store(&state, move |s| s.update_question(id, &update)).await?;
    Ok(message(format!("question {id} updated")).into_response())
}

/// DELETE /api/question/{id}
pub(super) async fn delete_question(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = parse_id(&id, "question")?;
    with_store(&state, move |s| s.delete_question(id)).await?;
    Ok(message(format!("question {id} deleted")).into_response())
}

// ── Player profiles ───────────────────────────────────────────────────────────

/// POST /api/playerprofile/register
pub(super) async fn register_player(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Response, ApiError> {
    let profile = with_store(&state, move |s| s.register_player(&req.external_ref, &req.display_name)).await?;
    Ok(Json(profile).into_response())
}

// ── Rooms ─────────────────────────────────────────────────────────────────────

/// POST /api/room: draws PINs until one is free or attempts run out.
pub(super) async fn create_room(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateRoomRequest>,
) -> Result<Response, ApiError> {
    let quiz_id = req.quiz_id;
    if quiz_id.is_nil() {
        return Err(ApiError::BadRequest("quizId must not be empty".into()));
    }
    let room = open_room(&state, quiz_id, std::iter::repeat_with(draw_pin)).await?;
    Ok(Json(json!({ "pinCode": room.pin_code, "roomId": room.room_id })).into_response())
}

/// Try PINs from `pins` until one is free, at most `rooms.pin_attempts` times.
/// Only a PIN collision is retried.
async fn open_room<I>(state: &AppState, quiz_id: Uuid, pins: I) -> Result<Room, ApiError>
where
    I: IntoIterator<Item = String>,
{
    let max_players = state.rooms.max_players;
    let attempts = state.rooms.pin_attempts;
    for (attempt, pin) in (1..=attempts).zip(pins) {
        let placed = with_store(state, move |s| match s.create_room(quiz_id, max_players, &pin) {
            Ok(room) => Ok(Some(room)),
            Err(StoreError::PinTaken(taken)) => {
                debug!(attempt, pin = %taken, "pin collision, drawing again");
                Ok(None)
            }
            Err(e) => Err(e),
        })
        .await
        .map_err(missing_quiz_is_bad_request(quiz_id))?;
        if let Some(room) = placed {
            return Ok(room);
        }
    }

    warn!(attempts, "no free pin found");
    Err(ApiError::Internal(format!("could not allocate a free PIN after {attempts} attempts")))
}

/// GET /api/room/{pin}
pub(super) async fn get_room(State(state): State<AppState>, Path(pin): Path<String>) -> Result<Response, ApiError> {
    let room = with_store(&state, move |s| s.room_by_pin(&pin)).await?;
    Ok(Json(room).into_response())
}

/// POST /api/room/{pin}/join
pub(super) async fn join_room(
    State(state): State<AppState>,
    Path(pin): Path<String>,
    ApiJson(req): ApiJson<JoinRequest>,
) -> Result<Response, ApiError> {
    let room_pin = pin.clone();
    let player = with_store(&state, move |s| s.join_room(&room_pin, &req.nickname, req.player_id)).await?;
    state
        .hub
        .publish(&pin, GameEvent::PlayerJoined { nickname: player.nickname.clone() })
        .await;
    Ok(Json(player).into_response())
}

/// POST /api/room/{pin}/start
pub(super) async fn start_room(State(state): State<AppState>, Path(pin): Path<String>) -> Result<Response, ApiError> {
    let room_pin = pin.clone();
    let room = with_store(&state, move |s| s.set_room_status(&room_pin, RoomStatus::Started)).await?;
    let listeners = state.hub.publish(&pin, GameEvent::GameStarted).await;
    info!(%pin, listeners, "game started");
    Ok(Json(room).into_response())
}

/// POST /api/room/{pin}/finish
pub(super) async fn finish_room(State(state): State<AppState>, Path(pin): Path<String>) -> Result<Response, ApiError> {
    let room_pin = pin.clone();
    let room = with_store(&state, move |s| s.set_room_status(&room_pin, RoomStatus::Finished)).await?;
    let listeners = state.hub.publish(&pin, GameEvent::GameFinished).await;
    info!(%pin, listeners, "game finished");
    Ok(Json(room).into_response())
}

/// GET /api/room/{pin}/leaderboard
pub(super) async fn leaderboard(State(state): State<AppState>, Path(pin): Path<String>) -> Result<Response, ApiError> {
    let rows = with_store(&state, move |s| s.leaderboard(&pin)).await?;
    Ok(Json(rows).into_response())
}

/// GET /api/room/{pin}/players
pub(super) async fn room_players(State(state): State<AppState>, Path(pin): Path<String>) -> Result<Response, ApiError> {
    let players = with_store(&state, move |s| s.room_players(&pin)).await?;
    Ok(Json(players).into_response())
}

// ── Answers ───────────────────────────────────────────────────────────────────

/// POST /api/answer
pub(super) async fn submit_answer(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<Submission>,
) -> Result<Response, ApiError> {
    let outcome = with_store(&state, move |s| s.record_answer(&submission)).await?;
    state
        .hub
        .publish(&outcome.pin_code, GameEvent::PlayerAnswered { player_name: outcome.nickname.clone() })
        .await;
    Ok(Json(outcome).into_response())
}
