//! HTTP + websocket channel built on axum.
//!
//! [`HttpChannel`] is a [`Component`]: `run()` drives `axum::serve` and the
//! shared [`CancellationToken`] is wired to graceful shutdown.
//!
//! ```text
//! GET    /api/health
//! POST   /api/quiz                      GET  /api/quiz
//! POST   /api/quiz/generate
//! GET    /api/quiz/{id}                 DELETE /api/quiz/{id}
//! POST   /api/quiz/{quizId}/question    GET  /api/quiz/{quizId}/question
//! GET    /api/question/{id}   PUT /api/question/{id}   DELETE /api/question/{id}
//! POST   /api/playerprofile/register
//! POST   /api/room                      GET  /api/room/{pin}
//! POST   /api/room/{pin}/join|start|finish
//! GET    /api/room/{pin}/leaderboard    GET  /api/room/{pin}/players
//! POST   /api/answer
//! GET    /ws
//! ```

mod api;
pub mod error;
#[cfg(feature = "channel-ws")]
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::RoomsConfig;
use crate::error::AppError;
use crate::subsystems::hub::GameHub;
use crate::subsystems::quizgen::QuizGenerator;
use crate::subsystems::runtime::{Component, ComponentFuture};
use crate::subsystems::store::QuizStore;

pub use error::{ApiError, ApiJson};

/// Router state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub server_name: Arc<str>,
    pub store: Arc<QuizStore>,
    pub hub: Arc<GameHub>,
    pub quizgen: Arc<QuizGenerator>,
    pub rooms: RoomsConfig,
}

pub struct HttpChannel {
    bind_addr: String,
    state: AppState,
}

impl HttpChannel {
    pub fn new(bind_addr: impl Into<String>, state: AppState) -> Self {
        Self { bind_addr: bind_addr.into(), state }
    }
}

impl Component for HttpChannel {
    fn id(&self) -> &str {
        "http"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_http(self.bind_addr, self.state, shutdown))
    }
}

async fn run_http(bind_addr: String, state: AppState, shutdown: CancellationToken) -> Result<(), AppError> {
    let server_name = state.server_name.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("http bind failed on {bind_addr}: {e}")))?;
    let local = listener.local_addr().map(|a| a.to_string()).unwrap_or(bind_addr);

    info!(server = %server_name, addr = %local, "http channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("http server error: {e}")))?;

    info!("http channel shut down");
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health",                       get(api::health))
        .route("/api/quiz",                         post(api::create_quiz).get(api::list_quizzes))
        .route("/api/quiz/generate",                post(api::generate_quiz))
        .route("/api/quiz/{id}",                    get(api::get_quiz).delete(api::delete_quiz))
        .route("/api/quiz/{id}/question",           post(api::add_question).get(api::list_questions))
        .route("/api/question/{id}",                get(api::get_question).put(api::update_question).delete(api::delete_question))
        .route("/api/playerprofile/register",       post(api::register_player))
        .route("/api/room",                         post(api::create_room))
        .route("/api/room/{pin}",                   get(api::get_room))
        .route("/api/room/{pin}/join",              post(api::join_room))
        .route("/api/room/{pin}/start",             post(api::start_room))
        .route("/api/room/{pin}/finish",            post(api::finish_room))
        .route("/api/room/{pin}/leaderboard",       get(api::leaderboard))
        .route("/api/room/{pin}/players",           get(api::room_players))
        .route("/api/answer",                       post(api::submit_answer));

    #[cfg(feature = "channel-ws")]
    let router = router.route("/ws", get(ws::ws_handler));

    router
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
