// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, auth, class, game, play},
    state::AppState,
    utils::jwt::{auth_middleware, student_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, classes, games, play, attempts).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, session manager).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new().route("/me", get(auth::me)).layer(
                middleware::from_fn_with_state(state.clone(), auth_middleware),
            ),
        );

    // Class management is the teacher's alone.
    let class_routes = Router::new()
        .route("/", get(class::list_classes).post(class::create_class))
        .route("/students/unassigned", get(class::list_unassigned_students))
        .route("/{id}", delete(class::delete_class))
        .route(
            "/{id}/students",
            get(class::list_students).post(class::add_student),
        )
        .route("/{id}/students/{student_id}", delete(class::remove_student))
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Authoring: create/edit/publish/delete games and read their results.
    let game_routes = Router::new()
        .route("/", get(game::list_games).post(game::create_game))
        .route(
            "/{id}",
            get(game::get_game)
                .put(game::update_game)
                .delete(game::delete_game),
        )
        .route("/{id}/publish", patch(game::set_published))
        .route("/{id}/results", get(game::game_results))
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Play: students only.
    let play_routes = Router::new()
        .route("/games", get(play::list_available_games))
        .route("/games/{id}/start", post(play::start_session))
        .route("/sessions/{id}", get(play::session_view))
        .route("/sessions/{id}/events", post(play::session_event))
        .layer(middleware::from_fn(student_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Attempts are visible to both roles; handlers check ownership.
    let attempt_routes = Router::new()
        .route("/mine", get(attempt::my_attempts))
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/retry", patch(attempt::set_retry))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/classes", class_routes)
        .nest("/api/games", game_routes)
        .nest("/api/play", play_routes)
        .nest("/api/attempts", attempt_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
