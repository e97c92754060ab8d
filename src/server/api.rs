use crate::models::api::{ ChatForm, ErrorResponse, HealthResponse, PredictRequest, PredictResponse };
use crate::responder::ChatResponder;
use crate::server::form::render_page;
use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    routing::get,
    routing::post,
    Router,
    Form,
    Json,
    extract::{ State, Query, rejection::JsonRejection },
    response::{ Html, IntoResponse, Response },
    http::{ HeaderMap, StatusCode },
};
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use serde::Deserialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ warn, debug };

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Deserialize)]
pub struct ApiKeyQuery {
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    responder: ChatResponder,
    api_key: Option<String>,
    limiter: Option<Arc<Limiter>>,
}

impl AppState {
    /// A blank key disables authentication, a zero rate disables limiting.
    pub fn new(responder: ChatResponder, api_key: Option<String>, rate_limit: u32) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        let limiter = NonZeroU32::new(rate_limit).map(|rate| {
            Arc::new(RateLimiter::direct(Quota::per_second(rate)))
        });
        Self { responder, api_key, limiter }
    }

    /// Checks the API key and the global rate limit for a predict request.
    fn admit(&self, headers: &HeaderMap, query: &ApiKeyQuery) -> Result<(), (StatusCode, String)> {
        if let Some(ref required) = self.api_key {
            let provided = headers
                .get("X-API-Key")
                .and_then(|v| v.to_str().ok())
                .or(query.api_key.as_deref());
            if provided != Some(required.as_str()) {
                warn!("Rejected request with bad or missing API key");
                return Err((StatusCode::UNAUTHORIZED, "Unauthorized".into()));
            }
        }
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                warn!("Global rate limit exceeded. Rejecting request.");
                return Err((StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".into()));
            }
        }
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(form_page_handler).post(form_submit_handler))
        .route("/api/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

fn error_json(code: StatusCode, message: String) -> Response {
    (code, Json(ErrorResponse { error: message })).into_response()
}

async fn predict_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ApiKeyQuery>,
    payload: Result<Json<PredictRequest>, JsonRejection>
) -> Response {
    if let Err((code, message)) = state.admit(&headers, &query) {
        return error_json(code, message);
    }
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected predict body: {}", rejection.body_text());
            return error_json(rejection.status(), rejection.body_text());
        }
    };
    let input_text = match req.input_text() {
        Some(text) => text,
        None => {
            return error_json(
                StatusCode::UNPROCESSABLE_ENTITY,
                "data[0] must be the input text".into()
            );
        }
    };
    debug!("Predict request with {} chars", input_text.chars().count());

    match state.responder.respond(input_text).await {
        Ok(reply) =>
            (
                StatusCode::OK,
                Json(PredictResponse {
                    data: vec![reply.text],
                    duration: reply.duration.as_secs_f64(),
                }),
            ).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn form_page_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.responder.model(), "", None, None))
}

async fn form_submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ApiKeyQuery>,
    Form(form): Form<ChatForm>
) -> Response {
    let model = state.responder.model();
    if let Err((code, message)) = state.admit(&headers, &query) {
        return (code, Html(render_page(&model, &form.input_text, None, Some(&message)))).into_response();
    }

    match state.responder.respond(&form.input_text).await {
        Ok(reply) =>
            Html(render_page(&model, &form.input_text, Some(&reply.text), None)).into_response(),
        Err(e) => {
            let message = format!("Error processing message: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render_page(&model, &form.input_text, None, Some(&message))),
            ).into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        backend: state.responder.backend().to_string(),
        model: state.responder.model(),
    })
}
