use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    audit::EconomicRecord,
    auth::Principal,
    config::AccessPolicy,
    error::{AppError, StoreError},
    models::{Carousel, GenerateRequest, GenerateResponse, LayoutSpec, SelectCompositionRequest},
    pipeline::{validate_request, CarouselOrchestrator},
    selection::{default_seed, select_basic_composition, Composition, SelectionContext},
    store::{CarouselStore, DEFAULT_EVENT_LIMIT},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CarouselOrchestrator>,
    pub store: Arc<dyn CarouselStore>,
    pub access: Arc<AccessPolicy>,
    pub compositions: Arc<Vec<Composition>>,
}

fn body_or_400<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(inner)| inner).map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// The identity extractor runs before the body is looked at, so an anonymous
/// caller gets 401 even with a broken payload.
pub async fn generate_carousel(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let request = validate_request(body_or_400(body)?).map_err(|e| {
        tracing::warn!("🚫 Rejected carousel request from {}: {}", principal.user_id, e);
        AppError::from(e)
    })?;

    // Dropping the request future (caller went away) cancels the run.
    let cancel = CancellationToken::new();
    let _abort_on_disconnect = cancel.clone().drop_guard();

    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.run(&principal, request, cancel).await });

    match task.await {
        Ok(Ok(response)) => {
            tracing::info!("✅ Carousel {} generated with {} slides", response.carousel_id, response.results.len());
            Ok(Json(response))
        }
        Ok(Err(e)) => Err(AppError::from(e)),
        Err(join_err) => {
            tracing::error!("❌ Carousel task crashed: {}", join_err);
            Err(AppError::Internal(String::new()))
        }
    }
}

pub async fn get_carousel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Carousel>, AppError> {
    let carousel = state.store.get_carousel(id).await.map_err(|e| match e {
        StoreError::CarouselNotFound(_) => AppError::NotFound,
        other => AppError::Internal(other.to_string()),
    })?;
    if carousel.owner_id != principal.user_id && !state.access.is_admin(principal.email.as_deref()) {
        return Err(AppError::NotFound);
    }
    Ok(Json(carousel))
}

pub async fn list_carousels(State(state): State<AppState>, principal: Principal) -> Result<Json<Vec<Carousel>>, AppError> {
    let carousels = state
        .store
        .list_carousels(&principal.user_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(carousels))
}

pub async fn list_compositions(State(state): State<AppState>) -> Json<Vec<Composition>> {
    Json(state.compositions.as_ref().clone())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedComposition {
    pub seed: String,
    pub composition: Composition,
    pub layout_spec: LayoutSpec,
}

pub async fn select_composition(
    State(state): State<AppState>,
    body: Result<Json<SelectCompositionRequest>, JsonRejection>,
) -> Result<Json<SelectedComposition>, AppError> {
    let body = body_or_400(body)?;
    let seed = body
        .seed
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_seed(body.prompt.as_deref().unwrap_or_default(), body.slide_count.unwrap_or(5)));
    let context = (body.prompt.is_some() || body.slide_count.is_some())
        .then(|| SelectionContext { prompt: body.prompt.clone(), slide_count: body.slide_count });

    let composition = select_basic_composition(&state.compositions, &seed, context.as_ref())
        .ok_or(AppError::NotFound)?
        .clone();
    tracing::info!("🧩 Selected composition {} for seed {:?}", composition.id, seed);
    Ok(Json(SelectedComposition { layout_spec: composition.to_layout_spec(), composition, seed }))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

pub async fn list_economic_events(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EconomicRecord>>, AppError> {
    if !state.access.is_admin(principal.email.as_deref()) {
        tracing::warn!("🚫 {} asked for economic events without admin rights", principal.user_id);
        return Err(AppError::Forbidden);
    }
    let events = state
        .store
        .list_economic_events(query.limit.unwrap_or(DEFAULT_EVENT_LIMIT))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(events))
}
