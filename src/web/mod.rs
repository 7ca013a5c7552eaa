//! HTTP surface for the map client: territories, live validation and the heat overlay.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    geometry::{Bounds, GeoPoint, Polygon},
    heat::{
        territory_reading, HeatLayer, RasterBuffer, Sample, SampleStats, Viewport, ViewportError,
    },
    plan::AiPlan,
    sampling::Debouncer,
    session::{EditError, PolygonEditSession, ValiditySignal},
    store::{JsonFileStore, NewTerritory, StoreError, Territory, TerritoryId, TerritoryStore},
};

/// Latest settled viewport and the raster rendered for it. Renders finish on
/// blocking threads in any order; only the newest request may land.
#[derive(Default)]
struct Overlay {
    requested: AtomicU64,
    current: Mutex<OverlayFrame>,
}

#[derive(Default)]
struct OverlayFrame {
    generation: u64,
    viewport: Option<Viewport>,
    raster: Option<RasterBuffer>,
}

impl Overlay {
    fn viewport(&self) -> Option<Viewport> {
        self.current.lock().expect("overlay lock poisoned").viewport
    }

    fn raster(&self) -> Option<RasterBuffer> {
        self.current.lock().expect("overlay lock poisoned").raster.clone()
    }

    /// Render `viewport` off the async workers and publish it unless a newer
    /// render was requested meanwhile.
    fn schedule(self: &Arc<Self>, heat: &Mutex<HeatLayer>, viewport: Viewport) {
        let generation = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let surface = heat.lock().expect("heat lock poisoned").surface();
        let overlay = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let raster = surface.render(&viewport);
            let mut frame = overlay.current.lock().expect("overlay lock poisoned");
            if generation > frame.generation {
                *frame = OverlayFrame {
                    generation,
                    viewport: Some(viewport),
                    raster: Some(raster),
                };
            }
        });
    }
}

pub struct AppState {
    store: Mutex<TerritoryStore>,
    heat: Arc<Mutex<HeatLayer>>,
    overlay: Arc<Overlay>,
    viewport_changes: Debouncer<Viewport>,
}

impl AppState {
    /// Must be called inside a tokio runtime; spawns the viewport debouncer.
    pub fn new(store: TerritoryStore, heat: HeatLayer, debounce: Duration) -> Arc<Self> {
        let heat = Arc::new(Mutex::new(heat));
        let overlay = Arc::new(Overlay::default());

        let (viewport_changes, _task) = Debouncer::spawn(debounce, {
            let heat = Arc::clone(&heat);
            let overlay = Arc::clone(&overlay);
            move |settled: Viewport| overlay.schedule(&heat, settled)
        });

        Arc::new(Self {
            store: Mutex::new(store),
            heat,
            overlay,
            viewport_changes,
        })
    }

    fn refresh_overlay(&self) {
        if let Some(viewport) = self.overlay.viewport() {
            self.overlay.schedule(&self.heat, viewport);
        }
    }

    async fn render(&self, viewport: Viewport) -> ApiResult<RasterBuffer> {
        let surface = self.heat.lock().expect("heat lock poisoned").surface();
        let raster = tokio::task::spawn_blocking(move || surface.render(&viewport))
            .await
            .context("heat render task failed")?;
        Ok(raster)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Viewport(#[from] ViewportError),
    #[error("{0}")]
    Missing(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::NotFound(_)) | ApiError::Missing(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Store(StoreError::InvalidPolygon(_)) | ApiError::Edit(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Viewport(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            // clients only ever reference ids the server handed out
            ApiError::Store(StoreError::NotFound(id)) => error!(id = %id, "unknown territory id"),
            _ if status.is_server_error() => error!(error = %self, "request failed"),
            _ => warn!(error = %self, "request rejected"),
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/territories", get(list_territories).post(create_territory))
        .route("/api/territories/:id", get(get_territory).delete(delete_territory))
        .route("/api/territories/:id/vertices/:index", put(move_territory_vertex))
        .route("/api/territories/:id/plan", put(attach_plan))
        .route("/api/territories/:id/reading", get(territory_temperature))
        .route("/api/validate", post(validate_points))
        .route("/api/samples", put(replace_samples))
        .route("/api/samples/stats", get(sample_stats))
        .route("/api/viewport", put(update_viewport))
        .route("/api/overlay.png", get(latest_overlay))
        .route("/api/heat.png", get(render_heat))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<()> {
    let store_dir = &config.store.dir;
    let store = TerritoryStore::open(JsonFileStore::new(store_dir), config.store.key.clone())
        .with_context(|| format!("Failed to open territory store in {}", store_dir.display()))?;
    let heat = HeatLayer::new(config.heat.interpolation(), config.heat.renderer());
    let state = AppState::new(store, heat, config.sampling.debounce());

    let listen = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {listen}"))?;

    info!(%addr, "territory service listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down territory service");
}

async fn list_territories(State(state): State<Arc<AppState>>) -> Json<Vec<Territory>> {
    let store = state.store.lock().expect("store lock poisoned");
    Json(store.list().to_vec())
}

async fn get_territory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Territory>> {
    let id = TerritoryId::from_raw(id);
    let store = state.store.lock().expect("store lock poisoned");
    let territory = store.get(id).cloned().ok_or(StoreError::NotFound(id))?;
    Ok(Json(territory))
}

/// Replays the submitted ring through an edit session so only simple rings
/// with at least three vertices are saved.
async fn create_territory(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewTerritory>,
) -> ApiResult<(StatusCode, Json<Territory>)> {
    let mut session = PolygonEditSession::new();
    session.start_drawing();
    for point in new.polygon.points() {
        session.add_vertex(*point)?;
    }
    let finalized = session.finalize()?;

    let mut store = state.store.lock().expect("store lock poisoned");
    let territory = store.create(NewTerritory {
        polygon: finalized.polygon,
        ..new
    })?;
    Ok((StatusCode::CREATED, Json(territory)))
}

async fn delete_territory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    let mut store = state.store.lock().expect("store lock poisoned");
    store.delete(TerritoryId::from_raw(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexMoved {
    territory: Territory,
    signal: ValiditySignal,
}

/// Drag of a saved territory's vertex. The ring is stored even when the drag
/// makes it cross itself; the signal tells the client to warn.
async fn move_territory_vertex(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(u64, usize)>,
    Json(point): Json<GeoPoint>,
) -> ApiResult<Json<VertexMoved>> {
    let id = TerritoryId::from_raw(id);
    let mut store = state.store.lock().expect("store lock poisoned");
    let polygon = store
        .get(id)
        .map(|t| t.polygon.clone())
        .ok_or(StoreError::NotFound(id))?;

    let mut session = PolygonEditSession::new();
    session.edit(id, &polygon);
    let signal = session.move_vertex(index, point)?;
    let edited = Polygon::new(session.points().to_vec());

    let territory = store.update(id, |territory| territory.polygon = edited)?;
    Ok(Json(VertexMoved { territory, signal }))
}

async fn attach_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(plan): Json<AiPlan>,
) -> ApiResult<Json<Territory>> {
    let mut store = state.store.lock().expect("store lock poisoned");
    let territory = store.attach_plan(TerritoryId::from_raw(id), plan)?;
    Ok(Json(territory))
}

#[derive(Serialize)]
struct Reading {
    value: Option<f64>,
}

async fn territory_temperature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Reading>> {
    let id = TerritoryId::from_raw(id);
    let territory = {
        let store = state.store.lock().expect("store lock poisoned");
        store.get(id).cloned().ok_or(StoreError::NotFound(id))?
    };
    let heat = state.heat.lock().expect("heat lock poisoned");
    Ok(Json(Reading {
        value: territory_reading(&territory, heat.samples()),
    }))
}

async fn validate_points(Json(points): Json<Vec<GeoPoint>>) -> Json<ValiditySignal> {
    Json(ValiditySignal::evaluate(&points))
}

async fn replace_samples(
    State(state): State<Arc<AppState>>,
    Json(samples): Json<Vec<Sample>>,
) -> Json<Option<SampleStats>> {
    let stats = {
        let mut heat = state.heat.lock().expect("heat lock poisoned");
        heat.replace_samples(samples);
        heat.stats()
    };
    state.refresh_overlay();
    Json(stats)
}

async fn sample_stats(State(state): State<Arc<AppState>>) -> Json<Option<SampleStats>> {
    Json(state.heat.lock().expect("heat lock poisoned").stats())
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ViewportQuery {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub width: u32,
    pub height: u32,
}

impl TryFrom<ViewportQuery> for Viewport {
    type Error = ViewportError;

    fn try_from(query: ViewportQuery) -> std::result::Result<Self, Self::Error> {
        Viewport::new(
            Bounds::new(query.north, query.south, query.east, query.west),
            query.width,
            query.height,
        )
    }
}

/// Called on every pan/zoom frame; the overlay is re-rendered once the map settles.
async fn update_viewport(
    State(state): State<Arc<AppState>>,
    Json(query): Json<ViewportQuery>,
) -> ApiResult<StatusCode> {
    let viewport = Viewport::try_from(query)?;
    state.viewport_changes.push(viewport);
    Ok(StatusCode::ACCEPTED)
}

async fn latest_overlay(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let raster = state
        .overlay
        .raster()
        .ok_or(ApiError::Missing("no overlay rendered yet"))?;
    png_response(&raster)
}

async fn render_heat(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewportQuery>,
) -> ApiResult<Response> {
    let viewport = Viewport::try_from(query)?;
    let raster = state.render(viewport).await?;
    png_response(&raster)
}

fn png_response(raster: &RasterBuffer) -> ApiResult<Response> {
    let bounds = raster.bounds();
    let png = raster.to_png()?;
    let response = Response::builder()
        .header(header::CONTENT_TYPE, "image/png")
        .header(
            "x-overlay-bounds",
            format!("{},{},{},{}", bounds.north, bounds.south, bounds.east, bounds.west),
        )
        .body(Body::from(Bytes::from(png)))
        .context("failed to build overlay response")?;
    Ok(response)
}
