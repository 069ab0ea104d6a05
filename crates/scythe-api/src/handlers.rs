//! API request handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use scythe_ring::{Integer, Partitioner, parse_token};
use scythe_types::{
    Cluster, ColumnFamily, NewColumnFamily, RepairRun, RepairSegment, RunId, SegmentId,
    SegmentState,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

// -----------------------------------------------------------------------
// GET /ping, GET /healthcheck
// -----------------------------------------------------------------------

pub(crate) async fn ping() -> &'static str {
    "pong"
}

pub(crate) async fn healthcheck(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let healthy = state.store.is_connected();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "healthy": healthy })))
}

// -----------------------------------------------------------------------
// Clusters
// -----------------------------------------------------------------------

/// Request body for `POST /cluster`.
#[derive(Deserialize)]
pub(crate) struct AddClusterRequest {
    pub name: String,
    /// Short name (`murmur3`, `random`) or full partitioner class name.
    pub partitioner: String,
    #[serde(default)]
    pub seed_hosts: Vec<String>,
    pub ring_tokens: Vec<String>,
}

/// Register a cluster. Tokens are validated against the partitioner and
/// stored sorted ascending.
pub(crate) async fn add_cluster(
    State(state): State<AppState>,
    Json(req): Json<AddClusterRequest>,
) -> Result<(StatusCode, Json<Cluster>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("cluster name must not be empty"));
    }
    let partitioner: Partitioner = req
        .partitioner
        .parse()
        .map_err(|e| ApiError::bad_request(format!("{e}")))?;
    let ring_tokens = normalize_tokens(partitioner, &req.ring_tokens)?;

    let cluster = state.store.add_cluster(Cluster {
        name: req.name,
        partitioner,
        seed_hosts: req.seed_hosts,
        ring_tokens,
    })?;
    info!(cluster = %cluster.name, %partitioner, tokens = cluster.ring_tokens.len(), "cluster registered");
    Ok((StatusCode::CREATED, Json(cluster)))
}

/// Parse, range-check, sort and de-duplicate-check ring tokens.
fn normalize_tokens(partitioner: Partitioner, raw: &[String]) -> Result<Vec<String>, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::bad_request("ring_tokens must not be empty"));
    }

    let mut tokens: Vec<Integer> = Vec::with_capacity(raw.len());
    for t in raw {
        let token = parse_token(t).map_err(|e| ApiError::bad_request(e.to_string()))?;
        if !partitioner.contains_token(&token) {
            return Err(ApiError::bad_request(format!(
                "token {token} outside [{}, {}]",
                partitioner.min_token(),
                partitioner.max_token()
            )));
        }
        tokens.push(token);
    }
    tokens.sort();
    if let Some(pair) = tokens.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(ApiError::bad_request(format!("duplicate token {}", pair[0])));
    }
    Ok(tokens.iter().map(|t| t.to_string()).collect())
}

pub(crate) async fn list_clusters(
    State(state): State<AppState>,
) -> Result<Json<Vec<Cluster>>, ApiError> {
    Ok(Json(state.store.get_clusters()?))
}

pub(crate) async fn get_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Cluster>, ApiError> {
    Ok(Json(find_cluster(&state, &name)?))
}

fn find_cluster(state: &AppState, name: &str) -> Result<Cluster, ApiError> {
    state
        .store
        .get_cluster(name)?
        .ok_or_else(|| ApiError::NotFound {
            kind: "cluster",
            id: name.to_string(),
        })
}

// -----------------------------------------------------------------------
// Tables
// -----------------------------------------------------------------------

/// Request body for `POST /table`.
#[derive(Deserialize)]
pub(crate) struct AddTableRequest {
    pub cluster_name: String,
    pub keyspace: String,
    pub table: String,
    pub segment_count: Option<u64>,
    pub snapshot_repair: Option<bool>,
}

pub(crate) async fn add_table(
    State(state): State<AppState>,
    Json(req): Json<AddTableRequest>,
) -> Result<(StatusCode, Json<ColumnFamily>), ApiError> {
    find_cluster(&state, &req.cluster_name)?;
    let cf = register_table(
        &state,
        req.cluster_name,
        req.keyspace,
        req.table,
        req.segment_count,
        req.snapshot_repair,
    )?;
    Ok((StatusCode::CREATED, Json(cf)))
}

fn register_table(
    state: &AppState,
    cluster_name: String,
    keyspace_name: String,
    name: String,
    segment_count: Option<u64>,
    snapshot_repair: Option<bool>,
) -> Result<ColumnFamily, ApiError> {
    let segment_count = segment_count.unwrap_or(state.defaults.segment_count);
    check_segment_count(state, segment_count)?;
    let cf = state.store.add_column_family(NewColumnFamily {
        cluster_name,
        keyspace_name,
        name,
        segment_count,
        snapshot_repair: snapshot_repair.unwrap_or(state.defaults.snapshot_repair),
    })?;
    info!(cluster = %cf.cluster_name, keyspace = %cf.keyspace_name, table = %cf.name, "table registered");
    Ok(cf)
}

fn check_segment_count(state: &AppState, segment_count: u64) -> Result<(), ApiError> {
    let max = state.runner.max_segment_count();
    if segment_count == 0 {
        return Err(ApiError::bad_request("segment_count must be positive"));
    }
    if segment_count > max {
        return Err(ApiError::bad_request(format!(
            "segment_count {segment_count} exceeds the limit of {max}"
        )));
    }
    Ok(())
}

pub(crate) async fn get_table(
    State(state): State<AppState>,
    Path((cluster, keyspace, table)): Path<(String, String, String)>,
) -> Result<Json<ColumnFamily>, ApiError> {
    state
        .store
        .get_column_family_by_name(&cluster, &keyspace, &table)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound {
            kind: "table",
            id: format!("{cluster}/{keyspace}/{table}"),
        })
}

// -----------------------------------------------------------------------
// Repair runs
// -----------------------------------------------------------------------

/// Request body for `POST /repair_run`.
#[derive(Deserialize)]
pub(crate) struct AddRepairRunRequest {
    pub cluster_name: String,
    pub keyspace: String,
    pub table: String,
    pub owner: String,
    pub cause: Option<String>,
    pub segment_count: Option<u64>,
    pub intensity: Option<f64>,
    #[serde(default)]
    pub start: bool,
}

/// A run together with how far along its segments are.
#[derive(Serialize)]
pub(crate) struct RunStatus {
    #[serde(flatten)]
    pub run: RepairRun,
    pub segment_count: usize,
    pub segments_not_started: usize,
    pub segments_running: usize,
    pub segments_repaired: usize,
}

impl RunStatus {
    fn load(state: &AppState, run: RepairRun) -> Result<Self, ApiError> {
        let segments = state.store.get_repair_segments(run.id)?;
        let count = |wanted: SegmentState| segments.iter().filter(|s| s.state == wanted).count();
        Ok(Self {
            segment_count: segments.len(),
            segments_not_started: count(SegmentState::NotStarted),
            segments_running: count(SegmentState::Running),
            segments_repaired: count(SegmentState::Done),
            run,
        })
    }
}

/// Create a run, registering the table on the fly if needed.
pub(crate) async fn add_repair_run(
    State(state): State<AppState>,
    Json(req): Json<AddRepairRunRequest>,
) -> Result<(StatusCode, Json<RunStatus>), ApiError> {
    if req.owner.trim().is_empty() {
        return Err(ApiError::bad_request("owner must not be empty"));
    }
    if let Some(segment_count) = req.segment_count {
        check_segment_count(&state, segment_count)?;
    }
    let cluster = find_cluster(&state, &req.cluster_name)?;
    let table = match state.store.get_column_family_by_name(
        &req.cluster_name,
        &req.keyspace,
        &req.table,
    )? {
        Some(cf) => cf,
        None => register_table(
            &state,
            req.cluster_name.clone(),
            req.keyspace.clone(),
            req.table.clone(),
            None,
            None,
        )?,
    };

    let segment_count = req.segment_count.unwrap_or(table.segment_count);
    let (mut run, _) = state.runner.create_run(
        &cluster,
        &table,
        segment_count,
        req.owner,
        req.cause.unwrap_or_else(|| "no cause specified".to_string()),
        req.intensity.unwrap_or(state.defaults.intensity),
    )?;
    if req.start {
        run = state.runner.trigger(run.id)?;
    }

    Ok((StatusCode::CREATED, Json(RunStatus::load(&state, run)?)))
}

pub(crate) async fn get_repair_run(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RunStatus>, ApiError> {
    let run = find_run(&state, RunId::from(id))?;
    Ok(Json(RunStatus::load(&state, run)?))
}

pub(crate) async fn list_cluster_runs(
    State(state): State<AppState>,
    Path(cluster_name): Path<String>,
) -> Result<Json<Vec<RunStatus>>, ApiError> {
    find_cluster(&state, &cluster_name)?;
    let runs = state.store.get_repair_runs_for_cluster(&cluster_name)?;
    let statuses = runs
        .into_iter()
        .map(|run| RunStatus::load(&state, run))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(statuses))
}

pub(crate) async fn start_repair_run(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RunStatus>, ApiError> {
    let run = state.runner.trigger(RunId::from(id))?;
    Ok(Json(RunStatus::load(&state, run)?))
}

pub(crate) async fn pause_repair_run(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RunStatus>, ApiError> {
    let run = state.runner.pause(RunId::from(id))?;
    Ok(Json(RunStatus::load(&state, run)?))
}

fn find_run(state: &AppState, id: RunId) -> Result<RepairRun, ApiError> {
    state
        .store
        .get_repair_run(id)?
        .ok_or_else(|| ApiError::NotFound {
            kind: "repair run",
            id: id.to_string(),
        })
}

// -----------------------------------------------------------------------
// GET /repair_run/{id}/segments
// -----------------------------------------------------------------------

/// Response item for `GET /repair_run/{id}/segments`.
#[derive(Serialize)]
pub(crate) struct SegmentView {
    pub id: SegmentId,
    pub state: SegmentState,
    pub fail_count: u32,
    /// Range in ring positions, `(start,end]`.
    pub range: String,
    /// The same range in the cluster's token coordinates.
    pub tokens: String,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

impl SegmentView {
    fn new(partitioner: Partitioner, segment: RepairSegment) -> Self {
        let range = &segment.token_range;
        Self {
            id: segment.id,
            state: segment.state,
            fail_count: segment.fail_count,
            range: range.to_string(),
            tokens: format!(
                "({},{}]",
                partitioner.to_token(range.start()),
                partitioner.to_token(range.end())
            ),
            start_time: segment.start_time,
            end_time: segment.end_time,
        }
    }
}

pub(crate) async fn list_segments(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<SegmentView>>, ApiError> {
    let run = find_run(&state, RunId::from(id))?;
    let cluster = find_cluster(&state, &run.cluster_name)?;
    let segments = state.store.get_repair_segments(run.id)?;
    Ok(Json(
        segments
            .into_iter()
            .map(|s| SegmentView::new(cluster.partitioner, s))
            .collect(),
    ))
}
