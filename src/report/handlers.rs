//! HTTP handlers that present the aggregated profile.
//!
//! They only see the `Fetcher` contract; how the profile is kept is the
//! aggregator's business.

use super::top::{top, OptionError, TopOptions};
use crate::aggregator::Fetcher;
use crate::profile::{to_collapsed, Profile, ProfileCodec};
use crate::server::RequestRouter;
use crate::utils::config::{DEFAULT_SOURCE, DEFAULT_TOP_COUNT, RESET_SOURCE};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

#[derive(Clone)]
pub struct ReportState {
    fetcher: Arc<dyn Fetcher>,
    codec: Arc<dyn ProfileCodec>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    pub n: Option<usize>,
    pub sort: Option<String>,
    pub unit: Option<String>,
    pub runtime: Option<String>,
    pub focus: Option<String>,
    pub hide: Option<String>,
    pub show: Option<String>,
}

impl TopQuery {
    /// Patterns are `|`-separated, as in the familiar regex alternation form
    pub fn to_options(&self) -> Result<TopOptions, OptionError> {
        let mut options = TopOptions::default();
        if let Some(unit) = &self.unit {
            options.unit = unit.parse()?;
        }
        if let Some(sort) = &self.sort {
            options.sort = sort.parse()?;
        }
        if let Some(runtime) = &self.runtime {
            options.runtime = runtime.parse()?;
        }
        options.focus = split_patterns(self.focus.as_deref());
        options.hide = split_patterns(self.hide.as_deref());
        options.show = split_patterns(self.show.as_deref());
        Ok(options)
    }
}

fn split_patterns(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Routes served for the reporting side:
/// - `GET /` text top table
/// - `GET /profile?source=` encoded profile (`source=-` resets first)
/// - `GET /collapsed` folded stacks
/// - `GET /top?n&sort&unit&runtime&focus&hide&show` JSON top table
/// - `POST /reset` reset, then return the empty profile
pub fn request_router(fetcher: Arc<dyn Fetcher>, codec: Arc<dyn ProfileCodec>) -> RequestRouter {
    let state = ReportState { fetcher, codec };
    RequestRouter::new()
        .handle("/", get(index).with_state(state.clone()))
        .handle("/profile", get(profile_bytes).with_state(state.clone()))
        .handle("/collapsed", get(collapsed).with_state(state.clone()))
        .handle("/top", get(top_table).with_state(state.clone()))
        .handle("/reset", post(reset).with_state(state))
}

fn fetch(state: &ReportState, source: &str) -> HandlerResult<Arc<Profile>> {
    state
        .fetcher
        .fetch(source, Duration::ZERO, Duration::ZERO)
        .map(|(profile, _label)| profile)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn encoded(state: &ReportState, profile: &Profile) -> HandlerResult<Response> {
    let bytes = state
        .codec
        .encode(profile)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

fn label(profile: &Profile) -> String {
    format!(
        "Type: {} | Duration: {:.2}s",
        profile.sample_type,
        Duration::from_nanos(profile.duration_nanos).as_secs_f64()
    )
}

async fn index(State(state): State<ReportState>) -> HandlerResult<String> {
    let profile = fetch(&state, DEFAULT_SOURCE)?;
    let report = top(&profile, DEFAULT_TOP_COUNT, &TopOptions::default(), &label(&profile));
    Ok(report.to_text())
}

async fn profile_bytes(
    State(state): State<ReportState>,
    Query(query): Query<SourceQuery>,
) -> HandlerResult<Response> {
    let source = query.source.as_deref().unwrap_or(DEFAULT_SOURCE);
    let profile = fetch(&state, source)?;
    encoded(&state, &profile)
}

async fn collapsed(State(state): State<ReportState>) -> HandlerResult<String> {
    let profile = fetch(&state, DEFAULT_SOURCE)?;
    Ok(to_collapsed(&profile))
}

async fn top_table(
    State(state): State<ReportState>,
    Query(query): Query<TopQuery>,
) -> HandlerResult<Json<super::top::Report>> {
    let options = query
        .to_options()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let profile = fetch(&state, DEFAULT_SOURCE)?;
    let count = query.n.unwrap_or(DEFAULT_TOP_COUNT);
    Ok(Json(top(&profile, count, &options, &label(&profile))))
}

async fn reset(State(state): State<ReportState>) -> HandlerResult<Response> {
    let profile = fetch(&state, RESET_SOURCE)?;
    encoded(&state, &profile)
}
