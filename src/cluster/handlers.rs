//! HTTP handlers for the public cluster API.
//!
//! Any node serves these; rule updates that land on a follower are forwarded
//! to the leader by the synchronizer underneath.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::consensus::transport::HttpRaftTransport;
use crate::error::ClusterError;
use crate::rules::convert::convert;
use crate::rules::recommend::recommend;

use super::context::DistributedFormatContext;
use super::protocol::{
    ConvertRequest, ConvertResponse, FormatRequest, FormatResponse, RecommendRequest,
    RecommendResponse, RuleResponse, SetRuleRequest, WaitQuery,
};

const DEFAULT_WAIT_MS: u64 = 5000;

type Context = Arc<DistributedFormatContext<HttpRaftTransport>>;

/// JSON payload item rendered through the format engine. Strings render
/// bare; everything else keeps its JSON form.
struct PayloadItem(serde_json::Value);

impl fmt::Display for PayloadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

fn status_for(error: &ClusterError) -> StatusCode {
    match error {
        ClusterError::InvalidTemplate { .. } | ClusterError::ShardRender { .. } => {
            StatusCode::BAD_REQUEST
        }
        ClusterError::NoRuleSet => StatusCode::NOT_FOUND,
        ClusterError::WaitTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ClusterError::NotLeader { .. } | ClusterError::ReplicationTimeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_set_rule(
    Extension(ctx): Extension<Context>,
    Json(req): Json<SetRuleRequest>,
) -> (StatusCode, Json<RuleResponse>) {
    match ctx.set_format(&req.format).await {
        Ok(rule) => (
            StatusCode::OK,
            Json(RuleResponse {
                rule: Some(rule),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to set rule: {}", e);
            (
                status_for(&e),
                Json(RuleResponse {
                    rule: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_get_rule(
    Extension(ctx): Extension<Context>,
) -> (StatusCode, Json<RuleResponse>) {
    let rule = ctx.current_rule().await;
    if rule.is_unset() {
        return (
            StatusCode::NOT_FOUND,
            Json(RuleResponse {
                rule: None,
                error: Some(ClusterError::NoRuleSet.to_string()),
            }),
        );
    }
    (
        StatusCode::OK,
        Json(RuleResponse {
            rule: Some(rule),
            error: None,
        }),
    )
}

pub async fn handle_wait_rule(
    Extension(ctx): Extension<Context>,
    Path(min_version): Path<u64>,
    Query(query): Query<WaitQuery>,
) -> (StatusCode, Json<RuleResponse>) {
    let timeout = Duration::from_millis(query.timeout_ms.unwrap_or(DEFAULT_WAIT_MS));
    match ctx.wait_for_version(min_version, timeout).await {
        Ok(rule) => (
            StatusCode::OK,
            Json(RuleResponse {
                rule: Some(rule),
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(RuleResponse {
                rule: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

pub async fn handle_format(
    Extension(ctx): Extension<Context>,
    Json(req): Json<FormatRequest>,
) -> (StatusCode, Json<FormatResponse>) {
    let rule = ctx.current_rule().await;
    let items: Vec<PayloadItem> = req.items.into_iter().map(PayloadItem).collect();

    match ctx.format_all(items, req.shards).await {
        Ok(formatted) => (
            StatusCode::OK,
            Json(FormatResponse {
                formatted,
                rule_version: rule.version,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to format batch: {}", e);
            (
                status_for(&e),
                Json(FormatResponse {
                    formatted: Vec::new(),
                    rule_version: rule.version,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_recommend(Json(req): Json<RecommendRequest>) -> Json<RecommendResponse> {
    Json(RecommendResponse {
        recommendation: recommend(&req.samples, req.context),
    })
}

pub async fn handle_convert(
    Json(req): Json<ConvertRequest>,
) -> (StatusCode, Json<ConvertResponse>) {
    match convert(&req.template, req.from, req.to) {
        Ok(converted) => (
            StatusCode::OK,
            Json(ConvertResponse {
                converted: Some(converted),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ConvertResponse {
                converted: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}
