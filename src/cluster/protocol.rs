//! Request and response DTOs for the public cluster API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consensus::types::RuleVersion;
use crate::rules::convert::Dialect;
use crate::rules::recommend::{Recommendation, UsageContext};

#[derive(Debug, Serialize, Deserialize)]
pub struct SetRuleRequest {
    pub format: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RuleResponse {
    pub rule: Option<RuleVersion>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaitQuery {
    /// Defaults to 5000 when absent.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FormatRequest {
    pub items: Vec<Value>,
    /// Explicit shard count; defaults to size-based planning.
    pub shards: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FormatResponse {
    pub formatted: Vec<String>,
    /// Version of the rule the batch was rendered against.
    pub rule_version: u64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub samples: Vec<Value>,
    pub context: UsageContext,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendation: Recommendation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub template: String,
    pub from: Dialect,
    pub to: Dialect,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub converted: Option<String>,
    pub error: Option<String>,
}
