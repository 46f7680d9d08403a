//! Live aggregate statistics over the record store
//!
//! Every call recomputes from the store; nothing is cached, so the snapshot
//! always reflects the latest committed upserts.

use super::db::RecordStore;
use super::error::PipelineResult;
use super::types::RecordKind;
use serde::{Deserialize, Serialize};

/// Default number of combinations reported in a snapshot
pub const DEFAULT_TOP_COMBINATIONS: usize = 10;

/// Per-facet totals across reply gates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub nobody_can_reply: u64,
    pub mention_rule: u64,
    pub following_rule: u64,
    pub follower_rule: u64,
    pub list_rule: u64,
    pub hidden_posts_only: u64,
}

/// How many gates set 0..=4 specific rule facets (nobody-can-reply excluded)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesPerGate {
    pub zero: u64,
    pub one: u64,
    pub two: u64,
    pub three: u64,
    pub four: u64,
}

impl RulesPerGate {
    pub fn total(&self) -> u64 {
        self.zero + self.one + self.two + self.three + self.four
    }
}

/// One ranked rule combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCombination {
    pub combination: String,
    pub count: u64,
}

/// Full live statistics snapshot served at `/api/stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub posts: u64,
    pub threadgates: u64,
    pub postgates: u64,
    pub top_level_posts: u64,
    pub top_level_posts_with_thread_gate: u64,
    pub threadgate_percentage: f64,
    pub threadgates_with_rules: u64,
    pub threadgate_rules_percentage: f64,
    pub rule_stats: RuleStats,
    pub rules_per_thread_gate: RulesPerGate,
    pub top_combinations: Vec<RuleCombination>,
}

/// `numerator / denominator * 100`, or 0 for an empty denominator
pub fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

/// Compute a fresh statistics snapshot
pub async fn compute_stats(
    store: &dyn RecordStore,
    top_limit: usize,
) -> PipelineResult<StatsSnapshot> {
    let posts = store.count(RecordKind::Content, None).await?;
    let threadgates = store.count(RecordKind::ReplyGate, None).await?;
    let postgates = store.count(RecordKind::QuoteGate, None).await?;

    let top_level_posts = store.count_top_level_content_items(None).await?;
    let top_level_posts_with_thread_gate =
        store.count_top_level_items_with_gate_rules(None).await?;
    let threadgates_with_rules = store.count_gates_with_rules(None).await?;

    let rule_stats = store.sum_facets(None).await?;
    let rules_per_thread_gate = store.rules_per_gate_histogram(None).await?;
    let top_combinations = store.top_rule_combinations(top_limit, None).await?;

    Ok(StatsSnapshot {
        posts,
        threadgates,
        postgates,
        top_level_posts,
        top_level_posts_with_thread_gate,
        threadgate_percentage: percentage(top_level_posts_with_thread_gate, top_level_posts),
        threadgates_with_rules,
        threadgate_rules_percentage: percentage(threadgates_with_rules, threadgates),
        rule_stats,
        rules_per_thread_gate,
        top_combinations,
    })
}
