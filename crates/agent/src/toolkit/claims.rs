//! Plan recommendations backed by historical claims statistics.

use std::fs;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::registry::{Tool, ToolId};

#[derive(Clone, Debug, Deserialize)]
pub struct ClaimRecord {
    pub destination: String,
    pub activity: String,
    pub season: String,
    pub claim_amount: f64,
}

pub struct ClaimsInsightTool {
    records: Vec<ClaimRecord>,
}

impl ClaimsInsightTool {
    /// A missing or unreadable stats file degrades to an empty dataset;
    /// the tool then answers with its default recommendation.
    pub fn load(path: &Path) -> Self {
        let records = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<ClaimRecord>>(&raw) {
                Ok(records) => records,
                Err(source) => {
                    warn!(
                        event_name = "claims_insights.data_invalid",
                        path = %path.display(),
                        error = %source,
                    );
                    Vec::new()
                }
            },
            Err(_) => {
                warn!(event_name = "claims_insights.data_missing", path = %path.display());
                Vec::new()
            }
        };
        Self { records }
    }

    pub fn from_records(records: Vec<ClaimRecord>) -> Self {
        Self { records }
    }

    pub fn risk_summary(&self, destination: Option<&str>, activity: Option<&str>) -> Value {
        let mut filters = Map::new();
        if let Some(destination) = destination {
            filters.insert("destination".to_string(), Value::from(destination));
        }
        if let Some(activity) = activity {
            filters.insert("activity".to_string(), Value::from(activity));
        }

        let subset: Vec<&ClaimRecord> = self
            .records
            .iter()
            .filter(|record| {
                destination.map_or(true, |wanted| contains_ci(&record.destination, wanted))
                    && activity.map_or(true, |wanted| contains_ci(&record.activity, wanted))
            })
            .collect();

        if subset.is_empty() {
            return json!({
                "filters": filters,
                "message": "No claims data available for the specified filters.",
            });
        }

        let mut amounts: Vec<f64> = subset.iter().map(|record| record.claim_amount).collect();
        amounts.sort_by(|a, b| a.partial_cmp(b).expect("claim amounts are finite"));
        let count = amounts.len();
        let total: f64 = amounts.iter().sum();
        let max = *amounts.last().expect("non-empty amounts");

        json!({
            "filters": filters,
            "summary": {
                "claim_count": count,
                "average_claim": round2(total / count as f64),
                "p90_claim": round2(quantile(&amounts, 0.9)),
                "max_claim": round2(max),
            },
            "seasonality": seasonality(&subset),
            "top_activities": top_activities(&subset),
        })
    }

    pub fn recommend_plan(
        &self,
        destination: Option<&str>,
        activity: Option<&str>,
        trip_cost: Option<f64>,
    ) -> Value {
        let summary = self.risk_summary(destination, activity);
        let Some(stats) = summary.get("summary") else {
            return json!({
                "recommendation": "silver",
                "reason": "Default recommendation due to limited data.",
            });
        };

        let average_claim = stats["average_claim"].as_f64().unwrap_or(0.0);
        let p90_claim = stats["p90_claim"].as_f64().unwrap_or(0.0);

        let (tier, reason) = if p90_claim > 50_000.0 {
            ("platinum", "High 90th percentile claim amount; recommend premium medical coverage")
        } else if average_claim > 20_000.0 {
            ("gold", "Elevated average claim cost; gold tier balances value and protection")
        } else {
            ("silver", "Moderate claim history; silver tier suffices for most travelers")
        };
        let mut reason = reason.to_string();

        if let Some(cost) = trip_cost {
            if cost > p90_claim {
                reason.push_str(" and upgrade trip cancellation coverage to match trip cost.");
            }
        }

        json!({
            "filters": summary.get("filters"),
            "summary": stats,
            "seasonality": summary.get("seasonality"),
            "recommendation": tier,
            "reason": reason,
        })
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Linear-interpolated quantile over a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return sorted[low];
    }
    let weight = rank - low as f64;
    sorted[low] * (1.0 - weight) + sorted[high] * weight
}

/// Top three seasons by claim volume.
fn seasonality(subset: &[&ClaimRecord]) -> Vec<Value> {
    let mut groups: Vec<(String, usize, f64)> = Vec::new();
    for record in subset {
        match groups.iter_mut().find(|(season, _, _)| *season == record.season) {
            Some((_, count, total)) => {
                *count += 1;
                *total += record.claim_amount;
            }
            None => groups.push((record.season.clone(), 1, record.claim_amount)),
        }
    }
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
        .into_iter()
        .take(3)
        .map(|(season, count, total)| {
            json!({"season": season, "count": count, "mean": round2(total / count as f64)})
        })
        .collect()
}

/// Five costliest activities by mean claim amount.
fn top_activities(subset: &[&ClaimRecord]) -> Map<String, Value> {
    let mut groups: Vec<(String, usize, f64)> = Vec::new();
    for record in subset {
        match groups.iter_mut().find(|(activity, _, _)| *activity == record.activity) {
            Some((_, count, total)) => {
                *count += 1;
                *total += record.claim_amount;
            }
            None => groups.push((record.activity.clone(), 1, record.claim_amount)),
        }
    }
    groups.sort_by(|a, b| {
        let mean_a = a.2 / a.1 as f64;
        let mean_b = b.2 / b.1 as f64;
        mean_b.partial_cmp(&mean_a).expect("claim means are finite")
    });
    groups
        .into_iter()
        .take(5)
        .map(|(activity, count, total)| (activity, Value::from(round2(total / count as f64))))
        .collect()
}

#[async_trait]
impl Tool for ClaimsInsightTool {
    fn id(&self) -> ToolId {
        ToolId::ClaimsRecommendation
    }

    fn description(&self) -> &'static str {
        "Generate plan recommendations and risk insights using historical claims data."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "destination": {"type": "string", "description": "Trip destination"},
                "activity": {"type": "string", "description": "Primary trip activity"},
                "trip_cost": {
                    "type": "number",
                    "description": "Estimated total trip cost in currency units",
                },
            },
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let destination = input.get("destination").and_then(Value::as_str);
        let activity = input.get("activity").and_then(Value::as_str);
        let trip_cost = input.get("trip_cost").and_then(Value::as_f64);
        Ok(self.recommend_plan(destination, activity, trip_cost))
    }
}
