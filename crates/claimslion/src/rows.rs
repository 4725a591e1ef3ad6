//! Derived per-line breakdown for tabular display.
//!
//! Rows are regenerated from the stored payload whenever a job completes;
//! they are never edited independently.

use serde_json::Value;
use uuid::Uuid;

use crate::job::RowAnalysis;
use crate::report::{canonical_key, field, text, AnalysisReport, InsightCategory};

/// Display priority for an insight category.
pub fn priority_for(category: InsightCategory) -> &'static str {
    match category {
        InsightCategory::FraudIndicator => "Critical",
        InsightCategory::PricingMismatch | InsightCategory::RiskConcentration => "High",
        InsightCategory::PortfolioLeakage | InsightCategory::UnderwritingGap => "Medium",
        InsightCategory::Other => "Low",
    }
}

/// One row per insight, then one per entry of a `Recommendations` array
/// when the payload carries one.
pub fn derive_rows(job_id: &str, report: &AnalysisReport, payload: &Value) -> Vec<RowAnalysis> {
    let mut rows: Vec<RowAnalysis> = report
        .insights
        .iter()
        .map(|insight| RowAnalysis {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            sku: insight.matching_ids.first().cloned(),
            region: insight.supporting_evidence.as_ref().and_then(evidence_region),
            recommendation: insight.suggested_action.clone(),
            alert: insight.title.clone(),
            forecast_highlight: insight.pattern_summary.clone(),
            priority: Some(priority_for(insight.category_kind()).to_string()),
            action: insight.category.clone(),
            reason: (!insight.possible_explanations.is_empty())
                .then(|| insight.possible_explanations.join("; ")),
        })
        .collect();

    let recommendations = payload
        .as_object()
        .and_then(|obj| field(obj, &["recommendations"]))
        .and_then(Value::as_array);
    if let Some(items) = recommendations {
        rows.extend(
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|rec| RowAnalysis {
                    id: Uuid::new_v4().to_string(),
                    job_id: job_id.to_string(),
                    sku: field(rec, &["sku", "product"]).and_then(text),
                    region: field(rec, &["region", "moveto", "tolocation"]).and_then(text),
                    recommendation: field(rec, &["action", "recommendation"]).and_then(text),
                    alert: field(rec, &["alert"]).and_then(text),
                    forecast_highlight: field(rec, &["timeline", "forecast"]).and_then(text),
                    priority: field(rec, &["priority"]).and_then(text),
                    action: field(rec, &["action"]).and_then(text),
                    reason: field(rec, &["impact", "reason"]).and_then(text),
                }),
        );
    }

    rows
}

/// A region named in supporting evidence, either directly
/// (`"Region": "Riyadh"`) or as the single key of a region breakdown.
fn evidence_region(evidence: &Value) -> Option<String> {
    let obj = evidence.as_object()?;
    let (_, value) = obj.iter().find(|(k, _)| canonical_key(k) == "region")?;
    match value {
        Value::Object(breakdown) if breakdown.len() == 1 => breakdown.keys().next().cloned(),
        other => text(other),
    }
}
