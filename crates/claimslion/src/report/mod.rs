//! Canonical view over stored model payloads.
//!
//! The model is asked for PascalCase field names but replies drift between
//! PascalCase, camelCase and snake_case. Keys are matched after folding
//! case and dropping separators, so `MatchingIDs`, `matchingIds` and
//! `matching_ids` all land in the same field. The stored payload is never
//! rewritten; this module only reads it.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::analysis::is_fallback;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    PricingMismatch,
    FraudIndicator,
    RiskConcentration,
    PortfolioLeakage,
    UnderwritingGap,
    Other,
}

impl InsightCategory {
    pub fn parse(s: &str) -> Self {
        match canonical_key(s).as_str() {
            "pricingmismatch" => InsightCategory::PricingMismatch,
            "fraudindicator" => InsightCategory::FraudIndicator,
            "riskconcentration" => InsightCategory::RiskConcentration,
            "portfolioleakage" => InsightCategory::PortfolioLeakage,
            "underwritinggap" => InsightCategory::UnderwritingGap,
            _ => InsightCategory::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InsightCategory::PricingMismatch => "Pricing Mismatch",
            InsightCategory::FraudIndicator => "Fraud Indicator",
            InsightCategory::RiskConcentration => "Risk Concentration",
            InsightCategory::PortfolioLeakage => "Portfolio Leakage",
            InsightCategory::UnderwritingGap => "Underwriting Gap",
            InsightCategory::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub title: Option<String>,
    pub category: Option<String>,
    pub pattern_summary: Option<String>,
    pub supporting_evidence: Option<Value>,
    pub possible_explanations: Vec<String>,
    pub suggested_action: Option<String>,
    pub matching_ids: Vec<String>,
}

impl Insight {
    pub fn category_kind(&self) -> InsightCategory {
        self.category
            .as_deref()
            .map(InsightCategory::parse)
            .unwrap_or(InsightCategory::Other)
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub summary_title: Option<String>,
    pub audit_summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub insights: Vec<Insight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_summary: Option<AuditSummary>,
    pub parse_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Outcome of checking a payload against the canonical shape.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShapeCheck {
    pub recognized: bool,
    pub insight_count: usize,
    pub has_audit_summary: bool,
    pub problems: Vec<String>,
}

/// Reads a stored payload into the canonical report.
pub fn normalize(payload: &Value) -> AnalysisReport {
    if is_fallback(payload) {
        return AnalysisReport {
            parse_failed: true,
            raw_response: payload
                .get("raw_response")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..AnalysisReport::default()
        };
    }

    match payload {
        Value::Array(items) => AnalysisReport {
            insights: items.iter().filter_map(insight_from).collect(),
            ..AnalysisReport::default()
        },
        Value::Object(obj) => AnalysisReport {
            insights: field(obj, &["insights"])
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(insight_from).collect())
                .unwrap_or_default(),
            audit_summary: field(obj, &["auditsummary"]).and_then(audit_from),
            ..AnalysisReport::default()
        },
        _ => AnalysisReport::default(),
    }
}

/// Reports whether the payload carries the `{Insights, AuditSummary}`
/// shape. Never used to reject a payload.
pub fn validate_shape(payload: &Value) -> ShapeCheck {
    let mut check = ShapeCheck::default();

    if is_fallback(payload) {
        check.problems.push("model reply was not valid JSON".to_string());
        return check;
    }

    let insights = match payload {
        Value::Object(obj) => {
            check.has_audit_summary = field(obj, &["auditsummary"])
                .map(Value::is_object)
                .unwrap_or(false);
            if !check.has_audit_summary {
                check.problems.push("missing AuditSummary object".to_string());
            }
            match field(obj, &["insights"]) {
                Some(Value::Array(items)) => Some(items),
                Some(_) => {
                    check.problems.push("Insights is not an array".to_string());
                    None
                }
                None => {
                    check.problems.push("missing Insights array".to_string());
                    None
                }
            }
        }
        Value::Array(items) => {
            check.problems.push("top-level array instead of object".to_string());
            Some(items)
        }
        _ => {
            check.problems.push("payload is not an object".to_string());
            None
        }
    };

    if let Some(items) = insights {
        check.insight_count = items.len();
        for (i, item) in items.iter().enumerate() {
            match item.as_object() {
                Some(obj) => {
                    for (name, alias) in [("Title", "title"), ("Category", "category")] {
                        if field(obj, &[alias]).is_none() {
                            check.problems.push(format!("insight {} has no {}", i, name));
                        }
                    }
                }
                None => check.problems.push(format!("insight {} is not an object", i)),
            }
        }
    }

    check.recognized = check.problems.is_empty();
    check
}

fn insight_from(value: &Value) -> Option<Insight> {
    let obj = value.as_object()?;
    Some(Insight {
        title: field(obj, &["title", "insighttitle", "name"]).and_then(text),
        category: field(obj, &["category", "type"]).and_then(text),
        pattern_summary: field(obj, &["patternsummary", "summary", "description"]).and_then(text),
        supporting_evidence: field(obj, &["supportingevidence", "evidence"])
            .filter(|v| !v.is_null())
            .cloned(),
        possible_explanations: field(obj, &["possibleexplanations", "explanations"])
            .map(texts)
            .unwrap_or_default(),
        suggested_action: field(obj, &["suggestedaction", "action", "recommendation"])
            .and_then(text),
        matching_ids: field(obj, &["matchingids", "matchingclaimids", "claimids"])
            .map(texts)
            .unwrap_or_default(),
    })
}

fn audit_from(value: &Value) -> Option<AuditSummary> {
    match value {
        Value::Object(obj) => Some(AuditSummary {
            summary_title: field(obj, &["summarytitle", "title"]).and_then(text),
            audit_summary: field(obj, &["auditsummary", "summary"]).and_then(text),
        }),
        Value::String(s) => Some(AuditSummary {
            summary_title: None,
            audit_summary: Some(s.clone()),
        }),
        _ => None,
    }
}

/// Looks up the first key whose folded form matches one of `aliases`
/// (already folded).
pub(crate) fn field<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| {
        obj.iter()
            .find(|(key, _)| canonical_key(key) == *alias)
            .map(|(_, v)| v)
    })
}

/// Lowercase alphanumerics only: `Matching_IDs` becomes `matchingids`.
pub(crate) fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn texts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        other => text(other).into_iter().collect(),
    }
}
