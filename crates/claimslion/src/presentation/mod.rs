//! Display helpers over already-fetched results: filtering, grouping,
//! badge mapping and dashboard counts. Nothing here touches storage.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::job::RowAnalysis;
use crate::report::{AnalysisReport, InsightCategory};

static RE_PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([+-]?\d+(?:\.\d+)?)\s*%").unwrap());

/// First percentage mentioned in free text, e.g. `-23.5` from
/// "claims fell -23.5% year on year".
pub fn extract_percentage(text: &str) -> Option<f64> {
    RE_PERCENTAGE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
    Destructive,
    Default,
    Secondary,
    Outline,
}

pub fn priority_badge(priority: &str) -> Badge {
    match priority.trim().to_ascii_lowercase().as_str() {
        "critical" | "high" => Badge::Destructive,
        "medium" => Badge::Default,
        "low" => Badge::Secondary,
        _ => Badge::Outline,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AlertFilter {
    #[default]
    All,
    WithAlerts,
    NoAlerts,
}

/// Row table filter. `None` or `"all"` disables a criterion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowFilter {
    pub search: Option<String>,
    pub priority: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub alerts: AlertFilter,
}

impl RowFilter {
    pub fn matches(&self, row: &RowAnalysis) -> bool {
        let contains = |field: &Option<String>, needle: &str| {
            field
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(needle))
        };

        let search = active(&self.search).map(str::to_lowercase);
        let matches_search = search.as_deref().is_none_or(|needle| {
            contains(&row.sku, needle) || contains(&row.region, needle) || contains(&row.action, needle)
        });

        let matches_priority = active(&self.priority).is_none_or(|wanted| {
            row.priority
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(wanted))
        });

        let matches_region =
            active(&self.region).is_none_or(|wanted| row.region.as_deref() == Some(wanted));

        let matches_alert = match self.alerts {
            AlertFilter::All => true,
            AlertFilter::WithAlerts => row.has_alert(),
            AlertFilter::NoAlerts => !row.has_alert(),
        };

        matches_search && matches_priority && matches_region && matches_alert
    }

    pub fn apply(&self, rows: &[RowAnalysis]) -> Vec<RowAnalysis> {
        rows.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

fn active(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

pub fn group_by_region(rows: &[RowAnalysis]) -> Vec<GroupCount> {
    group_by(rows, |r| r.region.as_deref())
}

pub fn group_by_sku(rows: &[RowAnalysis]) -> Vec<GroupCount> {
    group_by(rows, |r| r.sku.as_deref())
}

/// Counts rows per non-empty key, sorted by key.
fn group_by<F>(rows: &[RowAnalysis], key: F) -> Vec<GroupCount>
where
    F: Fn(&RowAnalysis) -> Option<&str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        if let Some(k) = key(row).map(str::trim).filter(|k| !k.is_empty()) {
            *counts.entry(k).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|(key, count)| GroupCount {
            key: key.to_string(),
            count,
        })
        .collect()
}

/// Distinct values offered by the filter dropdowns.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub priorities: Vec<String>,
}

impl FilterOptions {
    pub fn from_rows(rows: &[RowAnalysis]) -> Self {
        let collect = |get: fn(&RowAnalysis) -> Option<&String>| -> Vec<String> {
            rows.iter()
                .filter_map(get)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        Self {
            regions: collect(|r| r.region.as_ref()),
            priorities: collect(|r| r.priority.as_ref()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_insights: usize,
    /// Fraud indicators, pricing mismatches and risk concentrations.
    pub critical_insights: usize,
    /// Portfolio leakage and underwriting gaps.
    pub leakage_insights: usize,
    /// Share of insights with a suggested action, rounded. 100 when there
    /// are no insights.
    pub action_coverage_percent: u32,
    pub by_category: BTreeMap<String, usize>,
}

impl DashboardSummary {
    pub fn from_report(report: &AnalysisReport) -> Self {
        let total = report.insights.len();
        let mut summary = Self {
            total_insights: total,
            ..Self::default()
        };

        let mut actionable = 0;
        for insight in &report.insights {
            let category = insight.category_kind();
            match category {
                InsightCategory::FraudIndicator
                | InsightCategory::PricingMismatch
                | InsightCategory::RiskConcentration => summary.critical_insights += 1,
                InsightCategory::PortfolioLeakage | InsightCategory::UnderwritingGap => {
                    summary.leakage_insights += 1
                }
                InsightCategory::Other => {}
            }
            *summary
                .by_category
                .entry(category.label().to_string())
                .or_default() += 1;

            if insight
                .suggested_action
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty())
            {
                actionable += 1;
            }
        }

        summary.action_coverage_percent = if total == 0 {
            100
        } else {
            ((actionable as f64 / total as f64) * 100.0).round() as u32
        };
        summary
    }
}
