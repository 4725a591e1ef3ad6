//! Builders for claims spreadsheets and model payloads.

#![allow(dead_code)]

use serde_json::{json, Value};

const REGIONS: &[&str] = &["Riyadh", "Jeddah", "Dammam", "Makkah", "Madinah"];
const PRODUCTS: &[&str] = &["MOTOR-COMP", "MOTOR-TPL", "MEDICAL-GOLD", "PROPERTY-SME"];

/// Builds a claims CSV with a fixed header and generated rows.
pub struct ClaimsCsvBuilder {
    rows: Vec<[String; 6]>,
}

impl ClaimsCsvBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Adds `count` generated claims.
    pub fn claims(mut self, count: usize) -> Self {
        for _ in 0..count {
            let n = self.rows.len();
            self.rows.push([
                format!("CLM-{:05}", n + 1),
                format!("POL-{:04}", 100 + n % 7),
                REGIONS[n % REGIONS.len()].to_string(),
                PRODUCTS[n % PRODUCTS.len()].to_string(),
                format!("{}", 1_500 + (n * 731) % 40_000),
                format!("{}", 2_000 + (n * 97) % 6_000),
            ]);
        }
        self
    }

    pub fn claim(mut self, id: &str, policy: &str, region: &str, product: &str, amount: u64, premium: u64) -> Self {
        self.rows.push([
            id.to_string(),
            policy.to_string(),
            region.to_string(),
            product.to_string(),
            amount.to_string(),
            premium.to_string(),
        ]);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = String::from("ClaimID,PolicyNumber,Region,Product,ClaimAmount,Premium\n");
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// Builds a model reply in the `{Insights, AuditSummary}` shape.
pub struct PayloadBuilder {
    insights: Vec<Value>,
    summary_title: String,
    audit_summary: String,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self {
            insights: Vec::new(),
            summary_title: "Claims Audit".to_string(),
            audit_summary: "Portfolio reviewed.".to_string(),
        }
    }

    pub fn insight(mut self, title: &str, category: &str, matching_ids: &[&str]) -> Self {
        self.insights.push(json!({
            "Title": title,
            "Category": category,
            "PatternSummary": format!("{} observed across {} claims", title, matching_ids.len()),
            "SupportingEvidence": {"Region": "Riyadh", "ClaimCount": matching_ids.len()},
            "PossibleExplanations": ["Data entry lag", "Coordinated filings"],
            "SuggestedAction": format!("Review {}", title),
            "MatchingIDs": matching_ids,
        }));
        self
    }

    pub fn summary(mut self, title: &str, text: &str) -> Self {
        self.summary_title = title.to_string();
        self.audit_summary = text.to_string();
        self
    }

    pub fn value(&self) -> Value {
        json!({
            "Insights": self.insights,
            "AuditSummary": {
                "SummaryTitle": self.summary_title,
                "AuditSummary": self.audit_summary,
            }
        })
    }

    pub fn build(&self) -> String {
        self.value().to_string()
    }

    /// The payload wrapped in a markdown fence, as models often reply.
    pub fn build_fenced(&self) -> String {
        format!("```json\n{}\n```", serde_json::to_string_pretty(&self.value()).unwrap())
    }
}
