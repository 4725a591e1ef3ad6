//! Claims analysis: spreadsheet rows in, model payload out.

pub mod parse;
pub mod prompt;

pub use parse::{is_fallback, parse_model_output, ParsedOutput, PARSE_FAILURE_MESSAGE};
pub use prompt::{build_prompt, ANALYSIS_SYSTEM_PROMPT};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info_span, Instrument};

use crate::config::AnalysisConfig;
use crate::error::SpreadsheetError;
use crate::job::TokenUsage;
use crate::llm::{GenerationRequest, LlmError, PromptMessage, TextGenerator};
use crate::spreadsheet;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Could not read spreadsheet: {0}")]
    Spreadsheet(#[from] SpreadsheetError),

    #[error("Analysis request failed: {0}")]
    Llm(#[from] LlmError),
}

/// Result of one successful model exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// Parsed model JSON, or the parse-failure fallback object.
    pub payload: Value,
    pub parse_failed: bool,
    pub row_count: usize,
    pub rows_submitted: usize,
    pub usage: Option<TokenUsage>,
}

impl AnalysisOutcome {
    pub fn truncated(&self) -> bool {
        self.rows_submitted < self.row_count
    }
}

pub struct Analyzer {
    generator: Arc<dyn TextGenerator>,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: AnalysisConfig) -> Self {
        Self { generator, config }
    }

    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.generator)
    }

    /// Parses the uploaded file, submits the bounded row set and parses
    /// the reply.
    ///
    /// Only transport-level failures are errors; a reply that is not JSON
    /// still produces an outcome with `parse_failed` set.
    pub async fn analyze(
        &self,
        filename: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let (user_prompt, row_count, rows_submitted) = {
            let _step = info_span!("parse_spreadsheet", extension = %extension).entered();
            let sheet =
                spreadsheet::parse_rows(extension, bytes, self.config.max_expanded_bytes)?;
            let rows_submitted = sheet.total_rows().min(self.config.max_rows);
            if rows_submitted < sheet.total_rows() {
                tracing::warn!(
                    total = sheet.total_rows(),
                    submitted = rows_submitted,
                    "Row cap reached, submitting a subset"
                );
            }
            (
                build_prompt(filename, &sheet, self.config.max_rows),
                sheet.total_rows(),
                rows_submitted,
            )
        };

        let request = GenerationRequest {
            system: Some(ANALYSIS_SYSTEM_PROMPT.to_string()),
            messages: vec![PromptMessage::user(user_prompt)],
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };

        let generation = self
            .generate_with_retry(request)
            .instrument(info_span!("generate", rows = rows_submitted))
            .await?;

        let parsed = parse_model_output(&generation.text);
        if parsed.parse_failed {
            tracing::warn!("Storing raw model reply with parse-failure marker");
        }

        Ok(AnalysisOutcome {
            payload: parsed.payload,
            parse_failed: parsed.parse_failed,
            row_count,
            rows_submitted,
            usage: generation.usage,
        })
    }

    async fn generate_with_retry(
        &self,
        request: GenerationRequest,
    ) -> Result<crate::llm::Generation, LlmError> {
        let max_attempts = self.config.max_attempts.max(1);
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 1;

        loop {
            match self.generator.generate(request.clone()).await {
                Ok(generation) => return Ok(generation),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transient model failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
