//! Follow-up questions about a completed analysis.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::db::chat_repo::{self, ChatMessageRow};
use crate::db::job_repo;
use crate::db::{format_timestamp, Database, DatabaseError};
use crate::job::{ChatMessage, ChatRole, Job, JobStatus};
use crate::llm::{GenerationRequest, LlmError, PromptMessage, TextGenerator};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is required and cannot be empty")]
    EmptyMessage,

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} is {status}; chat is available once analysis is complete")]
    NotReady { id: String, status: JobStatus },

    #[error("Model request failed: {0}")]
    Model(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub struct ChatService {
    db: Database,
    generator: Arc<dyn TextGenerator>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(db: Database, generator: Arc<dyn TextGenerator>, config: ChatConfig) -> Self {
        Self {
            db,
            generator,
            config,
        }
    }

    /// Records the question, asks the model with the job's result as
    /// context and records the answer.
    ///
    /// If the model call fails the question stays in the history and the
    /// error is returned.
    pub async fn ask(&self, job_id: &str, question: &str) -> Result<ChatMessage, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let job = self.load_job(job_id)?;
        if job.status != JobStatus::Complete {
            return Err(ChatError::NotReady {
                id: job.id,
                status: job.status,
            });
        }

        self.append(job_id, ChatRole::User, question)?;

        let history = self.history(job_id)?;
        let request = GenerationRequest {
            system: Some(system_prompt(&job)),
            messages: prune_history(&history, self.config.max_history_messages),
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };

        let generation = self
            .generator
            .generate(request)
            .instrument(info_span!("chat", job_id = %job_id, history = history.len()))
            .await?;

        self.append(job_id, ChatRole::Assistant, generation.text.trim())
    }

    /// Messages of a job in the order they were written.
    pub fn history(&self, job_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        if job_repo::find_by_id(&self.db, job_id)?.is_none() {
            return Err(ChatError::NotFound(job_id.to_string()));
        }
        chat_repo::list_for_job(&self.db, job_id)?
            .iter()
            .map(|row| ChatMessage::from_row(row).map_err(ChatError::from))
            .collect()
    }

    fn load_job(&self, job_id: &str) -> Result<Job, ChatError> {
        let row = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| ChatError::NotFound(job_id.to_string()))?;
        Ok(Job::from_job_row(&row)?)
    }

    fn append(&self, job_id: &str, role: ChatRole, content: &str) -> Result<ChatMessage, ChatError> {
        let row = ChatMessageRow {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            role: role.as_str().to_string(),
            content: content.to_string(),
            created_at: format_timestamp(Utc::now()),
        };
        chat_repo::append(&self.db, &row)?;
        Ok(ChatMessage::from_row(&row)?)
    }
}

fn system_prompt(job: &Job) -> String {
    let today = Utc::now().format("%Y-%m-%d");
    let payload = job
        .result
        .as_ref()
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .unwrap_or_else(|| "{}".to_string());

    format!(
        "You are ClaimsLionAI, an insurance claims intelligence assistant. You previously analyzed the file \"{filename}\" with the following results:\n\n\
         Today's date: {today} (use it for any date-related question or calculation)\n\n\
         {payload}\n\n\
         The user is asking follow-up questions about this claims data. Answer from the analysis above, quantify where you can, and keep responses concise and professional.",
        filename = job.filename,
        today = today,
        payload = payload,
    )
}

/// The most recent `max` messages as model input.
///
/// The window never opens with an assistant turn, and consecutive turns of
/// the same role are merged so roles alternate.
pub fn prune_history(messages: &[ChatMessage], max: usize) -> Vec<PromptMessage> {
    let start = messages.len().saturating_sub(max.max(1));
    let mut pruned: Vec<PromptMessage> = Vec::new();

    for message in messages[start..]
        .iter()
        .skip_while(|m| m.role == ChatRole::Assistant)
    {
        match pruned.last_mut() {
            Some(last) if last.role == message.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => pruned.push(PromptMessage {
                role: message.role,
                content: message.content.clone(),
            }),
        }
    }

    pruned
}
