//! Scripted generator for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Generation, GenerationRequest, LlmError, TextGenerator};
use crate::job::TokenUsage;

pub(crate) enum Reply {
    Text(String),
    Fail(LlmError),
    Panic,
}

/// Replays canned replies in order and records every request. Once the
/// script runs out every call fails with `EmptyResponse`.
#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn text(reply: &str) -> Self {
        Self::new(vec![Reply::Text(reply.to_string())])
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, LlmError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(Generation {
                text,
                usage: Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                }),
            }),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Panic) => panic!("scripted panic"),
            None => Err(LlmError::EmptyResponse),
        }
    }
}
