//! Contract with the chat-completion collaborator.
//!
//! The session core never talks to a model itself. It hands a [`ChatRequest`]
//! to a [`ChatBackend`] and records whatever text comes back, or a system note
//! when the call fails.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{models::Message, session::SessionController};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    pub segment_id: Option<String>,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.clone(),
            content: message.content.clone(),
            segment_id: message.segment_id().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub segment_id: String,
    pub messages: Vec<ChatTurn>,
}

impl ChatRequest {
    /// Builds a request for the segment currently in progress, carrying the
    /// whole transcript so far. `None` when no segment is in progress.
    pub fn for_active_segment(controller: &SessionController) -> Option<Self> {
        let segment = controller.active_segment()?;
        Some(Self {
            session_id: controller.session_id().to_string(),
            segment_id: segment.id,
            messages: controller.chat_log().iter().map(ChatTurn::from).collect(),
        })
    }
}

pub trait ChatBackend: Send + Sync {
    /// Returns the interviewer's reply text.
    fn complete(&self, request: ChatRequest)
        -> impl Future<Output = anyhow::Result<String>> + Send;
}
