use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_MESSAGES: usize = 20;
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct Conversation {
    messages: Vec<Message>,
    updated_at: DateTime<Utc>,
}

/// Short-lived per-session message history consulted during prompt
/// assembly. Process-local by design; the trait boundary lets a remote
/// cache replace it without touching the query pipeline.
pub trait ConversationMemory: Send + Sync {
    fn add_user_message(&self, session_id: &str, content: &str);
    fn add_assistant_message(&self, session_id: &str, content: &str);
    /// Snapshot of the session's messages, decoupled from internal state.
    fn get_history(&self, session_id: &str) -> Vec<Message>;
    fn get_recent_history(&self, session_id: &str, n: usize) -> Vec<Message>;
    fn clear_session(&self, session_id: &str);
}

/// In-memory conversation store: bounded per session (oldest trimmed) and
/// expiring after `ttl` of inactivity, enforced by a periodic sweeper.
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    max_messages: usize,
    ttl: Duration,
}

impl InMemoryStore {
    pub fn new(max_messages: usize, ttl: Duration) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_messages,
            ttl,
        }
    }

    /// Defaults: 20 messages per session (10 turns), 1 hour TTL.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES, DEFAULT_TTL)
    }

    /// Run the expiry sweep every 5 minutes until the token is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("conversation memory sweeper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                        let removed = store.sweep_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "evicted expired conversation sessions");
                        }
                    }
                }
            }
        })
    }

    /// Evict sessions whose last append is older than the TTL. Returns the
    /// number of sessions removed.
    pub fn sweep_expired(&self) -> usize {
        let mut conversations = self.conversations.write().unwrap();
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1));

        let before = conversations.len();
        conversations.retain(|_, conv| now - conv.updated_at <= ttl);
        before - conversations.len()
    }

    fn add_message(&self, session_id: &str, role: Role, content: &str) {
        let mut conversations = self.conversations.write().unwrap();
        let now = Utc::now();

        let conv = conversations
            .entry(session_id.to_string())
            .or_insert_with(|| Conversation {
                messages: Vec::new(),
                updated_at: now,
            });

        conv.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: now,
        });
        conv.updated_at = now;

        if conv.messages.len() > self.max_messages {
            let excess = conv.messages.len() - self.max_messages;
            conv.messages.drain(..excess);
        }
    }
}

impl ConversationMemory for InMemoryStore {
    fn add_user_message(&self, session_id: &str, content: &str) {
        self.add_message(session_id, Role::User, content);
    }

    fn add_assistant_message(&self, session_id: &str, content: &str) {
        self.add_message(session_id, Role::Assistant, content);
    }

    fn get_history(&self, session_id: &str) -> Vec<Message> {
        let conversations = self.conversations.read().unwrap();
        conversations
            .get(session_id)
            .map(|conv| conv.messages.clone())
            .unwrap_or_default()
    }

    fn get_recent_history(&self, session_id: &str, n: usize) -> Vec<Message> {
        let history = self.get_history(session_id);
        if history.len() <= n {
            return history;
        }
        history[history.len() - n..].to_vec()
    }

    fn clear_session(&self, session_id: &str) {
        let mut conversations = self.conversations.write().unwrap();
        conversations.remove(session_id);
    }
}

/// Render history as `User:` / `Assistant:` lines for prompt injection.
/// Returns an empty string for empty history.
pub fn format_for_prompt(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        match message.role {
            Role::User => {
                out.push_str("User: ");
            }
            Role::Assistant => {
                out.push_str("Assistant: ");
            }
        }
        out.push_str(&message.content);
        out.push('\n');
    }
    out
}
