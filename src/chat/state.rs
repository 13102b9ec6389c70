//! In-process chat state shared by strategies and the tool-call lifecycle.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::chat::message::Message;

#[derive(Default)]
struct Inner {
    /// All messages, in display order.
    messages: Vec<Message>,
    /// chat id -> thread id awaiting human interaction.
    pending_interactions: HashMap<String, String>,
}

/// Ordered messages plus pending-interaction markers.
///
/// A single lock serialises every mutation, so updates to one message apply
/// in the order they are observed.
#[derive(Default)]
pub struct ChatState {
    inner: RwLock<Inner>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, message: Message) {
        self.inner.write().await.messages.push(message);
    }

    /// Insert directly after `anchor`, or at the end if the anchor is gone.
    pub async fn insert_after(&self, anchor: Uuid, message: Message) {
        let mut inner = self.inner.write().await;
        match inner.messages.iter().position(|m| m.id == anchor) {
            Some(pos) => inner.messages.insert(pos + 1, message),
            None => inner.messages.push(message),
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Message> {
        self.inner
            .read()
            .await
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Mutate one message in place. Returns `None` if it does not exist.
    pub async fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut Message) -> R) -> Option<R> {
        let mut inner = self.inner.write().await;
        inner.messages.iter_mut().find(|m| m.id == id).map(f)
    }

    /// Whether any message replies to `anchor`.
    pub async fn has_reply(&self, anchor: Uuid) -> bool {
        self.inner
            .read()
            .await
            .messages
            .iter()
            .any(|m| m.reply_to == Some(anchor))
    }

    /// All messages of a chat, in order.
    pub async fn messages(&self, chat_id: &str) -> Vec<Message> {
        self.inner
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    /// The last `n` transcript-eligible messages of a chat, oldest first.
    pub async fn recent(&self, chat_id: &str, n: usize) -> Vec<Message> {
        let inner = self.inner.read().await;
        let mut recent: Vec<Message> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.chat_id == chat_id && m.is_transcript_eligible())
            .take(n)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    pub async fn set_pending_interaction(&self, chat_id: &str, thread_id: &str) {
        self.inner
            .write()
            .await
            .pending_interactions
            .insert(chat_id.to_string(), thread_id.to_string());
    }

    pub async fn pending_interaction(&self, chat_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .pending_interactions
            .get(chat_id)
            .cloned()
    }

    /// Clear the marker only if it still points at `thread_id`.
    pub async fn clear_pending_interaction(&self, chat_id: &str, thread_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner
            .pending_interactions
            .get(chat_id)
            .is_some_and(|t| t == thread_id)
        {
            inner.pending_interactions.remove(chat_id);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::{Identity, MessageStatus};

    #[tokio::test]
    async fn test_insert_after_keeps_order() {
        let state = ChatState::new();
        let user = Identity::new("u", "alice");
        let a = Message::user("c", &user, "a");
        let b = Message::user("c", &user, "b");
        let (a_id, b_id) = (a.id, b.id);
        state.push(a).await;
        state.push(b).await;

        let mid = Message::user("c", &user, "mid");
        let mid_id = mid.id;
        state.insert_after(a_id, mid).await;

        let order: Vec<Uuid> = state.messages("c").await.iter().map(|m| m.id).collect();
        assert_eq!(order, vec![a_id, mid_id, b_id]);
    }

    #[tokio::test]
    async fn test_recent_skips_pending_and_empty() {
        let state = ChatState::new();
        let user = Identity::new("u", "alice");
        let bot = Identity::new("b", "bot");
        for i in 0..4 {
            state.push(Message::user("c", &user, format!("m{i}"))).await;
        }
        state.push(Message::placeholder("c", &bot)).await;
        state.push(Message::user("other", &user, "elsewhere")).await;

        let recent = state.recent("c", 3).await;
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_update_and_pending_interaction() {
        let state = ChatState::new();
        let bot = Identity::new("b", "bot");
        let msg = Message::placeholder("c", &bot);
        let id = msg.id;
        state.push(msg).await;

        let updated = state
            .update(id, |m| m.status = MessageStatus::Completed)
            .await;
        assert!(updated.is_some());
        assert!(state.update(Uuid::new_v4(), |_| ()).await.is_none());

        state.set_pending_interaction("c", "t1").await;
        assert!(!state.clear_pending_interaction("c", "t2").await);
        assert!(state.clear_pending_interaction("c", "t1").await);
        assert!(state.pending_interaction("c").await.is_none());
    }
}
