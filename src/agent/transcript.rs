//! Role-tagged conversation transcripts for completion requests.

use crate::chat::Message;
use crate::llm::ChatMessage;

/// Build `system, history.., user` for one completion.
///
/// Messages sent by `assistant_id` become assistant turns; everything else
/// is a user turn. `history` is expected oldest first and already windowed.
pub fn build_transcript(
    system_prompt: String,
    history: &[Message],
    assistant_id: &str,
    user_text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().map(|m| {
        if m.sender_id == assistant_id {
            ChatMessage::assistant(m.text.clone())
        } else {
            ChatMessage::user(m.text.clone())
        }
    }));
    messages.push(ChatMessage::user(user_text));
    messages
}

/// Drop the message being answered from `history` and keep the last `window`.
///
/// Callers usually post the user message before asking for a response, so
/// the newest history entry is often the request itself.
pub fn window_history(
    mut history: Vec<Message>,
    window: usize,
    user_id: &str,
    user_text: &str,
) -> Vec<Message> {
    if history
        .last()
        .is_some_and(|m| m.sender_id == user_id && m.text == user_text)
    {
        history.pop();
    }
    let skip = history.len().saturating_sub(window);
    history.split_off(skip)
}

/// Plain-text rendering of recent history, used in delegated task descriptions.
pub fn render_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.sender.display_name, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Identity;
    use crate::llm::Role;

    #[test]
    fn test_roles_follow_sender() {
        let user = Identity::new("u", "alice");
        let bot = Identity::new("b", "bot");
        let mut reply = Message::placeholder("c", &bot);
        reply.text = "hello".into();
        let history = vec![Message::user("c", &user, "hi"), reply];

        let transcript = build_transcript("sys".into(), &history, "b", "next");
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(transcript[3].content, "next");
    }

    #[test]
    fn test_window_drops_current_request() {
        let user = Identity::new("u", "alice");
        let history: Vec<Message> = (0..4)
            .map(|i| Message::user("c", &user, format!("m{i}")))
            .chain(std::iter::once(Message::user("c", &user, "hello")))
            .collect();

        let windowed = window_history(history.clone(), 3, "u", "hello");
        let texts: Vec<&str> = windowed.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m1", "m2", "m3"]);

        let other_sender = window_history(history, 3, "someone-else", "hello");
        assert_eq!(other_sender.last().unwrap().text, "hello");
    }

    #[test]
    fn test_render_history() {
        let user = Identity::new("u", "alice").with_display_name("Alice");
        let history = vec![Message::user("c", &user, "one")];
        assert_eq!(render_history(&history), "Alice: one");
    }
}
