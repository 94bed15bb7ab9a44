//! Mode & prompt composer — decides the session mode for each message and
//! builds the exact payload sent to the model.
//!
//! Everything here is a pure function of the session and the incoming
//! message. Nothing is written back; the gateway commits the result once the
//! provider call has succeeded.

use crate::message::ChatMessage;
use crate::provider::ChatRequest;
use crate::session::{Mode, Session};

/// Substrings that switch a chatting session into coding mode.
///
/// Matching is on raw substrings of the lower-cased message, so "recreate"
/// counts as "create". False positives are accepted.
pub const CODING_TRIGGERS: &[&str] = &["create", "build", "make", "code", "develop", "generate"];

/// Substrings that take a coding session back to chat.
pub const EXIT_PHRASES: &[&str] = &["exit coding", "back to chat"];

/// Whether a message asks for code to be built.
pub fn is_coding_trigger(message: &str) -> bool {
    contains_any(&message.to_lowercase(), CODING_TRIGGERS)
}

/// Whether a message asks to leave coding mode.
pub fn is_exit_request(message: &str) -> bool {
    contains_any(&message.to_lowercase(), EXIT_PHRASES)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// The mode a session is in after receiving `message`.
///
/// - chat + trigger → coding, with the message recorded verbatim as project
/// - coding + exit phrase → chat
/// - coding + anything else → unchanged (the project is never overwritten)
pub fn next_mode(current: &Mode, message: &str) -> Mode {
    match current {
        Mode::Coding { .. } if is_exit_request(message) => Mode::Chat,
        Mode::Coding { .. } => current.clone(),
        Mode::Chat if is_coding_trigger(message) => Mode::Coding {
            project: message.to_string(),
        },
        Mode::Chat => Mode::Chat,
    }
}

/// System instruction for a mode.
pub fn system_prompt(mode: &Mode) -> String {
    match mode {
        Mode::Chat => CHAT_SYSTEM_PROMPT.to_string(),
        Mode::Coding { project } => CODING_SYSTEM_PROMPT.replace("{project}", project),
    }
}

/// Instruction payload for the provider: a system prompt plus ordered turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub turns: Vec<ChatMessage>,
}

impl Prompt {
    /// System message followed by the turns, in send order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(ChatMessage::system(&self.system));
        messages.extend(self.turns.iter().cloned());
        messages
    }

    /// Wrap into a provider request with fixed generation parameters.
    ///
    /// The model is left to the provider's configured default.
    pub fn into_request(self, max_tokens: u32, temperature: f32) -> ChatRequest {
        ChatRequest {
            messages: self.messages(),
            model: None,
            max_tokens,
            temperature,
        }
    }
}

/// Result of composing one message against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    /// Mode the session should be in once the exchange is committed.
    pub mode: Mode,
    pub prompt: Prompt,
}

impl Composition {
    /// Whether committing this composition changes the session's mode.
    pub fn changes_mode(&self, session: &Session) -> bool {
        self.mode.is_coding() != session.is_coding_mode()
    }
}

/// Builds prompts from session state.
#[derive(Debug, Clone)]
pub struct Composer {
    history_window: usize,
}

impl Composer {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Classify `message`, pick the next mode and build the prompt.
    ///
    /// The outbound turns are the last `history_window` history entries
    /// followed by `message` itself, which is not in the history yet.
    pub fn compose(&self, session: &Session, message: &str) -> Composition {
        let mode = next_mode(session.mode(), message);

        let mut turns: Vec<ChatMessage> = session.recent(self.history_window).to_vec();
        turns.push(ChatMessage::user(message));

        Composition {
            prompt: Prompt {
                system: system_prompt(&mode),
                turns,
            },
            mode,
        }
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(6)
    }
}

pub const CHAT_SYSTEM_PROMPT: &str =
    "You are Rahl AI, a helpful coding assistant. Respond conversationally.";

pub const CODING_SYSTEM_PROMPT: &str = r#"You are Rahl AI, a full-stack coding assistant. The user wants to build: "{project}".

Respond ONLY with valid JSON in exactly this format:
{
  "message": "Your conversational response",
  "code": "Generated code if applicable",
  "files": {"filename.js": "file content"},
  "shouldUpdate": true,
  "isCodingMode": true
}

Rules:
1. "message" stays conversational and helpful
2. "code" holds complete, runnable code
3. "files" maps each generated filename to its full content
4. "shouldUpdate" is true only when you are providing new or changed code
5. Support multiple languages (HTML, CSS, JS, Python, Node.js, SQL, etc.)
6. For full-stack projects, create frontend, backend, and database files
7. When the user describes changes, update the existing code accordingly
8. Always return valid JSON, with no text outside the object"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn test_trigger_words() {
        assert!(is_coding_trigger("Create a todo app"));
        assert!(is_coding_trigger("can you BUILD me something"));
        assert!(is_coding_trigger("please write code for me"));
        assert!(is_coding_trigger("let's recreate the landing page"));
        assert!(!is_coding_trigger("hello there"));
        assert!(!is_coding_trigger("what's the weather like?"));
    }

    #[test]
    fn test_enter_coding_mode_records_project_verbatim() {
        let mode = next_mode(&Mode::Chat, "Create a Todo App");
        assert_eq!(
            mode,
            Mode::Coding {
                project: "Create a Todo App".to_string()
            }
        );
    }

    #[test]
    fn test_second_trigger_keeps_project() {
        let coding = Mode::Coding {
            project: "create a todo app".to_string(),
        };
        assert_eq!(next_mode(&coding, "make it blue"), coding);
    }

    #[test]
    fn test_exit_phrase_only_applies_while_coding() {
        let coding = Mode::Coding {
            project: "build a blog".to_string(),
        };
        assert_eq!(next_mode(&coding, "ok, back to chat please"), Mode::Chat);
        assert_eq!(next_mode(&coding, "Exit Coding and make tea"), Mode::Chat);
        assert_eq!(next_mode(&Mode::Chat, "back to chat"), Mode::Chat);
        assert!(next_mode(&Mode::Chat, "exit coding after you build it").is_coding());
    }

    #[test]
    fn test_system_prompt_by_mode() {
        assert_eq!(system_prompt(&Mode::Chat), CHAT_SYSTEM_PROMPT);

        let prompt = system_prompt(&Mode::Coding {
            project: "build a \"weather\" widget".to_string(),
        });
        assert!(prompt.contains(r#"The user wants to build: "build a "weather" widget"."#));
        assert!(prompt.contains("\"shouldUpdate\""));
        assert!(prompt.contains("\"files\""));
    }

    #[test]
    fn test_compose_window_and_trailing_message() {
        let mut session = Session::new("s1");
        for i in 0..5 {
            session.append_turn(Role::User, &format!("u{}", i));
            session.append_turn(Role::Assistant, &format!("a{}", i));
        }

        let composer = Composer::new(4);
        let composition = composer.compose(&session, "next question");
        let turns = &composition.prompt.turns;

        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0], ChatMessage::user("u3"));
        assert_eq!(turns[3], ChatMessage::assistant("a4"));
        assert_eq!(turns[4], ChatMessage::user("next question"));

        let messages = composition.prompt.messages();
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(composition.mode, Mode::Chat);
    }

    #[test]
    fn test_compose_does_not_touch_session() {
        let session = Session::new("s1");
        let before = session.clone();
        let composition = Composer::default().compose(&session, "generate a game");

        assert_eq!(session, before);
        assert!(composition.changes_mode(&session));
        assert!(composition.prompt.system.contains("generate a game"));
    }
}
