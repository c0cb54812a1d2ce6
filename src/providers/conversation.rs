use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::models::message::Message;
use crate::models::role::Role;

type History = Arc<Mutex<Vec<Message>>>;

/// Bounded, per-id message histories held in process memory.
///
/// Each conversation has its own lock, so appends to one id are
/// serialized while different ids never contend.
#[derive(Debug)]
pub struct ConversationStore {
    cap: usize,
    conversations: RwLock<HashMap<String, History>>,
}

impl ConversationStore {
    /// The cap is never below two, so the latest exchange always fits.
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(2),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    fn entry(&self, id: &str) -> History {
        if let Some(history) = self
            .conversations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return history.clone();
        }
        self.conversations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// A copy of the history. Unknown ids yield an empty history.
    pub fn history(&self, id: &str) -> Vec<Message> {
        let history = self
            .conversations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned();
        match history {
            Some(history) => history.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            None => Vec::new(),
        }
    }

    pub fn append(&self, id: &str, message: Message) {
        self.append_all(id, vec![message]);
    }

    /// Append several messages as one unit, then truncate.
    pub fn append_all(&self, id: &str, messages: Vec<Message>) {
        let history = self.entry(id);
        let mut history = history.lock().unwrap_or_else(|e| e.into_inner());
        history.extend(messages);
        truncate(&mut history, self.cap);
    }

    /// Returns whether the conversation existed.
    pub fn clear(&self, id: &str) -> bool {
        self.conversations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .conversations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// Evict from the front until the history fits the cap.
///
/// Non-system messages go first, except the two most recent ones. System
/// messages are only evicted once nothing else can be. The retained history
/// then starts on a user turn, so no tool result or assistant reply is left
/// without the message it answers.
fn truncate(history: &mut Vec<Message>, cap: usize) {
    while history.len() > cap {
        let non_system = history.iter().filter(|m| m.role != Role::System).count();
        let victim = if non_system > 2 {
            history.iter().position(|m| m.role != Role::System)
        } else {
            history.iter().position(|m| m.role == Role::System)
        };
        match victim {
            Some(index) => {
                history.remove(index);
            }
            None => break,
        }
    }

    loop {
        let non_system = history.iter().filter(|m| m.role != Role::System).count();
        if non_system <= 2 {
            break;
        }
        match history.iter().position(|m| m.role != Role::System) {
            Some(index) if history[index].role != Role::User => {
                history.remove(index);
            }
            _ => break,
        }
    }
}
