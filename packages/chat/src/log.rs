use crate::models::Message;

/// Append-only history of accepted messages.
///
/// Insertion order is acceptance order. Entries are never mutated, removed,
/// or reordered once appended. The log assigns message IDs from a monotonic
/// counter, so IDs are unique for the lifetime of the process.
///
/// The log itself is not synchronized; the hub owns the only instance and
/// serializes access through its command queue.
#[derive(Debug)]
pub struct MessageLog {
    entries: Vec<Message>,
    next_id: u64,
}

impl MessageLog {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Assign the next ID, append the message, and return the accepted form.
    pub fn append(&mut self, username: String, message: String) -> Message {
        let message = Message {
            id: self.next_id.to_string(),
            username,
            message,
        };
        self.next_id += 1;

        self.entries.push(message.clone());

        message
    }

    /// Copy the full history out, in acceptance order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn starts_empty() {
        let log = MessageLog::new();

        assert!(log.is_empty());
        assert_eq!(log.snapshot(), vec![]);
    }

    #[test]
    fn append_returns_the_accepted_message() {
        let mut log = MessageLog::new();

        let accepted = log.append("x".into(), "hi".into());

        assert_eq!(
            accepted,
            Message {
                id: "1".into(),
                username: "x".into(),
                message: "hi".into(),
            }
        );
    }

    #[test]
    fn snapshot_returns_every_append_in_order() {
        let mut log = MessageLog::new();

        let mut accepted = Vec::new();
        for i in 0..100 {
            accepted.push(log.append(format!("user-{}", i % 3), format!("message {i}")));
        }

        assert_eq!(log.len(), 100);
        assert_eq!(log.snapshot(), accepted);
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut log = MessageLog::new();

        let ids: Vec<String> = (0..1000)
            .map(|_| log.append("x".into(), "hi".into()).id)
            .collect();

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(*id, (i as u64 + 1).to_string());
        }
    }

    #[test]
    fn empty_messages_and_usernames_are_accepted() {
        let mut log = MessageLog::new();

        let accepted = log.append(String::new(), String::new());

        assert_eq!(accepted.username, "");
        assert_eq!(accepted.message, "");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut log = MessageLog::new();
        log.append("x".into(), "hi".into());

        let mut snapshot = log.snapshot();
        snapshot.clear();

        assert_eq!(log.len(), 1);
    }
}
