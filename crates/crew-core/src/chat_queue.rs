//! FIFO of chat messages waiting for the agent session.

use std::collections::VecDeque;

/// Pending chat messages plus a flag recording whether a drain loop is
/// currently working through them. Exactly one consumer drains the queue.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChatQueue {
    pending: VecDeque<String>,
    processing: bool,
}

impl ChatQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message`. Returns `true` when a message was already pending
    /// or being processed, meaning the caller must not start another consumer.
    pub fn enqueue(&mut self, message: impl Into<String>) -> bool {
        let busy = self.processing || !self.pending.is_empty();
        self.pending.push_back(message.into());
        busy
    }

    pub fn next_message(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn set_processing(&mut self, processing: bool) {
        self.processing = processing;
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let mut queue = ChatQueue::new();
        assert!(!queue.enqueue("a"));
        assert!(queue.enqueue("b"));

        assert_eq!(queue.next_message().as_deref(), Some("a"));
        assert_eq!(queue.next_message().as_deref(), Some("b"));
        assert_eq!(queue.next_message(), None);
    }

    #[test]
    fn processing_flag_marks_queue_busy() {
        let mut queue = ChatQueue::new();
        queue.set_processing(true);
        assert!(queue.is_processing());
        assert!(queue.enqueue("while busy"));

        queue.next_message();
        queue.set_processing(false);
        assert!(!queue.enqueue("idle again"));
        assert_eq!(queue.len(), 1);
    }
}
