//! Command queue for the supplicant control socket.
//!
//! The socket carries both replies and unsolicited events on one stream, and
//! the protocol allows a single outstanding request. The queue serializes
//! requests and demultiplexes incoming traffic: events pass straight through
//! to the unsolicited path, everything else answers the request in flight.
//!
//! There is no per-request timeout. A supplicant that stops answering is
//! detected through process supervision, which tears the session down.

use std::collections::VecDeque;

use miracast_core::message::{Message, MessageKind};

/// Invoked with the reply to a previously enqueued request.
pub type ReplyHandler = Box<dyn FnOnce(&Message) + Send>;

struct Pending {
    message: Message,
    handler: ReplyHandler,
}

/// What [`CommandQueue::handle_incoming`] made of a message.
pub enum Incoming {
    /// An unsolicited event; the queue did not advance.
    Unsolicited(Message),
    /// The in-flight request was answered. `next` is the wire text of the
    /// follow-up request to transmit, if one was waiting.
    Handled { next: Option<String> },
    /// A reply arrived with nothing in flight.
    Stray(Message),
}

#[derive(Default)]
pub struct CommandQueue {
    in_flight: Option<Pending>,
    waiting: VecDeque<Pending>,
}

impl CommandQueue {
    pub fn new() -> CommandQueue {
        CommandQueue::default()
    }

    /// Append a request. Returns the wire text to transmit immediately when
    /// nothing was in flight; otherwise the entry waits its FIFO turn.
    pub fn enqueue(&mut self, message: Message, handler: ReplyHandler) -> Option<String> {
        let entry = Pending { message, handler };
        if self.in_flight.is_none() {
            let raw = entry.message.as_raw().to_string();
            self.in_flight = Some(entry);
            Some(raw)
        } else {
            self.waiting.push_back(entry);
            None
        }
    }

    /// Feed one incoming message. The reply handler runs before the next
    /// request's wire text is handed back, so handlers observe the queue
    /// strictly in request order.
    pub fn handle_incoming(&mut self, message: Message) -> Incoming {
        if message.kind() == MessageKind::Event {
            return Incoming::Unsolicited(message);
        }

        match self.in_flight.take() {
            Some(entry) => {
                (entry.handler)(&message);
                let next = match self.waiting.pop_front() {
                    Some(entry) => {
                        let raw = entry.message.as_raw().to_string();
                        self.in_flight = Some(entry);
                        Some(raw)
                    }
                    None => None,
                };
                Incoming::Handled { next }
            }
            None => Incoming::Stray(message),
        }
    }

    /// Drop the in-flight entry and everything waiting. Used when the
    /// session dies; pending handlers are never invoked.
    pub fn clear(&mut self) {
        self.in_flight = None;
        self.waiting.clear();
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}
