// Deferred create/remove requests, applied at the start of the next tick

use std::collections::VecDeque;
use std::fmt;

use crate::instance::EvictionPolicy;
use crate::types::{DeletionMode, Identifier, InstanceKey, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Queued,
    Draining,
}

/// A constructed instance waiting to join the live set.
#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub identifier: Identifier,
    pub instance: InstanceKey,
    pub enqueued_at: Tick,
}

pub struct RemovalTicket {
    pub identifier: Identifier,
    pub mode: DeletionMode,
    pub eviction: Box<dyn EvictionPolicy>,
    pub enqueued_at: Tick,
}

impl fmt::Debug for RemovalTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemovalTicket")
            .field("identifier", &self.identifier)
            .field("mode", &self.mode)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Tickets taken out of the queue by one drain. Creates are applied first.
#[derive(Debug, Default)]
pub struct Drained {
    pub creates: Vec<CreateTicket>,
    pub removals: Vec<RemovalTicket>,
}

#[derive(Debug, Default)]
pub struct TicketQueue {
    creates: VecDeque<CreateTicket>,
    removals: VecDeque<RemovalTicket>,
    draining: bool,
}

impl TicketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> QueueState {
        if self.draining {
            QueueState::Draining
        } else if self.is_empty() {
            QueueState::Idle
        } else {
            QueueState::Queued
        }
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueue_create(&mut self, ticket: CreateTicket) {
        tracing::debug!(target: "tickets", kind = "create", identifier = %ticket.identifier, tick = ticket.enqueued_at);
        self.creates.push_back(ticket);
    }

    pub fn enqueue_removal(&mut self, ticket: RemovalTicket) {
        tracing::debug!(target: "tickets", kind = ticket.mode.as_str(), identifier = %ticket.identifier, tick = ticket.enqueued_at);
        self.removals.push_back(ticket);
    }

    pub fn is_pending_creation(&self, identifier: &Identifier) -> bool {
        self.creates.iter().any(|t| &t.identifier == identifier)
    }

    pub fn is_pending_removal(&self, identifier: &Identifier) -> bool {
        self.removals.iter().any(|t| &t.identifier == identifier)
    }

    /// Take every queued ticket. Tickets enqueued before `finish_drain` wait
    /// for the next drain.
    pub fn begin_drain(&mut self) -> Drained {
        self.draining = true;
        let drained = Drained {
            creates: self.creates.drain(..).collect(),
            removals: self.removals.drain(..).collect(),
        };
        if !drained.creates.is_empty() || !drained.removals.is_empty() {
            tracing::info!(
                target: "tickets",
                creates = drained.creates.len() as u64,
                removals = drained.removals.len() as u64,
                "draining tickets"
            );
        }
        drained
    }

    pub fn finish_drain(&mut self) {
        self.draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::DefaultEviction;
    use slotmap::SlotMap;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn removal(name: &str) -> RemovalTicket {
        RemovalTicket {
            identifier: id(name),
            mode: DeletionMode::Delete,
            eviction: Box::new(DefaultEviction),
            enqueued_at: 1,
        }
    }

    #[test]
    fn state_machine_moves_through_drain() {
        let mut keys: SlotMap<InstanceKey, ()> = SlotMap::with_key();
        let mut queue = TicketQueue::new();
        assert_eq!(queue.state(), QueueState::Idle);

        queue.enqueue_create(CreateTicket {
            identifier: id("a"),
            instance: keys.insert(()),
            enqueued_at: 1,
        });
        queue.enqueue_removal(removal("b"));
        assert_eq!(queue.state(), QueueState::Queued);
        assert!(queue.is_pending_creation(&id("a")));
        assert!(queue.is_pending_removal(&id("b")));

        let drained = queue.begin_drain();
        assert_eq!(queue.state(), QueueState::Draining);
        assert_eq!(drained.creates.len(), 1);
        assert_eq!(drained.removals.len(), 1);
        assert!(!queue.is_pending_creation(&id("a")));

        queue.enqueue_removal(removal("late"));
        queue.finish_drain();
        assert_eq!(queue.state(), QueueState::Queued);

        let next = queue.begin_drain();
        queue.finish_drain();
        assert_eq!(next.removals[0].identifier, id("late"));
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[test]
    fn removals_keep_fifo_order() {
        let mut queue = TicketQueue::new();
        for name in ["one", "two", "three"] {
            queue.enqueue_removal(removal(name));
        }
        let drained = queue.begin_drain();
        let order: Vec<&str> = drained.removals.iter().map(|t| t.identifier.path()).collect();
        assert_eq!(order, vec!["one", "two", "three"]);
    }
}
