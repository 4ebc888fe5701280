use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

pub const REFERENCE_LENGTH: usize = 6;

/// Source of candidate booking references. Uniqueness is checked by the
/// caller against the booking store.
pub trait ReferenceGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Six random uppercase alphanumerics, e.g. `K7Q2ZD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomReferenceGenerator;

impl ReferenceGenerator for RandomReferenceGenerator {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(REFERENCE_LENGTH)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect()
    }
}

/// Issues ticket numbers; each call returns a number not returned before by
/// the same sequence.
pub trait TicketNumberSequence: Send + Sync {
    fn next_ticket_number(&self) -> String;
}

pub struct AtomicTicketSequence {
    prefix: String,
    counter: AtomicU64,
}

impl AtomicTicketSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 1)
    }

    pub fn starting_at(prefix: impl Into<String>, first: u64) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(first),
        }
    }
}

impl TicketNumberSequence for AtomicTicketSequence {
    fn next_ticket_number(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{:010}", self.prefix, n)
    }
}
