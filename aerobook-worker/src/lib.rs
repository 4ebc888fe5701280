pub mod worker;

pub use worker::{build_manager, build_notifier, build_sweeper, ticket_sequence};
