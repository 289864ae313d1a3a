//! The authentication-and-confirmation workflow.
//!
//! Components are layered the way a run executes: [`Authenticator`]
//! produces an authenticated page, [`ReservationHarvester`] enumerates
//! trips on it, [`ConfirmationWorkflow`] confirms each one, and
//! [`AccountOrchestrator`] drives the whole sequence per account with
//! failure isolation between accounts.

pub mod authenticator;
pub mod harvester;
pub mod notify;
pub mod orchestrator;
pub mod workflow;

pub(crate) mod page_support;

#[cfg(test)]
pub(crate) mod test_support;

pub use authenticator::Authenticator;
pub use harvester::ReservationHarvester;
pub use notify::LogSink;
pub use orchestrator::{AccountOrchestrator, RunState};
pub use workflow::ConfirmationWorkflow;
