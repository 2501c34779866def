//! Subscriber sessions and the orchestrator that drives them
//!
//! - Per-session connect, delivery and once-only completion
//! - Completion barrier shared by all sessions of a run
//! - Live session pool used by the shutdown path
//! - Client manager creating the sessions and awaiting the barrier

pub mod barrier;
pub mod manager;
pub mod pool;
pub mod session;

pub use barrier::CompletionBarrier;
pub use manager::ClientManager;
pub use pool::SessionPool;
pub use session::{
    CloseReason, CompletionCallback, Session, SessionCompletion, SessionHandle, SessionOutcome,
    SessionSettings,
};
