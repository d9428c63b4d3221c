//! Randomized TCP connection churn.
//!
//! A pool of workers each run a random number of short client sessions
//! against one target: connect, maybe send a burst of lines, drain whatever
//! the server returns, then close or abandon the connection. Shared
//! [`Counters`] collect the traffic and a [`Reporter`] prints them.

pub mod config;
pub mod counters;
pub mod error;
pub mod reporter;
pub mod session;
pub mod stats;
pub mod worker;

pub use config::{Bounds, Config, Pacing, ReportFormat};
pub use counters::{CounterSnapshot, Counters};
pub use error::{ConfigError, DrainEnd, SessionError};
pub use reporter::Reporter;
pub use session::{Session, SessionOutcome, SessionState};
pub use stats::{SessionStats, TallySnapshot};
pub use worker::{Orchestrator, Worker, WorkerReport};
