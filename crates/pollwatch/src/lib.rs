//! pollwatch - wait for a remote result to be published
//!
//! This library turns a captured `curl` invocation into a reusable request
//! shape, then drives a pluggable probe on a schedule until the result shows
//! up, notifying an operator on success and periodically while it keeps failing.

pub mod descriptor;
pub mod engine;
pub mod error;
pub mod notifier;
pub mod parser;
pub mod policy;
pub mod probe;

// Re-export main types
pub use descriptor::RequestDescriptor;
pub use engine::{CancelHandle, EngineEvent, EnginePhase, PollEngine, RunSummary, StopReason};
pub use error::{NotifyError, ParseError, PolicyError, ProbeBuildError};
pub use notifier::{Notifier, SmtpNotifier, SmtpSettings};
pub use parser::parse_command;
pub use policy::PollPolicy;
pub use probe::{AttemptOutcome, HttpProbe, Probe, ProbeSettings, SuccessMarker};

/// Timeout applied to a single probe attempt when none is configured
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 15;
