//! Syncward core library: run domain types, reason codes, policy config, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and the persisted run records
//! - [`reason`]: [`ReasonCode`], the stable failure/success vocabulary
//! - [`context`]: [`RunContext`], threaded through every phase of a run
//! - [`config`]: layered YAML policy loading
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod context;
pub mod error;
pub mod reason;
pub mod types;

pub use config::{ConfigFile, ConsistencyCheck, ResolvedConfig};
pub use context::{RunContext, RunSettings};
pub use error::CoreError;
pub use reason::ReasonCode;
pub use types::{
    BlockingOp, DecisionEntry, DecisionTrace, LockRecord, Mode, Phase, PhaseRecord, PhaseStatus,
    Policy, ResolvedInputs, RunId, RunStatus, StashEntry, SummaryRecord, TreeClass, UpstreamRef,
};
