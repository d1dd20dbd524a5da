//! # syncward-engine
//!
//! The synchronization state machine. [`Engine::run`] takes a
//! [`RunSettings`](syncward_core::RunSettings), drives every phase against
//! the repository through the system git executable, and always returns a
//! [`RunOutcome`] whose summary has already been persisted as evidence.
//!
//! ```no_run
//! use syncward_engine::{Engine, NativeLiveness};
//! # fn settings() -> syncward_core::RunSettings { unimplemented!() }
//! let liveness = NativeLiveness;
//! let outcome = Engine::new(&liveness).echo_stdout(true).run(settings());
//! std::process::exit(outcome.exit_code());
//! ```

pub mod consistency;
pub mod error;
pub mod halt;
pub mod liveness;
pub mod lock;
pub mod orchestrator;
pub mod postcheck;
pub mod precheck;
pub mod process;
pub mod session;
pub mod stash;
pub mod status;
pub mod sync;

pub use error::EngineError;
pub use halt::{Failure, Halt, Step};
pub use liveness::{hostname, AssumeLiveness, NativeLiveness, ProcessLiveness};
pub use lock::{LockError, LockGuard, LockState, LockStatus, ReleaseOutcome};
pub use orchestrator::{Engine, RunOutcome};
pub use precheck::PrecheckReport;
