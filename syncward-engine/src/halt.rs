//! Early-exit values for the phase pipeline.
//!
//! Every phase returns `Result<Step<T>, Halt>`. `Halt::Fail` is a fail-closed
//! decision with a reason code; `Halt::Fault` is an unexpected error. Both
//! unwind to the orchestrator's single summary dispatch.

use syncward_core::{PhaseStatus, ReasonCode};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: ReasonCode,
    pub detail: Option<String>,
    /// Relative evidence path or operator instruction; defaults to the
    /// reason's operator hint when absent.
    pub next_action: Option<String>,
}

#[derive(Debug)]
pub enum Halt {
    Fail(Failure),
    Fault(EngineError),
}

impl Halt {
    pub fn fail(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Halt::Fail(Failure {
            reason,
            detail: Some(detail.into()),
            next_action: None,
        })
    }

    /// Attach a next-action pointer to a `Fail`; faults are returned unchanged.
    pub fn next_action(self, action: impl Into<String>) -> Self {
        match self {
            Halt::Fail(mut failure) => {
                failure.next_action = Some(action.into());
                Halt::Fail(failure)
            }
            fault => fault,
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            Halt::Fail(failure) => failure.reason,
            Halt::Fault(_) => ReasonCode::Exception,
        }
    }
}

impl From<EngineError> for Halt {
    fn from(err: EngineError) -> Self {
        Halt::Fault(err)
    }
}

/// Settled outcome of a phase that did not halt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<T> {
    pub value: T,
    pub status: PhaseStatus,
    pub reason: ReasonCode,
    pub detail: Option<String>,
}

impl<T> Step<T> {
    pub fn ok(value: T, reason: ReasonCode) -> Self {
        Self {
            value,
            status: PhaseStatus::Ok,
            reason,
            detail: None,
        }
    }

    pub fn skip(value: T, reason: ReasonCode) -> Self {
        Self {
            value,
            status: PhaseStatus::Skip,
            reason,
            detail: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
