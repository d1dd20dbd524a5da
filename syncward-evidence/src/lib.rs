//! # syncward-evidence
//!
//! Evidence emission for synchronization runs: atomic LF-normalised writes,
//! the marker-line micro-protocol, the per-run evidence directory and the
//! `LATEST` pointer.
//!
//! Every run owns one [`EvidenceWriter`]; the orchestrator feeds it command
//! captures and marker lines while the run progresses and calls
//! [`EvidenceWriter::finalize`] exactly once on every exit path.

pub mod bundle;
pub mod capture;
pub mod diff;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod marker;
pub mod writer;

pub use bundle::{EvidenceWriter, FinalBundle, FinalizeReport, RunRecord};
pub use capture::CommandCapture;
pub use diff::status_diff;
pub use error::EvidenceError;
pub use layout::EvidenceLayout;
pub use manifest::Manifest;
pub use marker::{Marker, MarkerEvent, ParsedMarker, MARKER_PREFIX};
