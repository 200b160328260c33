//! Observability helpers shared by the issuer, validator, and gate.
//!
//! # Feature Flags
//!
//! - Spans named `page_gate.op` carry the `op` (issue/validate/serve) and `stage` (call site) fields
//!   and are always emitted through `tracing`.
//! - Enable `metrics` to increment the `page_gate_op_total` counter for every
//!   attempt/success/rejection/failure, labeled by `op` + `outcome`, plus
//!   `page_gate_validation_total` by classification and
//!   `page_gate_rotation_cleanup_failures_total`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Token issuance, including rotation cleanup.
	Issue,
	/// Token classification against the store.
	Validate,
	/// Page delivery through the gate.
	Serve,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Issue => "issue",
			OpKind::Validate => "validate",
			OpKind::Serve => "serve",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// The caller was turned away (shape, authorization, or range).
	Rejected,
	/// The system itself failed (store, page source, unknown fault).
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Rejected => "rejected",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
