// self
use crate::obs::{OpKind, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"page_gate_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records one validator classification, labeled by its stable name.
pub fn record_validation(label: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("page_gate_validation_total", "outcome" => label).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = label;
	}
}

/// Counts rotations whose old-token cleanup failed.
pub fn record_rotation_cleanup_failure() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("page_gate_rotation_cleanup_failures_total").increment(1);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_are_noops_without_metrics() {
		record_op_outcome(OpKind::Serve, OpOutcome::Failure);
		record_validation("backend_error");
		record_rotation_cleanup_failure();
	}
}
