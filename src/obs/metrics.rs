// self
use crate::obs::{FlowOutcome, FlowStage};

/// Records a token request outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("cpf_broker_provision_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Counts a state transition via the global metrics recorder (when enabled).
pub fn record_stage(stage: FlowStage) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("cpf_broker_stage_total", "stage" => stage.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = stage;
	}
}
