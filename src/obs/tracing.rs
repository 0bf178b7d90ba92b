// self
use crate::{_prelude::*, obs::FlowStage};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapping a single token request.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span keyed by the (already masked) identifier.
	pub fn new(identifier: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"cpf_broker.provision",
				identifier,
				stage = tracing::field::Empty
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = identifier;

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Records `stage` on the current flow span and emits a debug event for it.
pub fn trace_transition(stage: FlowStage) {
	#[cfg(feature = "tracing")]
	{
		tracing::Span::current().record("stage", stage.as_str());
		tracing::debug!(stage = stage.as_str(), "provisioning stage entered");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = stage;
	}
}

/// Emits a warning for a failure the flow absorbed and moved past.
pub fn trace_recovered(stage: FlowStage, detail: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(stage = stage.as_str(), %detail, "provisioning continued past a failure");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, detail);
	}
}

/// Emits a warning for the failure returned to the caller.
pub fn trace_failure(stage: FlowStage, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(stage = stage.as_str(), error = %error, "provisioning failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, error);
	}
}
