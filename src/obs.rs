//! Optional observability helpers for the provisioning flow.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to run every token request inside a `cpf_broker.provision` span carrying the
//!   masked `identifier`, and to emit one event per state transition with a `stage` field.
//! - Enable `metrics` to increment `cpf_broker_provision_total` (labeled by `outcome`) for every
//!   attempt/success/failure and `cpf_broker_stage_total` (labeled by `stage`) per transition.
//!
//! Without either feature every helper compiles to a no-op, so the flow never depends on a
//! subscriber or recorder being installed.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// States of the provisioning flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowStage {
	/// Looking the username up.
	CheckExists,
	/// Authenticating a user that already existed.
	ExistsAuthenticate,
	/// Existing user could not be authenticated; creating it instead.
	NotExistsCreate,
	/// Creating the user.
	CreateUser,
	/// Promoting the temporary password.
	SetPermanent,
	/// Waiting for the provider to converge after creation.
	WaitPropagation,
	/// Single authentication attempt after provisioning.
	RetryAuthenticate,
	/// Token obtained.
	Success,
	/// Flow gave up.
	Fail,
}
impl FlowStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowStage::CheckExists => "check_exists",
			FlowStage::ExistsAuthenticate => "exists_authenticate",
			FlowStage::NotExistsCreate => "not_exists_create",
			FlowStage::CreateUser => "create_user",
			FlowStage::SetPermanent => "set_permanent",
			FlowStage::WaitPropagation => "wait_propagation",
			FlowStage::RetryAuthenticate => "retry_authenticate",
			FlowStage::Success => "success",
			FlowStage::Fail => "fail",
		}
	}
}
impl Display for FlowStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each token request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to the flow.
	Attempt,
	/// Token obtained.
	Success,
	/// Failure returned to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records a state transition on every enabled backend.
pub fn transition(stage: FlowStage) {
	trace_transition(stage);
	record_stage(stage);
}
