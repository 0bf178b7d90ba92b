//! Broker-level error types shared across validation, provisioning, and providers.

// self
use crate::{_prelude::*, idp::DirectoryDescriptorError, service::OutcomeCategory};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Raw request input is missing or unparseable.
	#[error(transparent)]
	Input(#[from] InputError),
	/// Identifier failed the format or checksum validation.
	#[error(transparent)]
	Validation(#[from] crate::cpf::ValidationError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Identity provider has no user with the requested username.
	#[error("Identity provider has no user named `{username}`.")]
	UserNotFound {
		/// Username that was looked up.
		username: String,
	},
	/// Client authentication against the token endpoint failed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Identity provider refused to create the user for a reason other than a duplicate.
	#[error("Identity provider refused to create the user: {reason}.")]
	ProvisioningRejected {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Derived credential was rejected after the full provisioning flow.
	#[error("Authentication failed after provisioning: {reason}.")]
	AuthenticationFailure {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns the response category this error is reported under.
	pub fn category(&self) -> OutcomeCategory {
		match self {
			Self::Input(_) => OutcomeCategory::BadInput,
			Self::Validation(_) => OutcomeCategory::InvalidIdentifier,
			Self::Config(_) => OutcomeCategory::InternalError,
			Self::Transient(_)
			| Self::Transport(_)
			| Self::UserNotFound { .. }
			| Self::InvalidClient { .. }
			| Self::ProvisioningRejected { .. }
			| Self::AuthenticationFailure { .. } => OutcomeCategory::ProviderFailure,
		}
	}

	/// Returns `true` when the provider could not be reached or answered abnormally.
	pub fn is_provider_unavailable(&self) -> bool {
		matches!(
			self,
			Self::Transient(_) | Self::Transport(_) | Self::UserNotFound { .. } | Self::InvalidClient { .. }
		)
	}
}

/// Request-level input problems raised before validation runs.
#[derive(Debug, ThisError)]
pub enum InputError {
	/// No identifier was supplied in the body, query string, or direct field.
	#[error("CPF not provided; supply it in the body or query parameters.")]
	MissingIdentifier,
	/// Request used a method the service does not serve.
	#[error("Method `{method}` is not allowed; use GET or POST.")]
	UnsupportedMethod {
		/// Method supplied by the caller.
		method: String,
	},
	/// Request body could not be parsed as JSON.
	#[error("Invalid JSON body: {source}.")]
	InvalidBody {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Request envelope could not be parsed.
	#[error("Invalid request envelope: {source}.")]
	InvalidEnvelope {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Configuration and validation failures raised while wiring the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[cfg(feature = "reqwest")]
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Required environment variable is not set.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// Environment variable holds an unusable value.
	#[error("Environment variable `{name}` is invalid: {reason}.")]
	InvalidEnv {
		/// Variable name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// Directory descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] DirectoryDescriptorError),
	/// Outbound payload could not be serialized.
	#[error("Request payload could not be serialized.")]
	Serialize(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants reported by the identity provider.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Directory endpoint answered with an unexpected status.
	#[error("Directory endpoint returned an unexpected response: {message}.")]
	Directory {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Directory endpoint responded with JSON that could not be parsed.
	#[error("Directory endpoint returned malformed JSON.")]
	DirectoryResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::cpf::Cpf;

	#[test]
	fn categories_follow_error_kind() {
		let validation = Cpf::parse("123").expect_err("Short identifiers must be rejected.");

		assert_eq!(Error::from(validation).category(), OutcomeCategory::InvalidIdentifier);
		assert_eq!(Error::from(InputError::MissingIdentifier).category(), OutcomeCategory::BadInput);
		assert_eq!(
			Error::from(ConfigError::MissingEnv { name: "CPF_BROKER_CLIENT_ID" }).category(),
			OutcomeCategory::InternalError,
		);
		assert_eq!(
			Error::AuthenticationFailure { reason: "rejected".into() }.category(),
			OutcomeCategory::ProviderFailure,
		);
	}

	#[test]
	fn provider_unavailable_excludes_business_rejections() {
		let transient = Error::from(TransientError::Directory {
			message: "upstream down".into(),
			status: Some(503),
			retry_after: None,
		});

		assert!(transient.is_provider_unavailable());
		assert!(!Error::ProvisioningRejected { reason: "policy".into() }.is_provider_unavailable());
		assert!(!Error::AuthenticationFailure { reason: "bad".into() }.is_provider_unavailable());
	}

	#[test]
	fn transport_error_keeps_source() {
		let io = std::io::Error::other("socket closed");
		let err = Error::from(TransportError::network(io));

		assert!(StdError::source(&err).is_some());
		assert!(err.to_string().contains("identity provider"));
	}
}
