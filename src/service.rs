//! Request surface that turns a gateway-style envelope into a status-coded JSON response.
//!
//! The identifier is read from, in order of precedence, the request body (a JSON object or a
//! JSON-encoded string carrying `cpf`), a top-level `cpf` field, or `queryStringParameters.cpf`.
//! The service validates it, runs the provisioning flow, and renders either outcome into a
//! [`ServiceResponse`].

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::GrantedToken,
	cpf::{Cpf, ValidationError},
	error::{ConfigError, InputError},
	flows::Provisioner,
	idp::IdentityProvider,
};
#[cfg(feature = "reqwest")]
use crate::{config::BrokerConfig, idp::HttpIdentityProvider};

/// Message returned with every successful response.
pub const SUCCESS_MESSAGE: &str = "CPF validated and authenticated.";

const CONTENT_TYPE: (&str, &str) = ("Content-Type", "application/json");
const ALLOW_ANY_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");

/// Coarse classification of a request outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeCategory {
	/// Token issued.
	Success,
	/// Missing or malformed request input.
	BadInput,
	/// Identifier failed validation.
	InvalidIdentifier,
	/// Identity provider failed or refused the flow.
	ProviderFailure,
	/// Local misconfiguration.
	InternalError,
}
impl OutcomeCategory {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OutcomeCategory::Success => "success",
			OutcomeCategory::BadInput => "badInput",
			OutcomeCategory::InvalidIdentifier => "invalidIdentifier",
			OutcomeCategory::ProviderFailure => "providerFailure",
			OutcomeCategory::InternalError => "internalError",
		}
	}

	/// HTTP status code responses in this category are reported with.
	pub const fn status_code(self) -> u16 {
		match self {
			OutcomeCategory::Success => 200,
			OutcomeCategory::BadInput | OutcomeCategory::InvalidIdentifier => 400,
			OutcomeCategory::ProviderFailure | OutcomeCategory::InternalError => 500,
		}
	}
}
impl Display for OutcomeCategory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Gateway-style request envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
	/// HTTP method; absent for direct invocations.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_method: Option<String>,
	/// JSON object or JSON-encoded string.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<Value>,
	/// Identifier passed directly on the envelope.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cpf: Option<String>,
	/// Query string parameters.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub query_string_parameters: Option<BTreeMap<String, String>>,
}
impl RequestEnvelope {
	/// Envelope carrying `{"cpf": raw}` as a POST body.
	pub fn with_body_identifier(raw: impl Into<String>) -> Self {
		Self {
			http_method: Some("POST".into()),
			body: Some(serde_json::json!({ "cpf": raw.into() })),
			..Default::default()
		}
	}

	/// Envelope carrying `raw` in `queryStringParameters.cpf` of a GET request.
	pub fn with_query_identifier(raw: impl Into<String>) -> Self {
		Self {
			http_method: Some("GET".into()),
			query_string_parameters: Some(BTreeMap::from([("cpf".to_owned(), raw.into())])),
			..Default::default()
		}
	}

	/// Extracts the raw identifier without validating it.
	pub fn raw_identifier(&self) -> Result<String, InputError> {
		if let Some(method) = self.http_method.as_deref().filter(|method| {
			!method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("POST")
		}) {
			return Err(InputError::UnsupportedMethod { method: method.to_owned() });
		}
		if let Some(body) = self.body.as_ref().filter(|body| is_present(body)) {
			return body_identifier(body)?.ok_or(InputError::MissingIdentifier);
		}

		self.cpf
			.clone()
			.or_else(|| self.query_string_parameters.as_ref()?.get("cpf").cloned())
			.filter(|raw| !raw.is_empty())
			.ok_or(InputError::MissingIdentifier)
	}
}

/// JSON payload returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
	/// Whether a token was issued.
	pub success: bool,
	/// Human-readable outcome.
	pub message: String,
	/// Failure category, absent on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<OutcomeCategory>,
	/// Identifier exactly as received, reported when validation rejects it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub identifier: Option<String>,
	/// Cleaned identifier, reported once validation passed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cleaned_identifier: Option<String>,
	/// Issued bearer token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	/// Token type, always `Bearer` when present.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Token lifetime in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<i64>,
}
impl ResponseBody {
	fn granted(cpf: &Cpf, token: GrantedToken) -> Self {
		Self {
			success: true,
			message: SUCCESS_MESSAGE.into(),
			error: None,
			identifier: None,
			cleaned_identifier: Some(cpf.to_string()),
			token: Some(token.token.expose().to_owned()),
			token_type: Some(token.token_type.into()),
			expires_in: Some(token.expires_in_secs()),
		}
	}

	fn failed(error: &Error) -> Self {
		Self {
			success: false,
			message: error.to_string(),
			error: Some(error.category()),
			identifier: None,
			cleaned_identifier: None,
			token: None,
			token_type: None,
			expires_in: None,
		}
	}
}

/// Status code, headers, and payload produced by [`TokenService::handle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: BTreeMap<String, String>,
	/// JSON payload.
	pub body: ResponseBody,
}
impl ServiceResponse {
	/// Serializes the payload.
	pub fn body_json(&self) -> Result<String> {
		serde_json::to_string(&self.body).map_err(|e| ConfigError::from(e).into())
	}

	fn new(status: u16, body: ResponseBody) -> Self {
		let mut headers = BTreeMap::from([(CONTENT_TYPE.0.to_owned(), CONTENT_TYPE.1.to_owned())]);

		if body.success {
			headers.insert(ALLOW_ANY_ORIGIN.0.into(), ALLOW_ANY_ORIGIN.1.into());
		}

		Self { status, headers, body }
	}

	fn from_error(error: &Error) -> Self {
		let status = match error {
			Error::Input(InputError::UnsupportedMethod { .. }) => 405,
			_ => error.category().status_code(),
		};

		Self::new(status, ResponseBody::failed(error))
	}
}

/// Validates identifiers and hands them to a [`Provisioner`].
pub struct TokenService<P>
where
	P: ?Sized + IdentityProvider,
{
	provisioner: Provisioner<P>,
}
impl<P> TokenService<P>
where
	P: ?Sized + IdentityProvider,
{
	/// Wraps `provisioner`.
	pub fn new(provisioner: Provisioner<P>) -> Self {
		Self { provisioner }
	}

	/// Underlying provisioner.
	pub fn provisioner(&self) -> &Provisioner<P> {
		&self.provisioner
	}

	/// Parses a serialized envelope and handles it.
	pub async fn handle_json(&self, raw: &[u8]) -> ServiceResponse {
		let de = &mut serde_json::Deserializer::from_slice(raw);

		match serde_path_to_error::deserialize::<_, RequestEnvelope>(de) {
			Ok(envelope) => self.handle(envelope).await,
			Err(source) => ServiceResponse::from_error(&InputError::InvalidEnvelope { source }.into()),
		}
	}

	/// Handles one request end to end.
	pub async fn handle(&self, envelope: RequestEnvelope) -> ServiceResponse {
		let raw = match envelope.raw_identifier() {
			Ok(raw) => raw,
			Err(e) => return ServiceResponse::from_error(&e.into()),
		};
		let cpf = match Cpf::parse(&raw) {
			Ok(cpf) => cpf,
			Err(e) => return Self::rejected(raw, e),
		};

		match self.provisioner.obtain_token(&cpf).await {
			Ok(token) => ServiceResponse::new(200, ResponseBody::granted(&cpf, token)),
			Err(e) => {
				let mut response = ServiceResponse::from_error(&e);

				response.body.cleaned_identifier = Some(cpf.to_string());

				response
			},
		}
	}

	fn rejected(raw: String, e: ValidationError) -> ServiceResponse {
		let cleaned = e.cleaned().to_owned();
		let mut response = ServiceResponse::from_error(&e.into());

		response.body.identifier = Some(raw);
		response.body.cleaned_identifier = Some(cleaned);

		response
	}
}
#[cfg(feature = "reqwest")]
impl TokenService<HttpIdentityProvider> {
	/// Wires a service against the HTTP directory described by `config`.
	pub fn from_config(config: &BrokerConfig) -> Result<Self> {
		Provisioner::from_config(config).map(Self::new)
	}
}
impl<P> Clone for TokenService<P>
where
	P: ?Sized + IdentityProvider,
{
	fn clone(&self) -> Self {
		Self { provisioner: self.provisioner.clone() }
	}
}
impl<P> Debug for TokenService<P>
where
	P: ?Sized + IdentityProvider,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenService").field("provisioner", &self.provisioner).finish()
	}
}

#[derive(Deserialize)]
struct IdentifierBody {
	#[serde(default)]
	cpf: Option<String>,
}

fn is_present(body: &Value) -> bool {
	match body {
		Value::Null => false,
		Value::String(text) => !text.is_empty(),
		_ => true,
	}
}

fn body_identifier(body: &Value) -> Result<Option<String>, InputError> {
	let parsed: IdentifierBody = match body {
		Value::String(text) => {
			let de = &mut serde_json::Deserializer::from_str(text);

			serde_path_to_error::deserialize(de).map_err(|source| InputError::InvalidBody { source })?
		},
		other => serde_path_to_error::deserialize(other.clone())
			.map_err(|source| InputError::InvalidBody { source })?,
	};

	Ok(parsed.cpf.filter(|raw| !raw.is_empty()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::idp::MemoryIdentityProvider;

	fn service() -> TokenService<MemoryIdentityProvider> {
		let settings =
			crate::flows::ProvisionSettings::default().with_propagation_delay(StdDuration::ZERO);

		TokenService::new(
			Provisioner::new(Arc::new(MemoryIdentityProvider::new())).with_settings(settings),
		)
	}

	#[test]
	fn identifier_precedence_prefers_body() {
		let envelope = RequestEnvelope {
			body: Some(Value::String(r#"{"cpf":"111.444.777-35"}"#.into())),
			cpf: Some("direct".into()),
			query_string_parameters: Some(BTreeMap::from([("cpf".into(), "query".into())])),
			..Default::default()
		};

		assert_eq!(envelope.raw_identifier().expect("Body should win."), "111.444.777-35");

		let envelope = RequestEnvelope {
			cpf: Some("direct".into()),
			..RequestEnvelope::with_query_identifier("query")
		};

		assert_eq!(envelope.raw_identifier().expect("Direct field should win."), "direct");
		assert_eq!(
			RequestEnvelope::with_query_identifier("query").raw_identifier().expect("Query."),
			"query",
		);
	}

	#[test]
	fn extraction_failures_are_classified() {
		let missing = RequestEnvelope::default().raw_identifier().expect_err("Nothing supplied.");

		assert!(matches!(missing, InputError::MissingIdentifier));

		let malformed = RequestEnvelope {
			body: Some(Value::String("{not json".into())),
			..Default::default()
		}
		.raw_identifier()
		.expect_err("Body must be JSON.");

		assert!(matches!(malformed, InputError::InvalidBody { .. }));
		assert!(malformed.to_string().starts_with("Invalid JSON body"));

		let method = RequestEnvelope { http_method: Some("DELETE".into()), ..Default::default() }
			.raw_identifier()
			.expect_err("DELETE is not served.");

		assert!(matches!(method, InputError::UnsupportedMethod { .. }));
	}

	#[test]
	fn statuses_follow_categories() {
		assert_eq!(OutcomeCategory::Success.status_code(), 200);
		assert_eq!(OutcomeCategory::InvalidIdentifier.status_code(), 400);
		assert_eq!(OutcomeCategory::InternalError.status_code(), 500);
		assert_eq!(
			serde_json::to_value(OutcomeCategory::ProviderFailure).expect("Serializable."),
			"providerFailure",
		);
	}

	#[tokio::test]
	async fn success_response_carries_token_and_cors() {
		let response =
			service().handle(RequestEnvelope::with_body_identifier("123.456.789-09")).await;

		assert_eq!(response.status, 200);
		assert_eq!(response.headers.get("Access-Control-Allow-Origin").map(String::as_str), Some("*"));
		assert_eq!(response.body.message, SUCCESS_MESSAGE);
		assert_eq!(response.body.cleaned_identifier.as_deref(), Some("12345678909"));
		assert_eq!(response.body.token_type.as_deref(), Some("Bearer"));
		assert_eq!(response.body.expires_in, Some(3600));
		assert!(response.body.token.is_some());
	}

	#[tokio::test]
	async fn invalid_identifier_echoes_raw_and_cleaned_input() {
		let response =
			service().handle(RequestEnvelope::with_query_identifier("123.456.789-00")).await;

		assert_eq!(response.status, 400);
		assert_eq!(response.body.error, Some(OutcomeCategory::InvalidIdentifier));
		assert_eq!(response.body.message, "CPF check digits are invalid.");
		assert_eq!(response.body.identifier.as_deref(), Some("123.456.789-00"));
		assert_eq!(response.body.cleaned_identifier.as_deref(), Some("12345678900"));
		assert!(!response.headers.contains_key("Access-Control-Allow-Origin"));
	}

	#[tokio::test]
	async fn malformed_envelope_is_bad_input() {
		let response = service().handle_json(b"[1, 2").await;

		assert_eq!(response.status, 400);
		assert_eq!(response.body.error, Some(OutcomeCategory::BadInput));

		let json = response.body_json().expect("Payload should serialize.");

		assert!(json.contains("\"success\":false"));
		assert!(!json.contains("cleanedIdentifier"));
	}
}
