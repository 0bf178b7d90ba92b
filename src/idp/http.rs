//! [`IdentityProvider`] backed by an HTTP user directory plus an OAuth 2.0 token endpoint.
//!
//! Directory operations use a small REST surface rooted at [`DirectoryDescriptor::users`]:
//!
//! | operation | request | answers |
//! |---|---|---|
//! | exists | `GET {users}/{username}` | 2xx found, 404 missing |
//! | create | `POST {users}` | 2xx created, 409 duplicate, other 4xx refused |
//! | promote | `PUT {users}/{username}/password` | 2xx done |
//!
//! Authentication runs the resource-owner password grant against the token endpoint through the
//! `oauth2` crate. `invalid_grant` is a credential rejection; client errors surface as
//! [`Error::InvalidClient`]; everything else is transient or transport-level.

// crates.io
use oauth2::{
	AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, RequestTokenError, ResourceOwnerPassword, ResourceOwnerUsername,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
use reqwest::{RequestBuilder, Response, StatusCode, header::CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	auth::{DerivedSecret, IssuedToken, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, parse_retry_after},
	idp::{
		AuthenticateOutcome, ClientAuthMethod, CreateUserOutcome, DirectoryDescriptor,
		DirectoryDescriptorError, IdentityProvider, IdpFuture, NewUser,
	},
};

const BODY_PREVIEW_LIMIT: usize = 256;

type PasswordTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type PasswordClient = Client<
	BasicErrorResponse,
	PasswordTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type PasswordGrantError = RequestTokenError<HttpClientError<ReqwestError>, BasicErrorResponse>;

/// Extra token response fields: OpenID providers return an `id_token` next to the access token.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Identity token, when issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

#[derive(Serialize)]
struct CreateUserBody<'a> {
	username: &'a str,
	password: &'a str,
	temporary: bool,
	attributes: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct PasswordBody<'a> {
	password: &'a str,
	temporary: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedBody {
	#[serde(default)]
	id: Option<String>,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
	#[serde(default, alias = "error_description", alias = "errorMessage")]
	message: Option<String>,
	#[serde(default)]
	error: Option<String>,
}

/// HTTP user directory client.
#[derive(Clone)]
pub struct HttpIdentityProvider {
	descriptor: DirectoryDescriptor,
	http_client: ReqwestHttpClient,
	client_id: String,
	client_secret: Option<TokenSecret>,
	admin_token: Option<TokenSecret>,
}
impl HttpIdentityProvider {
	/// Creates a provider for `descriptor` authenticating as the public client `client_id`.
	pub fn new(descriptor: DirectoryDescriptor, client_id: impl Into<String>) -> Self {
		Self {
			descriptor,
			http_client: ReqwestHttpClient::default(),
			client_id: client_id.into(),
			client_secret: None,
			admin_token: None,
		}
	}

	/// Sets the client secret used at the token endpoint.
	pub fn with_client_secret(mut self, secret: TokenSecret) -> Self {
		self.client_secret = Some(secret);

		self
	}

	/// Sets the bearer token sent on directory calls.
	pub fn with_admin_token(mut self, token: TokenSecret) -> Self {
		self.admin_token = Some(token);

		self
	}

	/// Replaces the HTTP client.
	pub fn with_http_client(mut self, http_client: ReqwestHttpClient) -> Self {
		self.http_client = http_client;

		self
	}

	/// Descriptor the provider was built with.
	pub fn descriptor(&self) -> &DirectoryDescriptor {
		&self.descriptor
	}

	fn oauth_client(&self) -> Result<PasswordClient> {
		let token_url = TokenUrl::new(self.descriptor.token.to_string()).map_err(|e| {
			ConfigError::from(DirectoryDescriptorError::InvalidEndpoint {
				endpoint: "token",
				reason: e.to_string(),
			})
		})?;
		let mut client: PasswordClient =
			Client::new(ClientId::new(self.client_id.clone())).set_token_uri(token_url);

		if let Some(secret) = &self.client_secret {
			client = client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}
		if matches!(self.descriptor.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			client = client.set_auth_type(AuthType::RequestBody);
		}

		Ok(client)
	}

	fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
		match &self.admin_token {
			Some(token) => request.bearer_auth(token.expose()),
			None => request,
		}
	}

	async fn exists_now(&self, username: &str) -> Result<bool> {
		let request = self.http_client.get(self.descriptor.user_url(username));
		let response = self.authorized(request).send().await.map_err(map_reqwest_error)?;

		match response.status() {
			status if status.is_success() => Ok(true),
			StatusCode::NOT_FOUND => Ok(false),
			_ => Err(unexpected_response(response).await),
		}
	}

	async fn authenticate_now(
		&self,
		username: &str,
		secret: &DerivedSecret,
	) -> Result<AuthenticateOutcome> {
		let client = self.oauth_client()?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.instrumented(meta.clone());
		let username = ResourceOwnerUsername::new(username.to_owned());
		let password = ResourceOwnerPassword::new(secret.expose().to_owned());

		match client.exchange_password(&username, &password).request_async(&handle).await {
			Ok(response) => Ok(AuthenticateOutcome::Authenticated(map_token_response(&response))),
			Err(e) => map_password_grant_error(meta.take(), e),
		}
	}

	async fn create_now(&self, user: &NewUser) -> Result<CreateUserOutcome> {
		let body = serde_json::to_vec(&CreateUserBody {
			username: &user.username,
			password: user.secret.expose(),
			temporary: true,
			attributes: &user.attributes,
		})
		.map_err(ConfigError::from)?;
		let request = self
			.http_client
			.post(self.descriptor.users.clone())
			.header(CONTENT_TYPE, "application/json")
			.body(body);
		let response = self.authorized(request).send().await.map_err(map_reqwest_error)?;
		let status = response.status();

		if status.is_success() {
			let bytes = response.bytes().await.map_err(map_reqwest_error)?;
			let id = if bytes.iter().all(u8::is_ascii_whitespace) {
				None
			} else {
				parse_directory_json::<CreatedBody>(&bytes, status)?.id
			};

			return Ok(CreateUserOutcome::Created { id });
		}

		match status {
			StatusCode::CONFLICT => Ok(CreateUserOutcome::AlreadyExists),
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::InvalidClient {
				reason: format!("directory refused the admin credentials with HTTP {status}"),
			}),
			_ if status.is_client_error() => {
				let bytes = response.bytes().await.map_err(map_reqwest_error)?;

				Ok(CreateUserOutcome::Rejected { reason: error_reason(&bytes, status) })
			},
			_ => Err(unexpected_response(response).await),
		}
	}

	async fn set_permanent_now(&self, username: &str, secret: &DerivedSecret) -> Result<()> {
		let body = serde_json::to_vec(&PasswordBody { password: secret.expose(), temporary: false })
			.map_err(ConfigError::from)?;
		let request = self
			.http_client
			.put(self.descriptor.password_url(username))
			.header(CONTENT_TYPE, "application/json")
			.body(body);
		let response = self.authorized(request).send().await.map_err(map_reqwest_error)?;

		match response.status() {
			status if status.is_success() => Ok(()),
			StatusCode::NOT_FOUND => Err(Error::UserNotFound { username: username.to_owned() }),
			_ => Err(unexpected_response(response).await),
		}
	}
}
impl IdentityProvider for HttpIdentityProvider {
	fn exists<'a>(&'a self, username: &'a str) -> IdpFuture<'a, bool> {
		Box::pin(self.exists_now(username))
	}

	fn authenticate<'a>(
		&'a self,
		username: &'a str,
		secret: &'a DerivedSecret,
	) -> IdpFuture<'a, AuthenticateOutcome> {
		Box::pin(self.authenticate_now(username, secret))
	}

	fn create_user<'a>(&'a self, user: &'a NewUser) -> IdpFuture<'a, CreateUserOutcome> {
		Box::pin(self.create_now(user))
	}

	fn set_permanent_credential<'a>(
		&'a self,
		username: &'a str,
		secret: &'a DerivedSecret,
	) -> IdpFuture<'a, ()> {
		Box::pin(self.set_permanent_now(username, secret))
	}
}
impl Debug for HttpIdentityProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpIdentityProvider")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("admin_token_set", &self.admin_token.is_some())
			.finish()
	}
}

fn map_token_response(response: &PasswordTokenResponse) -> IssuedToken {
	let mut token = IssuedToken::new(response.access_token().secret().to_owned());

	if let Some(id_token) = &response.extra_fields().id_token {
		token = token.with_id_token(id_token.to_owned());
	}
	if let Some(lifetime) = response.expires_in().and_then(|secs| Duration::try_from(secs).ok()) {
		token = token.with_expires_in(lifetime);
	}

	token
}

fn map_password_grant_error(
	meta: Option<ResponseMetadata>,
	err: PasswordGrantError,
) -> Result<AuthenticateOutcome> {
	let status = meta.as_ref().and_then(|m| m.status);
	let retry_after = meta.as_ref().and_then(|m| m.retry_after);

	match err {
		RequestTokenError::ServerResponse(response) => {
			let reason = response
				.error_description()
				.cloned()
				.unwrap_or_else(|| response.error().as_ref().to_owned());

			match response.error() {
				BasicErrorResponseType::InvalidGrant => Ok(AuthenticateOutcome::Rejected { reason }),
				BasicErrorResponseType::InvalidClient | BasicErrorResponseType::UnauthorizedClient =>
					Err(Error::InvalidClient { reason }),
				_ => Err(TransientError::TokenEndpoint { message: reason, status, retry_after }.into()),
			}
		},
		RequestTokenError::Request(HttpClientError::Reqwest(inner)) => Err(map_reqwest_error(*inner)),
		RequestTokenError::Request(HttpClientError::Http(inner)) =>
			Err(ConfigError::from(inner).into()),
		RequestTokenError::Request(HttpClientError::Io(inner)) => Err(TransportError::Io(inner).into()),
		RequestTokenError::Request(other) => Err(TransientError::TokenEndpoint {
			message: format!("HTTP client error occurred while calling the token endpoint: {other}"),
			status,
			retry_after,
		}
		.into()),
		RequestTokenError::Parse(source, _body) =>
			Err(TransientError::TokenResponseParse { source, status }.into()),
		RequestTokenError::Other(message) =>
			Err(TransientError::TokenEndpoint { message, status, retry_after }.into()),
	}
}

fn map_reqwest_error(err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Directory {
			message: "request to the identity provider timed out".into(),
			status: err.status().map(|code| code.as_u16()),
			retry_after: None,
		}
		.into();
	}

	TransportError::from(err).into()
}

async fn unexpected_response(response: Response) -> Error {
	let status = response.status();
	let retry_after = parse_retry_after(response.headers());
	let preview = match response.bytes().await {
		Ok(bytes) => error_reason(&bytes, status),
		Err(e) => return map_reqwest_error(e),
	};

	TransientError::Directory {
		message: format!("HTTP {status}: {preview}"),
		status: Some(status.as_u16()),
		retry_after,
	}
	.into()
}

fn parse_directory_json<T>(bytes: &[u8], status: StatusCode) -> Result<T>
where
	T: for<'de> Deserialize<'de>,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
		TransientError::DirectoryResponseParse { source, status: Some(status.as_u16()) }.into()
	})
}

fn error_reason(bytes: &[u8], status: StatusCode) -> String {
	let body = serde_json::from_slice::<ErrorBody>(bytes).unwrap_or_default();

	if let Some(reason) = body.message.or(body.error) {
		return reason;
	}

	let text = String::from_utf8_lossy(bytes);
	let text = text.trim();

	if text.is_empty() {
		return status.canonical_reason().unwrap_or("unexpected status").to_owned();
	}

	text.chars().take(BODY_PREVIEW_LIMIT).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn error_reason_prefers_structured_fields() {
		assert_eq!(
			error_reason(br#"{"message":"password too weak"}"#, StatusCode::BAD_REQUEST),
			"password too weak",
		);
		assert_eq!(
			error_reason(br#"{"error":"invalid_attribute"}"#, StatusCode::BAD_REQUEST),
			"invalid_attribute",
		);
		assert_eq!(error_reason(b"  ", StatusCode::BAD_REQUEST), "Bad Request");
		assert_eq!(error_reason(&[b'x'; 400], StatusCode::BAD_REQUEST).len(), BODY_PREVIEW_LIMIT);
	}

	#[test]
	fn token_response_maps_identity_token_and_lifetime() {
		let response: PasswordTokenResponse = serde_json::from_str(
			r#"{"access_token":"a","id_token":"i","token_type":"bearer","expires_in":900}"#,
		)
		.expect("Token response fixture should deserialize.");
		let token = map_token_response(&response);

		assert_eq!(token.access_token.expose(), "a");
		assert_eq!(token.id_token.as_ref().map(TokenSecret::expose), Some("i"));
		assert_eq!(token.expires_in, Some(Duration::seconds(900)));
	}

	#[test]
	fn directory_json_errors_report_status() {
		let err = parse_directory_json::<CreatedBody>(b"{\"id\":42}", StatusCode::CREATED)
			.expect_err("Numeric ids do not match the expected schema.");

		assert!(matches!(
			err,
			Error::Transient(TransientError::DirectoryResponseParse { status: Some(201), .. })
		));
	}
}
