//! Validated endpoint metadata for HTTP-backed user directories.

// self
use crate::_prelude::*;

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum DirectoryDescriptorError {
	/// Users endpoint is mandatory.
	#[error("Missing users endpoint.")]
	MissingUsersEndpoint,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoint could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL: {reason}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Parser message.
		reason: String,
	},
	/// Endpoints must use HTTPS unless they target a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Users endpoint must be able to take a path segment.
	#[error("The users endpoint cannot be used as a base URL: {url}.")]
	OpaqueUsersEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Endpoints and client settings for an HTTP user directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryDescriptor {
	/// Collection endpoint; users live at `{users}/{username}`.
	pub users: Url,
	/// OAuth 2.0 token endpoint used for the password grant.
	pub token: Url,
	/// Client authentication method for the token endpoint.
	pub client_auth_method: ClientAuthMethod,
}
impl DirectoryDescriptor {
	/// Creates a new builder.
	pub fn builder() -> DirectoryDescriptorBuilder {
		DirectoryDescriptorBuilder::default()
	}

	/// URL of a single user resource.
	pub fn user_url(&self, username: &str) -> Url {
		let mut url = self.users.clone();

		// Validation guarantees the users endpoint can be a base.
		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push(username);
		}

		url
	}

	/// URL of a user's password resource.
	pub fn password_url(&self, username: &str) -> Url {
		let mut url = self.user_url(username);

		if let Ok(mut segments) = url.path_segments_mut() {
			segments.push("password");
		}

		url
	}

	fn validate(&self) -> Result<(), DirectoryDescriptorError> {
		validate_endpoint("users", &self.users)?;
		validate_endpoint("token", &self.token)?;

		if self.users.cannot_be_a_base() {
			return Err(DirectoryDescriptorError::OpaqueUsersEndpoint {
				url: self.users.to_string(),
			});
		}

		Ok(())
	}
}

/// Builder for [`DirectoryDescriptor`] values.
#[derive(Debug, Default)]
pub struct DirectoryDescriptorBuilder {
	/// Users collection endpoint.
	pub users_endpoint: Option<Url>,
	/// Token endpoint.
	pub token_endpoint: Option<Url>,
	/// Client authentication method.
	pub client_auth_method: ClientAuthMethod,
}
impl DirectoryDescriptorBuilder {
	/// Sets the users collection endpoint.
	pub fn users_endpoint(mut self, url: Url) -> Self {
		self.users_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<DirectoryDescriptor, DirectoryDescriptorError> {
		let users = self.users_endpoint.ok_or(DirectoryDescriptorError::MissingUsersEndpoint)?;
		let token = self.token_endpoint.ok_or(DirectoryDescriptorError::MissingTokenEndpoint)?;
		let descriptor =
			DirectoryDescriptor { users, token, client_auth_method: self.client_auth_method };

		descriptor.validate()?;

		Ok(descriptor)
	}
}

/// Parses an endpoint string, reporting failures against `endpoint`.
pub fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, DirectoryDescriptorError> {
	Url::parse(raw)
		.map_err(|e| DirectoryDescriptorError::InvalidEndpoint { endpoint, reason: e.to_string() })
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), DirectoryDescriptorError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(DirectoryDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Fixture URL should parse.")
	}

	#[test]
	fn rejects_insecure_and_missing_endpoints() {
		let err = DirectoryDescriptor::builder()
			.token_endpoint(url("https://idp.example.com/token"))
			.build()
			.expect_err("Users endpoint is required.");

		assert_eq!(err, DirectoryDescriptorError::MissingUsersEndpoint);

		let err = DirectoryDescriptor::builder()
			.users_endpoint(url("http://idp.example.com/users"))
			.token_endpoint(url("https://idp.example.com/token"))
			.build()
			.expect_err("Plain HTTP must be rejected for remote hosts.");

		assert!(matches!(err, DirectoryDescriptorError::InsecureEndpoint { endpoint: "users", .. }));
	}

	#[test]
	fn loopback_http_is_allowed() {
		let descriptor = DirectoryDescriptor::builder()
			.users_endpoint(url("http://127.0.0.1:8080/users"))
			.token_endpoint(url("http://localhost:8080/token"))
			.build()
			.expect("Loopback endpoints should be accepted.");

		assert_eq!(descriptor.client_auth_method, ClientAuthMethod::ClientSecretBasic);
	}

	#[test]
	fn user_urls_append_segments() {
		let descriptor = DirectoryDescriptor::builder()
			.users_endpoint(url("https://idp.example.com/admin/users/"))
			.token_endpoint(url("https://idp.example.com/token"))
			.build()
			.expect("Descriptor should build.");

		assert_eq!(
			descriptor.user_url("12345678909").as_str(),
			"https://idp.example.com/admin/users/12345678909",
		);
		assert_eq!(
			descriptor.password_url("12345678909").as_str(),
			"https://idp.example.com/admin/users/12345678909/password",
		);
	}

	#[test]
	fn parse_endpoint_names_the_field() {
		let err = parse_endpoint("token", "not a url").expect_err("Garbage must not parse.");

		assert!(matches!(err, DirectoryDescriptorError::InvalidEndpoint { endpoint: "token", .. }));
	}
}
