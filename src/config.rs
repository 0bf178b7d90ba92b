//! Environment-driven broker configuration.
//!
//! Required variables:
//! - `CPF_BROKER_USERS_ENDPOINT`: directory users collection URL
//! - `CPF_BROKER_TOKEN_ENDPOINT`: OAuth2 token endpoint URL
//! - `CPF_BROKER_CLIENT_ID`: client identifier presented to the token endpoint
//!
//! Optional variables:
//! - `CPF_BROKER_CLIENT_SECRET`: client secret for the token endpoint
//! - `CPF_BROKER_ADMIN_TOKEN`: bearer token for directory administration calls
//! - `CPF_BROKER_PROPAGATION_DELAY_MS`: pause after creating a user (defaults to 2000)
//! - `CPF_BROKER_DEFAULT_EXPIRES_IN_SECS`: lifetime reported when the provider omits one (defaults
//!   to 3600, must be positive)
//! - `CPF_BROKER_EMAIL_DOMAIN`: synthetic email domain (defaults to `temp.com`)
//! - `CPF_BROKER_IDENTIFIER_ATTRIBUTE`: attribute storing the CPF (defaults to `custom:cpf`)
//! - `CPF_BROKER_SECRET_PEPPER`: deployment secret mixed into password derivation
//!
//! Empty values are treated as unset.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	flows::ProvisionSettings,
	idp::parse_endpoint,
};

const USERS_ENDPOINT: &str = "CPF_BROKER_USERS_ENDPOINT";
const TOKEN_ENDPOINT: &str = "CPF_BROKER_TOKEN_ENDPOINT";
const CLIENT_ID: &str = "CPF_BROKER_CLIENT_ID";
const CLIENT_SECRET: &str = "CPF_BROKER_CLIENT_SECRET";
const ADMIN_TOKEN: &str = "CPF_BROKER_ADMIN_TOKEN";
const PROPAGATION_DELAY_MS: &str = "CPF_BROKER_PROPAGATION_DELAY_MS";
const DEFAULT_EXPIRES_IN_SECS: &str = "CPF_BROKER_DEFAULT_EXPIRES_IN_SECS";
const EMAIL_DOMAIN: &str = "CPF_BROKER_EMAIL_DOMAIN";
const IDENTIFIER_ATTRIBUTE: &str = "CPF_BROKER_IDENTIFIER_ATTRIBUTE";
const SECRET_PEPPER: &str = "CPF_BROKER_SECRET_PEPPER";

/// Everything needed to wire a broker against an HTTP directory.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
	/// Directory users collection.
	pub users_endpoint: Url,
	/// OAuth2 token endpoint.
	pub token_endpoint: Url,
	/// Client identifier.
	pub client_id: String,
	/// Client secret, when the client is confidential.
	pub client_secret: Option<TokenSecret>,
	/// Bearer token for directory administration calls.
	pub admin_token: Option<TokenSecret>,
	/// Deployment pepper for password derivation.
	pub secret_pepper: Option<TokenSecret>,
	/// Pause between creation and the retry authentication.
	pub propagation_delay: StdDuration,
	/// Lifetime reported when the provider omits one.
	pub default_expires_in: Duration,
	/// Synthetic email domain.
	pub email_domain: String,
	/// Attribute storing the CPF.
	pub identifier_attribute: String,
}
impl BrokerConfig {
	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads the configuration through `lookup`, which maps a variable name to its value.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let required = |name: &'static str| var(name).ok_or(ConfigError::MissingEnv { name });
		let users_endpoint = parse_endpoint("users", &required(USERS_ENDPOINT)?)?;
		let token_endpoint = parse_endpoint("token", &required(TOKEN_ENDPOINT)?)?;
		let client_id = required(CLIENT_ID)?;
		let propagation_delay = match var(PROPAGATION_DELAY_MS) {
			Some(raw) => StdDuration::from_millis(parse_number(PROPAGATION_DELAY_MS, &raw)?),
			None => ProvisionSettings::DEFAULT_PROPAGATION_DELAY,
		};
		let default_expires_in = match var(DEFAULT_EXPIRES_IN_SECS) {
			Some(raw) => {
				let secs = parse_number(DEFAULT_EXPIRES_IN_SECS, &raw)?;

				if secs == 0 {
					return Err(ConfigError::InvalidEnv {
						name: DEFAULT_EXPIRES_IN_SECS,
						reason: "lifetime must be positive".into(),
					});
				}

				Duration::seconds(i64::try_from(secs).map_err(|e| ConfigError::InvalidEnv {
					name: DEFAULT_EXPIRES_IN_SECS,
					reason: e.to_string(),
				})?)
			},
			None => ProvisionSettings::DEFAULT_EXPIRES_IN,
		};

		Ok(Self {
			users_endpoint,
			token_endpoint,
			client_id,
			client_secret: var(CLIENT_SECRET).map(TokenSecret::new),
			admin_token: var(ADMIN_TOKEN).map(TokenSecret::new),
			secret_pepper: var(SECRET_PEPPER).map(TokenSecret::new),
			propagation_delay,
			default_expires_in,
			email_domain: var(EMAIL_DOMAIN)
				.unwrap_or_else(|| ProvisionSettings::DEFAULT_EMAIL_DOMAIN.into()),
			identifier_attribute: var(IDENTIFIER_ATTRIBUTE)
				.unwrap_or_else(|| ProvisionSettings::DEFAULT_IDENTIFIER_ATTRIBUTE.into()),
		})
	}

	/// Flow tunables carried by this configuration.
	pub fn provision_settings(&self) -> ProvisionSettings {
		ProvisionSettings::default()
			.with_propagation_delay(self.propagation_delay)
			.with_default_expires_in(self.default_expires_in)
			.with_email_domain(self.email_domain.clone())
			.with_identifier_attribute(self.identifier_attribute.clone())
	}
}

fn parse_number(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
	raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
		name,
		reason: e.to_string(),
	})
}
