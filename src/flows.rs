//! Provisioning orchestrator that turns a validated CPF into a bearer token.

mod provision;

// self
use crate::{
	_prelude::*,
	auth::{DerivedSecret, SecretDeriver},
	cpf::Cpf,
	idp::{EMAIL_ATTRIBUTE, IdentityProvider, NewUser},
};
#[cfg(feature = "reqwest")]
use crate::{
	config::BrokerConfig,
	idp::{DirectoryDescriptor, HttpIdentityProvider},
};

#[cfg(feature = "reqwest")]
/// Provisioner specialized for the crate's HTTP directory provider.
pub type HttpProvisioner = Provisioner<HttpIdentityProvider>;

/// Tunables for the provisioning flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionSettings {
	/// Pause between creating a user and authenticating it.
	pub propagation_delay: StdDuration,
	/// Lifetime reported when the provider omits one.
	pub default_expires_in: Duration,
	/// Domain of the synthetic email address attached to new users.
	pub email_domain: String,
	/// Attribute that stores the CPF on new users.
	pub identifier_attribute: String,
}
impl ProvisionSettings {
	/// Default propagation pause.
	pub const DEFAULT_PROPAGATION_DELAY: StdDuration = StdDuration::from_secs(2);
	/// Default token lifetime.
	pub const DEFAULT_EXPIRES_IN: Duration = Duration::hours(1);
	/// Default synthetic email domain.
	pub const DEFAULT_EMAIL_DOMAIN: &'static str = "temp.com";
	/// Default identifier attribute.
	pub const DEFAULT_IDENTIFIER_ATTRIBUTE: &'static str = "custom:cpf";

	/// Overrides the propagation pause.
	pub fn with_propagation_delay(mut self, delay: StdDuration) -> Self {
		self.propagation_delay = delay;

		self
	}

	/// Overrides the fallback lifetime; non-positive values keep the current one.
	pub fn with_default_expires_in(mut self, lifetime: Duration) -> Self {
		if lifetime.is_positive() {
			self.default_expires_in = lifetime;
		}

		self
	}

	/// Overrides the synthetic email domain.
	pub fn with_email_domain(mut self, domain: impl Into<String>) -> Self {
		self.email_domain = domain.into();

		self
	}

	/// Overrides the identifier attribute name.
	pub fn with_identifier_attribute(mut self, attribute: impl Into<String>) -> Self {
		self.identifier_attribute = attribute.into();

		self
	}
}
impl Default for ProvisionSettings {
	fn default() -> Self {
		Self {
			propagation_delay: Self::DEFAULT_PROPAGATION_DELAY,
			default_expires_in: Self::DEFAULT_EXPIRES_IN,
			email_domain: Self::DEFAULT_EMAIL_DOMAIN.into(),
			identifier_attribute: Self::DEFAULT_IDENTIFIER_ATTRIBUTE.into(),
		}
	}
}

/// Drives an [`IdentityProvider`] through lookup, creation, promotion, and authentication.
///
/// The provisioner holds no mutable state; share it freely across concurrent requests.
pub struct Provisioner<P>
where
	P: ?Sized + IdentityProvider,
{
	/// Provider every request talks to.
	pub provider: Arc<P>,
	/// Password derivation shared by creation and authentication.
	pub deriver: SecretDeriver,
	/// Flow tunables.
	pub settings: ProvisionSettings,
}
impl<P> Provisioner<P>
where
	P: ?Sized + IdentityProvider,
{
	/// Creates a provisioner with default settings and an unpeppered deriver.
	pub fn new(provider: Arc<P>) -> Self {
		Self {
			provider,
			deriver: SecretDeriver::default(),
			settings: ProvisionSettings::default(),
		}
	}

	/// Replaces the secret deriver.
	pub fn with_deriver(mut self, deriver: SecretDeriver) -> Self {
		self.deriver = deriver;

		self
	}

	/// Replaces the flow settings.
	pub fn with_settings(mut self, settings: ProvisionSettings) -> Self {
		self.settings = settings;

		self
	}

	fn new_user(&self, cpf: &Cpf, secret: DerivedSecret) -> NewUser {
		NewUser::new(cpf.as_str(), secret)
			.with_attribute(EMAIL_ATTRIBUTE, format!("{cpf}@{}", self.settings.email_domain))
			.with_attribute(self.settings.identifier_attribute.clone(), cpf.as_str())
	}
}
#[cfg(feature = "reqwest")]
impl Provisioner<HttpIdentityProvider> {
	/// Wires the HTTP directory provider, deriver, and settings from `config`.
	pub fn from_config(config: &BrokerConfig) -> Result<Self> {
		let descriptor = DirectoryDescriptor::builder()
			.users_endpoint(config.users_endpoint.clone())
			.token_endpoint(config.token_endpoint.clone())
			.build()
			.map_err(crate::error::ConfigError::from)?;
		let mut provider = HttpIdentityProvider::new(descriptor, config.client_id.clone());

		if let Some(secret) = &config.client_secret {
			provider = provider.with_client_secret(secret.clone());
		}
		if let Some(token) = &config.admin_token {
			provider = provider.with_admin_token(token.clone());
		}

		let mut deriver = SecretDeriver::new();

		if let Some(pepper) = &config.secret_pepper {
			deriver = deriver.with_pepper(pepper.clone());
		}

		Ok(Self::new(Arc::new(provider)).with_deriver(deriver).with_settings(config.provision_settings()))
	}
}
impl<P> Clone for Provisioner<P>
where
	P: ?Sized + IdentityProvider,
{
	fn clone(&self) -> Self {
		Self {
			provider: self.provider.clone(),
			deriver: self.deriver.clone(),
			settings: self.settings.clone(),
		}
	}
}
impl<P> Debug for Provisioner<P>
where
	P: ?Sized + IdentityProvider,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Provisioner")
			.field("peppered", &self.deriver.is_peppered())
			.field("settings", &self.settings)
			.finish()
	}
}
