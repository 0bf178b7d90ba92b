//! Tokens returned by identity providers and handed back to callers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Token type advertised to callers for every granted token.
pub const BEARER: &str = "Bearer";

/// Tokens returned by a successful provider authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
	/// Access token issued by the provider.
	pub access_token: TokenSecret,
	/// Identity token, when the provider issues one.
	pub id_token: Option<TokenSecret>,
	/// Lifetime reported by the provider.
	pub expires_in: Option<Duration>,
}
impl IssuedToken {
	/// Creates a token carrying only an access token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), id_token: None, expires_in: None }
	}

	/// Attaches an identity token.
	pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
		self.id_token = Some(TokenSecret::new(id_token));

		self
	}

	/// Attaches the provider-reported lifetime.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = Some(expires_in);

		self
	}

	/// Converts into the caller-facing token, preferring the identity token and falling back to
	/// `default_expires_in` when the provider reported no usable lifetime.
	pub fn into_granted(self, default_expires_in: Duration) -> GrantedToken {
		let expires_in = self
			.expires_in
			.filter(|lifetime| lifetime.is_positive())
			.unwrap_or(default_expires_in);

		GrantedToken {
			token: self.id_token.unwrap_or(self.access_token),
			token_type: BEARER,
			expires_in,
			issued_at: OffsetDateTime::now_utc(),
		}
	}
}

/// Token returned to the caller of [`Provisioner::obtain_token`](crate::flows::Provisioner::obtain_token).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantedToken {
	/// Bearer credential for subsequent requests.
	pub token: TokenSecret,
	/// Always [`BEARER`].
	pub token_type: &'static str,
	/// Token lifetime.
	pub expires_in: Duration,
	/// Instant the broker received the token.
	pub issued_at: OffsetDateTime,
}
impl GrantedToken {
	/// Lifetime in whole seconds, as reported in responses.
	pub fn expires_in_secs(&self) -> i64 {
		self.expires_in.whole_seconds()
	}

	/// Instant after which the token should be considered expired.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.issued_at + self.expires_in
	}
}
