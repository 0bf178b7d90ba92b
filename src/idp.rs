//! Identity provider capability consumed by the provisioning flow, plus built-in backends.
//!
//! [`IdentityProvider`] is the broker's only view of the user directory. The flow never reads
//! credential state back; it only asks whether a username exists, tries to authenticate,
//! creates users, and promotes their password to permanent.

pub mod descriptor;
#[cfg(feature = "reqwest")] pub mod http;
pub mod memory;

pub use descriptor::*;
#[cfg(feature = "reqwest")] pub use http::HttpIdentityProvider;
pub use memory::MemoryIdentityProvider;

// self
use crate::{
	_prelude::*,
	auth::{DerivedSecret, IssuedToken},
};

/// Boxed future returned by [`IdentityProvider`] operations.
pub type IdpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Attribute key carrying the synthetic email address.
pub const EMAIL_ATTRIBUTE: &str = "email";

/// User directory operations required by the provisioning flow.
///
/// Implementations must serialize conflicting writes on their side: when two callers create the
/// same username concurrently exactly one gets [`CreateUserOutcome::Created`] and the other
/// [`CreateUserOutcome::AlreadyExists`].
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Reports whether `username` exists.
	///
	/// Implementations may answer [`Error::UserNotFound`] instead of `Ok(false)`; the flow treats
	/// both the same way.
	fn exists<'a>(&'a self, username: &'a str) -> IdpFuture<'a, bool>;

	/// Attempts to sign `username` in with `secret`.
	fn authenticate<'a>(
		&'a self,
		username: &'a str,
		secret: &'a DerivedSecret,
	) -> IdpFuture<'a, AuthenticateOutcome>;

	/// Creates a user whose password starts out temporary.
	fn create_user<'a>(&'a self, user: &'a NewUser) -> IdpFuture<'a, CreateUserOutcome>;

	/// Marks `secret` as the permanent password of `username`.
	fn set_permanent_credential<'a>(
		&'a self,
		username: &'a str,
		secret: &'a DerivedSecret,
	) -> IdpFuture<'a, ()>;
}

/// Result of an authentication attempt the provider answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthenticateOutcome {
	/// Credentials were accepted.
	Authenticated(IssuedToken),
	/// Credentials were refused.
	Rejected {
		/// Provider-supplied reason.
		reason: String,
	},
}

/// Result of a user creation the provider answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateUserOutcome {
	/// User was created.
	Created {
		/// Provider-assigned identifier, when reported.
		id: Option<String>,
	},
	/// Username is already taken.
	AlreadyExists,
	/// Provider refused the request.
	Rejected {
		/// Provider-supplied reason.
		reason: String,
	},
}

/// User creation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
	/// Username; the cleaned CPF.
	pub username: String,
	/// Initial (temporary) password.
	pub secret: DerivedSecret,
	/// Profile attributes stored with the user.
	pub attributes: BTreeMap<String, String>,
}
impl NewUser {
	/// Creates a request without attributes.
	pub fn new(username: impl Into<String>, secret: DerivedSecret) -> Self {
		Self { username: username.into(), secret, attributes: BTreeMap::new() }
	}

	/// Adds or replaces an attribute.
	pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(name.into(), value.into());

		self
	}
}
