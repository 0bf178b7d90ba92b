//! Thread-safe in-memory [`IdentityProvider`] for local development and tests.
//!
//! The directory models the parts of a hosted user pool the provisioning flow cares about:
//! newly created users start with a temporary password that cannot sign in until it is promoted,
//! and new users can stay invisible to reads for a configurable lag to mimic eventual
//! consistency. Writes are always consistent, so a duplicate creation is detected immediately.

// std
use std::time::Instant;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::{DerivedSecret, IssuedToken},
	error::TransientError,
	idp::{AuthenticateOutcome, CreateUserOutcome, IdentityProvider, IdpFuture, NewUser},
};

const TOKEN_BYTES: usize = 32;
const USER_ID_LEN: usize = 12;
const TOKEN_LIFETIME: Duration = Duration::hours(1);

/// Per-operation call counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
	/// `exists` calls.
	pub exists: usize,
	/// `authenticate` calls.
	pub authenticate: usize,
	/// `create_user` calls.
	pub create_user: usize,
	/// `set_permanent_credential` calls.
	pub set_permanent: usize,
}

/// Snapshot of a stored user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryUser {
	/// Provider-assigned identifier.
	pub id: String,
	/// Whether the password has been promoted to permanent.
	pub permanent: bool,
	/// Attributes supplied at creation.
	pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
struct StoredUser {
	view: MemoryUser,
	secret: DerivedSecret,
	visible_at: Instant,
}

#[derive(Debug, Default)]
struct Directory {
	users: RwLock<HashMap<String, StoredUser>>,
	calls: Mutex<CallCounts>,
}

/// In-process user directory implementing [`IdentityProvider`].
#[derive(Clone, Debug, Default)]
pub struct MemoryIdentityProvider {
	directory: Arc<Directory>,
	visibility_lag: StdDuration,
	reject_authentication: bool,
	fail_set_permanent: bool,
	unavailable: bool,
}
impl MemoryIdentityProvider {
	/// Creates an empty, immediately consistent directory.
	pub fn new() -> Self {
		Self::default()
	}

	/// Hides new users from `exists` and `authenticate` until `lag` has elapsed.
	pub fn with_visibility_lag(mut self, lag: StdDuration) -> Self {
		self.visibility_lag = lag;

		self
	}

	/// Rejects every authentication attempt.
	pub fn rejecting_authentication(mut self) -> Self {
		self.reject_authentication = true;

		self
	}

	/// Fails every `set_permanent_credential` call.
	pub fn failing_set_permanent(mut self) -> Self {
		self.fail_set_permanent = true;

		self
	}

	/// Fails every operation with a transient error.
	pub fn unavailable(mut self) -> Self {
		self.unavailable = true;

		self
	}

	/// Inserts a visible user with a permanent password.
	pub fn seed_user(&self, username: impl Into<String>, secret: DerivedSecret) {
		let stored = StoredUser {
			view: MemoryUser { id: new_user_id(), permanent: true, attributes: BTreeMap::new() },
			secret,
			visible_at: Instant::now(),
		};

		self.directory.users.write().insert(username.into(), stored);
	}

	/// Returns a snapshot of `username`, ignoring visibility lag.
	pub fn user(&self, username: &str) -> Option<MemoryUser> {
		self.directory.users.read().get(username).map(|stored| stored.view.clone())
	}

	/// Number of stored users.
	pub fn user_count(&self) -> usize {
		self.directory.users.read().len()
	}

	/// Returns the call counters.
	pub fn calls(&self) -> CallCounts {
		*self.directory.calls.lock()
	}

	fn count(&self, bump: impl FnOnce(&mut CallCounts)) -> Result<()> {
		bump(&mut self.directory.calls.lock());

		if self.unavailable {
			return Err(TransientError::Directory {
				message: "memory directory is unavailable".into(),
				status: Some(503),
				retry_after: None,
			}
			.into());
		}

		Ok(())
	}

	fn visible(&self, username: &str) -> Option<StoredUser> {
		let now = Instant::now();

		self.directory.users.read().get(username).filter(|user| user.visible_at <= now).cloned()
	}

	fn exists_now(&self, username: &str) -> Result<bool> {
		self.count(|calls| calls.exists += 1)?;

		match self.visible(username) {
			Some(_) => Ok(true),
			None => Err(Error::UserNotFound { username: username.to_owned() }),
		}
	}

	fn authenticate_now(&self, username: &str, secret: &DerivedSecret) -> Result<AuthenticateOutcome> {
		self.count(|calls| calls.authenticate += 1)?;

		let rejected = |reason: &str| AuthenticateOutcome::Rejected { reason: reason.to_owned() };
		let outcome = match self.visible(username) {
			_ if self.reject_authentication => rejected("authentication disabled"),
			None => rejected("user not found"),
			Some(user) if user.secret != *secret => rejected("incorrect username or password"),
			Some(user) if !user.view.permanent => rejected("password change required"),
			Some(_) => AuthenticateOutcome::Authenticated(
				IssuedToken::new(new_token()).with_expires_in(TOKEN_LIFETIME),
			),
		};

		Ok(outcome)
	}

	fn create_now(&self, user: &NewUser) -> Result<CreateUserOutcome> {
		self.count(|calls| calls.create_user += 1)?;

		let mut users = self.directory.users.write();

		if users.contains_key(&user.username) {
			return Ok(CreateUserOutcome::AlreadyExists);
		}

		let id = new_user_id();

		users.insert(
			user.username.clone(),
			StoredUser {
				view: MemoryUser {
					id: id.clone(),
					permanent: false,
					attributes: user.attributes.clone(),
				},
				secret: user.secret.clone(),
				visible_at: Instant::now() + self.visibility_lag,
			},
		);

		Ok(CreateUserOutcome::Created { id: Some(id) })
	}

	fn set_permanent_now(&self, username: &str, secret: &DerivedSecret) -> Result<()> {
		self.count(|calls| calls.set_permanent += 1)?;

		if self.fail_set_permanent {
			return Err(TransientError::Directory {
				message: "password policy service is unavailable".into(),
				status: Some(500),
				retry_after: None,
			}
			.into());
		}

		match self.directory.users.write().get_mut(username) {
			Some(user) => {
				user.secret = secret.clone();
				user.view.permanent = true;

				Ok(())
			},
			None => Err(Error::UserNotFound { username: username.to_owned() }),
		}
	}
}
impl IdentityProvider for MemoryIdentityProvider {
	fn exists<'a>(&'a self, username: &'a str) -> IdpFuture<'a, bool> {
		Box::pin(async move { self.exists_now(username) })
	}

	fn authenticate<'a>(
		&'a self,
		username: &'a str,
		secret: &'a DerivedSecret,
	) -> IdpFuture<'a, AuthenticateOutcome> {
		Box::pin(async move { self.authenticate_now(username, secret) })
	}

	fn create_user<'a>(&'a self, user: &'a NewUser) -> IdpFuture<'a, CreateUserOutcome> {
		Box::pin(async move { self.create_now(user) })
	}

	fn set_permanent_credential<'a>(
		&'a self,
		username: &'a str,
		secret: &'a DerivedSecret,
	) -> IdpFuture<'a, ()> {
		Box::pin(async move { self.set_permanent_now(username, secret) })
	}
}

fn new_token() -> String {
	let mut bytes = [0_u8; TOKEN_BYTES];

	rand::rng().fill(&mut bytes[..]);

	URL_SAFE_NO_PAD.encode(bytes)
}

fn new_user_id() -> String {
	rand::rng().sample_iter(Alphanumeric).take(USER_ID_LEN).map(char::from).collect()
}
