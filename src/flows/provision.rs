//! Find-or-create-then-authenticate state machine.
//!
//! A request moves through `CheckExists`, then either `ExistsAuthenticate` (returning early on
//! success) or straight to `CreateUser`. Creation is followed by a best-effort `SetPermanent`, a
//! single `WaitPropagation` pause, and exactly one `RetryAuthenticate`. The flow never loops, so
//! every request performs at most two authentications and one creation.

// self
use crate::{
	_prelude::*,
	auth::{DerivedSecret, GrantedToken},
	cpf::Cpf,
	flows::Provisioner,
	idp::{AuthenticateOutcome, CreateUserOutcome, IdentityProvider},
	obs::{self, FlowOutcome, FlowSpan, FlowStage},
};

impl<P> Provisioner<P>
where
	P: ?Sized + IdentityProvider,
{
	/// Returns a bearer token for `cpf`, creating the directory user on first sight.
	///
	/// The propagation pause uses `tokio::time::sleep`, so callers configuring a non-zero
	/// [`ProvisionSettings::propagation_delay`](crate::flows::ProvisionSettings::propagation_delay)
	/// must poll this future on a Tokio runtime with the time driver enabled.
	pub async fn obtain_token(&self, cpf: &Cpf) -> Result<GrantedToken> {
		let span = FlowSpan::new(&cpf.masked());

		obs::record_flow_outcome(FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let mut stage = FlowStage::CheckExists;
				let result = self.run(cpf, &mut stage).await;

				match &result {
					Ok(_) => obs::transition(FlowStage::Success),
					Err(e) => {
						obs::trace_failure(stage, e);
						obs::transition(FlowStage::Fail);
					},
				}

				result
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(FlowOutcome::Failure),
		}

		result
	}

	async fn run(&self, cpf: &Cpf, stage: &mut FlowStage) -> Result<GrantedToken> {
		let username = cpf.as_str();
		let secret = self.deriver.derive(cpf);

		enter(stage, FlowStage::CheckExists);

		if self.check_exists(username).await? {
			enter(stage, FlowStage::ExistsAuthenticate);

			match self.provider.authenticate(username, &secret).await {
				Ok(AuthenticateOutcome::Authenticated(issued)) =>
					return Ok(issued.into_granted(self.settings.default_expires_in)),
				Ok(AuthenticateOutcome::Rejected { reason }) =>
					obs::trace_recovered(FlowStage::ExistsAuthenticate, &reason),
				Err(e) => obs::trace_recovered(FlowStage::ExistsAuthenticate, &e),
			}

			enter(stage, FlowStage::NotExistsCreate);
		}

		enter(stage, FlowStage::CreateUser);

		match self.provider.create_user(&self.new_user(cpf, secret.clone())).await? {
			CreateUserOutcome::Created { .. } => self.promote(stage, username, &secret).await,
			// Only the request that created the user may set its credential.
			CreateUserOutcome::AlreadyExists =>
				obs::trace_recovered(FlowStage::CreateUser, &"user already exists"),
			CreateUserOutcome::Rejected { reason } =>
				return Err(Error::ProvisioningRejected { reason }),
		}

		enter(stage, FlowStage::WaitPropagation);

		if !self.settings.propagation_delay.is_zero() {
			tokio::time::sleep(self.settings.propagation_delay).await;
		}

		enter(stage, FlowStage::RetryAuthenticate);

		match self.provider.authenticate(username, &secret).await? {
			AuthenticateOutcome::Authenticated(issued) =>
				Ok(issued.into_granted(self.settings.default_expires_in)),
			AuthenticateOutcome::Rejected { reason } => Err(Error::AuthenticationFailure { reason }),
		}
	}

	async fn check_exists(&self, username: &str) -> Result<bool> {
		match self.provider.exists(username).await {
			Ok(found) => Ok(found),
			Err(Error::UserNotFound { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn promote(&self, stage: &mut FlowStage, username: &str, secret: &DerivedSecret) {
		enter(stage, FlowStage::SetPermanent);

		if let Err(e) = self.provider.set_permanent_credential(username, secret).await {
			obs::trace_recovered(FlowStage::SetPermanent, &e);
		}
	}
}

fn enter(stage: &mut FlowStage, next: FlowStage) {
	*stage = next;

	obs::transition(next);
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		auth::{IssuedToken, SecretDeriver, TokenSecret},
		error::TransientError,
		flows::ProvisionSettings,
		idp::{IdpFuture, MemoryIdentityProvider, NewUser},
	};

	const CPF: &str = "11144477735";

	fn cpf() -> Cpf {
		Cpf::parse(CPF).expect("Fixture CPF should be valid.")
	}

	fn instant() -> ProvisionSettings {
		ProvisionSettings::default().with_propagation_delay(StdDuration::ZERO)
	}

	/// Provider answering every call with a fixed script.
	#[derive(Default)]
	struct Scripted {
		exists: Option<bool>,
		create_rejected: bool,
		retry_unavailable: bool,
		authenticate_calls: AtomicUsize,
		create_calls: AtomicUsize,
	}
	impl IdentityProvider for Scripted {
		fn exists<'a>(&'a self, username: &'a str) -> IdpFuture<'a, bool> {
			Box::pin(async move {
				self.exists.ok_or_else(|| Error::UserNotFound { username: username.to_owned() })
			})
		}

		fn authenticate<'a>(
			&'a self,
			_: &'a str,
			_: &'a DerivedSecret,
		) -> IdpFuture<'a, AuthenticateOutcome> {
			Box::pin(async move {
				let call = self.authenticate_calls.fetch_add(1, Ordering::SeqCst);

				if self.retry_unavailable && call > 0 {
					return Err(TransientError::TokenEndpoint {
						message: "token endpoint is down".into(),
						status: Some(503),
						retry_after: None,
					}
					.into());
				}

				Ok(AuthenticateOutcome::Rejected { reason: "not yet".into() })
			})
		}

		fn create_user<'a>(&'a self, _: &'a NewUser) -> IdpFuture<'a, CreateUserOutcome> {
			Box::pin(async move {
				self.create_calls.fetch_add(1, Ordering::SeqCst);

				if self.create_rejected {
					Ok(CreateUserOutcome::Rejected { reason: "password policy".into() })
				} else {
					Ok(CreateUserOutcome::Created { id: None })
				}
			})
		}

		fn set_permanent_credential<'a>(
			&'a self,
			_: &'a str,
			_: &'a DerivedSecret,
		) -> IdpFuture<'a, ()> {
			Box::pin(async { Ok(()) })
		}
	}

	#[tokio::test]
	async fn existing_user_authenticates_without_creation() {
		let idp = MemoryIdentityProvider::new();
		let provisioner = Provisioner::new(Arc::new(idp.clone())).with_settings(instant());

		idp.seed_user(CPF, provisioner.deriver.derive(&cpf()));

		let granted = provisioner.obtain_token(&cpf()).await.expect("Seeded user should sign in.");

		assert_eq!(granted.token_type, "Bearer");
		assert_eq!(granted.expires_in_secs(), 3600);
		assert_eq!(idp.calls().create_user, 0);
		assert_eq!(idp.calls().authenticate, 1);
	}

	#[tokio::test]
	async fn new_user_is_created_with_attributes() {
		let idp = MemoryIdentityProvider::new();
		let provisioner = Provisioner::new(Arc::new(idp.clone())).with_settings(instant());

		provisioner.obtain_token(&cpf()).await.expect("New user should be provisioned.");

		let user = idp.user(CPF).expect("User should be stored.");

		assert!(user.permanent);
		assert_eq!(user.attributes.get("email").map(String::as_str), Some("11144477735@temp.com"));
		assert_eq!(user.attributes.get("custom:cpf").map(String::as_str), Some(CPF));
	}

	#[tokio::test]
	async fn rejected_creation_is_fatal() {
		let idp = Arc::new(Scripted { create_rejected: true, ..Default::default() });
		let provisioner = Provisioner::new(idp.clone()).with_settings(instant());
		let err = provisioner.obtain_token(&cpf()).await.expect_err("Rejected creation must fail.");

		assert!(matches!(err, Error::ProvisioningRejected { ref reason } if reason == "password policy"));
		assert_eq!(idp.authenticate_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn existing_user_with_stale_secret_gets_one_creation_and_one_retry() {
		let idp = Arc::new(Scripted { exists: Some(true), ..Default::default() });
		let provisioner = Provisioner::new(idp.clone()).with_settings(instant());
		let err = provisioner.obtain_token(&cpf()).await.expect_err("Script never authenticates.");

		assert!(matches!(err, Error::AuthenticationFailure { .. }));
		assert_eq!(idp.authenticate_calls.load(Ordering::SeqCst), 2);
		assert_eq!(idp.create_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn existing_user_with_foreign_secret_keeps_its_credential() {
		let idp = MemoryIdentityProvider::new();
		let provisioner = Provisioner::new(Arc::new(idp.clone())).with_settings(instant());
		let foreign = SecretDeriver::new()
			.with_pepper(TokenSecret::new("previous deployment"))
			.derive(&cpf());

		idp.seed_user(CPF, foreign);

		let err = provisioner
			.obtain_token(&cpf())
			.await
			.expect_err("A user created under another secret must not be taken over.");

		assert!(matches!(err, Error::AuthenticationFailure { .. }));
		assert_eq!(idp.calls().create_user, 1);
		assert_eq!(idp.calls().set_permanent, 0);
		assert_eq!(idp.calls().authenticate, 2);
	}

	#[tokio::test]
	async fn retry_transport_failure_is_propagated() {
		let idp = Arc::new(Scripted { exists: Some(true), retry_unavailable: true, ..Default::default() });
		let provisioner = Provisioner::new(idp).with_settings(instant());
		let err = provisioner.obtain_token(&cpf()).await.expect_err("Retry must fail.");

		assert!(err.is_provider_unavailable());
	}

	#[tokio::test]
	async fn exists_answering_false_goes_straight_to_creation() {
		let idp = Arc::new(Scripted { exists: Some(false), ..Default::default() });
		let provisioner = Provisioner::new(idp.clone()).with_settings(instant());

		provisioner.obtain_token(&cpf()).await.expect_err("Script never authenticates.");

		assert_eq!(idp.authenticate_calls.load(Ordering::SeqCst), 1);
		assert_eq!(idp.create_calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn issued_tokens_use_configured_default_lifetime() {
		let settings = ProvisionSettings::default().with_default_expires_in(Duration::minutes(5));
		let granted = IssuedToken::new("access").into_granted(settings.default_expires_in);

		assert_eq!(granted.expires_in_secs(), 300);
	}
}
