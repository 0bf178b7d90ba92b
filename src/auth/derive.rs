//! Deterministic per-identifier credential derivation.
//!
//! The broker never stores the password it assigns to a provisioned identity. Instead the
//! password is recomputed from the CPF on every authentication attempt, so the derivation must
//! be stable across calls, processes, and platforms: no random seed, no clock, no floating point.
//!
//! # Security
//!
//! Without a pepper the derived secret is a public function of the CPF, and anyone who knows the
//! identifier (and this algorithm) can reconstruct the credential. Deployments that treat the
//! issued token as proof of anything beyond "this CPF is well formed" must configure a pepper
//! with [`SecretDeriver::with_pepper`] and keep it out of reach.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret, cpf::Cpf};

const DOMAIN_TAG: &[u8] = b"cpf-broker.derived-secret.v1";
const PREFIX: &str = "TempPass";
const SUFFIX: &str = "9!";
const FRAGMENT_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Password derived from a CPF; redacted in every formatter.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedSecret(String);
impl DerivedSecret {
	/// Returns the password. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for DerivedSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for DerivedSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("DerivedSecret").field(&"<redacted>").finish()
	}
}
impl Display for DerivedSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Computes [`DerivedSecret`] values, optionally mixing in a server-side pepper.
#[derive(Clone, Debug, Default)]
pub struct SecretDeriver {
	pepper: Option<TokenSecret>,
}
impl SecretDeriver {
	/// Creates a deriver without a pepper.
	pub fn new() -> Self {
		Self::default()
	}

	/// Mixes `pepper` into every derivation.
	pub fn with_pepper(mut self, pepper: TokenSecret) -> Self {
		self.pepper = Some(pepper);

		self
	}

	/// Returns `true` when a pepper is configured.
	pub fn is_peppered(&self) -> bool {
		self.pepper.is_some()
	}

	/// Derives the password for `cpf`.
	///
	/// The output always contains an uppercase letter, a lowercase letter, a digit, and a symbol,
	/// and is 16 characters long.
	pub fn derive(&self, cpf: &Cpf) -> DerivedSecret {
		let seed = cpf.chars().map(u32::from).sum::<u32>();
		let mut hasher = Sha256::new();

		hasher.update(DOMAIN_TAG);

		if let Some(pepper) = &self.pepper {
			hasher.update(pepper.expose().as_bytes());
		}

		hasher.update(seed.to_be_bytes());

		let digest = hasher.finalize();
		let mut head = [0_u8; 8];

		head.copy_from_slice(&digest[..8]);

		let encoded = to_base36(u64::from_be_bytes(head));
		let fragment = &encoded[encoded.len().saturating_sub(FRAGMENT_LEN)..];

		DerivedSecret(format!("{PREFIX}{fragment:0>width$}{SUFFIX}", width = FRAGMENT_LEN))
	}
}

/// Derives the password for `cpf` without a pepper.
pub fn derive_secret(cpf: &Cpf) -> DerivedSecret {
	SecretDeriver::new().derive(cpf)
}

fn to_base36(mut value: u64) -> String {
	if value == 0 {
		return "0".into();
	}

	let mut buf = Vec::new();

	while value > 0 {
		buf.push(BASE36[(value % 36) as usize]);
		value /= 36;
	}

	buf.reverse();

	String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn cpf(raw: &str) -> Cpf {
		Cpf::parse(raw).expect("Fixture CPF should be valid.")
	}

	#[test]
	fn derivation_is_deterministic() {
		let id = cpf("123.456.789-09");

		assert_eq!(derive_secret(&id), derive_secret(&id));
		assert_eq!(SecretDeriver::new().derive(&id), SecretDeriver::default().derive(&id));
	}

	#[test]
	fn derived_secret_meets_complexity_policy() {
		for raw in ["11144477735", "12345678909", "52998224725", "39053344705"] {
			let secret = derive_secret(&cpf(raw));
			let value = secret.expose();

			assert_eq!(value.len(), PREFIX.len() + FRAGMENT_LEN + SUFFIX.len());
			assert!(value.chars().any(|c| c.is_ascii_uppercase()));
			assert!(value.chars().any(|c| c.is_ascii_lowercase()));
			assert!(value.chars().any(|c| c.is_ascii_digit()));
			assert!(value.chars().any(|c| !c.is_ascii_alphanumeric()));
		}
	}

	#[test]
	fn pepper_changes_output() {
		let id = cpf("11144477735");
		let plain = derive_secret(&id);
		let peppered = SecretDeriver::new().with_pepper(TokenSecret::new("server-side")).derive(&id);

		assert_ne!(plain, peppered);
		assert_eq!(
			peppered,
			SecretDeriver::new().with_pepper(TokenSecret::new("server-side")).derive(&id),
		);
	}

	#[test]
	fn base36_encoding_matches_radix() {
		assert_eq!(to_base36(0), "0");
		assert_eq!(to_base36(35), "z");
		assert_eq!(to_base36(36), "10");
		assert_eq!(to_base36(u64::MAX), "3w5e11264sgsf");
	}

	#[test]
	fn formatters_redact() {
		let secret = derive_secret(&cpf("11144477735"));

		assert_eq!(format!("{secret:?}"), "DerivedSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}
}
