//! CPF normalization and check-digit validation.
//!
//! A CPF is eleven digits where the last two are check digits computed from the first nine with
//! a descending-weight sum modulo 11. Raw input may carry any punctuation (`123.456.789-09`);
//! every non-ASCII-digit character is stripped before validation.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

/// Number of digits in a cleaned CPF.
pub const CPF_LEN: usize = 11;

const BASE_LEN: usize = 9;

/// Reasons a raw identifier is rejected.
///
/// Every variant carries the cleaned (digits-only) form of the input so callers can report what
/// was actually evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum ValidationError {
	/// Input does not contain exactly eleven digits.
	#[error("CPF must have 11 digits.")]
	InvalidLength {
		/// Digits-only form of the input.
		cleaned: String,
	},
	/// All eleven digits are the same.
	#[error("CPF digits must not all be identical.")]
	RepeatedDigits {
		/// Digits-only form of the input.
		cleaned: String,
	},
	/// Check digits do not match the first nine digits.
	#[error("CPF check digits are invalid.")]
	InvalidCheckDigits {
		/// Digits-only form of the input.
		cleaned: String,
	},
}
impl ValidationError {
	/// Digits-only form of the rejected input.
	pub fn cleaned(&self) -> &str {
		match self {
			Self::InvalidLength { cleaned }
			| Self::RepeatedDigits { cleaned }
			| Self::InvalidCheckDigits { cleaned } => cleaned,
		}
	}
}

/// Diagnostic report produced by [`validate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
	/// Whether the identifier passed every check.
	pub is_valid: bool,
	/// Human-readable outcome; never empty.
	pub message: String,
	/// Digits-only form of the input, populated even on failure.
	pub cleaned_identifier: String,
}
impl From<&Result<Cpf, ValidationError>> for ValidationResult {
	fn from(result: &Result<Cpf, ValidationError>) -> Self {
		match result {
			Ok(cpf) => Self {
				is_valid: true,
				message: VALID_MESSAGE.into(),
				cleaned_identifier: cpf.to_string(),
			},
			Err(e) => Self {
				is_valid: false,
				message: e.to_string(),
				cleaned_identifier: e.cleaned().to_owned(),
			},
		}
	}
}

const VALID_MESSAGE: &str = "CPF is valid.";

/// Validated, digits-only CPF.
///
/// Values can only be obtained through [`Cpf::parse`] (or the `FromStr`/serde paths that call it),
/// so holding a `Cpf` proves the identifier passed the checksum.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpf(String);
impl Cpf {
	/// Cleans and validates a raw identifier.
	pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
		let cleaned = clean(raw.as_ref());

		check(&cleaned)?;

		Ok(Self(cleaned))
	}

	/// Returns the eleven digits.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Renders the conventional `ddd.ddd.ddd-dd` form.
	pub fn formatted(&self) -> String {
		let d = &self.0;

		format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..])
	}

	/// Renders a log-safe form that hides the leading block and the check digits.
	pub fn masked(&self) -> String {
		let d = &self.0;

		format!("***.{}.{}-**", &d[3..6], &d[6..9])
	}
}
impl Deref for Cpf {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for Cpf {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for Cpf {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<Cpf> for String {
	fn from(value: Cpf) -> Self {
		value.0
	}
}
impl TryFrom<String> for Cpf {
	type Error = ValidationError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(value)
	}
}
impl FromStr for Cpf {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl Debug for Cpf {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Cpf({})", self.0)
	}
}
impl Display for Cpf {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Strips every character that is not an ASCII digit.
pub fn clean(raw: &str) -> String {
	raw.chars().filter(char::is_ascii_digit).collect()
}

/// Validates a raw identifier and reports the outcome without failing.
pub fn validate(raw: &str) -> ValidationResult {
	ValidationResult::from(&Cpf::parse(raw))
}

fn check(cleaned: &str) -> Result<(), ValidationError> {
	let digits = cleaned.as_bytes();

	if digits.len() != CPF_LEN {
		return Err(ValidationError::InvalidLength { cleaned: cleaned.to_owned() });
	}
	if digits.iter().all(|d| *d == digits[0]) {
		return Err(ValidationError::RepeatedDigits { cleaned: cleaned.to_owned() });
	}

	let values = digits.iter().map(|d| u32::from(d - b'0')).collect::<Vec<_>>();
	let first = check_digit(&values[..BASE_LEN]);
	let mut with_first = values[..BASE_LEN].to_vec();

	with_first.push(first);

	let second = check_digit(&with_first);

	if first != values[BASE_LEN] || second != values[BASE_LEN + 1] {
		return Err(ValidationError::InvalidCheckDigits { cleaned: cleaned.to_owned() });
	}

	Ok(())
}

// Weights run from `len + 1` down to 2.
fn check_digit(digits: &[u32]) -> u32 {
	let top = digits.len() as u32 + 1;
	let sum = digits.iter().enumerate().map(|(i, d)| d * (top - i as u32)).sum::<u32>();
	let remainder = sum % 11;

	if remainder < 2 { 0 } else { 11 - remainder }
}
