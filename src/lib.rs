//! CPF-keyed token broker: validate a Brazilian taxpayer identifier, provision the matching
//! identity in an external identity provider on first use, and hand back a bearer token.
//!
//! The crate is split the same way the request flows through it:
//!
//! - [`cpf`] normalizes and checksum-validates raw identifiers.
//! - [`auth`] derives the deterministic per-identifier credential and models issued tokens.
//! - [`idp`] defines the [`idp::IdentityProvider`] capability plus in-memory and HTTP backends.
//! - [`flows`] hosts the [`flows::Provisioner`] state machine that turns a valid CPF into a token.
//! - [`service`] maps request envelopes to validated calls and status-coded responses.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod cpf;
pub mod error;
pub mod flows;
#[cfg(feature = "reqwest")] pub mod http;
pub mod idp;
pub mod obs;
pub mod service;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
