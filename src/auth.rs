//! Credential material: redacted secrets, the per-identifier derived password, and issued tokens.

pub mod derive;
pub mod secret;
pub mod token;

pub use derive::*;
pub use secret::*;
pub use token::*;
