//! Provisions a CPF against the in-memory directory, then signs the same CPF in again to show
//! that the second request reuses the identity instead of creating it twice.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
// self
use cpf_broker::{
	cpf::Cpf,
	flows::{ProvisionSettings, Provisioner},
	idp::MemoryIdentityProvider,
	service::{RequestEnvelope, TokenService},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let idp = MemoryIdentityProvider::new().with_visibility_lag(Duration::from_millis(50));
	let settings = ProvisionSettings::default().with_propagation_delay(Duration::from_millis(100));
	let provisioner = Provisioner::new(Arc::new(idp.clone())).with_settings(settings);
	let cpf = Cpf::parse("123.456.789-09")?;
	let first = provisioner.obtain_token(&cpf).await?;

	println!("Provisioned {} and received a {} token.", cpf.masked(), first.token_type);

	let service = TokenService::new(provisioner);
	let response = service.handle(RequestEnvelope::with_query_identifier(cpf.formatted())).await;

	println!("Second request answered HTTP {}: {}", response.status, response.body_json()?);
	println!("Directory calls: {:?}.", idp.calls());

	Ok(())
}
