//! Runs the HTTP directory provider against a local mock directory and token endpoint, wiring
//! everything from `CPF_BROKER_*` style configuration.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use cpf_broker::{
	config::BrokerConfig,
	service::{RequestEnvelope, TokenService},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let lookup = server
		.mock_async(|when, then| {
			when.method(GET).path("/admin/users/52998224725");
			then.status(404);
		})
		.await;
	let create = server
		.mock_async(|when, then| {
			when.method(POST).path("/admin/users");
			then.status(201).header("content-type", "application/json").body("{\"id\":\"demo-user\"}");
		})
		.await;
	let promote = server
		.mock_async(|when, then| {
			when.method(PUT).path("/admin/users/52998224725/password");
			then.status(204);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"id_token\":\"demo-identity\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let users = server.url("/admin/users");
	let token_endpoint = server.url("/oauth2/token");
	let config = BrokerConfig::from_lookup(|name| match name {
		"CPF_BROKER_USERS_ENDPOINT" => Some(users.clone()),
		"CPF_BROKER_TOKEN_ENDPOINT" => Some(token_endpoint.clone()),
		"CPF_BROKER_CLIENT_ID" => Some("demo-client".into()),
		"CPF_BROKER_CLIENT_SECRET" => Some("demo-secret".into()),
		"CPF_BROKER_ADMIN_TOKEN" => Some("demo-admin".into()),
		"CPF_BROKER_PROPAGATION_DELAY_MS" => Some("250".into()),
		_ => None,
	})?;
	let service = TokenService::from_config(&config)?;
	let response = service.handle_json(br#"{"body":"{\"cpf\":\"529.982.247-25\"}"}"#).await;

	println!("HTTP {}: {}", response.status, response.body_json()?);

	lookup.assert_async().await;
	create.assert_async().await;
	promote.assert_async().await;
	token.assert_async().await;

	Ok(())
}
