// std
use std::sync::Arc;
// crates.io
use serde_json::{Value, json};
// self
use cpf_broker::{
	flows::{ProvisionSettings, Provisioner},
	idp::MemoryIdentityProvider,
	service::{OutcomeCategory, RequestEnvelope, SUCCESS_MESSAGE, TokenService},
};

fn service(idp: MemoryIdentityProvider) -> TokenService<MemoryIdentityProvider> {
	let settings = ProvisionSettings::default().with_propagation_delay(Default::default());

	TokenService::new(Provisioner::new(Arc::new(idp)).with_settings(settings))
}

fn payload(response: &cpf_broker::service::ServiceResponse) -> Value {
	serde_json::from_str(&response.body_json().expect("Payload should serialize."))
		.expect("Payload should be JSON.")
}

#[tokio::test]
async fn string_body_is_provisioned_and_rendered() {
	let envelope = json!({
		"httpMethod": "POST",
		"body": "{\"cpf\":\"123.456.789-09\"}",
	});
	let response = service(MemoryIdentityProvider::new())
		.handle_json(envelope.to_string().as_bytes())
		.await;
	let body = payload(&response);

	assert_eq!(response.status, 200);
	assert_eq!(response.headers.get("Content-Type").map(String::as_str), Some("application/json"));
	assert_eq!(response.headers.get("Access-Control-Allow-Origin").map(String::as_str), Some("*"));
	assert_eq!(body["success"], true);
	assert_eq!(body["message"], SUCCESS_MESSAGE);
	assert_eq!(body["cleanedIdentifier"], "12345678909");
	assert_eq!(body["tokenType"], "Bearer");
	assert_eq!(body["expiresIn"], 3600);
	assert!(body["token"].as_str().is_some_and(|token| !token.is_empty()));
	assert!(body.get("error").is_none());
}

#[tokio::test]
async fn direct_field_and_query_are_accepted() {
	let service = service(MemoryIdentityProvider::new());
	let direct = service.handle_json(br#"{"cpf":"11144477735"}"#).await;
	let query = service
		.handle_json(br#"{"httpMethod":"GET","queryStringParameters":{"cpf":"111.444.777-35"}}"#)
		.await;

	assert_eq!(direct.status, 200);
	assert_eq!(query.status, 200);
	assert_eq!(query.body.cleaned_identifier.as_deref(), Some("11144477735"));
}

#[tokio::test]
async fn input_problems_map_to_client_errors() {
	let service = service(MemoryIdentityProvider::new());
	let cases: [(&[u8], u16, OutcomeCategory); 5] = [
		(br#"{}"#, 400, OutcomeCategory::BadInput),
		(br#"{"body":"{broken"}"#, 400, OutcomeCategory::BadInput),
		(br#"{"body":{"name":"no identifier"}}"#, 400, OutcomeCategory::BadInput),
		(br#"{"httpMethod":"PATCH","cpf":"11144477735"}"#, 405, OutcomeCategory::BadInput),
		(br#"{"cpf":"111.111.111-11"}"#, 400, OutcomeCategory::InvalidIdentifier),
	];

	for (raw, status, category) in cases {
		let response = service.handle_json(raw).await;
		let body = payload(&response);

		assert_eq!(response.status, status, "status for {}", String::from_utf8_lossy(raw));
		assert_eq!(response.body.error, Some(category));
		assert_eq!(body["success"], false);
		assert!(body["message"].as_str().is_some_and(|message| !message.is_empty()));
		assert!(!response.headers.contains_key("Access-Control-Allow-Origin"));
	}

	let invalid = service.handle(RequestEnvelope::with_body_identifier("111.111.111-11")).await;

	assert_eq!(invalid.body.message, "CPF digits must not all be identical.");
	assert_eq!(invalid.body.identifier.as_deref(), Some("111.111.111-11"));

	let checksum = service.handle(RequestEnvelope::with_body_identifier("123.456.789-00")).await;
	let body = payload(&checksum);

	assert_eq!(body["message"], "CPF check digits are invalid.");
	assert_eq!(body["identifier"], "123.456.789-00");
	assert_eq!(body["cleanedIdentifier"], "12345678900");

	let missing = service.handle(RequestEnvelope::default()).await;

	assert!(missing.body.message.starts_with("CPF not provided"));
}

#[tokio::test]
async fn provider_failures_map_to_server_errors() {
	let response = service(MemoryIdentityProvider::new().unavailable())
		.handle(RequestEnvelope::with_body_identifier("111.444.777-35"))
		.await;
	let body = payload(&response);

	assert_eq!(response.status, 500);
	assert_eq!(body["error"], "providerFailure");
	assert_eq!(body["cleanedIdentifier"], "11144477735");
	assert!(body.get("token").is_none());

	let rejected = service(MemoryIdentityProvider::new().rejecting_authentication())
		.handle(RequestEnvelope::with_body_identifier("111.444.777-35"))
		.await;

	assert_eq!(rejected.status, 500);
	assert!(rejected.body.message.starts_with("Authentication failed after provisioning"));
}
