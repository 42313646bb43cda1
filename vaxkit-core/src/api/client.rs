use std::sync::RwLock;
use std::time::Duration;

use alloy_primitives::Address;
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{ApiError, AuthApi, AuthorizationContext, Registry, RoleRegistry, TokenRequest};
use crate::{config::SessionConfig, credential::Credential, http_request::Request};

#[derive(Serialize)]
struct TokenBody<'a> {
    address: String,
    message: &'a str,
    signature: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: String,
}

#[derive(Deserialize)]
struct AuthorizedResponse {
    authorized: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "message")]
    detail: String,
}

/// REST client for the HBV Tracker backend.
///
/// Holds the global authorization context: once a token is installed through
/// [`AuthorizationContext`] every request sent through [`ApiClient::get`] and
/// [`ApiClient::post`] carries it.
pub struct ApiClient {
    request: Request,
    config: SessionConfig,
    bearer: RwLock<Option<SecretString>>,
}

impl ApiClient {
    /// Creates a client for the backend described by `config`.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            request: Request::new(
                Duration::from_millis(config.request_timeout_ms),
                config.max_retries,
            ),
            config: config.clone(),
            bearer: RwLock::new(None),
        }
    }

    /// Returns whether a bearer token is installed.
    #[must_use]
    pub fn has_authorization(&self) -> bool {
        self.bearer
            .read()
            .map(|bearer| bearer.is_some())
            .unwrap_or_default()
    }

    /// Creates a GET request to `path` carrying the installed bearer, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.request.get(&self.config.endpoint(path)))
    }

    /// Creates a POST request to `path` carrying the installed bearer, if any.
    #[must_use]
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.request.post(&self.config.endpoint(path)))
    }

    /// Sends `request_builder` and decodes a JSON body.
    ///
    /// # Errors
    /// `ApiError::Network` on transport failure, `ApiError::Rejected` for non-success
    /// statuses and `ApiError::Decode` for unexpected bodies.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.request.handle(request_builder).await?;
        decode(response).await
    }

    fn authorize(&self, request_builder: RequestBuilder) -> RequestBuilder {
        match self.bearer.read() {
            Ok(bearer) => match bearer.as_ref() {
                Some(token) => request_builder.bearer_auth(token.expose_secret()),
                None => request_builder,
            },
            Err(_) => request_builder,
        }
    }

    fn registry_path(&self, registry: Registry, account: Address) -> String {
        let template = match registry {
            Registry::Provider => &self.config.provider_registry_path,
            Registry::Researcher => &self.config.researcher_registry_path,
        };
        template.replace("{address}", &account.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Decode(format!("failed to read body: {e}")))?;

    if !status.is_success() {
        let reason = serde_json::from_str::<ErrorBody>(&body)
            .map(|error| error.detail)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("An error occurred")
                    .to_string()
            });
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            reason,
        });
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

impl AuthApi for ApiClient {
    async fn issue_token(&self, request: &TokenRequest<'_>) -> Result<String, ApiError> {
        let body = TokenBody {
            address: request.address.to_string(),
            message: request.message,
            signature: request.signature.to_hex(),
        };
        // The verifier is called without the global bearer: a stale token from a
        // previous session must not accompany a new login.
        let request_builder = self
            .request
            .post(&self.config.endpoint("/auth/token"))
            .json(&body);
        let response: TokenResponse = self.send_json(request_builder).await?;
        Ok(response.access_token)
    }

    async fn verify_token(&self, credential: &Credential) -> Result<bool, ApiError> {
        let request_builder = self
            .request
            .get(&self.config.endpoint("/auth/verify"))
            .bearer_auth(credential.expose_token());
        self.send_json(request_builder).await
    }
}

impl RoleRegistry for ApiClient {
    async fn is_authorized(
        &self,
        registry: Registry,
        account: Address,
        credential: &Credential,
    ) -> Result<bool, ApiError> {
        let request_builder = self
            .request
            .get(&self.config.endpoint(&self.registry_path(registry, account)))
            .bearer_auth(credential.expose_token());
        let response: AuthorizedResponse = self.send_json(request_builder).await?;
        Ok(response.authorized)
    }
}

impl AuthorizationContext for ApiClient {
    fn set_authorization_token(&self, credential: &Credential) {
        match self.bearer.write() {
            Ok(mut bearer) => {
                *bearer = Some(SecretString::from(credential.expose_token().to_string()));
            }
            Err(_) => log::error!("authorization context poisoned, token not installed"),
        }
    }

    fn clear_authorization_token(&self) {
        match self.bearer.write() {
            Ok(mut bearer) => *bearer = None,
            Err(_) => log::error!("authorization context poisoned, token not cleared"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{challenge::WalletSignature, credential::encode_unsigned_token};
    use mockito::Matcher;
    use serde_json::json;

    const ALICE: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    fn client_for(server: &mockito::Server) -> ApiClient {
        let config = SessionConfig {
            api_base_url: format!("{}/api", server.url()),
            max_retries: 0,
            ..SessionConfig::default()
        };
        ApiClient::new(&config)
    }

    fn credential() -> Credential {
        Credential::parse(&encode_unsigned_token(&json!({
            "sub": ALICE,
            "iat": 1u64,
            "exp": 4_000_000_000u64,
        })))
        .unwrap()
    }

    #[tokio::test]
    async fn test_issue_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/token")
            .match_body(Matcher::PartialJson(json!({
                "address": ALICE,
                "message": "hello",
                "signature": "0x0102",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "abc.def.ghi", "token_type": "bearer"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let signature = WalletSignature::new(vec![1, 2]);
        let token = client
            .issue_token(&TokenRequest {
                address: ALICE.parse().unwrap(),
                message: "hello",
                signature: &signature,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token, "abc.def.ghi");
        drop(server);
    }

    #[tokio::test]
    async fn test_issue_token_rejected_reports_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/token")
            .with_status(401)
            .with_body(r#"{"detail": "Invalid signature"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let signature = WalletSignature::new(vec![0; 65]);
        let err = client
            .issue_token(&TokenRequest {
                address: ALICE.parse().unwrap(),
                message: "hello",
                signature: &signature,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ApiError::Rejected {
                status: 401,
                reason: "Invalid signature".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_registry_lookup_uses_given_credential() {
        let mut server = mockito::Server::new_async().await;
        let credential = credential();
        let mock = server
            .mock(
                "GET",
                format!("/api/blockchain/researcher/{ALICE}/authorized").as_str(),
            )
            .match_header(
                "authorization",
                format!("Bearer {}", credential.expose_token()).as_str(),
            )
            .with_status(200)
            .with_body(r#"{"authorized": true}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(!client.has_authorization());
        let authorized = client
            .is_authorized(Registry::Researcher, ALICE.parse().unwrap(), &credential)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(authorized);
    }

    #[tokio::test]
    async fn test_installed_bearer_accompanies_requests() {
        let mut server = mockito::Server::new_async().await;
        let credential = credential();
        let with_bearer = server
            .mock("GET", "/api/blockchain/address")
            .match_header(
                "authorization",
                format!("Bearer {}", credential.expose_token()).as_str(),
            )
            .with_status(200)
            .with_body(r#"{"address": "0x0"}"#)
            .expect(1)
            .create_async()
            .await;
        let without_bearer = server
            .mock("GET", "/api/blockchain/address")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .with_body(r#"{"detail": "Not authenticated"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        client.set_authorization_token(&credential);
        let _: serde_json::Value = client
            .send_json(client.get("/blockchain/address"))
            .await
            .unwrap();

        client.clear_authorization_token();
        let err = client
            .send_json::<serde_json::Value>(client.get("/blockchain/address"))
            .await
            .unwrap_err();

        with_bearer.assert_async().await;
        without_bearer.assert_async().await;
        assert!(matches!(err, ApiError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_verify_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/auth/verify")
            .with_status(200)
            .with_body("false")
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(!client.verify_token(&credential()).await.unwrap());
    }
}
