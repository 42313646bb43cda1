use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::api::ApiError;

const USER_AGENT: &str = concat!("vaxkit-core/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the backend calls.
///
/// Every request gets the configured timeout and the crate's user agent. Rate
/// limiting, server errors, timeouts and refused connections are retried with
/// exponential backoff; any other outcome is returned as is.
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    pub(crate) fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_retries,
        }
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.builder(Method::GET, url)
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.builder(Method::POST, url)
    }

    fn builder(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }

    /// Sends `request`, retrying transient failures.
    ///
    /// A request whose body cannot be cloned is sent exactly once.
    pub(crate) async fn handle(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let Some(template) = request.try_clone() else {
            return send(request).await.map_err(Failure::into_error);
        };

        let attempt = || async {
            match template.try_clone() {
                Some(request) => send(request).await,
                None => Err(Failure::Fatal(ApiError::Network {
                    url: "<unknown>".to_string(),
                    status: None,
                    error: "request body cannot be replayed".to_string(),
                })),
            }
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        attempt
            .retry(backoff)
            .when(Failure::is_transient)
            .notify(|failure: &Failure, delay: Duration| {
                log::debug!("retrying in {delay:?}: {}", failure.error());
            })
            .await
            .map_err(Failure::into_error)
    }
}

/// Outcome of one failed attempt.
#[derive(Debug)]
enum Failure {
    Transient(ApiError),
    Fatal(ApiError),
}

impl Failure {
    const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    const fn error(&self) -> &ApiError {
        match self {
            Self::Transient(error) | Self::Fatal(error) => error,
        }
    }

    fn into_error(self) -> ApiError {
        match self {
            Self::Transient(error) | Self::Fatal(error) => error,
        }
    }
}

async fn send(request: RequestBuilder) -> Result<Response, Failure> {
    let (client, request) = request.build_split();
    let request = request.map_err(|err| {
        Failure::Fatal(network_error(
            err.url().map(ToString::to_string),
            None,
            format!("invalid request: {err}"),
        ))
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(response) if is_transient_status(response.status().as_u16()) => {
            let status = response.status().as_u16();
            Err(Failure::Transient(network_error(
                Some(url),
                Some(status),
                format!("server answered {status}"),
            )))
        }
        Ok(response) => Ok(response),
        Err(err) if err.is_timeout() || is_connect_error(&err) => Err(Failure::Transient(
            network_error(Some(url), None, format!("unreachable: {err}")),
        )),
        Err(err) => Err(Failure::Fatal(network_error(
            Some(url),
            None,
            format!("request failed: {err}"),
        ))),
    }
}

const fn is_transient_status(status: u16) -> bool {
    status == 429 || status >= 500
}

fn network_error(url: Option<String>, status: Option<u16>, error: String) -> ApiError {
    ApiError::Network {
        url: url.unwrap_or_else(|| "<unknown>".to_string()),
        status,
        error,
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn is_connect_error(err: &reqwest::Error) -> bool {
    err.is_connect()
}

// The fetch backend does not distinguish connection failures.
#[cfg(target_arch = "wasm32")]
const fn is_connect_error(_err: &reqwest::Error) -> bool {
    false
}
