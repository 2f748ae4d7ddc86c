// Backend joke proxy
//
// Fetches one random joke and wraps it in an API Gateway proxy response.
// Any failure on the way (connect, timeout, non-2xx, bad JSON) becomes a 500
// carrying the error text.

use async_trait::async_trait;
use aws_lambda_events::apigw::ApiGatewayProxyResponse;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::response::{build_api_gateway_response, HttpResponseData};

pub const DEFAULT_JOKE_API_URL: &str = "https://api.chucknorris.io/jokes/random";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("Joke API returned no joke text")]
    EmptyJoke,
}

#[async_trait]
pub trait JokeSource: Send + Sync {
    async fn fetch_joke(&self) -> Result<String, BackendError>;
}

#[derive(Debug, Deserialize)]
struct JokePayload {
    value: String,
}

pub struct HttpJokeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpJokeSource {
    pub fn new(url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(url, REQUEST_TIMEOUT)
    }

    /// Whole-request timeout, connect through body
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Uses `JOKE_API_URL` when set
    pub fn from_env() -> Result<Self, BackendError> {
        let url = std::env::var("JOKE_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_JOKE_API_URL.to_string());
        Self::new(url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl JokeSource for HttpJokeSource {
    async fn fetch_joke(&self) -> Result<String, BackendError> {
        let payload: JokePayload = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if payload.value.is_empty() {
            return Err(BackendError::EmptyJoke);
        }
        Ok(payload.value)
    }
}

pub async fn handle_backend<J: JokeSource + ?Sized>(source: &J) -> ApiGatewayProxyResponse {
    let data = match source.fetch_joke().await {
        Ok(joke) => HttpResponseData::json(
            200,
            json!({ "message": "Joke fetched successfully", "joke": joke }).to_string(),
        ),
        Err(err) => {
            tracing::error!("Failed to fetch joke: {}", err);
            HttpResponseData::json(
                500,
                json!({ "message": "Failed to fetch joke", "error": err.to_string() }).to_string(),
            )
        }
    };
    build_api_gateway_response(data)
}
