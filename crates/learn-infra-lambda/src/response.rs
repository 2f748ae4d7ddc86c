// Response builders for Lambda
//
// The backend proxy answers API Gateway proxy integrations; the trigger
// function returns a bare `{statusCode, body}` object to its direct invoker.

use aws_lambda_events::{
    apigw::ApiGatewayProxyResponse,
    encodings::Body,
    http::{header::CONTENT_TYPE, HeaderValue},
};
use serde::Serialize;

/// Internal HTTP response data
pub(crate) struct HttpResponseData {
    pub status_code: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl HttpResponseData {
    pub fn json(status_code: u16, body: String) -> Self {
        Self {
            status_code,
            body,
            content_type: "application/json",
        }
    }
}

/// Build API Gateway v1 response from internal response data
pub(crate) fn build_api_gateway_response(data: HttpResponseData) -> ApiGatewayProxyResponse {
    let mut response = ApiGatewayProxyResponse {
        status_code: data.status_code as i64,
        headers: Default::default(),
        multi_value_headers: Default::default(),
        body: Some(Body::Text(data.body)),
        is_base64_encoded: false,
    };
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static(data.content_type));
    response
}

/// Trigger function result. `body` holds a JSON-encoded string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub status_code: u16,
    pub body: String,
}

impl TriggerResponse {
    pub fn processed() -> Self {
        Self {
            status_code: 200,
            body: serde_json::Value::from("Processed").to_string(),
        }
    }
}
