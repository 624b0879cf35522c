use log::{debug, error};
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde_json::Value;

use crate::error::{Error, Result};

/// A single API request, pre-populated with its target URL and (when a
/// credential was available) a bearer `Authorization` header.
///
/// Each verb issues the request and resolves to the parsed JSON body.
/// Non-success statuses become [`Error::Api`] with the status and raw body;
/// transport failures surface unchanged as [`Error::Http`]. Endpoints that
/// reply with an empty body resolve to `Value::Null`.
pub struct ApiRequest {
    http: reqwest::Client,
    url: String,
    authorization: Option<String>,
}

impl ApiRequest {
    pub fn new(http: reqwest::Client, url: String, authorization: Option<String>) -> Self {
        Self {
            http,
            url,
            authorization,
        }
    }

    #[allow(dead_code)]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_authorized(&self) -> bool {
        self.authorization.is_some()
    }

    pub async fn get(&self, query: Option<&Value>) -> Result<Value> {
        self.send(Method::GET, None, query).await
    }

    pub async fn post(&self, body: Option<&Value>, query: Option<&Value>) -> Result<Value> {
        self.send(Method::POST, body, query).await
    }

    pub async fn put(&self, body: Option<&Value>) -> Result<Value> {
        self.send(Method::PUT, body, None).await
    }

    pub async fn delete(&self, query: Option<&Value>) -> Result<Value> {
        self.send(Method::DELETE, None, query).await
    }

    async fn send(
        &self,
        method: Method,
        body: Option<&Value>,
        query: Option<&Value>,
    ) -> Result<Value> {
        let mut builder = self.http.request(method.clone(), &self.url);

        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!("{} {}", method, self.url);

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("{} {} failed with status {}", method, self.url, status);
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(Error::from)
    }
}
