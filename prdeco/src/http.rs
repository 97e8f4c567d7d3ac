use std::time::Duration;

use reqwest::header::{ACCEPT, LINK};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("prdeco/", env!("CARGO_PKG_VERSION"));
const BODY_EXCERPT_CHARS: usize = 512;

/// How a client proves its identity on every request.
#[derive(Clone)]
pub enum Auth {
    None,
    Bearer(String),
    /// GitLab's `PRIVATE-TOKEN` header.
    PrivateToken(String),
    Basic { username: String, password: String },
}

/// Thin JSON client shared by all host integrations.
///
/// Any non-2xx answer becomes [`Error::Status`]; nothing is retried.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    auth: Auth,
    accept: &'static str,
}

impl ApiClient {
    pub fn new(auth: Auth) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            auth,
            accept: "application/json",
        })
    }

    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.http.request(method, url).header(ACCEPT, self.accept);
        match &self.auth {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::PrivateToken(token) => request.header("PRIVATE-TOKEN", token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }

    #[instrument(skip(self, body), fields(method = %method))]
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let mut request = self.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| Error::Request {
            method: method.clone(),
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                method,
                url: url.to_string(),
                status,
                body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
            });
        }
        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(Method::GET, url, None::<&()>).await?;
        decode(url, response).await
    }

    /// Fetches one page and the `rel="next"` target of its `Link` header.
    pub async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<(T, Option<String>)> {
        let response = self.send(Method::GET, url, None::<&()>).await?;
        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| crate::paginate::next_link(Some(value)));
        let page = decode(url, response).await?;
        Ok((page, next))
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, url, Some(body)).await?;
        decode(url, response).await
    }

    /// POST without a request body, decoding the answer.
    pub async fn post_empty<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(Method::POST, url, None::<&()>).await?;
        decode(url, response).await
    }

    pub async fn patch_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PATCH, url, Some(body)).await?;
        decode(url, response).await
    }

    /// Sends a request and ignores whatever body comes back.
    pub async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<()> {
        self.send(method, url, body).await.map(drop)
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.execute(Method::DELETE, url, None::<&()>).await
    }
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::MalformedResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| Error::MalformedResponse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
