//! HTTP plumbing shared by the session and the catalog.
//!
//! Every request goes through [`Transport`], which keeps one cookie jar for the
//! whole process and stamps each request with the configured user agent.

use crate::error::{MubiError, Result};
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, redirect};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A fetched page after redirects were followed.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    /// Final URL once redirects were followed.
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a page the caller cannot do without.
    pub fn into_body(self) -> Result<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(MubiError::Status {
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// Answer to a HEAD request that was not allowed to follow redirects.
#[derive(Debug, Clone)]
pub struct Head {
    pub status: u16,
    pub location: Option<String>,
}

impl Head {
    /// Anything below 400 counts, redirects included.
    pub fn is_ok(&self) -> bool {
        self.status < 400
    }
}

/// The only way the client reaches the network.
///
/// Non-success statuses are returned, not raised, so callers can tell a
/// missing page apart from a broken connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Page>;

    /// HEAD without following redirects.
    async fn head(&self, url: &str) -> Result<Head>;

    /// POST an urlencoded form and follow the redirect that usually answers it.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page>;

    /// Forget every cookie collected so far (default: no-op)
    fn clear_cookies(&self) {}
}

/// Cookie jar shared by both reqwest clients.
#[derive(Default)]
pub struct SessionJar(Mutex<cookie_store::CookieStore>);

impl SessionJar {
    pub fn clear(&self) {
        if let Ok(mut store) = self.0.lock() {
            store.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.0
            .lock()
            .map(|store| store.iter_unexpired().count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl reqwest::cookie::CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &url::Url) {
        let cookies = cookie_headers.filter_map(|value| {
            let raw = std::str::from_utf8(value.as_bytes()).ok()?;
            cookie_store::RawCookie::parse(raw.to_owned()).ok()
        });
        if let Ok(mut store) = self.0.lock() {
            store.store_response_cookies(cookies, url);
        }
    }

    fn cookies(&self, url: &url::Url) -> Option<HeaderValue> {
        let store = self.0.lock().ok()?;
        let header = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            None
        } else {
            HeaderValue::from_str(&header).ok()
        }
    }
}

/// [`Transport`] backed by reqwest.
pub struct ReqwestTransport {
    client: Client,
    no_redirect: Client,
    jar: Arc<SessionJar>,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let jar = Arc::new(SessionJar::default());
        let client = Client::builder().cookie_provider(jar.clone()).build()?;
        let no_redirect = Client::builder()
            .cookie_provider(jar.clone())
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            no_redirect,
            jar,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn jar(&self) -> &SessionJar {
        &self.jar
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<Page> {
        debug!(url, "GET");
        let resp = self
            .client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp.text().await?;
        Ok(Page { status, url, body })
    }

    async fn head(&self, url: &str) -> Result<Head> {
        debug!(url, "HEAD");
        let resp = self
            .no_redirect
            .head(url)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Head {
            status: resp.status().as_u16(),
            location,
        })
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page> {
        debug!(url, "POST");
        let resp = self
            .client
            .post(url)
            .header(header::USER_AGENT, &self.user_agent)
            .form(form)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp.text().await?;
        Ok(Page { status, url, body })
    }

    fn clear_cookies(&self) {
        self.jar.clear();
    }
}
