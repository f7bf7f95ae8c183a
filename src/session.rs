//! Login, authenticated requests and logout.

use crate::config::Credentials;
use crate::endpoints::Endpoints;
use crate::error::{MubiError, Result};
use crate::http::{Head, Page, Transport};
use crate::parse::Parser;
use tracing::{debug, info, warn};

/// One logged-in account. All requests share its cookies.
pub struct Session<T> {
    transport: T,
    user_id: String,
    username: String,
    logout_url: String,
}

impl<T: Transport> Session<T> {
    /// Reads the anti-forgery token from the login form, submits it with the
    /// credentials, and takes the user id from the landing page.
    pub async fn login(
        transport: T,
        endpoints: &Endpoints,
        parser: &Parser,
        credentials: &Credentials,
    ) -> Result<Self> {
        let login_page = transport.get(&endpoints.login()).await?.into_body()?;
        let token = parser
            .auth_token(&login_page)
            .ok_or_else(|| MubiError::Auth("login form carries no authenticity token".into()))?;

        debug!(user = %credentials.username, "submitting login form");
        let form = [
            ("utf8", "✓"),
            ("authenticity_token", token.as_str()),
            ("email", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("x", "0"),
            ("y", "0"),
        ];
        let landing = transport.post_form(&endpoints.session(), &form).await?;
        let user_id = parser.user_id(&landing.body).ok_or_else(|| {
            MubiError::Auth(format!(
                "no user avatar on {} (HTTP {}); credentials rejected?",
                landing.url, landing.status
            ))
        })?;
        info!(user = %credentials.username, user_id = %user_id, "logged in");

        Ok(Self {
            transport,
            user_id,
            username: credentials.username.clone(),
            logout_url: endpoints.logout(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn get(&self, url: &str) -> Result<Page> {
        self.transport.get(url).await
    }

    /// Body of a page that must exist.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.transport.get(url).await?.into_body()
    }

    pub async fn head(&self, url: &str) -> Result<Head> {
        self.transport.head(url).await
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Best effort; failures are logged and otherwise ignored.
    pub async fn logout(self) {
        match self.transport.get(&self.logout_url).await {
            Ok(page) if page.is_success() => info!(user = %self.username, "logged out"),
            Ok(page) => warn!(status = page.status, "logout answered with an error status"),
            Err(err) => warn!(error = %err, "logout failed"),
        }
        self.transport.clear_cookies();
    }
}
