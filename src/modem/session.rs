//! Authenticated access to the modem's status pages.

use crate::config::EffectiveConfig;
use crate::error::{LoggerError, Result};
use crate::modem::http::{HttpRequest, HttpResponse, HttpTransport, ModemAddress, Transport};
use crate::stats::parser::mentions_stat_labels;
use crate::stats::RawStatus;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

lazy_static! {
    static ref PASSWORD_INPUT: Regex =
        Regex::new(r#"(?i)<input[^>]*type\s*=\s*["']?password"#).expect("valid password input pattern");
}

/// Cookie-backed handle to an authenticated modem session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    address: ModemAddress,
    cookie: String,
}

impl Session {
    pub fn address(&self) -> &ModemAddress {
        &self.address
    }

    /// Value replayed in the `Cookie` header of every request.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

/// Logs in to the modem and fetches its status pages.
///
/// Owns the only [`Session`]; the session is reused for every fetch and
/// replaced when the modem stops accepting it.
pub struct ModemSession {
    transport: Box<dyn Transport>,
    address: ModemAddress,
    account: String,
    password: String,
    login_path: String,
    logout_path: String,
    status_paths: Vec<String>,
    session: Option<Session>,
}

impl ModemSession {
    /// Create a session manager for the configured modem over `transport`.
    pub fn new(config: &EffectiveConfig, transport: Box<dyn Transport>) -> Result<Self> {
        Ok(Self {
            transport,
            address: config.address.parse()?,
            account: config.account.clone(),
            password: config.password.clone(),
            login_path: config.login_path.clone(),
            logout_path: config.logout_path.clone(),
            status_paths: config.status_paths.clone(),
            session: None,
        })
    }

    /// Create a session manager using the plain HTTP transport.
    pub fn with_http(config: &EffectiveConfig) -> Result<Self> {
        Self::new(config, Box::new(HttpTransport::default()))
    }

    pub fn address(&self) -> &ModemAddress {
        &self.address
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Submit the login form and keep the issued session cookie.
    ///
    /// Any failure, including an unreachable modem, is an
    /// [`LoggerError::Auth`].
    pub async fn login(&mut self) -> Result<&Session> {
        self.session = None;
        debug!("Logging in to {} as {}", self.address, self.account);

        let request = HttpRequest::post_form(
            self.login_path.as_str(),
            &[
                ("username", self.account.as_str()),
                ("password", self.password.as_str()),
            ],
        );
        let response = self
            .transport
            .send(&self.address, request)
            .await
            .map_err(|e| LoggerError::auth_error(format!("modem {} unreachable: {}", self.address, e)))?;

        if matches!(response.status, 401 | 403)
            || self.redirects_to_login(&response)
            || looks_like_login_page(&response.body)
        {
            return Err(LoggerError::auth_error(format!(
                "modem {} rejected the credentials for '{}'",
                self.address, self.account
            )));
        }
        if !(response.is_success() || response.is_redirect()) {
            return Err(LoggerError::auth_error(format!(
                "login to {} failed with HTTP {}",
                self.address, response.status
            )));
        }
        let cookie = response.cookie_header().ok_or_else(|| {
            LoggerError::auth_error(format!("modem {} did not issue a session cookie", self.address))
        })?;

        info!("Logged in to modem {}", self.address);
        Ok(self.session.insert(Session {
            address: self.address.clone(),
            cookie,
        }))
    }

    /// Fetch every status page with the current session.
    ///
    /// Returns [`LoggerError::SessionExpired`] when there is no session or the
    /// modem answers with its login page, and [`LoggerError::Transport`] for
    /// network failures and other unsuccessful replies.
    pub async fn fetch(&self) -> Result<RawStatus> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| LoggerError::session_expired("not logged in"))?;

        let mut raw = RawStatus::default();
        for path in &self.status_paths {
            let request = HttpRequest::get(path.as_str()).with_header("Cookie", session.cookie());
            let response = self.transport.send(session.address(), request).await?;

            if matches!(response.status, 401 | 403) || self.redirects_to_login(&response) {
                return Err(LoggerError::session_expired(format!(
                    "{} answered HTTP {}",
                    path, response.status
                )));
            }
            if !response.is_success() {
                return Err(LoggerError::transport_error(format!(
                    "GET {} returned HTTP {}",
                    path, response.status
                )));
            }
            // Status pages may carry a change-password form of their own.
            if looks_like_login_page(&response.body) && !mentions_stat_labels(&response.body) {
                return Err(LoggerError::session_expired(format!(
                    "{} served the login page",
                    path
                )));
            }
            raw.push_page(&response.body);
        }
        Ok(raw)
    }

    /// Fetch for one poll tick, logging in again once if the session expired.
    ///
    /// A failed re-login, or a session rejected straight after logging in,
    /// is reported as [`LoggerError::Auth`].
    pub async fn poll(&mut self) -> Result<RawStatus> {
        match self.fetch().await {
            Err(LoggerError::SessionExpired(reason)) => {
                warn!("Modem session expired ({}), logging in again", reason);
                self.login().await?;
                match self.fetch().await {
                    Err(LoggerError::SessionExpired(reason)) => Err(LoggerError::auth_error(
                        format!("session rejected right after login: {}", reason),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Best-effort logout; the session is discarded either way.
    pub async fn logout(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let request =
            HttpRequest::get(self.logout_path.as_str()).with_header("Cookie", session.cookie());
        match self.transport.send(session.address(), request).await {
            Ok(response) => debug!("Logout returned HTTP {}", response.status),
            Err(e) => debug!("Logout failed: {}", e),
        }
    }

    fn redirects_to_login(&self, response: &HttpResponse) -> bool {
        response.is_redirect()
            && response
                .header("location")
                .is_some_and(|location| location.contains(self.login_path.as_str()))
    }
}

/// Whether a page is a login form rather than content.
pub fn looks_like_login_page(body: &str) -> bool {
    PASSWORD_INPUT.is_match(body)
}
