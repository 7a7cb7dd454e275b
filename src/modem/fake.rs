//! In-process stand-in for a modem's web interface.
//!
//! [`FakeModem`] answers logins with a session cookie and serves a fixed
//! status page, with optional one-off replies queued ahead of it. Clones
//! share state, so a test can keep a handle after boxing one into a
//! [`ModemSession`](crate::modem::ModemSession).

use crate::error::{LoggerError, Result};
use crate::modem::http::{HttpRequest, HttpResponse, Method, ModemAddress, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    logins: u32,
    queued: VecDeque<Result<HttpResponse>>,
    requests: Vec<HttpRequest>,
}

/// Scriptable [`Transport`] serving one status page.
#[derive(Clone)]
pub struct FakeModem {
    page: Arc<str>,
    login_path: Arc<str>,
    logout_path: Arc<str>,
    state: Arc<Mutex<State>>,
}

impl FakeModem {
    /// A modem at the default login/logout paths serving `page` for every
    /// status request.
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: Arc::from(page.into()),
            login_path: Arc::from("/cgi-bin/login.cgi"),
            logout_path: Arc::from("/cgi-bin/logout.cgi"),
            state: Arc::default(),
        }
    }

    /// Answer the next status request with `reply` instead of the page.
    pub fn queue(&self, reply: Result<HttpResponse>) -> &Self {
        self.lock().queued.push_back(reply);
        self
    }

    /// Number of successful logins so far.
    pub fn logins(&self) -> u32 {
        self.lock().logins
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread is the only way to poison this lock.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for FakeModem {
    async fn send(&self, _address: &ModemAddress, request: HttpRequest) -> Result<HttpResponse> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        if request.method == Method::Post && request.path == *self.login_path {
            state.logins += 1;
            return Ok(HttpResponse::new(302, "")
                .with_header("Location", "/index.htm")
                .with_header("Set-Cookie", format!("SESSION={}; path=/", state.logins)));
        }
        if request.path == *self.logout_path {
            return Ok(HttpResponse::new(200, "bye"));
        }
        if request.header("cookie").is_none() {
            return Err(LoggerError::transport_error("request without session cookie"));
        }
        match state.queued.pop_front() {
            Some(reply) => reply,
            None => Ok(HttpResponse::new(200, &*self.page)),
        }
    }
}
