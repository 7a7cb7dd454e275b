//! Minimal HTTP/1.0 client used to talk to the modem's web interface.
//!
//! Modem management pages are small and served one request per connection,
//! so requests are written with `Connection: close` and the whole reply is
//! read until EOF.

use crate::error::{LoggerError, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Per-request timeout applied by [`HttpTransport`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Host and port of the modem's management interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ModemAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ModemAddress {
    type Err = LoggerError;

    /// Accepts `host`, `host:port`, `[v6]:port` and an optional `http://`
    /// scheme with a trailing path that is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.to_ascii_lowercase().starts_with("https://") {
            return Err(LoggerError::config_error(format!(
                "modem address '{}': https is not supported",
                s
            )));
        }
        let without_scheme = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("HTTP://"))
            .unwrap_or(trimmed);
        let authority = without_scheme.split('/').next().unwrap_or_default();

        let invalid = || LoggerError::config_error(format!("invalid modem address '{}'", s));

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match after.strip_prefix(':') {
                Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
                None if after.is_empty() => 80,
                None => return Err(invalid()),
            };
            (host, port)
        } else {
            match authority.split_once(':') {
                Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
                None => (authority, 80),
            }
        };

        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// An outgoing request, independent of any connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub fn post_form(path: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(form_urlencode(fields)),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize for the wire.
    pub fn to_wire(&self, address: &ModemAddress) -> String {
        let mut out = format!(
            "{} {} HTTP/1.0\r\nHost: {}\r\nUser-Agent: bblogger/{}\r\nConnection: close\r\n",
            self.method.as_str(),
            self.path,
            address,
            env!("CARGO_PKG_VERSION")
        );
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        if let Some(body) = &self.body {
            out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
            out.push_str(body);
        } else {
            out.push_str("\r\n");
        }
        out
    }
}

/// A fully read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// `name=value` pairs from every `Set-Cookie`, joined into a `Cookie`
    /// request header value.
    pub fn cookie_header(&self) -> Option<String> {
        let pairs: Vec<&str> = self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("set-cookie"))
            .filter_map(|(_, v)| v.split(';').next())
            .map(str::trim)
            .filter(|pair| pair.contains('='))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Parse a raw HTTP/1.x response.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(raw);
        let (head, body) = match text.find("\r\n\r\n") {
            Some(idx) => (&text[..idx], &text[idx + 4..]),
            None => match text.find("\n\n") {
                Some(idx) => (&text[..idx], &text[idx + 2..]),
                None => return Err(LoggerError::transport_error("malformed HTTP response")),
            },
        };

        let mut lines = head.lines();
        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.split_whitespace();
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(LoggerError::transport_error(format!(
                "malformed status line '{}'",
                status_line
            )));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                LoggerError::transport_error(format!("malformed status line '{}'", status_line))
            })?;

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(Self {
            status,
            headers,
            body: body.to_string(),
        })
    }
}

/// Sends requests to the modem.
///
/// Failures to connect, send or read are reported as
/// [`LoggerError::Transport`]; status codes are left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, address: &ModemAddress, request: HttpRequest) -> Result<HttpResponse>;
}

/// Plain TCP transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    request_timeout: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, address: &ModemAddress, request: HttpRequest) -> Result<HttpResponse> {
        let wire = request.to_wire(address);
        tracing::debug!("{} http://{}{}", request.method.as_str(), address, request.path);

        let exchange = async {
            let mut stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
            stream.write_all(wire.as_bytes()).await?;
            stream.flush().await?;
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let raw = timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| {
                LoggerError::transport_error(format!(
                    "request to {}{} timed out after {:?}",
                    address, request.path, self.request_timeout
                ))
            })?
            .map_err(|e| {
                LoggerError::transport_error(format!("request to {}{}: {}", address, request.path, e))
            })?;

        HttpResponse::parse(&raw)
    }
}

/// Encode form fields as `application/x-www-form-urlencoded`.
pub fn form_urlencode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{}={}", encode_component(name), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
