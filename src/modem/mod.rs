//! Access to the modem's web management interface.
//!
//! [`ModemSession`] logs in with the configured account, keeps the session
//! cookie the modem issues and replays it on every status page request.
//! Requests go through the [`Transport`] trait so the session logic can be
//! exercised without a real modem.

pub mod fake;
pub mod http;
pub mod session;

// Re-export commonly used items
pub use fake::FakeModem;
pub use http::{HttpRequest, HttpResponse, HttpTransport, ModemAddress, Transport};
pub use session::{ModemSession, Session};
