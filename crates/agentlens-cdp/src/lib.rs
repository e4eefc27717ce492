//! # agentlens-cdp — Chrome DevTools Protocol client
//!
//! Low-level CDP transport for the agentlens workspace: a WebSocket
//! connection that correlates commands with responses, broadcasts events,
//! and speaks the typed subset of protocol domains the coordination layer
//! drives.
//!
//! ## Connecting
//!
//! ```no_run
//! use agentlens_cdp::{CdpConnection, discover_websocket_url};
//!
//! # async fn example() -> Result<(), agentlens_cdp::CdpError> {
//! // From an HTTP debugging endpoint...
//! let ws_url = discover_websocket_url("http://localhost:9222").await?;
//! let conn = CdpConnection::connect(&ws_url).await?;
//!
//! // Browser-level command (no session).
//! let targets: agentlens_cdp::protocol::target::GetTargetsResult = conn
//!     .send_command("Target.getTargets", None::<()>, None)
//!     .await?;
//! # let _ = targets;
//! # Ok(())
//! # }
//! ```
//!
//! ## Launching a browser
//!
//! ```no_run
//! use agentlens_cdp::{CdpConnection, ChromiumLauncher};
//!
//! # async fn example() -> Result<(), agentlens_cdp::CdpError> {
//! let browser = ChromiumLauncher::new().launch().await?;
//! let conn = CdpConnection::connect(&browser.ws_url).await?;
//! # let _ = conn;
//! # Ok(())
//! # }
//! ```
//!
//! ## Events
//!
//! Every [`CdpConnection::subscribe_events`] receiver sees all events from
//! all sessions; filter on `event.session_id` and `event.method`.
//!
//! ## Module organization
//!
//! - [`connection`] — WebSocket connection and endpoint discovery
//! - [`launcher`] — headless Chromium process management
//! - [`transport`] — wire message types
//! - [`protocol`] — typed domain definitions
//! - [`error`] — error types

pub mod connection;
pub mod error;
pub mod launcher;
pub mod protocol;
pub mod transport;

pub use connection::{BrowserVersion, CdpConnection, discover_websocket_url};
pub use error::CdpError;
pub use launcher::{ChromiumLauncher, LaunchedBrowser};
pub use transport::{CdpEvent, CdpMessage, CdpRequest, CdpResponse};
