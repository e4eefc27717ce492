//! Browser process wiring.
//!
//! Convenience entry points that put the pieces together: launch (or
//! connect to) a Chromium, open the CDP connection, and hand back a
//! [`BrowserSurface`] ready for tool dispatch.

use std::sync::Arc;

use tracing::info;

use agentlens_cdp::{CdpConnection, ChromiumLauncher, LaunchedBrowser, discover_websocket_url};

use crate::error::SurfaceError;
use crate::router::BrowserSurface;

/// A browser plus the façade over it.
///
/// When launched (rather than connected), dropping this kills the browser
/// process; call [`close`](Self::close) first for orderly context
/// teardown.
#[derive(Debug)]
pub struct AgentBrowser {
    launched: Option<LaunchedBrowser>,
    surface: BrowserSurface,
}

impl AgentBrowser {
    /// Launch a headless Chromium and connect to it.
    ///
    /// # Errors
    ///
    /// Launch or connection failures.
    pub async fn launch() -> Result<Self, SurfaceError> {
        let launched = ChromiumLauncher::new().launch().await?;
        let connection = Arc::new(CdpConnection::connect(&launched.ws_url).await?);
        info!("Agent browser launched");
        Ok(Self {
            launched: Some(launched),
            surface: BrowserSurface::new(connection),
        })
    }

    /// Connect to an already-running browser.
    ///
    /// Accepts `http(s)://host:port` debugging endpoints or `ws(s)://`
    /// URLs.
    ///
    /// # Errors
    ///
    /// Discovery or connection failures.
    pub async fn connect(endpoint: &str) -> Result<Self, SurfaceError> {
        let ws_url = discover_websocket_url(endpoint).await?;
        let connection = Arc::new(CdpConnection::connect(&ws_url).await?);
        info!(endpoint = %endpoint, "Connected to running browser");
        Ok(Self {
            launched: None,
            surface: BrowserSurface::new(connection),
        })
    }

    /// The façade for this browser.
    pub fn surface(&self) -> &BrowserSurface {
        &self.surface
    }

    /// Dispose every context, then kill the browser if we launched it.
    ///
    /// Per-step failures are recorded in the failure logs; none are
    /// raised.
    pub async fn close(&mut self) {
        self.surface.close().await;
        if let Some(browser) = &mut self.launched {
            browser.kill().await;
        }
    }
}
