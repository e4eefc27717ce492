//! # agentlens-core — a browser as a structured tool surface
//!
//! Exposes a CDP-driven browser to an LLM agent: pages are observed as
//! compact accessibility-tree snapshots in which every interactive element
//! carries a short opaque ref (`e7`, `f2_e3`), and the agent acts on those
//! refs with coarse operations — click, type, structural exploration.
//!
//! The crate is the runtime coordination layer between the agent and the
//! page:
//!
//! - [`identity`] — lazy, isolated browsing contexts per persona with
//!   authentication-state hydration
//! - [`bridge`] — a per-frame lifecycle manager keeping an isolated-world
//!   helper callable in every reachable frame, across navigations and
//!   document swaps
//! - [`snapshot`] — recursive multi-frame snapshot composition with
//!   frame-qualified ref rewriting and the routing index behind it
//! - [`router`] — translation of global refs into `(frame, local ref)`
//!   and the action façade the agent drives
//! - [`inject`] — frame-tree walking and bridge installation after
//!   navigations
//! - [`failures`] — the per-context failure record feeding snapshot
//!   warnings
//! - [`tools`] — the request/response operation surface
//! - [`browser`] — launch/connect wiring
//!
//! ## Quick start
//!
//! ```no_run
//! use agentlens_core::AgentBrowser;
//!
//! # async fn example() -> Result<(), agentlens_core::SurfaceError> {
//! let mut browser = AgentBrowser::launch().await?;
//! let snapshot = browser.surface().navigate("https://example.com").await?;
//! println!("{}", snapshot.to_display());
//! // A line like `- button "More" [ref=e3]` can now be acted on:
//! browser.surface().click("e3").await?;
//! browser.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Personas
//!
//! Roles isolate authenticated identities in separate browser partitions
//! (cookie/storage jars) on one browser:
//!
//! ```no_run
//! use std::collections::HashMap;
//! use agentlens_core::{AgentBrowser, RoleConfig};
//!
//! # async fn example() -> Result<(), agentlens_core::SurfaceError> {
//! # let browser = AgentBrowser::launch().await?;
//! let mut roles = HashMap::new();
//! roles.insert("admin".to_string(), RoleConfig {
//!     auth_path: Some("state/admin.json".into()),
//!     default_url: Some("https://app.example.com/admin".to_string()),
//!     auth_required: true,
//!     limits: None,
//! });
//! browser.surface().set_configuration(roles);
//! browser.surface().select_role("admin").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Ref lifetime
//!
//! Refs are valid exactly as long as the snapshot that produced them; a
//! new snapshot atomically replaces the routing index, and stale refs fail
//! with a typed error rather than touching the wrong element.

pub mod bridge;
pub mod browser;
pub mod error;
pub mod failures;
pub mod identity;
pub mod inject;
pub mod refs;
pub mod router;
pub mod snapshot;
pub mod tools;
pub mod wait;

pub use bridge::{BridgeInjector, BridgeLimits, FrameBridge};
pub use browser::AgentBrowser;
pub use error::{BridgeError, IdentityError, NavigationError, SnapshotError, SurfaceError, WaitError};
pub use failures::{FailureKind, FailureLog, FailureReport, Warnings};
pub use identity::{
    AuthCookie, AuthOrigin, AuthState, DEFAULT_ROLE, IdentityContext, IdentityManager,
    LocalStorageEntry, RoleConfig, SameSite,
};
pub use router::BrowserSurface;
pub use snapshot::{NavigationMetadata, PageContext, RefTarget, Snapshot};
pub use wait::{ActionWatcher, LoadPhase, NavigationWatcher};
