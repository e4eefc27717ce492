//! Multi-frame snapshot composition.
//!
//! The main frame's helper produces an indented text description in which
//! every iframe appears as a marker line. The composer expands those
//! markers recursively: it resolves each marker to a child frame, asks the
//! child's helper for its own snapshot, qualifies the child's local refs
//! with a snapshot-wide frame ordinal, and indents the child text under
//! the marker. Along the way it builds the ref index that routes actions
//! back into the owning frame.
//!
//! Frame ordinals are assigned in depth-first document order from one
//! counter; `f1` is the first iframe marker encountered. The ref index is
//! rebuilt from scratch and atomically replaces the context's previous
//! index, so refs from an older snapshot fail loudly instead of hitting
//! the wrong element.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, trace};

use agentlens_cdp::protocol::dom::{DescribeNodeParams, DescribeNodeResult};
use agentlens_cdp::protocol::runtime::{EvaluateParams, EvaluateResult, ReleaseObjectParams};

use crate::error::{BridgeError, SnapshotError};
use crate::failures::Warnings;
use crate::failures::build_warnings;
use crate::identity::IdentityContext;
use crate::refs;

/// Any `[ref=…]` occurrence in snapshot text.
static REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ref=([A-Za-z0-9_]+)\]").unwrap());

/// An iframe marker line: indent, `- iframe`, optional quoted name, ref.
static IFRAME_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?P<indent>\s*)- iframe(?: "(?P<name>(?:[^"\\]|\\.)*)")? \[ref=(?P<ref>e\d+)\]$"#)
        .unwrap()
});

/// Routing target of one global ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefTarget {
    /// Frame that owns the element.
    pub frame_id: String,
    /// The element's ref inside that frame's helper.
    pub local_ref: String,
}

/// Page identity attached to snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    /// Current page URL.
    pub url: String,
    /// Current page title.
    pub title: String,
}

/// Metadata attached to navigation-produced snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationMetadata {
    /// URL the agent asked for.
    pub requested_url: String,
    /// URL actually landed on, after redirects.
    pub final_url: String,
    /// Page title after load.
    pub page_title: String,
    /// HTTP status of the main document response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Wall-clock navigation duration in milliseconds.
    pub load_time_ms: u64,
    /// Redirects followed by the main document request.
    pub redirect_count: u32,
    /// Content type of the main document response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// When the navigation completed.
    pub timestamp: DateTime<Utc>,
    /// Whether the navigation succeeded.
    pub success: bool,
}

/// A composed page snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Indented accessibility description with embedded refs.
    pub text: String,
    /// Elements described across all frames.
    pub element_count: u32,
    /// Page URL and title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_context: Option<PageContext>,
    /// Navigation metadata, present on navigate-produced snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationMetadata>,
    /// Warning summary, present when the failure log is non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Warnings>,
    /// One line per frame-expansion problem in this snapshot.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expansion_errors: Vec<String>,
}

impl Snapshot {
    /// Render the snapshot for the agent.
    pub fn to_display(&self) -> String {
        let mut out = String::new();
        if let Some(nav) = &self.navigation {
            out.push_str(&format!(
                "Navigated to {} ({}{}, {} ms{})\n",
                nav.final_url,
                nav.status_code
                    .map_or_else(|| "no response".to_string(), |s| s.to_string()),
                nav.content_type
                    .as_deref()
                    .map_or_else(String::new, |ct| format!(" {ct}")),
                nav.load_time_ms,
                if nav.redirect_count > 0 {
                    format!(", {} redirects", nav.redirect_count)
                } else {
                    String::new()
                },
            ));
        }
        if let Some(page) = &self.page_context {
            out.push_str(&format!("Page: {} — {}\n", page.url, page.title));
        }
        if let Some(warnings) = &self.warnings {
            if let Some(count) = warnings.inaccessible_frames {
                out.push_str(&format!("Warning: {count} frame(s) inaccessible\n"));
            }
            if let Some(status) = &warnings.auth_status {
                out.push_str(&format!("Warning: auth status {status}\n"));
            }
            for detail in &warnings.details {
                out.push_str(&format!("Warning: {detail}\n"));
            }
        }
        out.push_str(&format!("Elements: {}\n\n", self.element_count));
        out.push_str(&self.text);
        out
    }
}

/// Raw helper snapshot payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSnapshot {
    pub text: String,
    pub element_count: u32,
}

/// A parsed iframe marker line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IframeMarker {
    indent: String,
    local_ref: String,
}

fn parse_iframe_marker(line: &str) -> Option<IframeMarker> {
    IFRAME_MARKER_RE.captures(line).map(|caps| IframeMarker {
        indent: caps["indent"].to_string(),
        local_ref: caps["ref"].to_string(),
    })
}

/// Index every local `[ref=eN]` of `text` as owned by `frame_id`.
fn index_local_refs(index: &mut HashMap<String, RefTarget>, text: &str, frame_id: &str) {
    for caps in REF_RE.captures_iter(text) {
        let r = &caps[1];
        if refs::is_local(r) {
            index.insert(
                r.to_string(),
                RefTarget {
                    frame_id: frame_id.to_string(),
                    local_ref: r.to_string(),
                },
            );
        }
    }
}

/// Qualify the local refs of an expanded child text with `ordinal` and
/// index them under `frame_id`. Already-qualified refs from deeper levels
/// pass through untouched.
fn rewrite_and_index(
    index: &mut HashMap<String, RefTarget>,
    text: &str,
    ordinal: u32,
    frame_id: &str,
) -> String {
    REF_RE
        .replace_all(text, |caps: &Captures| {
            let r = &caps[1];
            if refs::is_local(r) {
                let global = refs::global_ref(ordinal, r);
                index.insert(
                    global.clone(),
                    RefTarget {
                        frame_id: frame_id.to_string(),
                        local_ref: r.to_string(),
                    },
                );
                format!("[ref={global}]")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Outcome of expanding one iframe marker.
enum ChildOutcome {
    Expanded { text: String, element_count: u32 },
    Unavailable,
    Detached(String),
    Failed(String),
}

/// One snapshot's expansion state.
struct Expander<'a> {
    ctx: &'a IdentityContext,
    next_ordinal: u32,
    index: HashMap<String, RefTarget>,
    errors: Vec<String>,
    child_element_count: u32,
}

impl<'a> Expander<'a> {
    fn new(ctx: &'a IdentityContext) -> Self {
        Self {
            ctx,
            next_ordinal: 0,
            index: HashMap::new(),
            errors: Vec::new(),
            child_element_count: 0,
        }
    }

    /// Expand all iframe markers of `text`, whose local refs belong to
    /// `owner_frame`.
    fn expand(
        &mut self,
        text: String,
        owner_frame: String,
    ) -> Pin<Box<dyn Future<Output = String> + Send + '_>> {
        Box::pin(async move {
            let mut out: Vec<String> = Vec::new();
            for line in text.lines() {
                let Some(marker) = parse_iframe_marker(line) else {
                    out.push(line.to_string());
                    continue;
                };
                out.push(format!("{line}:"));
                let child_indent = format!("{}  ", marker.indent);
                match self.expand_child(&owner_frame, &marker).await {
                    ChildOutcome::Expanded {
                        text,
                        element_count,
                    } => {
                        self.child_element_count += element_count;
                        for child_line in text.lines() {
                            out.push(format!("{child_indent}{child_line}"));
                        }
                    }
                    ChildOutcome::Unavailable => {
                        out.push(format!("{child_indent}[Frame content unavailable]"));
                    }
                    ChildOutcome::Detached(_) => {
                        out.push(format!("{child_indent}[Frame detached]"));
                    }
                    ChildOutcome::Failed(message) => {
                        out.push(format!("{child_indent}[Error: {message}]"));
                    }
                }
            }
            out.join("\n")
        })
    }

    /// Resolve one marker to a child frame and expand it.
    async fn expand_child(&mut self, parent_frame: &str, marker: &IframeMarker) -> ChildOutcome {
        let child_frame_id = match self.resolve_child_frame(parent_frame, &marker.local_ref).await
        {
            Ok(Some(frame_id)) => frame_id,
            Ok(None) => {
                self.record(None, false, "no content frame (empty or not yet loaded iframe)");
                return ChildOutcome::Unavailable;
            }
            Err(BridgeError::FrameDetached(frame_id)) => {
                self.record(Some(&frame_id), true, "frame detached");
                return ChildOutcome::Detached(frame_id);
            }
            Err(err) => {
                let message = err.to_string();
                self.record(None, false, &message);
                return ChildOutcome::Failed(message);
            }
        };

        let ordinal = {
            self.next_ordinal += 1;
            self.next_ordinal
        };
        trace!(frame_id = %child_frame_id, ordinal = ordinal, "Expanding child frame");

        let raw: Result<RawSnapshot, BridgeError> = self
            .ctx
            .injector()
            .call_method(&child_frame_id, "snapshot", Vec::new())
            .await;
        let raw = match raw {
            Ok(raw) => raw,
            Err(BridgeError::FrameDetached(_)) => {
                self.record(Some(&child_frame_id), true, "frame detached");
                return ChildOutcome::Detached(child_frame_id);
            }
            Err(err) => {
                let message = err.to_string();
                self.record(Some(&child_frame_id), false, &message);
                return ChildOutcome::Failed(message);
            }
        };

        // Depth first: the child's own iframes take the next ordinals
        // before this child's refs are rewritten.
        let expanded = self.expand(raw.text, child_frame_id.clone()).await;
        let rewritten = rewrite_and_index(&mut self.index, &expanded, ordinal, &child_frame_id);
        ChildOutcome::Expanded {
            text: rewritten,
            element_count: raw.element_count,
        }
    }

    /// Find the frame id behind an iframe ref in the parent frame.
    ///
    /// Goes through the parent's helper (which rejects non-iframes) to get
    /// a remote element handle, then describes the node with piercing to
    /// read the content document's frame id. Done from the isolated world
    /// on purpose: querying from the page world would surrender isolation.
    async fn resolve_child_frame(
        &self,
        parent_frame: &str,
        local_ref: &str,
    ) -> Result<Option<String>, BridgeError> {
        let injector = self.ctx.injector();
        let object_id = injector
            .call_method_handle(parent_frame, "element", vec![json!(local_ref)])
            .await?;

        let described: Result<DescribeNodeResult, _> = self
            .ctx
            .connection()
            .send_command(
                "DOM.describeNode",
                Some(DescribeNodeParams {
                    object_id: Some(object_id.clone()),
                    depth: Some(1),
                    pierce: Some(true),
                    ..Default::default()
                }),
                Some(self.ctx.session_id()),
            )
            .await;

        // The handle has served its purpose either way.
        let _ = self
            .ctx
            .connection()
            .send_command::<_, serde_json::Value>(
                "Runtime.releaseObject",
                Some(ReleaseObjectParams { object_id }),
                Some(self.ctx.session_id()),
            )
            .await;

        let node = described.map_err(BridgeError::Cdp)?.node;
        Ok(node
            .frame_id
            .or_else(|| node.content_document.and_then(|doc| doc.frame_id)))
    }

    fn record(&mut self, frame_id: Option<&str>, detached: bool, message: &str) {
        self.ctx
            .failures()
            .record_expansion(frame_id, detached, message.to_string());
        self.errors.push(message.to_string());
    }
}

/// Compose a full snapshot for the context's page.
///
/// Replaces the context's ref index on success.
///
/// # Errors
///
/// Fails only when the main frame cannot be snapshotted; child-frame
/// trouble degrades into inline markers and the failure log.
#[instrument(level = "debug", skip(ctx), fields(role = %ctx.role(), frame_id = %ctx.main_frame_id()))]
pub async fn compose(ctx: &IdentityContext) -> Result<Snapshot, SnapshotError> {
    let raw: RawSnapshot = ctx
        .injector()
        .call_method(ctx.main_frame_id(), "snapshot", Vec::new())
        .await?;

    let mut expander = Expander::new(ctx);
    index_local_refs(&mut expander.index, &raw.text, ctx.main_frame_id());
    let text = expander
        .expand(raw.text.clone(), ctx.main_frame_id().to_string())
        .await;

    let element_count = raw.element_count + expander.child_element_count;
    let indexed = expander.index.len();
    ctx.replace_ref_index(expander.index);
    debug!(element_count = element_count, indexed_refs = indexed, "Snapshot composed");

    Ok(Snapshot {
        text,
        element_count,
        page_context: fetch_page_context(ctx).await,
        navigation: None,
        warnings: build_warnings(ctx.failures()),
        expansion_errors: expander.errors,
    })
}

/// Best-effort page URL and title.
async fn fetch_page_context(ctx: &IdentityContext) -> Option<PageContext> {
    #[derive(Deserialize)]
    struct Payload {
        url: String,
        title: String,
    }

    let result: EvaluateResult = ctx
        .connection()
        .send_command(
            "Runtime.evaluate",
            Some(EvaluateParams {
                expression: "({url: location.href, title: document.title})".to_string(),
                silent: Some(true),
                context_id: None,
                return_by_value: Some(true),
                await_promise: Some(false),
            }),
            Some(ctx.session_id()),
        )
        .await
        .ok()?;

    let payload: Payload = serde_json::from_value(result.result.value?).ok()?;
    Some(PageContext {
        url: payload.url,
        title: payload.title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iframe_marker_parses_plain_form() {
        let marker = parse_iframe_marker("    - iframe [ref=e4]").unwrap();
        assert_eq!(marker.indent, "    ");
        assert_eq!(marker.local_ref, "e4");
    }

    #[test]
    fn iframe_marker_parses_named_form() {
        let marker = parse_iframe_marker(r#"- iframe "checkout widget" [ref=e12]"#).unwrap();
        assert_eq!(marker.indent, "");
        assert_eq!(marker.local_ref, "e12");
    }

    #[test]
    fn iframe_marker_rejects_other_lines() {
        assert!(parse_iframe_marker(r#"- button "Hi" [ref=e1]"#).is_none());
        assert!(parse_iframe_marker("- iframe [ref=f1_e1]").is_none());
        assert!(parse_iframe_marker("- iframe").is_none());
        // Already expanded markers carry a trailing colon.
        assert!(parse_iframe_marker("- iframe [ref=e1]:").is_none());
    }

    #[test]
    fn index_local_refs_skips_qualified_refs() {
        let mut index = HashMap::new();
        index_local_refs(
            &mut index,
            "- button \"A\" [ref=e1]\n  - link \"B\" [ref=f1_e2]",
            "MAIN",
        );
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get("e1"),
            Some(&RefTarget {
                frame_id: "MAIN".to_string(),
                local_ref: "e1".to_string()
            })
        );
    }

    #[test]
    fn rewrite_qualifies_only_local_refs() {
        let mut index = HashMap::new();
        let text = "- button \"Go\" [ref=e1]\n  - link \"Deep\" [ref=f2_e1]";
        let rewritten = rewrite_and_index(&mut index, text, 1, "CHILD");
        assert_eq!(
            rewritten,
            "- button \"Go\" [ref=f1_e1]\n  - link \"Deep\" [ref=f2_e1]"
        );
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get("f1_e1"),
            Some(&RefTarget {
                frame_id: "CHILD".to_string(),
                local_ref: "e1".to_string()
            })
        );
    }

    #[test]
    fn rewrite_roundtrips_through_the_grammar() {
        let mut index = HashMap::new();
        let rewritten = rewrite_and_index(&mut index, "[ref=e7]", 3, "CHILD");
        assert_eq!(rewritten, "[ref=f3_e7]");
        let (ordinal, local) = crate::refs::parse_global("f3_e7").unwrap();
        assert_eq!(ordinal, 3);
        assert_eq!(local, "e7");
    }

    #[test]
    fn snapshot_display_carries_warnings_and_text() {
        let snapshot = Snapshot {
            text: "- button \"Hi\" [ref=e1]".to_string(),
            element_count: 1,
            page_context: Some(PageContext {
                url: "https://x.test/".to_string(),
                title: "X".to_string(),
            }),
            navigation: None,
            warnings: Some(Warnings {
                inaccessible_frames: Some(2),
                auth_status: None,
                partial_content: None,
                details: vec!["frame F could not be injected".to_string()],
            }),
            expansion_errors: Vec::new(),
        };
        let display = snapshot.to_display();
        assert!(display.contains("2 frame(s) inaccessible"));
        assert!(display.contains("https://x.test/"));
        assert!(display.contains("[ref=e1]"));
    }
}
