//! Frame discovery and injection driving.
//!
//! After every successful top-level navigation the frame tree is walked
//! and the bridge installed everywhere: the root frame serially — nothing
//! can be snapshotted without a main-frame bridge, so its failure fails
//! the navigation — and child frames in parallel, where each failure is
//! classified and recorded but never fatal.

use futures::future::join_all;
use tracing::{debug, instrument};

use agentlens_cdp::protocol::page::{FrameTree, GetFrameTreeResult};

use crate::error::BridgeError;
use crate::identity::IdentityContext;

/// Install bridges across the context's current frame tree.
///
/// # Errors
///
/// Fails only when the main frame cannot be injected. Child failures and
/// a failed tree walk degrade into the context's failure log.
#[instrument(level = "debug", skip(ctx), fields(role = %ctx.role(), frame_id = %ctx.main_frame_id()))]
pub async fn inject_frame_tree(ctx: &IdentityContext) -> Result<(), BridgeError> {
    let injector = ctx.injector();

    // Root first, serially. This one is critical.
    if let Err(e) = injector.ensure_frame_state(ctx.main_frame_id()).await {
        ctx.failures()
            .record_injection(ctx.main_frame_id(), true, e.to_string());
        return Err(e);
    }

    let tree: GetFrameTreeResult = match ctx
        .connection()
        .send_command("Page.getFrameTree", None::<()>, Some(ctx.session_id()))
        .await
    {
        Ok(tree) => tree,
        Err(e) => {
            // Children stay uninjected until something asks for them.
            ctx.failures().set_discovery_error(e.to_string());
            return Ok(());
        }
    };

    let mut children = Vec::new();
    collect_child_frames(&tree.frame_tree, ctx.main_frame_id(), &mut children);
    if children.is_empty() {
        return Ok(());
    }
    debug!(count = children.len(), "Injecting child frames");

    let results = join_all(children.iter().map(|frame_id| async move {
        (frame_id.clone(), injector.ensure_frame_state(frame_id).await)
    }))
    .await;

    for (frame_id, result) in results {
        if let Err(e) = result {
            ctx.failures().record_injection(&frame_id, false, e.to_string());
        }
    }
    Ok(())
}

/// Collect every frame id below the tree except `root_id` itself.
fn collect_child_frames(tree: &FrameTree, root_id: &str, out: &mut Vec<String>) {
    if tree.frame.id != root_id {
        out.push(tree.frame.id.clone());
    }
    if let Some(children) = &tree.child_frames {
        for child in children {
            collect_child_frames(child, root_id, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_cdp::protocol::page::Frame;

    fn frame(id: &str) -> Frame {
        Frame {
            id: id.to_string(),
            parent_id: None,
            loader_id: None,
            name: None,
            url: String::new(),
        }
    }

    #[test]
    fn collect_child_frames_walks_nested_trees() {
        let tree = FrameTree {
            frame: frame("ROOT"),
            child_frames: Some(vec![
                FrameTree {
                    frame: frame("A"),
                    child_frames: Some(vec![FrameTree {
                        frame: frame("A1"),
                        child_frames: None,
                    }]),
                },
                FrameTree {
                    frame: frame("B"),
                    child_frames: None,
                },
            ]),
        };
        let mut out = Vec::new();
        collect_child_frames(&tree, "ROOT", &mut out);
        assert_eq!(out, vec!["A".to_string(), "A1".to_string(), "B".to_string()]);
    }

    #[test]
    fn collect_child_frames_excludes_only_the_root() {
        let tree = FrameTree {
            frame: frame("ROOT"),
            child_frames: None,
        };
        let mut out = Vec::new();
        collect_child_frames(&tree, "ROOT", &mut out);
        assert!(out.is_empty());
    }
}
