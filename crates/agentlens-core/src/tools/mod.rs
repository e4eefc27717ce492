//! Agent-facing tool dispatch.
//!
//! A thin shell over [`BrowserSurface`]: operation names and JSON
//! arguments in, human-readable text out. The refs embedded in results
//! are exactly the refs of the most recent snapshot.

use serde_json::Value;

use crate::error::SurfaceError;
use crate::router::BrowserSurface;

/// Operation names this dispatch understands.
pub const TOOL_NAMES: &[&str] = &[
    "browser_initialize",
    "browser_navigate",
    "browser_snapshot",
    "browser_click",
    "browser_type",
    "browser_inspect",
    "wait_for_browser",
    "browser_close",
    "get_ancestors",
    "get_siblings",
    "get_descendants",
    "get_current_role",
    "list_current_roles",
    "select_role",
];

/// Execute one tool call.
///
/// # Errors
///
/// [`SurfaceError::UnknownTool`] for unrecognized names,
/// [`SurfaceError::InvalidArguments`] for undecodable arguments, plus
/// whatever the underlying operation raises.
pub async fn dispatch(
    surface: &BrowserSurface,
    tool: &str,
    args: &Value,
) -> Result<String, SurfaceError> {
    match tool {
        "browser_initialize" => {
            let ctx = surface.initialize().await?;
            Ok(format!("Browser ready (role: {})", ctx.role()))
        }
        "browser_navigate" => {
            let url = required_str(tool, args, "url")?;
            let snapshot = surface.navigate(url).await?;
            Ok(snapshot.to_display())
        }
        "browser_snapshot" => {
            let snapshot = surface.snapshot().await?;
            Ok(snapshot.to_display())
        }
        "browser_click" => {
            let ref_str = required_str(tool, args, "ref")?;
            surface.click(ref_str).await?;
            Ok(format!("Clicked {ref_str}"))
        }
        "browser_type" => {
            let ref_str = required_str(tool, args, "ref")?;
            let text = required_str(tool, args, "text")?;
            surface.type_text(ref_str, text).await?;
            Ok(format!("Typed {} character(s) into {ref_str}", text.chars().count()))
        }
        "browser_inspect" => {
            let ref_str = required_str(tool, args, "ref")?;
            let detail = surface.inspect(ref_str).await?;
            Ok(pretty(tool, &detail)?)
        }
        "wait_for_browser" => {
            let milliseconds = required_u64(tool, args, "milliseconds")?;
            surface.wait(milliseconds).await;
            Ok(format!("Waited {milliseconds} ms"))
        }
        "browser_close" => {
            surface.close().await;
            Ok("Browser contexts closed".to_string())
        }
        "get_ancestors" => {
            let ref_str = required_str(tool, args, "ref")?;
            let detail = surface.ancestors(ref_str).await?;
            Ok(pretty(tool, &detail)?)
        }
        "get_siblings" => {
            let ref_str = required_str(tool, args, "ref")?;
            let level = required_u64(tool, args, "ancestorLevel")? as u32;
            let detail = surface.siblings(ref_str, level).await?;
            Ok(pretty(tool, &detail)?)
        }
        "get_descendants" => {
            let ref_str = required_str(tool, args, "ref")?;
            let level = required_u64(tool, args, "ancestorLevel")? as u32;
            let detail = surface.descendants(ref_str, level).await?;
            Ok(pretty(tool, &detail)?)
        }
        "get_current_role" => Ok(surface
            .current_role()
            .unwrap_or_else(|| "none (no role selected yet)".to_string())),
        "list_current_roles" => Ok(surface.roles().join("\n")),
        "select_role" => {
            let role = required_str(tool, args, "role")?;
            let ctx = surface.select_role(role).await?;
            Ok(format!("Selected role: {}", ctx.role()))
        }
        other => Err(SurfaceError::UnknownTool(other.to_string())),
    }
}

fn required_str<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str, SurfaceError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SurfaceError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing string argument '{key}'"),
        })
}

fn required_u64(tool: &str, args: &Value, key: &str) -> Result<u64, SurfaceError> {
    args.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| SurfaceError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing numeric argument '{key}'"),
        })
}

fn pretty(tool: &str, value: &Value) -> Result<String, SurfaceError> {
    serde_json::to_string_pretty(value).map_err(|e| SurfaceError::InvalidArguments {
        tool: tool.to_string(),
        message: format!("unserializable result: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_str_reads_present_keys() {
        let args = serde_json::json!({"url": "https://x.test"});
        assert_eq!(required_str("browser_navigate", &args, "url").unwrap(), "https://x.test");
    }

    #[test]
    fn required_str_rejects_missing_and_non_strings() {
        let args = serde_json::json!({"url": 7});
        let err = required_str("browser_navigate", &args, "url").unwrap_err();
        assert!(matches!(err, SurfaceError::InvalidArguments { tool, .. } if tool == "browser_navigate"));
        let err = required_str("browser_navigate", &serde_json::json!({}), "url").unwrap_err();
        assert!(matches!(err, SurfaceError::InvalidArguments { .. }));
    }

    #[test]
    fn required_u64_reads_numbers() {
        let args = serde_json::json!({"milliseconds": 250});
        assert_eq!(required_u64("wait_for_browser", &args, "milliseconds").unwrap(), 250);
        assert!(required_u64("wait_for_browser", &args, "other").is_err());
    }

    #[test]
    fn tool_names_cover_the_contract() {
        for name in [
            "browser_initialize",
            "browser_navigate",
            "browser_snapshot",
            "browser_click",
            "browser_type",
            "browser_inspect",
            "wait_for_browser",
            "browser_close",
            "get_ancestors",
            "get_siblings",
            "get_descendants",
            "get_current_role",
            "list_current_roles",
            "select_role",
        ] {
            assert!(TOOL_NAMES.contains(&name), "missing tool {name}");
        }
    }
}
