//! In-page helper bootstrap.
//!
//! The injector evaluates [`bootstrap_source`] inside a frame's isolated
//! world; the expression yields the helper object whose remote handle the
//! frame state stores. The helper owns all per-frame element state:
//!
//! - `snapshot()` → `{text, elementCount}` — indented accessibility
//!   description, interactive nodes tagged `[ref=eN]`, iframes rendered as
//!   `- iframe [ref=eN]` marker lines for the composer to expand
//! - `click(ref)` / `type(ref, text)` — actions on stored elements
//! - `inspect(ref)` — element detail record
//! - `resolveContainer(ref)` / `inspectPattern(ref, level)` /
//!   `extractAnchors(ref, level)` — structural analysis
//! - `element(ref)` — iframe element lookup for frame-id resolution
//! - `ping()` — handle liveness probe
//!
//! Refs are local to the frame and to one snapshot; every `snapshot()`
//! call renumbers from `e1`.

use serde::{Deserialize, Serialize};

/// Limits applied by the in-page helper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeLimits {
    /// Maximum DOM depth walked by snapshots and ancestor queries.
    pub max_depth: u32,
    /// Maximum siblings returned by pattern inspection.
    pub max_siblings: u32,
    /// Maximum descendants returned by anchor extraction.
    pub max_descendants: u32,
}

impl Default for BridgeLimits {
    fn default() -> Self {
        Self {
            max_depth: 48,
            max_siblings: 30,
            max_descendants: 60,
        }
    }
}

/// Build the bootstrap expression for one frame.
///
/// The result is a single expression; evaluating it returns the helper
/// object.
pub fn bootstrap_source(limits: BridgeLimits) -> String {
    let limits_json =
        serde_json::to_string(&limits).unwrap_or_else(|_| "{}".to_string());
    format!("({HELPER_FACTORY})({limits_json})")
}

/// The helper factory. Kept as one function expression so the Rust side
/// can apply it to the serialized limits.
const HELPER_FACTORY: &str = r##"(limits) => {
  const MAX_DEPTH = limits.maxDepth || 48;
  const MAX_SIBLINGS = limits.maxSiblings || 30;
  const MAX_DESCENDANTS = limits.maxDescendants || 60;

  const INTERACTIVE_ROLES = new Set([
    "link", "button", "checkbox", "radio", "textbox", "combobox",
    "slider", "option", "tab", "menuitem", "switch", "searchbox"
  ]);

  const TEXT_INPUT_TYPES = new Set([
    "text", "search", "email", "url", "tel", "password", "number", "date",
    "datetime-local", "month", "week", "time"
  ]);

  // Containers whose text content would make a uselessly long name.
  const CONTAINER_ROLES = new Set([
    "list", "table", "navigation", "main", "form", "dialog"
  ]);

  function roleOf(el) {
    const explicit = el.getAttribute("role");
    if (explicit) return explicit;
    const tag = el.tagName.toLowerCase();
    switch (tag) {
      case "a": return el.hasAttribute("href") ? "link" : "generic";
      case "button": return "button";
      case "select": return "combobox";
      case "textarea": return "textbox";
      case "option": return "option";
      case "img": return "img";
      case "nav": return "navigation";
      case "main": return "main";
      case "form": return "form";
      case "table": return "table";
      case "ul": case "ol": return "list";
      case "li": return "listitem";
      case "dialog": return "dialog";
      case "summary": return "button";
      case "iframe": case "frame": return "iframe";
      case "h1": case "h2": case "h3": case "h4": case "h5": case "h6":
        return "heading";
      case "input": {
        const type = (el.getAttribute("type") || "text").toLowerCase();
        if (type === "checkbox") return "checkbox";
        if (type === "radio") return "radio";
        if (type === "range") return "slider";
        if (type === "hidden") return null;
        if (type === "submit" || type === "button" || type === "reset" || type === "image")
          return "button";
        if (TEXT_INPUT_TYPES.has(type)) return "textbox";
        return "textbox";
      }
      default: return "generic";
    }
  }

  function isHidden(el) {
    const view = el.ownerDocument.defaultView;
    if (!view) return true;
    const style = view.getComputedStyle(el);
    return style.display === "none" || style.visibility === "hidden";
  }

  function shortText(text, cap) {
    const collapsed = (text || "").replace(/\s+/g, " ").trim();
    return collapsed.length > cap ? collapsed.slice(0, cap - 1) + "…" : collapsed;
  }

  function nameOf(el, role) {
    const aria = el.getAttribute("aria-label");
    if (aria) return shortText(aria, 120);
    if (el.labels && el.labels.length > 0)
      return shortText(el.labels[0].textContent, 120);
    if (role === "img") return shortText(el.getAttribute("alt") || "", 120);
    if (role === "iframe")
      return shortText(el.getAttribute("title") || el.getAttribute("name") || "", 120);
    if (role === "textbox" || role === "combobox") {
      const placeholder = el.getAttribute("placeholder");
      if (placeholder) return shortText(placeholder, 120);
    }
    if (el.tagName === "INPUT" && el.type !== "password" && el.value)
      return shortText(el.value, 120);
    if (!CONTAINER_ROLES.has(role)) {
      const text = shortText(el.textContent, 120);
      if (text) return text;
    }
    return shortText(el.getAttribute("title") || "", 120);
  }

  function flagsOf(el, role) {
    const flags = [];
    if (role === "checkbox" || role === "radio" || role === "switch") {
      const ariaChecked = el.getAttribute("aria-checked");
      if (ariaChecked === "mixed" || el.indeterminate) flags.push("[checked=mixed]");
      else if (el.checked || ariaChecked === "true") flags.push("[checked]");
    }
    if (el.disabled || el.getAttribute("aria-disabled") === "true") flags.push("[disabled]");
    if (el.getAttribute("aria-expanded") === "true") flags.push("[expanded]");
    if (el === el.ownerDocument.activeElement) flags.push("[active]");
    if (role === "heading") flags.push("[level=" + (el.getAttribute("aria-level") || el.tagName[1]) + "]");
    const pressed = el.getAttribute("aria-pressed");
    if (pressed === "true") flags.push("[pressed]");
    else if (pressed === "mixed") flags.push("[pressed=mixed]");
    if (el.selected || el.getAttribute("aria-selected") === "true") flags.push("[selected]");
    if (role === "link" && el.getAttribute("href"))
      flags.push('url=' + JSON.stringify(el.getAttribute("href")));
    if (el.getAttribute("placeholder"))
      flags.push('placeholder=' + JSON.stringify(el.getAttribute("placeholder")));
    if (role === "img" && el.getAttribute("src"))
      flags.push('src=' + JSON.stringify(shortText(el.getAttribute("src"), 200)));
    if (el.tagName === "INPUT" && el.getAttribute("type"))
      flags.push('type=' + JSON.stringify(el.getAttribute("type")));
    if (el.getAttribute("autocomplete"))
      flags.push('autocomplete=' + JSON.stringify(el.getAttribute("autocomplete")));
    return flags;
  }

  function cssPath(el) {
    const parts = [];
    let node = el;
    while (node && node.nodeType === Node.ELEMENT_NODE && parts.length < 8) {
      let part = node.tagName.toLowerCase();
      if (node.id) { parts.unshift(part + "#" + node.id); break; }
      const siblings = node.parentElement
        ? Array.from(node.parentElement.children).filter(c => c.tagName === node.tagName)
        : [];
      if (siblings.length > 1) part += ":nth-of-type(" + (siblings.indexOf(node) + 1) + ")";
      parts.unshift(part);
      node = node.parentElement;
    }
    return parts.join(" > ");
  }

  function summarize(el) {
    return {
      tag: el.tagName.toLowerCase(),
      role: roleOf(el),
      id: el.id || null,
      classes: Array.from(el.classList).slice(0, 6),
      text: shortText(el.textContent, 80),
      childCount: el.children.length
    };
  }

  const helper = {
    elements: Object.create(null),
    _counter: 0,

    _get(ref) {
      const el = this.elements[ref];
      if (!el || !el.isConnected) throw new Error("stale ref: " + ref);
      return el;
    },

    _assign(el) {
      const ref = "e" + (++this._counter);
      this.elements[ref] = el;
      return ref;
    },

    ping() { return true; },

    snapshot() {
      this.elements = Object.create(null);
      this._counter = 0;
      const lines = [];
      let count = 0;
      const walk = (node, indent, depth) => {
        if (depth > MAX_DEPTH) return;
        for (const child of node.childNodes) {
          if (child.nodeType === Node.TEXT_NODE) {
            const text = shortText(child.textContent, 200);
            if (!text) continue;
            // Skip text already used as the parent's accessible name.
            const parentRole = roleOf(node);
            if (INTERACTIVE_ROLES.has(parentRole)) continue;
            if (parentRole !== "generic" && nameOf(node, parentRole) === text) continue;
            lines.push("  ".repeat(indent) + "- text: " + JSON.stringify(text));
            continue;
          }
          if (child.nodeType !== Node.ELEMENT_NODE) continue;
          const tag = child.tagName.toLowerCase();
          if (tag === "script" || tag === "style" || tag === "noscript" || tag === "template")
            continue;
          const role = roleOf(child);
          if (role === null) continue;
          // Hidden subtrees are dropped, but hidden iframes stay: their
          // documents exist and the composer decides what to do with them.
          if (role !== "iframe" && isHidden(child)) continue;
          if (role === "generic") {
            walk(child, indent, depth + 1);
            continue;
          }
          count += 1;
          const interactive = INTERACTIVE_ROLES.has(role) || role === "iframe";
          const name = nameOf(child, role);
          let line = "  ".repeat(indent) + "- " + role;
          if (name) line += " " + JSON.stringify(name);
          // Marker lines stay flag-free so the composer's pattern holds.
          const flags = role === "iframe" ? [] : flagsOf(child, role);
          if (flags.length > 0) line += " " + flags.join(" ");
          if (interactive) line += " [ref=" + this._assign(child) + "]";
          lines.push(line);
          if (role !== "iframe" && !(role === "textbox" || role === "combobox"))
            walk(child, indent + 1, depth + 1);
        }
      };
      walk(document.body || document.documentElement, 0, 0);
      return { text: lines.join("\n"), elementCount: count };
    },

    click(ref) {
      const el = this._get(ref);
      el.scrollIntoView({ block: "center", inline: "center" });
      el.click();
      return true;
    },

    type(ref, text) {
      const el = this._get(ref);
      el.focus();
      if ("value" in el) {
        el.value = text;
        el.dispatchEvent(new Event("input", { bubbles: true }));
        el.dispatchEvent(new Event("change", { bubbles: true }));
      } else if (el.isContentEditable) {
        el.textContent = text;
        el.dispatchEvent(new Event("input", { bubbles: true }));
      } else {
        throw new Error("element is not editable: " + ref);
      }
      return true;
    },

    element(ref) {
      const el = this._get(ref);
      const tag = el.tagName.toLowerCase();
      if (tag !== "iframe" && tag !== "frame")
        throw new Error("ref is not an iframe: " + ref);
      return el;
    },

    inspect(ref) {
      const el = this._get(ref);
      const rect = el.getBoundingClientRect();
      const attributes = {};
      for (const attr of el.attributes) attributes[attr.name] = attr.value;
      return {
        role: roleOf(el),
        name: nameOf(el, roleOf(el)),
        tag: el.tagName.toLowerCase(),
        text: shortText(el.textContent, 200),
        visible: !isHidden(el),
        rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
        selector: cssPath(el),
        attributes: attributes
      };
    },

    resolveContainer(ref) {
      const el = this._get(ref);
      const ancestors = [];
      let node = el.parentElement;
      let depth = 1;
      while (node && node.tagName !== "HTML" && depth <= MAX_DEPTH) {
        const info = summarize(node);
        info.level = depth;
        ancestors.push(info);
        node = node.parentElement;
        depth += 1;
      }
      return { element: summarize(el), ancestors: ancestors };
    },

    _ancestorAt(el, level) {
      let node = el;
      for (let i = 0; i < level && node.parentElement
           && node.parentElement.tagName !== "HTML"; i += 1)
        node = node.parentElement;
      return node;
    },

    inspectPattern(ref, level) {
      const el = this._get(ref);
      const container = this._ancestorAt(el, level);
      const siblings = [];
      if (container.parentElement) {
        for (const sibling of container.parentElement.children) {
          if (siblings.length >= MAX_SIBLINGS) break;
          const info = summarize(sibling);
          info.isTarget = sibling === container;
          siblings.push(info);
        }
      }
      return { container: summarize(container), siblings: siblings };
    },

    extractAnchors(ref, level) {
      const el = this._get(ref);
      const container = this._ancestorAt(el, level);
      const anchors = [];
      for (const anchor of container.querySelectorAll("a[href]")) {
        if (anchors.length >= MAX_DESCENDANTS) break;
        anchors.push({
          text: shortText(anchor.textContent, 120),
          href: anchor.getAttribute("href"),
          title: anchor.getAttribute("title") || null
        });
      }
      return { container: summarize(container), anchors: anchors };
    }
  };

  return helper;
}"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_embeds_limits() {
        let source = bootstrap_source(BridgeLimits {
            max_depth: 7,
            max_siblings: 8,
            max_descendants: 9,
        });
        assert!(source.contains("\"maxDepth\":7"));
        assert!(source.contains("\"maxSiblings\":8"));
        assert!(source.contains("\"maxDescendants\":9"));
    }

    #[test]
    fn bootstrap_is_a_single_call_expression() {
        let source = bootstrap_source(BridgeLimits::default());
        assert!(source.starts_with("((limits) =>"));
        assert!(source.ends_with(')'));
    }

    #[test]
    fn default_limits_are_sane() {
        let limits = BridgeLimits::default();
        assert!(limits.max_depth > 0);
        assert!(limits.max_siblings > 0);
        assert!(limits.max_descendants > 0);
    }
}
