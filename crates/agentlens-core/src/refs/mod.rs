//! Global element reference grammar.
//!
//! The in-page helper numbers interactive elements `e1`, `e2`, … locally
//! per frame and per snapshot. The snapshot composer qualifies refs from
//! child frames with the frame's snapshot ordinal, producing the global
//! form the agent sees:
//!
//! ```text
//! ref := "e" digits            main-frame element
//!      | "f" digits "_" "e" digits    element inside iframe ordinal K
//! ```
//!
//! Frame ordinals are snapshot-local and assigned in traversal order; they
//! are not frame ids.

/// Whether a ref is frame-local (produced directly by a helper).
///
/// The composer uses this to avoid double-qualifying refs that a deeper
/// recursion level already rewrote.
pub fn is_local(ref_str: &str) -> bool {
    ref_str.starts_with('e')
}

/// Qualify a local ref with a frame ordinal: `(2, "e7")` → `"f2_e7"`.
pub fn global_ref(ordinal: u32, local_ref: &str) -> String {
    format!("f{ordinal}_{local_ref}")
}

/// Split a qualified ref back into `(ordinal, local_ref)`.
///
/// Returns `None` for local refs and anything outside the grammar.
pub fn parse_global(ref_str: &str) -> Option<(u32, &str)> {
    let rest = ref_str.strip_prefix('f')?;
    let (ordinal, local) = rest.split_once('_')?;
    let ordinal: u32 = ordinal.parse().ok()?;
    if !is_local(local) || !local[1..].chars().all(|c| c.is_ascii_digit()) || local.len() < 2 {
        return None;
    }
    Some((ordinal, local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_refs_start_with_e() {
        assert!(is_local("e1"));
        assert!(is_local("e42"));
        assert!(!is_local("f1_e1"));
        assert!(!is_local(""));
    }

    #[test]
    fn global_ref_formats_ordinal_and_local() {
        assert_eq!(global_ref(1, "e1"), "f1_e1");
        assert_eq!(global_ref(12, "e345"), "f12_e345");
    }

    #[test]
    fn parse_global_roundtrips() {
        for (ordinal, local) in [(1, "e1"), (3, "e9"), (17, "e230")] {
            let global = global_ref(ordinal, local);
            assert!(!is_local(&global));
            assert_eq!(parse_global(&global), Some((ordinal, local)));
        }
    }

    #[test]
    fn parse_global_rejects_local_refs() {
        assert_eq!(parse_global("e1"), None);
    }

    #[test]
    fn parse_global_rejects_malformed() {
        assert_eq!(parse_global("f_e1"), None);
        assert_eq!(parse_global("fX_e1"), None);
        assert_eq!(parse_global("f1_x1"), None);
        assert_eq!(parse_global("f1_e"), None);
        assert_eq!(parse_global("f1e1"), None);
        assert_eq!(parse_global(""), None);
    }
}
