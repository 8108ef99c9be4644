//! Verdict classification of captured server output
//!
//! gopls reports workspace-root resolution on its error stream, not in its
//! protocol replies, so classification is a pure function of the captured
//! stderr text. Checks are ordered: the found marker wins over the not-found
//! markers when both appear in the same output. That optimistic tie-break is
//! deliberate and must not be reordered.

use std::fmt;

/// Marker logged when the server located the module manifest
const FOUND_MARKERS: &[&str] = &["using go.mod"];

/// Markers logged when the server failed to locate the module manifest
const NOT_FOUND_MARKERS: &[&str] = &["no go.mod", "not found"];

/// Three-valued judgment of whether the server recognized the workspace root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Server located go.mod - workspace recognized
    Recognized,
    /// Server could not find go.mod - workspace not recognized
    NotRecognized,
    /// Output contained neither marker - manual analysis needed
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Recognized => {
                write!(f, "\u{2705} server found go.mod - workspace recognized")
            }
            Verdict::NotRecognized => {
                write!(
                    f,
                    "\u{274c} server could not find go.mod - workspace NOT recognized"
                )
            }
            Verdict::Inconclusive => write!(f, "? unclear result - manual analysis needed"),
        }
    }
}

/// Classify captured stderr text into a verdict
///
/// Total over all inputs: any text maps to exactly one verdict. Matching is
/// case-insensitive substring search, found markers checked first.
pub fn classify(stderr: &str) -> Verdict {
    let text = stderr.to_lowercase();

    if FOUND_MARKERS.iter().any(|marker| text.contains(marker)) {
        Verdict::Recognized
    } else if NOT_FOUND_MARKERS.iter().any(|marker| text.contains(marker)) {
        Verdict::NotRecognized
    } else {
        Verdict::Inconclusive
    }
}
