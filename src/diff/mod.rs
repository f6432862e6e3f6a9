use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use crate::artifact::{Artifact, Facet};
use crate::error::Result;

/// Canonical form of a facet, pretty-printed one value per line so that a
/// line diff points at the scalar that changed.
pub fn pretty_facet(artifact: &Artifact, facet: Facet) -> Result<String> {
    let canonical = artifact.canonical_text(facet)?;
    let value: serde_json::Value = serde_json::from_str(&canonical)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn format_facet_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&"───────────────────────────────────────\n".dimmed().to_string());

    for op in diff.grouped_ops(2) {
        for change in op.iter().flat_map(|o| diff.iter_changes(o)) {
            let line = change.to_string();
            let formatted = match change.tag() {
                ChangeTag::Delete => format!("- {}", line.trim_end()).red().to_string(),
                ChangeTag::Insert => format!("+ {}", line.trim_end()).green().to_string(),
                ChangeTag::Equal => format!("  {}", line.trim_end()),
            };
            output.push_str(&formatted);
            output.push('\n');
        }
    }

    output.push_str(&"───────────────────────────────────────".dimmed().to_string());

    output
}

pub fn has_changes(old: &str, new: &str) -> bool {
    old.trim() != new.trim()
}

/// Facets that differ between two versions of an artifact, with a rendered
/// diff for each.
pub fn diff_artifacts(before: &Artifact, after: &Artifact) -> Result<Vec<(Facet, String)>> {
    let mut diffs = Vec::new();
    for facet in Facet::ALL {
        let old = pretty_facet(before, facet)?;
        let new = pretty_facet(after, facet)?;
        if has_changes(&old, &new) {
            diffs.push((facet, format_facet_diff(&old, &new)));
        }
    }
    Ok(diffs)
}
