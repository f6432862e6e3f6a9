use serde::Serialize;
use tabled::Tabled;
use crate::artifact::{ArtifactId, Facet};
use crate::digest::Digest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    /// The listed facets differ from their anchored digests.
    Mismatch { facets: Vec<Facet> },
    NotAnchored,
    /// The ledger could not be consulted. Says nothing about the artifact.
    Unreachable { reason: String },
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Verified => "verified",
            Verdict::Mismatch { .. } => "mismatch",
            Verdict::NotAnchored => "not_anchored",
            Verdict::Unreachable { .. } => "unreachable",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Verdict::Verified => "✓",
            Verdict::Mismatch { .. } => "✗",
            Verdict::NotAnchored => "?",
            Verdict::Unreachable { .. } => "!",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            Verdict::Verified => 0,
            Verdict::Mismatch { .. } => 2,
            Verdict::NotAnchored | Verdict::Unreachable { .. } => 3,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Verified => write!(f, "verified"),
            Verdict::Mismatch { facets } => {
                let names: Vec<&str> = facets.iter().map(Facet::as_str).collect();
                write!(f, "mismatch ({})", names.join(", "))
            }
            Verdict::NotAnchored => write!(f, "not anchored"),
            Verdict::Unreachable { reason } => write!(f, "ledger unreachable: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCheck {
    pub facet: Facet,
    pub local: Digest,
    pub anchored: Option<Digest>,
    pub matches: bool,
}

impl FacetCheck {
    pub fn compare(facet: Facet, local: Digest, anchored: Digest) -> Self {
        Self {
            facet,
            local,
            anchored: Some(anchored),
            matches: local == anchored,
        }
    }

    pub fn unanchored(facet: Facet, local: Digest) -> Self {
        Self {
            facet,
            local,
            anchored: None,
            matches: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub artifact_id: ArtifactId,
    pub checks: Vec<FacetCheck>,
    pub verdict: Verdict,
}

impl VerificationResult {
    /// Derive the verdict from facet checks against an existing anchor.
    pub fn from_checks(artifact_id: ArtifactId, checks: Vec<FacetCheck>) -> Self {
        let facets: Vec<Facet> = checks.iter().filter(|c| !c.matches).map(|c| c.facet).collect();
        let verdict = if facets.is_empty() {
            Verdict::Verified
        } else {
            Verdict::Mismatch { facets }
        };
        Self {
            artifact_id,
            checks,
            verdict,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verdict == Verdict::Verified
    }

    pub fn mismatched_facets(&self) -> &[Facet] {
        match &self.verdict {
            Verdict::Mismatch { facets } => facets,
            _ => &[],
        }
    }

    pub fn check(&self, facet: Facet) -> Option<&FacetCheck> {
        self.checks.iter().find(|c| c.facet == facet)
    }

    pub fn table_rows(&self) -> Vec<FacetCheckRow> {
        self.checks.iter().map(FacetCheckRow::from).collect()
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct FacetCheckRow {
    #[tabled(rename = "Facet")]
    pub facet: String,
    #[tabled(rename = "Local")]
    pub local: String,
    #[tabled(rename = "Anchored")]
    pub anchored: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&FacetCheck> for FacetCheckRow {
    fn from(check: &FacetCheck) -> Self {
        let status = match (&check.anchored, check.matches) {
            (None, _) => "- unanchored",
            (Some(_), true) => "✓ match",
            (Some(_), false) => "✗ differs",
        };
        FacetCheckRow {
            facet: check.facet.to_string(),
            local: check.local.short(),
            anchored: check
                .anchored
                .map(|d| d.short())
                .unwrap_or_else(|| "-".to_string()),
            status: status.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_match_is_verified() {
        let d = Digest::of(b"x");
        let result = VerificationResult::from_checks(
            1,
            vec![
                FacetCheck::compare(Facet::Parameters, d, d),
                FacetCheck::compare(Facet::Metadata, d, d),
            ],
        );
        assert!(result.is_verified());
        assert!(result.mismatched_facets().is_empty());
        assert_eq!(result.verdict.exit_code(), 0);
    }

    #[test]
    fn test_mismatch_names_facet() {
        let a = Digest::of(b"a");
        let b = Digest::of(b"b");
        let result = VerificationResult::from_checks(
            1,
            vec![
                FacetCheck::compare(Facet::Parameters, a, b),
                FacetCheck::compare(Facet::Metadata, a, a),
            ],
        );
        assert_eq!(result.mismatched_facets(), &[Facet::Parameters]);
        assert_eq!(result.verdict.to_string(), "mismatch (parameters)");
        assert_eq!(result.verdict.exit_code(), 2);
        assert!(!result.check(Facet::Parameters).unwrap().matches);
    }

    #[test]
    fn test_verdict_json_shape() {
        let verdict = Verdict::Mismatch { facets: vec![Facet::Metadata] };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json, serde_json::json!({"status": "mismatch", "facets": ["metadata"]}));

        let json = serde_json::to_value(Verdict::NotAnchored).unwrap();
        assert_eq!(json, serde_json::json!({"status": "not_anchored"}));
    }

    #[test]
    fn test_unanchored_row() {
        let row = FacetCheckRow::from(&FacetCheck::unanchored(Facet::Metadata, Digest::of(b"m")));
        assert_eq!(row.anchored, "-");
        assert_eq!(row.facet, "metadata");
    }
}
