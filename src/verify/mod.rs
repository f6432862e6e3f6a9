mod result;

use std::time::Duration;
use tracing::{debug, info, warn};
use crate::artifact::{Artifact, ArtifactId, Facet};
use crate::digest::ArtifactDigests;
use crate::error::{LedgerError, Result};
use crate::ledger::{AnchorClient, AnchorReceipt};
use crate::store::ArtifactStore;

pub use result::{FacetCheck, FacetCheckRow, Verdict, VerificationResult};

/// Compares local artifacts with their anchored digests.
pub struct Verifier<'a> {
    client: &'a AnchorClient,
    store: &'a ArtifactStore,
}

impl<'a> Verifier<'a> {
    pub fn new(client: &'a AnchorClient, store: &'a ArtifactStore) -> Self {
        Self { client, store }
    }

    /// Local canonicalization failures are errors; everything the ledger
    /// says (or fails to say) becomes a verdict.
    pub async fn verify(&self, artifact: &Artifact) -> Result<VerificationResult> {
        let local = ArtifactDigests::compute(artifact)?;
        let id = artifact.id;

        let result = match self.client.query(id).await {
            Ok(anchored) => VerificationResult::from_checks(
                id,
                Facet::ALL
                    .iter()
                    .map(|&facet| FacetCheck::compare(facet, local.get(facet), anchored.get(facet)))
                    .collect(),
            ),
            Err(LedgerError::NotFound { .. }) => unanchored(id, &local, Verdict::NotAnchored),
            Err(e) if e.is_unreachable() => {
                warn!(artifact_id = id, "Ledger unavailable during verification: {}", e);
                unanchored(id, &local, Verdict::Unreachable { reason: e.to_string() })
            }
            Err(e) => return Err(e.into()),
        };

        match &result.verdict {
            Verdict::Mismatch { facets } => {
                warn!(artifact_id = id, ?facets, "Artifact does not match its anchor")
            }
            verdict => debug!(artifact_id = id, %verdict, "Verification finished"),
        }
        Ok(result)
    }

    pub async fn verify_id(&self, id: ArtifactId) -> Result<VerificationResult> {
        let artifact = self.store.load(id)?;
        self.verify(&artifact).await
    }

    /// `verify` bounded by an overall deadline; running out of time is
    /// reported as `Unreachable`.
    pub async fn verify_with_timeout(&self, artifact: &Artifact, timeout: Duration) -> Result<VerificationResult> {
        match tokio::time::timeout(timeout, self.verify(artifact)).await {
            Ok(result) => result,
            Err(_) => {
                let local = ArtifactDigests::compute(artifact)?;
                let reason = format!("no answer from {} within {:?}", self.client.endpoint(), timeout);
                Ok(unanchored(artifact.id, &local, Verdict::Unreachable { reason }))
            }
        }
    }

    /// Anchor and read the anchor back.
    pub async fn anchor_and_confirm(&self, artifact: &Artifact) -> Result<(AnchorReceipt, VerificationResult)> {
        let receipt = self.client.anchor_artifact(artifact).await?;
        let result = self.verify(artifact).await?;
        if result.is_verified() {
            info!(artifact_id = artifact.id, "Anchor read back and verified");
        }
        Ok((receipt, result))
    }
}

fn unanchored(id: ArtifactId, local: &ArtifactDigests, verdict: Verdict) -> VerificationResult {
    VerificationResult {
        artifact_id: id,
        checks: Facet::ALL
            .iter()
            .map(|&facet| FacetCheck::unanchored(facet, local.get(facet)))
            .collect(),
        verdict,
    }
}
