pub mod error;
pub mod canon;
pub mod digest;
pub mod artifact;
pub mod store;
pub mod ledger;
pub mod verify;
pub mod config;
pub mod diff;

pub use error::{ModelSealError, LedgerError, Result};
pub use canon::{canonical_json_bytes, canonical_json_string, canonicalize_str, CanonError};
pub use digest::{ArtifactDigests, Digest};
pub use artifact::{Artifact, ArtifactId, Facet, Mutation, ParameterSet, Tensor, TrainingMetadata};
pub use store::{ArtifactStore, ModelDataFile, StoredArtifact};
pub use ledger::{
    AnchorCache, AnchorClient, AnchorReceipt, AnchorRecord, ConfirmationPolicy, LedgerBackend,
    LedgerStatus, MemoryLedger, RetryPolicy, RpcLedger,
};
pub use verify::{FacetCheck, FacetCheckRow, Verdict, VerificationResult, Verifier};
pub use config::{Config, LedgerConfig, RetryConfig, StoreConfig};
pub use diff::{diff_artifacts, format_facet_diff, has_changes, pretty_facet};
