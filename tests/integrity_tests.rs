use modelseal::ledger::{ConfirmationPolicy, MemoryLedger, RetryPolicy};
use modelseal::{
    AnchorCache, AnchorClient, Artifact, ArtifactDigests, ArtifactStore, Facet, LedgerError, Mutation,
    ParameterSet, Tensor, TrainingMetadata, Verdict, Verifier,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fixtures_path() -> &'static Path {
    Path::new("tests/fixtures")
}

fn scenario_artifact() -> Artifact {
    let params = ParameterSet::new(vec![Tensor::vector(&[1.0, 2.0]), Tensor::vector(&[3.0])]);
    let metadata = TrainingMetadata::new(250, 0.01);
    Artifact::new(1, &params, &metadata).unwrap()
}

/// Full-precision weights from a fixed xorshift sequence, in (-0.1, 0.1).
fn trained_weights(seed: u64, n: usize) -> Vec<f64> {
    let mut state = seed.max(1);
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 0.2
        })
        .collect()
}

fn trained_artifact(id: u64) -> Artifact {
    let weights = trained_weights(id, 50);
    let params = ParameterSet::new(vec![
        Tensor::vector(&weights[..32]),
        Tensor::vector(&[0.00039430133835633677, 0.1 + 0.2]),
        Tensor::vector(&weights[32..]),
    ]);
    let metadata = TrainingMetadata::new(250, 0.00039430133835633677);
    Artifact::new(id, &params, &metadata).unwrap()
}

fn client_for(ledger: Arc<MemoryLedger>, store: &ArtifactStore) -> AnchorClient {
    AnchorClient::new(ledger)
        .with_retry(RetryPolicy::new(3, Duration::ZERO))
        .with_confirmation(ConfirmationPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        })
        .with_cache(AnchorCache::in_dir(store.root()))
}

#[tokio::test]
async fn test_anchor_tamper_restore_scenario() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let ledger = Arc::new(MemoryLedger::new().with_confirmation_polls(2));
    let client = client_for(ledger.clone(), &store);
    let verifier = Verifier::new(&client, &store);

    let artifact = scenario_artifact();
    store.save(&artifact).unwrap();
    store.backup(1).unwrap();

    let receipt = client.anchor_artifact(&artifact).await.unwrap();
    assert!(!receipt.already_anchored);
    assert!(receipt.transaction_id.is_some());

    let result = verifier.verify_id(1).await.unwrap();
    assert_eq!(result.verdict, Verdict::Verified);

    let tampered = store.tamper(1, &Mutation::ShiftFirstTensor { delta: 0.01 }).unwrap();
    assert_eq!(
        tampered.parameters().unwrap().tensors[0].values(),
        vec![1.01, 2.01]
    );

    let result = verifier.verify_id(1).await.unwrap();
    assert_eq!(result.verdict, Verdict::Mismatch { facets: vec![Facet::Parameters] });
    assert!(result.check(Facet::Metadata).unwrap().matches);
    assert_eq!(result.verdict.exit_code(), 2);

    store.restore(1).unwrap();
    let result = verifier.verify_id(1).await.unwrap();
    assert_eq!(result.verdict, Verdict::Verified);

    assert_eq!(ledger.store_calls(), 1);
}

#[tokio::test]
async fn test_anchor_records_cache() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let client = client_for(Arc::new(MemoryLedger::new()), &store);

    let receipt = client.anchor_artifact(&scenario_artifact()).await.unwrap();
    let record = client.cache().unwrap().get(1).unwrap().unwrap();

    assert_eq!(record.parameters_hash, receipt.digests.parameters.to_hex());
    assert_eq!(record.metadata_hash, receipt.digests.metadata.to_hex());
    assert_eq!(record.transaction_id, receipt.transaction_id);
    assert!(dir.path().join("anchors.json").is_file());
}

#[tokio::test]
async fn test_imported_trainer_output_verifies_against_typed_artifact() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let client = client_for(Arc::new(MemoryLedger::new()), &store);

    // Anchor the typed artifact, verify the one imported from trainer JSON text.
    client.anchor_artifact(&scenario_artifact()).await.unwrap();
    let imported = store
        .import_model_data(1, fixtures_path().join("model_data.json"))
        .unwrap();
    assert_eq!(imported, scenario_artifact());

    let result = Verifier::new(&client, &store).verify_id(1).await.unwrap();
    assert!(result.is_verified());
}

#[tokio::test]
async fn test_unreachable_is_distinct_from_mismatch() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let ledger = Arc::new(MemoryLedger::new());
    let client = client_for(ledger.clone(), &store);

    let artifact = scenario_artifact();
    store.save(&artifact).unwrap();
    client.anchor_artifact(&artifact).await.unwrap();
    store.tamper(1, &Mutation::ShiftFirstTensor { delta: 0.01 }).unwrap();

    ledger.set_unreachable(true);
    let result = Verifier::new(&client, &store).verify_id(1).await.unwrap();
    match &result.verdict {
        Verdict::Unreachable { reason } => assert!(reason.contains("memory://ledger")),
        other => panic!("expected Unreachable, got {other:?}"),
    }
    assert_eq!(result.verdict.exit_code(), 3);

    ledger.set_unreachable(false);
    let result = Verifier::new(&client, &store).verify_id(1).await.unwrap();
    assert_eq!(result.mismatched_facets(), &[Facet::Parameters]);
}

#[tokio::test]
async fn test_verify_with_timeout_reports_unreachable() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let ledger = Arc::new(MemoryLedger::new());
    ledger.set_unreachable(true);

    let client = AnchorClient::new(ledger)
        .with_retry(RetryPolicy::new(100, Duration::from_millis(50)));
    let verifier = Verifier::new(&client, &store);

    let result = verifier
        .verify_with_timeout(&scenario_artifact(), Duration::from_millis(20))
        .await
        .unwrap();
    assert!(matches!(result.verdict, Verdict::Unreachable { .. }));
}

#[tokio::test]
async fn test_not_anchored_artifact() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let client = client_for(Arc::new(MemoryLedger::new()), &store);

    let result = Verifier::new(&client, &store).verify(&scenario_artifact()).await.unwrap();
    assert_eq!(result.verdict, Verdict::NotAnchored);
    assert_eq!(result.verdict.exit_code(), 3);
}

#[tokio::test]
async fn test_reanchor_policy() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let ledger = Arc::new(MemoryLedger::new());
    let client = client_for(ledger.clone(), &store);

    let original = scenario_artifact();
    let first = client.anchor_artifact(&original).await.unwrap();

    let again = client.anchor_artifact(&original).await.unwrap();
    assert!(again.already_anchored);
    assert_eq!(again.digests, first.digests);

    let mut retrained = original.clone();
    retrained.apply(&Mutation::SetMetadata { key: "epochs".into(), value: 300.into() }).unwrap();
    let err = client.anchor_artifact(&retrained).await.unwrap_err();
    assert!(matches!(err.ledger(), Some(LedgerError::Rejected { .. })));

    assert_eq!(ledger.store_calls(), 1);
    assert_eq!(client.query(1).await.unwrap(), first.digests);

    // A new version goes under a new id.
    let mut v2 = retrained.clone();
    v2.id = 2;
    assert!(!client.anchor_artifact(&v2).await.unwrap().already_anchored);
}

#[tokio::test]
async fn test_pending_anchor_is_not_visible() {
    let ledger = Arc::new(MemoryLedger::new().with_confirmation_polls(u32::MAX));
    let client = AnchorClient::new(ledger.clone())
        .with_retry(RetryPolicy::no_retry())
        .with_confirmation(ConfirmationPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        });

    let digests = ArtifactDigests::compute(&scenario_artifact()).unwrap();
    let err = client.anchor(1, digests).await.unwrap_err();
    assert_eq!(err.error_code(), "TIMEOUT");
    assert_eq!(ledger.pending_count(), 1);
    assert!(matches!(client.query(1).await, Err(LedgerError::NotFound { artifact_id: 1 })));
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.set_unreachable(true);
    let client = AnchorClient::new(ledger.clone()).with_retry(RetryPolicy::new(4, Duration::ZERO));

    let err = client.query(1).await.unwrap_err();
    match err {
        LedgerError::Unavailable { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(ledger.fetch_calls(), 0);
}

#[tokio::test]
async fn test_digests_survive_save_and_load() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let artifact = scenario_artifact();
    let before = ArtifactDigests::compute(&artifact).unwrap();
    store.save(&artifact).unwrap();
    let reloaded = store.load(1).unwrap();

    assert_eq!(ArtifactDigests::compute(&reloaded).unwrap(), before);
    assert_eq!(ArtifactDigests::compute(&reloaded).unwrap(), before);
}

#[tokio::test]
async fn test_full_precision_digests_survive_save_and_load() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    for id in 1..=50 {
        let artifact = trained_artifact(id);
        let before = ArtifactDigests::compute(&artifact).unwrap();
        store.save(&artifact).unwrap();

        let reloaded = store.load(id).unwrap();
        assert_eq!(reloaded, artifact, "artifact {id} changed on reload");
        assert_eq!(ArtifactDigests::compute(&reloaded).unwrap(), before);
    }
}

#[tokio::test]
async fn test_artifact_anchored_from_memory_verifies_from_store() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let client = client_for(Arc::new(MemoryLedger::new()), &store);
    let verifier = Verifier::new(&client, &store);

    for id in 1..=20 {
        let artifact = trained_artifact(id);
        store.save(&artifact).unwrap();
        client.anchor_artifact(&artifact).await.unwrap();

        let result = verifier.verify_id(id).await.unwrap();
        assert_eq!(result.verdict, Verdict::Verified, "artifact {id}");
    }
}

#[tokio::test]
async fn test_anchor_reads_back_stored_artifact() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let ledger = Arc::new(MemoryLedger::new().with_confirmation_polls(2));
    let client = client_for(ledger.clone(), &store);
    let verifier = Verifier::new(&client, &store);

    store.save(&trained_artifact(7)).unwrap();
    let loaded = store.load(7).unwrap();

    let (receipt, result) = verifier.anchor_and_confirm(&loaded).await.unwrap();
    assert!(!receipt.already_anchored);
    assert_eq!(result.verdict, Verdict::Verified);
    assert_eq!(result.verdict.exit_code(), 0);

    let (again, result) = verifier.anchor_and_confirm(&loaded).await.unwrap();
    assert!(again.already_anchored);
    assert!(result.is_verified());
    assert_eq!(ledger.store_calls(), 1);
}
