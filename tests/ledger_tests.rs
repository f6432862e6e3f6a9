use modelseal::error::{classify_rpc_error, ErrorContext};
use modelseal::ledger::abi;
use modelseal::ledger::rpc::JsonRpcResponse;
use modelseal::{LedgerBackend, LedgerError, MemoryLedger};

fn word(n: u64) -> String {
    format!("{:064x}", n)
}

#[test]
fn test_decode_unknown_id_response() {
    // getModelData for an id that was never stored: two empty strings.
    let data = format!("0x{}{}{}{}", word(0x40), word(0x60), word(0), word(0));
    let (a, b) = abi::decode_string_pair(&data).unwrap();
    assert!(a.is_empty());
    assert!(b.is_empty());
}

#[test]
fn test_decode_stored_hashes() {
    let p = "3b".repeat(32);
    let m = "c0".repeat(32);
    let data = format!(
        "0x{}{}{}{}{}{}",
        word(0x40),
        word(0xa0),
        word(64),
        hex::encode(&p),
        word(64),
        hex::encode(&m),
    );
    let (a, b) = abi::decode_string_pair(&data).unwrap();
    assert_eq!(a, p);
    assert_eq!(b, m);
}

#[test]
fn test_truncated_response_is_invalid() {
    let data = format!("0x{}{}{}", word(0x40), word(0x60), word(5));
    let err = abi::decode_string_pair(&data).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_RESPONSE");
    assert!(err.is_unreachable());
}

#[test]
fn test_store_call_offsets() {
    let p = "a".repeat(64);
    let m = "b".repeat(64);
    let data = abi::encode_store(1, &p, &m);
    let args = &data[2 + 8..];

    assert_eq!(&args[0..64], word(1));
    assert_eq!(&args[64..128], word(0x60));
    // 64-byte string: length word plus two data words.
    assert_eq!(&args[128..192], word(0x60 + 0x20 + 0x40));
    assert_eq!(&args[192..256], word(64));
}

#[test]
fn test_ganache_revert_is_rejected() {
    let body = r#"{
        "id": 7,
        "jsonrpc": "2.0",
        "error": {
            "code": -32000,
            "message": "VM Exception while processing transaction: revert Hash already stored"
        }
    }"#;
    let response: JsonRpcResponse = serde_json::from_str(body).unwrap();
    assert!(response.matches_id(7));

    let err = response.into_result().unwrap_err();
    let classified = classify_rpc_error(
        err.code,
        &err.full_message(),
        ErrorContext::new().with_operation("eth_sendTransaction"),
    );
    match classified {
        LedgerError::Rejected { reason, .. } => assert_eq!(reason, "Hash already stored"),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[test]
fn test_memory_ledger_through_backend_trait() {
    let ledger: Box<dyn LedgerBackend> = Box::new(MemoryLedger::new().with_confirmation_polls(2));

    tokio_test::block_on(async {
        assert_eq!(ledger.endpoint(), "memory://ledger");
        let tx = ledger.submit_store(3, "aa", "bb").await.unwrap();

        assert!(ledger.receipt(&tx).await.unwrap().is_none());
        assert!(ledger.fetch(3).await.unwrap().is_none());

        let receipt = ledger.receipt(&tx).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(ledger.block_number().await.unwrap(), receipt.block_number);
        assert_eq!(ledger.fetch(3).await.unwrap(), Some(("aa".to_string(), "bb".to_string())));
    });
}
