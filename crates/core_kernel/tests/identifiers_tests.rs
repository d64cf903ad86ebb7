//! Tests for the typed identifiers

use core_kernel::{AdjustmentId, BatchId, ClaimId, DebtorId, NotaId, PaymentId};
use uuid::Uuid;

#[test]
fn test_display_carries_prefix() {
    assert!(BatchId::new().to_string().starts_with("BAT-"));
    assert!(NotaId::new().to_string().starts_with("NTA-"));
    assert!(AdjustmentId::new().to_string().starts_with("DCN-"));
    assert_eq!(ClaimId::prefix(), "CLM");
}

#[test]
fn test_parse_accepts_bare_uuid() {
    let uuid = Uuid::new_v4();
    let id: PaymentId = uuid.to_string().parse().unwrap();
    assert_eq!(*id.as_uuid(), uuid);
}

#[test]
fn test_parse_rejects_garbage() {
    assert!("NTA-not-a-uuid".parse::<NotaId>().is_err());
}

#[test]
fn test_v7_ids_are_time_ordered() {
    let first = DebtorId::new_v7();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = DebtorId::new_v7();
    assert!(first < second);
}

#[test]
fn test_ids_serialize_as_plain_uuid() {
    let uuid = Uuid::new_v4();
    let id = BatchId::from_uuid(uuid);

    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", uuid));

    let back: BatchId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
