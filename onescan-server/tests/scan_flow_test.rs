//! End-to-end scan flows against a file-backed store

use std::sync::Arc;

use onescan_server::TrackerService;
use onescan_server::tracking::storage::TrackerFilter;
use shared::ErrorCode;
use shared::tracker::{
    DuplicatePolicy, RejectReason, ScanOutcome, Stage, TrackerMetadata, TrackerRegistration,
};

fn registration(code: &str, sku_count: u32, courier: &str) -> TrackerRegistration {
    TrackerRegistration {
        tracker_code: code.to_string(),
        sku_count,
        metadata: TrackerMetadata {
            courier: courier.to_string(),
            amount: 250.0,
            ..TrackerMetadata::default()
        },
    }
}

async fn open_service(dir: &tempfile::TempDir) -> TrackerService {
    TrackerService::open(dir.path()).unwrap()
}

#[tokio::test]
async fn test_full_lifecycle_single_sku() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir).await;

    for stage in [Stage::Label, Stage::Packing, Stage::Dispatch] {
        let result = service.record_scan("trk-100", stage, None).await.unwrap();
        assert_eq!(result.outcome, ScanOutcome::Success, "stage {stage}");
        assert!(result.progress.is_complete());
    }

    let tracker = service.get_tracker("TRK-100").await.unwrap();
    assert!(tracker.is_completed());
    assert_eq!(tracker.next_step(), None);

    let again = service
        .record_scan("TRK-100", Stage::Dispatch, None)
        .await
        .unwrap();
    assert_eq!(again.outcome, ScanOutcome::Rejected);
    assert_eq!(again.reason, Some(RejectReason::StageAlreadyComplete));
}

#[tokio::test]
async fn test_out_of_order_scan_is_rejected_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir).await;

    let result = service
        .record_scan("TRK-200", Stage::Dispatch, None)
        .await
        .unwrap();
    assert_eq!(result.outcome, ScanOutcome::Rejected);
    assert_eq!(result.reason, Some(RejectReason::StageOutOfOrder));

    let recent = service.recent_scans(None, None, None).await.unwrap();
    assert_eq!(recent.count, 1);
    assert_eq!(recent.results[0].outcome, ScanOutcome::Rejected);
}

#[tokio::test]
async fn test_multi_sku_needs_distinct_refs() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir).await;
    service
        .register_trackers(vec![registration("TRK-300", 2, "Delhivery")], DuplicatePolicy::Skip)
        .await
        .unwrap();

    let first = service
        .record_scan("TRK-300", Stage::Label, Some("SKU-A"))
        .await
        .unwrap();
    assert_eq!(first.outcome, ScanOutcome::Success);
    assert!(!first.progress.is_complete());

    let dup = service
        .record_scan("TRK-300", Stage::Label, Some("SKU-A"))
        .await
        .unwrap();
    assert_eq!(dup.outcome, ScanOutcome::Duplicate);
    assert_eq!(dup.progress.scanned, 1);

    let second = service
        .record_scan("TRK-300", Stage::Label, Some("SKU-B"))
        .await
        .unwrap();
    assert_eq!(second.outcome, ScanOutcome::Success);
    assert!(second.progress.is_complete());
    assert_eq!(second.next_step, Some(Stage::Packing));
}

#[tokio::test]
async fn test_cancelled_tracker_rejects_scans() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir).await;
    service.record_scan("TRK-400", Stage::Label, None).await.unwrap();

    service.cancel("TRK-400").await.unwrap();
    // idempotent
    let tracker = service.cancel("trk-400").await.unwrap();
    assert!(tracker.cancelled);

    let result = service
        .record_scan("TRK-400", Stage::Packing, None)
        .await
        .unwrap();
    assert_eq!(result.reason, Some(RejectReason::AlreadyCancelled));
}

#[tokio::test]
async fn test_cancel_unknown_tracker_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir).await;
    let err = service.cancel("NOPE-1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TrackerNotFound);
}

#[tokio::test]
async fn test_parallel_scans_on_single_unit_tracker() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(open_service(&dir).await);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .record_scan("TRK-500", Stage::Label, None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut successes = 0;
    let mut others = 0;
    for handle in handles {
        match handle.await.unwrap().outcome {
            ScanOutcome::Success => successes += 1,
            ScanOutcome::Rejected | ScanOutcome::Duplicate => others += 1,
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(others, 9);

    let stats = service.dashboard_stats().await.unwrap();
    assert_eq!(stats.stage_scans.get(&Stage::Label), Some(&1));
    assert_eq!(stats.outcomes.get(&ScanOutcome::Rejected), Some(&9));
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let service = open_service(&dir).await;
        service
            .register_trackers(
                vec![
                    registration("TRK-601", 1, "Ekart"),
                    registration("TRK-602", 1, "Delhivery"),
                ],
                DuplicatePolicy::Skip,
            )
            .await
            .unwrap();
        service.record_scan("TRK-601", Stage::Label, None).await.unwrap();
    }

    let service = open_service(&dir).await;
    let ekart = service
        .list_trackers(&TrackerFilter {
            courier: Some("ekart".to_string()),
            completed_stage: None,
        })
        .await
        .unwrap();
    assert_eq!(ekart.len(), 1);
    assert!(ekart[0].is_stage_complete(Stage::Label));

    let platform = service.platform_statistics(Some(Stage::Label)).await.unwrap();
    assert_eq!(platform.total_trackers, 2);
    for group in &platform.platforms {
        assert_eq!(group.scanned + group.pending, group.total);
    }
}
