//! Document service integration tests.
//!
//! Verifies:
//! - Create → update → history → reconstruct through the service API
//! - No-op updates, default descriptions, version comparison
//! - History deletion for a document and for a whole project
//! - Lock mutual exclusion under concurrent callers
//! - Lock-then-write policy

use std::sync::Arc;

use folio_collab::{
    DocumentService, MemoryTtlStore, NewDocument, ServiceConfig, ServiceError,
    StaticUserDirectory, WritePolicy,
};
use folio_core::diff::apply_patch;
use uuid::Uuid;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn service(config: ServiceConfig) -> DocumentService {
    init_logging();
    DocumentService::in_memory(Arc::new(StaticUserDirectory::default()), config)
}

// ─── Versioning ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_and_update_hello_world() {
    let service = service(ServiceConfig::default());
    let project = Uuid::new_v4();

    let doc = service
        .create_document(NewDocument::new(project, "Greeting", "Hello", 7))
        .await
        .unwrap();
    assert_eq!(doc.current_version, 1);
    assert_eq!(doc.content_summary, "Hello");

    let updated = service
        .update_document_content(doc.id, "Hello World", None, 7)
        .await
        .unwrap();
    assert_eq!(updated.current_version, 2);
    assert_eq!(updated.updated_by, 7);

    let stored = service.get_document(doc.id).await.unwrap();
    assert_eq!(stored, updated);
    assert_eq!(stored.recent_versions[0].changed_chars, 6);
    assert_eq!(stored.recent_versions[0].change_description, "Update content");

    assert_eq!(service.version_content(doc.id, 1).await.unwrap(), "Hello");
    assert_eq!(service.version_content(doc.id, 2).await.unwrap(), "Hello World");
}

#[tokio::test]
async fn test_identical_content_does_not_create_version() {
    let service = service(ServiceConfig::default());
    let doc = service
        .create_document(NewDocument::new(Uuid::new_v4(), "Page", "body", 1))
        .await
        .unwrap();

    let first = service
        .update_document_content(doc.id, "new body", Some("rewrite"), 2)
        .await
        .unwrap();
    let second = service
        .update_document_content(doc.id, "new body", Some("rewrite again"), 3)
        .await
        .unwrap();

    assert_eq!(first.current_version, 2);
    assert_eq!(second, first);
    assert_eq!(service.version_history(doc.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deep_history_through_service() {
    let service = service(ServiceConfig::for_testing());
    let doc = service
        .create_document(NewDocument::new(Uuid::new_v4(), "Log", "", 1))
        .await
        .unwrap();

    let mut contents = vec![String::new()];
    for i in 1..=12 {
        let next = format!("{}entry {i}\n", contents.last().unwrap());
        service
            .update_document_content(doc.id, &next, Some(format!("add entry {i}").as_str()), 1)
            .await
            .unwrap();
        contents.push(next);
    }

    let history = service.version_history(doc.id).await.unwrap();
    assert_eq!(history.len(), 12);
    assert_eq!(history[0].version, 13);
    assert_eq!(history[0].change_description, "add entry 12");
    assert_eq!(history.iter().filter(|h| h.archived).count(), 9);
    assert_eq!(service.recent_versions(doc.id).await.unwrap().len(), 3);

    for (i, expected) in contents.iter().enumerate() {
        let content = service.version_content(doc.id, i as u32 + 1).await.unwrap();
        assert_eq!(&content, expected);
    }

    let patch = service.compare_versions(doc.id, 3, 10).await.unwrap();
    assert_eq!(apply_patch(&contents[2], &patch).unwrap(), contents[9]);
}

#[tokio::test]
async fn test_unknown_version_is_an_error() {
    let service = service(ServiceConfig::default());
    let doc = service
        .create_document(NewDocument::new(Uuid::new_v4(), "Page", "a", 1))
        .await
        .unwrap();

    let err = service.version_content(doc.id, 5).await.unwrap_err();
    assert!(matches!(err, ServiceError::Version(_)));
    assert!(err.to_string().contains('5'));
}

#[tokio::test]
async fn test_delete_history_keeps_window() {
    let service = service(ServiceConfig::for_testing());
    let project = Uuid::new_v4();
    let a = service
        .create_document(NewDocument::new(project, "A", "a0", 1))
        .await
        .unwrap();
    let b = service
        .create_document(NewDocument::new(project, "B", "b0", 1))
        .await
        .unwrap();
    for i in 1..=5 {
        service
            .update_document_content(a.id, &format!("a{i}"), None, 1)
            .await
            .unwrap();
        service
            .update_document_content(b.id, &format!("b{i}"), None, 1)
            .await
            .unwrap();
    }
    assert_eq!(service.archived_version_count(project).await.unwrap(), 4);

    assert_eq!(service.delete_version_history(a.id).await.unwrap(), 2);
    let history = service.version_history(a.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|h| !h.archived));
    assert!(service.version_content(a.id, 1).await.is_err());
    assert_eq!(service.version_content(a.id, 3).await.unwrap(), "a2");

    assert_eq!(service.delete_version_history_for_project(project).await.unwrap(), 2);
    assert_eq!(service.archived_version_count(project).await.unwrap(), 0);
    assert_eq!(service.documents_for_project(project).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_document() {
    let service = service(ServiceConfig::default());
    let project = Uuid::new_v4();
    let doc = service
        .create_document(NewDocument::new(project, "Gone", "soon", 1))
        .await
        .unwrap();

    assert!(service.delete_document(doc.id).await.unwrap());
    assert!(!service.delete_document(doc.id).await.unwrap());
    assert!(matches!(
        service.get_document(doc.id).await,
        Err(ServiceError::DocumentNotFound(_))
    ));
    assert!(service.documents_for_project(project).await.unwrap().is_empty());
}

// ─── Locks ───────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lock_has_single_winner() {
    let service = Arc::new(service(ServiceConfig::default()));
    let doc = Uuid::new_v4();

    let handles: Vec<_> = (1..=32u64)
        .map(|user| {
            let service = service.clone();
            tokio::spawn(async move { (user, service.try_lock(user, doc).await) })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let (user, won) = handle.await.unwrap();
        if won {
            winners.push(user);
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(service.lock_owner(doc).await, Some(winners[0]));
}

#[tokio::test]
async fn test_release_requires_owner() {
    let service = service(ServiceConfig::default());
    let doc = Uuid::new_v4();

    assert!(service.try_lock(1, doc).await);
    assert!(!service.release_lock(doc, 2).await);
    assert_eq!(service.lock_owner(doc).await, Some(1));
    assert!(service.release_lock(doc, 1).await);
    assert_eq!(service.lock_owner(doc).await, None);
}

#[tokio::test]
async fn test_lock_then_write_policy() {
    let service = service(ServiceConfig::default().with_write_policy(WritePolicy::LockThenWrite));
    let doc = service
        .create_document(NewDocument::new(Uuid::new_v4(), "Locked", "v1", 1))
        .await
        .unwrap();

    let err = service
        .update_document_content(doc.id, "v2", None, 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotLockHolder { owner: None, editor_id: 1, .. }
    ));

    assert!(service.try_lock(2, doc.id).await);
    let err = service
        .update_document_content(doc.id, "v2", None, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotLockHolder { owner: Some(2), .. }));

    let updated = service
        .update_document_content(doc.id, "v2", None, 2)
        .await
        .unwrap();
    assert_eq!(updated.current_version, 2);
}

#[tokio::test]
async fn test_lock_then_write_rejects_when_lock_store_is_down() {
    init_logging();
    let ttl_store = Arc::new(MemoryTtlStore::new());
    let service = DocumentService::new(
        Arc::new(folio_collab::MemoryDocumentRepository::new()),
        Arc::new(folio_core::MemoryArchive::new()),
        ttl_store.clone(),
        ttl_store.clone(),
        Arc::new(StaticUserDirectory::default()),
        ServiceConfig::default().with_write_policy(WritePolicy::LockThenWrite),
    );
    let doc = service
        .create_document(NewDocument::new(Uuid::new_v4(), "Page", "v1", 1))
        .await
        .unwrap();
    assert!(service.try_lock(1, doc.id).await);

    ttl_store.set_offline(true);
    let err = service
        .update_document_content(doc.id, "v2", None, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::LockUnavailable(_)));

    ttl_store.set_offline(false);
    let updated = service
        .update_document_content(doc.id, "v2", None, 1)
        .await
        .unwrap();
    assert_eq!(updated.current_version, 2);
}

#[tokio::test]
async fn test_best_effort_ignores_lock() {
    let service = service(ServiceConfig::default());
    let doc = service
        .create_document(NewDocument::new(Uuid::new_v4(), "Open", "v1", 1))
        .await
        .unwrap();
    assert!(service.try_lock(2, doc.id).await);

    let updated = service
        .update_document_content(doc.id, "v2", None, 1)
        .await
        .unwrap();
    assert_eq!(updated.current_version, 2);
}
