use criterion::{black_box, criterion_group, criterion_main, Criterion};
use folio_collab::{
    CursorPosition, DocumentService, DocumentStore, NewDocument, ServiceConfig,
    StaticUserDirectory, StoreConfig, UserProfile,
};
use folio_core::{ArchivedVersion, VersionArchive, VersionDelta};
use std::sync::Arc;
use uuid::Uuid;

/// ~10KB page with one paragraph changed per revision.
fn sample_page(rev: usize) -> String {
    (0..160)
        .map(|i| {
            if i % 23 == rev % 23 {
                format!("Section {i} was rewritten during revision {rev}.")
            } else {
                format!("Section {i}: collaborative notes for the weekly review.")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_update_document(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = DocumentService::in_memory(
        Arc::new(StaticUserDirectory::default()),
        ServiceConfig::default(),
    );
    let doc = rt
        .block_on(service.create_document(NewDocument::new(Uuid::new_v4(), "Bench", sample_page(0), 1)))
        .unwrap();

    let mut rev = 0;
    c.bench_function("update_document_10kb", |b| {
        b.iter(|| {
            rev += 1;
            let page = sample_page(rev);
            rt.block_on(async {
                black_box(
                    service
                        .update_document_content(doc.id, black_box(&page), None, 1)
                        .await
                        .unwrap(),
                );
            });
        })
    });
}

fn bench_cursor_fan_in(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let directory = StaticUserDirectory::new((0..50).map(|i| UserProfile::new(i, format!("User{i}"))));
    let service = DocumentService::in_memory(Arc::new(directory), ServiceConfig::default());
    let doc = Uuid::new_v4();

    rt.block_on(async {
        for user in 0..50u64 {
            service.join_editing(doc, user).await;
            service
                .update_cursor(user, CursorPosition::new(user, doc, user as u32, 0))
                .await;
        }
    });

    c.bench_function("cursor_fan_in_50_editors", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(service.cursors(black_box(doc)).await);
            });
        })
    });

    c.bench_function("online_editors_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(service.online_editors(black_box(doc)).await);
            });
        })
    });
}

fn bench_archive_range(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let doc = Uuid::new_v4();
    let project = Uuid::new_v4();

    for version in 2..=201u32 {
        let delta = VersionDelta {
            version,
            content_diff: format!("@@ -1,1 +1,1 @@\n-line {}\n+line {version}\n", version - 1),
            change_description: "bench".into(),
            editor_id: 1,
            created_at: 0,
            added_lines: 1,
            deleted_lines: 1,
            changed_chars: 1,
            content_hash: String::new(),
        };
        store
            .persist(&ArchivedVersion::new(doc, project, delta))
            .unwrap();
    }

    c.bench_function("rocksdb_find_range_50", |b| {
        b.iter(|| black_box(store.find_range(doc, black_box(100), black_box(150)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_update_document,
    bench_cursor_fan_in,
    bench_archive_range,
);
criterion_main!(benches);
