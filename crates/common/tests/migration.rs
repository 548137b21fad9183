//! End-to-end migration from the legacy format to the current one

mod common;

use ::common::crypto::Secret;
use ::common::linked_data::cid_for;
use ::common::linked_data::LD_CBOR_CODEC;
use ::common::migration::{MigrateError, Migration, VersionMismatch};
use ::common::store::MemoryStore;
use ::common::tree::{
    read_version, CurrentFormat, Entry, FileContent, LegacyFormat, RootBlock, TreeError,
};

use crate::common::{build_tree, dir, file, read_all};

fn files(entries: Vec<Entry>) -> Vec<Entry> {
    entries.into_iter().filter(|e| !e.is_directory()).collect()
}

#[tokio::test]
async fn test_migrates_public_and_private_content() {
    let store = MemoryStore::new();
    let read_key = Secret::generate();
    let source = build_tree::<LegacyFormat>(
        &store,
        &read_key,
        vec![
            file("/public/a.txt", "hello"),
            dir("/private/b"),
            file("/private/b/c.txt", vec![7u8, 0, 255]),
        ],
    )
    .await;

    let summary = Migration::new(store.clone(), read_key.clone())
        .run(source)
        .await
        .unwrap();

    assert_eq!(summary.source_root, source);
    assert_ne!(summary.migrated_root, source);
    assert_eq!(summary.written, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(
        read_version(&store, &summary.migrated_root).await.unwrap(),
        "2.0.0"
    );
    // the source tree is left as it was
    assert_eq!(read_version(&store, &source).await.unwrap(), "1.0.0");

    let migrated = read_all::<CurrentFormat>(&store, summary.migrated_root, &read_key).await;
    assert_eq!(
        migrated,
        vec![
            dir("/public"),
            file("/public/a.txt", "hello"),
            dir("/private"),
            dir("/private/b"),
            file("/private/b/c.txt", vec![7u8, 0, 255]),
        ]
    );
}

#[tokio::test]
async fn test_sample_tree_content_survives() {
    let store = MemoryStore::new();
    let read_key = Secret::generate();
    let source = build_tree::<LegacyFormat>(&store, &read_key, common::sample_entries()).await;

    let summary = Migration::new(store.clone(), read_key.clone())
        .run(source)
        .await
        .unwrap();

    let migrated = read_all::<CurrentFormat>(&store, summary.migrated_root, &read_key).await;
    assert_eq!(files(migrated), files(common::sample_entries()));
}

#[tokio::test]
async fn test_transform_rewrites_and_drops() {
    let store = MemoryStore::new();
    let read_key = Secret::generate();
    let source = build_tree::<LegacyFormat>(&store, &read_key, common::sample_entries()).await;

    let summary = Migration::new(store.clone(), read_key.clone())
        .with_transform(|entry| match entry {
            Entry::File { path, .. } if path.name() == "notes.txt" => None,
            Entry::File { path, content: FileContent::Text(text) } => Some(Entry::File {
                path,
                content: FileContent::Text(text.to_uppercase()),
            }),
            other => Some(other),
        })
        .run(source)
        .await
        .unwrap();

    let migrated = read_all::<CurrentFormat>(&store, summary.migrated_root, &read_key).await;
    let paths = common::paths(&migrated);
    assert!(!paths.contains(&"/private/notes.txt".to_string()));
    assert!(migrated.contains(&file("/public/a.txt", "HELLO")));
}

#[tokio::test]
async fn test_migration_runs_on_a_spawned_task() {
    let store = MemoryStore::new();
    let read_key = Secret::generate();
    let source = build_tree::<LegacyFormat>(&store, &read_key, common::sample_entries()).await;

    let mut migration = Migration::new(store.clone(), read_key.clone()).with_transform(Some);
    let summary = tokio::spawn(async move { migration.run(source).await })
        .await
        .unwrap()
        .unwrap();

    assert!(summary.failures.is_empty());
    assert_eq!(summary.written, common::sample_entries().len());
}

#[tokio::test]
async fn test_already_migrated_is_refused() {
    let store = MemoryStore::new();
    let read_key = Secret::generate();
    let root = build_tree::<CurrentFormat>(&store, &read_key, common::sample_entries()).await;
    let blocks = store.len();

    let result = Migration::new(store.clone(), read_key).run(root).await;

    assert!(matches!(
        result,
        Err(MigrateError::Version(VersionMismatch::AlreadyMigrated { ref found })) if found == "2.0.0"
    ));
    // nothing was written
    assert_eq!(store.len(), blocks);
}

#[tokio::test]
async fn test_unknown_version_is_refused() {
    let store = MemoryStore::new();
    let public = cid_for(LD_CBOR_CODEC, b"public");
    let private = cid_for(LD_CBOR_CODEC, b"private");
    let root = RootBlock::store(&store, "0.9.0", public, private).await.unwrap();

    let err = Migration::new(store.clone(), Secret::generate())
        .run(root)
        .await
        .unwrap_err();

    match err {
        MigrateError::Version(VersionMismatch::Unknown { expected, found }) => {
            assert_eq!(expected, "1.0.0");
            assert_eq!(found, "0.9.0");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreadable_partition_root_is_fatal_only_for_the_root() {
    let store = MemoryStore::new();
    let read_key = Secret::generate();
    let source = build_tree::<LegacyFormat>(&store, &read_key, common::sample_entries()).await;
    let root = RootBlock::load(&store, &source).await.unwrap();
    store.remove(&root.private);

    let summary = Migration::new(store.clone(), read_key.clone())
        .run(source)
        .await
        .unwrap();

    let migrated = read_all::<CurrentFormat>(&store, summary.migrated_root, &read_key).await;
    assert!(migrated
        .iter()
        .all(|e| e.path().to_string().starts_with("/public") || e.path().to_string() == "/private"));

    // a missing source root is a different matter
    store.remove(&source);
    let result = Migration::new(store.clone(), read_key).run(source).await;
    assert!(matches!(
        result,
        Err(MigrateError::Root(_)) | Err(MigrateError::Tree(TreeError::Root(..)))
    ));
}
