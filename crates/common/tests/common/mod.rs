//! Shared fixtures for tree integration tests
#![allow(dead_code)]

use futures::StreamExt;

use common::crypto::{ReadKey, Secret};
use common::linked_data::Cid;
use common::store::{BlockStore, MemoryStore};
use common::tree::{
    Entry, EntryPath, FileContent, NodeLink, Partition, RootBlock, TreeFormat, TreeReader,
    TreeWriter,
};

/// Route reader and writer logs to the test output; set RUST_LOG to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn dir(path: &str) -> Entry {
    Entry::Directory {
        path: path.parse().unwrap(),
    }
}

pub fn file(path: &str, content: impl Into<FileContent>) -> Entry {
    Entry::File {
        path: path.parse().unwrap(),
        content: content.into(),
    }
}

/// The sample account tree, in children-only order.
pub fn sample_entries() -> Vec<Entry> {
    vec![
        file("/public/a.txt", "hello"),
        dir("/public/docs"),
        file("/public/docs/guide.md", "read me first"),
        dir("/public/docs/img"),
        file("/public/docs/img/logo.png", vec![0x89, 0x50, 0x4e, 0x47]),
        file("/public/z.json", FileContent::Number(42.5)),
        dir("/private/b"),
        file("/private/b/c.txt", vec![1u8, 2, 3]),
        file("/private/notes.txt", "secret"),
    ]
}

pub fn paths(entries: &[Entry]) -> Vec<String> {
    entries.iter().map(|e| e.path().to_string()).collect()
}

/// Build a tree in format `F` from `entries`, failing the test on any
///  rejected entry.
pub async fn build_tree<F: TreeFormat>(
    store: &MemoryStore,
    read_key: &ReadKey,
    entries: Vec<Entry>,
) -> Cid {
    let mut writer = TreeWriter::<_, F>::new(store.clone(), read_key.clone());
    writer.write_all(futures::stream::iter(entries)).await;
    let summary = writer.finish().await.unwrap();
    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    summary.root
}

pub async fn read_all<F: TreeFormat>(
    store: &MemoryStore,
    root: Cid,
    read_key: &ReadKey,
) -> Vec<Entry> {
    TreeReader::<_, F>::open(store.clone(), root, read_key.clone())
        .await
        .unwrap()
        .into_stream()
        .collect()
        .await
}

/// Resolve the link `path` points at by walking nodes from the root.
pub async fn resolve<F: TreeFormat>(
    store: &MemoryStore,
    root: &Cid,
    read_key: &ReadKey,
    path: &str,
) -> NodeLink {
    let path: EntryPath = path.parse().unwrap();
    let root = RootBlock::load(store, root).await.unwrap();
    let (mut cid, mut secret): (Cid, Option<Secret>) = match path.partition().unwrap() {
        Partition::Public => (root.public, None),
        Partition::Private => (root.private, Some(read_key.clone())),
    };

    let mut link = None;
    for name in path.relative() {
        let bytes = store.get(&cid).await.unwrap();
        let bytes = match &secret {
            Some(secret) => secret.decrypt(&bytes).unwrap(),
            None => bytes.to_vec(),
        };
        let node = F::decode_node(&bytes).unwrap();
        let next = node.get_link(name).unwrap().clone();
        cid = *next.cid();
        secret = next.secret().cloned();
        link = Some(next);
    }
    link.expect("path below a partition root")
}
