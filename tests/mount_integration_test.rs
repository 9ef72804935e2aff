//! Mount composition and peer replication.

use std::sync::Arc;

use bytes::Bytes;
use peerdrive::Drive;
use peerdrive::DriveOptions;
use peerdrive::MountOptions;
use peerdrive::WriteOptions;
use peerdrive_feed::FeedStore;
use peerdrive_feed::MemoryFeedStore;
use peerdrive_feed::SigningKey;

fn options_with_fresh_key() -> DriveOptions {
    DriveOptions {
        secret_key: Some(rand::random()),
        ..Default::default()
    }
}

#[tokio::test]
async fn trie_mount_serves_a_foreign_subtree() {
    let store = Arc::new(MemoryFeedStore::new());
    let parent = Drive::new(store.clone(), options_with_fresh_key()).await.unwrap();
    let child = Drive::new(store.clone(), options_with_fresh_key()).await.unwrap();

    child.write_file("/inner.txt", b"from child", WriteOptions::default()).await.unwrap();
    child.write_file("/deep/nested.txt", b"nested", WriteOptions::default()).await.unwrap();

    parent.mount("/sub", child.key(), MountOptions::default()).await.unwrap();

    // The mount point itself is a directory entry of the parent.
    assert!(parent.stat("/sub").await.unwrap().is_directory());
    assert_eq!(parent.readdir("/", false).await.unwrap(), vec!["sub".to_string()]);

    // Paths inside are served by the child trie and its content feed.
    assert_eq!(parent.read_file_string("/sub/inner.txt").await.unwrap(), "from child");
    assert_eq!(parent.read_file_string("/sub/deep/nested.txt").await.unwrap(), "nested");
    assert_eq!(parent.stat("/sub/inner.txt").await.unwrap().size(), 10);

    let mut listing = parent.readdir("/sub", false).await.unwrap();
    listing.sort();
    assert_eq!(listing, vec!["deep".to_string(), "inner.txt".to_string()]);

    // Mutations through the mount land in the child drive.
    parent.write_file("/sub/written-via-parent", b"w", WriteOptions::default()).await.unwrap();
    assert_eq!(child.read_file_string("/written-via-parent").await.unwrap(), "w");

    parent.unmount("/sub").await.unwrap();
    assert_eq!(parent.lstat("/sub/inner.txt").await.unwrap_err().errno(), Some(2));
}

#[tokio::test]
async fn hypercore_mount_streams_a_raw_feed() {
    let store = Arc::new(MemoryFeedStore::new());
    let drive = Drive::new(store.clone(), options_with_fresh_key()).await.unwrap();

    // A foreign content feed with no trie of its own.
    let raw = store.writable_feed(SigningKey::from_bytes(&rand::random())).await.unwrap();
    raw.append(vec![Bytes::from_static(b"log line 1\n"), Bytes::from_static(b"log line 2\n")]).await.unwrap();

    drive.mount("/raw", raw.key(), MountOptions { hypercore: true }).await.unwrap();

    let stat = drive.stat("/raw").await.unwrap();
    assert!(stat.is_file());
    assert_eq!(stat.size(), raw.byte_len().await);
    assert_eq!(stat.blocks(), raw.len().await);

    assert_eq!(drive.read_file_string("/raw").await.unwrap(), "log line 1\nlog line 2\n");

    drive.unmount("/raw").await.unwrap();
    assert_eq!(drive.stat("/raw").await.unwrap_err().errno(), Some(2));
}

#[tokio::test]
async fn replicated_drive_reads_both_feeds() {
    let writer_store = Arc::new(MemoryFeedStore::new());
    let writer = Drive::new(writer_store.clone(), DriveOptions::default()).await.unwrap();
    writer.write_file("/shared.txt", b"sync me", WriteOptions::default()).await.unwrap();

    let reader_store = Arc::new(MemoryFeedStore::new());
    reader_store.replicate(writer_store.as_ref()).await.unwrap();

    let reader = Drive::new(reader_store.clone(), DriveOptions {
        key: Some(writer.key()),
        ..Default::default()
    })
    .await
    .unwrap();
    assert!(!reader.writable());
    assert_eq!(reader.read_file_string("/shared.txt").await.unwrap(), "sync me");

    // A later write flows over on the next replication pass without
    // reopening the reader.
    writer.write_file("/late.txt", b"late", WriteOptions::default()).await.unwrap();
    reader.replicate(writer_store.as_ref()).await.unwrap();
    assert_eq!(reader.read_file_string("/late.txt").await.unwrap(), "late");

    // The reader cannot write.
    assert!(reader.write_file("/nope", b"x", WriteOptions::default()).await.is_err());
}

#[tokio::test]
async fn checkout_of_a_replicated_drive_stays_readable() {
    let writer_store = Arc::new(MemoryFeedStore::new());
    let writer = Drive::new(writer_store.clone(), DriveOptions::default()).await.unwrap();
    writer.write_file("/a", b"v1", WriteOptions::default()).await.unwrap();
    let version = writer.version().await;
    writer.write_file("/a", b"v2", WriteOptions::default()).await.unwrap();

    let reader_store = Arc::new(MemoryFeedStore::new());
    reader_store.replicate(writer_store.as_ref()).await.unwrap();
    let reader = Drive::new(reader_store, DriveOptions {
        key: Some(writer.key()),
        ..Default::default()
    })
    .await
    .unwrap();

    let old = reader.checkout(version).await.unwrap();
    assert_eq!(old.read_file_string("/a").await.unwrap(), "v1");
    assert_eq!(reader.read_file_string("/a").await.unwrap(), "v2");
}
