//! End-to-end drive semantics: files, directories, symlinks, descriptors,
//! truncation, checkouts, events.

use std::sync::Arc;

use peerdrive::Drive;
use peerdrive::DriveEvent;
use peerdrive::DriveOptions;
use peerdrive::OpenMode;
use peerdrive::ReadStreamOptions;
use peerdrive::STDIO_CAP;
use peerdrive::WriteOptions;
use peerdrive_feed::FeedStore;
use peerdrive_feed::MemoryFeedStore;

async fn new_drive() -> Drive {
    let store = Arc::new(MemoryFeedStore::new());
    Drive::new(store, DriveOptions::default()).await.expect("drive bring-up")
}

#[tokio::test]
async fn empty_drive_has_an_empty_root() {
    let drive = new_drive().await;
    assert_eq!(drive.readdir("/", false).await.unwrap(), Vec::<String>::new());
    assert!(drive.stat("/").await.unwrap().is_directory());
    assert_eq!(drive.version().await, 1);
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let drive = new_drive().await;
    drive.write_file("/a.txt", b"hello", WriteOptions::default()).await.unwrap();
    assert_eq!(drive.read_file_string("/a.txt").await.unwrap(), "hello");
    assert_eq!(drive.stat("/a.txt").await.unwrap().size(), 5);
    assert_eq!(drive.readdir("/", false).await.unwrap(), vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn overwrite_keeps_history_in_the_content_feed() {
    let drive = new_drive().await;
    drive.write_file("/a.txt", b"ABCDE", WriteOptions::default()).await.unwrap();
    drive.write_file("/a.txt", b"XY", WriteOptions::default()).await.unwrap();

    assert_eq!(drive.read_file_string("/a.txt").await.unwrap(), "XY");

    // Both generations of the file remain in the append-only content feed.
    let content = drive.store().feed(&drive.content_key().unwrap()).await.unwrap();
    assert!(content.len().await >= 2);
    assert_eq!(content.byte_len().await, 7);
}

#[tokio::test]
async fn committed_stat_matches_the_feed_deltas() {
    let drive = new_drive().await;
    let content = drive.store().feed(&drive.content_key().unwrap()).await.unwrap();

    let len_before = content.len().await;
    let bytes_before = content.byte_len().await;

    let mut stream = drive.write_stream("/data.bin", WriteOptions::default()).await.unwrap();
    stream.write(&[7u8; 100_000]).await.unwrap();
    stream.write(&[8u8; 50]).await.unwrap();
    let stat = stream.finish().await.unwrap();

    assert_eq!(stat.size(), 100_050);
    assert_eq!(stat.size(), content.byte_len().await - bytes_before);
    assert_eq!(stat.blocks(), content.len().await - len_before);
    assert_eq!(stat.offset(), len_before);
    assert_eq!(stat.byte_offset(), bytes_before);
    assert_eq!(drive.stat("/data.bin").await.unwrap().size(), 100_050);
}

#[tokio::test]
async fn mkdir_collision_is_path_already_exists() {
    let drive = new_drive().await;
    drive.mkdir("/d").await.unwrap();
    let err = drive.mkdir("/d").await.unwrap_err();
    assert_eq!(err.errno(), Some(17));
}

#[tokio::test]
async fn rmdir_refuses_non_empty_directories() {
    let drive = new_drive().await;
    drive.write_file("/d/f", b"x", WriteOptions::default()).await.unwrap();

    let err = drive.rmdir("/d").await.unwrap_err();
    assert_eq!(err.errno(), Some(39));

    drive.unlink("/d/f").await.unwrap();
    drive.rmdir("/d").await.unwrap();
    assert!(!drive.exists("/d").await.unwrap());
}

#[tokio::test]
async fn unlink_of_missing_file_is_file_not_found() {
    let drive = new_drive().await;
    assert_eq!(drive.unlink("/nope").await.unwrap_err().errno(), Some(2));
}

#[tokio::test]
async fn truncate_shrinks_and_zero_extends() {
    let drive = new_drive().await;
    drive.write_file("/a", b"0123456789", WriteOptions::default()).await.unwrap();

    drive.truncate("/a", 4).await.unwrap();
    assert_eq!(&drive.read_file("/a").await.unwrap()[..], b"0123");

    drive.truncate("/a", 6).await.unwrap();
    assert_eq!(&drive.read_file("/a").await.unwrap()[..], b"0123\0\0");

    // Truncate to the current size is a no-op.
    let version = drive.version().await;
    drive.truncate("/a", 6).await.unwrap();
    assert_eq!(drive.version().await, version);

    // Truncate of a missing file creates it.
    drive.truncate("/zeros", 3).await.unwrap();
    assert_eq!(&drive.read_file("/zeros").await.unwrap()[..], b"\0\0\0");
}

#[tokio::test]
async fn symlinks_resolve_at_stat_time() {
    let drive = new_drive().await;
    drive.write_file("/a.txt", b"hello", WriteOptions::default()).await.unwrap();
    drive.symlink("/a.txt", "/l").await.unwrap();

    assert_eq!(drive.stat("/l").await.unwrap().size(), drive.stat("/a.txt").await.unwrap().size());
    assert_eq!(drive.lstat("/l").await.unwrap().linkname(), Some("/a.txt"));
    assert_eq!(drive.readlink("/l").await.unwrap(), "/a.txt");
    assert_eq!(drive.read_file_string("/l").await.unwrap(), "hello");

    // Colliding link names are rejected.
    assert_eq!(drive.symlink("/a.txt", "/l").await.unwrap_err().errno(), Some(17));

    // Relative targets resolve against the link's parent.
    drive.write_file("/d/target", b"t", WriteOptions::default()).await.unwrap();
    drive.symlink("target", "/d/link").await.unwrap();
    assert_eq!(drive.read_file_string("/d/link").await.unwrap(), "t");
}

#[tokio::test]
async fn checkout_pins_a_historical_view() {
    let drive = new_drive().await;
    drive.write_file("/a.txt", b"first", WriteOptions::default()).await.unwrap();
    let version = drive.version().await;

    drive.write_file("/a.txt", b"second", WriteOptions::default()).await.unwrap();
    drive.write_file("/b.txt", b"new", WriteOptions::default()).await.unwrap();

    let old = drive.checkout(version).await.unwrap();
    assert_eq!(old.read_file_string("/a.txt").await.unwrap(), "first");
    assert_eq!(old.stat("/a.txt").await.unwrap().size(), 5);
    assert_eq!(old.lstat("/b.txt").await.unwrap_err().errno(), Some(2));
    assert!(!old.writable());

    // Writes on the live drive do not leak into the checkout.
    drive.write_file("/c.txt", b"later", WriteOptions::default()).await.unwrap();
    assert_eq!(old.readdir("/", false).await.unwrap(), vec!["a.txt".to_string()]);
    assert_eq!(drive.read_file_string("/a.txt").await.unwrap(), "second");
}

#[tokio::test]
async fn descriptors_number_from_stdio_cap_and_recycle() {
    let drive = new_drive().await;
    drive.write_file("/a", b"contents", WriteOptions::default()).await.unwrap();

    let fd1 = drive.open("/a", OpenMode::Read).await.unwrap();
    let fd2 = drive.open("/a", OpenMode::Read).await.unwrap();
    assert_eq!(fd1, STDIO_CAP);
    assert_eq!(fd2, STDIO_CAP + 1);

    drive.close(fd1).await.unwrap();
    // Freed slots are reused without shifting live descriptors.
    let fd3 = drive.open("/a", OpenMode::Read).await.unwrap();
    assert_eq!(fd3, fd1);

    drive.close(fd2).await.unwrap();
    drive.close(fd3).await.unwrap();
    assert_eq!(drive.close(fd3).await.unwrap_err().errno(), Some(9));
    assert_eq!(drive.read(3, &mut [0u8; 4], None).await.unwrap_err().errno(), Some(9));
}

#[tokio::test]
async fn descriptor_reads_position_and_clamp() {
    let drive = new_drive().await;
    drive.write_file("/a", b"0123456789", WriteOptions::default()).await.unwrap();
    let fd = drive.open("/a", OpenMode::Read).await.unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(drive.read(fd, &mut buf, None).await.unwrap(), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(drive.read(fd, &mut buf, None).await.unwrap(), 4);
    assert_eq!(&buf, b"4567");

    // Explicit positions do not move the cursor.
    assert_eq!(drive.read(fd, &mut buf, Some(1)).await.unwrap(), 4);
    assert_eq!(&buf, b"1234");
    assert_eq!(drive.read(fd, &mut buf, None).await.unwrap(), 2);
    assert_eq!(&buf[..2], b"89");

    // At EOF reads return 0.
    assert_eq!(drive.read(fd, &mut buf, None).await.unwrap(), 0);
    assert_eq!(drive.read(fd, &mut buf, Some(99)).await.unwrap(), 0);
    drive.close(fd).await.unwrap();
}

#[tokio::test]
async fn write_descriptor_commits_on_close() {
    let drive = new_drive().await;
    let fd = drive.open("/log", OpenMode::Write).await.unwrap();
    drive.write(fd, b"part one, ").await.unwrap();
    drive.write(fd, b"part two").await.unwrap();

    // No stat is committed until close; a brand-new path stays invisible.
    assert_eq!(drive.lstat("/log").await.unwrap_err().errno(), Some(2));
    drive.close(fd).await.unwrap();

    assert_eq!(drive.read_file_string("/log").await.unwrap(), "part one, part two");
    assert_eq!(drive.stat("/log").await.unwrap().size(), 18);

    // Reading through a write descriptor (and vice versa) is EBADF.
    let fd = drive.open("/log", OpenMode::Read).await.unwrap();
    assert_eq!(drive.write(fd, b"x").await.unwrap_err().errno(), Some(9));
    drive.close(fd).await.unwrap();
}

#[tokio::test]
async fn inflight_size_is_visible_while_overwriting() {
    let drive = new_drive().await;
    drive.write_file("/a", b"before", WriteOptions::default()).await.unwrap();

    let fd = drive.open("/a", OpenMode::Write).await.unwrap();
    drive.write(fd, b"xyz").await.unwrap();
    // The committed stat says 6 bytes, but lstat substitutes the in-flight
    // size of the open write descriptor.
    assert_eq!(drive.lstat("/a").await.unwrap().size(), 3);
    drive.close(fd).await.unwrap();
    assert_eq!(drive.stat("/a").await.unwrap().size(), 3);
}

#[tokio::test]
async fn read_stream_ranges() {
    let drive = new_drive().await;
    drive.write_file("/a", b"0123456789", WriteOptions::default()).await.unwrap();

    let collect = |opts: ReadStreamOptions| async {
        use futures::TryStreamExt;
        let stream = drive.read_stream("/a", opts).await.unwrap();
        let chunks: Vec<_> = stream.try_collect().await.unwrap();
        chunks.iter().flat_map(|c| c.iter().copied()).collect::<Vec<u8>>()
    };

    assert_eq!(
        collect(ReadStreamOptions {
            start: 2,
            ..Default::default()
        })
        .await,
        b"23456789"
    );
    assert_eq!(
        collect(ReadStreamOptions {
            start: 2,
            end: Some(4),
            ..Default::default()
        })
        .await,
        b"234"
    );
    assert_eq!(
        collect(ReadStreamOptions {
            start: 1,
            length: Some(3),
            ..Default::default()
        })
        .await,
        b"123"
    );
}

#[tokio::test]
async fn readdir_projects_and_recurses() {
    let drive = new_drive().await;
    drive.write_file("/d/one", b"1", WriteOptions::default()).await.unwrap();
    drive.write_file("/d/sub/two", b"2", WriteOptions::default()).await.unwrap();
    drive.write_file("/top", b"3", WriteOptions::default()).await.unwrap();

    assert_eq!(drive.readdir("/", false).await.unwrap(), vec!["d".to_string(), "top".to_string()]);
    assert_eq!(drive.readdir("/d", false).await.unwrap(), vec!["one".to_string(), "sub".to_string()]);

    let mut all = drive.readdir("/d", true).await.unwrap();
    all.sort();
    assert_eq!(all, vec!["one".to_string(), "sub/two".to_string()]);

    // stat of an implicit directory synthesizes a directory stat.
    assert!(drive.stat("/d/sub").await.unwrap().is_directory());
    assert_eq!(drive.stat("/d/none").await.unwrap_err().errno(), Some(2));
}

#[tokio::test]
async fn events_fire_in_order() {
    let drive = new_drive().await;
    let mut rx = drive.subscribe();

    drive.write_file("/a", b"abc", WriteOptions::default()).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), DriveEvent::Appending { name: "a".into() });
    let update = rx.recv().await.unwrap();
    assert!(matches!(update, DriveEvent::Update { .. }));
    assert_eq!(rx.recv().await.unwrap(), DriveEvent::Append { name: "a".into() });
}

#[tokio::test]
async fn watch_observes_subtree_mutations() {
    let drive = new_drive().await;
    let mut watcher = drive.watch("/d");

    drive.write_file("/elsewhere", b"x", WriteOptions::default()).await.unwrap();
    drive.write_file("/d/inside", b"y", WriteOptions::default()).await.unwrap();

    assert_eq!(watcher.changed().await.as_deref(), Some("d/inside"));
}

#[tokio::test]
async fn dropping_a_write_stream_releases_the_lock_without_committing() {
    let drive = new_drive().await;
    drive.write_file("/a", b"kept", WriteOptions::default()).await.unwrap();

    let mut stream = drive.write_stream("/a", WriteOptions::default()).await.unwrap();
    stream.write(b"abandoned").await.unwrap();
    drop(stream);

    // The entry still carries its previous stat; the orphaned bytes stay
    // in the content feed but nothing references them.
    assert_eq!(drive.read_file_string("/a").await.unwrap(), "kept");

    // And the lock is free for the next writer.
    drive.write_file("/a", b"next", WriteOptions::default()).await.unwrap();
    assert_eq!(drive.read_file_string("/a").await.unwrap(), "next");
}

#[tokio::test]
async fn close_all_shuts_the_feeds_down() {
    let drive = new_drive().await;
    drive.write_file("/a", b"x", WriteOptions::default()).await.unwrap();
    drive.close_all().await.unwrap();
    assert!(drive.write_file("/b", b"y", WriteOptions::default()).await.is_err());
}

#[tokio::test]
async fn reopening_with_the_same_secret_restores_the_drive() {
    let secret: [u8; 32] = rand::random();
    let store = Arc::new(MemoryFeedStore::new());

    let drive = Drive::new(store.clone(), DriveOptions {
        secret_key: Some(secret),
        ..Default::default()
    })
    .await
    .unwrap();
    drive.write_file("/a", b"persisted", WriteOptions::default()).await.unwrap();
    let key = drive.key();
    let content_key = drive.content_key().unwrap();
    drop(drive);

    // Same store, same secret: restore reads the content key back out of
    // the trie header and re-derives the same content feed.
    let reopened = Drive::new(store, DriveOptions {
        secret_key: Some(secret),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(reopened.key(), key);
    assert_eq!(reopened.content_key().unwrap(), content_key);
    assert!(reopened.writable());
    assert_eq!(reopened.read_file_string("/a").await.unwrap(), "persisted");
}
