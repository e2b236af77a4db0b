use anyhow::Result;
use dropline::checksum::{strong_checksum, ChecksumType};
use dropline::net_async::{client, server};
use dropline::protocol::token;
use dropline::{Config, FailureKind, Operation, TransferMetadata, TransferOutcome};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn loopback_config(storage: &Path) -> Config {
    Config {
        bind_host: "127.0.0.1".to_string(),
        port: 0,
        storage_dir: storage.to_path_buf(),
        history_file: None,
        handshake_timeout_ms: 5_000,
        idle_timeout_ms: 5_000,
        ..Config::default()
    }
}

/// Bind an ephemeral port and serve one transfer in the background
async fn spawn_receiver(
    config: &Config,
) -> Result<(u16, tokio::task::JoinHandle<TransferOutcome>)> {
    let listener = server::bind(config).await?;
    let port = listener.local_addr()?.port();
    let config = config.clone();
    let handle = tokio::spawn(async move { server::receive_one(listener, &config, None).await });
    Ok((port, handle))
}

/// Hand-rolled sender: metadata, wait for token, then exactly `body`
async fn raw_send(port: u16, metadata: &TransferMetadata, body: &[u8]) -> Result<[u8; token::LEN]> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    stream.write_all(&metadata.to_frame()?).await?;
    let mut reply = [0u8; token::LEN];
    stream.read_exact(&mut reply).await?;
    if &reply == token::ACK {
        // The receiver may abort mid-stream; write errors are expected then
        let _ = stream.write_all(body).await;
        let _ = stream.shutdown().await;
    }
    Ok(reply)
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hello_txt_round_trip() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("hello.txt");
    std::fs::write(&file, "hi there!")?;

    let storage = dst.path().join("received");
    let config = loopback_config(&storage);
    let (port, receiver) = spawn_receiver(&config).await?;

    let sent = client::send(&file, "127.0.0.1", port, &config, None).await;
    let received = receiver.await?;

    assert!(sent.is_success(), "{}", sent);
    assert_eq!(sent.operation, Operation::Send);
    assert_eq!(sent.file_name, "hello.txt");
    assert_eq!(sent.byte_count, Some(9));

    assert!(received.is_success(), "{}", received);
    assert_eq!(received.operation, Operation::Receive);
    assert_eq!(received.file_name, "hello.txt");
    assert_eq!(received.byte_count, Some(9));

    let stored = storage.join("hello.txt");
    assert_eq!(std::fs::read(&stored)?, b"hi there!");
    assert_eq!(received.path.as_deref().map(|p| p.ends_with("hello.txt")), Some(true));

    // Only the final file, no partial leftovers
    assert_eq!(std::fs::read_dir(&storage)?.count(), 1);
    Ok(())
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn received_file_is_readable_by_others() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("hello.txt");
    std::fs::write(&file, "hi there!")?;

    let storage = dst.path().join("received");
    let config = loopback_config(&storage);
    let (port, receiver) = spawn_receiver(&config).await?;

    let sent = client::send(&file, "127.0.0.1", port, &config, None).await;
    let received = receiver.await?;
    assert!(sent.is_success(), "{}", sent);
    assert!(received.is_success(), "{}", received);

    let mode = std::fs::metadata(storage.join("hello.txt"))?.permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn binary_round_trip_across_many_blocks() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("picture.png");
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend((0..300_000u32).map(|i| (i.wrapping_mul(31) % 256) as u8));
    std::fs::write(&file, &data)?;

    for algorithm in [ChecksumType::Sha256, ChecksumType::Blake3] {
        let storage = dst.path().join(algorithm.name());
        let config = Config {
            block_size: 1024,
            algorithm,
            ..loopback_config(&storage)
        };
        let (port, receiver) = spawn_receiver(&config).await?;

        let sent = client::send(&file, "127.0.0.1", port, &config, None).await;
        let received = receiver.await?;
        assert!(sent.is_success(), "{}", sent);
        assert!(received.is_success(), "{}", received);
        assert_eq!(received.byte_count, Some(data.len() as u64));
        assert_eq!(std::fs::read(storage.join("picture.png"))?, data);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_file_never_connects() -> Result<()> {
    let src = tempfile::tempdir()?;
    let file = src.path().join("big.txt");
    std::fs::write(&file, "x".repeat(64))?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let config = Config {
        max_file_size: 16,
        ..loopback_config(src.path())
    };

    let sent = client::send(&file, "127.0.0.1", port, &config, None).await;
    assert_eq!(sent.failure_kind(), Some(FailureKind::LocalFile));
    assert!(sent.cause().unwrap_or_default().contains("exceeds limit"));

    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "sender must not connect for an oversized file");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_config_never_connects() -> Result<()> {
    let src = tempfile::tempdir()?;
    let file = src.path().join("hello.txt");
    std::fs::write(&file, "hi there!")?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let config = Config {
        block_size: 0,
        ..loopback_config(src.path())
    };

    let sent = client::send(&file, "127.0.0.1", port, &config, None).await;
    assert_eq!(sent.failure_kind(), Some(FailureKind::LocalFile));
    assert!(sent.cause().unwrap_or_default().contains("block_size"), "{}", sent);

    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "sender must not connect with an invalid configuration");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_config_refuses_to_receive() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let storage = dst.path().join("received");
    let config = Config {
        block_size: 0,
        ..loopback_config(&storage)
    };

    let outcome = server::listen_and_receive(0, &config, None).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::LocalFile));
    assert!(outcome.cause().unwrap_or_default().contains("block_size"), "{}", outcome);

    // An already bound listener is released without waiting for a sender
    let listener = server::bind(&loopback_config(&storage)).await?;
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        server::receive_one(listener, &config, None),
    )
    .await?;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::LocalFile));
    assert!(!storage.exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disallowed_type_never_connects() -> Result<()> {
    let src = tempfile::tempdir()?;
    let file = src.path().join("innocent.txt");
    std::fs::write(&file, b"\x7fELF\x02\x01\x01\0\0\0\0\0")?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let sent = client::send(&file, "127.0.0.1", port, &loopback_config(src.path()), None).await;
    assert_eq!(sent.failure_kind(), Some(FailureKind::LocalFile));
    assert!(sent.cause().unwrap_or_default().contains("application/x-executable"));

    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sender_lying_about_size_is_cut_off() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let storage = dst.path().join("received");
    let (port, receiver) = spawn_receiver(&loopback_config(&storage)).await?;

    let metadata = TransferMetadata {
        name: "hello.txt".to_string(),
        size: 4,
        algorithm: ChecksumType::Sha256,
        content_hash: strong_checksum(b"hi t", ChecksumType::Sha256),
    };
    let reply = raw_send(port, &metadata, b"hi there!").await?;
    assert_eq!(&reply, token::ACK);

    let received = receiver.await?;
    assert_eq!(received.failure_kind(), Some(FailureKind::Integrity));
    assert!(received.cause().unwrap_or_default().contains("overflow"), "{}", received);
    assert_eq!(received.file_name, "hello.txt");
    assert!(dir_is_empty(&storage));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flipped_bit_fails_integrity_and_is_removed() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let storage = dst.path().join("received");
    let (port, receiver) = spawn_receiver(&loopback_config(&storage)).await?;

    let original = b"hi there!";
    let mut corrupted = original.to_vec();
    corrupted[4] ^= 0x20; // 'e' -> 'E'
    let metadata = TransferMetadata {
        name: "hello.txt".to_string(),
        size: original.len() as u64,
        algorithm: ChecksumType::Sha256,
        content_hash: strong_checksum(original, ChecksumType::Sha256),
    };
    raw_send(port, &metadata, &corrupted).await?;

    let received = receiver.await?;
    assert_eq!(received.failure_kind(), Some(FailureKind::Integrity));
    assert!(received.cause().unwrap_or_default().contains("integrity mismatch"), "{}", received);
    assert!(!storage.join("hello.txt").exists());
    assert!(dir_is_empty(&storage));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_stream_fails_and_is_removed() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let storage = dst.path().join("received");
    let (port, receiver) = spawn_receiver(&loopback_config(&storage)).await?;

    let metadata = TransferMetadata {
        name: "hello.txt".to_string(),
        size: 9,
        algorithm: ChecksumType::Sha256,
        content_hash: strong_checksum(b"hi there!", ChecksumType::Sha256),
    };
    raw_send(port, &metadata, b"hi").await?;

    let received = receiver.await?;
    assert_eq!(received.failure_kind(), Some(FailureKind::Integrity));
    assert!(received.cause().unwrap_or_default().contains("2 of 9"), "{}", received);
    assert!(dir_is_empty(&storage));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receiver_checker_rejects_disallowed_content() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let storage = dst.path().join("received");
    let (port, receiver) = spawn_receiver(&loopback_config(&storage)).await?;

    let body = b"MZ\x90\0\x03\0\0\0";
    let metadata = TransferMetadata {
        name: "setup.txt".to_string(),
        size: body.len() as u64,
        algorithm: ChecksumType::Sha256,
        content_hash: strong_checksum(body, ChecksumType::Sha256),
    };
    raw_send(port, &metadata, body).await?;

    let received = receiver.await?;
    assert_eq!(received.failure_kind(), Some(FailureKind::Integrity));
    assert!(received.cause().unwrap_or_default().contains("not allowed"), "{}", received);
    assert!(dir_is_empty(&storage));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receiver_rejects_oversized_declaration_before_ack() -> Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let file = src.path().join("notes.txt");
    std::fs::write(&file, "a".repeat(100))?;

    let storage = dst.path().join("received");
    let receiver_config = Config {
        max_file_size: 10,
        ..loopback_config(&storage)
    };
    let (port, receiver) = spawn_receiver(&receiver_config).await?;

    // Sender's own ceiling is the default, so it gets as far as the handshake
    let sent = client::send(&file, "127.0.0.1", port, &loopback_config(src.path()), None).await;
    let received = receiver.await?;

    assert_eq!(sent.failure_kind(), Some(FailureKind::Rejected));
    assert_eq!(received.failure_kind(), Some(FailureKind::Integrity));
    assert!(received.cause().unwrap_or_default().contains("exceeds limit"));
    assert!(!storage.exists() || dir_is_empty(&storage));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn traversal_name_is_refused() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let storage = dst.path().join("received");
    let (port, receiver) = spawn_receiver(&loopback_config(&storage)).await?;

    let metadata = TransferMetadata {
        name: "../escape.txt".to_string(),
        size: 9,
        algorithm: ChecksumType::Sha256,
        content_hash: strong_checksum(b"hi there!", ChecksumType::Sha256),
    };
    let reply = raw_send(port, &metadata, b"hi there!").await?;
    assert_eq!(&reply, token::NAK);

    let received = receiver.await?;
    assert_eq!(received.failure_kind(), Some(FailureKind::Protocol));
    assert!(!dst.path().join("escape.txt").exists());
    assert!(dir_is_empty(&storage));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_metadata_fails_receive() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let (port, receiver) = spawn_receiver(&loopback_config(dst.path())).await?;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await?;
    stream.shutdown().await?;

    let received = receiver.await?;
    assert_eq!(received.failure_kind(), Some(FailureKind::Protocol));
    assert_eq!(received.file_name, dropline::protocol::defaults::UNKNOWN_FILE_NAME);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn port_in_use_is_distinguishable() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let holder = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = holder.local_addr()?.port();

    let outcome = server::listen_and_receive(port, &loopback_config(dst.path()), None).await;
    assert_eq!(outcome.operation, Operation::Receive);
    assert_eq!(outcome.failure_kind(), Some(FailureKind::PortUnavailable));
    assert!(outcome.cause().unwrap_or_default().contains(&format!("port {} unavailable", port)));
    drop(holder);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_refused_is_network_error() -> Result<()> {
    let src = tempfile::tempdir()?;
    let file = src.path().join("hello.txt");
    std::fs::write(&file, "hi there!")?;

    let port = {
        let sock = std::net::TcpListener::bind("127.0.0.1:0")?;
        sock.local_addr()?.port()
    };
    let sent = client::send(&file, "127.0.0.1", port, &loopback_config(src.path()), None).await;
    assert_eq!(sent.failure_kind(), Some(FailureKind::Network));
    assert_eq!(sent.file_name, "hello.txt");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn accept_timeout_ends_the_wait() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let config = Config {
        accept_timeout_ms: 100,
        ..loopback_config(dst.path())
    };
    let (_port, receiver) = spawn_receiver(&config).await?;
    let outcome = receiver.await?;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Network));
    assert!(outcome.cause().unwrap_or_default().contains("timed out"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_receive_cleans_partial_file() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let storage = dst.path().join("received");
    let config = loopback_config(&storage);
    let (port, receiver) = spawn_receiver(&config).await?;

    let metadata = TransferMetadata {
        name: "slow.txt".to_string(),
        size: 100,
        algorithm: ChecksumType::Sha256,
        content_hash: strong_checksum(&[b'a'; 100], ChecksumType::Sha256),
    };
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    stream.write_all(&metadata.to_frame()?).await?;
    let mut reply = [0u8; token::LEN];
    stream.read_exact(&mut reply).await?;
    assert_eq!(&reply, token::ACK);
    stream.write_all(&[b'a'; 10]).await?;

    // Cancel mid-stream, the way a caller would
    tokio::time::sleep(Duration::from_millis(100)).await;
    receiver.abort();
    assert!(receiver.await.is_err());

    assert!(dir_is_empty(&storage));
    Ok(())
}
