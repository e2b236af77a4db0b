//! Tokio transport: one file per connection.
//!
//! Wire order is fixed: metadata frame (sender) -> ACK/NAK token (receiver)
//! -> raw file bytes until the sender half-closes. No file byte is written
//! before the receiver has prepared storage and acknowledged.

use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::TransferError;

/// Await `fut`, failing with `TimedOut` after `limit` when one is set
async fn with_deadline<T, F>(limit: Option<Duration>, what: &str, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(d) => match timeout(d, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{} timed out after {} ms", what, d.as_millis()),
            )),
        },
        None => fut.await,
    }
}

fn storage_error(context: &str, e: io::Error) -> TransferError {
    TransferError::Storage(anyhow::Error::new(e).context(context.to_string()))
}

/// A bad local setup fails before any socket is touched
fn validate_config(config: &crate::config::Config) -> Result<(), TransferError> {
    config
        .validate()
        .map_err(|e| TransferError::LocalFile(format!("invalid configuration: {:#}", e)))
}

pub mod server {
    use super::*;
    use crate::config::Config;
    use crate::integrity::IntegrityChecker;
    use crate::outcome::{Operation, TransferOutcome};
    use crate::protocol::{frame, token, HEADER_LEN};
    use crate::protocol_core::{
        destination_path, ensure_dir_exists, parse_frame_header, validate_frame_size,
        TransferMetadata,
    };
    use crate::progress::begin_bytes;
    use indicatif::ProgressBar;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// A bound, not yet accepting, receive socket
    pub struct Listener {
        inner: TcpListener,
        port: u16,
    }

    impl Listener {
        pub fn local_addr(&self) -> io::Result<SocketAddr> {
            self.inner.local_addr()
        }
    }

    pub async fn bind(config: &Config) -> Result<Listener, TransferError> {
        let addr = config.bind_addr();
        let inner = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransferError::bind(config.port, e))?;
        let port = inner.local_addr().map(|a| a.port()).unwrap_or(config.port);
        info!("listening on {} storage={}", addr, config.storage_dir.display());
        Ok(Listener { inner, port })
    }

    /// Bind `port` on the configured host, serve exactly one sender, return
    pub async fn listen_and_receive(
        port: u16,
        config: &Config,
        progress: Option<&ProgressBar>,
    ) -> TransferOutcome {
        let config = Config {
            port,
            ..config.clone()
        };
        if let Err(e) = validate_config(&config) {
            warn!("receive: {}", e);
            return TransferOutcome::failed(Operation::Receive, None, &e, None);
        }
        match bind(&config).await {
            Ok(listener) => receive_one(listener, &config, progress).await,
            Err(e) => {
                warn!("receive: {}", e);
                TransferOutcome::failed(Operation::Receive, None, &e, None)
            }
        }
    }

    /// Serve a single connection on `listener`, then drop it
    pub async fn receive_one(
        listener: Listener,
        config: &Config,
        progress: Option<&ProgressBar>,
    ) -> TransferOutcome {
        let mut state = ReceiveState::default();
        let result = match validate_config(config) {
            Ok(()) => receive_inner(listener, config, progress, &mut state).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(path) => {
                let name = state.name.unwrap_or_default();
                info!("received {} ({} bytes) -> {}", name, state.bytes, path.display());
                TransferOutcome::success(Operation::Receive, name, state.bytes).with_path(path)
            }
            Err(e) => {
                warn!("receive failed: {}", e);
                let bytes = (state.bytes > 0).then_some(state.bytes);
                TransferOutcome::failed(Operation::Receive, state.name.as_deref(), &e, bytes)
            }
        }
    }

    #[derive(Default)]
    struct ReceiveState {
        name: Option<String>,
        bytes: u64,
    }

    async fn read_metadata(
        stream: &mut TcpStream,
        limit: Option<Duration>,
    ) -> Result<TransferMetadata, TransferError> {
        let handshake_err = |e: io::Error| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                TransferError::Protocol("connection closed before metadata was complete".into())
            }
            _ => TransferError::network("metadata read", e),
        };

        let mut hdr = [0u8; HEADER_LEN];
        with_deadline(limit, "metadata read", async {
            stream.read_exact(&mut hdr).await.map(|_| ())
        })
        .await
        .map_err(handshake_err)?;

        let (typ, len) = parse_frame_header(&hdr).map_err(TransferError::protocol)?;
        if typ != frame::METADATA {
            return Err(TransferError::Protocol(format!(
                "expected metadata frame, got type {}",
                typ
            )));
        }
        let len = len as usize;
        validate_frame_size(len).map_err(TransferError::protocol)?;

        let mut payload = vec![0u8; len];
        with_deadline(limit, "metadata read", async {
            stream.read_exact(&mut payload).await.map(|_| ())
        })
        .await
        .map_err(handshake_err)?;

        TransferMetadata::decode(&payload).map_err(TransferError::protocol)
    }

    async fn reject(stream: &mut TcpStream, limit: Option<Duration>) {
        if let Err(e) = with_deadline(limit, "reject", stream.write_all(token::NAK)).await {
            debug!("could not deliver rejection: {}", e);
        }
    }

    async fn receive_inner(
        listener: Listener,
        config: &Config,
        progress: Option<&ProgressBar>,
        state: &mut ReceiveState,
    ) -> Result<PathBuf, TransferError> {
        let checker = IntegrityChecker::from_config(config);
        let handshake = config.handshake_timeout();
        let idle = config.idle_timeout();

        let (mut stream, peer) = with_deadline(config.accept_timeout(), "accept", listener.inner.accept())
            .await
            .map_err(|e| TransferError::network("accept", e))?;
        // One-shot: nobody else gets in once a peer is accepted
        let port = listener.port;
        drop(listener);
        let _ = stream.set_nodelay(true);
        info!("connection from {} on port {}", peer, port);

        let metadata = read_metadata(&mut stream, handshake).await?;
        debug!(
            "metadata: name={:?} size={} {}={}",
            metadata.name, metadata.size, metadata.algorithm, metadata.content_hash
        );
        state.name = Some(metadata.name.clone());

        if let Err(reason) = checker.check_size(metadata.size) {
            reject(&mut stream, handshake).await;
            return Err(TransferError::Integrity(format!("declared {}", reason)));
        }

        // Prepare storage before acknowledging so a failure here never
        // leaves the sender streaming into nothing
        let prepared = prepare_storage(config, &metadata.name);
        let (final_path, partial) = match prepared {
            Ok(p) => p,
            Err(e) => {
                reject(&mut stream, handshake).await;
                return Err(e);
            }
        };

        with_deadline(handshake, "acknowledgment write", stream.write_all(token::ACK))
            .await
            .map_err(|e| TransferError::network("acknowledgment write", e))?;

        if let Some(bar) = progress {
            begin_bytes(bar, metadata.size, &metadata.name);
        }

        let std_file = partial
            .as_file()
            .try_clone()
            .map_err(|e| storage_error("open partial file", e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let limit = metadata.size.min(checker.max_file_size());
        let mut buf = vec![0u8; config.block_size];
        loop {
            let n = with_deadline(idle, "file data read", stream.read(&mut buf))
                .await
                .map_err(|e| TransferError::network("file data read", e))?;
            if n == 0 {
                break;
            }
            let received = state.bytes + n as u64;
            if received > limit {
                // Partial file goes away when `partial` drops
                return Err(TransferError::Overflow { received, limit });
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| storage_error("write partial file", e))?;
            state.bytes = received;
            if let Some(bar) = progress {
                bar.inc(n as u64);
            }
        }
        file.flush()
            .await
            .map_err(|e| storage_error("flush partial file", e))?;
        file.sync_all()
            .await
            .map_err(|e| storage_error("sync partial file", e))?;
        drop(file);
        drop(stream);

        if state.bytes < metadata.size {
            return Err(TransferError::Integrity(format!(
                "stream ended after {} of {} declared bytes",
                state.bytes, metadata.size
            )));
        }

        let report = checker
            .with_algorithm(metadata.algorithm)
            .check_async(partial.path().to_path_buf())
            .await;
        if !report.accepted {
            return Err(TransferError::Integrity(
                report.reason.unwrap_or_else(|| "rejected".into()),
            ));
        }
        let actual = report.digest.unwrap_or_default();
        if actual != metadata.content_hash {
            return Err(TransferError::DigestMismatch {
                expected: metadata.content_hash,
                actual,
            });
        }

        share_permissions(partial.as_file())
            .map_err(|e| storage_error("set permissions on received file", e))?;
        partial
            .persist(&final_path)
            .map_err(|e| storage_error("store received file", e.error))?;
        Ok(final_path)
    }

    /// Partial files are created owner-only; the stored file is not
    #[cfg(unix)]
    fn share_permissions(file: &std::fs::File) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o644))
    }

    #[cfg(not(unix))]
    fn share_permissions(_file: &std::fs::File) -> io::Result<()> {
        Ok(())
    }

    /// Destination path plus a hidden partial file beside it that deletes
    /// itself unless persisted
    fn prepare_storage(
        config: &Config,
        name: &str,
    ) -> Result<(PathBuf, tempfile::NamedTempFile), TransferError> {
        ensure_dir_exists(&config.storage_dir).map_err(TransferError::Storage)?;
        let final_path = destination_path(&config.storage_dir, name).map_err(|e| {
            TransferError::Protocol(format!("unsafe file name {:?}: {:#}", name, e))
        })?;
        let partial = tempfile::Builder::new()
            .prefix(".dropline-")
            .suffix(".part")
            .tempfile_in(&config.storage_dir)
            .map_err(|e| storage_error("create partial file", e))?;
        Ok((final_path, partial))
    }
}

pub mod client {
    use super::*;
    use crate::config::Config;
    use crate::integrity::IntegrityChecker;
    use crate::outcome::{Operation, TransferOutcome};
    use crate::protocol::token;
    use crate::protocol_core::TransferMetadata;
    use crate::progress::begin_bytes;
    use indicatif::ProgressBar;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    pub async fn connect(host: &str, port: u16, limit: Option<Duration>) -> Result<TcpStream, TransferError> {
        let addr = if host.contains(':') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
        let stream = with_deadline(limit, "connect", TcpStream::connect(addr.as_str()))
            .await
            .map_err(|e| TransferError::network(format!("connect {}", addr), e))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Push one file to `host:port`
    pub async fn send(
        file_path: &Path,
        host: &str,
        port: u16,
        config: &Config,
        progress: Option<&ProgressBar>,
    ) -> TransferOutcome {
        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        match send_inner(file_path, host, port, config, progress).await {
            Ok(bytes) => {
                info!("sent {} ({} bytes) to {}:{}", file_path.display(), bytes, host, port);
                TransferOutcome::success(Operation::Send, name.unwrap_or_default(), bytes)
            }
            Err(e) => {
                warn!("send failed: {}", e);
                TransferOutcome::failed(Operation::Send, name.as_deref(), &e, None)
            }
        }
    }

    async fn send_inner(
        file_path: &Path,
        host: &str,
        port: u16,
        config: &Config,
        progress: Option<&ProgressBar>,
    ) -> Result<u64, TransferError> {
        // Fail fast: nothing touches the network for a file we would not accept
        validate_config(config)?;
        let checker = IntegrityChecker::from_config(config);
        let report = checker.check_async(file_path.to_path_buf()).await;
        if !report.accepted {
            return Err(TransferError::LocalFile(
                report.reason.unwrap_or_else(|| "rejected".into()),
            ));
        }
        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::LocalFile(format!("{} has no file name", file_path.display())))?;
        let metadata = TransferMetadata {
            name,
            size: report.size.unwrap_or_default(),
            algorithm: checker.algorithm(),
            content_hash: report.digest.unwrap_or_default(),
        };
        let frame = metadata
            .to_frame()
            .map_err(|e| TransferError::LocalFile(format!("{:#}", e)))?;

        let handshake = config.handshake_timeout();
        let idle = config.idle_timeout();

        let mut stream = connect(host, port, config.connect_timeout()).await?;
        debug!(
            "connected to {}:{}, sending metadata for {} ({} bytes)",
            host, port, metadata.name, metadata.size
        );
        with_deadline(handshake, "metadata write", stream.write_all(&frame))
            .await
            .map_err(|e| TransferError::network("metadata write", e))?;

        let mut reply = [0u8; token::LEN];
        with_deadline(handshake, "acknowledgment read", async {
            stream.read_exact(&mut reply).await.map(|_| ())
        })
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                TransferError::Protocol("connection closed before acknowledgment".into())
            }
            _ => TransferError::network("acknowledgment read", e),
        })?;
        if &reply == token::NAK {
            return Err(TransferError::Rejected);
        }
        if &reply != token::ACK {
            return Err(TransferError::Protocol(format!(
                "unexpected acknowledgment token {:?}",
                String::from_utf8_lossy(&reply)
            )));
        }

        if let Some(bar) = progress {
            begin_bytes(bar, metadata.size, &metadata.name);
        }

        let file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| TransferError::LocalFile(format!("open {}: {}", file_path.display(), e)))?;
        // Never send more than was declared, even if the file grew
        let mut reader = file.take(metadata.size);
        let mut buf = vec![0u8; config.block_size];
        let mut sent: u64 = 0;
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| TransferError::LocalFile(format!("read {}: {}", file_path.display(), e)))?;
            if n == 0 {
                break;
            }
            with_deadline(idle, "file data write", stream.write_all(&buf[..n]))
                .await
                .map_err(|e| TransferError::network("file data write", e))?;
            sent += n as u64;
            if let Some(bar) = progress {
                bar.inc(n as u64);
            }
        }
        if sent != metadata.size {
            return Err(TransferError::LocalFile(format!(
                "{} shrank during transfer: sent {} of {} bytes",
                file_path.display(),
                sent,
                metadata.size
            )));
        }

        // Half-close marks end of file for the receiver
        with_deadline(idle, "shutdown", stream.shutdown())
            .await
            .map_err(|e| TransferError::network("shutdown", e))?;
        Ok(sent)
    }
}
