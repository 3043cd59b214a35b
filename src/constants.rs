// src/constants.rs

use std::time::Duration;

/// Read timeout on the control channel once the session is established.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Read timeout while the session is still being established (greeting,
/// USER/PASS exchange).
pub const SESSION_SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect/read/write timeout on the short-lived data channel.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(3);

/// How many timed-out reads on the control channel before giving up.
pub const RECV_RETRIES: usize = 10;

/// How many attempts to establish the control connection.
pub const CONNECT_RETRIES: usize = 10;
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Pause before re-establishing a lost control connection.
pub const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Chunk size for data-channel transfers.
pub const TRANSFER_CHUNK: usize = 8192;

/// Scratch buffer size for control-channel reads.
pub const RECV_BUFFER: usize = 4096;

/// Archive suffixes unpacked in place after download. `.tar.gz` must come
/// before `.tar`.
pub const ARCHIVE_EXTS: &[&str] = &[".zip", ".tar.gz", ".tgz", ".tar"];
