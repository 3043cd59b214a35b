//! The FTP control session.
//!
//! A session owns the control socket, the credentials, and the remote and
//! local working-directory bookkeeping. Commands are strictly sequential:
//! one command, one consumed reply, never two operations in flight. The
//! remote directory is always an absolute path once login succeeds and is
//! only updated after a confirming reply from the server.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Local;
use filetime::FileTime;
use log::{debug, error, info, trace, warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{sleep, timeout};

use crate::constants::{
    CONNECT_BACKOFF, CONNECT_RETRIES, CONTROL_TIMEOUT, DATA_TIMEOUT, RECV_BUFFER, RECV_RETRIES,
    SESSION_SETUP_TIMEOUT, TRANSFER_CHUNK,
};
use crate::core_client::error::{FtpError, Result};
use crate::core_client::listing::{parse_list_line, DirEntry};
use crate::core_client::pasv;
use crate::core_client::reply::{describe, parse_reply_block, Reply};

pub struct FtpSession {
    control: Option<TcpStream>,
    host: String,
    port: u16,
    username: String,
    password: String,
    remote_dir: String,
    local_dir: PathBuf,
    replies: VecDeque<Reply>,
    recv_buf: Vec<u8>,
    established: bool,
    pub debug: bool,
}

/// Strips directory traversal sequences and leading slashes so a listing
/// name from the server cannot escape the local target directory.
fn sanitize_name(name: &str) -> String {
    name.replace("../", "")
        .replace("..\\", "")
        .trim_start_matches('/')
        .to_string()
}

impl FtpSession {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            control: None,
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            remote_dir: String::from("/"),
            local_dir: PathBuf::from("."),
            replies: VecDeque::new(),
            recv_buf: vec![0u8; RECV_BUFFER],
            established: false,
            debug: false,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn remote_dir(&self) -> &str {
        &self.remote_dir
    }

    pub fn set_local_dir(&mut self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        self.local_dir = path.to_path_buf();
        Ok(())
    }

    /// Connects the control channel and authenticates.
    ///
    /// Expects `220`, sends `USER`/`PASS`, switches to binary mode and
    /// fetches the server working directory. A rejected password is
    /// terminal for the session; it is never retried.
    pub async fn start_session(&mut self) -> Result<()> {
        self.established = false;
        self.replies.clear();
        self.connect_control().await?;

        let greeting = self.read_reply().await?;
        if greeting.code != 220 {
            return Err(FtpError::UnexpectedReply {
                code: greeting.code,
                message: greeting.message,
            });
        }

        self.send_command(&format!("USER {}", self.username)).await?;
        let reply = self.read_reply().await?;
        if reply.code != 331 {
            return Err(FtpError::UnexpectedReply {
                code: reply.code,
                message: reply.message,
            });
        }

        self.send_command(&format!("PASS {}", self.password)).await?;
        let reply = self.read_reply().await?;
        if reply.is_error() {
            error!(
                "Login rejected for {} ({})",
                self.username,
                describe(reply.code)
            );
            return Err(FtpError::AuthFailed);
        }
        self.established = true;
        info!("Logged in to {} as {}", self.host, self.username);

        self.send_command("TYPE I").await?;
        let reply = self.read_reply().await?;
        if !reply.is_success() {
            warn!("Server refused binary mode: {} {}", reply.code, reply.message);
        }

        self.get_server_dir().await
    }

    /// Asks the server for its working directory and adopts it.
    pub async fn get_server_dir(&mut self) -> Result<()> {
        self.send_command("PWD").await?;
        let reply = self.expect(257).await?;
        let open = reply
            .message
            .find('"')
            .ok_or_else(|| FtpError::Protocol(format!("unquoted PWD reply: {}", reply.message)))?;
        let rest = &reply.message[open + 1..];
        let close = rest
            .find('"')
            .ok_or_else(|| FtpError::Protocol(format!("unquoted PWD reply: {}", reply.message)))?;
        self.remote_dir = rest[..close].to_string();
        debug!("Server working directory is {}", self.remote_dir);
        Ok(())
    }

    /// Resolves a directory modifier against an absolute current path.
    ///
    /// An absolute modifier replaces the path outright; `..` and leading
    /// `../` runs strip one trailing segment each; anything else is
    /// appended as a new segment.
    pub fn resolve_path(current: &str, modifier: &str) -> Result<String> {
        if !current.starts_with('/') {
            return Err(FtpError::BadFormat(format!(
                "current directory {current:?} is not absolute"
            )));
        }
        if modifier.starts_with('/') {
            return Ok(modifier.to_string());
        }

        let mut base = current.trim_end_matches('/').to_string();
        if modifier == ".." {
            base.truncate(base.rfind('/').unwrap_or(0));
            return Ok(if base.is_empty() { "/".to_string() } else { base });
        }

        let mut rest = modifier;
        while let Some(stripped) = rest.strip_prefix("../") {
            base.truncate(base.rfind('/').unwrap_or(0));
            rest = stripped;
        }
        if rest.is_empty() {
            return Ok(if base.is_empty() { "/".to_string() } else { base });
        }
        Ok(format!("{base}/{rest}"))
    }

    /// Changes the remote directory. The server performs the actual
    /// change; we independently predict the outcome and only adopt the
    /// predicted path once the server confirms.
    pub async fn set_remote_dir(&mut self, path: &str) -> Result<()> {
        let predicted = Self::resolve_path(&self.remote_dir, path)?;
        self.send_command(&format!("CWD {path}")).await?;
        let reply = self.read_reply().await?;
        match reply.code {
            250 => {
                self.remote_dir = predicted;
                debug!("Remote directory is now {}", self.remote_dir);
                Ok(())
            }
            550 => Err(FtpError::NotFound(path.to_string())),
            code => Err(FtpError::UnexpectedReply {
                code,
                message: reply.message,
            }),
        }
    }

    pub async fn remote_dir_create(&mut self, path: &str) -> Result<()> {
        self.send_command(&format!("MKD {path}")).await?;
        let reply = self.read_reply().await?;
        if reply.code != 257 {
            return Err(FtpError::WriteFailed(path.to_string()));
        }
        Ok(())
    }

    pub async fn remote_dir_delete(&mut self, path: &str) -> Result<()> {
        self.send_command(&format!("RMD {path}")).await?;
        let reply = self.read_reply().await?;
        if reply.code != 257 {
            return Err(FtpError::WriteFailed(path.to_string()));
        }
        Ok(())
    }

    /// Fetches and parses a long-format listing of the remote directory.
    pub async fn get_dir_list(&mut self, criteria: Option<&str>) -> Result<Vec<DirEntry>> {
        let mut data = pasv::open_data_channel(self).await?;
        let cmd = match criteria {
            Some(c) if !c.is_empty() => format!("LIST {c}"),
            _ => "LIST".to_string(),
        };
        self.send_command(&cmd).await?;
        self.expect(150).await?;

        let mut raw = Vec::new();
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        loop {
            match timeout(DATA_TIMEOUT, data.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => raw.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => {
                    warn!("Data channel read failed during LIST: {}", e);
                    break;
                }
                Err(_) => {
                    warn!("Data channel timed out during LIST");
                    break;
                }
            }
        }
        drop(data);
        self.expect(226).await?;

        let text = String::from_utf8_lossy(&raw);
        let now = Local::now().naive_local();
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            // Header lines like "total 12" carry no entry.
            if line.split_whitespace().count() < 9 {
                trace!("Skipping listing line {:?}", line);
                continue;
            }
            entries.push(parse_list_line(line, now)?);
        }
        info!("Listed {} entries in {}", entries.len(), self.remote_dir);
        Ok(entries)
    }

    /// Downloads one listed entry into the local directory.
    ///
    /// The transfer lands in a `.part` file which is renamed into place
    /// and stamped with the server modification time once the data
    /// channel is drained. Zero-size entries are skipped outright.
    pub async fn file_download(&mut self, entry: &DirEntry) -> Result<()> {
        if entry.size == 0 {
            info!("Skipping zero-size entry {}", entry.name);
            return Ok(());
        }
        let safe_name = sanitize_name(&entry.name);
        let final_path = self.local_dir.join(&safe_name);
        let part_path = self.local_dir.join(format!("{safe_name}.part"));

        let mut data = pasv::open_data_channel(self).await?;
        self.send_command(&format!("RETR {}", entry.name)).await?;
        let reply = self.read_reply().await?;
        if reply.is_error() {
            return Err(if reply.code == 550 {
                FtpError::NotFound(entry.name.clone())
            } else {
                FtpError::UnexpectedReply {
                    code: reply.code,
                    message: reply.message,
                }
            });
        }

        let mut file = File::create(&part_path)
            .await
            .map_err(|e| FtpError::WriteFailed(format!("{}: {e}", part_path.display())))?;
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut received: u64 = 0;
        while received < entry.size {
            let want = TRANSFER_CHUNK.min((entry.size - received) as usize);
            match timeout(DATA_TIMEOUT, data.read(&mut buf[..want])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    file.write_all(&buf[..n])
                        .await
                        .map_err(|e| FtpError::WriteFailed(format!("{}: {e}", part_path.display())))?;
                    received += n as u64;
                }
                Ok(Err(e)) => {
                    warn!("Data channel read failed during RETR {}: {}", entry.name, e);
                    break;
                }
                Err(_) => {
                    warn!("Data channel timed out during RETR {}", entry.name);
                    break;
                }
            }
        }
        file.flush()
            .await
            .map_err(|e| FtpError::WriteFailed(format!("{}: {e}", part_path.display())))?;
        drop(file);
        drop(data);

        tokio::fs::rename(&part_path, &final_path).await?;
        filetime::set_file_mtime(&final_path, FileTime::from_unix_time(entry.epoch(), 0))?;

        self.expect(226).await?;
        info!("Downloaded {} ({} bytes)", entry.name, received);
        Ok(())
    }

    /// Uploads a local file under the given remote name. A shortfall
    /// between bytes sent and the local file size fails the operation
    /// even when the server acknowledged the transfer.
    pub async fn file_upload(&mut self, server_name: &str, local_name: &str) -> Result<()> {
        let local_path = self.local_dir.join(local_name);
        let meta = tokio::fs::metadata(&local_path)
            .await
            .map_err(|_| FtpError::NotFound(local_name.to_string()))?;
        let size = meta.len();

        let mut data = pasv::open_data_channel(self).await?;
        self.send_command(&format!("STOR {server_name}")).await?;
        let reply = self.read_reply().await?;
        if reply.is_error() {
            return Err(FtpError::UnexpectedReply {
                code: reply.code,
                message: reply.message,
            });
        }

        let mut file = File::open(&local_path).await?;
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut sent: u64 = 0;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            timeout(DATA_TIMEOUT, data.write_all(&buf[..n]))
                .await
                .map_err(|_| FtpError::Timeout)?
                .map_err(|e| FtpError::SendFailed(e.to_string()))?;
            sent += n as u64;
        }
        let _ = timeout(DATA_TIMEOUT, data.shutdown()).await;
        drop(data);

        self.expect(226).await?;
        if sent != size {
            return Err(FtpError::SendFailed(format!(
                "short upload of {server_name}: {sent} of {size} bytes"
            )));
        }
        info!("Uploaded {} ({} bytes)", server_name, sent);
        Ok(())
    }

    pub async fn file_delete(&mut self, name: &str) -> Result<()> {
        self.send_command(&format!("DELE {name}")).await?;
        let reply = self.read_reply().await?;
        if reply.is_error() {
            return Err(FtpError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub async fn file_rename(&mut self, old: &str, new: &str) -> Result<()> {
        self.send_command(&format!("RNFR {old}")).await?;
        let reply = self.read_reply().await?;
        if reply.code != 350 {
            return Err(FtpError::NotFound(old.to_string()));
        }
        self.send_command(&format!("RNTO {new}")).await?;
        let reply = self.read_reply().await?;
        if reply.is_error() {
            return Err(FtpError::NotFound(new.to_string()));
        }
        Ok(())
    }

    /// Best-effort goodbye; the control socket is closed regardless.
    pub async fn quit_session(&mut self) {
        if self.control.is_some() && self.send_command("QUIT").await.is_ok() {
            let _ = self.read_reply().await;
        }
        self.drop_control();
        info!("Session with {} closed", self.host);
    }

    pub(crate) fn drop_control(&mut self) {
        self.control = None;
        self.replies.clear();
        self.established = false;
    }

    async fn connect_control(&mut self) -> Result<()> {
        let addr = self.resolve().await?;
        for attempt in 0..CONNECT_RETRIES {
            if attempt > 0 {
                sleep(CONNECT_BACKOFF).await;
            }
            match timeout(SESSION_SETUP_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    debug!("Control connection established to {}", addr);
                    self.control = Some(stream);
                    return Ok(());
                }
                Ok(Err(e)) => warn!(
                    "Connect attempt {}/{} to {} failed: {}",
                    attempt + 1,
                    CONNECT_RETRIES,
                    addr,
                    e
                ),
                Err(_) => warn!(
                    "Connect attempt {}/{} to {} timed out",
                    attempt + 1,
                    CONNECT_RETRIES,
                    addr
                ),
            }
        }
        Err(FtpError::HostFail(format!("{}:{}", self.host, self.port)))
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| FtpError::Resolver {
                host: self.host.clone(),
                source: e,
            })?;
        // IPv4 only; passive endpoints are dotted quads anyway.
        addrs
            .find(|a| a.is_ipv4())
            .ok_or_else(|| FtpError::HostNotFound(self.host.clone()))
    }

    pub(crate) async fn send_command(&mut self, line: &str) -> Result<()> {
        if self.debug {
            if line.starts_with("PASS ") {
                debug!("--> PASS ******");
            } else {
                debug!("--> {}", line);
            }
        }
        let stream = self
            .control
            .as_mut()
            .ok_or_else(|| FtpError::SendFailed("control socket closed".to_string()))?;
        stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|e| FtpError::SendFailed(e.to_string()))
    }

    /// Returns the next logical reply, draining the queue left over from
    /// a previous physical read before touching the socket again.
    pub(crate) async fn read_reply(&mut self) -> Result<Reply> {
        if let Some(reply) = self.replies.pop_front() {
            return Ok(reply);
        }
        let block = self.recv_block().await?;
        let mut parsed = parse_reply_block(&block)?;
        let first = parsed
            .pop_front()
            .ok_or_else(|| FtpError::Protocol("empty reply block".to_string()))?;
        self.replies.extend(parsed);
        if self.debug {
            debug!(
                "<-- {} {} [{}]",
                first.code,
                first.message.lines().next().unwrap_or(""),
                describe(first.code)
            );
        }
        Ok(first)
    }

    async fn expect(&mut self, code: u16) -> Result<Reply> {
        let reply = self.read_reply().await?;
        if reply.code != code {
            return Err(FtpError::UnexpectedReply {
                code: reply.code,
                message: reply.message,
            });
        }
        Ok(reply)
    }

    async fn recv_block(&mut self) -> Result<String> {
        let dur = if self.established {
            CONTROL_TIMEOUT
        } else {
            SESSION_SETUP_TIMEOUT
        };
        for attempt in 0..RECV_RETRIES {
            let stream = self.control.as_mut().ok_or(FtpError::RecvFailed)?;
            match timeout(dur, stream.read(&mut self.recv_buf)).await {
                Ok(Ok(0)) => {
                    warn!("Control connection closed by peer");
                    return Err(FtpError::RecvFailed);
                }
                Ok(Ok(n)) => return Ok(String::from_utf8_lossy(&self.recv_buf[..n]).into_owned()),
                Ok(Err(e)) => {
                    warn!("Control read failed: {}", e);
                    return Err(FtpError::RecvFailed);
                }
                Err(_) => debug!(
                    "Control read timed out (attempt {}/{})",
                    attempt + 1,
                    RECV_RETRIES
                ),
            }
        }
        Err(FtpError::RecvFailed)
    }
}
