//! Bounded reconnect-and-retry for control-channel operations.
//!
//! A transport failure mid-session gets exactly one recovery attempt per
//! call site: drop the control socket, pause, re-establish the session
//! with the stored credentials, restore the remembered working directory,
//! then reissue the original operation. Anything else propagates.

use log::warn;
use tokio::time::sleep;

use crate::constants::RECONNECT_BACKOFF;
use crate::core_client::error::Result;
use crate::core_client::session::FtpSession;

impl FtpSession {
    /// Re-establishes a lost control connection and restores the session
    /// to the directory it was in when the transport failed.
    pub async fn reconnect(&mut self) -> Result<()> {
        warn!("Control channel to {} lost, reconnecting", self.host());
        let dir = self.remote_dir().to_string();
        self.drop_control();
        sleep(RECONNECT_BACKOFF).await;
        self.start_session().await?;
        if dir != "/" {
            self.set_remote_dir(&dir).await?;
        }
        Ok(())
    }
}

/// Runs a session operation with one reconnect-and-retry on a
/// transport-class failure. Protocol and authentication errors pass
/// through untouched.
macro_rules! supervised {
    ($session:expr, $call:expr) => {{
        match $call {
            Err(e) if e.is_transport() => {
                $session.reconnect().await?;
                $call
            }
            other => other,
        }
    }};
}
pub(crate) use supervised;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_client::error::FtpError;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Server that drops the control connection right after login once,
    /// then behaves on the second connection.
    async fn flaky_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for conn in 0..2usize {
                let (mut sock, _) = listener.accept().await.unwrap();
                sock.write_all(b"220 ready\r\n").await.unwrap();
                let (read_half, mut w) = sock.split();
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut parts = line.splitn(2, ' ');
                    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
                    match cmd.as_str() {
                        "USER" => w.write_all(b"331 need password\r\n").await.unwrap(),
                        "PASS" => w.write_all(b"230 logged in\r\n").await.unwrap(),
                        "TYPE" => w.write_all(b"200 ok\r\n").await.unwrap(),
                        "PWD" => w
                            .write_all(b"257 \"/pub\" is the current directory\r\n")
                            .await
                            .unwrap(),
                        "CWD" => w.write_all(b"250 directory changed\r\n").await.unwrap(),
                        "DELE" => {
                            if conn == 0 {
                                // Simulate a dying server: close without replying.
                                break;
                            }
                            w.write_all(b"250 deleted\r\n").await.unwrap();
                        }
                        "QUIT" => {
                            w.write_all(b"221 bye\r\n").await.unwrap();
                            break;
                        }
                        _ => w.write_all(b"502 not implemented\r\n").await.unwrap(),
                    }
                }
            }
        });
        port
    }

    #[tokio::test]
    async fn test_reconnect_restores_directory_and_retries() -> Result<()> {
        let port = flaky_server().await;
        let mut session = FtpSession::new("127.0.0.1", port, "anonymous", "secret");
        session.start_session().await?;
        session.set_remote_dir("data").await?;
        assert_eq!(session.remote_dir(), "/pub/data");

        // First DELE hits the dying connection, the supervisor retry
        // succeeds against the fresh one.
        supervised!(session, session.file_delete("old.log").await)?;
        assert_eq!(session.remote_dir(), "/pub/data");
        Ok(())
    }

    #[tokio::test]
    async fn test_non_transport_errors_pass_through() -> Result<()> {
        let port = flaky_server().await;
        let mut session = FtpSession::new("127.0.0.1", port, "anonymous", "secret");
        session.start_session().await?;

        let result: Result<()> =
            supervised!(session, session.remote_dir_create("somewhere").await);
        // 502 from the script maps to WriteFailed; no reconnect happens.
        assert!(matches!(result, Err(FtpError::WriteFailed(_))));
        Ok(())
    }
}
