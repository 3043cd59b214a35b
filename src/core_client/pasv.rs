//! Passive-mode data-channel negotiation.
//!
//! The server nominates an endpoint in its `227` reply; we open a second,
//! single-use connection to it for the transfer. The data socket never
//! outlives the transfer it was opened for.

use std::net::Ipv4Addr;

use log::debug;
use regex::Regex;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::constants::DATA_TIMEOUT;
use crate::core_client::error::{FtpError, Result};
use crate::core_client::session::FtpSession;

/// Extracts the `(a,b,c,d,p1,p2)` tuple from a `227` reply and computes
/// the data endpoint, port being `p1 * 256 + p2`.
pub fn parse_pasv_reply(text: &str) -> Result<(Ipv4Addr, u16)> {
    let re = Regex::new(r"\((\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})\)")
        .unwrap();
    let caps = re
        .captures(text)
        .ok_or_else(|| FtpError::Protocol(format!("no passive tuple in {text:?}")))?;

    let mut oct = [0u8; 6];
    for (i, slot) in oct.iter_mut().enumerate() {
        *slot = caps[i + 1]
            .parse()
            .map_err(|_| FtpError::Protocol(format!("passive tuple out of range in {text:?}")))?;
    }

    let ip = Ipv4Addr::new(oct[0], oct[1], oct[2], oct[3]);
    let port = u16::from(oct[4]) * 256 + u16::from(oct[5]);
    Ok((ip, port))
}

/// Negotiates a passive-mode data connection on an established session.
pub async fn open_data_channel(session: &mut FtpSession) -> Result<TcpStream> {
    session.send_command("PASV").await?;
    let reply = session.read_reply().await?;
    if reply.code != 227 {
        return Err(FtpError::UnexpectedReply {
            code: reply.code,
            message: reply.message,
        });
    }

    let (ip, port) = parse_pasv_reply(&reply.message)?;
    let stream = timeout(DATA_TIMEOUT, TcpStream::connect((ip, port)))
        .await
        .map_err(|_| FtpError::HostFail(format!("data connect to {ip}:{port} timed out")))?
        .map_err(|e| FtpError::HostFail(format!("data connect to {ip}:{port}: {e}")))?;

    debug!("Data channel open to {}:{}", ip, port);
    Ok(stream)
}
