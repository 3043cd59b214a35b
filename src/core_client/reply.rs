//! Parsing of FTP control-channel replies.
//!
//! One physical read may carry several logical replies (a preliminary
//! `150` followed by the final `226`, for instance), and one logical reply
//! may span several physical lines when the server repeats its code at the
//! start of each line. The session keeps the parsed replies in a FIFO and
//! drains it before touching the socket again.

use std::collections::VecDeque;

use crate::core_client::error::FtpError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

fn leading_code(line: &str) -> Option<u16> {
    let digits = line.get(0..3)?;
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Splits a raw block of control-channel bytes into logical replies.
///
/// Consecutive lines that repeat the same 3-digit code are coalesced into
/// one [`Reply`]; lines without a code (free-form continuation text) are
/// appended to the reply in progress. The block must open with a 3-digit
/// code or the whole read is rejected as a protocol violation.
pub fn parse_reply_block(block: &str) -> Result<VecDeque<Reply>, FtpError> {
    let mut lines = block.lines().filter(|l| !l.is_empty());

    let first = lines
        .next()
        .ok_or_else(|| FtpError::Protocol("empty reply block".to_string()))?;
    let first_code = leading_code(first)
        .ok_or_else(|| FtpError::Protocol(format!("reply does not start with a code: {first:?}")))?;

    let mut replies = VecDeque::new();
    let mut code = first_code;
    let mut message = String::from(first.get(4..).unwrap_or(""));

    for line in lines {
        match leading_code(line) {
            Some(c) if c == code => {
                // Multi-line reply, same code repeated at line start.
                message.push('\n');
                message.push_str(line.get(4..).unwrap_or(""));
            }
            Some(c) => {
                replies.push_back(Reply { code, message });
                code = c;
                message = String::from(line.get(4..).unwrap_or(""));
            }
            None => {
                message.push('\n');
                message.push_str(line);
            }
        }
    }
    replies.push_back(Reply { code, message });

    Ok(replies)
}

/// Human-readable description of a reply code, used for diagnostics only.
pub fn describe(code: u16) -> &'static str {
    match code {
        120 => "service ready soon",
        125 => "data connection already open",
        150 => "about to open data connection",
        200 => "command okay",
        215 => "system type",
        220 => "service ready",
        221 => "closing control connection",
        226 => "closing data connection",
        227 => "entering passive mode",
        230 => "user logged in",
        250 => "file action okay",
        257 => "pathname created",
        331 => "need password",
        350 => "pending further information",
        421 => "service not available",
        425 => "cannot open data connection",
        426 => "transfer aborted",
        450 => "file unavailable, busy",
        451 => "local error in processing",
        452 => "insufficient storage",
        500 => "syntax error",
        501 => "syntax error in parameters",
        502 => "command not implemented",
        503 => "bad command sequence",
        530 => "not logged in",
        550 => "file unavailable",
        552 => "storage allocation exceeded",
        553 => "file name not allowed",
        _ => "unrecognized reply",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_reply() {
        let replies = parse_reply_block("220 Service ready.\r\n").unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code, 220);
        assert_eq!(replies[0].message, "Service ready.");
    }

    #[test]
    fn test_multiline_reply_coalesced() {
        let block = "220-Welcome to the archive.\r\n220-Mirrors are listed in README.\r\n220 Service ready.\r\n";
        let replies = parse_reply_block(block).unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code, 220);
        assert_eq!(
            replies[0].message,
            "Welcome to the archive.\nMirrors are listed in README.\nService ready."
        );
    }

    #[test]
    fn test_two_replies_in_one_read() {
        let block = "150 Opening data connection.\r\n226 Transfer complete.\r\n";
        let replies = parse_reply_block(block).unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].code, 150);
        assert_eq!(replies[1].code, 226);
    }

    #[test]
    fn test_codeless_continuation_line() {
        let block = "211-Features:\r\n SIZE\r\n211 End\r\n";
        let replies = parse_reply_block(block).unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message, "Features:\n SIZE\nEnd");
    }

    #[test]
    fn test_block_without_leading_code() {
        assert!(matches!(
            parse_reply_block("hello there\r\n"),
            Err(FtpError::Protocol(_))
        ));
        assert!(matches!(parse_reply_block(""), Err(FtpError::Protocol(_))));
    }

    #[test]
    fn test_describe_known_codes() {
        assert_eq!(describe(227), "entering passive mode");
        assert_eq!(describe(999), "unrecognized reply");
    }
}
