//! Serial barcode/QR scanner line source
//!
//! The scanner emits one newline-terminated payload per scan. This reader:
//! - opens the port with a fixed backoff, retrying forever, logging only the
//!   first consecutive failure to avoid flooding the log
//! - drains all immediately-available bytes per poll and returns the decoded
//!   text with line terminators stripped (empty string = no event this tick)
//! - reconnects fully on any read fault before returning
//!
//! The loop is expected to run for the process lifetime and must tolerate
//! device unplug/replug indefinitely.

use crate::infra::config::Config;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{info, warn};

/// How long to wait for more bytes before treating the frame as complete.
const READ_GRACE: Duration = Duration::from_millis(50);

pub struct Scanner {
    device: String,
    baud: u32,
    backoff: Duration,
    port: Option<SerialStream>,
    buf: BytesMut,
}

impl Scanner {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.serial_device().to_string(),
            baud: config.serial_baud(),
            backoff: config.reconnect_backoff(),
            port: None,
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Open the scanner port, retrying forever on the configured backoff.
    pub async fn open(&mut self) {
        let mut failures = 0u32;
        loop {
            match tokio_serial::new(&self.device, self.baud)
                .timeout(Duration::from_millis(100))
                .open_native_async()
            {
                Ok(port) => {
                    info!(device = %self.device, "scanner_port_opened");
                    self.port = Some(port);
                    return;
                }
                Err(e) => {
                    failures += 1;
                    if failures == 1 {
                        warn!(device = %self.device, error = %e, "scanner_port_open_failed");
                    }
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }

    /// Drain whatever the scanner has emitted since the last poll.
    ///
    /// Returns the accumulated text with `\r`/`\n` stripped, or an empty
    /// string when nothing arrived this tick. A read fault triggers a full
    /// reconnect before returning.
    pub async fn poll_line(&mut self) -> String {
        if self.port.is_none() {
            self.open().await;
        }
        let Some(port) = self.port.as_mut() else {
            return String::new();
        };

        self.buf.clear();
        let mut faulted = false;
        loop {
            match tokio::time::timeout(READ_GRACE, port.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(device = %self.device, error = %e, "scanner_read_failed");
                    faulted = true;
                    break;
                }
                // Port quiet for READ_GRACE - the frame is complete
                Err(_) => break,
            }
        }

        if faulted {
            self.port = None;
            self.open().await;
            return String::new();
        }

        decode_dropping_invalid(&self.buf).replace(['\r', '\n'], "")
    }
}

/// Decode bytes as UTF-8, silently dropping sequences that fail to decode.
/// A scanner glitch corrupts single bytes, not the whole payload.
pub fn decode_dropping_invalid(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                out.push_str(text);
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(std::str::from_utf8(&bytes[..valid]).unwrap_or_default());
                let skip = e.error_len().unwrap_or(1);
                bytes = &bytes[valid + skip..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_clean_ascii() {
        assert_eq!(decode_dropping_invalid(b"t=20240101T1200&n=1"), "t=20240101T1200&n=1");
    }

    #[test]
    fn test_decode_drops_invalid_bytes() {
        assert_eq!(decode_dropping_invalid(b"ab\xffcd"), "abcd");
        assert_eq!(decode_dropping_invalid(b"\xfe\xffab"), "ab");
        assert_eq!(decode_dropping_invalid(b"ab\xff"), "ab");
    }

    #[test]
    fn test_decode_keeps_valid_multibyte() {
        let text = "s=1.00\u{20bd}";
        assert_eq!(decode_dropping_invalid(text.as_bytes()), text);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode_dropping_invalid(b""), "");
    }

    #[test]
    fn test_scanner_starts_unconnected() {
        let scanner = Scanner::new(&Config::default());
        assert!(scanner.port.is_none());
        assert_eq!(scanner.backoff, Duration::from_secs(5));
    }
}
