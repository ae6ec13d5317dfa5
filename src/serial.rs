use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rppal::uart::{Parity, Uart};

pub const PARITY: Parity = Parity::None;
pub const DATA_BITS: u8 = 8;
pub const STOP_BITS: u8 = 1;

const READ_CHUNK: usize = 256;

/// Longest partial line kept while waiting for a terminator.
pub const MAX_LINE_LEN: usize = 4096;

/// A byte stream that can report how many bytes are waiting without blocking.
pub trait ByteSource {
    fn bytes_available(&mut self) -> Result<usize, anyhow::Error>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, anyhow::Error>;
}

#[derive(Debug)]
pub struct SerialPort {
    uart: Uart,
}

impl SerialPort {
    pub fn open(path: &Path, baud_rate: u32) -> Result<SerialPort, anyhow::Error> {
        let mut uart = Uart::with_path(path, baud_rate, PARITY, DATA_BITS, STOP_BITS)
            .with_context(|| format!("Failed to open serial port {}", path.display()))?;

        // Reads return immediately with whatever is buffered.
        uart.set_read_mode(0, Duration::ZERO)
            .context("Failed to set read mode")?;

        Ok(SerialPort { uart })
    }
}

impl ByteSource for SerialPort {
    fn bytes_available(&mut self) -> Result<usize, anyhow::Error> {
        self.uart
            .input_len()
            .context("Failed to query serial input length")
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, anyhow::Error> {
        self.uart
            .read(buf)
            .context("Failed to read from serial port")
    }
}

/// Accumulates bytes from a [`ByteSource`] into newline-terminated lines.
#[derive(Debug)]
pub struct LineReader<S> {
    source: S,
    pending: Vec<u8>,
}

impl<S: ByteSource> LineReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: Vec::new(),
        }
    }

    /// Returns the next complete line (without the terminator), or `None`
    /// if no full line has arrived yet.
    pub fn poll_line(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let available = self.source.bytes_available()?;
        if available == 0 {
            return Ok(None);
        }

        let mut buf = [0u8; READ_CHUNK];
        let len = available.min(READ_CHUNK);
        let n = self.source.read(&mut buf[..len])?;
        self.pending.extend_from_slice(&buf[..n]);

        let line = self.take_line();
        if line.is_none() && self.pending.len() > MAX_LINE_LEN {
            log::warn!(
                "Discarding {} bytes received without a line terminator",
                self.pending.len()
            );
            self.pending.clear();
        }
        Ok(line)
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(line)
    }
}

/// Decodes a raw line as UTF-8 and trims surrounding whitespace.
pub fn decode_line(bytes: &[u8]) -> Result<&str, std::str::Utf8Error> {
    std::str::from_utf8(bytes).map(str::trim)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Serves queued chunks, one chunk per read.
    #[derive(Debug, Default)]
    pub(crate) struct MockSource {
        pub(crate) chunks: VecDeque<Vec<u8>>,
    }

    impl MockSource {
        pub(crate) fn new<I, C>(chunks: I) -> Self
        where
            I: IntoIterator<Item = C>,
            C: AsRef<[u8]>,
        {
            Self {
                chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            }
        }
    }

    impl ByteSource for MockSource {
        fn bytes_available(&mut self) -> Result<usize, anyhow::Error> {
            Ok(self.chunks.front().map_or(0, Vec::len))
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, anyhow::Error> {
            let Some(chunk) = self.chunks.front_mut() else {
                return Ok(0);
            };
            let n = buf.len().min(chunk.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            chunk.drain(..n);
            if chunk.is_empty() {
                self.chunks.pop_front();
            }
            Ok(n)
        }
    }

    #[test]
    fn test_poll_line_without_data() {
        let mut reader = LineReader::new(MockSource::default());
        assert_eq!(reader.poll_line().unwrap(), None);
    }

    #[test]
    fn test_poll_line_reassembles_split_line() {
        let mut reader = LineReader::new(MockSource::new(["{23.5,4", "5%,24.1}\r\n"]));
        assert_eq!(reader.poll_line().unwrap(), None);
        assert_eq!(
            reader.poll_line().unwrap(),
            Some(b"{23.5,45%,24.1}\r".to_vec())
        );
        assert_eq!(reader.poll_line().unwrap(), None);
    }

    #[test]
    fn test_poll_line_multiple_lines_in_one_read() {
        let mut reader = LineReader::new(MockSource::new(["a\nb\nc"]));
        assert_eq!(reader.poll_line().unwrap(), Some(b"a".to_vec()));
        assert_eq!(reader.poll_line().unwrap(), Some(b"b".to_vec()));
        assert_eq!(reader.poll_line().unwrap(), None);
        assert_eq!(reader.into_inner().chunks.len(), 0);
    }

    #[test]
    fn test_poll_line_large_chunk() {
        let long = format!("{}\n", "x".repeat(READ_CHUNK * 2));
        let mut reader = LineReader::new(MockSource::new([long.as_bytes()]));
        assert_eq!(reader.poll_line().unwrap(), None);
        assert_eq!(reader.poll_line().unwrap(), None);
        assert_eq!(
            reader.poll_line().unwrap(),
            Some("x".repeat(READ_CHUNK * 2).into_bytes())
        );
    }

    #[test]
    fn test_poll_line_discards_unterminated_noise() {
        let noise = vec![0x55u8; MAX_LINE_LEN + 1];
        let mut reader = LineReader::new(MockSource::new([&noise[..], &b"{1,2%,3}\n"[..]]));
        while reader.source.chunks.len() > 1 {
            assert_eq!(reader.poll_line().unwrap(), None);
            assert!(reader.pending.len() <= MAX_LINE_LEN);
        }
        assert!(reader.pending.is_empty());
        assert_eq!(reader.poll_line().unwrap(), Some(b"{1,2%,3}".to_vec()));
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"  {1,2%,3}\r").unwrap(), "{1,2%,3}");
        assert!(decode_line(&[0x7b, 0xff, 0x7d]).is_err());
    }
}
