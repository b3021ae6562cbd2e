//! Bounded output capture.
//!
//! A task can print gigabytes; only the first and last `cap / 2` bytes of each
//! stream are kept while it runs. Keeping both ends preserves how the command
//! started and how it finished, which is what ends up in the log.

use std::collections::VecDeque;

/// Default cap on captured bytes per stream (64 KiB).
pub const DEFAULT_MAX_BYTES: usize = 64 * 1024;

/// Accumulates a byte stream, never holding more than `cap` bytes.
#[derive(Debug)]
pub struct OutputCapture {
    head: Vec<u8>,
    tail: VecDeque<u8>,
    head_cap: usize,
    tail_cap: usize,
    omitted: usize,
}

/// Text rendered from an [`OutputCapture`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
}

impl OutputCapture {
    pub fn new(cap: usize) -> Self {
        let head_cap = cap / 2;
        Self {
            head: Vec::with_capacity(head_cap.min(8 * 1024)),
            tail: VecDeque::new(),
            head_cap,
            tail_cap: cap - head_cap,
            omitted: 0,
        }
    }

    pub fn push(&mut self, mut chunk: &[u8]) {
        if self.head.len() < self.head_cap {
            let take = (self.head_cap - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];
        }
        if self.tail_cap == 0 {
            self.omitted += chunk.len();
            return;
        }
        // Only the last tail_cap bytes of this chunk can survive.
        if chunk.len() > self.tail_cap {
            let skip = chunk.len() - self.tail_cap;
            self.omitted += skip + self.tail.len();
            self.tail.clear();
            chunk = &chunk[skip..];
        }
        let overflow = (self.tail.len() + chunk.len()).saturating_sub(self.tail_cap);
        if overflow > 0 {
            self.tail.drain(..overflow);
            self.omitted += overflow;
        }
        self.tail.extend(chunk);
    }

    /// Bytes dropped so far.
    pub fn omitted(&self) -> usize {
        self.omitted
    }

    /// Render as UTF-8 text with ANSI escapes removed.
    pub fn finish(self) -> CapturedOutput {
        let head = strip_text(&self.head);
        let (tail_front, tail_back) = self.tail.as_slices();
        let mut tail_bytes = Vec::with_capacity(self.tail.len());
        tail_bytes.extend_from_slice(tail_front);
        tail_bytes.extend_from_slice(tail_back);
        let tail = strip_text(&tail_bytes);

        if self.omitted == 0 {
            return CapturedOutput {
                text: format!("{head}{tail}"),
                truncated: false,
            };
        }
        CapturedOutput {
            text: format!(
                "{head}\n\n... [OUTPUT TRUNCATED: {} bytes omitted] ...\n\n{tail}",
                self.omitted
            ),
            truncated: true,
        }
    }
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_returned_as_is() {
        let mut cap = OutputCapture::new(DEFAULT_MAX_BYTES);
        cap.push(b"hello world");
        let out = cap.finish();
        assert_eq!(out.text, "hello world");
        assert!(!out.truncated);
    }

    #[test]
    fn exact_boundary_is_not_truncated() {
        let mut cap = OutputCapture::new(100);
        cap.push(&[b'x'; 100]);
        let out = cap.finish();
        assert_eq!(out.text.len(), 100);
        assert!(!out.truncated);
    }

    #[test]
    fn one_over_boundary_is_truncated() {
        let mut cap = OutputCapture::new(100);
        cap.push(&[b'a'; 101]);
        assert_eq!(cap.omitted(), 1);
        let out = cap.finish();
        assert!(out.truncated);
        assert!(out.text.contains("1 bytes omitted"));
    }

    #[test]
    fn many_small_chunks_keep_head_and_tail() {
        let mut cap = OutputCapture::new(20);
        cap.push(b"AAAAAAAAAA");
        for _ in 0..1_000 {
            cap.push(b"BBBB");
        }
        cap.push(b"CCCCCCCCCC");
        let out = cap.finish();

        assert!(out.text.starts_with("AAAAAAAAAA"));
        assert!(out.text.ends_with("CCCCCCCCCC"));
        assert!(out.text.contains("4000 bytes omitted"));
    }

    #[test]
    fn oversized_single_chunk_keeps_its_end() {
        let mut cap = OutputCapture::new(10);
        let mut big = vec![b'm'; 1_000];
        big.extend_from_slice(b"END");
        cap.push(&big);
        let out = cap.finish();
        assert!(out.text.starts_with("mmmmm"));
        assert!(out.text.ends_with("mmEND"));
        assert!(out.text.contains("993 bytes omitted"));
    }

    #[test]
    fn ansi_sequences_are_stripped() {
        let mut cap = OutputCapture::new(DEFAULT_MAX_BYTES);
        cap.push(b"\x1b[31mred\x1b[0m plain");
        assert_eq!(cap.finish().text, "red plain");
    }

    #[test]
    fn empty_input_returned_as_is() {
        let out = OutputCapture::new(DEFAULT_MAX_BYTES).finish();
        assert_eq!(out, CapturedOutput::default());
    }
}
