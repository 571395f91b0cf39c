//! Downloader output parsing.
//!
//! The downloader prints free-form status text. Each line is turned into
//! [`DownloaderEvent`]s here; forwarding lines to the log and driving the
//! progress bar happens in the caller.

use regex::Regex;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"version\s+([^)\s][^)]*)\)").expect("version pattern is valid")
});

// A percentage closing the line, optionally followed by bracketed or
// parenthesized detail such as a transfer rate.
static PROGRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)%\s*(?:[\[(][^\])]*[\])]\s*)*$")
        .expect("progress pattern is valid")
});

/// Splits a byte stream into lines at `\n` or `\r`.
///
/// Progress bars redraw with bare carriage returns, so waiting for a newline
/// would hold back every update until the download ends.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// The trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            Some(line)
        }
    }
}

/// Something the downloader reported.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloaderEvent {
    /// Download progress in percent.
    Progress(f32),
    /// The version of the package being downloaded.
    VersionDetected(String),
    /// Any other output line, including messages that merely mention a
    /// percentage.
    Line(String),
}

/// Line parser for one downloader invocation.
///
/// Only the first version token of an invocation is reported; later mentions
/// are ordinary lines.
#[derive(Debug, Default)]
pub struct OutputParser {
    version_seen: bool,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a version was reported by this invocation.
    pub fn version_seen(&self) -> bool {
        self.version_seen
    }

    /// Parse one line of output. Carriage-return redraws are split so the
    /// last progress figure on the line wins.
    pub fn parse_line(&mut self, raw: &str) -> Vec<DownloaderEvent> {
        let mut events = Vec::new();

        for segment in raw.split('\r') {
            let line = segment.trim();
            if line.is_empty() {
                continue;
            }

            if !self.version_seen {
                if let Some(captures) = VERSION_PATTERN.captures(line) {
                    self.version_seen = true;
                    events.push(DownloaderEvent::VersionDetected(captures[1].trim().to_string()));
                    continue;
                }
            }

            let percent = PROGRESS_PATTERN
                .captures(line)
                .and_then(|c| c[1].parse::<f32>().ok())
                .filter(|p| *p <= 100.0);
            match percent {
                Some(percent) => events.push(DownloaderEvent::Progress(percent)),
                None => events.push(DownloaderEvent::Line(line.to_string())),
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_detected_once() {
        let mut parser = OutputParser::new();

        let events = parser.parse_line("Downloading latest release (version 2026.01.13-5f2a)");
        assert_eq!(events, vec![DownloaderEvent::VersionDetected("2026.01.13-5f2a".to_string())]);
        assert!(parser.version_seen());

        let events = parser.parse_line("Verified (version 9.9.9)");
        assert_eq!(events, vec![DownloaderEvent::Line("Verified (version 9.9.9)".to_string())]);
    }

    #[test]
    fn test_version_requires_closing_paren() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line("checking version 1.2.3");
        assert_eq!(events, vec![DownloaderEvent::Line("checking version 1.2.3".to_string())]);
        assert!(!parser.version_seen());
    }

    #[test]
    fn test_progress_with_carriage_returns() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line("[==   ] 12.5%\r[==== ] 80%\r");
        assert_eq!(events, vec![DownloaderEvent::Progress(12.5), DownloaderEvent::Progress(80.0)]);
    }

    #[test]
    fn test_percent_inside_message_is_a_line() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line("error: disk 98% full, aborting");
        assert_eq!(
            events,
            vec![DownloaderEvent::Line("error: disk 98% full, aborting".to_string())]
        );

        let events = parser.parse_line("retrying with 150%");
        assert_eq!(events, vec![DownloaderEvent::Line("retrying with 150%".to_string())]);
    }

    #[test]
    fn test_progress_with_trailing_rate() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line("Downloading 42% (3.1 MB/s)");
        assert_eq!(events, vec![DownloaderEvent::Progress(42.0)]);
    }

    #[test]
    fn test_line_splitter_handles_split_chunks() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"Downloading 1").is_empty());
        assert_eq!(splitter.push(b"0%\rDownloading 20%\r"), vec!["Downloading 10%", "Downloading 20%"]);
        assert_eq!(splitter.push(b"done\r\nnext"), vec!["done"]);
        assert_eq!(splitter.finish().as_deref(), Some("next"));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut parser = OutputParser::new();
        assert!(parser.parse_line("   ").is_empty());
    }
}
