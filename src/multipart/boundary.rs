//! Boundary recognition
//!
//! The delimiter set derived from a client boundary token, and the
//! incremental matcher that recognizes it one byte at a time so that a
//! delimiter split across arbitrary chunk edges is still found.

use super::MultipartError;

/// RFC 2046 limit on boundary token length
pub const MAX_BOUNDARY_LENGTH: usize = 70;

/// The two delimiters of one decode operation.
///
/// Held as a single buffer `"\r\n--" + boundary + "--"`:
/// - [`part`](Self::part) is `"\r\n--" + boundary`, the delimiter as it appears
///   after content (the preceding line break belongs to the delimiter)
/// - [`delimiter`](Self::delimiter) is `"--" + boundary`
/// - [`terminal`](Self::terminal) is `"--" + boundary + "--"`
///
/// so the terminal delimiter is the part delimiter plus `--` by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterSet {
    bytes: Vec<u8>,
}

impl DelimiterSet {
    /// Build the delimiter set for a boundary token.
    ///
    /// The token must be 1 to 70 bytes and must not contain CR or LF.
    pub fn new(boundary: &str) -> Result<Self, MultipartError> {
        if boundary.is_empty() {
            return Err(MultipartError::MissingBoundary);
        }
        if boundary.len() > MAX_BOUNDARY_LENGTH {
            return Err(MultipartError::InvalidBoundary(format!(
                "boundary is {} bytes, limit is {}",
                boundary.len(),
                MAX_BOUNDARY_LENGTH
            )));
        }
        if boundary.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(MultipartError::InvalidBoundary(
                "boundary contains a line break".into(),
            ));
        }

        let mut bytes = Vec::with_capacity(boundary.len() + 6);
        bytes.extend_from_slice(b"\r\n--");
        bytes.extend_from_slice(boundary.as_bytes());
        bytes.extend_from_slice(b"--");
        Ok(Self { bytes })
    }

    /// Line break plus part delimiter, as matched inside a part body
    pub fn part(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 2]
    }

    /// `--boundary`
    pub fn delimiter(&self) -> &[u8] {
        &self.bytes[2..self.bytes.len() - 2]
    }

    /// `--boundary--`
    pub fn terminal(&self) -> &[u8] {
        &self.bytes[2..]
    }
}

/// Outcome of feeding one byte to a [`BoundaryMatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// The byte extended the match
    Advanced,
    /// The byte completed the pattern; progress is back at zero
    Complete,
    /// The byte did not match; carries the progress that was lost, i.e. how
    /// many previously matched bytes are ordinary content after all
    Broken(usize),
}

/// Match progress against one pattern.
///
/// The matcher does not own its pattern, so it is `Copy` and can live
/// inside a plain-value decoder cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundaryMatcher {
    progress: usize,
}

impl BoundaryMatcher {
    /// A matcher that already matched the first `progress` bytes
    pub fn primed(progress: usize) -> Self {
        Self { progress }
    }

    /// Bytes of the pattern matched so far
    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn reset(&mut self) {
        self.progress = 0;
    }

    /// Feed one byte.
    pub fn advance(&mut self, pattern: &[u8], byte: u8) -> MatchEvent {
        if byte == pattern[self.progress] {
            self.progress += 1;
            if self.progress == pattern.len() {
                self.progress = 0;
                return MatchEvent::Complete;
            }
            return MatchEvent::Advanced;
        }

        let lost = self.progress;
        self.progress = 0;
        MatchEvent::Broken(lost)
    }

    /// Feed one byte; on a break, test the same byte again as the possible
    /// start of a fresh match.
    ///
    /// Returns the event of the first test and whether the re-test started a
    /// new match.
    pub fn advance_retesting(&mut self, pattern: &[u8], byte: u8) -> (MatchEvent, bool) {
        match self.advance(pattern, byte) {
            MatchEvent::Broken(lost) if lost > 0 => {
                let restarted = self.advance(pattern, byte) == MatchEvent::Advanced;
                (MatchEvent::Broken(lost), restarted)
            }
            event => (event, false),
        }
    }
}
