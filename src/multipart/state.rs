//! Decoder state machine
//!
//! [`Cursor::step`] is a pure transition function: given the current cursor,
//! the delimiter set and one input byte it returns the next cursor and the
//! [`Effect`] the byte has on the outside world. It performs no I/O, so the
//! whole recognition logic can be tested without a network or a filesystem.

use super::boundary::{BoundaryMatcher, DelimiterSet, MatchEvent};

/// Where the decoder is within the multipart body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Preamble, before the first delimiter
    SeekingPartBoundary,
    /// Between a part delimiter and the blank line ending its headers
    ReadingHeaders,
    /// Content of a file part
    ReadingBody,
    /// Content of a part without a filename
    SkippingPart,
    /// Terminal delimiter seen; everything after it is epilogue
    Done,
}

/// What happens to the byte after the staged bytes were released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    Content,
    Stage,
}

/// The effect of one input byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Drop the byte (preamble, skipped part, epilogue)
    Discard,
    /// Commit the byte as content of the open part
    Content,
    /// Hold the byte back; it extends a candidate delimiter
    Stage,
    /// The candidate delimiter broke: commit the staged bytes as content,
    /// then treat the byte as the followup says
    Release(Followup),
    /// Append the byte to the header block
    Header,
    /// The byte completed the part delimiter inside a body: the staged bytes
    /// and this byte are the delimiter; close the open part
    ClosePart,
    /// The byte completed a part delimiter outside a body; headers follow
    OpenHeaders,
    /// The byte completed the terminal delimiter: commit anything staged,
    /// close the open part if any, and stop
    Finish,
}

/// Position of the decoder: state plus progress of both matchers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    state: DecoderState,
    part: BoundaryMatcher,
    terminal: BoundaryMatcher,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    /// Start of a body. The part matcher is primed past the leading CRLF,
    /// since a delimiter at offset zero has no line break before it.
    pub fn new() -> Self {
        Self {
            state: DecoderState::SeekingPartBoundary,
            part: BoundaryMatcher::primed(2),
            terminal: BoundaryMatcher::default(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Progress of the part-delimiter match
    pub fn part_progress(&self) -> usize {
        self.part.progress()
    }

    /// Transition out of `ReadingHeaders` once the header block is parsed.
    pub fn headers_complete(mut self, is_file: bool) -> Self {
        debug_assert_eq!(self.state, DecoderState::ReadingHeaders);
        self.part.reset();
        self.state = if is_file {
            DecoderState::ReadingBody
        } else {
            DecoderState::SkippingPart
        };
        self
    }

    /// Give up on the current part-delimiter candidate, e.g. after a forced
    /// staging flush.
    pub fn abandon_match(mut self) -> Self {
        self.part.reset();
        self
    }

    /// Advance by one byte.
    pub fn step(self, delimiters: &DelimiterSet, byte: u8) -> (Self, Effect) {
        let mut next = self;
        if next.state == DecoderState::Done {
            return (next, Effect::Discard);
        }

        // The terminal delimiter is watched in every state and wins ties.
        let (terminal, _) = next.terminal.advance_retesting(delimiters.terminal(), byte);
        if terminal == MatchEvent::Complete {
            next.part.reset();
            next.state = DecoderState::Done;
            return (next, Effect::Finish);
        }

        let effect = match next.state {
            DecoderState::SeekingPartBoundary | DecoderState::SkippingPart => {
                match next.part.advance_retesting(delimiters.part(), byte) {
                    (MatchEvent::Complete, _) => {
                        next.state = DecoderState::ReadingHeaders;
                        Effect::OpenHeaders
                    }
                    _ => Effect::Discard,
                }
            }
            DecoderState::ReadingHeaders => Effect::Header,
            DecoderState::ReadingBody => {
                match next.part.advance_retesting(delimiters.part(), byte) {
                    (MatchEvent::Advanced, _) => Effect::Stage,
                    (MatchEvent::Complete, _) => {
                        next.state = DecoderState::ReadingHeaders;
                        Effect::ClosePart
                    }
                    (MatchEvent::Broken(0), _) => Effect::Content,
                    (MatchEvent::Broken(_), true) => Effect::Release(Followup::Stage),
                    (MatchEvent::Broken(_), false) => Effect::Release(Followup::Content),
                }
            }
            DecoderState::Done => Effect::Discard,
        };

        (next, effect)
    }
}
