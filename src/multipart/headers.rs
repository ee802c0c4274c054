//! Part header accumulation and `Content-Disposition` parsing

use super::MultipartError;
use percent_encoding::percent_decode_str;

/// Default cap on one part's header block (64 KiB)
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Collects the bytes of one part's header block.
///
/// The block starts right after a part delimiter, so it begins with the
/// delimiter's own line break, and ends at the first CRLFCRLF.
#[derive(Debug)]
pub struct HeaderAccumulator {
    buf: Vec<u8>,
    limit: usize,
}

impl HeaderAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(512),
            limit,
        }
    }

    /// Append one byte; returns the parsed header once the block is complete.
    pub fn push(&mut self, byte: u8) -> Result<Option<PartHeader>, MultipartError> {
        if self.buf.len() >= self.limit {
            return Err(MultipartError::HeadersTooLarge(self.limit));
        }
        self.buf.push(byte);

        if self.buf.ends_with(HEADER_TERMINATOR) {
            let block_len = self.buf.len() - HEADER_TERMINATOR.len();
            let header = PartHeader::parse(&self.buf[..block_len]);
            self.buf.clear();
            return Ok(Some(header));
        }
        Ok(None)
    }

    /// True when nothing but whitespace has been collected
    pub fn is_blank(&self) -> bool {
        self.buf.iter().all(u8::is_ascii_whitespace)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Header fields of one part, names lowercased
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeader {
    fields: Vec<(String, String)>,
}

impl PartHeader {
    /// Parse a raw header block (without the blank-line terminator).
    pub fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let fields = text
            .split("\r\n")
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_ascii_lowercase(), value.trim().to_string()))
            })
            .collect();
        Self { fields }
    }

    /// First value of a header, case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_disposition(&self) -> Option<ContentDisposition> {
        self.get("content-disposition").map(ContentDisposition::parse)
    }

    /// Decoded filename of a file part; `None` for plain form fields.
    pub fn filename(&self) -> Option<String> {
        self.content_disposition()
            .and_then(|cd| cd.filename)
            .filter(|name| !name.is_empty())
    }
}

/// Parsed `Content-Disposition` value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition_type: String,
    pub name: Option<String>,
    /// Filename with quotes removed and percent-decoding applied once
    pub filename: Option<String>,
}

impl ContentDisposition {
    pub fn parse(value: &str) -> Self {
        let mut params = split_params(value).into_iter();
        let disposition_type = params
            .next()
            .map(|t| t.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let mut name = None;
        let mut plain_filename = None;
        let mut extended_filename = None;

        for param in params {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let raw = raw.trim();
            match key.as_str() {
                "name" => name = Some(unquote(raw).to_string()),
                "filename" => plain_filename = Some(percent_decode(unquote(raw))),
                "filename*" => extended_filename = decode_ext_value(unquote(raw)),
                _ => {}
            }
        }

        Self {
            disposition_type,
            name,
            filename: extended_filename.or(plain_filename),
        }
    }
}

/// Split on `;` outside quoted strings
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

// Backslashes are left alone: legacy clients send full Windows paths
// unescaped, and the sanitizer needs them to find the last segment.
fn unquote(raw: &str) -> &str {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

fn percent_decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// RFC 5987 `charset'language'value`
fn decode_ext_value(raw: &str) -> Option<String> {
    let mut pieces = raw.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    Some(percent_decode(encoded))
}
