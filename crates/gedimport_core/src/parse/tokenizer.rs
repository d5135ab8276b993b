//! Physical line tokenizer.
//!
//! # Invariants
//! - Reads one line at a time; holds at most one unfinished token.
//! - A malformed line never aborts the stream.
//! - `CONT` joins with `\n`, `CONC` joins with no separator.
//! - Lines end at `\n`, `\r\n` or a lone `\r`.

use crate::parse::{snippet, ParseError, ParseIssue, ParseIssueKind, ParseResult, Parsed};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{BufRead, ErrorKind};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s+(?:@([^@\s]+)@\s+)?([A-Za-z0-9_]+)(?:\s(.*))?$")
        .expect("valid gedcom line regex")
});

/// One logical line after continuation folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    pub level: u32,
    /// Cross-reference identifier with the `@` markers removed.
    pub xref: Option<String>,
    /// Uppercased tag.
    pub tag: String,
    pub value: String,
    /// 1-based line of the first physical line of this token.
    pub line: usize,
}

enum LineContent {
    Token(RawToken),
    Continue { value: String, separator: &'static str },
}

/// Lazy tokenizer over a buffered reader.
pub struct Tokenizer<R> {
    reader: R,
    buffer: Vec<u8>,
    line_number: usize,
    bytes_read: u64,
    pending: Option<RawToken>,
    exhausted: bool,
    failed: bool,
}

impl<R: BufRead> Tokenizer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(256),
            line_number: 0,
            bytes_read: 0,
            pending: None,
            exhausted: false,
            failed: false,
        }
    }

    /// Bytes consumed from the reader so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Physical lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line_number
    }

    /// Reads the next non-blank physical line.
    fn read_line(&mut self) -> ParseResult<Option<Result<LineContent, ParseIssue>>> {
        loop {
            self.buffer.clear();
            let read = read_physical_line(&mut self.reader, &mut self.buffer)
                .map_err(|source| ParseError::Io {
                    line: self.line_number,
                    source,
                })?;
            if read == 0 {
                return Ok(None);
            }
            self.bytes_read += read as u64;
            self.line_number += 1;

            let mut bytes = self.buffer.as_slice();
            if self.line_number == 1 {
                bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            }
            while let Some((last, rest)) = bytes.split_last() {
                if *last == b'\n' || *last == b'\r' {
                    bytes = rest;
                } else {
                    break;
                }
            }

            let Ok(text) = std::str::from_utf8(bytes) else {
                return Ok(Some(Err(ParseIssue {
                    line: self.line_number,
                    kind: ParseIssueKind::InvalidUtf8,
                })));
            };
            if text.trim().is_empty() {
                continue;
            }

            return Ok(Some(parse_line(text, self.line_number)));
        }
    }
}

/// Appends one physical line, terminator included, to `buffer`.
fn read_physical_line<R: BufRead>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
) -> std::io::Result<usize> {
    let mut read = 0;
    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if available.is_empty() {
            return Ok(read);
        }
        if buffer.last() == Some(&b'\r') {
            if available[0] == b'\n' {
                buffer.push(b'\n');
                reader.consume(1);
                read += 1;
            }
            return Ok(read);
        }

        match available.iter().position(|byte| *byte == b'\n' || *byte == b'\r') {
            Some(end) => {
                let lone_cr_candidate = available[end] == b'\r';
                buffer.extend_from_slice(&available[..=end]);
                reader.consume(end + 1);
                read += end + 1;
                if !lone_cr_candidate {
                    return Ok(read);
                }
            }
            None => {
                let len = available.len();
                buffer.extend_from_slice(available);
                reader.consume(len);
                read += len;
            }
        }
    }
}

fn parse_line(text: &str, line: usize) -> Result<LineContent, ParseIssue> {
    let malformed = || ParseIssue {
        line,
        kind: ParseIssueKind::MalformedLine {
            snippet: snippet(text),
        },
    };

    let caps = LINE_RE.captures(text).ok_or_else(malformed)?;
    let level: u32 = caps[1].parse().map_err(|_| malformed())?;
    let tag = caps[3].to_ascii_uppercase();
    let value = caps.get(4).map_or("", |m| m.as_str()).to_string();

    match tag.as_str() {
        "CONT" => Ok(LineContent::Continue {
            value,
            separator: "\n",
        }),
        "CONC" => Ok(LineContent::Continue {
            value,
            separator: "",
        }),
        _ => Ok(LineContent::Token(RawToken {
            level,
            xref: caps.get(2).map(|m| m.as_str().to_string()),
            tag,
            value,
            line,
        })),
    }
}

impl<R: BufRead> Iterator for Tokenizer<R> {
    type Item = ParseResult<Parsed<RawToken>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if self.exhausted {
                return self.pending.take().map(|token| Ok(Parsed::Item(token)));
            }

            let content = match self.read_line() {
                Ok(Some(content)) => content,
                Ok(None) => {
                    self.exhausted = true;
                    continue;
                }
                Err(err) => {
                    self.failed = true;
                    self.pending = None;
                    return Some(Err(err));
                }
            };

            match content {
                Err(issue) => return Some(Ok(Parsed::Issue(issue))),
                Ok(LineContent::Continue { value, separator }) => match self.pending.as_mut() {
                    Some(token) => {
                        token.value.push_str(separator);
                        token.value.push_str(&value);
                    }
                    None => {
                        return Some(Ok(Parsed::Issue(ParseIssue {
                            line: self.line_number,
                            kind: ParseIssueKind::OrphanContinuation,
                        })));
                    }
                },
                Ok(LineContent::Token(token)) => {
                    if let Some(previous) = self.pending.replace(token) {
                        return Some(Ok(Parsed::Item(previous)));
                    }
                }
            }
        }
    }
}
