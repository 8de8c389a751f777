//! Index-addressed byte scanner.
//!
//! [`ByteScanner`] is a stateless view over an immutable byte buffer. Every
//! operation takes a start index and returns either a result located by
//! absolute indices or `None` when the construct is not present. Nothing is
//! copied unless an operation explicitly returns owned bytes.
//!
//! # PDF Syntax Overview
//!
//! - Whitespace: NUL, TAB, LF, FF, CR, SPACE
//! - Delimiters: `( ) < > [ ] { } / %`
//! - Regular characters: everything else
//! - Comments run from `%` to the next end-of-line marker (not included)
//!
//! Bounds are inclusive on both ends: a construct occupying bytes 4..=9 is
//! reported as `start: 4, end: 9`. Content bounds exclude delimiters and may
//! be empty, in which case `content_end < content_start`.

use nom::{
    IResult,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit0, digit1},
    combinator::{opt, recognize},
    sequence::{pair, preceded, tuple},
};

/// Check for a PDF whitespace byte.
#[inline]
pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

/// Check for a PDF delimiter byte.
#[inline]
pub fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Check for a regular byte: neither whitespace nor a delimiter.
#[inline]
pub fn is_regular_char(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

#[inline]
fn is_eol(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Location of a syntactic construct within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserBounds {
    /// Index of the first byte of the construct
    pub start: usize,
    /// Index of the last byte of the construct
    pub end: usize,
    /// Index of the first content byte (delimiters excluded)
    pub content_start: Option<usize>,
    /// Index of the last content byte (delimiters excluded)
    pub content_end: Option<usize>,
}

impl ParserBounds {
    /// Bounds without a content range.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            content_start: None,
            content_end: None,
        }
    }

    /// Bounds with a content range.
    pub fn with_content(start: usize, end: usize, content_start: usize, content_end: usize) -> Self {
        Self {
            start,
            end,
            content_start: Some(content_start),
            content_end: Some(content_end),
        }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    /// Always false; bounds cover at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Content range, falling back to the whole construct.
    pub fn content(&self) -> (usize, usize) {
        (
            self.content_start.unwrap_or(self.start),
            self.content_end.unwrap_or(self.end),
        )
    }

    /// True when the content range holds no bytes.
    pub fn is_content_empty(&self) -> bool {
        let (start, end) = self.content();
        end < start
    }
}

/// A primitive value together with the indices it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult<T> {
    /// Parsed value
    pub value: T,
    /// Index of the first byte
    pub start: usize,
    /// Index of the last byte
    pub end: usize,
}

impl<T> ParseResult<T> {
    fn new(value: T, start: usize, end: usize) -> Self {
        Self { value, start, end }
    }

    /// Map the value while keeping the location.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<U> {
        ParseResult {
            value: f(self.value),
            start: self.start,
            end: self.end,
        }
    }
}

/// Kind of the value starting at an index, from a one-token lookahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// Integer or real
    Number,
    /// `( ... )`
    StringLiteral,
    /// `< ... >`
    StringHex,
    /// `/Name`
    Name,
    /// `[ ... ]`
    Array,
    /// `<< ... >>`
    Dictionary,
    /// `<< ... >> stream ... endstream`
    Stream,
    /// `id gen R`
    Ref,
    /// `% ...`
    Comment,
    /// Anything else (keywords, garbage)
    Unknown,
}

/// Search direction for the `find_*` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDirection {
    /// Towards the end of the buffer
    #[default]
    Forward,
    /// Towards the start of the buffer
    Backward,
}

/// Options for [`ByteScanner::find_subarray_index`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Search direction
    pub direction: SearchDirection,
    /// Lowest index a match may start at
    pub min_index: usize,
    /// Highest index a match may end at (defaults to the last byte)
    pub max_index: Option<usize>,
    /// Require the match to be delimited by non-regular bytes or buffer edges
    pub closed_only: bool,
}

impl SearchOptions {
    /// Forward search for a keyword starting at `min_index`.
    pub fn keyword_from(min_index: usize) -> Self {
        Self {
            min_index,
            closed_only: true,
            ..Self::default()
        }
    }
}

fn nom_integer(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(pair(opt(char('-')), digit1))(input)
}

fn nom_real(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(tuple((opt(char('-')), digit0, opt(pair(char('.'), digit0)))))(input)
}

fn nom_name(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('/'), take_while(is_regular_char))(input)
}

fn nom_keyword(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_regular_char)(input)
}

/// Map raw bytes to a string one char per byte (Latin-1), lossless.
pub(crate) fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Stateless scanner over a borrowed buffer.
#[derive(Debug, Clone, Copy)]
pub struct ByteScanner<'a> {
    data: &'a [u8],
}

impl<'a> ByteScanner<'a> {
    /// Wrap a buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Buffer length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Index of the last byte (0 for an empty buffer).
    pub fn max_index(&self) -> usize {
        self.data.len().saturating_sub(1)
    }

    /// Byte at `index`, if any.
    #[inline]
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Bytes `start..=end`, clamped to the buffer.
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        if start >= self.data.len() || end < start {
            return &[];
        }
        &self.data[start..=end.min(self.max_index())]
    }

    fn starts_with_at(&self, index: usize, needle: &[u8]) -> bool {
        self.data.get(index..).is_some_and(|rest| rest.starts_with(needle))
    }

    fn is_closed_match(&self, start: usize, len: usize) -> bool {
        let before_ok = start == 0 || !is_regular_char(self.data[start - 1]);
        let after_ok = self.byte_at(start + len).map_or(true, |b| !is_regular_char(b));
        before_ok && after_ok
    }

    /// Find `needle` within the configured range.
    pub fn find_subarray_index(&self, needle: &[u8], options: SearchOptions) -> Option<ParserBounds> {
        if needle.is_empty() || self.data.is_empty() {
            return None;
        }
        let max = options.max_index.map_or(self.max_index(), |m| m.min(self.max_index()));
        let min = options.min_index;
        if min > max || max - min + 1 < needle.len() {
            return None;
        }
        let last_start = max + 1 - needle.len();
        let matches_at = |start: usize| {
            &self.data[start..start + needle.len()] == needle
                && (!options.closed_only || self.is_closed_match(start, needle.len()))
        };
        let found = match options.direction {
            SearchDirection::Forward => (min..=last_start).find(|&s| matches_at(s)),
            SearchDirection::Backward => (min..=last_start).rev().find(|&s| matches_at(s)),
        };
        found.map(|start| ParserBounds::new(start, start + needle.len() - 1))
    }

    fn find_index(
        &self,
        direction: SearchDirection,
        start: usize,
        predicate: impl Fn(u8) -> bool,
    ) -> Option<usize> {
        match direction {
            SearchDirection::Forward => {
                (start..self.data.len()).find(|&i| predicate(self.data[i]))
            },
            SearchDirection::Backward => {
                if self.data.is_empty() {
                    return None;
                }
                (0..=start.min(self.max_index())).rev().find(|&i| predicate(self.data[i]))
            },
        }
    }

    /// Index of the nearest occurrence of `ch`.
    pub fn find_char_index(&self, ch: u8, direction: SearchDirection, start: usize) -> Option<usize> {
        self.find_index(direction, start, |b| b == ch)
    }

    /// Line-break navigation.
    ///
    /// Forward: the index of the first byte after the next EOL marker (CR, LF
    /// or CRLF). Backward: the index of the last byte before the previous EOL
    /// marker. `None` when there is no such byte.
    pub fn find_new_line_index(&self, direction: SearchDirection, start: usize) -> Option<usize> {
        match direction {
            SearchDirection::Forward => {
                let mut i = self.find_index(direction, start, is_eol)?;
                if self.data[i] == b'\r' && self.byte_at(i + 1) == Some(b'\n') {
                    i += 1;
                }
                (i + 1 < self.data.len()).then_some(i + 1)
            },
            SearchDirection::Backward => {
                let mut i = self.find_index(direction, start, is_eol)?;
                if self.data[i] == b'\n' && i > 0 && self.data[i - 1] == b'\r' {
                    i -= 1;
                }
                i.checked_sub(1)
            },
        }
    }

    /// Index of the nearest whitespace byte.
    pub fn find_space_index(&self, direction: SearchDirection, start: usize) -> Option<usize> {
        self.find_index(direction, start, is_whitespace)
    }

    /// Index of the nearest non-whitespace byte.
    pub fn find_non_space_index(&self, direction: SearchDirection, start: usize) -> Option<usize> {
        self.find_index(direction, start, |b| !is_whitespace(b))
    }

    /// Index of the nearest delimiter byte.
    pub fn find_delimiter_index(&self, direction: SearchDirection, start: usize) -> Option<usize> {
        self.find_index(direction, start, is_delimiter)
    }

    /// Index of the nearest non-delimiter byte.
    pub fn find_non_delimiter_index(
        &self,
        direction: SearchDirection,
        start: usize,
    ) -> Option<usize> {
        self.find_index(direction, start, |b| !is_delimiter(b))
    }

    /// Index of the nearest regular byte.
    pub fn find_regular_index(&self, direction: SearchDirection, start: usize) -> Option<usize> {
        self.find_index(direction, start, is_regular_char)
    }

    /// Index of the nearest whitespace or delimiter byte.
    pub fn find_irregular_index(&self, direction: SearchDirection, start: usize) -> Option<usize> {
        self.find_index(direction, start, |b| !is_regular_char(b))
    }

    /// Skip whitespace and comments.
    ///
    /// Returns the first index at or after `start` holding neither, or `None`
    /// at the end of the buffer.
    pub fn skip_empty(&self, start: usize) -> Option<usize> {
        let mut i = start;
        loop {
            let byte = self.byte_at(i)?;
            if is_whitespace(byte) {
                i += 1;
            } else if byte == b'%' {
                i = self.find_new_line_index(SearchDirection::Forward, i)?;
            } else {
                return Some(i);
            }
        }
    }

    fn resolve_start(&self, start: usize, skip_empty: bool) -> Option<usize> {
        if skip_empty {
            self.skip_empty(start)
        } else {
            (start < self.data.len()).then_some(start)
        }
    }

    /// Bounds of a literal string `( ... )`.
    ///
    /// Nested parentheses are balanced; a backslash escapes the next byte, so
    /// `\(` and `\)` never change the depth.
    pub fn get_literal_bounds_at(&self, start: usize, skip_empty: bool) -> Option<ParserBounds> {
        let start = self.resolve_start(start, skip_empty)?;
        if self.data[start] != b'(' {
            return None;
        }
        let mut depth = 0usize;
        let mut i = start;
        while i < self.data.len() {
            match self.data[i] {
                b'\\' => {
                    i += 2;
                    continue;
                },
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(ParserBounds::with_content(start, i, start + 1, i - 1));
                    }
                },
                _ => {},
            }
            i += 1;
        }
        None
    }

    /// Bounds of a hex string `< ... >` (never a dictionary opener).
    pub fn get_hex_bounds_at(&self, start: usize, skip_empty: bool) -> Option<ParserBounds> {
        let start = self.resolve_start(start, skip_empty)?;
        if self.data[start] != b'<' || self.byte_at(start + 1) == Some(b'<') {
            return None;
        }
        let end = self.find_char_index(b'>', SearchDirection::Forward, start + 1)?;
        Some(ParserBounds::with_content(start, end, start + 1, end - 1))
    }

    /// Bounds of a dictionary `<< ... >>`, nested structures included.
    pub fn get_dict_bounds_at(&self, start: usize, skip_empty: bool) -> Option<ParserBounds> {
        let start = self.resolve_start(start, skip_empty)?;
        if !self.starts_with_at(start, b"<<") {
            return None;
        }
        let mut depth = 0usize;
        let mut i = start;
        while i < self.data.len() {
            let next = self.byte_at(i + 1);
            match self.data[i] {
                b'<' if next == Some(b'<') => {
                    depth += 1;
                    i += 2;
                },
                b'<' => i = self.get_hex_bounds_at(i, false)?.end + 1,
                b'>' if next == Some(b'>') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(ParserBounds::with_content(start, i + 1, start + 2, i - 1));
                    }
                    i += 2;
                },
                b'(' => i = self.get_literal_bounds_at(i, false)?.end + 1,
                b'%' => i = self.find_new_line_index(SearchDirection::Forward, i)?,
                _ => i += 1,
            }
        }
        None
    }

    /// Bounds of an array `[ ... ]`, nested structures included.
    pub fn get_array_bounds_at(&self, start: usize, skip_empty: bool) -> Option<ParserBounds> {
        let start = self.resolve_start(start, skip_empty)?;
        if self.data[start] != b'[' {
            return None;
        }
        let mut depth = 0usize;
        let mut i = start;
        while i < self.data.len() {
            match self.data[i] {
                b'[' => {
                    depth += 1;
                    i += 1;
                },
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(ParserBounds::with_content(start, i, start + 1, i - 1));
                    }
                    i += 1;
                },
                b'(' => i = self.get_literal_bounds_at(i, false)?.end + 1,
                b'<' if self.byte_at(i + 1) == Some(b'<') => {
                    i = self.get_dict_bounds_at(i, false)?.end + 1
                },
                b'<' => i = self.get_hex_bounds_at(i, false)?.end + 1,
                b'%' => i = self.find_new_line_index(SearchDirection::Forward, i)?,
                _ => i += 1,
            }
        }
        None
    }

    /// Bounds of an indirect object `id gen obj ... endobj`.
    ///
    /// The content range covers the object body without surrounding
    /// whitespace. When the body is a stream, `endobj` is searched after
    /// `endstream` so payload bytes cannot end the object early.
    pub fn get_indirect_object_bounds_at(
        &self,
        start: usize,
        skip_empty: bool,
    ) -> Option<ParserBounds> {
        let start = self.resolve_start(start, skip_empty)?;
        let id = self.parse_integer_at(start, false)?;
        let generation = self.parse_integer_at(id.end + 1, true)?;
        let keyword_start = self.skip_empty(generation.end + 1)?;
        if !self.starts_with_at(keyword_start, b"obj")
            || !self.is_closed_match(keyword_start, 3)
        {
            return None;
        }
        let content_start = self.skip_empty(keyword_start + 3)?;

        let mut search_from = content_start;
        if let Some(dict) = self.get_dict_bounds_at(content_start, false) {
            if let Some(after) = self.skip_empty(dict.end + 1) {
                if self.starts_with_at(after, b"stream") {
                    let endstream = self
                        .find_subarray_index(b"endstream", SearchOptions::keyword_from(after + 6))?;
                    search_from = endstream.end + 1;
                }
            }
        }

        let endobj = self.find_subarray_index(b"endobj", SearchOptions::keyword_from(search_from))?;
        let content_end = self
            .find_non_space_index(SearchDirection::Backward, endobj.start.checked_sub(1)?)
            .filter(|&i| i >= content_start)?;
        Some(ParserBounds::with_content(start, endobj.end, content_start, content_end))
    }

    /// Bounds of a classic xref table: from `xref` up to (not including) `trailer`.
    pub fn get_xref_table_bounds_at(&self, start: usize, skip_empty: bool) -> Option<ParserBounds> {
        let start = self.resolve_start(start, skip_empty)?;
        if !self.starts_with_at(start, b"xref") || !self.is_closed_match(start, 4) {
            return None;
        }
        let trailer = self.find_subarray_index(b"trailer", SearchOptions::keyword_from(start + 4))?;
        let content_start = self.skip_empty(start + 4).unwrap_or(trailer.start);
        let content_end = self
            .find_non_space_index(SearchDirection::Backward, trailer.start - 1)
            .unwrap_or(start + 3);
        Some(ParserBounds::with_content(start, trailer.start - 1, content_start, content_end))
    }

    fn looks_like_ref(&self, start: usize) -> bool {
        let Some(id) = self.parse_integer_at(start, false) else {
            return false;
        };
        if id.value < 0 {
            return false;
        }
        let Some(generation) = self.parse_integer_at(id.end + 1, true) else {
            return false;
        };
        if generation.value < 0 {
            return false;
        }
        match self.skip_empty(generation.end + 1) {
            Some(r) => self.data[r] == b'R' && self.is_closed_match(r, 1),
            None => false,
        }
    }

    /// Classify the value starting at `start`.
    pub fn get_value_type_at(&self, start: usize, skip_empty: bool) -> ValueType {
        let Some(i) = self.resolve_start(start, skip_empty) else {
            return ValueType::Unknown;
        };
        match self.data[i] {
            b'/' => ValueType::Name,
            b'[' => ValueType::Array,
            b'(' => ValueType::StringLiteral,
            b'%' => ValueType::Comment,
            b'<' if self.byte_at(i + 1) == Some(b'<') => {
                let is_stream = self
                    .get_dict_bounds_at(i, false)
                    .and_then(|dict| self.skip_empty(dict.end + 1))
                    .is_some_and(|after| {
                        self.starts_with_at(after, b"stream") && self.is_closed_match(after, 6)
                    });
                if is_stream {
                    ValueType::Stream
                } else {
                    ValueType::Dictionary
                }
            },
            b'<' => ValueType::StringHex,
            b'0'..=b'9' => {
                if self.looks_like_ref(i) {
                    ValueType::Ref
                } else {
                    ValueType::Number
                }
            },
            b'-' | b'.' => ValueType::Number,
            b't' | b'f' if self.parse_bool_at(i, false).is_some() => ValueType::Boolean,
            b'n' if self.starts_with_at(i, b"null") && self.is_closed_match(i, 4) => {
                ValueType::Null
            },
            _ => ValueType::Unknown,
        }
    }

    /// Index just past the value starting at (or after) `start`.
    pub fn skip_value_at(&self, start: usize) -> Option<usize> {
        let i = self.skip_empty(start)?;
        let end = match self.get_value_type_at(i, false) {
            ValueType::Dictionary | ValueType::Stream => self.get_dict_bounds_at(i, false)?.end,
            ValueType::Array => self.get_array_bounds_at(i, false)?.end,
            ValueType::StringLiteral => self.get_literal_bounds_at(i, false)?.end,
            ValueType::StringHex => self.get_hex_bounds_at(i, false)?.end,
            ValueType::Name => self.parse_name_at(i, false)?.end,
            ValueType::Ref => {
                let id = self.parse_integer_at(i, false)?;
                let generation = self.parse_integer_at(id.end + 1, true)?;
                self.skip_empty(generation.end + 1)?
            },
            ValueType::Number => self.parse_number_at(i, true, false)?.end,
            ValueType::Boolean => self.parse_bool_at(i, false)?.end,
            ValueType::Null => i + 3,
            ValueType::Comment => {
                return Some(self.find_new_line_index(SearchDirection::Forward, i).unwrap_or(self.len()))
            },
            ValueType::Unknown => {
                return Some(
                    self.find_irregular_index(SearchDirection::Forward, i + 1)
                        .unwrap_or(self.len()),
                )
            },
        };
        Some(end + 1)
    }

    /// Advance to the next property name inside a dictionary body.
    ///
    /// Values found on the way (dictionaries, arrays, strings, comments) are
    /// skipped whole, so names nested inside them are never returned. Returns
    /// the index of the next `/`, or `None` when `max` is passed.
    pub fn skip_to_next_name(&self, start: usize, max: usize) -> Option<usize> {
        if self.data.is_empty() {
            return None;
        }
        let max = max.min(self.max_index());
        let mut i = start;
        while i <= max {
            match self.data[i] {
                b'/' => return Some(i),
                b'%' => i = self.find_new_line_index(SearchDirection::Forward, i)?,
                b'(' => i = self.get_literal_bounds_at(i, false)?.end + 1,
                b'[' => i = self.get_array_bounds_at(i, false)?.end + 1,
                b'<' if self.byte_at(i + 1) == Some(b'<') => {
                    i = self.get_dict_bounds_at(i, false)?.end + 1
                },
                b'<' => i = self.get_hex_bounds_at(i, false)?.end + 1,
                _ => i += 1,
            }
        }
        None
    }

    /// Parse a number: optional `-`, digits and, if `float`, one `.`.
    ///
    /// `5.` reads as 5.0 and `.5` as 0.5. At least one digit is required.
    pub fn parse_number_at(
        &self,
        start: usize,
        float: bool,
        skip_empty: bool,
    ) -> Option<ParseResult<f64>> {
        let start = self.resolve_start(start, skip_empty)?;
        let input = &self.data[start..];
        let (_, matched) = if float {
            nom_real(input).ok()?
        } else {
            nom_integer(input).ok()?
        };
        if !matched.iter().any(u8::is_ascii_digit) {
            return None;
        }
        let text = std::str::from_utf8(matched).ok()?;
        let value: f64 = text.parse().ok()?;
        Some(ParseResult::new(value, start, start + matched.len() - 1))
    }

    /// Parse an integer (optional `-` and digits).
    pub fn parse_integer_at(&self, start: usize, skip_empty: bool) -> Option<ParseResult<i64>> {
        let start = self.resolve_start(start, skip_empty)?;
        let (_, matched) = nom_integer(&self.data[start..]).ok()?;
        let text = std::str::from_utf8(matched).ok()?;
        let value: i64 = text.parse().ok()?;
        Some(ParseResult::new(value, start, start + matched.len() - 1))
    }

    /// Parse a name, keeping the leading `/` and any `#xx` escapes as written.
    pub fn parse_name_at(&self, start: usize, skip_empty: bool) -> Option<ParseResult<String>> {
        let start = self.resolve_start(start, skip_empty)?;
        let (_, body) = nom_name(&self.data[start..]).ok()?;
        let mut value = String::with_capacity(body.len() + 1);
        value.push('/');
        value.push_str(&latin1_to_string(body));
        Some(ParseResult::new(value, start, start + body.len()))
    }

    /// Parse a bare keyword made of regular bytes (e.g. `obj`, `R`, `n`).
    pub fn parse_string_at(&self, start: usize, skip_empty: bool) -> Option<ParseResult<String>> {
        let start = self.resolve_start(start, skip_empty)?;
        let (_, word) = nom_keyword(&self.data[start..]).ok()?;
        Some(ParseResult::new(latin1_to_string(word), start, start + word.len() - 1))
    }

    /// Parse `true` or `false`.
    pub fn parse_bool_at(&self, start: usize, skip_empty: bool) -> Option<ParseResult<bool>> {
        let start = self.resolve_start(start, skip_empty)?;
        if self.starts_with_at(start, b"true") && self.is_closed_match(start, 4) {
            Some(ParseResult::new(true, start, start + 3))
        } else if self.starts_with_at(start, b"false") && self.is_closed_match(start, 5) {
            Some(ParseResult::new(false, start, start + 4))
        } else {
            None
        }
    }

    /// Raw content of a literal string; escapes are left unresolved.
    pub fn parse_literal_at(&self, start: usize, skip_empty: bool) -> Option<ParseResult<Vec<u8>>> {
        let bounds = self.get_literal_bounds_at(start, skip_empty)?;
        let (cs, ce) = bounds.content();
        Some(ParseResult::new(self.slice(cs, ce).to_vec(), bounds.start, bounds.end))
    }

    /// Decoded bytes of a hex string. Whitespace is ignored; an odd digit
    /// count is padded with a trailing zero nibble.
    pub fn parse_hex_at(&self, start: usize, skip_empty: bool) -> Option<ParseResult<Vec<u8>>> {
        let bounds = self.get_hex_bounds_at(start, skip_empty)?;
        let (cs, ce) = bounds.content();
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        for &byte in self.slice(cs, ce) {
            if is_whitespace(byte) {
                continue;
            }
            let nibble = (byte as char).to_digit(16)? as u8;
            match high.take() {
                Some(h) => out.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        Some(ParseResult::new(out, bounds.start, bounds.end))
    }

    /// Parse an array made only of numbers.
    pub fn parse_number_array_at(
        &self,
        start: usize,
        float: bool,
        skip_empty: bool,
    ) -> Option<ParseResult<Vec<f64>>> {
        let bounds = self.get_array_bounds_at(start, skip_empty)?;
        let (cs, ce) = bounds.content();
        let mut values = Vec::new();
        let mut i = cs;
        while let Some(next) = self.skip_empty(i).filter(|&n| n <= ce) {
            let number = self.parse_number_at(next, float, false)?;
            values.push(number.value);
            i = number.end + 1;
        }
        Some(ParseResult::new(values, bounds.start, bounds.end))
    }

    /// Parse an array made only of names.
    pub fn parse_name_array_at(
        &self,
        start: usize,
        skip_empty: bool,
    ) -> Option<ParseResult<Vec<String>>> {
        let bounds = self.get_array_bounds_at(start, skip_empty)?;
        let (cs, ce) = bounds.content();
        let mut values = Vec::new();
        let mut i = cs;
        while let Some(next) = self.skip_empty(i).filter(|&n| n <= ce) {
            let name = self.parse_name_at(next, false)?;
            i = name.end + 1;
            values.push(name.value);
        }
        Some(ParseResult::new(values, bounds.start, bounds.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(data: &[u8]) -> ByteScanner<'_> {
        ByteScanner::new(data)
    }

    // ========================================================================
    // Classification and navigation
    // ========================================================================

    #[test]
    fn test_char_classes() {
        assert!(is_whitespace(b' '));
        assert!(is_whitespace(0x00));
        assert!(is_delimiter(b'%'));
        assert!(is_regular_char(b'a'));
        assert!(!is_regular_char(b'{'));
    }

    #[test]
    fn test_skip_empty_whitespace_and_comments() {
        let data = b"  % comment\r\n  \t/Name";
        assert_eq!(scanner(data).skip_empty(0), Some(16));
    }

    #[test]
    fn test_skip_empty_end_of_buffer() {
        assert_eq!(scanner(b"   ").skip_empty(0), None);
        assert_eq!(scanner(b"  %tail").skip_empty(0), None);
        assert_eq!(scanner(b"").skip_empty(0), None);
    }

    #[test]
    fn test_find_subarray_forward_and_backward() {
        let s = scanner(b"obj a obj b");
        let fwd = s.find_subarray_index(b"obj", SearchOptions::default()).unwrap();
        assert_eq!((fwd.start, fwd.end), (0, 2));
        let back = s
            .find_subarray_index(
                b"obj",
                SearchOptions {
                    direction: SearchDirection::Backward,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(back.start, 6);
    }

    #[test]
    fn test_find_subarray_closed_only() {
        let s = scanner(b"startxref xref");
        let hit = s.find_subarray_index(b"xref", SearchOptions::keyword_from(0)).unwrap();
        assert_eq!(hit.start, 10);
    }

    #[test]
    fn test_find_new_line_index() {
        let s = scanner(b"ab\r\ncd\ref");
        assert_eq!(s.find_new_line_index(SearchDirection::Forward, 0), Some(4));
        assert_eq!(s.find_new_line_index(SearchDirection::Forward, 4), Some(7));
        assert_eq!(s.find_new_line_index(SearchDirection::Backward, 5), Some(1));
    }

    #[test]
    fn test_find_space_and_regular() {
        let s = scanner(b"abc def/");
        assert_eq!(s.find_space_index(SearchDirection::Forward, 0), Some(3));
        assert_eq!(s.find_non_space_index(SearchDirection::Forward, 3), Some(4));
        assert_eq!(s.find_delimiter_index(SearchDirection::Forward, 0), Some(7));
        assert_eq!(s.find_irregular_index(SearchDirection::Forward, 4), Some(7));
        assert_eq!(s.find_regular_index(SearchDirection::Backward, 3), Some(2));
    }

    // ========================================================================
    // Bounds
    // ========================================================================

    #[test]
    fn test_dict_bounds_with_escaped_paren() {
        let data = b"<< /A (has \\) paren) /B << >> >>";
        let bounds = scanner(data).get_dict_bounds_at(0, false).unwrap();
        assert_eq!(bounds.start, 0);
        assert_eq!(bounds.end, data.len() - 1);
        assert_eq!(bounds.content_start, Some(2));
        assert_eq!(bounds.content_end, Some(data.len() - 3));
    }

    #[test]
    fn test_dict_bounds_ignores_hex_strings_and_string_brackets() {
        let data = b"<</A <414243> /B (>>) /C [1 2]>> trailing";
        let bounds = scanner(data).get_dict_bounds_at(0, false).unwrap();
        assert_eq!(&data[bounds.end - 1..=bounds.end], b">>");
        assert_eq!(bounds.end, 31);
    }

    #[test]
    fn test_dict_bounds_empty() {
        let bounds = scanner(b"<<>>").get_dict_bounds_at(0, false).unwrap();
        assert_eq!(bounds.end, 3);
        assert!(bounds.is_content_empty());
    }

    #[test]
    fn test_dict_bounds_unterminated() {
        assert!(scanner(b"<< /A 1").get_dict_bounds_at(0, false).is_none());
        assert!(scanner(b"< /A 1").get_dict_bounds_at(0, false).is_none());
    }

    #[test]
    fn test_array_bounds_nested() {
        let data = b"[1 [2 (])] <<\x2fK [3]>>] x";
        let bounds = scanner(data).get_array_bounds_at(0, false).unwrap();
        assert_eq!(data[bounds.end], b']');
        assert_eq!(bounds.end, 21);
    }

    #[test]
    fn test_literal_bounds_nested_and_escaped() {
        let data = b"(a (b) \\( c)";
        let bounds = scanner(data).get_literal_bounds_at(0, false).unwrap();
        assert_eq!(bounds.end, data.len() - 1);
    }

    #[test]
    fn test_indirect_object_bounds() {
        let data = b"5 0 obj\r\n<< /Type /Catalog /Pages 3 0 R >>\r\nendobj";
        let bounds = scanner(data).get_indirect_object_bounds_at(0, false).unwrap();
        assert_eq!(bounds.start, 0);
        assert_eq!(bounds.end, data.len() - 1);
        assert_eq!(bounds.content_start, Some(9));
        assert_eq!(data[bounds.content_end.unwrap()], b'>');
    }

    #[test]
    fn test_indirect_object_bounds_stream_hides_endobj() {
        let data = b"1 0 obj\n<< /Length 6 >>\nstream\nendobj\nendstream\nendobj\n";
        let bounds = scanner(data).get_indirect_object_bounds_at(0, false).unwrap();
        assert_eq!(&data[bounds.end - 5..=bounds.end], b"endobj");
        assert_eq!(bounds.end, data.len() - 2);
    }

    #[test]
    fn test_xref_table_bounds() {
        let data = b"xref\n0 1\n0000000000 65535 f\r\ntrailer\n<< >>";
        let bounds = scanner(data).get_xref_table_bounds_at(0, false).unwrap();
        assert_eq!(bounds.content_start, Some(5));
        assert_eq!(&data[bounds.end + 1..bounds.end + 8], b"trailer");
    }

    // ========================================================================
    // Value classification and skipping
    // ========================================================================

    #[test]
    fn test_value_types() {
        let s = scanner(b"/N [1] <<>> <AB> (x) 3 0 R 4.5 true null % c\n foo");
        assert_eq!(s.get_value_type_at(0, false), ValueType::Name);
        assert_eq!(s.get_value_type_at(3, false), ValueType::Array);
        assert_eq!(s.get_value_type_at(7, false), ValueType::Dictionary);
        assert_eq!(s.get_value_type_at(12, false), ValueType::StringHex);
        assert_eq!(s.get_value_type_at(17, false), ValueType::StringLiteral);
        assert_eq!(s.get_value_type_at(21, false), ValueType::Ref);
        assert_eq!(s.get_value_type_at(27, false), ValueType::Number);
        assert_eq!(s.get_value_type_at(31, false), ValueType::Boolean);
        assert_eq!(s.get_value_type_at(36, false), ValueType::Null);
        assert_eq!(s.get_value_type_at(41, false), ValueType::Comment);
        assert_eq!(s.get_value_type_at(45, true), ValueType::Unknown);
    }

    #[test]
    fn test_value_type_stream() {
        let s = scanner(b"<< /Length 0 >>\nstream\n\nendstream");
        assert_eq!(s.get_value_type_at(0, false), ValueType::Stream);
    }

    #[test]
    fn test_skip_to_next_name_skips_nested_values() {
        let data = b"/A << /Inner 1 >> [/X /Y] (/Z) /B 2";
        let s = scanner(data);
        let first = s.skip_to_next_name(0, data.len() - 1).unwrap();
        assert_eq!(first, 0);
        let next = s.skip_to_next_name(2, data.len() - 1).unwrap();
        assert_eq!(&data[next..next + 2], b"/B");
        assert_eq!(s.skip_to_next_name(next + 2, data.len() - 1), None);
    }

    #[test]
    fn test_skip_value_at_handles_name_values() {
        let data = b"/Type /Annot /Rect [0 0 1 1]";
        let s = scanner(data);
        let after = s.skip_value_at(5).unwrap();
        assert_eq!(after, 12);
        let after_ref = scanner(b" 12 0 R /X").skip_value_at(0).unwrap();
        assert_eq!(after_ref, 7);
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    #[test]
    fn test_parse_numbers() {
        let s = scanner(b"-12 3.25 5. .5 -");
        assert_eq!(s.parse_number_at(0, false, false).unwrap().value, -12.0);
        let real = s.parse_number_at(4, true, false).unwrap();
        assert_eq!((real.value, real.end), (3.25, 7));
        assert_eq!(s.parse_number_at(9, true, false).unwrap().value, 5.0);
        assert_eq!(s.parse_number_at(12, true, false).unwrap().value, 0.5);
        assert!(s.parse_number_at(15, true, false).is_none());
    }

    #[test]
    fn test_parse_integer_stops_at_dot() {
        let result = scanner(b"7.5").parse_integer_at(0, false).unwrap();
        assert_eq!((result.value, result.end), (7, 0));
    }

    #[test]
    fn test_parse_name_keeps_escapes() {
        let s = scanner(b"  /A#20B/Next");
        let name = s.parse_name_at(0, true).unwrap();
        assert_eq!(name.value, "/A#20B");
        assert_eq!((name.start, name.end), (2, 7));
    }

    #[test]
    fn test_parse_keyword_and_bool() {
        let s = scanner(b"endobj true falsey");
        assert_eq!(s.parse_string_at(0, false).unwrap().value, "endobj");
        assert!(s.parse_bool_at(7, false).unwrap().value);
        assert!(s.parse_bool_at(12, false).is_none());
    }

    #[test]
    fn test_parse_hex_and_literal() {
        let s = scanner(b"<48 65 6C6C 6F> <7> (a\\)b)");
        assert_eq!(s.parse_hex_at(0, false).unwrap().value, b"Hello");
        assert_eq!(s.parse_hex_at(16, false).unwrap().value, vec![0x70]);
        assert_eq!(s.parse_literal_at(20, false).unwrap().value, b"a\\)b");
    }

    #[test]
    fn test_parse_arrays() {
        let s = scanner(b"[0 0 612.5 792] [/A /B]");
        assert_eq!(
            s.parse_number_array_at(0, true, false).unwrap().value,
            vec![0.0, 0.0, 612.5, 792.0]
        );
        assert_eq!(s.parse_name_array_at(16, false).unwrap().value, vec!["/A", "/B"]);
        assert!(scanner(b"[1 /A]").parse_number_array_at(0, true, false).is_none());
    }
}
