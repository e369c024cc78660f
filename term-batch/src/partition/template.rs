//! Reference templates derived from partitioning regexes.
//!
//! A template is the inverse of a regex pattern: literal text is kept,
//! capture groups become `{group}` placeholders and every construct that can
//! match more than one string becomes a `*` wildcard.

use std::fmt;

use crate::core::PartitionIdentity;
use crate::error::{Result, TermError};

/// A segment of a reference template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    /// Text copied verbatim into the reference (e.g. `"-"` or `".csv"`)
    Literal(String),
    /// A placeholder for the value of a named group (e.g. `{id}`)
    Group(String),
    /// A construct that cannot be inverted; rendered as `*`
    Wildcard,
}

/// A parsed reference template.
///
/// # Examples
///
/// ```
/// use term_batch::partition::ReferenceTemplate;
///
/// let names = vec!["name".to_string(), "id".to_string()];
/// let template = ReferenceTemplate::from_regex(r"^(.+)-(\d+)\.csv$", &names).unwrap();
/// assert_eq!(template.to_string(), "{name}-{id}.csv");
/// assert!(!template.has_wildcards());
///
/// let template = ReferenceTemplate::from_regex(r"(\d{4})_.*\.csv", &names[1..]).unwrap();
/// assert_eq!(template.to_string(), "{id}_*.csv");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTemplate {
    segments: Vec<TemplateSegment>,
}

/// Intermediate output of the parser: one entry per emitted character or
/// placeholder, coalesced into segments once parsing is done.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Char(char),
    Group(String),
    Wildcard,
}

struct TemplateParser<'a> {
    chars: Vec<char>,
    pos: usize,
    group_names: &'a [String],
    capture_index: usize,
    pieces: Vec<Piece>,
    /// Index into `pieces` where the most recent quantifiable atom starts
    last_atom: Option<usize>,
    alternation: bool,
}

impl ReferenceTemplate {
    /// Derives a template from a regex pattern.
    ///
    /// Capture groups are numbered in the order their opening parentheses
    /// appear and are named positionally from `group_names`.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the pattern has unbalanced
    /// parentheses or brackets, or more capture groups than `group_names`.
    pub fn from_regex(pattern: &str, group_names: &[String]) -> Result<Self> {
        let mut parser = TemplateParser {
            chars: pattern.chars().collect(),
            pos: 0,
            group_names,
            capture_index: 0,
            pieces: Vec::new(),
            last_atom: None,
            alternation: false,
        };
        parser.parse()?;

        if parser.alternation {
            return Ok(Self {
                segments: vec![TemplateSegment::Wildcard],
            });
        }

        Ok(Self {
            segments: coalesce(parser.pieces),
        })
    }

    pub fn segments(&self) -> &[TemplateSegment] {
        &self.segments
    }

    /// Returns `true` if any part of the template cannot be inverted exactly.
    pub fn has_wildcards(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, TemplateSegment::Wildcard))
    }

    /// Names of the groups referenced by the template, in order.
    pub fn group_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                TemplateSegment::Group(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Substitutes partition values into the template.
    ///
    /// Wildcards are rendered as `*`.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableReference` if the identity has no value for a
    /// placeholder.
    pub fn render(&self, identity: &PartitionIdentity) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Wildcard => out.push('*'),
                TemplateSegment::Group(name) => match identity.get(name) {
                    Some(value) => out.push_str(&value.as_text()),
                    None => {
                        return Err(TermError::UnresolvableReference {
                            group: name.clone(),
                            template: self.to_string(),
                        })
                    }
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Display for ReferenceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => f.write_str(text)?,
                TemplateSegment::Group(name) => write!(f, "{{{name}}}")?,
                TemplateSegment::Wildcard => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

impl TemplateParser<'_> {
    fn parse(&mut self) -> Result<()> {
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            match c {
                '^' | '$' => {
                    self.pos += 1;
                    self.last_atom = None;
                }
                '|' => {
                    self.alternation = true;
                    self.pos += 1;
                }
                '.' => {
                    self.pos += 1;
                    self.push_atom(Piece::Wildcard);
                }
                '[' => {
                    self.pos = self.class_end(self.pos)? + 1;
                    self.push_atom(Piece::Wildcard);
                }
                '\\' => self.parse_escape()?,
                '(' => self.parse_group()?,
                ')' => {
                    return Err(TermError::Configuration(format!(
                        "Unbalanced ')' in pattern '{}'",
                        self.source()
                    )))
                }
                '*' | '+' | '?' => {
                    self.pos += 1;
                    self.apply_quantifier();
                }
                '{' if self.repetition_end(self.pos).is_some() => {
                    if let Some(end) = self.repetition_end(self.pos) {
                        self.pos = end + 1;
                    }
                    self.apply_quantifier();
                }
                other => {
                    self.pos += 1;
                    self.push_atom(Piece::Char(other));
                }
            }
        }
        Ok(())
    }

    fn source(&self) -> String {
        self.chars.iter().collect()
    }

    fn push_atom(&mut self, piece: Piece) {
        self.last_atom = Some(self.pieces.len());
        self.pieces.push(piece);
    }

    /// Replaces the previous atom with a wildcard and consumes a lazy marker.
    fn apply_quantifier(&mut self) {
        if let Some(start) = self.last_atom {
            self.pieces.truncate(start);
            self.pieces.push(Piece::Wildcard);
        }
        if self.chars.get(self.pos) == Some(&'?') {
            self.pos += 1;
        }
    }

    fn parse_escape(&mut self) -> Result<()> {
        let Some(&next) = self.chars.get(self.pos + 1) else {
            return Err(TermError::Configuration(format!(
                "Trailing backslash in pattern '{}'",
                self.source()
            )));
        };
        self.pos += 2;

        match next {
            'd' | 'D' | 'w' | 'W' | 's' | 'S' => self.push_atom(Piece::Wildcard),
            'p' | 'P' => {
                if self.chars.get(self.pos) == Some(&'{') {
                    while self.pos < self.chars.len() && self.chars[self.pos] != '}' {
                        self.pos += 1;
                    }
                }
                self.pos += 1;
                self.push_atom(Piece::Wildcard);
            }
            'A' | 'z' | 'Z' | 'b' | 'B' => self.last_atom = None,
            'n' => self.push_atom(Piece::Char('\n')),
            't' => self.push_atom(Piece::Char('\t')),
            'r' => self.push_atom(Piece::Char('\r')),
            'x' => match self.parse_hex_escape() {
                Some(ch) => self.push_atom(Piece::Char(ch)),
                None => self.push_atom(Piece::Wildcard),
            },
            other => self.push_atom(Piece::Char(other)),
        }
        Ok(())
    }

    /// Parses `\xHH` or `\x{H...}` after the `x` has been consumed.
    fn parse_hex_escape(&mut self) -> Option<char> {
        let digits: String = if self.chars.get(self.pos) == Some(&'{') {
            let start = self.pos + 1;
            let end = (start..self.chars.len()).find(|&i| self.chars[i] == '}')?;
            self.pos = end + 1;
            self.chars[start..end].iter().collect()
        } else {
            let end = (self.pos + 2).min(self.chars.len());
            let digits = self.chars[self.pos..end].iter().collect();
            self.pos = end;
            digits
        };
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    }

    fn parse_group(&mut self) -> Result<()> {
        let open = self.pos;
        let (close, inner_captures) = self.group_end(open)?;
        let kind = self.group_kind(open);
        self.pos = close + 1;

        match kind {
            GroupKind::Capturing => {
                self.capture_index += 1;
                let name = self
                    .group_names
                    .get(self.capture_index - 1)
                    .cloned()
                    .ok_or_else(|| {
                        TermError::Configuration(format!(
                            "Pattern '{}' has more capture groups than the {} configured group names",
                            self.source(),
                            self.group_names.len()
                        ))
                    })?;
                self.capture_index += inner_captures;
                self.push_atom(Piece::Group(name));
            }
            GroupKind::NonCapturing => {
                self.capture_index += inner_captures;
                self.push_atom(Piece::Wildcard);
            }
            GroupKind::Assertion => {
                self.capture_index += inner_captures;
                self.last_atom = None;
            }
        }
        Ok(())
    }

    fn group_kind(&self, open: usize) -> GroupKind {
        let at = |offset: usize| self.chars.get(open + offset).copied();
        if at(1) != Some('?') {
            return GroupKind::Capturing;
        }
        match (at(2), at(3)) {
            (Some('P'), Some('<')) => GroupKind::Capturing,
            (Some('<'), Some('=')) | (Some('<'), Some('!')) => GroupKind::Assertion,
            (Some('<'), _) => GroupKind::Capturing,
            (Some('='), _) | (Some('!'), _) => GroupKind::Assertion,
            _ => {
                // `(?i)` style flag groups match nothing; `(?i:...)` and `(?:...)` do
                let mut i = open + 2;
                while let Some(c) = self.chars.get(i) {
                    match c {
                        ')' => return GroupKind::Assertion,
                        ':' => return GroupKind::NonCapturing,
                        _ => i += 1,
                    }
                }
                GroupKind::NonCapturing
            }
        }
    }

    /// Finds the `)` closing the group opened at `open`, counting capture
    /// groups nested inside it.
    fn group_end(&self, open: usize) -> Result<(usize, usize)> {
        let mut depth = 0usize;
        let mut captures = 0usize;
        let mut i = open;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 1,
                '[' => i = self.class_end(i)?,
                '(' => {
                    if i != open && self.group_kind(i) == GroupKind::Capturing {
                        captures += 1;
                    }
                    depth += 1;
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((i, captures));
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(TermError::Configuration(format!(
            "Unbalanced '(' in pattern '{}'",
            self.source()
        )))
    }

    /// Finds the `]` closing the character class opened at `open`.
    fn class_end(&self, open: usize) -> Result<usize> {
        let mut i = open + 1;
        if self.chars.get(i) == Some(&'^') {
            i += 1;
        }
        if self.chars.get(i) == Some(&']') {
            i += 1;
        }
        let mut depth = 1usize;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 1,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(TermError::Configuration(format!(
            "Unbalanced '[' in pattern '{}'",
            self.source()
        )))
    }

    /// Returns the index of `}` if a valid `{n}`, `{n,}` or `{n,m}` starts at `open`.
    fn repetition_end(&self, open: usize) -> Option<usize> {
        let mut i = open + 1;
        let mut seen_digit = false;
        let mut seen_comma = false;
        while let Some(&c) = self.chars.get(i) {
            match c {
                '0'..='9' => seen_digit = true,
                ',' if !seen_comma => seen_comma = true,
                ' ' => {}
                '}' if seen_digit => return Some(i),
                _ => return None,
            }
            i += 1;
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Capturing,
    NonCapturing,
    Assertion,
}

fn coalesce(pieces: Vec<Piece>) -> Vec<TemplateSegment> {
    let mut segments: Vec<TemplateSegment> = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Char(c) => match segments.last_mut() {
                Some(TemplateSegment::Literal(text)) => text.push(c),
                _ => segments.push(TemplateSegment::Literal(c.to_string())),
            },
            Piece::Group(name) => segments.push(TemplateSegment::Group(name)),
            Piece::Wildcard => {
                if segments.last() != Some(&TemplateSegment::Wildcard) {
                    segments.push(TemplateSegment::Wildcard);
                }
            }
        }
    }
    segments
}
