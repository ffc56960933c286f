//! RINEX line-oriented assembler (`spec.md` component F, §4.3): parses
//! observation/navigation/clock RINEX text products into a fully
//! materialized dynamic-type tree on top of the in-memory backend.
//!
//! Grounded on `original_source/libcoda/coda-rinex.c` for the state
//! machine (`read_main_header` dispatching on file type) and fixed-column
//! layouts; the static type graph construction mirrors
//! `coda-mem-type.c`'s builder-function style already used by [`crate::mem`].

pub mod clock;
pub mod header;
pub mod navigation;
pub mod observation;

use std::cell::RefCell;

use crate::error::{Error, Result};
use crate::hashtable::Hashtable;
use crate::mem;
use crate::mem::arena::Arena;
use crate::product::Product;
use crate::types::{Common, Field, Format, NumberClass, ReadAs, TypeRef};

/// `spec.md` §4.3 "Lexical model": lines are LF-terminated, optionally
/// preceded by CR, capped at 1000 characters.
pub const MAX_LINE_LEN: usize = 1000;

/// A cursor over the product's lines, trimming the line terminator and
/// tracking a 1-based line number for error context (`spec.md` §4.3 "Time
/// parsing": "invalid values surface with byte-offset and line-number
/// context").
pub struct LineReader<'a> {
    lines: std::str::Lines<'a>,
    pub line_number: u64,
}

impl<'a> LineReader<'a> {
    pub fn new(contents: &'a str) -> Self {
        LineReader { lines: contents.lines(), line_number: 0 }
    }

    /// Returns `None` at EOF (length 0, per `spec.md`: "EOF yields length 0").
    pub fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.next()?;
        self.line_number += 1;
        let line = line.strip_suffix('\r').unwrap_or(line);
        Some(if line.len() > MAX_LINE_LEN { &line[..MAX_LINE_LEN] } else { line })
    }

    pub fn require_line(&mut self) -> Result<&'a str> {
        self.next_line().ok_or_else(|| Error::file_read(format!("line {}: unexpected end of file", self.line_number + 1)))
    }

    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::file_read(format!("line {}: {}", self.line_number, message.into()))
    }
}

/// Pulls a fixed-column slice `[start, start+len)`, right-padding with
/// spaces when the line is shorter (a common occurrence for trailing
/// optional fields in RINEX/SP3 text).
pub fn field(line: &str, start: usize, len: usize) -> String {
    let chars: Vec<char> = line.chars().collect();
    let end = (start + len).min(chars.len());
    if start >= chars.len() {
        return String::new();
    }
    chars[start..end].iter().collect()
}

pub fn parse_f64_or_default(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or_else(|_| {
        if text.trim().is_empty() {
            0.0
        } else {
            log::trace!("rinex: blank/unparseable numeric field {text:?}, defaulting to 0.0");
            0.0
        }
    })
}

pub fn parse_i64_or_default(text: &str) -> i64 {
    text.trim().parse::<i64>().unwrap_or(0)
}

/// One satellite-system family, keyed the way `SYS / # / OBS TYPES` and the
/// version/type line key it (`G`/`R`/`E`/`S`; defaults to `G` pre-RINEX-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SatelliteSystem {
    Gps,
    Glonass,
    Galileo,
    Sbas,
}

impl SatelliteSystem {
    pub fn from_code(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'G' => Ok(SatelliteSystem::Gps),
            'R' => Ok(SatelliteSystem::Glonass),
            'E' => Ok(SatelliteSystem::Galileo),
            'S' => Ok(SatelliteSystem::Sbas),
            other => Err(Error::unsupported_product(format!("unsupported satellite system code '{other}'"))),
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            SatelliteSystem::Gps => "gps",
            SatelliteSystem::Glonass => "glonass",
            SatelliteSystem::Galileo => "galileo",
            SatelliteSystem::Sbas => "sbas",
        }
    }

    /// `spec.md` §4.3 "Navigation records": GPS 29, GLONASS 15, Galileo 28, SBAS 15.
    pub fn navigation_value_count(self) -> usize {
        match self {
            SatelliteSystem::Gps => 29,
            SatelliteSystem::Glonass => 15,
            SatelliteSystem::Galileo => 28,
            SatelliteSystem::Sbas => 15,
        }
    }
}

pub(crate) fn f64_leaf(description: &str) -> TypeRef {
    crate::types::new_number(
        Common::with_description(Format::Rinex, description),
        NumberClass::Real,
        ReadAs::F64,
        Some(8),
        None,
        None,
    )
}

pub(crate) fn i64_leaf(description: &str) -> TypeRef {
    crate::types::new_number(
        Common::with_description(Format::Rinex, description),
        NumberClass::Integer,
        ReadAs::I64,
        Some(8),
        None,
        None,
    )
}

pub(crate) fn text_leaf(description: &str) -> TypeRef {
    crate::types::new_text(Common::with_description(Format::Rinex, description), ReadAs::String, None)
}

pub(crate) fn record_type(fields: Vec<(&str, TypeRef)>) -> TypeRef {
    let fields = fields
        .into_iter()
        .map(|(name, ty)| Field { real_name: name.to_string(), sanitized_name: name.to_string(), field_type: ty, optional: false })
        .collect();
    crate::types::new_record(Common::new(Format::Rinex), fields, false)
}

pub(crate) fn variable_array_type(base: TypeRef) -> TypeRef {
    crate::types::new_array(Common::new(Format::Rinex), base, vec![crate::types::Dimension::Variable])
}

/// Scratch state threaded through the assembler: the byte arena every
/// `DynamicRef` ultimately borrows from, plus an identifier hashtable used
/// when synthesizing per-system record field names (`spec.md` §4.2).
pub struct Builder {
    pub arena: Arena,
    pub identifiers: RefCell<Hashtable>,
}

impl Builder {
    pub fn new() -> Self {
        Builder { arena: Arena::new(), identifiers: RefCell::new(Hashtable::new(true)) }
    }

    pub fn sanitize(&self, name: &str) -> String {
        mem::identifier_from_name(Some(name), &mut self.identifiers.borrow_mut())
    }
}

/// Entry point: detects `O`/`N`/`C` file type from the header and
/// dispatches to the matching sub-assembler.
pub fn open(contents: &str) -> Result<Product> {
    let mut reader = LineReader::new(contents);
    let first = reader.require_line()?;
    let version_type = header::parse_version_type_line(&mut reader, first)?;

    let mut builder = Builder::new();
    match version_type.file_type {
        'O' => observation::assemble(&mut reader, &mut builder, version_type),
        'N' => navigation::assemble(&mut reader, &mut builder, version_type),
        'C' => clock::assemble(&mut reader, &mut builder, version_type),
        other => Err(Error::unsupported_product(format!("unsupported RINEX file type '{other}'"))),
    }
}

#[cfg(test)]
mod tests;
