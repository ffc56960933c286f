//! Header-line parsing shared by the observation/navigation/clock
//! assemblers (`spec.md` §4.3 "Header line dispatch").

use std::collections::HashMap;

use super::{field, parse_i64_or_default, LineReader, SatelliteSystem};
use crate::error::{Error, Result};

pub struct VersionType {
    pub version: f64,
    pub file_type: char,
    pub system: SatelliteSystem,
}

const LABEL_COLUMN: usize = 60;

fn label_of(line: &str) -> String {
    field(line, LABEL_COLUMN, 20).trim().to_string()
}

/// `spec.md` §4.3: "Column 0–9 is a float (format version), column 20 is
/// file type, column 40 is satellite-system family (RINEX 3.x); for older
/// versions the family defaults to 'G' (GPS)."
pub fn parse_version_type_line(reader: &mut LineReader, line: &str) -> Result<VersionType> {
    if label_of(line) != "RINEX VERSION / TYPE" {
        return Err(reader.error("expected 'RINEX VERSION / TYPE' as the first header line"));
    }
    let version: f64 = field(line, 0, 9)
        .trim()
        .parse()
        .map_err(|_| reader.error("malformed RINEX version field"))?;
    let file_type = field(line, 20, 1).chars().next().ok_or_else(|| reader.error("missing file type field"))?;
    let system_field = field(line, 40, 1).trim().to_string();
    let system = if version >= 3.0 && !system_field.is_empty() {
        SatelliteSystem::from_code(system_field.chars().next().unwrap())?
    } else {
        SatelliteSystem::Gps
    };
    Ok(VersionType { version, file_type, system })
}

/// `SYS / # / OBS TYPES`: satellite-system code, observation-type count,
/// then that many 3-character descriptors laid out 13-per-line in 4-wide
/// fields (`spec.md` §4.3).
pub fn parse_sys_obs_types(reader: &mut LineReader, first_line: &str) -> Result<(SatelliteSystem, Vec<String>)> {
    let code = field(first_line, 0, 1).chars().next().ok_or_else(|| reader.error("missing satellite system code"))?;
    let system = SatelliteSystem::from_code(code)?;
    let count = parse_i64_or_default(&field(first_line, 3, 3)) as usize;

    let mut descriptors = Vec::with_capacity(count);
    let mut line = first_line.to_string();
    let mut col = 7usize;
    for _ in 0..count {
        if col + 3 > 60 {
            line = reader.require_line()?.to_string();
            col = 7;
        }
        let descriptor = field(&line, col, 3).trim().to_string();
        descriptors.push(descriptor);
        col += 4;
    }
    Ok((system, descriptors))
}

/// Header metadata common across the observation/navigation/clock variants.
/// Labels the assembler doesn't parse into a dedicated field (comments,
/// marker/agency metadata, ...) are kept verbatim in `extra` as long as
/// they're declared in the assembler's `known_labels` list; anything else
/// is an unknown label and fails the whole parse.
#[derive(Default)]
pub struct Header {
    pub obs_types: HashMap<SatelliteSystem, Vec<String>>,
    pub leap_seconds: Option<i64>,
    pub extra: Vec<(String, String)>,
}

/// `LEAP SECONDS`: a 6-column integer at the start of the line, matching
/// the original's `coda_ascii_parse_int64(line, 6, &int_value, 0)`.
pub fn parse_leap_seconds(reader: &mut LineReader, line: &str) -> Result<i64> {
    field(line, 0, 6).trim().parse::<i64>().map_err(|_| reader.error("malformed LEAP SECONDS value"))
}

/// Reads header lines until `END OF HEADER`, letting `on_label` handle
/// labels it recognizes (returning `true` if it consumed the line) and
/// recording everything else declared in `known_labels` as `extra`.
/// A label absent from both `on_label`'s handling and `known_labels` is
/// rejected with `FileRead`, matching the original's `coda_set_error
/// (CODA_ERROR_FILE_READ, "invalid header item '%s'"...)` fallback.
pub fn read_header_lines(
    reader: &mut LineReader,
    header: &mut Header,
    known_labels: &[&str],
    mut on_label: impl FnMut(&mut LineReader, &mut Header, &str, &str) -> Result<bool>,
) -> Result<()> {
    loop {
        let line = reader.require_line()?.to_string();
        let label = label_of(&line);
        if label == "END OF HEADER" {
            return Ok(());
        }
        if on_label(reader, header, &label, &line)? {
            continue;
        }
        if !known_labels.contains(&label.as_str()) {
            return Err(reader.error(format!("invalid header item '{label}'")));
        }
        header.extra.push((label, line[..line.len().min(LABEL_COLUMN)].to_string()));
    }
}
