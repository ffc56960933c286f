//! RINEX observation file assembler: `read_observation_header` +
//! `read_observation_records` (`spec.md` §4.3).
//!
//! Every leaf/record `TypeRef` used while assembling a product is built
//! exactly once and reused verbatim for every instance of that type: field
//! lookups compare definitions by `Rc::ptr_eq` ([`crate::types::same_type_opt`]),
//! so a fresh (if structurally identical) `TypeRef` would be rejected as a
//! type mismatch by [`mem::record_add_field`].

use std::collections::HashMap;

use super::header::{self, Header};
use super::{field, parse_f64_or_default, parse_i64_or_default, record_type, text_leaf, variable_array_type, Builder, LineReader, SatelliteSystem};
use crate::dynamic::DynamicRef;
use crate::error::{Error, Result};
use crate::mem;
use crate::product::Product;
use crate::types::{Common, Field, Format, TypeRef};

/// The complete, cached static type graph for one observation product
/// (`spec.md` §4.2 "Static type graph... built once and reused").
struct Schema {
    header_type: TypeRef,
    file_type_leaf: TypeRef,
    version_leaf: TypeRef,
    leap_seconds_leaf: TypeRef,
    root_type: TypeRef,
    record_array_type: TypeRef,
    epoch_type: TypeRef,
    epoch_leaf: TypeRef,
    flag_leaf: TypeRef,
    clock_offset_leaf: TypeRef,
    obs_rec_type: TypeRef,
    obs_leaf: TypeRef,
    lli_leaf: TypeRef,
    ss_leaf: TypeRef,
    number_leaf: TypeRef,
    element_types: HashMap<SatelliteSystem, TypeRef>,
}

/// The leaf/sub-record types that hold regardless of which observation
/// types a given file declares. Built once per thread and reused
/// (`spec.md` §5 "initialized once per thread on first use"); only the
/// per-system `element_type`s and the record/root types that embed them
/// vary file to file, since they depend on that file's `SYS / # / OBS
/// TYPES` declarations.
#[derive(Clone)]
struct StaticLeaves {
    header_type: TypeRef,
    file_type_leaf: TypeRef,
    version_leaf: TypeRef,
    leap_seconds_leaf: TypeRef,
    obs_leaf: TypeRef,
    lli_leaf: TypeRef,
    ss_leaf: TypeRef,
    obs_rec_type: TypeRef,
    number_leaf: TypeRef,
    epoch_leaf: TypeRef,
    flag_leaf: TypeRef,
    clock_offset_leaf: TypeRef,
}

thread_local! {
    static STATIC_LEAVES: std::cell::RefCell<Option<StaticLeaves>> = std::cell::RefCell::new(None);
}

fn static_leaves() -> StaticLeaves {
    STATIC_LEAVES.with(|cell| {
        let mut cached = cell.borrow_mut();
        if cached.is_none() {
            let file_type_leaf = text_leaf("RINEX file type");
            let version_leaf = super::f64_leaf("RINEX format version");
            let header_type = record_type(vec![("file_type", file_type_leaf.clone()), ("version", version_leaf.clone())]);
            let leap_seconds_leaf = super::i64_leaf("leap seconds (UTC-GPS/GLONASS offset at time of file)");
            let obs_leaf = super::f64_leaf("observed value");
            let lli_leaf = super::i64_leaf("loss-of-lock indicator, 0-7");
            let ss_leaf = super::i64_leaf("signal strength indicator");
            let obs_rec_type = record_type(vec![("observation", obs_leaf.clone()), ("lli", lli_leaf.clone()), ("signal_strength", ss_leaf.clone())]);
            let number_leaf = super::i64_leaf("satellite PRN number");
            let epoch_leaf = super::f64_leaf("epoch datetime");
            let flag_leaf = text_leaf("epoch flag");
            let clock_offset_leaf = super::f64_leaf("receiver clock offset");
            *cached = Some(StaticLeaves {
                header_type,
                file_type_leaf,
                version_leaf,
                leap_seconds_leaf,
                obs_leaf,
                lli_leaf,
                ss_leaf,
                obs_rec_type,
                number_leaf,
                epoch_leaf,
                flag_leaf,
                clock_offset_leaf,
            });
        }
        cached.as_ref().unwrap().clone()
    })
}

fn build_schema(obs_types: &HashMap<SatelliteSystem, Vec<String>>) -> Schema {
    let leaves = static_leaves();

    let mut element_types = HashMap::new();
    let mut epoch_fields = vec![];
    epoch_fields.push(Field { real_name: "epoch".into(), sanitized_name: "epoch".into(), field_type: leaves.epoch_leaf.clone(), optional: false });
    epoch_fields.push(Field { real_name: "flag".into(), sanitized_name: "flag".into(), field_type: leaves.flag_leaf.clone(), optional: false });
    epoch_fields.push(Field {
        real_name: "receiver_clock_offset".into(),
        sanitized_name: "receiver_clock_offset".into(),
        field_type: leaves.clock_offset_leaf.clone(),
        optional: true,
    });

    for (system, descriptors) in obs_types {
        let mut fields = vec![Field { real_name: "number".into(), sanitized_name: "number".into(), field_type: leaves.number_leaf.clone(), optional: false }];
        for d in descriptors {
            fields.push(Field { real_name: d.clone(), sanitized_name: d.clone(), field_type: leaves.obs_rec_type.clone(), optional: false });
        }
        let element_type = crate::types::new_record(Common::new(Format::Rinex), fields, false);
        let array_type = variable_array_type(element_type.clone());
        epoch_fields.push(Field { real_name: system.field_name().into(), sanitized_name: system.field_name().into(), field_type: array_type, optional: true });
        element_types.insert(*system, element_type);
    }

    let epoch_type = crate::types::new_record(Common::new(Format::Rinex), epoch_fields, false);
    let record_array_type = variable_array_type(epoch_type.clone());
    let root_type = record_type(vec![("header", leaves.header_type.clone()), ("record", record_array_type.clone())]);

    Schema {
        header_type: leaves.header_type,
        file_type_leaf: leaves.file_type_leaf,
        version_leaf: leaves.version_leaf,
        leap_seconds_leaf: leaves.leap_seconds_leaf,
        root_type,
        record_array_type,
        epoch_type,
        epoch_leaf: leaves.epoch_leaf,
        flag_leaf: leaves.flag_leaf,
        clock_offset_leaf: leaves.clock_offset_leaf,
        obs_rec_type: leaves.obs_rec_type,
        obs_leaf: leaves.obs_leaf,
        lli_leaf: leaves.lli_leaf,
        ss_leaf: leaves.ss_leaf,
        number_leaf: leaves.number_leaf,
        element_types,
    }
}

/// Every header label the original's `read_observation_header` recognizes
/// (`original_source/libcoda/coda-rinex.c`), excluding `RINEX VERSION /
/// TYPE` (consumed before the header loop starts) and `END OF HEADER`
/// (the loop's own terminator).
const KNOWN_LABELS: &[&str] = &[
    "PGM / RUN BY / DATE",
    "COMMENT",
    "MARKER NAME",
    "MARKER NUMBER",
    "MARKER TYPE",
    "OBSERVER / AGENCY",
    "REC # / TYPE / VERS",
    "ANT # / TYPE",
    "APPROX POSITION XYZ",
    "ANTENNA: DELTA H/E/N",
    "ANTENNA: DELTA X/Y/Z",
    "ANTENNA: PHASECENTER",
    "ANTENNA: B.SIGHT XYZ",
    "ANTENNA: ZERODIR AZI",
    "ANTENNA: ZERODIR XYZ",
    "CENTER OF MASS: XYZ",
    "SYS / # / OBS TYPES",
    "SIGNAL STRENGTH UNIT",
    "INTERVAL",
    "TIME OF FIRST OBS",
    "TIME OF LAST OBS",
    "RCV CLOCK OFFS APPL",
    "SYS / DCBS APPLIED",
    "SYS / PCVS APPLIED",
    "SYS / SCALE FACTOR",
    "LEAP SECONDS",
    "# OF SATELLITES",
    "PRN / # OF OBS",
];

pub fn assemble(reader: &mut LineReader, builder: &mut Builder, version_type: super::header::VersionType) -> Result<Product> {
    let mut hdr = Header::default();
    header::read_header_lines(reader, &mut hdr, KNOWN_LABELS, |reader, hdr, label, line| match label {
        "SYS / # / OBS TYPES" => {
            let (system, descriptors) = header::parse_sys_obs_types(reader, line)?;
            hdr.obs_types.insert(system, descriptors);
            Ok(true)
        }
        "LEAP SECONDS" => {
            hdr.leap_seconds = Some(header::parse_leap_seconds(reader, line)?);
            Ok(true)
        }
        _ => Ok(false),
    })?;

    if hdr.obs_types.is_empty() {
        return Err(Error::file_read("observation file declares no 'SYS / # / OBS TYPES' header record"));
    }

    let schema = build_schema(&hdr.obs_types);

    let header_value = {
        let h = mem::record_new(schema.header_type.clone(), None)?;
        mem::record_add_field(&h, "file_type", mem::string_new(schema.file_type_leaf.clone(), None, &mut builder.arena, &version_type.file_type.to_string())?, false)?;
        mem::record_add_field(&h, "version", mem::double_new(schema.version_leaf.clone(), None, &mut builder.arena, version_type.version)?, false)?;
        if let Some(ls) = hdr.leap_seconds {
            mem::record_add_field(&h, "leap_seconds", mem::int64_new(schema.leap_seconds_leaf.clone(), None, &mut builder.arena, ls)?, true)?;
        }
        mem::record_validate(&h)?;
        h
    };

    let records = mem::array_new(schema.record_array_type.clone(), None)?;

    while let Some(line) = reader.next_line() {
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with('>') {
            return Err(reader.error(format!("expected an epoch line starting with '>', found {line:?}")));
        }
        let epoch_value = parse_epoch(reader, line, &hdr, &schema, builder)?;
        mem::array_add_element(&records, epoch_value)?;
    }
    mem::array_validate(&records)?;

    let root = mem::record_new(schema.root_type.clone(), None)?;
    mem::record_add_field(&root, "header", header_value, false)?;
    mem::record_add_field(&root, "record", records, false)?;
    mem::record_validate(&root)?;

    Ok(Product::from_parts(Format::Rinex, root, std::mem::replace(&mut builder.arena, crate::mem::arena::Arena::new())))
}

fn parse_epoch(reader: &mut LineReader, line: &str, hdr: &Header, schema: &Schema, builder: &mut Builder) -> Result<DynamicRef> {
    let datetime_str = field(line, 2, 27);
    let flag = field(line, 31, 1);
    let satellite_count = parse_i64_or_default(&field(line, 32, 3));
    let clock_offset_str = field(line, 41, 15);

    let epoch_seconds = parse_epoch_datetime(reader, &datetime_str)?;

    let rec = mem::record_new(schema.epoch_type.clone(), None)?;
    mem::record_add_field(&rec, "epoch", mem::double_new(schema.epoch_leaf.clone(), None, &mut builder.arena, epoch_seconds)?, false)?;
    mem::record_add_field(&rec, "flag", mem::string_new(schema.flag_leaf.clone(), None, &mut builder.arena, &flag)?, false)?;

    if flag != "0" {
        for _ in 0..satellite_count {
            reader.require_line()?;
        }
        mem::record_validate(&rec)?;
        return Ok(rec);
    }

    let mut per_system: HashMap<SatelliteSystem, Vec<DynamicRef>> = HashMap::new();
    for _ in 0..satellite_count {
        let sat_line = reader.require_line()?;
        let system = SatelliteSystem::from_code(sat_line.chars().next().ok_or_else(|| reader.error("empty satellite observation line"))?)?;
        let number = parse_i64_or_default(&field(sat_line, 1, 2));
        let descriptors = hdr.obs_types.get(&system).cloned().unwrap_or_default();
        let element_type = schema
            .element_types
            .get(&system)
            .cloned()
            .ok_or_else(|| reader.error(format!("no observation types declared for system present in data: {system:?}")))?;

        let element = mem::record_new(element_type, None)?;
        mem::record_add_field(&element, "number", mem::int64_new(schema.number_leaf.clone(), None, &mut builder.arena, number)?, false)?;
        for (i, descriptor) in descriptors.iter().enumerate() {
            let slot_start = 3 + 16 * i;
            let value = parse_f64_or_default(&field(sat_line, slot_start, 14));
            let lli = parse_i64_or_default(&field(sat_line, slot_start + 14, 1));
            let signal_strength = parse_i64_or_default(&field(sat_line, slot_start + 15, 1));

            let obs = mem::record_new(schema.obs_rec_type.clone(), None)?;
            mem::record_add_field(&obs, "observation", mem::double_new(schema.obs_leaf.clone(), None, &mut builder.arena, value)?, false)?;
            mem::record_add_field(&obs, "lli", mem::int64_new(schema.lli_leaf.clone(), None, &mut builder.arena, lli)?, false)?;
            mem::record_add_field(&obs, "signal_strength", mem::int64_new(schema.ss_leaf.clone(), None, &mut builder.arena, signal_strength)?, false)?;
            mem::record_validate(&obs)?;
            mem::record_add_field(&element, descriptor, obs, false)?;
        }
        mem::record_validate(&element)?;
        per_system.entry(system).or_default().push(element);
    }

    if !clock_offset_str.trim().is_empty() {
        mem::record_add_field(
            &rec,
            "receiver_clock_offset",
            mem::double_new(schema.clock_offset_leaf.clone(), None, &mut builder.arena, parse_f64_or_default(&clock_offset_str))?,
            false,
        )?;
    }
    for (system, elements) in per_system {
        let idx = schema.epoch_type.field_index_by_real_name(system.field_name()).expect("system field was declared on the epoch type");
        let array_type = schema.epoch_type.as_record().unwrap()[idx].field_type.clone();
        let array = mem::array_new(array_type, None)?;
        for elt in elements {
            mem::array_add_element(&array, elt)?;
        }
        mem::array_validate(&array)?;
        mem::record_add_field(&rec, system.field_name(), array, false)?;
    }
    mem::record_validate(&rec)?;
    Ok(rec)
}

fn parse_epoch_datetime(reader: &mut LineReader, text: &str) -> Result<f64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 6 {
        return Err(reader.error(format!("malformed epoch datetime {text:?}")));
    }
    let year: i32 = tokens[0].parse().map_err(|_| reader.error("malformed epoch year"))?;
    let month: i32 = tokens[1].parse().map_err(|_| reader.error("malformed epoch month"))?;
    let day: i32 = tokens[2].parse().map_err(|_| reader.error("malformed epoch day"))?;
    let hour: i32 = tokens[3].parse().map_err(|_| reader.error("malformed epoch hour"))?;
    let minute: i32 = tokens[4].parse().map_err(|_| reader.error("malformed epoch minute"))?;
    let seconds: f64 = tokens[5].parse().map_err(|_| reader.error("malformed epoch seconds"))?;
    let second = seconds.trunc() as i32;
    let musec = (seconds.fract() * 1_000_000.0).round() as i32;
    let parts = crate::time::DateTimeParts { year, month, day, hour, minute, second, musec };
    crate::time::parts_to_double(&parts).map_err(|e| reader.error(e.to_string()))
}
