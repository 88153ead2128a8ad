//! Typed field formatting.
//!
//! Decodes raw payload bytes from compact records into display values using
//! the column metadata of the selected index. Integers carry the engine's
//! flipped sign bit, floats are big-endian IEEE bits, temporals use the
//! packed TIME2/DATETIME2/TIMESTAMP2 encodings, DECIMAL is the packed
//! base-10^9 form, and strings are transcoded to UTF-8 with control bytes
//! escaped.
//!
//! TIMESTAMP values are UTC seconds localized through the process timezone
//! (`IB_PARSER_TZ`/`TZ`, default `America/Sao_Paulo`).

use std::sync::OnceLock;

use chrono::TimeZone;
use chrono_tz::Tz;

use crate::innodb::codec;
use crate::innodb::schema::{collation_is_latin1, ColumnKind, FieldDef};
use crate::util::hex;

/// A formatted field ready for the row sinks.
#[derive(Debug, Clone, Default)]
pub struct FieldOutput {
    pub is_null: bool,
    /// Numeric outputs are emitted bare in JSONL.
    pub is_numeric: bool,
    pub value: String,
}

impl FieldOutput {
    fn null() -> FieldOutput {
        FieldOutput {
            is_null: true,
            ..Default::default()
        }
    }

    fn numeric(value: String) -> FieldOutput {
        FieldOutput {
            is_null: false,
            is_numeric: true,
            value,
        }
    }

    fn text(value: String) -> FieldOutput {
        FieldOutput {
            is_null: false,
            is_numeric: false,
            value,
        }
    }
}

/// Default timezone applied to TIMESTAMP columns.
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

static PARSER_TZ: OnceLock<Tz> = OnceLock::new();

/// The timezone used for TIMESTAMP localization, resolved once from
/// `IB_PARSER_TZ`, then `TZ`, then the default.
pub fn parser_timezone() -> Tz {
    *PARSER_TZ.get_or_init(|| {
        let name = std::env::var("IB_PARSER_TZ")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var("TZ").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        name.parse().unwrap_or(chrono_tz::America::Sao_Paulo)
    })
}

/// Format a NULL field.
pub fn format_null() -> FieldOutput {
    FieldOutput::null()
}

/// Format the sentinel for an external value that could not be fetched:
/// `<extern:len:hex-prefix>`.
pub fn format_extern_ref(total_len: u64, prefix: &[u8]) -> FieldOutput {
    FieldOutput::text(format!(
        "<extern:{}:{}>",
        total_len,
        hex::encode_upper(&prefix[..prefix.len().min(32)])
    ))
}

/// Format one field's payload bytes. `truncated` appends the marker a
/// capped LOB read leaves behind.
pub fn format_field(field: &FieldDef, data: &[u8], truncated: bool) -> FieldOutput {
    let mut out = match field.kind {
        ColumnKind::Int => FieldOutput::numeric(codec::read_be_int_flipped(data).to_string()),
        ColumnKind::Uint | ColumnKind::Internal => {
            FieldOutput::numeric(codec::read_be_uint(data).to_string())
        }
        ColumnKind::Float => decode_float(data),
        ColumnKind::Double => decode_double(data),
        ColumnKind::Decimal => decode_decimal(data, field.decimal_precision, field.decimal_scale),
        ColumnKind::Date => decode_date(data),
        ColumnKind::Time => decode_time(data, field.time_precision),
        ColumnKind::DateTime => decode_datetime(data, field.time_precision),
        ColumnKind::Timestamp => decode_timestamp(data, field.time_precision),
        ColumnKind::Year => decode_year(data),
        ColumnKind::Enum => decode_enum(data, &field.elements),
        ColumnKind::Set => decode_set(data, &field.elements),
        ColumnKind::Bit => FieldOutput::numeric(codec::read_be_uint(data).to_string()),
        ColumnKind::Char | ColumnKind::Text => decode_string(data, field),
        ColumnKind::Blob | ColumnKind::Bin | ColumnKind::Json | ColumnKind::Geometry => {
            FieldOutput::text(hex::encode_upper(data))
        }
    };
    if truncated {
        out.value.push_str("...(truncated)");
    }
    out
}

fn decode_float(data: &[u8]) -> FieldOutput {
    if data.len() != 4 {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let bits = codec::read_be_uint(data) as u32;
    FieldOutput::numeric(format!("{:.6}", f32::from_bits(bits)))
}

fn decode_double(data: &[u8]) -> FieldOutput {
    if data.len() != 8 {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let bits = codec::read_be_uint(data);
    FieldOutput::numeric(format!("{:.6}", f64::from_bits(bits)))
}

/// 3-byte DATE: sign-flipped packed `year:15 | month:4 | day:5`.
fn decode_date(data: &[u8]) -> FieldOutput {
    if data.len() < 3 {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let raw = codec::read_be_int_flipped(&data[..3]) as u32;
    let day = raw & 31;
    let month = (raw >> 5) & 15;
    let year = raw >> 9;
    FieldOutput::text(format!("{:04}-{:02}-{:02}", year, month, day))
}

fn frac_micros(data: &[u8], base: usize, precision: u32) -> u64 {
    let precision = precision.min(6);
    let frac_bytes = ((precision + 1) / 2) as usize;
    if precision == 0 || data.len() < base + frac_bytes {
        return 0;
    }
    let frac = codec::read_be_uint(&data[base..base + frac_bytes]);
    match precision {
        1 | 2 => frac * 10_000,
        3 | 4 => frac * 100,
        _ => frac,
    }
}

fn push_frac(out: &mut String, micros: u64, precision: u32) {
    if precision > 0 {
        let digits = format!("{:06}", micros);
        out.push('.');
        out.push_str(&digits[..precision.min(6) as usize]);
    }
}

/// TIME2: offset-encoded 3-byte core `hour:10 | minute:6 | second:6`.
fn decode_time(data: &[u8], precision: u32) -> FieldOutput {
    if data.len() < 3 {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let stored = codec::read_be_uint(&data[..3]) as i64;
    let signed = stored - 0x80_0000;
    let negative = signed < 0;
    let abs = signed.unsigned_abs();

    let second = abs & 0x3F;
    let minute = (abs >> 6) & 0x3F;
    let hour = (abs >> 12) & 0x3FF;

    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        hour,
        minute,
        second
    );
    push_frac(&mut out, frac_micros(data, 3, precision), precision);
    FieldOutput::text(out)
}

/// DATETIME2: sign-flipped 5-byte core
/// `year*13+month:17 | day:5 | hour:5 | minute:6 | second:6`.
fn decode_datetime(data: &[u8], precision: u32) -> FieldOutput {
    if data.len() < 5 {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let mut val = codec::read_be_uint(&data[..5]);
    val ^= 1 << 39;

    let second = val & 0x3F;
    let minute = (val >> 6) & 0x3F;
    let hour = (val >> 12) & 0x1F;
    let day = (val >> 17) & 0x1F;
    let year_month = val >> 22;
    let year = year_month / 13;
    let month = year_month % 13;

    let mut out = format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    );
    push_frac(&mut out, frac_micros(data, 5, precision), precision);
    FieldOutput::text(out)
}

/// TIMESTAMP2: 4-byte big-endian UTC seconds, localized.
fn decode_timestamp(data: &[u8], precision: u32) -> FieldOutput {
    if data.len() < 4 {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let secs = codec::read_be_uint(&data[..4]);
    if secs == 0 {
        let mut out = "0000-00-00 00:00:00".to_string();
        push_frac(&mut out, 0, precision);
        return FieldOutput::text(out);
    }

    let tz = parser_timezone();
    let mut out = match tz.timestamp_opt(secs as i64, 0) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        chrono::LocalResult::None => return FieldOutput::text(hex::encode_upper(data)),
    };
    push_frac(&mut out, frac_micros(data, 4, precision), precision);
    FieldOutput::text(out)
}

fn decode_year(data: &[u8]) -> FieldOutput {
    match data.first() {
        Some(0) => FieldOutput::text("0000".to_string()),
        Some(&v) => FieldOutput::numeric((1900 + v as u32).to_string()),
        None => FieldOutput::null(),
    }
}

/// 1-based index into the element list; index 0 is the empty string.
fn decode_enum(data: &[u8], elements: &[String]) -> FieldOutput {
    let idx = match data.len() {
        1 => data[0] as usize,
        2 => codec::read_u16(data, 0) as usize,
        _ => return FieldOutput::text(hex::encode_upper(data)),
    };
    if idx == 0 {
        return FieldOutput::text(String::new());
    }
    match elements.get(idx - 1) {
        Some(name) => FieldOutput::text(name.clone()),
        None => FieldOutput::numeric(idx.to_string()),
    }
}

/// Bitmask over the element list, low bit first.
fn decode_set(data: &[u8], elements: &[String]) -> FieldOutput {
    if data.len() > 8 {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let mask = codec::read_be_uint(data);
    if mask == 0 {
        return FieldOutput::text(String::new());
    }
    if elements.is_empty() {
        return FieldOutput::numeric(mask.to_string());
    }
    let selected: Vec<&str> = elements
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, name)| name.as_str())
        .collect();
    FieldOutput::text(selected.join(","))
}

/// Packed base-10^9 DECIMAL: digit groups of 9 in 4-byte words, leftover
/// digits in 1-4 bytes, sign carried by the flipped top bit (negatives have
/// every byte inverted).
fn decode_decimal(data: &[u8], precision: u32, scale: u32) -> FieldOutput {
    const DIG2BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

    if precision == 0 || scale > precision {
        return FieldOutput::text(hex::encode_upper(data));
    }
    let intg = (precision - scale) as usize;
    let frac = scale as usize;
    let intg_full = intg / 9;
    let intg_left = intg % 9;
    let frac_full = frac / 9;
    let frac_left = frac % 9;
    let expected =
        intg_full * 4 + DIG2BYTES[intg_left] + frac_full * 4 + DIG2BYTES[frac_left];
    if data.len() < expected {
        return FieldOutput::text(hex::encode_upper(data));
    }

    let mut buf = data[..expected].to_vec();
    let negative = buf[0] & 0x80 == 0;
    if negative {
        for b in &mut buf {
            *b ^= 0xFF;
        }
    }
    buf[0] &= 0x7F;

    let mut result = String::new();
    if negative {
        result.push('-');
    }

    let mut pos = 0;
    if intg_left > 0 {
        let bytes = DIG2BYTES[intg_left];
        let val = codec::read_be_uint(&buf[pos..pos + bytes]);
        result.push_str(&val.to_string());
        pos += bytes;
    }
    for i in 0..intg_full {
        let val = codec::read_be_uint(&buf[pos..pos + 4]);
        if i == 0 && intg_left == 0 {
            result.push_str(&val.to_string());
        } else {
            result.push_str(&format!("{:09}", val));
        }
        pos += 4;
    }
    if intg == 0 {
        result.push('0');
    }

    if frac > 0 {
        result.push('.');
        for _ in 0..frac_full {
            let val = codec::read_be_uint(&buf[pos..pos + 4]);
            result.push_str(&format!("{:09}", val));
            pos += 4;
        }
        if frac_left > 0 {
            let bytes = DIG2BYTES[frac_left];
            let val = codec::read_be_uint(&buf[pos..pos + bytes]);
            result.push_str(&format!("{:0width$}", val, width = frac_left));
        }
    }

    FieldOutput::numeric(result)
}

/// CHAR/VARCHAR: transcode under the collation, trim CHAR padding, escape
/// control bytes as `\xNN`.
fn decode_string(data: &[u8], field: &FieldDef) -> FieldOutput {
    let trimmed = if field.kind == ColumnKind::Char && !field.is_variable() {
        trim_trailing_spaces(data)
    } else {
        data
    };
    let text = if collation_is_latin1(field.collation_id) {
        latin1_to_utf8(trimmed)
    } else {
        String::from_utf8_lossy(trimmed).into_owned()
    };
    FieldOutput::text(escape_controls(&text))
}

fn trim_trailing_spaces(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && data[end - 1] == 0x20 {
        end -= 1;
    }
    &data[..end]
}

/// latin1 maps byte-for-byte onto the first 256 code points.
pub fn latin1_to_utf8(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

fn escape_controls(text: &str) -> String {
    if !text.chars().any(|c| (c as u32) < 0x20 || c == '\x7f') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if (c as u32) < 0x20 || c == '\x7f' {
            out.push_str(&format!("\\x{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::schema::FieldDef;

    fn field(kind: ColumnKind) -> FieldDef {
        FieldDef {
            name: "f".into(),
            kind,
            nullable: false,
            fixed_len: 4,
            min_len: 4,
            max_len: 4,
            decimal_precision: 0,
            decimal_scale: 0,
            time_precision: 0,
            elements: vec![],
            collation_id: 8,
        }
    }

    #[test]
    fn int_decoding() {
        let f = field(ColumnKind::Int);
        assert_eq!(format_field(&f, &[0x80, 0, 0, 0x2A], false).value, "42");
        assert_eq!(format_field(&f, &[0x7F, 0xFF, 0xFF, 0xFF], false).value, "-1");
        let out = format_field(&f, &[0x80, 0, 0, 0], false);
        assert_eq!(out.value, "0");
        assert!(out.is_numeric);
    }

    #[test]
    fn uint_decoding() {
        let f = field(ColumnKind::Uint);
        // unsigned 255 in one byte is stored as 0x7F after the sign flip
        assert_eq!(format_field(&f, &[0x80, 0, 0, 1], false).value, "2147483649");
        let g = field(ColumnKind::Internal);
        assert_eq!(format_field(&g, &[0, 0, 0, 0, 0, 9], false).value, "9");
    }

    #[test]
    fn float_double_bits() {
        let f = field(ColumnKind::Float);
        let bits = 1.5f32.to_bits().to_be_bytes();
        assert_eq!(format_field(&f, &bits, false).value, "1.500000");

        let d = field(ColumnKind::Double);
        let bits = (-2.25f64).to_bits().to_be_bytes();
        assert_eq!(format_field(&d, &bits, false).value, "-2.250000");
    }

    #[test]
    fn date_decoding() {
        // 2024-03-07: raw = 2024<<9 | 3<<5 | 7, stored sign-flipped
        let raw: i64 = (2024 << 9) | (3 << 5) | 7;
        let mut bytes = [0u8; 3];
        codec::write_be_int_flipped(&mut bytes, raw);
        let f = field(ColumnKind::Date);
        assert_eq!(format_field(&f, &bytes, false).value, "2024-03-07");
    }

    #[test]
    fn time_decoding() {
        let mut f = field(ColumnKind::Time);
        f.time_precision = 0;
        // 12:30:45 -> (12<<12 | 30<<6 | 45) + 0x800000
        let stored: u32 = ((12 << 12) | (30 << 6) | 45) + 0x80_0000;
        let bytes = [(stored >> 16) as u8, (stored >> 8) as u8, stored as u8];
        assert_eq!(format_field(&f, &bytes, false).value, "12:30:45");
    }

    #[test]
    fn datetime_decoding_with_fraction() {
        let mut f = field(ColumnKind::DateTime);
        f.time_precision = 3;
        // 2023-06-15 08:09:10
        let ym: u64 = 2023 * 13 + 6;
        let packed: u64 = (ym << 22) | (15 << 17) | (8 << 12) | (9 << 6) | 10;
        let stored = packed ^ (1 << 39);
        let mut bytes = vec![0u8; 7];
        for i in 0..5 {
            bytes[i] = (stored >> (8 * (4 - i))) as u8;
        }
        // fractional 123 ms = stored value 1230 in 2 bytes (precision 3 -> *100)
        codec::write_u16(&mut bytes, 5, 1230);
        assert_eq!(
            format_field(&f, &bytes, false).value,
            "2023-06-15 08:09:10.123"
        );
    }

    #[test]
    fn timestamp_zero() {
        let f = field(ColumnKind::Timestamp);
        assert_eq!(
            format_field(&f, &[0, 0, 0, 0], false).value,
            "0000-00-00 00:00:00"
        );
    }

    #[test]
    fn timestamp_localized() {
        // 2021-01-01 00:00:00 UTC; Sao Paulo is UTC-3 with no DST then.
        let f = field(ColumnKind::Timestamp);
        let secs: u32 = 1609459200;
        let out = format_field(&f, &secs.to_be_bytes(), false);
        // Only assert the shape and day: the configured TZ decides the hour.
        assert!(out.value.starts_with("2020-12-31") || out.value.starts_with("2021-01-01"));
    }

    #[test]
    fn year_decoding() {
        let f = field(ColumnKind::Year);
        assert_eq!(format_field(&f, &[126], false).value, "2026");
        assert_eq!(format_field(&f, &[0], false).value, "0000");
    }

    #[test]
    fn decimal_decoding() {
        let mut f = field(ColumnKind::Decimal);
        f.decimal_precision = 10;
        f.decimal_scale = 2;
        assert_eq!(
            format_field(&f, &[0x80, 0x00, 0x30, 0x39, 0x43], false).value,
            "12345.67"
        );
        f.decimal_precision = 5;
        assert_eq!(format_field(&f, &[0x80, 0x00, 0x00], false).value, "0.00");
        assert_eq!(format_field(&f, &[0x7F, 0xFE, 0xE8], false).value, "-1.23");

        f.decimal_precision = 20;
        f.decimal_scale = 4;
        assert_eq!(
            format_field(
                &f,
                &[0x80, 0x00, 0x00, 0x01, 0x0D, 0xFB, 0x38, 0xD2, 0x04, 0xD2],
                false
            )
            .value,
            "1234567890.1234"
        );
    }

    #[test]
    fn enum_and_set() {
        let mut f = field(ColumnKind::Enum);
        f.elements = vec!["red".into(), "green".into(), "blue".into()];
        assert_eq!(format_field(&f, &[2], false).value, "green");
        assert_eq!(format_field(&f, &[0], false).value, "");

        let mut s = field(ColumnKind::Set);
        s.elements = vec!["read".into(), "write".into(), "execute".into()];
        assert_eq!(format_field(&s, &[0x05], false).value, "read,execute");
        assert_eq!(format_field(&s, &[0x00], false).value, "");
    }

    #[test]
    fn bit_decoding() {
        let f = field(ColumnKind::Bit);
        assert_eq!(format_field(&f, &[0x01, 0x02], false).value, "258");
    }

    #[test]
    fn string_decoding() {
        let mut f = field(ColumnKind::Char);
        f.fixed_len = 10;
        assert_eq!(format_field(&f, b"hi        ", false).value, "hi");

        f.fixed_len = 0; // VARCHAR keeps spaces
        assert_eq!(format_field(&f, b"hi ", false).value, "hi ");

        // latin1 transcoding: 0xE9 is é
        f.collation_id = 8;
        assert_eq!(format_field(&f, &[0x63, 0x61, 0x66, 0xE9], false).value, "café");

        // control byte escaping
        assert_eq!(format_field(&f, b"a\x01b", false).value, "a\\x01b");
    }

    #[test]
    fn blob_hex_and_truncation() {
        let f = field(ColumnKind::Blob);
        assert_eq!(format_field(&f, &[0xDE, 0xAD], false).value, "DEAD");
        assert_eq!(
            format_field(&f, &[0xDE, 0xAD], true).value,
            "DEAD...(truncated)"
        );
    }

    #[test]
    fn extern_sentinel() {
        let out = format_extern_ref(32000, &[0xAB, 0xCD]);
        assert_eq!(out.value, "<extern:32000:ABCD>");
    }
}
