//! Row output sinks for extract mode.
//!
//! Three stream formats share one writer: pipe-separated (default), RFC 4180
//! CSV, and JSONL with bare numbers for numeric columns. With metadata
//! enabled, `(page_no, rec_offset, rec_deleted)` prefix the data columns.
//! Internal columns (DB_TRX_ID and friends) only appear in debug runs.

use std::io::Write;

use crate::innodb::field_decode::FieldOutput;
use crate::IbxError;

/// Output stream format of extract mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFormat {
    #[default]
    Pipe,
    Csv,
    Jsonl,
}

impl RowFormat {
    pub fn parse(name: &str) -> Option<RowFormat> {
        match name {
            "pipe" => Some(RowFormat::Pipe),
            "csv" => Some(RowFormat::Csv),
            "jsonl" => Some(RowFormat::Jsonl),
            _ => None,
        }
    }
}

/// Per-record location metadata emitted with `--with-meta`.
#[derive(Debug, Clone, Copy)]
pub struct RowMeta {
    pub page_no: u64,
    pub rec_offset: usize,
    pub deleted: bool,
}

/// One output column: the field name, whether it is engine-internal, and
/// its formatted value.
pub struct OutputColumn<'a> {
    pub name: &'a str,
    pub internal: bool,
    pub value: FieldOutput,
}

/// Streaming row writer; prints the header once for the line formats.
pub struct RowWriter<W: Write> {
    out: W,
    format: RowFormat,
    include_meta: bool,
    show_internal: bool,
    header_written: bool,
}

impl<W: Write> RowWriter<W> {
    pub fn new(out: W, format: RowFormat, include_meta: bool, show_internal: bool) -> Self {
        RowWriter {
            out,
            format,
            include_meta,
            show_internal,
            header_written: false,
        }
    }

    fn io(e: std::io::Error) -> IbxError {
        IbxError::Io(format!("row output: {}", e))
    }

    fn sep(&self) -> char {
        if self.format == RowFormat::Csv {
            ','
        } else {
            '|'
        }
    }

    /// Emit one record. The header line (pipe/CSV) is written lazily before
    /// the first record so the column set matches what actually prints.
    pub fn write_row(
        &mut self,
        columns: &[OutputColumn<'_>],
        meta: Option<&RowMeta>,
    ) -> Result<(), IbxError> {
        if self.format == RowFormat::Jsonl {
            return self.write_jsonl(columns, meta);
        }

        if !self.header_written {
            self.write_header(columns)?;
            self.header_written = true;
        }

        let sep = self.sep();
        let mut printed = 0;
        if self.include_meta {
            if let Some(meta) = meta {
                write!(
                    self.out,
                    "{}{}{}{}{}",
                    meta.page_no, sep, meta.rec_offset, sep, meta.deleted
                )
                .map_err(Self::io)?;
                printed = 3;
            }
        }

        for col in columns {
            if col.internal && !self.show_internal {
                continue;
            }
            if printed > 0 {
                write!(self.out, "{}", sep).map_err(Self::io)?;
            }
            if col.value.is_null {
                write!(self.out, "NULL").map_err(Self::io)?;
            } else if self.format == RowFormat::Csv {
                write!(self.out, "{}", csv_quote(&col.value.value)).map_err(Self::io)?;
            } else {
                write!(self.out, "{}", col.value.value).map_err(Self::io)?;
            }
            printed += 1;
        }
        writeln!(self.out).map_err(Self::io)
    }

    fn write_header(&mut self, columns: &[OutputColumn<'_>]) -> Result<(), IbxError> {
        let sep = self.sep();
        let mut printed = 0;
        if self.include_meta {
            write!(self.out, "page_no{}rec_offset{}rec_deleted", sep, sep).map_err(Self::io)?;
            printed = 3;
        }
        for col in columns {
            if col.internal && !self.show_internal {
                continue;
            }
            if printed > 0 {
                write!(self.out, "{}", sep).map_err(Self::io)?;
            }
            write!(self.out, "{}", col.name).map_err(Self::io)?;
            printed += 1;
        }
        writeln!(self.out).map_err(Self::io)
    }

    fn write_jsonl(
        &mut self,
        columns: &[OutputColumn<'_>],
        meta: Option<&RowMeta>,
    ) -> Result<(), IbxError> {
        let mut first = true;
        write!(self.out, "{{").map_err(Self::io)?;
        if self.include_meta {
            if let Some(meta) = meta {
                write!(
                    self.out,
                    "\"page_no\":{},\"rec_offset\":{},\"rec_deleted\":{}",
                    meta.page_no, meta.rec_offset, meta.deleted
                )
                .map_err(Self::io)?;
                first = false;
            }
        }
        for col in columns {
            if col.internal && !self.show_internal {
                continue;
            }
            if !first {
                write!(self.out, ",").map_err(Self::io)?;
            }
            write!(self.out, "{}:", json_string(col.name)).map_err(Self::io)?;
            if col.value.is_null {
                write!(self.out, "null").map_err(Self::io)?;
            } else if col.value.is_numeric {
                write!(self.out, "{}", col.value.value).map_err(Self::io)?;
            } else {
                write!(self.out, "{}", json_string(&col.value.value)).map_err(Self::io)?;
            }
            first = false;
        }
        writeln!(self.out, "}}").map_err(Self::io)
    }

    pub fn flush(&mut self) -> Result<(), IbxError> {
        self.out.flush().map_err(Self::io)
    }
}

/// RFC 4180: quote iff the field contains a comma, quote, CR, or LF, and
/// double any embedded quotes.
fn csv_quote(value: &str) -> String {
    if !value.contains([',', '"', '\r', '\n']) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// JSON string literal with `\uNNNN` escapes for sub-0x20 bytes.
fn json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
