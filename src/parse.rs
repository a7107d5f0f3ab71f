//! Delimiters and CSV record decoding.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::str::FromStr;

use csv::ByteRecord;
use serde::Deserialize;

use crate::encoding::{self, Encoding};

/// Field delimiter. Always a single ASCII byte, so it can be matched on raw
/// bytes in any supported encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Delimiter {
    #[default]
    Comma,
    Tab,
    Semicolon,
    Pipe,
}

impl Delimiter {
    pub const ALL: [Delimiter; 4] = [
        Delimiter::Comma,
        Delimiter::Tab,
        Delimiter::Semicolon,
        Delimiter::Pipe,
    ];

    pub fn byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Semicolon => b';',
            Delimiter::Pipe => b'|',
        }
    }

    pub fn char(self) -> char {
        self.byte() as char
    }

    /// Delimiter implied by a file extension, if any.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "tsv" | "tab" => Some(Delimiter::Tab),
            "psv" => Some(Delimiter::Pipe),
            _ => None,
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Tab => f.write_str("tab"),
            other => write!(f, "'{}'", other.char()),
        }
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "," | "comma" => Ok(Delimiter::Comma),
            "\t" | "\\t" | "tab" => Ok(Delimiter::Tab),
            ";" | "semicolon" => Ok(Delimiter::Semicolon),
            "|" | "pipe" => Ok(Delimiter::Pipe),
            other => Err(format!(
                "unsupported delimiter '{other}' (expected ',', tab, ';' or '|')"
            )),
        }
    }
}

impl TryFrom<String> for Delimiter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Pick the candidate delimiter that occurs most often outside quotes in
/// `line`. Ties and an empty count resolve to comma.
pub fn detect_delimiter(line: &[u8]) -> Delimiter {
    let mut counts = [0usize; Delimiter::ALL.len()];
    let mut in_quotes = false;
    for &b in line {
        if b == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(i) = Delimiter::ALL.iter().position(|d| d.byte() == b) {
            counts[i] += 1;
        }
    }
    let mut best = Delimiter::Comma;
    let mut best_count = counts[0];
    for (d, &n) in Delimiter::ALL.iter().zip(&counts).skip(1) {
        if n > best_count {
            best = *d;
            best_count = n;
        }
    }
    best
}

/// CSV reader settings shared by indexing and ranged reads.
///
/// Records may have any number of fields. A quote only opens a quoted field
/// at the start of a field; elsewhere it is literal text. Blank lines are not
/// records.
pub fn reader_builder(delimiter: Delimiter, buffer: usize) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(delimiter.byte())
        .has_headers(false)
        .flexible(true)
        .buffer_capacity(buffer);
    builder
}

/// Wrap `source` in a CSV reader positioned at byte `offset`.
///
/// The reader is placed with a raw seek, so it never treats the record at
/// `offset` as a header and never strips a byte-order mark on its own.
pub fn reader_at<R: Read + Seek>(
    source: R,
    delimiter: Delimiter,
    offset: u64,
    buffer: usize,
) -> csv::Result<csv::Reader<R>> {
    let mut reader = reader_builder(delimiter, buffer).from_reader(source);
    let mut pos = csv::Position::new();
    pos.set_byte(offset);
    reader.seek_raw(SeekFrom::Start(offset), pos)?;
    Ok(reader)
}

/// Decode every field of a raw record.
///
/// Returns the fields and whether any of them needed replacement characters.
/// With `strip_bom`, a UTF-8 byte-order mark is removed from the first field.
pub fn decode_record(record: &ByteRecord, enc: Encoding, strip_bom: bool) -> (Vec<String>, bool) {
    let mut lossy = false;
    let fields: Vec<String> = record
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let raw = if strip_bom && i == 0 {
                encoding::strip_bom(raw)
            } else {
                raw
            };
            let decoded = encoding::decode(raw, enc);
            lossy |= decoded.lossy;
            decoded.text.into_owned()
        })
        .collect();
    (fields, lossy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn records(data: &[u8], delimiter: Delimiter) -> Vec<Vec<String>> {
        let mut reader = reader_at(Cursor::new(data), delimiter, 0, 64).unwrap();
        let mut record = ByteRecord::new();
        let mut out = Vec::new();
        while reader.read_byte_record(&mut record).unwrap() {
            out.push(decode_record(&record, Encoding::Utf8, false).0);
        }
        out
    }

    fn split(line: &str) -> Vec<String> {
        records(line.as_bytes(), Delimiter::Comma)
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    #[test]
    fn test_plain_fields() {
        assert_eq!(split("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_quoted_delimiter_and_escaped_quote() {
        assert_eq!(split(r#""a,b","c""d",e"#), vec!["a,b", "c\"d", "e"]);
    }

    #[test]
    fn test_empty_fields() {
        assert_eq!(split(",,"), vec!["", "", ""]);
        assert_eq!(split(r#"a,"",b"#), vec!["a", "", "b"]);
    }

    #[test]
    fn test_quoted_newline_stays_in_record() {
        let got = records(b"a,\"x\ny\"\nnext\n", Delimiter::Comma);
        assert_eq!(got, vec![vec!["a", "x\ny"], vec!["next"]]);
    }

    #[test]
    fn test_mid_field_quote_is_literal() {
        let got = records(b"ruler,12\" long\npen,5\npad,7\n", Delimiter::Comma);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], vec!["ruler", "12\" long"]);
        assert_eq!(got[2], vec!["pad", "7"]);
    }

    #[test]
    fn test_other_delimiters() {
        assert_eq!(records(b"a\tb,c", Delimiter::Tab), vec![vec!["a", "b,c"]]);
        assert_eq!(records(b"a|b", Delimiter::Pipe), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_multibyte_content() {
        assert_eq!(split("名前,\"東京,大阪\""), vec!["名前", "東京,大阪"]);
    }

    #[test]
    fn test_crlf_and_ragged_records() {
        let got = records(b"a,b\r\n1\r\n2,3,4", Delimiter::Comma);
        assert_eq!(got, vec![vec!["a", "b"], vec!["1"], vec!["2", "3", "4"]]);
    }

    #[test]
    fn test_reader_starts_at_offset() {
        let data = b"h\n1,a\n2,b\n";
        let mut reader = reader_at(Cursor::new(&data[..]), Delimiter::Comma, 6, 64).unwrap();
        assert_eq!(reader.position().byte(), 6);
        let mut record = ByteRecord::new();
        assert!(reader.read_byte_record(&mut record).unwrap());
        assert_eq!(decode_record(&record, Encoding::Utf8, false).0, vec!["2", "b"]);
    }

    #[test]
    fn test_decode_record_strips_bom_and_flags_lossy() {
        let record = ByteRecord::from(vec![&b"\xEF\xBB\xBFid"[..], &b"ok\xFF"[..]]);
        let (fields, lossy) = decode_record(&record, Encoding::Utf8, true);
        assert_eq!(fields, vec!["id", "ok\u{FFFD}"]);
        assert!(lossy);
        let (fields, _) = decode_record(&record, Encoding::Utf8, false);
        assert_eq!(fields[0], "\u{FEFF}id");
    }

    #[test]
    fn test_detects_delimiter() {
        assert_eq!(detect_delimiter(b"a\tb\tc"), Delimiter::Tab);
        assert_eq!(detect_delimiter(b"a;b;c,d"), Delimiter::Semicolon);
        assert_eq!(detect_delimiter(b"single"), Delimiter::Comma);
        assert_eq!(detect_delimiter(b"\"a;b;c\",d"), Delimiter::Comma);
        assert_eq!(detect_delimiter(b"a|b,c"), Delimiter::Comma);
    }

    #[test]
    fn test_parse_delimiter_names() {
        assert_eq!("tab".parse::<Delimiter>(), Ok(Delimiter::Tab));
        assert_eq!("|".parse::<Delimiter>(), Ok(Delimiter::Pipe));
        assert!("::".parse::<Delimiter>().is_err());
    }
}
