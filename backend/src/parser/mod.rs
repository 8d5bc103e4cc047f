//! Sheet reading: CSV with encoding and delimiter auto-detection, and
//! spreadsheet workbooks (see [`workbook`]).
//!
//! CSV cells are kept as text. Type interpretation belongs to the mapping
//! rules, not to the reader.

pub mod workbook;

pub use workbook::{read_workbook, read_workbook_bytes, Sheet, Workbook};

use crate::error::{SheetError, SheetResult};
use crate::models::CellValue;

/// Sheet name given to the single sheet of a CSV file.
pub const CSV_SHEET_NAME: &str = "Sheet1";

/// Candidate delimiters, in tie-break order.
const DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// Raw CSV content with detection metadata.
#[derive(Debug, Clone)]
pub struct CsvGrid {
    /// Raw rows, header row included.
    pub rows: Vec<Vec<CellValue>>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "utf-8-sig" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the given encoding.
///
/// Unknown encodings go through `encoding_rs` label lookup, then fall back to
/// lossy UTF-8. A leading byte order mark is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> SheetResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => {
                let (text, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    return Err(SheetError::Encoding(format!(
                        "content is not valid {}",
                        enc.name()
                    )));
                }
                text.into_owned()
            }
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    Ok(match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    })
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Defaults to `,` when no candidate appears.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text into raw rows with an explicit delimiter.
///
/// Quoted fields may contain delimiters and line breaks. Rows may have any
/// number of fields. Empty lines between records come back as empty rows so
/// row positions match the file.
pub fn parse_csv(content: &str, delimiter: char) -> SheetResult<Vec<Vec<CellValue>>> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| SheetError::Csv(format!("unsupported delimiter '{}'", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let bytes = content.as_bytes();
    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let (false, Some(pos)) = (rows.is_empty(), record.position()) {
            let blanks = blank_lines_before(bytes, pos.byte() as usize);
            rows.extend(std::iter::repeat_with(Vec::new).take(blanks));
        }
        rows.push(record.iter().map(CellValue::from).collect());
    }
    Ok(rows)
}

/// Empty lines between the previous record and the record read from `start`.
///
/// The reader skips empty lines, so the terminators between two records form
/// one run of `\r`/`\n` bytes; every line break past the first is a blank line.
fn blank_lines_before(bytes: &[u8], start: usize) -> usize {
    let is_break = |b: &&u8| **b == b'\r' || **b == b'\n';
    let start = start.min(bytes.len());
    let data_start = start + bytes[start..].iter().take_while(is_break).count();
    let run_start = data_start - bytes[..data_start].iter().rev().take_while(is_break).count();

    let run = &bytes[run_start..data_start];
    let mut breaks: usize = 0;
    let mut i = 0;
    while i < run.len() {
        // CRLF is one break
        i += if run[i] == b'\r' && run.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
        breaks += 1;
    }
    breaks.saturating_sub(1)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_csv_bytes(bytes: &[u8]) -> SheetResult<CsvGrid> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let rows = parse_csv(&content, delimiter)?;

    Ok(CsvGrid {
        rows,
        encoding,
        delimiter,
    })
}

/// Display form of a delimiter
pub fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_simple_csv() {
        let rows = parse_csv("name;age\nAlice;30\nBob;25", ';').unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![text("name"), text("age")]);
        assert_eq!(rows[1], vec![text("Alice"), text("30")]);
    }

    #[test]
    fn test_quoted_values() {
        let csv = "name,note\n\"Doe, Jane\",\"line one\nline two\"";
        let rows = parse_csv(csv, ',').unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], text("Doe, Jane"));
        assert_eq!(rows[1][1], text("line one\nline two"));
    }

    #[test]
    fn test_ragged_rows() {
        let rows = parse_csv("a;b;c\n1;;3\n4\n5;6;7;8", ';').unwrap();

        assert_eq!(rows[1], vec![text("1"), text(""), text("3")]);
        assert_eq!(rows[2].len(), 1);
        assert_eq!(rows[3].len(), 4);
    }

    #[test]
    fn test_empty_lines_keep_their_position() {
        let rows = parse_csv("n\nr1\n\nr3\n\n\nr6\n\n", ',').unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[1], vec![text("r1")]);
        assert!(rows[2].is_empty());
        assert_eq!(rows[3], vec![text("r3")]);
        assert!(rows[4].is_empty() && rows[5].is_empty());
        assert_eq!(rows[6], vec![text("r6")]);

        let rows = parse_csv("n\r\nr1\r\n\r\nr3\r\n", ',').unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[2].is_empty());
        assert_eq!(rows[3], vec![text("r3")]);
    }

    #[test]
    fn test_quoted_line_breaks_are_not_blank_rows() {
        let rows = parse_csv("a,b\n\"x\n\ny\",2\n3,4", ',').unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][0], text("x\n\ny"));
        assert_eq!(rows[2], vec![text("3"), text("4")]);
    }

    #[test]
    fn test_leading_empty_lines_are_skipped() {
        let rows = parse_csv("\n\na,b\n1,2", ',').unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![text("a"), text("b")]);
    }

    #[test]
    fn test_cells_are_not_trimmed() {
        let rows = parse_csv("a,b\n x , y", ',').unwrap();
        assert_eq!(rows[1], vec![text(" x "), text(" y")]);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let grid = parse_csv_bytes("name;age\nAlice;30\nBob;25".as_bytes()).unwrap();

        assert_eq!(grid.delimiter, ';');
        assert_eq!(grid.encoding, "utf-8");
        assert_eq!(grid.rows.len(), 3);
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"id,name\n1,x");
        let content = decode_content(&bytes, "utf-8").unwrap();
        assert!(content.starts_with("id,"));
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_format_delimiter() {
        assert_eq!(format_delimiter('\t'), "TAB");
        assert_eq!(format_delimiter(';'), ";");
    }
}
