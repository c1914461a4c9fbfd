//! Source format detection from file signature, extension and content.

use super::SourceSpec;
use crate::config::EngineSettings;
use crate::error::{Result, ResultExt as _, WrangleError};
use std::io::Read as _;
use std::path::Path;

const CANDIDATE_DELIMITERS: [char; 4] = [',', '\t', ';', '|'];
const SNIFF_LINES: usize = 20;

// Binary formats we recognise only to reject them with a useful message.
const SIGNATURES: [(&[u8], &str); 5] = [
    (b"PAR1", "Parquet"),
    (b"PK\x03\x04", "ZIP/XLSX"),
    (b"\x1f\x8b", "gzip"),
    (b"%PDF", "PDF"),
    (b"SQLite format 3", "SQLite"),
];

/// Detect how to read `path`.
///
/// # Errors
///
/// `Io` when the file cannot be read; `UnrecognizedFormat` for binary
/// content, non-UTF-8 text, or text in which no delimiter or JSON object
/// structure is found.
pub fn detect_format(path: &Path, settings: &EngineSettings) -> Result<SourceSpec> {
    let head = read_head(path, settings.sniff_bytes)?;
    let text = sniff_text(path, &head)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let delimited = |delimiter: char| SourceSpec::Delimited {
        path: path.to_path_buf(),
        delimiter,
        has_header: true,
    };

    match extension.as_deref() {
        Some("csv") => return Ok(delimited(sniff_delimiter(text).unwrap_or(','))),
        Some("tsv" | "tab") => return Ok(delimited('\t')),
        Some("jsonl" | "ndjson") => {
            return Ok(SourceSpec::JsonLines {
                path: path.to_path_buf(),
            });
        }
        _ => {}
    }

    let first = text.trim_start();
    if first.starts_with('{') {
        return Ok(SourceSpec::JsonLines {
            path: path.to_path_buf(),
        });
    }
    if first.starts_with('[') {
        return Err(WrangleError::UnrecognizedFormat(format!(
            "{}: JSON arrays are not supported, expected one object per line",
            path.display()
        )));
    }

    sniff_delimiter(text).map(delimited).ok_or_else(|| {
        WrangleError::UnrecognizedFormat(format!(
            "{}: no consistent delimiter found in the first lines",
            path.display()
        ))
    })
}

/// Delimiter of a delimited file, if the content shows one.
///
/// # Errors
///
/// `Io` when the head of the file cannot be read.
pub fn sniff_delimiter_in_file(path: &Path, settings: &EngineSettings) -> Result<Option<char>> {
    let head = read_head(path, settings.sniff_bytes)?;
    Ok(sniff_delimiter(sniff_text(path, &head)?))
}

fn read_head(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open source {}", path.display()))?;
    let mut head = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64)
        .read_to_end(&mut head)
        .with_context(|| format!("Failed to read source {}", path.display()))?;
    Ok(head)
}

fn sniff_text<'a>(path: &Path, head: &'a [u8]) -> Result<&'a str> {
    if let Some((_, name)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return Err(WrangleError::UnrecognizedFormat(format!(
            "{}: {name} files are not supported",
            path.display()
        )));
    }
    if head.contains(&0) {
        return Err(WrangleError::UnrecognizedFormat(format!(
            "{}: binary content",
            path.display()
        )));
    }
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    match std::str::from_utf8(head) {
        Ok(text) => Ok(text),
        // A multi-byte character cut at the end of the sniffed block
        Err(e) if e.error_len().is_none() => {
            Ok(std::str::from_utf8(head.get(..e.valid_up_to()).unwrap_or_default()).unwrap_or(""))
        }
        Err(_) => Err(WrangleError::UnrecognizedFormat(format!(
            "{}: content is not UTF-8 text",
            path.display()
        ))),
    }
}

/// Candidate with the same non-zero count on every sniffed line; the highest
/// count wins, earlier candidates win ties.
pub(crate) fn sniff_delimiter(text: &str) -> Option<char> {
    let mut lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES + 1)
        .collect();
    // The last line may be cut off by the sniff limit
    if lines.len() > SNIFF_LINES {
        lines.pop();
    }
    let first = lines.first()?;

    let mut best: Option<(char, usize)> = None;
    for delimiter in CANDIDATE_DELIMITERS {
        let count = first.matches(delimiter).count();
        if count == 0 || !lines.iter().all(|l| l.matches(delimiter).count() == count) {
            continue;
        }
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((delimiter, count));
        }
    }
    best.map(|(d, _)| d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), Some(';'));
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), Some('\t'));
        assert_eq!(sniff_delimiter("a,b\n1,2,3\n"), None);
        assert_eq!(sniff_delimiter("just text\n"), None);
    }

    #[test]
    fn test_detect_by_extension_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings::default();

        let csv = write(&dir, "trips.csv", b"vendor,distance\nVTS,1.5\n");
        assert!(matches!(
            detect_format(&csv, &settings).unwrap(),
            SourceSpec::Delimited { delimiter: ',', .. }
        ));

        let piped = write(&dir, "trips.txt", b"vendor|distance\nVTS|1.5\n");
        assert!(matches!(
            detect_format(&piped, &settings).unwrap(),
            SourceSpec::Delimited { delimiter: '|', .. }
        ));

        let json = write(&dir, "trips.log", b"{\"vendor\": \"VTS\"}\n");
        assert!(matches!(
            detect_format(&json, &settings).unwrap(),
            SourceSpec::JsonLines { .. }
        ));
    }

    #[test]
    fn test_binary_and_unknown_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings::default();

        let parquet = write(&dir, "trips.csv", b"PAR1\x00\x00\x00");
        assert!(matches!(
            detect_format(&parquet, &settings),
            Err(WrangleError::UnrecognizedFormat(_))
        ));

        let prose = write(&dir, "notes.txt", b"hello there\nno structure here\n");
        assert!(matches!(
            detect_format(&prose, &settings),
            Err(WrangleError::UnrecognizedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let settings = EngineSettings::default();
        let result = detect_format(Path::new("/nonexistent/trips.csv"), &settings);
        assert!(matches!(result, Err(WrangleError::Io(_))));
    }
}
