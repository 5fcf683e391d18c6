//! Text field extraction
//!
//! Turns one raw record (a line of the input) into the free-text field the
//! aggregator tokenizes. Failures here are record-level: the caller skips the
//! record and moves on.

use super::RecordFormat;
use thiserror::Error;

/// Number of leading comma-separated fields before the tweet JSON
const TWITTER_CSV_SKIP_FIELDS: usize = 6;

/// Marker preceding the text value inside the CSV-escaped JSON blob
const TWITTER_TEXT_KEY: &str = "\"\"text\"\":\"\"";

/// Terminator of the text value (end of value, start of next key)
const TWITTER_TEXT_END: &str = "\"\",\"\"";

/// A single record could not be turned into text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordParseError {
    #[error("record is not valid UTF-8")]
    InvalidUtf8,

    #[error("expected at least {expected} comma-separated fields, found {found}")]
    MissingFields { expected: usize, found: usize },

    #[error("text field not found in record")]
    MissingText,
}

/// Extract the text field of `raw` according to `format`
pub fn extract_text(format: RecordFormat, raw: &[u8]) -> Result<&str, RecordParseError> {
    let line = std::str::from_utf8(raw).map_err(|_| RecordParseError::InvalidUtf8)?;

    match format {
        RecordFormat::Plain => Ok(line),
        RecordFormat::TwitterCsv => extract_twitter_csv(line),
    }
}

fn extract_twitter_csv(line: &str) -> Result<&str, RecordParseError> {
    let mut fields = line.splitn(TWITTER_CSV_SKIP_FIELDS + 1, ',');
    let mut found = 0;
    for _ in 0..TWITTER_CSV_SKIP_FIELDS {
        if fields.next().is_none() {
            break;
        }
        found += 1;
    }

    let rest = match fields.next() {
        Some(rest) => rest,
        None => {
            return Err(RecordParseError::MissingFields {
                expected: TWITTER_CSV_SKIP_FIELDS + 1,
                found,
            })
        }
    };

    let start = rest
        .find(TWITTER_TEXT_KEY)
        .ok_or(RecordParseError::MissingText)?
        + TWITTER_TEXT_KEY.len();
    let value = &rest[start..];
    let end = value.find(TWITTER_TEXT_END).unwrap_or(value.len());

    Ok(&value[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"1,2,3,4,5,6,"{""id"":""42"",""text"":""Listening to @kanye #yeezy"",""lang"":""en""}""#;

    #[test]
    fn test_plain_returns_line() {
        assert_eq!(extract_text(RecordFormat::Plain, b"hello world"), Ok("hello world"));
    }

    #[test]
    fn test_twitter_csv_extracts_text() {
        let text = extract_text(RecordFormat::TwitterCsv, SAMPLE.as_bytes()).unwrap();
        assert_eq!(text, "Listening to @kanye #yeezy");
    }

    #[test]
    fn test_twitter_csv_text_until_end_of_line() {
        let line = r#"a,b,c,d,e,f,{""text"":""last field"#;
        assert_eq!(extract_text(RecordFormat::TwitterCsv, line.as_bytes()), Ok("last field"));
    }

    #[test]
    fn test_twitter_csv_too_few_fields() {
        let err = extract_text(RecordFormat::TwitterCsv, b"a,b,c").unwrap_err();
        assert_eq!(err, RecordParseError::MissingFields { expected: 7, found: 3 });
    }

    #[test]
    fn test_twitter_csv_missing_text() {
        let err = extract_text(RecordFormat::TwitterCsv, b"1,2,3,4,5,6,{\"\"id\"\":1}").unwrap_err();
        assert_eq!(err, RecordParseError::MissingText);
    }

    #[test]
    fn test_invalid_utf8() {
        let err = extract_text(RecordFormat::Plain, &[0x66, 0xff, 0x66]).unwrap_err();
        assert_eq!(err, RecordParseError::InvalidUtf8);
    }
}
