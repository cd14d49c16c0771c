use std::path::Path;

use thiserror::Error;

use crate::durations::{DurationError, Durations};

/// Segment file extensions picked up when scanning directories.
pub const SEGMENT_EXTENSIONS: &[&str] = &["json", "txt", "csv"];

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Line {line}: invalid weight '{token}'")]
    Weight { line: usize, token: String },
    #[error("Line {line}: {source}")]
    Durations {
        line: usize,
        #[source]
        source: DurationError,
    },
}

/// Load every segment of a file. `.json` files hold an array of 12-element
/// arrays; anything else is read as text, one segment per line.
pub fn load_segments(path: &Path) -> Result<Vec<Durations>, SegmentError> {
    let contents = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let segments = if is_json {
        parse_json(&contents)?
    } else {
        parse_text(&contents)?
    };
    log::debug!("Loaded {} segments from {}", segments.len(), path.display());
    Ok(segments)
}

pub fn parse_json(contents: &str) -> Result<Vec<Durations>, SegmentError> {
    Ok(serde_json::from_str(contents)?)
}

/// One segment per line: 12 weights separated by whitespace or commas.
/// Weights may be written as rationals (`1/4`). `#` starts a comment and
/// blank lines are skipped. Line numbers in errors are 1-based.
pub fn parse_text(contents: &str) -> Result<Vec<Durations>, SegmentError> {
    let mut segments = Vec::new();

    for (i, raw) in contents.lines().enumerate() {
        let line = i + 1;
        let body = raw.split('#').next().unwrap_or("").trim();
        if body.is_empty() {
            continue;
        }

        let weights = body
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|token| {
                parse_weight(token).ok_or_else(|| SegmentError::Weight {
                    line,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let durations = Durations::try_from(weights)
            .map_err(|source| SegmentError::Durations { line, source })?;
        segments.push(durations);
    }

    Ok(segments)
}

/// Parse `0.75`, `3` or `3/4`.
fn parse_weight(token: &str) -> Option<f64> {
    match token.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => token.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weight() {
        assert_eq!(parse_weight("0.5"), Some(0.5));
        assert_eq!(parse_weight("3"), Some(3.0));
        assert_eq!(parse_weight("3/4"), Some(0.75));
        assert_eq!(parse_weight("1/0"), None);
        assert_eq!(parse_weight("abc"), None);
    }

    #[test]
    fn test_parse_text() {
        let text = "\
# C major triad, then a rest
1 0 0 0 1 0 0 1 0 0 0 0
0,0,0,0,0,0,0,0,0,0,0,0   # rest

1/4, 0, 1/8, 0, 1/2, 0, 0, 1, 0, 0, 0, 0
";
        let segments = parse_text(text).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Durations::from_pitch_classes(&[0, 4, 7]));
        assert!(segments[1].is_silent());
        assert_eq!(segments[2].weights()[2], 0.125);
    }

    #[test]
    fn test_parse_text_reports_line() {
        let err = parse_text("1 0 0 0 1 0 0 1 0 0 0 0\n\n1 2 3\n").unwrap_err();
        assert!(matches!(
            err,
            SegmentError::Durations { line: 3, source: DurationError::Length(3) }
        ));

        let err = parse_text("1 0 x 0 1 0 0 1 0 0 0 0").unwrap_err();
        assert!(matches!(err, SegmentError::Weight { line: 1, .. }));

        let err = parse_text("1 0 -1 0 1 0 0 1 0 0 0 0").unwrap_err();
        assert!(matches!(
            err,
            SegmentError::Durations {
                line: 1,
                source: DurationError::Negative { pitch_class: 2, .. }
            }
        ));
    }

    #[test]
    fn test_parse_json() {
        let segments = parse_json("[[1,0,0,0,1,0,0,1,0,0,0,0],[0,0,0,0,0,0,0,0,0,0,0,0]]").unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments[1].is_silent());

        assert!(matches!(parse_json("[[1,0,0]]"), Err(SegmentError::Json(_))));
    }
}
