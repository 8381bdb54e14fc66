//! Sequence filename patterns.
//!
//! A pattern is a filename template with exactly one frame-number field,
//! written either printf-style (`%04d`, `%d`) or hash-style (`####`).
//! Extraction only accepts the canonical rendering of a frame number, so
//! `format(extract(name)) == name` holds for every name a pattern accepts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The literal frame number embedded in a filename.
pub type FrameIndex = u64;

/// How the frame field is spelled inside the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameToken {
    /// `%0Nd` with N > 0, or `%d` when `width` is 0.
    Printf { width: usize },
    /// `#` repeated `width` times.
    Hash { width: usize },
}

impl FrameToken {
    /// Zero-pad width. 0 means variable width without padding.
    pub fn width(self) -> usize {
        match self {
            FrameToken::Printf { width } | FrameToken::Hash { width } => width,
        }
    }
}

/// Errors raised while parsing a pattern string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern '{pattern}' has no frame placeholder (%0Nd, %d or #)")]
    MissingFrameToken { pattern: String },

    #[error("pattern '{pattern}' has more than one frame placeholder")]
    MultipleFrameTokens { pattern: String },

    #[error("pattern '{pattern}' has a malformed printf placeholder")]
    MalformedToken { pattern: String },
}

/// A parsed filename template with exactly one frame placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SequencePathPattern {
    raw: String,
    prefix: String,
    token: FrameToken,
    suffix: String,
}

/// Extracts frame numbers from concrete filenames for one pattern.
#[derive(Debug, Clone, Copy)]
pub struct FrameMatcher<'a> {
    pattern: &'a SequencePathPattern,
}

impl SequencePathPattern {
    /// Parse a template string.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut found: Option<(usize, usize, FrameToken)> = None;
        let bytes = pattern.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            let token = match bytes[i] {
                b'%' => scan_printf(pattern, i)?,
                b'#' => {
                    let end = i + bytes[i..].iter().take_while(|b| **b == b'#').count();
                    Some((end, FrameToken::Hash { width: end - i }))
                }
                _ => None,
            };

            match token {
                Some((end, token)) => {
                    if found.is_some() {
                        return Err(PatternError::MultipleFrameTokens {
                            pattern: pattern.to_string(),
                        });
                    }
                    found = Some((i, end, token));
                    i = end;
                }
                None => i += 1,
            }
        }

        let (start, end, token) = found.ok_or_else(|| PatternError::MissingFrameToken {
            pattern: pattern.to_string(),
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            prefix: pattern[..start].to_string(),
            token,
            suffix: pattern[end..].to_string(),
        })
    }

    /// Build a printf-style pattern from literal parts.
    pub fn from_parts(prefix: &str, width: usize, suffix: &str) -> Result<Self, PatternError> {
        let token = if width == 0 {
            "%d".to_string()
        } else {
            format!("%0{width}d")
        };
        Self::parse(&format!("{prefix}{token}{suffix}"))
    }

    /// The template exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn token(&self) -> FrameToken {
        self.token
    }

    /// Zero-pad width of the frame field (0 = variable).
    pub fn frame_width(&self) -> usize {
        self.token.width()
    }

    /// Matcher for extracting frame numbers from filenames.
    pub fn to_matcher(&self) -> FrameMatcher<'_> {
        FrameMatcher { pattern: self }
    }

    /// Shorthand for `to_matcher().extract_frame(filename)`.
    pub fn extract_frame(&self, filename: &str) -> Option<FrameIndex> {
        self.to_matcher().extract_frame(filename)
    }

    /// Render the filename for a frame number.
    pub fn format(&self, frame: FrameIndex) -> String {
        format!(
            "{}{}{}",
            self.prefix,
            format_digits(frame, self.frame_width()),
            self.suffix
        )
    }
}

impl<'a> FrameMatcher<'a> {
    /// Digit run between the literal prefix and suffix, if the literals match.
    ///
    /// This is the loose match: it does not check padding.
    pub fn digit_field<'n>(&self, filename: &'n str) -> Option<&'n str> {
        let rest = filename.strip_prefix(self.pattern.prefix.as_str())?;
        let digits = rest.strip_suffix(self.pattern.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(digits)
    }

    /// Frame number of `filename`, only if the filename is the canonical
    /// rendering of that frame for this pattern.
    pub fn extract_frame(&self, filename: &str) -> Option<FrameIndex> {
        let digits = self.digit_field(filename)?;
        let frame: FrameIndex = digits.parse().ok()?;
        if format_digits(frame, self.pattern.frame_width()) == digits {
            Some(frame)
        } else {
            None
        }
    }
}

impl TryFrom<String> for SequencePathPattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SequencePathPattern> for String {
    fn from(value: SequencePathPattern) -> Self {
        value.raw
    }
}

impl fmt::Display for SequencePathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn format_digits(frame: FrameIndex, width: usize) -> String {
    format!("{frame:0width$}")
}

/// Scan a `%...d` token starting at `start`. Returns `None` for a `%` that
/// does not introduce a frame field.
fn scan_printf(pattern: &str, start: usize) -> Result<Option<(usize, FrameToken)>, PatternError> {
    let bytes = pattern.as_bytes();
    let mut j = start + 1;
    let digits_start = j;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }

    if j >= bytes.len() || bytes[j] != b'd' {
        if j > digits_start {
            return Err(PatternError::MalformedToken {
                pattern: pattern.to_string(),
            });
        }
        return Ok(None);
    }

    let spec = &pattern[digits_start..j];
    let width = if spec.is_empty() {
        0
    } else if spec.starts_with('0') && spec.len() > 1 {
        spec[1..]
            .parse::<usize>()
            .map_err(|_| PatternError::MalformedToken {
                pattern: pattern.to_string(),
            })?
    } else {
        // `%4d` pads with spaces in printf; filenames never do.
        return Err(PatternError::MalformedToken {
            pattern: pattern.to_string(),
        });
    };

    Ok(Some((j + 1, FrameToken::Printf { width })))
}
