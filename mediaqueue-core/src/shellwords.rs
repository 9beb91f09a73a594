//! POSIX-ish shell word splitting for resolved ffmpeg command lines
//! (spec §4.5/§4.6).
//!
//! Applied uniformly on every platform — not gated behind `cfg(unix)` —
//! since the commands themselves are POSIX shell syntax the user authors
//! in a preset/task regardless of the host OS the client runs on
//! (SPEC_FULL.md §4.6, "Implementation note (added)").

use crate::error::{CoreError, Result};

/// Splits a resolved command string into argv-style words, honoring
/// single quotes, double quotes (with `\`, `$`, `"`, backtick escapes),
/// and unquoted backslash escapes. Returns `ValidationFailed` on an
/// unterminated quote.
pub fn split(command: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    current.push(c);
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        None => {
                            return Err(CoreError::ValidationFailed(
                                "unterminated double quote in command".to_string(),
                            ))
                        }
                        Some('"') => break,
                        Some('\\') => match chars.peek() {
                            Some(&next) if matches!(next, '\\' | '$' | '"' | '`') => {
                                current.push(next);
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        Some(c) => current.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    Ok(words)
}

/// Splits a command template on top-level `&&` into independently
/// runnable segments (§4.6: presets may chain several ffmpeg invocations).
/// `&&` occurring inside a quoted span is not treated as a separator.
pub fn split_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = command.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '&' if !in_single && !in_double && chars.peek() == Some(&'&') => {
                chars.next();
                segments.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_words() {
        let words = split("ffmpeg -i in.mov out.mp4").unwrap();
        assert_eq!(words, vec!["ffmpeg", "-i", "in.mov", "out.mp4"]);
    }

    #[test]
    fn preserves_quoted_spaces() {
        let words = split(r#"ffmpeg -i "my input.mov" out.mp4"#).unwrap();
        assert_eq!(words, vec!["ffmpeg", "-i", "my input.mov", "out.mp4"]);
    }

    #[test]
    fn single_quotes_are_literal() {
        let words = split(r#"echo 'a $b "c"'"#).unwrap();
        assert_eq!(words, vec!["echo", "a $b \"c\""]);
    }

    #[test]
    fn unterminated_double_quote_is_validation_error() {
        assert!(matches!(
            split(r#"ffmpeg -i "in.mov"#),
            Err(CoreError::ValidationFailed(_))
        ));
    }

    #[test]
    fn splits_on_top_level_double_ampersand() {
        let segments = split_segments("ffmpeg -i a.mov b.mp4 && ffmpeg -i b.mp4 c.mkv");
        assert_eq!(segments, vec!["ffmpeg -i a.mov b.mp4", "ffmpeg -i b.mp4 c.mkv"]);
    }

    #[test]
    fn does_not_split_quoted_ampersand() {
        let segments = split_segments(r#"echo "a && b""#);
        assert_eq!(segments, vec![r#"echo "a && b""#]);
    }
}
