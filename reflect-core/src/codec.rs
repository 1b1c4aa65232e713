//! Text decoder for the brace/bracket text format
//!
//! Decoding is a single left-to-right scan over whitespace-stripped text,
//! driven by an explicit state machine. The first character of a value fixes
//! its shape (`{` struct, `[` iterable, `"` string, anything else a
//! fundamental literal) and there is no backtracking. Nested structs and
//! iterables are consumed with depth counters, and characters inside quoted
//! strings never count towards nesting or delimit values.
//!
//! Strings are not unescaped: `\"` only stops a quote from terminating the
//! string, and the backslash is kept in the decoded text.

use tracing::trace;

use crate::config::Config;
use crate::error::{ReflectError, Result};

/// Literal used for absent pointers
pub const NULL_LITERAL: &str = "null";

/// Scanner states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reading a key (objects) or skipping separators (lists)
    Init,
    /// Choosing the shape of the next value from its first character
    ParseValue,
    ParseStruct,
    ParseIterable,
    ParseString,
    ParseFundamental,
    /// Commit the accumulated pair and start over
    EndParse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// `"key":value` pairs
    Object,
    /// bare values
    List,
}

/// Remove spaces, tabs and line breaks that sit outside quoted strings
pub fn strip_whitespace(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut in_string = false;
    let mut prev = '\0';
    for ch in text.chars() {
        if ch == '"' && prev != '\\' {
            in_string = !in_string;
        }
        prev = ch;
        if !in_string && matches!(ch, ' ' | '\t' | '\n' | '\r') {
            continue;
        }
        stripped.push(ch);
    }
    stripped
}

/// Wrap text in double quotes, verbatim
pub fn quote(text: &str) -> String {
    format!("\"{}\"", text)
}

/// Strip the surrounding double quotes of an encoded string
pub fn unquote(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        Ok(&text[1..text.len() - 1])
    } else {
        Err(ReflectError::decode_unknown(format!(
            "expected a quoted string, got '{}'",
            text
        )))
    }
}

/// Decode top-level object text into a `Config`
///
/// # Errors
///
/// * `DecodeDelimiter('{')` / `DecodeDelimiter('}')` when the stripped text
///   does not open or close with a brace
/// * `DecodeDelimiter` naming the missing closer when nesting is unbalanced
/// * `DecodeUnknown` for a key without a value
pub fn decode(text: &str) -> Result<Config> {
    let stripped = strip_whitespace(text);
    let interior = enclosed(&stripped, '{', '}')?;

    let mut config = Config::new();
    for (key, value) in scan(interior, Mode::Object)? {
        trace!(key = %key, value = %value, "decoded entry");
        config.set(key, value);
    }
    Ok(config)
}

/// Split bracketed list text into its top-level element texts
///
/// Elements that are themselves structs, lists or strings are returned whole,
/// including their delimiters.
pub fn split_list(text: &str) -> Result<Vec<String>> {
    let stripped = strip_whitespace(text);
    let interior = enclosed(&stripped, '[', ']')?;

    Ok(scan(interior, Mode::List)?
        .into_iter()
        .map(|(_, value)| value)
        .collect())
}

fn enclosed(text: &str, open: char, close: char) -> Result<Vec<char>> {
    if !text.starts_with(open) {
        return Err(ReflectError::DecodeDelimiter(open));
    }
    if text.len() < 2 || !text.ends_with(close) {
        return Err(ReflectError::DecodeDelimiter(close));
    }
    Ok(text[1..text.len() - 1].chars().collect())
}

fn scan(chars: Vec<char>, mode: Mode) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    let mut state = State::Init;
    let mut key = String::new();
    let mut value = String::new();
    let mut struct_depth = 0usize;
    let mut iterable_depth = 0usize;
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() || state == State::EndParse {
        if state == State::EndParse {
            entries.push((std::mem::take(&mut key), std::mem::take(&mut value)));
            state = State::Init;
            continue;
        }

        let ch = chars[i];
        let escaped = i > 0 && chars[i - 1] == '\\';

        match state {
            State::Init => match (mode, ch) {
                (_, ',') => {}
                (_, '}') => return Err(ReflectError::DecodeDelimiter('{')),
                (_, ']') => return Err(ReflectError::DecodeDelimiter('[')),
                (Mode::Object, ':') => state = State::ParseValue,
                (Mode::Object, '"') => {}
                (Mode::Object, '{') | (Mode::Object, '[') => {
                    return Err(ReflectError::DecodeDelimiter(':'))
                }
                (Mode::Object, _) => key.push(ch),
                (Mode::List, _) => {
                    // re-read this character as the first of a value
                    state = State::ParseValue;
                    continue;
                }
            },
            State::ParseValue => {
                state = match ch {
                    ',' => {
                        return Err(ReflectError::decode_unknown(format!(
                            "missing value for key '{}'",
                            key
                        )))
                    }
                    '{' => {
                        struct_depth = 1;
                        State::ParseStruct
                    }
                    '[' => {
                        iterable_depth = 1;
                        State::ParseIterable
                    }
                    '"' => State::ParseString,
                    '}' => return Err(ReflectError::DecodeDelimiter('{')),
                    ']' => return Err(ReflectError::DecodeDelimiter('[')),
                    _ => State::ParseFundamental,
                };
                value.push(ch);
            }
            State::ParseString => {
                value.push(ch);
                if ch == '"' && !escaped {
                    state = State::EndParse;
                }
            }
            State::ParseFundamental => match ch {
                ',' => state = State::EndParse,
                '}' => return Err(ReflectError::DecodeDelimiter('{')),
                ']' => return Err(ReflectError::DecodeDelimiter('[')),
                _ => value.push(ch),
            },
            State::ParseStruct | State::ParseIterable => {
                value.push(ch);
                if ch == '"' && !escaped {
                    in_string = !in_string;
                } else if !in_string {
                    let (open, close, depth) = if state == State::ParseStruct {
                        ('{', '}', &mut struct_depth)
                    } else {
                        ('[', ']', &mut iterable_depth)
                    };
                    if ch == open {
                        *depth += 1;
                    } else if ch == close {
                        *depth -= 1;
                        if *depth == 0 {
                            state = State::EndParse;
                        }
                    }
                }
            }
            State::EndParse => unreachable!("EndParse is handled before reading a character"),
        }
        i += 1;
    }

    match state {
        State::Init if mode == Mode::Object && !key.is_empty() => {
            Err(ReflectError::DecodeDelimiter(':'))
        }
        State::Init => Ok(entries),
        State::ParseFundamental => {
            entries.push((key, value));
            Ok(entries)
        }
        State::ParseValue => Err(ReflectError::decode_unknown(format!(
            "missing value for key '{}'",
            key
        ))),
        State::ParseString => Err(ReflectError::DecodeDelimiter('"')),
        State::ParseStruct => Err(ReflectError::DecodeDelimiter('}')),
        State::ParseIterable => Err(ReflectError::DecodeDelimiter(']')),
        State::EndParse => unreachable!("the scan loop drains EndParse"),
    }
}
