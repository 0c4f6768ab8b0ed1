//! Line splitting and joining for selection text.
//!
//! Producers are not trusted to emit clean data: splitting is a byte-level
//! state machine that stops at the first NUL or malformed UTF-8 sequence and
//! keeps whatever complete lines came before it.

use crate::register::RegisterType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    AfterCr,
    /// Continuation bytes still expected for the current sequence
    Continuation(u8),
}

/// Split raw bytes into lines on LF or CRLF.
///
/// The last line is always emitted, even when empty: `""` yields `[""]` and
/// `"a\n"` yields `["a", ""]`. A NUL byte, an invalid lead or continuation
/// byte, or a sequence cut short by the end of input truncates the data at
/// the start of the offending sequence.
pub fn split_lines(data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line_start = 0;
    let mut seq_start = 0;
    let mut end = data.len();
    let mut state = ScanState::Normal;

    for (i, &byte) in data.iter().enumerate() {
        match state {
            ScanState::Continuation(remaining) => {
                if byte & 0xC0 != 0x80 {
                    end = seq_start;
                    state = ScanState::Normal;
                    break;
                }
                state = if remaining == 1 {
                    ScanState::Normal
                } else {
                    ScanState::Continuation(remaining - 1)
                };
                continue;
            }
            ScanState::AfterCr => {
                state = ScanState::Normal;
                if byte == b'\n' {
                    lines.push(decode(&data[line_start..i - 1]));
                    line_start = i + 1;
                    continue;
                }
            }
            ScanState::Normal => {}
        }

        match byte {
            0 => {
                end = i;
                break;
            }
            b'\n' => {
                lines.push(decode(&data[line_start..i]));
                line_start = i + 1;
            }
            b'\r' => state = ScanState::AfterCr,
            0x01..=0x7F => {}
            0xC2..=0xDF => {
                seq_start = i;
                state = ScanState::Continuation(1);
            }
            0xE0..=0xEF => {
                seq_start = i;
                state = ScanState::Continuation(2);
            }
            0xF0..=0xF4 => {
                seq_start = i;
                state = ScanState::Continuation(3);
            }
            _ => {
                end = i;
                break;
            }
        }
    }

    if let ScanState::Continuation(_) = state {
        end = seq_start;
    }

    lines.push(decode(&data[line_start..end.max(line_start)]));
    lines
}

fn decode(bytes: &[u8]) -> String {
    // Overlong forms and surrogates pass the scanner; replace rather than fail.
    String::from_utf8_lossy(bytes).into_owned()
}

/// Join lines with LF. Line-wise registers also end with LF.
pub fn join_lines<S: AsRef<str>>(lines: &[S], register: RegisterType) -> String {
    let capacity = lines.iter().map(|l| l.as_ref().len() + 1).sum();
    let mut text = String::with_capacity(capacity);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        text.push_str(line.as_ref());
    }
    if register == RegisterType::Line && !lines.is_empty() {
        text.push('\n');
    }
    text
}

/// Resolve the reported register type and line list for split text.
///
/// `Auto` becomes line-wise when the text ended with a newline (the last
/// split line is empty) and character-wise otherwise. For line-wise results
/// the empty line produced by the final newline is dropped.
pub fn resolve_register(register: RegisterType, mut lines: Vec<String>) -> (Vec<String>, RegisterType) {
    let ends_with_newline = lines.last().is_some_and(|l| l.is_empty()) && lines.len() > 1;
    let resolved = match register {
        RegisterType::Auto if ends_with_newline => RegisterType::Line,
        RegisterType::Auto => RegisterType::Char,
        other => other,
    };
    if resolved == RegisterType::Line && ends_with_newline {
        lines.pop();
    }
    (lines, resolved)
}
