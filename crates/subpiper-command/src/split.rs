// SPDX-License-Identifier: MIT OR Apache-2.0
//! Quote-aware splitting of a command-line string into words.

use crate::CommandError;

/// Split `line` into words the way a user typing it at a prompt expects.
///
/// * Unquoted whitespace separates words.
/// * `'...'` groups verbatim; nothing is special inside.
/// * `"..."` groups; `\"` and `\\` are the only escapes inside.
/// * Outside quotes a backslash escapes whitespace, a quote or another
///   backslash. Any other backslash is kept, so `C:\tools\bin` survives.
/// * `""` and `''` produce an empty word.
///
/// No globbing, variable expansion or operators: the result goes straight to
/// the process-creation call.
pub fn split_command_line(line: &str) -> Result<Vec<String>, CommandError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(_) => match c {
                '"' => quote = None,
                '\\' if matches!(chars.peek(), Some('"' | '\\')) => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            },
            None => match c {
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' if chars.peek().is_some_and(|n| escapable_outside_quotes(*n)) => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if let Some(quote) = quote {
        return Err(CommandError::UnterminatedQuote { quote });
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn escapable_outside_quotes(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '\\')
}
