//! Shell-style command tokenization
//!
//! Pure, stateless splitting of a command string into argv-like tokens.
//! Quoting rules are intentionally minimal: single- or double-quoted spans
//! form atomic tokens with the quote characters stripped, and an
//! unterminated quote consumes the remainder of the string as one token.
//! No variable expansion, globbing, or escape handling is performed.

/// Split a command string into argv-style tokens.
///
/// Tokens are separated by spaces; runs of spaces produce no empty tokens.
/// A `'...'` or `"..."` span is kept together as a single token.
///
/// # Examples
///
/// ```
/// use runlock_common::split_command;
///
/// assert_eq!(
///     split_command("echo 'hello world' foo"),
///     vec!["echo", "hello world", "foo"]
/// );
/// ```
pub fn split_command(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                ' ' => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                _ => {
                    current.push(ch);
                    in_token = true;
                }
            },
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}
