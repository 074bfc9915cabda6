//! Line tokenizer and parser.
//!
//! Grammar:
//! - tokens are separated by runs of ASCII whitespace;
//! - a double quote opens a quoted run that lasts until the next double quote
//!   and may contain whitespace; the quotes themselves are dropped;
//! - quoted runs may sit inside a token (`name="a b"` is one token, `name=a b`);
//! - `""` on its own is an empty token;
//! - an unterminated quote is an error.
//!
//! `parse` stores every token in the session tracker and collects their
//! addresses in a `DynArray`, so a parsed line is released with one nested
//! `release_array`.

use memtrack_core::raw::RawAlloc;
use memtrack_mem::{DynArray, Tracker};

use crate::error::{Result, ShellError};

/// Split a line into owned tokens.
pub fn split_tokens(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.char_indices();

    while let Some((pos, c)) = chars.next() {
        match c {
            '"' => {
                in_token = true;
                let mut closed = false;
                for (_, q) in chars.by_ref() {
                    if q == '"' {
                        closed = true;
                        break;
                    }
                    current.push(q);
                }
                if !closed {
                    return Err(ShellError::UnterminatedQuote(pos));
                }
            }
            c if c.is_ascii_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Tokenize `line` into a tracker-backed array of token strings.
///
/// On failure everything allocated for the line is released before the error
/// is returned.
pub fn parse<A: RawAlloc>(line: &str, mt: &mut Tracker<A>) -> Result<DynArray> {
    let tokens = split_tokens(line)?;
    let mut array = DynArray::new(mt)?;
    for token in &tokens {
        if let Err(e) = push_token(&mut array, mt, token) {
            mt.release_array(array, true);
            return Err(e.into());
        }
    }
    Ok(array)
}

/// Store one token and append it; the token is released again if the append
/// fails.
pub(crate) fn push_token<A: RawAlloc>(
    array: &mut DynArray,
    mt: &mut Tracker<A>,
    token: &str,
) -> memtrack_mem::Result<()> {
    let addr = mt.alloc_bytes(token.as_bytes())?;
    if let Err(e) = array.push(mt, addr) {
        mt.release(addr);
        return Err(e);
    }
    Ok(())
}

/// Copy the tokens of a parsed line back out of the tracker.
pub fn read_tokens<A: RawAlloc>(array: &DynArray, mt: &Tracker<A>) -> Result<Vec<String>> {
    array
        .iter(mt)
        .map(|addr| {
            mt.str_at(addr)
                .map(str::to_owned)
                .ok_or_else(|| ShellError::Corrupt(format!("token at {addr} is not tracked text")))
        })
        .collect()
}
