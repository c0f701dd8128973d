//! External term format helpers over `eetf`.

use crate::error::TermError;
use eetf::{Atom, FixInteger, Pid, Term, Tuple};
use std::io::Cursor;

/// Serialize a term (with the leading version byte).
///
/// # Errors
///
/// Returns `TermError::Encode` if the term cannot be encoded.
pub fn encode_term(term: &Term) -> Result<Vec<u8>, TermError> {
    let mut buf = Vec::new();
    term.encode(&mut buf)?;
    Ok(buf)
}

/// Append a serialized term to `out`.
///
/// # Errors
///
/// Returns `TermError::Encode` if the term cannot be encoded.
pub fn encode_term_into(term: &Term, out: &mut Vec<u8>) -> Result<(), TermError> {
    term.encode(out)?;
    Ok(())
}

/// Decode one term from the front of `bytes`.
///
/// Returns the term and the number of bytes it occupied.
///
/// # Errors
///
/// Returns `TermError::Decode` if `bytes` does not start with a valid term.
pub fn decode_term(bytes: &[u8]) -> Result<(Term, usize), TermError> {
    let mut cursor = Cursor::new(bytes);
    let term = Term::decode(&mut cursor)?;
    let consumed = usize::try_from(cursor.position()).unwrap_or(bytes.len());
    Ok((term, consumed))
}

/// Atom term
#[must_use]
pub fn atom(name: &str) -> Term {
    Term::from(Atom::from(name))
}

/// Small integer term
#[must_use]
pub fn int(value: i32) -> Term {
    Term::from(FixInteger::from(value))
}

/// Tuple term
#[must_use]
pub fn tuple(elements: Vec<Term>) -> Term {
    Term::from(Tuple::from(elements))
}

/// Elements of a tuple term
#[must_use]
pub fn as_tuple(term: &Term) -> Option<&[Term]> {
    match term {
        Term::Tuple(tuple) => Some(&tuple.elements),
        _ => None,
    }
}

/// Value of a small integer term
#[must_use]
pub fn as_int(term: &Term) -> Option<i32> {
    match term {
        Term::FixInteger(int) => Some(int.value),
        _ => None,
    }
}

/// Pid carried by a term
#[must_use]
pub fn as_pid(term: &Term) -> Option<&Pid> {
    match term {
        Term::Pid(pid) => Some(pid),
        _ => None,
    }
}

/// Atom carried by a term
#[must_use]
pub fn as_atom(term: &Term) -> Option<&Atom> {
    match term {
        Term::Atom(atom) => Some(atom),
        _ => None,
    }
}
