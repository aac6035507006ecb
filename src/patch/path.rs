//! Overlay key syntax.
//!
//! Keys are dot-separated segments. `\.` is a literal dot inside a segment
//! and `\\` a literal backslash. A segment may carry trailing `[N]` array
//! indices, so `items[0].name` and `matrix[1][2]` are valid. A segment made
//! only of digits, such as the `1` in `a.1`, indexes an existing array or
//! names an object key.

use std::fmt;

use super::PatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElement {
    Key(String),
    /// `[N]`: the container must be an array.
    Index(usize),
    /// A bare numeric segment: array index or object key, whichever the
    /// container is. Creates an array when nothing is there yet.
    Numeric(usize),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Key(k) => write!(f, "{}", k),
            PathElement::Index(i) => write!(f, "[{}]", i),
            PathElement::Numeric(i) => write!(f, "{}", i),
        }
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> PatchError {
    PatchError::Path {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Split an overlay key into path elements.
pub fn parse_path(path: &str) -> Result<Vec<PathElement>, PatchError> {
    if path.is_empty() {
        return Err(invalid(path, "empty path"));
    }

    let mut elements = Vec::new();
    let mut chars = path.chars().peekable();

    loop {
        // One dotted segment: name part, then any bracket indices
        let mut name = String::new();
        let mut escaped = false;
        while let Some(&c) = chars.peek() {
            match c {
                '.' | '[' => break,
                '\\' => {
                    chars.next();
                    match chars.next() {
                        Some(e @ ('.' | '\\')) => {
                            name.push(e);
                            escaped = true;
                        }
                        _ => return Err(invalid(path, "dangling or unknown escape")),
                    }
                }
                '*' | '?' => return Err(invalid(path, "wildcards are not supported")),
                '#' | '|' | '@' | ']' => {
                    return Err(invalid(path, format!("unsupported character '{}'", c)))
                }
                _ => {
                    name.push(c);
                    chars.next();
                }
            }
        }

        let mut indices = Vec::new();
        while chars.peek() == Some(&'[') {
            chars.next();
            let mut digits = String::new();
            loop {
                match chars.next() {
                    Some(']') => break,
                    Some(c) => digits.push(c),
                    None => return Err(invalid(path, "unterminated '['")),
                }
            }
            let index = digits
                .parse::<usize>()
                .map_err(|_| invalid(path, format!("array index '[{}]' is not a non-negative integer", digits)))?;
            indices.push(PathElement::Index(index));
        }

        if name.is_empty() {
            if indices.is_empty() || !elements.is_empty() {
                return Err(invalid(path, "empty segment"));
            }
        } else if name == "-1" && !escaped {
            return Err(invalid(path, "array append ('-1') is not supported"));
        } else if !escaped && name.bytes().all(|b| b.is_ascii_digit()) {
            let index = name
                .parse::<usize>()
                .map_err(|_| invalid(path, format!("index '{}' is too large", name)))?;
            elements.push(PathElement::Numeric(index));
        } else {
            elements.push(PathElement::Key(name));
        }
        elements.extend(indices);

        match chars.next() {
            None => break,
            Some('.') => {
                if chars.peek().is_none() {
                    return Err(invalid(path, "empty segment"));
                }
            }
            Some(c) => return Err(invalid(path, format!("unexpected '{}'", c))),
        }
    }

    Ok(elements)
}
