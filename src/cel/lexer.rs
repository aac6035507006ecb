use super::ast::{Token, TokenType};
use super::errors::ParseError;

/// Keywords mapping for the expression language
fn keyword_lookup(ident: &str) -> Option<TokenType> {
    match ident {
        "true" => Some(TokenType::True),
        "false" => Some(TokenType::False),
        "null" => Some(TokenType::Null),
        "in" => Some(TokenType::In),
        _ => None,
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alnum(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenize an expression into a vector of tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos: usize = 0;

    let peek = |pos: usize| -> Option<char> { chars.get(pos).copied() };

    while pos < len {
        let start = pos;
        let c = chars[pos];
        pos += 1;

        if c.is_whitespace() {
            continue;
        }

        // Line comments
        if c == '/' && peek(pos) == Some('/') {
            while pos < len && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }

        let two = match (c, peek(pos)) {
            ('=', Some('=')) => Some(TokenType::Eq),
            ('!', Some('=')) => Some(TokenType::Ne),
            ('<', Some('=')) => Some(TokenType::Le),
            ('>', Some('=')) => Some(TokenType::Ge),
            ('&', Some('&')) => Some(TokenType::And),
            ('|', Some('|')) => Some(TokenType::Or),
            _ => None,
        };
        if let Some(token_type) = two {
            pos += 1;
            tokens.push(Token { token_type, pos: start });
            continue;
        }

        let single = match c {
            '.' if !peek(pos).map_or(false, |n| n.is_ascii_digit()) => Some(TokenType::Dot),
            ',' => Some(TokenType::Comma),
            ':' => Some(TokenType::Colon),
            '?' => Some(TokenType::Question),
            '(' => Some(TokenType::LParen),
            ')' => Some(TokenType::RParen),
            '[' => Some(TokenType::LBracket),
            ']' => Some(TokenType::RBracket),
            '{' => Some(TokenType::LBrace),
            '}' => Some(TokenType::RBrace),
            '+' => Some(TokenType::Plus),
            '-' => Some(TokenType::Minus),
            '*' => Some(TokenType::Star),
            '/' => Some(TokenType::Slash),
            '%' => Some(TokenType::Percent),
            '<' => Some(TokenType::Lt),
            '>' => Some(TokenType::Gt),
            '!' => Some(TokenType::Not),
            _ => None,
        };
        if let Some(token_type) = single {
            tokens.push(Token { token_type, pos: start });
            continue;
        }

        // Numbers
        if c.is_ascii_digit() || c == '.' {
            let (token_type, next) = lex_number(&chars, start)?;
            pos = next;
            tokens.push(Token { token_type, pos: start });
            continue;
        }

        // String and bytes literals, with optional r/b prefixes
        if c == '"' || c == '\'' || is_string_prefix(&chars, start) {
            let (token_type, next) = lex_string(&chars, start)?;
            pos = next;
            tokens.push(Token { token_type, pos: start });
            continue;
        }

        // Identifiers and keywords
        if is_alpha(c) {
            let mut ident = String::new();
            ident.push(c);
            while pos < len && is_alnum(chars[pos]) {
                ident.push(chars[pos]);
                pos += 1;
            }
            let token_type = keyword_lookup(&ident).unwrap_or(TokenType::Ident(ident));
            tokens.push(Token { token_type, pos: start });
            continue;
        }

        return Err(ParseError::new(format!("Unexpected character '{}'", c), start));
    }

    tokens.push(Token {
        token_type: TokenType::Eof,
        pos,
    });
    Ok(tokens)
}

fn is_string_prefix(chars: &[char], pos: usize) -> bool {
    let quote_at = |i: usize| matches!(chars.get(i), Some('"') | Some('\''));
    match chars[pos] {
        'r' | 'R' | 'b' | 'B' => {
            if quote_at(pos + 1) {
                return true;
            }
            let pair = (chars[pos].to_ascii_lowercase(), chars.get(pos + 1).map(|c| c.to_ascii_lowercase()));
            matches!(pair, ('r', Some('b')) | ('b', Some('r'))) && quote_at(pos + 2)
        }
        _ => false,
    }
}

fn lex_number(chars: &[char], start: usize) -> Result<(TokenType, usize), ParseError> {
    let len = chars.len();
    let mut pos = start;

    // Hex integers
    if chars[pos] == '0' && matches!(chars.get(pos + 1), Some('x') | Some('X')) {
        pos += 2;
        let digits_start = pos;
        while pos < len && chars[pos].is_ascii_hexdigit() {
            pos += 1;
        }
        let digits: String = chars[digits_start..pos].iter().collect();
        let value = u64::from_str_radix(&digits, 16)
            .map_err(|_| ParseError::new(format!("Invalid hex literal '0x{}'", digits), start))?;
        return finish_integer(chars, start, pos, value);
    }

    let mut is_double = false;
    while pos < len && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < len && chars[pos] == '.' && chars.get(pos + 1).map_or(false, |c| c.is_ascii_digit()) {
        is_double = true;
        pos += 1;
        while pos < len && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < len && (chars[pos] == 'e' || chars[pos] == 'E') {
        let mut lookahead = pos + 1;
        if matches!(chars.get(lookahead), Some('+') | Some('-')) {
            lookahead += 1;
        }
        if chars.get(lookahead).map_or(false, |c| c.is_ascii_digit()) {
            is_double = true;
            pos = lookahead;
            while pos < len && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text: String = chars[start..pos].iter().collect();
    if is_double {
        let value: f64 = text
            .parse()
            .map_err(|_| ParseError::new(format!("Invalid number '{}'", text), start))?;
        return Ok((TokenType::Double(value), pos));
    }
    let value: u64 = text
        .parse()
        .map_err(|_| ParseError::new(format!("Integer literal '{}' out of range", text), start))?;
    finish_integer(chars, start, pos, value)
}

fn finish_integer(
    chars: &[char],
    start: usize,
    pos: usize,
    value: u64,
) -> Result<(TokenType, usize), ParseError> {
    if matches!(chars.get(pos), Some('u') | Some('U')) {
        return Ok((TokenType::UInt(value), pos + 1));
    }
    let value = i64::try_from(value)
        .map_err(|_| ParseError::new(format!("Integer literal {} out of range", value), start))?;
    Ok((TokenType::Int(value), pos))
}

fn lex_string(chars: &[char], start: usize) -> Result<(TokenType, usize), ParseError> {
    let len = chars.len();
    let mut pos = start;
    let mut raw = false;
    let mut bytes = false;
    while chars[pos] != '"' && chars[pos] != '\'' {
        match chars[pos] {
            'r' | 'R' => raw = true,
            _ => bytes = true,
        }
        pos += 1;
    }

    let quote = chars[pos];
    let triple = chars.get(pos + 1) == Some(&quote) && chars.get(pos + 2) == Some(&quote);
    pos += if triple { 3 } else { 1 };

    let mut out: Vec<u8> = Vec::new();
    loop {
        if pos >= len {
            return Err(ParseError::new("Unterminated string literal", start));
        }
        let c = chars[pos];
        if c == quote {
            if !triple {
                pos += 1;
                break;
            }
            if chars.get(pos + 1) == Some(&quote) && chars.get(pos + 2) == Some(&quote) {
                pos += 3;
                break;
            }
        }
        if !triple && (c == '\n' || c == '\r') {
            return Err(ParseError::new("Newline in string literal", pos));
        }
        pos += 1;
        if c != '\\' || raw {
            push_char(&mut out, c);
            continue;
        }
        let escaped = *chars
            .get(pos)
            .ok_or_else(|| ParseError::new("Unterminated escape sequence", pos))?;
        pos += 1;
        match escaped {
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'v' => out.push(0x0b),
            '\\' | '\'' | '"' | '`' | '?' => push_char(&mut out, escaped),
            'x' | 'X' => {
                let code = read_hex(chars, pos, 2)?;
                pos += 2;
                if bytes {
                    out.push(code as u8);
                } else {
                    push_code_point(&mut out, code, pos)?;
                }
            }
            'u' | 'U' if !bytes => {
                let width = if escaped == 'u' { 4 } else { 8 };
                let code = read_hex(chars, pos, width)?;
                pos += width;
                push_code_point(&mut out, code, pos)?;
            }
            '0'..='3' => {
                let digits: String = chars.get(pos - 1..pos + 2).map(|s| s.iter().collect()).unwrap_or_default();
                let code = u32::from_str_radix(&digits, 8)
                    .map_err(|_| ParseError::new(format!("Invalid octal escape '\\{}'", digits), pos - 1))?;
                pos += 2;
                if bytes {
                    out.push(code as u8);
                } else {
                    push_code_point(&mut out, code, pos)?;
                }
            }
            other => {
                return Err(ParseError::new(format!("Invalid escape sequence '\\{}'", other), pos - 2));
            }
        }
    }

    if bytes {
        return Ok((TokenType::Bytes(out), pos));
    }
    let s = String::from_utf8(out).map_err(|_| ParseError::new("Invalid UTF-8 in string literal", start))?;
    Ok((TokenType::Str(s), pos))
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn push_code_point(out: &mut Vec<u8>, code: u32, pos: usize) -> Result<(), ParseError> {
    let c = char::from_u32(code)
        .ok_or_else(|| ParseError::new(format!("Invalid code point {:#x}", code), pos))?;
    push_char(out, c);
    Ok(())
}

fn read_hex(chars: &[char], pos: usize, width: usize) -> Result<u32, ParseError> {
    let digits: String = chars
        .get(pos..pos + width)
        .map(|s| s.iter().collect())
        .ok_or_else(|| ParseError::new("Truncated hex escape", pos))?;
    u32::from_str_radix(&digits, 16)
        .map_err(|_| ParseError::new(format!("Invalid hex escape '{}'", digits), pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(input: &str) -> Vec<TokenType> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_select_and_compare() {
        assert_eq!(
            types("body.x == 1"),
            vec![
                TokenType::Ident("body".into()),
                TokenType::Dot,
                TokenType::Ident("x".into()),
                TokenType::Eq,
                TokenType::Int(1),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(types("42")[0], TokenType::Int(42));
        assert_eq!(types("42u")[0], TokenType::UInt(42));
        assert_eq!(types("0x1F")[0], TokenType::Int(31));
        assert_eq!(types("3.14")[0], TokenType::Double(3.14));
        assert_eq!(types("1e3")[0], TokenType::Double(1000.0));
        assert_eq!(types("2.5E-1")[0], TokenType::Double(0.25));
        assert_eq!(types(".5")[0], TokenType::Double(0.5));
    }

    #[test]
    fn test_integer_out_of_range() {
        assert!(tokenize("9223372036854775808").is_err());
        assert_eq!(types("9223372036854775808u")[0], TokenType::UInt(9223372036854775808));
    }

    #[test]
    fn test_strings() {
        assert_eq!(types("'ok'")[0], TokenType::Str("ok".into()));
        assert_eq!(types("\"a\\tb\"")[0], TokenType::Str("a\tb".into()));
        assert_eq!(types("'\\u00e9'")[0], TokenType::Str("é".into()));
        assert_eq!(types("r'a\\tb'")[0], TokenType::Str("a\\tb".into()));
        assert_eq!(types("'''multi\nline'''")[0], TokenType::Str("multi\nline".into()));
    }

    #[test]
    fn test_bytes() {
        assert_eq!(types("b'\\xff'")[0], TokenType::Bytes(vec![0xff]));
        assert_eq!(types("b\"abc\"")[0], TokenType::Bytes(b"abc".to_vec()));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            types("! - * / % + < <= > >= != && || in ?:"),
            vec![
                TokenType::Not,
                TokenType::Minus,
                TokenType::Star,
                TokenType::Slash,
                TokenType::Percent,
                TokenType::Plus,
                TokenType::Lt,
                TokenType::Le,
                TokenType::Gt,
                TokenType::Ge,
                TokenType::Ne,
                TokenType::And,
                TokenType::Or,
                TokenType::In,
                TokenType::Question,
                TokenType::Colon,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_comment() {
        assert_eq!(types("1 // trailing"), vec![TokenType::Int(1), TokenType::Eof]);
    }

    #[test]
    fn test_ident_starting_with_r_is_not_string() {
        assert_eq!(types("requestURL")[0], TokenType::Ident("requestURL".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("'abc").unwrap_err();
        assert!(err.message.contains("Unterminated"));
        assert_eq!(err.pos, 0);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a # b").unwrap_err();
        assert_eq!(err.pos, 2);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(types(""), vec![TokenType::Eof]);
    }
}
