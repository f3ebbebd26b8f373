use crate::expression::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Char offset into the source
    pub position: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];
        let start = pos;

        if ch.is_whitespace() {
            pos += 1;
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && digit_at(&chars, pos + 1)) {
            let (kind, end) = lex_number(&chars, pos)?;
            tokens.push(Token { kind, position: start });
            pos = end;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let ident: String = chars[start..pos].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Ident(ident),
                position: start,
            });
            continue;
        }

        if ch == '\'' || ch == '"' {
            let (value, end) = lex_string(&chars, pos)?;
            tokens.push(Token {
                kind: TokenKind::Str(value),
                position: start,
            });
            pos = end;
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (kind, width) = match (ch, next) {
            ('/', Some('/')) => (TokenKind::DoubleSlash, 2),
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LtEq, 2),
            ('>', Some('=')) => (TokenKind::GtEq, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            (other, _) => {
                return Err(ExpressionError::syntax(
                    format!("unexpected character '{other}'"),
                    start,
                ))
            }
        };
        tokens.push(Token { kind, position: start });
        pos += width;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: chars.len(),
    });
    Ok(tokens)
}

fn digit_at(chars: &[char], pos: usize) -> bool {
    chars.get(pos).is_some_and(|c| c.is_ascii_digit())
}

fn lex_number(chars: &[char], start: usize) -> Result<(TokenKind, usize), ExpressionError> {
    let mut pos = start;
    let mut is_float = false;

    while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '_') {
        pos += 1;
    }
    if chars.get(pos) == Some(&'.') && digit_at(chars, pos + 1) {
        is_float = true;
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
        let mut exp = pos + 1;
        if exp < chars.len() && (chars[exp] == '+' || chars[exp] == '-') {
            exp += 1;
        }
        if exp < chars.len() && chars[exp].is_ascii_digit() {
            is_float = true;
            pos = exp;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text: String = chars[start..pos].iter().filter(|c| **c != '_').collect();
    let invalid = || ExpressionError::syntax(format!("invalid number literal '{text}'"), start);

    let kind = if is_float {
        TokenKind::Float(text.parse::<f64>().map_err(|_| invalid())?)
    } else {
        match text.parse::<i64>() {
            Ok(i) => TokenKind::Int(i),
            // integers beyond i64 degrade to floats
            Err(_) => TokenKind::Float(text.parse::<f64>().map_err(|_| invalid())?),
        }
    };

    if pos < chars.len() && (chars[pos].is_alphabetic() || chars[pos] == '_') {
        return Err(ExpressionError::syntax("invalid decimal literal", start));
    }
    Ok((kind, pos))
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut pos = start + 1;
    let mut out = String::new();

    while pos < chars.len() {
        match chars[pos] {
            c if c == quote => return Ok((out, pos + 1)),
            '\\' => {
                let escaped = chars
                    .get(pos + 1)
                    .ok_or_else(|| ExpressionError::syntax("unterminated string literal", start))?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' | '\'' | '"' => out.push(*escaped),
                    other => {
                        out.push('\\');
                        out.push(*other);
                    }
                }
                pos += 2;
            }
            '\n' => break,
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }

    Err(ExpressionError::syntax("unterminated string literal", start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_comparison() {
        assert_eq!(
            kinds("ctx.output >= 1.5"),
            vec![
                TokenKind::Ident("ctx".into()),
                TokenKind::Dot,
                TokenKind::Ident("output".into()),
                TokenKind::GtEq,
                TokenKind::Float(1.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings_and_operators() {
        assert_eq!(
            kinds(r#"'a\'b' // "c""#),
            vec![
                TokenKind::Str("a'b".into()),
                TokenKind::DoubleSlash,
                TokenKind::Str("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_errors() {
        assert!(matches!(
            tokenize("'open"),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            tokenize("a ; b"),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            tokenize("12abc"),
            Err(ExpressionError::Syntax { .. })
        ));
    }
}
