//! Indentation-aware lexer for the placement scriptlet language.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Def,
    If,
    Elif,
    Else,
    Return,
    For,
    While,
    In,
    And,
    Or,
    Not,
    True,
    False,
    None,
    Pass,
    Break,
    Continue,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("scriptlet syntax error at line {line}: {message}")]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

/// Tokenizes `source`, synthesizing `Indent`/`Dedent` tokens from
/// leading whitespace the way Python's tokenizer does. Tabs are
/// rejected: mixing tabs and spaces is a common source of
/// non-determinism we do not want in a sandboxed script.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut indents = vec![0usize];
    let mut line_no = 0usize;

    for raw_line in source.lines() {
        line_no += 1;
        if raw_line.contains('\t') {
            return Err(LexError {
                line: line_no,
                message: "tabs are not permitted; use spaces for indentation".into(),
            });
        }

        let trimmed = raw_line.trim_start_matches(' ');
        let indent = raw_line.len() - trimmed.len();
        let content = trimmed.split('#').next().unwrap_or("").trim_end();
        if content.is_empty() {
            continue;
        }

        if indent > *indents.last().unwrap() {
            indents.push(indent);
            tokens.push(Token::Indent);
        }
        while indent < *indents.last().unwrap() {
            indents.pop();
            tokens.push(Token::Dedent);
        }
        if indent != *indents.last().unwrap() {
            return Err(LexError {
                line: line_no,
                message: "inconsistent indentation".into(),
            });
        }

        lex_line(content, line_no, &mut tokens)?;
        tokens.push(Token::Newline);
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token::Dedent);
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn lex_line(line: &str, line_no: usize, tokens: &mut Vec<Token>) -> Result<(), LexError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '#' => break,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    tokens.push(Token::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(LexError {
                        line: line_no,
                        message: "unexpected '!'".into(),
                    });
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::LtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(LexError {
                                line: line_no,
                                message: "unterminated string literal".into(),
                            })
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        is_float = true;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    tokens.push(Token::Float(text.parse().map_err(|_| LexError {
                        line: line_no,
                        message: format!("invalid number literal {text:?}"),
                    })?));
                } else {
                    tokens.push(Token::Int(text.parse().map_err(|_| LexError {
                        line: line_no,
                        message: format!("invalid number literal {text:?}"),
                    })?));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "def" => Token::Def,
                    "if" => Token::If,
                    "elif" => Token::Elif,
                    "else" => Token::Else,
                    "return" => Token::Return,
                    "for" => Token::For,
                    "while" => Token::While,
                    "in" => Token::In,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "True" => Token::True,
                    "False" => Token::False,
                    "None" => Token::None,
                    "pass" => Token::Pass,
                    "break" => Token::Break,
                    "continue" => Token::Continue,
                    _ => Token::Ident(word),
                });
            }
            _ => {
                return Err(LexError {
                    line: line_no,
                    message: format!("unexpected character {c:?}"),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabs_are_rejected() {
        let err = tokenize("def f():\n\tpass\n").unwrap_err();
        assert!(err.message.contains("tabs"));
    }

    #[test]
    fn indentation_produces_indent_and_dedent() {
        let tokens = tokenize("def f():\n    pass\nx = 1\n").unwrap();
        assert!(tokens.contains(&Token::Indent));
        assert!(tokens.contains(&Token::Dedent));
    }

    #[test]
    fn comments_are_stripped() {
        let tokens = tokenize("x = 1 # a comment\n").unwrap();
        assert!(tokens.iter().any(|t| matches!(t, Token::Int(1))));
        assert!(!tokens.iter().any(|t| matches!(t, Token::Ident(s) if s == "a")));
    }
}
