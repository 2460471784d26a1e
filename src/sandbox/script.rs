//! Lexer and parser for the sandbox script language.
//!
//! The language is a small imperative script: assignments, expressions,
//! `for` / `if` with braced blocks, lists, arithmetic, comparisons, and
//! method calls. There is deliberately no import, file, or process syntax;
//! everything a script can touch is injected by the interpreter.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Num(f64),
    Str(String),

    // Keywords
    For,
    In,
    If,
    Else,
    And,
    Or,
    Not,
    True,
    False,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    /// Statement separator: newline or `;` outside brackets.
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Num(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Newline => write!(f, "end of line"),
            other => write!(f, "{:?}", other),
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    // Newlines inside ( ) or [ ] are continuations, not separators.
    let mut bracket_depth: usize = 0;

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '#' => {
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\n' | ';' => {
                chars.next();
                if bracket_depth == 0 {
                    tokens.push(Token::Newline);
                }
            }
            '(' => {
                chars.next();
                bracket_depth += 1;
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                bracket_depth = bracket_depth.saturating_sub(1);
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                bracket_depth += 1;
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                bracket_depth = bracket_depth.saturating_sub(1);
                tokens.push(Token::RBracket);
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    return Err("unexpected '!'".to_string());
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(n) = chars.next() {
                    if n == quote {
                        closed = true;
                        break;
                    }
                    if n == '\\' {
                        match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => break,
                        }
                    } else {
                        text.push(n);
                    }
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(text));
            }
            _ if c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_digit() || n == '.' {
                        number.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = number
                    .parse()
                    .map_err(|_| format!("invalid number: {}", number))?;
                tokens.push(Token::Num(value));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.as_str() {
                    "for" => Token::For,
                    "in" => Token::In,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character: {:?}", other)),
        }
    }

    Ok(tokens)
}

// ── AST ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign { name: String, expr: Expr },
    Expr(Expr),
    For { var: String, iterable: Expr, body: Vec<Stmt> },
    If { cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    List(Vec<Expr>),
    Ident(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Index { target: Box<Expr>, index: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Method { target: Box<Expr>, name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Deepest statement/expression nesting accepted. Past this, parsing
/// reports a syntax error instead of risking the thread stack.
pub const MAX_NESTING: usize = 256;

/// Parse a full script into a statement list.
pub fn parse(source: &str) -> Result<Vec<Stmt>, String> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let stmts = parser.statements_until(None)?;
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> Result<(), String> {
        match self.next() {
            Some(token) if &token == expected => Ok(()),
            Some(token) => Err(format!("expected {}, found {}", expected, token)),
            None => Err(format!("expected {}, found end of script", expected)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    /// Charge one level of nesting against the shared depth budget.
    fn enter(&mut self) -> Result<(), String> {
        if self.depth >= MAX_NESTING {
            return Err(format!("nesting deeper than {} levels", MAX_NESTING));
        }
        self.depth += 1;
        Ok(())
    }

    /// Parse statements until the closing token (or end of input).
    fn statements_until(&mut self, closing: Option<&Token>) -> Result<Vec<Stmt>, String> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => {
                    if let Some(c) = closing {
                        return Err(format!("expected {} before end of script", c));
                    }
                    return Ok(stmts);
                }
                Some(token) if Some(token) == closing => {
                    self.pos += 1;
                    return Ok(stmts);
                }
                _ => stmts.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, String> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.depth -= 1;
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, String> {
        let stmt = match self.peek() {
            Some(Token::For) => return self.for_statement(),
            Some(Token::If) => return self.if_statement(),
            Some(Token::Ident(_)) if self.tokens.get(self.pos + 1) == Some(&Token::Assign) => {
                let name = match self.next() {
                    Some(Token::Ident(name)) => name,
                    _ => unreachable!(),
                };
                self.next(); // '='
                let expr = self.expression()?;
                Stmt::Assign { name, expr }
            }
            _ => Stmt::Expr(self.expression()?),
        };
        self.end_of_statement()?;
        Ok(stmt)
    }

    fn end_of_statement(&mut self) -> Result<(), String> {
        match self.peek() {
            None | Some(Token::Newline) | Some(Token::RBrace) => {
                if self.peek() == Some(&Token::Newline) {
                    self.pos += 1;
                }
                Ok(())
            }
            Some(token) => Err(format!("unexpected {} after statement", token)),
        }
    }

    fn for_statement(&mut self) -> Result<Stmt, String> {
        self.eat(&Token::For)?;
        let var = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(format!(
                    "expected loop variable, found {}",
                    other.map(|t| t.to_string()).unwrap_or_else(|| "end of script".into())
                ))
            }
        };
        self.eat(&Token::In)?;
        let iterable = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::For { var, iterable, body })
    }

    fn if_statement(&mut self) -> Result<Stmt, String> {
        self.eat(&Token::If)?;
        let cond = self.expression()?;
        let then_body = self.block()?;
        let mut else_body = Vec::new();
        self.skip_newlines();
        if self.peek() == Some(&Token::Else) {
            self.pos += 1;
            self.skip_newlines();
            if self.peek() == Some(&Token::If) {
                // `else if` chains nest as a single-statement else block.
                else_body.push(self.if_statement()?);
            } else {
                else_body = self.block()?;
            }
        }
        Ok(Stmt::If { cond, then_body, else_body })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, String> {
        self.skip_newlines();
        self.eat(&Token::LBrace)?;
        self.statements_until(Some(&Token::RBrace))
    }

    // ── Expressions (precedence climbing) ────────────────────────

    fn expression(&mut self) -> Result<Expr, String> {
        self.enter()?;
        let expr = self.or_expr();
        self.depth -= 1;
        expr
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and_expr()?;
            lhs = Expr::Binary { op: BinOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.not_expr()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.not_expr()?;
            lhs = Expr::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.enter()?;
            self.pos += 1;
            let inner = self.not_expr();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.enter()?;
            self.pos += 1;
            let inner = self.unary();
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        other => {
                            return Err(format!(
                                "expected method name after '.', found {}",
                                other
                                    .map(|t| t.to_string())
                                    .unwrap_or_else(|| "end of script".into())
                            ))
                        }
                    };
                    self.eat(&Token::LParen)?;
                    let args = self.arguments(&Token::RParen)?;
                    expr = Expr::Method { target: Box::new(expr), name, args };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.eat(&Token::RBracket)?;
                    expr = Expr::Index { target: Box::new(expr), index: Box::new(index) };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.arguments(&Token::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.eat(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let items = self.arguments(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(token) => Err(format!("unexpected {}", token)),
            None => Err("unexpected end of script".to_string()),
        }
    }

    /// Comma-separated expressions up to (and including) the closing token.
    fn arguments(&mut self, closing: &Token) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(closing) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(token) if &token == closing => return Ok(args),
                Some(token) => return Err(format!("expected , or {}, found {}", closing, token)),
                None => return Err(format!("expected {} before end of script", closing)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_and_method_chain() {
        let stmts = parse("result = df.filter(\"age > 30\").head(5)").expect("parse");
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Assign { name, expr } => {
                assert_eq!(name, "result");
                assert!(matches!(expr, Expr::Method { name, .. } if name == "head"));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn parses_for_loop_with_block() {
        let source = "total = 0\nfor v in range(10) {\n  total = total + v\n}";
        let stmts = parse(source).expect("parse");
        assert_eq!(stmts.len(), 2);
        match &stmts[1] {
            Stmt::For { var, body, .. } => {
                assert_eq!(var, "v");
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn parses_if_else() {
        let stmts = parse("if x > 1 { y = 1 } else { y = 2 }").expect("parse");
        match &stmts[0] {
            Stmt::If { then_body, else_body, .. } => {
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn newlines_inside_brackets_continue_the_expression() {
        let stmts = parse("x = [1,\n 2,\n 3]").expect("parse");
        match &stmts[0] {
            Stmt::Assign { expr: Expr::List(items), .. } => assert_eq!(items.len(), 3),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn comments_are_ignored() {
        let stmts = parse("# setup\nx = 1 # trailing\n").expect("parse");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn comparison_precedence_below_arithmetic() {
        let stmts = parse("x = 1 + 2 > 2").expect("parse");
        match &stmts[0] {
            Stmt::Assign { expr: Expr::Binary { op, .. }, .. } => assert_eq!(*op, BinOp::Gt),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(parse("x = 'oops").is_err());
    }

    #[test]
    fn missing_brace_is_an_error() {
        assert!(parse("for i in range(3) { x = i").is_err());
    }

    #[test]
    fn moderate_nesting_is_fine() {
        let source = format!("x = {}1{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn deep_paren_nesting_is_a_syntax_error() {
        let source = format!("result = {}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse(&source).expect_err("should reject");
        assert!(err.contains("nesting"), "{}", err);
    }

    #[test]
    fn deep_unary_chains_are_a_syntax_error() {
        let minus = format!("x = {}1", "-".repeat(100_000));
        assert!(parse(&minus).expect_err("neg chain").contains("nesting"));
        let nots = format!("x = {}true", "not ".repeat(100_000));
        assert!(parse(&nots).expect_err("not chain").contains("nesting"));
    }

    #[test]
    fn deep_block_nesting_is_a_syntax_error() {
        let mut source = String::new();
        for _ in 0..100_000 {
            source.push_str("if true {\n");
        }
        source.push_str("x = 1\n");
        for _ in 0..100_000 {
            source.push_str("}\n");
        }
        assert!(parse(&source).expect_err("block nesting").contains("nesting"));
    }
}
