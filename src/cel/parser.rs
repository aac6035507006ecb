use super::ast::*;
use super::errors::ParseError;
use super::lexer::tokenize;
use super::value::Value;

/// Max recursion depth for nested constructs
pub const MAX_PARSER_DEPTH: usize = 64;

pub fn parse(input: &str) -> Result<Ast, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse()?;
    Ok(Ast {
        source: input.to_string(),
        expr,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check_exact(&self, tt: &TokenType) -> bool {
        self.peek().token_type == *tt
    }

    fn match_exact(&mut self, tt: &TokenType) -> bool {
        if self.check_exact(tt) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, tt: &TokenType, msg: &str) -> Result<Token, ParseError> {
        if !self.check_exact(tt) {
            return Err(self.unexpected(msg));
        }
        Ok(self.advance())
    }

    fn unexpected(&self, msg: &str) -> ParseError {
        ParseError::new(
            format!("{}, got {:?}", msg, self.peek().token_type),
            self.peek().pos,
        )
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.check_exact(&TokenType::Eof) {
            return Err(self.unexpected("Unexpected trailing input"));
        }
        Ok(expr)
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            return Err(ParseError::new(
                format!("Expression nested deeper than {} levels", MAX_PARSER_DEPTH),
                self.peek().pos,
            ));
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| p.parse_conditional())
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if !self.match_exact(&TokenType::Question) {
            return Ok(cond);
        }
        let then_branch = self.parse_or()?;
        self.expect(&TokenType::Colon, "Expected ':' in conditional")?;
        let else_branch = self.parse_expr()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.match_exact(&TokenType::Or) {
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relation()?;
        while self.match_exact(&TokenType::And) {
            let right = self.parse_relation()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_relation(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_addition()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Eq => BinaryOp::Eq,
                TokenType::Ne => BinaryOp::Ne,
                TokenType::Lt => BinaryOp::Lt,
                TokenType::Le => BinaryOp::Le,
                TokenType::Gt => BinaryOp::Gt,
                TokenType::Ge => BinaryOp::Ge,
                TokenType::In => BinaryOp::In,
                _ => break,
            };
            self.advance();
            let right = self.parse_addition()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_addition(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplication()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplication()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Star => BinaryOp::Mul,
                TokenType::Slash => BinaryOp::Div,
                TokenType::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_exact(&TokenType::Not) {
            let operand = self.nested(|p| p.parse_unary())?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.check_exact(&TokenType::Minus) {
            self.advance();
            // Fold negative numeric literals into the literal itself
            if let TokenType::Int(n) = self.peek().token_type {
                if !self.followed_by_member(1) {
                    self.advance();
                    return Ok(Expr::Literal { value: Value::Int(-n) });
                }
            }
            if let TokenType::Double(d) = self.peek().token_type {
                if !self.followed_by_member(1) {
                    self.advance();
                    return Ok(Expr::Literal { value: Value::Double(-d) });
                }
            }
            let operand = self.nested(|p| p.parse_unary())?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_member()
    }

    fn followed_by_member(&self, offset: usize) -> bool {
        matches!(
            self.tokens.get(self.pos + offset).map(|t| &t.token_type),
            Some(TokenType::Dot) | Some(TokenType::LBracket)
        )
    }

    fn parse_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_exact(&TokenType::Dot) {
                let token = self.advance();
                let name = match token.token_type {
                    TokenType::Ident(s) => s,
                    other => {
                        return Err(ParseError::new(
                            format!("Expected field name after '.', got {:?}", other),
                            token.pos,
                        ))
                    }
                };
                if self.match_exact(&TokenType::LParen) {
                    let args = self.parse_args(&TokenType::RParen)?;
                    expr = self.member_call(expr, name, args, token.pos)?;
                } else {
                    expr = Expr::Select {
                        operand: Box::new(expr),
                        field: name,
                        test_only: false,
                    };
                }
            } else if self.match_exact(&TokenType::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenType::RBracket, "Expected ']'")?;
                expr = Expr::Index {
                    operand: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        let literal = |value: Value| -> Result<Expr, ParseError> { Ok(Expr::Literal { value }) };
        match token.token_type {
            TokenType::Int(n) => literal(Value::Int(n)),
            TokenType::UInt(n) => literal(Value::UInt(n)),
            TokenType::Double(d) => literal(Value::Double(d)),
            TokenType::Str(s) => literal(Value::String(s)),
            TokenType::Bytes(b) => literal(Value::Bytes(b)),
            TokenType::True => literal(Value::Bool(true)),
            TokenType::False => literal(Value::Bool(false)),
            TokenType::Null => literal(Value::Null),
            TokenType::Ident(name) => {
                if self.match_exact(&TokenType::LParen) {
                    let args = self.parse_args(&TokenType::RParen)?;
                    return self.global_call(name, args, token.pos);
                }
                Ok(Expr::Ident { name })
            }
            TokenType::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&TokenType::RParen, "Expected ')'")?;
                Ok(expr)
            }
            TokenType::LBracket => {
                let elements = self.parse_args(&TokenType::RBracket)?;
                Ok(Expr::List { elements })
            }
            TokenType::LBrace => self.parse_map(),
            other => Err(ParseError::new(
                format!("Unexpected token {:?}", other),
                token.pos,
            )),
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn parse_args(&mut self, close: &TokenType) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.match_exact(close) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.match_exact(&TokenType::Comma) {
                if self.match_exact(close) {
                    break;
                }
                continue;
            }
            self.expect(close, "Expected ',' or closing delimiter")?;
            break;
        }
        Ok(args)
    }

    fn parse_map(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        if self.match_exact(&TokenType::RBrace) {
            return Ok(Expr::Map { entries });
        }
        loop {
            let key = self.parse_expr()?;
            self.expect(&TokenType::Colon, "Expected ':' after map key")?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if self.match_exact(&TokenType::Comma) {
                if self.match_exact(&TokenType::RBrace) {
                    break;
                }
                continue;
            }
            self.expect(&TokenType::RBrace, "Expected ',' or '}'")?;
            break;
        }
        Ok(Expr::Map { entries })
    }

    fn global_call(&mut self, name: String, mut args: Vec<Expr>, pos: usize) -> Result<Expr, ParseError> {
        if name == "has" {
            if args.len() != 1 {
                return Err(ParseError::new("has() macro takes exactly one argument", pos));
            }
            return match args.pop() {
                Some(Expr::Select { operand, field, .. }) => Ok(Expr::Select {
                    operand,
                    field,
                    test_only: true,
                }),
                _ => Err(ParseError::new("invalid argument to has() macro", pos)),
            };
        }
        Ok(Expr::Call {
            target: None,
            function: name,
            args,
            overloads: Vec::new(),
        })
    }

    fn member_call(
        &mut self,
        target: Expr,
        name: String,
        mut args: Vec<Expr>,
        pos: usize,
    ) -> Result<Expr, ParseError> {
        let kind = match MacroKind::from_name(&name) {
            Some(kind) => kind,
            None => {
                return Ok(Expr::Call {
                    target: Some(Box::new(target)),
                    function: name,
                    args,
                    overloads: Vec::new(),
                })
            }
        };
        let arity_ok = match kind {
            MacroKind::Map => args.len() == 2 || args.len() == 3,
            _ => args.len() == 2,
        };
        if !arity_ok {
            return Err(ParseError::new(
                format!("{}() macro called with {} arguments", kind.name(), args.len()),
                pos,
            ));
        }
        let var = match args.remove(0) {
            Expr::Ident { name } => name,
            _ => {
                return Err(ParseError::new(
                    format!("{}() macro variable must be a simple name", kind.name()),
                    pos,
                ))
            }
        };
        let (predicate, transform) = match (kind, args.len()) {
            (MacroKind::Map, 1) => (None, args.pop()),
            (MacroKind::Map, _) => {
                let transform = args.pop();
                (args.pop(), transform)
            }
            _ => (args.pop(), None),
        };
        Ok(Expr::Comprehension {
            kind,
            range: Box::new(target),
            var,
            predicate: predicate.map(Box::new),
            transform: transform.map(Box::new),
        })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(input: &str) -> Expr {
        parse(input).unwrap().expr
    }

    #[test]
    fn test_parse_select() {
        match expr("body.x") {
            Expr::Select { operand, field, test_only } => {
                assert_eq!(field, "x");
                assert!(!test_only);
                assert!(matches!(*operand, Expr::Ident { ref name } if name == "body"));
            }
            other => panic!("Expected Select, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        // 1 + 2 * 3 == 7 parses as (1 + (2 * 3)) == 7
        match expr("1 + 2 * 3 == 7") {
            Expr::Binary { op: BinaryOp::Eq, left, .. } => match *left {
                Expr::Binary { op: BinaryOp::Add, right, .. } => {
                    assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("Expected Add, got {:?}", other),
            },
            other => panic!("Expected Eq, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        match expr("a || b && c") {
            Expr::Binary { op: BinaryOp::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_conditional() {
        assert!(matches!(expr("a ? 1 : 2"), Expr::Conditional { .. }));
        // right-associative
        match expr("a ? 1 : b ? 2 : 3") {
            Expr::Conditional { else_branch, .. } => {
                assert!(matches!(*else_branch, Expr::Conditional { .. }));
            }
            other => panic!("Expected Conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_literal() {
        assert_eq!(expr("-1"), Expr::Literal { value: Value::Int(-1) });
        assert!(matches!(expr("-x"), Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_parse_index_and_member_call() {
        match expr("header['X-Event'].contains('push')") {
            Expr::Call { target: Some(target), function, args, overloads } => {
                assert_eq!(function, "contains");
                assert_eq!(args.len(), 1);
                assert!(overloads.is_empty());
                assert!(matches!(*target, Expr::Index { .. }));
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_call() {
        match expr("size(body.items)") {
            Expr::Call { target: None, function, args, .. } => {
                assert_eq!(function, "size");
                assert_eq!(args.len(), 1);
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_and_map_literals() {
        match expr("[1, 2, 3,]") {
            Expr::List { elements } => assert_eq!(elements.len(), 3),
            other => panic!("Expected List, got {:?}", other),
        }
        match expr("{'a': 1, 'b': [true]}") {
            Expr::Map { entries } => assert_eq!(entries.len(), 2),
            other => panic!("Expected Map, got {:?}", other),
        }
        assert_eq!(expr("{}"), Expr::Map { entries: vec![] });
    }

    #[test]
    fn test_parse_has_macro() {
        match expr("has(body.x)") {
            Expr::Select { test_only, field, .. } => {
                assert!(test_only);
                assert_eq!(field, "x");
            }
            other => panic!("Expected Select, got {:?}", other),
        }
        assert!(parse("has(body)").is_err());
    }

    #[test]
    fn test_parse_comprehension_macros() {
        match expr("body.items.all(i, i > 0)") {
            Expr::Comprehension { kind, var, predicate, transform, .. } => {
                assert_eq!(kind, MacroKind::All);
                assert_eq!(var, "i");
                assert!(predicate.is_some());
                assert!(transform.is_none());
            }
            other => panic!("Expected Comprehension, got {:?}", other),
        }
        match expr("xs.map(x, x > 1, x * 2)") {
            Expr::Comprehension { kind, predicate, transform, .. } => {
                assert_eq!(kind, MacroKind::Map);
                assert!(predicate.is_some());
                assert!(transform.is_some());
            }
            other => panic!("Expected Comprehension, got {:?}", other),
        }
        assert!(parse("xs.all(1, true)").is_err());
        assert!(parse("xs.filter(x)").is_err());
    }

    #[test]
    fn test_parse_errors_carry_position() {
        let err = parse("body.x ==").unwrap_err();
        assert_eq!(err.pos, 9);
        let err = parse("(1 + 2").unwrap_err();
        assert!(err.message.contains("')'"));
        assert!(parse("1 2").is_err());
        assert!(parse("a.").is_err());
    }

    #[test]
    fn test_parse_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_PARSER_DEPTH + 5), ")".repeat(MAX_PARSER_DEPTH + 5));
        let err = parse(&deep).unwrap_err();
        assert!(err.message.contains("nested deeper"));
        let negations = format!("{}true", "!".repeat(MAX_PARSER_DEPTH + 5));
        assert!(parse(&negations).is_err());
        let shallow = format!("{}1{}", "(".repeat(MAX_PARSER_DEPTH - 4), ")".repeat(MAX_PARSER_DEPTH - 4));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn test_parse_keeps_source() {
        assert_eq!(parse("'ok'").unwrap().source, "'ok'");
    }
}
