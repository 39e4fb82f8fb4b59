//! Recursive-descent parser.
//!
//! Syntax errors are accumulated across the whole source file rather than
//! aborting at the first one (§4.2): after an error the parser resynchronizes
//! at the next token that can start a declaration and keeps going, so a file
//! with three unrelated typos gets three diagnostics in one pass. The parser
//! never hands back a partial tree alongside those diagnostics -- [`parse`]
//! returns `Ok(Program)` xor `Err(errors)`.

use constellation_core::Span;

use crate::ast::{Callee, Decl, Expr, Literal, Program, TypeExpr};
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

pub fn parse(source: &str) -> Result<Program, Vec<ParseError>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    let mut errors: Vec<ParseError> = lex_errors.into_iter().map(ParseError::from).collect();

    let mut parser = Parser::new(tokens);
    let program = parser.parse_program();
    errors.extend(parser.errors);

    if errors.is_empty() {
        Ok(program)
    } else {
        Err(errors)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Option<Token> {
        if self.check(&kind) {
            Some(self.advance())
        } else {
            let found = self.peek().clone();
            self.errors.push(ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: format!("{:?}", found.kind),
                span: found.span,
            });
            None
        }
    }

    fn expect_ident(&mut self, context: &str) -> Option<(String, Span)> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.peek().span;
                self.advance();
                Some((name, span))
            }
            _ => {
                let found = self.peek().clone();
                self.errors.push(ParseError::UnexpectedToken {
                    expected: format!("identifier ({context})"),
                    found: format!("{:?}", found.kind),
                    span: found.span,
                });
                None
            }
        }
    }

    /// Skips tokens until one that can plausibly begin the next top-level
    /// declaration, so a single malformed declaration doesn't swallow the
    /// rest of the file's diagnostics.
    fn synchronize(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof
                | TokenKind::In
                | TokenKind::Out
                | TokenKind::Type
                | TokenKind::Use => return,
                TokenKind::Ident(_)
                    if matches!(self.peek_at(1).kind, TokenKind::Equals) =>
                {
                    return
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_program(&mut self) -> Program {
        let mut declarations = Vec::new();
        while !self.at_eof() {
            let before = self.errors.len();
            if let Some(decl) = self.parse_decl() {
                declarations.push(decl);
            }
            if self.errors.len() > before {
                self.synchronize();
            }
        }
        Program { declarations }
    }

    fn parse_decl(&mut self) -> Option<Decl> {
        match self.peek_kind() {
            TokenKind::In => self.parse_input_decl(),
            TokenKind::Out => self.parse_output_decl(),
            TokenKind::Type => self.parse_type_decl(),
            TokenKind::Use => self.parse_use_decl(),
            TokenKind::Ident(_) => self.parse_assign_decl(),
            _ => {
                let found = self.peek().clone();
                self.errors.push(ParseError::UnexpectedToken {
                    expected: "a declaration (in/out/type/use/assignment)".to_string(),
                    found: format!("{:?}", found.kind),
                    span: found.span,
                });
                None
            }
        }
    }

    fn parse_input_decl(&mut self) -> Option<Decl> {
        let start = self.advance().span; // `in`
        let (name, _) = self.expect_ident("input name")?;
        self.expect(TokenKind::Colon, "':' after input name")?;
        let ty = self.parse_type()?;
        let mut example = None;
        if self.eat(&TokenKind::At) {
            let (kw, _) = self.expect_ident("'example' after '@'")?;
            if kw != "example" {
                self.errors.push(ParseError::UnexpectedToken {
                    expected: "'example'".to_string(),
                    found: kw,
                    span: start,
                });
            }
            self.expect(TokenKind::LParen, "'(' after @example")?;
            example = Some(self.parse_expr()?);
            self.expect(TokenKind::RParen, "')' closing @example")?;
        }
        let end = self.peek().span;
        Some(Decl::Input {
            name,
            ty,
            example,
            span: start.merge(end),
        })
    }

    fn parse_output_decl(&mut self) -> Option<Decl> {
        let start = self.advance().span; // `out`
        let (name, name_span) = self.expect_ident("output name")?;
        Some(Decl::Output {
            name,
            span: start.merge(name_span),
        })
    }

    fn parse_type_decl(&mut self) -> Option<Decl> {
        let start = self.advance().span; // `type`
        let (name, _) = self.expect_ident("type alias name")?;
        self.expect(TokenKind::Equals, "'=' after type alias name")?;
        let ty = self.parse_type()?;
        let end = self.peek().span;
        Some(Decl::TypeAlias {
            name,
            ty,
            span: start.merge(end),
        })
    }

    fn parse_use_decl(&mut self) -> Option<Decl> {
        let start = self.advance().span; // `use`
        let (namespace, ns_span) = self.expect_ident("namespace")?;
        let mut alias = None;
        let mut end = ns_span;
        if self.eat(&TokenKind::As) {
            let (a, a_span) = self.expect_ident("alias name")?;
            alias = Some(a);
            end = a_span;
        }
        Some(Decl::Use {
            namespace,
            alias,
            span: start.merge(end),
        })
    }

    fn parse_assign_decl(&mut self) -> Option<Decl> {
        let (name, start) = self.expect_ident("declaration name")?;
        self.expect(TokenKind::Equals, "'=' after name")?;
        let value = self.parse_expr()?;
        let span = start.merge(value.span());
        Some(Decl::Assign { name, value, span })
    }

    // ---- Types ----

    fn parse_type(&mut self) -> Option<TypeExpr> {
        let mut first = self.parse_type_arm()?;
        if self.check(&TokenKind::Pipe) {
            let mut arms = vec![(None, first)];
            while self.eat(&TokenKind::Pipe) {
                arms.push(self.parse_union_arm()?);
            }
            first = TypeExpr::Union(arms);
        }
        Some(self.parse_type_postfix(first))
    }

    fn parse_union_arm(&mut self) -> Option<(Option<String>, TypeExpr)> {
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            if matches!(self.peek_at(1).kind, TokenKind::Colon) {
                self.advance();
                self.advance();
                let ty = self.parse_type_arm()?;
                return Some((Some(name), ty));
            }
        }
        Some((None, self.parse_type_arm()?))
    }

    /// One type atom plus its `?` suffixes and any `+ { … }` structural
    /// extensions, without consuming a following `|` (handled by the caller
    /// so union arms each get their own atom).
    fn parse_type_arm(&mut self) -> Option<TypeExpr> {
        let mut ty = self.parse_type_atom()?;
        ty = self.parse_type_postfix(ty);
        while self.check(&TokenKind::Plus) && matches!(self.peek_at(1).kind, TokenKind::LBrace) {
            self.advance(); // `+`
            // The lookahead guarantees `parse_type_atom` sees a leading `{`
            // and always takes the record branch.
            let TypeExpr::Record(fields) = self.parse_type_atom()? else {
                unreachable!("lookahead guaranteed a record type atom")
            };
            ty = TypeExpr::Extension(Box::new(ty), fields);
        }
        Some(ty)
    }

    fn parse_type_postfix(&mut self, mut ty: TypeExpr) -> TypeExpr {
        while self.eat(&TokenKind::QuestionMark) {
            ty = TypeExpr::Optional(Box::new(ty));
        }
        ty
    }

    fn parse_type_atom(&mut self) -> Option<TypeExpr> {
        if self.eat(&TokenKind::LBrace) {
            let mut fields = Vec::new();
            if !self.check(&TokenKind::RBrace) {
                loop {
                    let (name, _) = self.expect_ident("record field name")?;
                    self.expect(TokenKind::Colon, "':' after field name")?;
                    let ty = self.parse_type()?;
                    fields.push((name, ty));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RBrace, "'}' closing record type")?;
            return Some(TypeExpr::Record(fields));
        }

        let (name, _) = self.expect_ident("a type")?;
        Some(match name.as_str() {
            "String" => TypeExpr::String,
            "Int" => TypeExpr::Int,
            "Float" => TypeExpr::Float,
            "Boolean" => TypeExpr::Boolean,
            "List" | "Candidates" => {
                self.expect(TokenKind::Lt, "'<' after List")?;
                let elem = self.parse_type()?;
                self.expect(TokenKind::Gt, "'>' closing List<...>")?;
                TypeExpr::List(Box::new(elem))
            }
            "Optional" => {
                self.expect(TokenKind::Lt, "'<' after Optional")?;
                let inner = self.parse_type()?;
                self.expect(TokenKind::Gt, "'>' closing Optional<...>")?;
                TypeExpr::Optional(Box::new(inner))
            }
            "Map" => {
                self.expect(TokenKind::Lt, "'<' after Map")?;
                let key = self.parse_type()?;
                self.expect(TokenKind::Comma, "',' between Map key and value types")?;
                let value = self.parse_type()?;
                self.expect(TokenKind::Gt, "'>' closing Map<...>")?;
                TypeExpr::Map(Box::new(key), Box::new(value))
            }
            _ => TypeExpr::Named(name),
        })
    }

    // ---- Expressions ----

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_coalesce()
    }

    fn parse_coalesce(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_or()?;
        while self.eat(&TokenKind::QuestionQuestion) {
            let rhs = self.parse_or()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Coalesce {
                primary: Box::new(lhs),
                fallback: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_guard()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_guard()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::And(Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_guard(&mut self) -> Option<Expr> {
        let value = self.parse_merge()?;
        if self.eat(&TokenKind::When) {
            let cond = self.parse_merge()?;
            let span = value.span().merge(cond.span());
            return Some(Expr::Guard {
                value: Box::new(value),
                cond: Box::new(cond),
                span,
            });
        }
        Some(value)
    }

    fn parse_merge(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.eat(&TokenKind::Plus) {
            let rhs = self.parse_unary()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Merge {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        if self.check(&TokenKind::Not) {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span());
            return Some(Expr::Not(Box::new(operand), span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let (field, field_span) = self.expect_ident("field name")?;
                let span = expr.span().merge(field_span);
                expr = Expr::FieldAccess {
                    source: Box::new(expr),
                    field,
                    span,
                };
            } else if self.check(&TokenKind::LBracket) {
                let start = self.advance().span;
                let mut fields = Vec::new();
                loop {
                    let (name, _) = self.expect_ident("projected field name")?;
                    fields.push(name);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(TokenKind::RBracket, "']' closing projection")?;
                let span = expr.span().merge(end.map(|t| t.span).unwrap_or(start));
                expr = Expr::Project {
                    source: Box::new(expr),
                    fields,
                    span,
                };
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLit(v) => {
                self.advance();
                Some(Expr::Literal(Literal::Int(v), tok.span))
            }
            TokenKind::FloatLit(v) => {
                self.advance();
                Some(Expr::Literal(Literal::Float(v), tok.span))
            }
            TokenKind::StringLit(ref s) => {
                self.advance();
                Some(Expr::Literal(Literal::Str(s.clone()), tok.span))
            }
            TokenKind::InterpolatedStringLit {
                ref parts,
                ref holes,
            } => {
                self.advance();
                let mut exprs = Vec::new();
                for hole in holes {
                    match parse(&format!("x = {hole}")) {
                        Ok(program) => match program.declarations.into_iter().next() {
                            Some(Decl::Assign { value, .. }) => exprs.push(value),
                            _ => self.errors.push(ParseError::UnexpectedToken {
                                expected: "interpolation expression".to_string(),
                                found: hole.clone(),
                                span: tok.span,
                            }),
                        },
                        Err(sub_errors) => self.errors.extend(sub_errors),
                    }
                }
                Some(Expr::Interpolation {
                    parts: parts.clone(),
                    exprs,
                    span: tok.span,
                })
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::Literal(Literal::Bool(true), tok.span))
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::Literal(Literal::Bool(false), tok.span))
            }
            TokenKind::LBracket => self.parse_list_literal(),
            TokenKind::LBrace => self.parse_record_literal(),
            TokenKind::If => self.parse_conditional(),
            TokenKind::Branch => self.parse_branch(),
            TokenKind::LParen => self.parse_paren_or_lambda(),
            TokenKind::Ident(ref name) => self.parse_ident_or_call(name.clone(), tok.span),
            _ => {
                self.errors.push(ParseError::UnexpectedToken {
                    expected: "an expression".to_string(),
                    found: format!("{:?}", tok.kind),
                    span: tok.span,
                });
                None
            }
        }
    }

    fn parse_list_literal(&mut self) -> Option<Expr> {
        let start = self.advance().span; // `[`
        let mut items = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                items.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBracket, "']' closing list literal")?;
        Some(Expr::Literal(
            Literal::List(items),
            start.merge(end.span),
        ))
    }

    fn parse_record_literal(&mut self) -> Option<Expr> {
        let start = self.advance().span; // `{`
        let mut fields = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let (name, _) = self.expect_ident("record field name")?;
                self.expect(TokenKind::Colon, "':' after field name")?;
                let value = self.parse_expr()?;
                fields.push((name, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBrace, "'}' closing record literal")?;
        Some(Expr::Literal(
            Literal::Record(fields),
            start.merge(end.span),
        ))
    }

    fn parse_conditional(&mut self) -> Option<Expr> {
        let start = self.advance().span; // `if`
        self.expect(TokenKind::LParen, "'(' after if")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')' closing if condition")?;
        let then_branch = self.parse_expr()?;
        self.expect(TokenKind::Else, "'else' in conditional")?;
        let else_branch = self.parse_expr()?;
        let span = start.merge(else_branch.span());
        Some(Expr::Conditional {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            span,
        })
    }

    fn parse_branch(&mut self) -> Option<Expr> {
        let start = self.advance().span; // `branch`
        self.expect(TokenKind::LBrace, "'{' opening branch body")?;
        let mut arms = Vec::new();
        let mut otherwise = None;
        loop {
            if self.check(&TokenKind::Otherwise) {
                self.advance();
                self.expect(TokenKind::Arrow, "'->' after otherwise")?;
                otherwise = Some(self.parse_expr()?);
            } else {
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Arrow, "'->' after branch condition")?;
                let value = self.parse_expr()?;
                arms.push((cond, value));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if self.check(&TokenKind::RBrace) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace, "'}' closing branch body")?;
        let otherwise = otherwise.or_else(|| {
            self.errors.push(ParseError::UnexpectedToken {
                expected: "an 'otherwise ->' arm".to_string(),
                found: "end of branch body".to_string(),
                span: start,
            });
            None
        })?;
        Some(Expr::Branch {
            arms,
            otherwise: Box::new(otherwise),
            span: start.merge(end.span),
        })
    }

    /// Disambiguates `(expr)` from a lambda literal `(param) -> body` /
    /// `(param) => body` by looking ahead past the matching `)`.
    fn parse_paren_or_lambda(&mut self) -> Option<Expr> {
        if let TokenKind::Ident(param) = self.peek_at(1).kind.clone() {
            if matches!(self.peek_at(2).kind, TokenKind::RParen)
                && matches!(
                    self.peek_at(3).kind,
                    TokenKind::Arrow | TokenKind::FatArrow
                )
            {
                let start = self.advance().span; // `(`
                self.advance(); // param ident
                self.advance(); // `)`
                self.advance(); // `->` or `=>`
                let body = self.parse_expr()?;
                let span = start.merge(body.span());
                return Some(Expr::Lambda {
                    param,
                    body: Box::new(body),
                    span,
                });
            }
        }
        self.advance(); // `(`
        let inner = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')' closing parenthesized expression")?;
        Some(inner)
    }

    fn parse_ident_or_call(&mut self, name: String, start: Span) -> Option<Expr> {
        self.advance();
        // `ns.func(args)` -- qualified call. A bare `.field` access chain
        // (no following namespace-call shape) is left to `parse_postfix`.
        if matches!(self.peek_kind(), TokenKind::Dot) {
            if let TokenKind::Ident(func) = self.peek_at(1).kind.clone() {
                if matches!(self.peek_at(2).kind, TokenKind::LParen) {
                    self.advance(); // `.`
                    self.advance(); // func ident
                    return self.parse_call_args(Callee::Qualified(name, func), start);
                }
            }
        }
        if matches!(self.peek_kind(), TokenKind::LParen) {
            return self.parse_call_args(Callee::Bare(name), start);
        }
        Some(Expr::Var(name, start))
    }

    fn parse_call_args(&mut self, callee: Callee, start: Span) -> Option<Expr> {
        self.expect(TokenKind::LParen, "'(' opening call arguments")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_call_arg()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RParen, "')' closing call arguments")?;
        Some(Expr::Call {
            callee,
            args,
            span: start.merge(end.map(|t| t.span).unwrap_or(start)),
        })
    }

    /// A call argument is either an ordinary expression or a lambda literal
    /// (only legal as a higher-order-function argument).
    fn parse_call_arg(&mut self) -> Option<Expr> {
        if self.check(&TokenKind::LParen) {
            return self.parse_paren_or_lambda();
        }
        self.parse_expr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_and_output_declarations() {
        let program = parse("in x: Int\nout x").unwrap();
        assert_eq!(program.declarations.len(), 2);
        assert!(matches!(program.declarations[0], Decl::Input { .. }));
        assert!(matches!(program.declarations[1], Decl::Output { .. }));
    }

    #[test]
    fn parses_input_with_example() {
        let program = parse("in x: Int @example(1)").unwrap();
        match &program.declarations[0] {
            Decl::Input { example, .. } => assert!(example.is_some()),
            other => panic!("expected input decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_record_and_list_types() {
        let program = parse("in x: List<{ a: Int, b: String? }>").unwrap();
        match &program.declarations[0] {
            Decl::Input { ty, .. } => match ty {
                TypeExpr::List(inner) => match &**inner {
                    TypeExpr::Record(fields) => {
                        assert_eq!(fields.len(), 2);
                        assert!(matches!(fields[1].1, TypeExpr::Optional(_)));
                    }
                    other => panic!("expected record, got {other:?}"),
                },
                other => panic!("expected list, got {other:?}"),
            },
            other => panic!("expected input decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_structural_extension_type() {
        let program = parse("type T = Base + { extra: Int }").unwrap();
        match &program.declarations[0] {
            Decl::TypeAlias { ty, .. } => assert!(matches!(ty, TypeExpr::Extension(_, _))),
            other => panic!("expected type alias, got {other:?}"),
        }
    }

    #[test]
    fn parses_optional_generic_form() {
        let program = parse("in x: Optional<Int>").unwrap();
        match &program.declarations[0] {
            Decl::Input { ty, .. } => assert!(matches!(ty, TypeExpr::Optional(_))),
            other => panic!("expected input decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_union_type_with_tags() {
        let program = parse("type T = Ok: Int | Err: String").unwrap();
        match &program.declarations[0] {
            Decl::TypeAlias { ty, .. } => match ty {
                TypeExpr::Union(arms) => assert_eq!(arms.len(), 2),
                other => panic!("expected union, got {other:?}"),
            },
            other => panic!("expected type alias, got {other:?}"),
        }
    }

    #[test]
    fn parses_use_with_alias() {
        let program = parse("use math as m").unwrap();
        match &program.declarations[0] {
            Decl::Use {
                namespace, alias, ..
            } => {
                assert_eq!(namespace, "math");
                assert_eq!(alias.as_deref(), Some("m"));
            }
            other => panic!("expected use decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_qualified_call() {
        let program = parse("y = math.add(1, 2)").unwrap();
        match &program.declarations[0] {
            Decl::Assign { value, .. } => match value {
                Expr::Call { callee, args, .. } => {
                    assert_eq!(*callee, Callee::Qualified("math".into(), "add".into()));
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected call, got {other:?}"),
            },
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_field_access_chain() {
        let program = parse("y = a.b.c").unwrap();
        match &program.declarations[0] {
            Decl::Assign { value, .. } => {
                assert!(matches!(value, Expr::FieldAccess { .. }));
            }
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_projection() {
        let program = parse("y = a[f1, f2]").unwrap();
        match &program.declarations[0] {
            Decl::Assign { value, .. } => match value {
                Expr::Project { fields, .. } => assert_eq!(fields, &vec!["f1".to_string(), "f2".to_string()]),
                other => panic!("expected project, got {other:?}"),
            },
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_merge_guard_coalesce_precedence() {
        // `(a + b) when c ?? d` -- coalesce binds loosest, guard next, merge tightest.
        let program = parse("y = a + b when c ?? d").unwrap();
        match &program.declarations[0] {
            Decl::Assign { value, .. } => match value {
                Expr::Coalesce { primary, .. } => {
                    assert!(matches!(**primary, Expr::Guard { .. }));
                }
                other => panic!("expected coalesce, got {other:?}"),
            },
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_branch_with_otherwise() {
        let program = parse("y = branch { a -> 1, b -> 2, otherwise -> 3 }").unwrap();
        match &program.declarations[0] {
            Decl::Assign { value, .. } => match value {
                Expr::Branch { arms, .. } => assert_eq!(arms.len(), 2),
                other => panic!("expected branch, got {other:?}"),
            },
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_lambda_in_call_position() {
        let program = parse("y = filter(xs, (x) -> gt(x, 0))").unwrap();
        match &program.declarations[0] {
            Decl::Assign { value, .. } => match value {
                Expr::Call { args, .. } => {
                    assert!(matches!(args[1], Expr::Lambda { .. }));
                }
                other => panic!("expected call, got {other:?}"),
            },
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_string_interpolation() {
        let program = parse("y = \"hi ${name}!\"").unwrap();
        match &program.declarations[0] {
            Decl::Assign { value, .. } => match value {
                Expr::Interpolation { parts, exprs, .. } => {
                    assert_eq!(parts.len(), 2);
                    assert_eq!(exprs.len(), 1);
                }
                other => panic!("expected interpolation, got {other:?}"),
            },
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn accumulates_multiple_errors_and_returns_no_partial_ast() {
        let result = parse("in : Int\nout ?\nz = 1 + ");
        let errors = result.expect_err("expected syntax errors");
        assert!(errors.len() >= 2, "expected multiple diagnostics, got {errors:?}");
    }

    #[test]
    fn reports_missing_otherwise_arm() {
        let result = parse("y = branch { a -> 1 }");
        assert!(result.is_err());
    }
}
