use std::collections::VecDeque;

use crate::ast::{Expr, Node, SubSqlCall, Template};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};

/// Recursive-descent parser with two tokens of lookahead.
///
/// ```text
/// sql         ::= [NormalText] { (sub_sql | print_expr | if_stmt | for_loop) [NormalText] }
/// print_expr  ::= "$" "{" expr "}"
/// expr        ::= "null" | Integer | String | Identifier { suffix }
/// suffix      ::= "[" expr "]" | "." Identifier
/// sub_sql     ::= "@" Identifier "(" [param_list] ")"
/// param_list  ::= param_item { "," param_item }
/// param_item  ::= Identifier [ "=" param_value ]
/// param_value ::= "$" "{" expr "}" | sub_sql | expr
/// if_stmt     ::= "@" "if" "(" bool_expr ")" sql
///                 { "@" "elif" "(" bool_expr ")" sql }
///                 [ "@" "else" sql ]
///                 "@" "endif"
/// bool_expr   ::= term { ("or" | "||") term }
/// term        ::= factor { ("and" | "&&") factor }
/// factor      ::= ["not" | "!"] ( "(" bool_expr ")" | comp_expr )
/// comp_expr   ::= expr [ ("==" | "!=") expr ]
/// for_loop    ::= "@" "for" "(" ( Identifier | "(" Identifier "," Identifier ")" )
///                              "in" expr
///                              [ "," "separator" "=" String ]
///                          ")" sql "@" "endfor"
/// ```
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    ahead: VecDeque<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let mut ahead = VecDeque::with_capacity(2);
        ahead.push_back(lexer.next()?);
        ahead.push_back(lexer.next()?);
        Ok(Self { lexer, ahead })
    }

    pub fn parse(mut self) -> Result<Template> {
        let template = self.sql()?;
        if *self.peek(0) != Token::Done {
            return Err(Error::TrailingInput);
        }
        Ok(template)
    }

    fn peek(&self, n: usize) -> &Token {
        &self.ahead[n]
    }

    fn advance(&mut self) -> Result<Token> {
        self.ahead.push_back(self.lexer.next()?);
        Ok(self.ahead.pop_front().unwrap_or(Token::Done))
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if *self.peek(0) == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(Error::UnexpectedToken {
                expected: expected.to_string(),
                found: self.peek(0).to_string(),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.advance()? {
            Token::Ident(name) => Ok(name),
            other => Err(Error::UnexpectedToken {
                expected: "[Identifier]".to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Ends without consuming the `@elif`/`@else`/`@endif`/`@endfor`
    /// that terminates an enclosing block; the caller matches it.
    fn sql(&mut self) -> Result<Template> {
        let mut nodes = Vec::new();
        loop {
            match self.peek(0) {
                Token::NormalText(_) => {
                    if let Token::NormalText(text) = self.advance()? {
                        nodes.push(Node::Text(text));
                    }
                }
                Token::Dollar => nodes.push(self.print_expr()?),
                Token::At => match self.peek(1) {
                    Token::Ident(_) => nodes.push(Node::SubSql(self.sub_sql()?)),
                    Token::If => nodes.push(self.if_stmt()?),
                    Token::For => nodes.push(self.for_loop()?),
                    _ => return Ok(nodes),
                },
                _ => return Ok(nodes),
            }
        }
    }

    fn print_expr(&mut self) -> Result<Node> {
        self.expect(Token::Dollar)?;
        self.expect(Token::LBrace)?;
        let expr = self.expr()?;
        self.expect(Token::RBrace)?;
        Ok(Node::Print(expr))
    }

    fn expr(&mut self) -> Result<Expr> {
        match self.advance()? {
            Token::Null => Ok(Expr::NullLit),
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => {
                let mut expr = Expr::Var(name);
                loop {
                    match self.peek(0) {
                        Token::Dot => {
                            self.advance()?;
                            expr = Expr::Member(Box::new(expr), self.expect_ident()?);
                        }
                        Token::LBracket => {
                            self.advance()?;
                            let index = self.expr()?;
                            self.expect(Token::RBracket)?;
                            expr = Expr::Index(Box::new(expr), Box::new(index));
                        }
                        _ => return Ok(expr),
                    }
                }
            }
            other => Err(Error::UnexpectedToken {
                expected: "an expression".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn sub_sql(&mut self) -> Result<SubSqlCall> {
        self.expect(Token::At)?;
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let args = if matches!(self.peek(0), Token::Ident(_)) {
            self.param_list()?
        } else {
            Vec::new()
        };
        self.expect(Token::RParen)?;
        Ok(SubSqlCall { name, args })
    }

    fn param_list(&mut self) -> Result<Vec<(String, Expr)>> {
        let mut items = vec![self.param_item()?];
        while *self.peek(0) == Token::Comma {
            self.advance()?;
            items.push(self.param_item()?);
        }
        Ok(items)
    }

    /// A bare name is shorthand for `name = name`.
    fn param_item(&mut self) -> Result<(String, Expr)> {
        let name = self.expect_ident()?;
        let value = if *self.peek(0) == Token::Assign {
            self.advance()?;
            self.param_value()?
        } else {
            Expr::Var(name.clone())
        };
        Ok((name, value))
    }

    fn param_value(&mut self) -> Result<Expr> {
        match self.peek(0) {
            Token::At => Ok(Expr::SubSql(self.sub_sql()?)),
            Token::Dollar => {
                self.advance()?;
                self.expect(Token::LBrace)?;
                let expr = self.expr()?;
                self.expect(Token::RBrace)?;
                Ok(expr)
            }
            _ => self.expr(),
        }
    }

    fn if_stmt(&mut self) -> Result<Node> {
        self.expect(Token::At)?;
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let cond = self.bool_expr()?;
        self.expect(Token::RParen)?;
        let mut branches = vec![(cond, self.sql()?)];

        while *self.peek(0) == Token::At && *self.peek(1) == Token::ElIf {
            self.advance()?;
            self.advance()?;
            self.expect(Token::LParen)?;
            let cond = self.bool_expr()?;
            self.expect(Token::RParen)?;
            branches.push((cond, self.sql()?));
        }

        let mut else_branch = None;
        if *self.peek(0) == Token::At && *self.peek(1) == Token::Else {
            self.advance()?;
            self.advance()?;
            else_branch = Some(self.sql()?);
        }

        self.expect(Token::At)?;
        self.expect(Token::EndIf)?;
        Ok(Node::If {
            branches,
            else_branch,
        })
    }

    fn bool_expr(&mut self) -> Result<Expr> {
        let mut expr = self.term()?;
        while *self.peek(0) == Token::Or {
            self.advance()?;
            expr = Expr::Or(Box::new(expr), Box::new(self.term()?));
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut expr = self.factor()?;
        while *self.peek(0) == Token::And {
            self.advance()?;
            expr = Expr::And(Box::new(expr), Box::new(self.factor()?));
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr> {
        let negated = if *self.peek(0) == Token::Not {
            self.advance()?;
            true
        } else {
            false
        };
        let inner = if *self.peek(0) == Token::LParen {
            self.advance()?;
            let expr = self.bool_expr()?;
            self.expect(Token::RParen)?;
            expr
        } else {
            self.comp_expr()?
        };
        Ok(if negated {
            Expr::Not(Box::new(inner))
        } else {
            inner
        })
    }

    fn comp_expr(&mut self) -> Result<Expr> {
        let lhs = self.expr()?;
        match self.peek(0) {
            Token::Eq => {
                self.advance()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(self.expr()?)))
            }
            Token::Neq => {
                self.advance()?;
                Ok(Expr::Neq(Box::new(lhs), Box::new(self.expr()?)))
            }
            _ => Ok(lhs),
        }
    }

    fn for_loop(&mut self) -> Result<Node> {
        self.expect(Token::At)?;
        self.expect(Token::For)?;
        self.expect(Token::LParen)?;

        let (value_name, index_name) = if *self.peek(0) == Token::LParen {
            self.advance()?;
            let value = self.expect_ident()?;
            self.expect(Token::Comma)?;
            let index = self.expect_ident()?;
            self.expect(Token::RParen)?;
            (value, Some(index))
        } else {
            (self.expect_ident()?, None)
        };

        self.expect(Token::In)?;
        let collection = self.expr()?;

        let separator = if *self.peek(0) == Token::Comma {
            self.advance()?;
            self.expect(Token::Separator)?;
            self.expect(Token::Assign)?;
            match self.advance()? {
                Token::Str(s) => Some(s),
                other => {
                    return Err(Error::UnexpectedToken {
                        expected: "[String]".to_string(),
                        found: other.to_string(),
                    })
                }
            }
        } else {
            None
        };

        self.expect(Token::RParen)?;
        let body = self.sql()?;
        self.expect(Token::At)?;
        self.expect(Token::EndFor)?;
        Ok(Node::For {
            value_name,
            index_name,
            collection,
            separator,
            body,
        })
    }
}
