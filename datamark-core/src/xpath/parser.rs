use super::lexer::{Lexer, Token};
use super::{
    Axis, Expr, LocationPath, NodeTest, Predicate, QueryError, QueryOptions, QueryResult, Step,
};

pub(super) struct Parser<'a> {
    source: &'a str,
    options: &'a QueryOptions,
    tokens: Vec<(Token, usize)>,
    cursor: usize,
}

impl<'a> Parser<'a> {
    pub(super) fn new(source: &'a str, options: &'a QueryOptions) -> Self {
        Self {
            source,
            options,
            tokens: Vec::new(),
            cursor: 0,
        }
    }

    pub(super) fn parse(mut self) -> QueryResult<Expr> {
        self.tokens = Lexer::new(self.source).tokenize()?;
        if self.peek() == &Token::Eof {
            return Err(QueryError::Empty);
        }

        let mut paths = vec![self.location_path()?];
        while self.peek() == &Token::Pipe {
            self.advance();
            paths.push(self.location_path()?);
        }
        self.expect(&Token::Eof, "'|' or end of query")?;

        for path in &paths {
            if path.steps.len() > self.options.max_steps {
                return Err(QueryError::TooManySteps {
                    limit: self.options.max_steps,
                });
            }
        }
        Ok(Expr { paths })
    }

    fn location_path(&mut self) -> QueryResult<LocationPath> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Token::Slash => {
                self.advance();
                if self.starts_step() {
                    self.relative_path(&mut steps)?;
                }
                true
            }
            Token::DoubleSlash => {
                self.advance();
                steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
                self.relative_path(&mut steps)?;
                true
            }
            _ => {
                self.relative_path(&mut steps)?;
                false
            }
        };
        Ok(LocationPath { absolute, steps })
    }

    fn relative_path(&mut self, steps: &mut Vec<Step>) -> QueryResult<()> {
        steps.push(self.step()?);
        loop {
            match self.peek() {
                Token::Slash => {
                    self.advance();
                    steps.push(self.step()?);
                }
                Token::DoubleSlash => {
                    self.advance();
                    steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
                    steps.push(self.step()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Token::Dot
                | Token::DotDot
                | Token::At
                | Token::Star
                | Token::Name(_)
                | Token::PrefixWildcard(_)
        )
    }

    fn step(&mut self) -> QueryResult<Step> {
        match self.peek() {
            Token::Dot => {
                self.advance();
                return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
            }
            Token::DotDot => {
                self.advance();
                return Ok(Step::new(Axis::Parent, NodeTest::Node));
            }
            _ => {}
        }

        let axis = match (self.peek().clone(), self.peek_at(1)) {
            (Token::At, _) => {
                self.advance();
                Axis::Attribute
            }
            (Token::Name(name), Token::ColonColon) => {
                let axis = Axis::from_name(&name).ok_or(QueryError::UnknownAxis(name))?;
                self.advance();
                self.advance();
                axis
            }
            _ => Axis::Child,
        };

        let mut step = Step::new(axis, self.node_test()?);
        while self.peek() == &Token::LBracket {
            step.predicates.push(self.predicate()?);
        }
        Ok(step)
    }

    fn node_test(&mut self) -> QueryResult<NodeTest> {
        let (token, position) = self.advance();
        match token {
            Token::Star => Ok(NodeTest::Wildcard { prefix: None }),
            Token::PrefixWildcard(prefix) => Ok(NodeTest::Wildcard {
                prefix: Some(prefix),
            }),
            Token::Name(name) if self.peek() == &Token::LParen => {
                self.advance();
                self.expect(&Token::RParen, "')'")?;
                match name.as_str() {
                    "node" => Ok(NodeTest::Node),
                    "text" => Ok(NodeTest::Text),
                    _ => Err(QueryError::UnsupportedFunction(name)),
                }
            }
            Token::Name(name) => {
                let (prefix, local) = split_qname(&name);
                Ok(NodeTest::Name { prefix, local })
            }
            other => Err(QueryError::UnexpectedToken {
                position,
                expected: "node test".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn predicate(&mut self) -> QueryResult<Predicate> {
        self.expect(&Token::LBracket, "'['")?;
        let (token, position) = self.advance();
        let predicate = match token {
            Token::Number(n) => Predicate::Position(n),
            Token::At => {
                let (name_token, name_position) = self.advance();
                let Token::Name(name) = name_token else {
                    return Err(QueryError::UnexpectedToken {
                        position: name_position,
                        expected: "attribute name".to_string(),
                        found: name_token.to_string(),
                    });
                };
                let (prefix, local) = split_qname(&name);
                if self.peek() == &Token::Equals {
                    self.advance();
                    let (value_token, value_position) = self.advance();
                    let Token::Literal(value) = value_token else {
                        return Err(QueryError::UnexpectedToken {
                            position: value_position,
                            expected: "string literal".to_string(),
                            found: value_token.to_string(),
                        });
                    };
                    Predicate::AttributeEquals {
                        prefix,
                        local,
                        value,
                    }
                } else {
                    Predicate::HasAttribute { prefix, local }
                }
            }
            other => {
                return Err(QueryError::UnexpectedToken {
                    position,
                    expected: "position or attribute test".to_string(),
                    found: other.to_string(),
                })
            }
        };
        self.expect(&Token::RBracket, "']'")?;
        Ok(predicate)
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.cursor + offset)
            .map(|(token, _)| token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> (Token, usize) {
        let current = self
            .tokens
            .get(self.cursor)
            .cloned()
            .unwrap_or((Token::Eof, self.source.len()));
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        current
    }

    fn expect(&mut self, expected: &Token, description: &str) -> QueryResult<()> {
        let (token, position) = self.advance();
        if &token == expected {
            Ok(())
        } else {
            Err(QueryError::UnexpectedToken {
                position,
                expected: description.to_string(),
                found: token.to_string(),
            })
        }
    }
}

fn split_qname(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}
