// src/expression.rs
use crate::comparison::{compare, contains, loose_eq};
use crate::context::EvaluationContext;
use crate::errors::{EvalError, Result};
use crate::functions::TransformMap;
use crate::operators::{arithmetic, negate, truthy, ArithOp};
use crate::parser::{ParseError, Parser};
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arith(ArithOp),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::In => 3,
            BinaryOp::Arith(ArithOp::Add) | BinaryOp::Arith(ArithOp::Sub) => 4,
            BinaryOp::Arith(ArithOp::Pow) => 6,
            BinaryOp::Arith(_) => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ENode {
    Literal(Value),
    Identifier(String),
    Array(Vec<ENode>),
    Object(Vec<(String, ENode)>),
    Member {
        object: Box<ENode>,
        property: Box<ENode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ENode>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ENode>,
        right: Box<ENode>,
    },
    Conditional {
        test: Box<ENode>,
        consequent: Box<ENode>,
        alternate: Box<ENode>,
    },
    /// `subject|name(args)`
    Transform {
        name: String,
        subject: Box<ENode>,
        args: Vec<ENode>,
    },
}

pub fn parse_expr(input: &str) -> std::result::Result<ENode, ParseError> {
    let mut p = EParser::new(input);
    let node = p.parse_conditional()?;
    p.parser.skip_ws();
    if !p.parser.eof() {
        return Err(p.parser.error("trailing input"));
    }
    Ok(node)
}

struct EParser<'a> {
    parser: Parser<'a>,
}

impl<'a> EParser<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            parser: Parser::new(s),
        }
    }

    fn parse_conditional(&mut self) -> std::result::Result<ENode, ParseError> {
        let test = self.parse_binary(1)?;
        self.parser.skip_ws();
        if !self.parser.consume_char('?') {
            return Ok(test);
        }
        let consequent = self.parse_conditional()?;
        self.parser.skip_ws();
        self.parser.expect(':')?;
        let alternate = self.parse_conditional()?;
        Ok(ENode::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> std::result::Result<ENode, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            self.parser.skip_ws();
            let Some((op, token)) = self.peek_binary_op() else {
                break;
            };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.parser.consume_str(token);
            // `^` is right-associative
            let next = if op == BinaryOp::Arith(ArithOp::Pow) {
                prec
            } else {
                prec + 1
            };
            let right = self.parse_binary(next)?;
            left = ENode::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, &'static str)> {
        const TOKENS: &[(&str, BinaryOp)] = &[
            ("||", BinaryOp::Or),
            ("&&", BinaryOp::And),
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("<=", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
            ("//", BinaryOp::Arith(ArithOp::FloorDiv)),
            ("+", BinaryOp::Arith(ArithOp::Add)),
            ("-", BinaryOp::Arith(ArithOp::Sub)),
            ("*", BinaryOp::Arith(ArithOp::Mul)),
            ("/", BinaryOp::Arith(ArithOp::Div)),
            ("%", BinaryOp::Arith(ArithOp::Rem)),
            ("^", BinaryOp::Arith(ArithOp::Pow)),
        ];
        if self.parser.peek_keyword("in") {
            return Some((BinaryOp::In, "in"));
        }
        TOKENS
            .iter()
            .find(|(token, _)| self.parser.peek_str(token))
            .map(|&(token, op)| (op, token))
    }

    fn parse_unary(&mut self) -> std::result::Result<ENode, ParseError> {
        self.parser.skip_ws();
        let op = if self.parser.consume_char('!') {
            UnaryOp::Not
        } else if self.parser.consume_char('-') {
            UnaryOp::Neg
        } else {
            return self.parse_postfix();
        };
        let operand = self.parse_unary()?;
        Ok(ENode::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> std::result::Result<ENode, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            self.parser.skip_ws();
            if self.parser.consume_char('.') {
                self.parser.skip_ws();
                let name = self.parser.parse_identifier()?;
                node = ENode::Member {
                    object: Box::new(node),
                    property: Box::new(ENode::Literal(Value::String(name))),
                };
            } else if self.parser.consume_char('[') {
                let property = self.parse_conditional()?;
                self.parser.skip_ws();
                self.parser.expect(']')?;
                node = ENode::Member {
                    object: Box::new(node),
                    property: Box::new(property),
                };
            } else if self.parser.peek_char() == Some('|') && !self.parser.peek_str("||") {
                self.parser.consume_char('|');
                self.parser.skip_ws();
                let name = self.parser.parse_identifier()?;
                let args = if self.parser.consume_char('(') {
                    self.parse_list(')')?
                } else {
                    Vec::new()
                };
                node = ENode::Transform {
                    name,
                    subject: Box::new(node),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> std::result::Result<ENode, ParseError> {
        self.parser.skip_ws();
        match self.parser.peek_char() {
            Some(c) if c.is_ascii_digit() => Ok(ENode::Literal(self.parser.parse_number_literal()?)),
            Some('\'') | Some('"') => Ok(ENode::Literal(Value::String(
                self.parser.parse_quoted_string()?,
            ))),
            Some('(') => {
                self.parser.consume_char('(');
                let inner = self.parse_conditional()?;
                self.parser.skip_ws();
                self.parser.expect(')')?;
                Ok(inner)
            }
            Some('[') => {
                self.parser.consume_char('[');
                Ok(ENode::Array(self.parse_list(']')?))
            }
            Some('{') => {
                self.parser.consume_char('{');
                self.parse_object()
            }
            Some(c) if Parser::is_ident_start(c) => {
                let name = self.parser.parse_identifier()?;
                Ok(match name.as_str() {
                    "true" => ENode::Literal(Value::Bool(true)),
                    "false" => ENode::Literal(Value::Bool(false)),
                    "null" => ENode::Literal(Value::Null),
                    _ => ENode::Identifier(name),
                })
            }
            Some(c) => Err(self.parser.error(format!("unexpected '{c}'"))),
            None => Err(self.parser.error("unexpected end of expression")),
        }
    }

    /// Comma separated expressions up to `close`; the opener is already consumed.
    fn parse_list(&mut self, close: char) -> std::result::Result<Vec<ENode>, ParseError> {
        let mut out = Vec::new();
        self.parser.skip_ws();
        if self.parser.consume_char(close) {
            return Ok(out);
        }
        loop {
            out.push(self.parse_conditional()?);
            self.parser.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            self.parser.expect(close)?;
            return Ok(out);
        }
    }

    fn parse_object(&mut self) -> std::result::Result<ENode, ParseError> {
        let mut entries = Vec::new();
        self.parser.skip_ws();
        if self.parser.consume_char('}') {
            return Ok(ENode::Object(entries));
        }
        loop {
            self.parser.skip_ws();
            let key = match self.parser.peek_char() {
                Some('\'') | Some('"') => self.parser.parse_quoted_string()?,
                _ => self.parser.parse_identifier()?,
            };
            self.parser.skip_ws();
            self.parser.expect(':')?;
            let value = self.parse_conditional()?;
            entries.push((key, value));
            self.parser.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            self.parser.expect('}')?;
            return Ok(ENode::Object(entries));
        }
    }
}

/// Evaluate AST node against a context.
///
/// `Ok(None)` means the expression produced no value at all, as happens when
/// reading a member that does not exist.
pub fn eval_ast(
    node: &ENode,
    ctx: &EvaluationContext,
    transforms: &TransformMap,
) -> Result<Option<Value>> {
    let eval = |n: &ENode| eval_value(n, ctx, transforms);
    Ok(Some(match node {
        ENode::Literal(v) => v.clone(),
        ENode::Identifier(name) => match ctx.slot(name) {
            Some(Some(v)) => v.clone(),
            // bound by a measure that reported no value
            Some(None) => return Ok(None),
            None => return Err(EvalError::UndefinedReference(name.clone())),
        },
        ENode::Array(items) => Value::Array(items.iter().map(eval).collect::<Result<_>>()?),
        ENode::Object(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key.clone(), eval(value)?);
            }
            Value::Object(map)
        }
        ENode::Member { object, property } => {
            let object = eval_ast(object, ctx, transforms)?;
            let property = eval(property)?;
            return Ok(object.and_then(|o| member(&o, &property)));
        }
        ENode::Unary { op, operand } => {
            let v = eval(operand)?;
            match op {
                UnaryOp::Not => Value::Bool(!truthy(&v)),
                UnaryOp::Neg => negate(&v)?,
            }
        }
        ENode::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            let l = eval(left)?;
            if truthy(&l) {
                eval(right)?
            } else {
                l
            }
        }
        ENode::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            let l = eval(left)?;
            if truthy(&l) {
                l
            } else {
                eval(right)?
            }
        }
        ENode::Binary { op, left, right } => {
            let l = eval(left)?;
            let r = eval(right)?;
            binary(*op, &l, &r)?
        }
        ENode::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let branch = if truthy(&eval(test)?) {
                consequent
            } else {
                alternate
            };
            return eval_ast(branch, ctx, transforms);
        }
        ENode::Transform {
            name,
            subject,
            args,
        } => {
            let mut values = Vec::with_capacity(args.len() + 1);
            values.push(eval(subject)?);
            for a in args {
                values.push(eval(a)?);
            }
            transforms.call(name, &values)?
        }
    }))
}

/// Evaluate where a concrete operand is required; no value reads as null.
fn eval_value(node: &ENode, ctx: &EvaluationContext, transforms: &TransformMap) -> Result<Value> {
    Ok(eval_ast(node, ctx, transforms)?.unwrap_or(Value::Null))
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    let ordered = |want: fn(Ordering) -> bool| Value::Bool(compare(l, r).is_some_and(want));
    Ok(match op {
        BinaryOp::Arith(a) => arithmetic(a, l, r)?,
        BinaryOp::Eq => Value::Bool(loose_eq(l, r)),
        BinaryOp::Ne => Value::Bool(!loose_eq(l, r)),
        BinaryOp::Lt => ordered(Ordering::is_lt),
        BinaryOp::Le => ordered(Ordering::is_le),
        BinaryOp::Gt => ordered(Ordering::is_gt),
        BinaryOp::Ge => ordered(Ordering::is_ge),
        BinaryOp::In => Value::Bool(contains(r, l)),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are evaluated lazily"),
    })
}

fn member(object: &Value, property: &Value) -> Option<Value> {
    match (object, property) {
        (Value::Object(map), key) => map.get(&crate::operators::to_js_string(key)).cloned(),
        (Value::Array(items), Value::Number(n)) => {
            n.as_u64().and_then(|i| items.get(i as usize)).cloned()
        }
        (Value::Array(items), Value::String(k)) if k == "length" => Some(Value::from(items.len())),
        (Value::String(s), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string())),
        (Value::String(s), Value::String(k)) if k == "length" => {
            Some(Value::from(s.chars().count()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx() -> EvaluationContext {
        let mut ctx: EvaluationContext = match json!({
            "temp": 23.5,
            "count": 5,
            "on": true,
            "name": "sensor",
            "reading": {"raw": [10, 20, 30], "unit": "C"}
        }) {
            Value::Object(map) => map.into(),
            _ => unreachable!(),
        };
        ctx.insert_undefined("pending");
        ctx
    }

    fn eval(expr: &str) -> Result<Option<Value>> {
        let ast = parse_expr(expr).map_err(EvalError::from)?;
        eval_ast(&ast, &ctx(), &TransformMap::with_builtins())
    }

    fn value(expr: &str) -> Value {
        eval(expr).unwrap().unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(value("count * 2 + 1"), json!(11));
        assert_eq!(value("(count + 1) * 2"), json!(12));
        assert_eq!(value("2 ^ 3 ^ 2"), json!(512));
        assert_eq!(value("-count + 10"), json!(5));
        assert_eq!(value("count // 2"), json!(2));
        assert_eq!(value("temp + '°C'"), json!("23.5°C"));
    }

    #[test]
    fn logic_and_comparison() {
        assert_eq!(value("temp > 20 && on"), json!(true));
        assert_eq!(value("count == '5'"), json!(true));
        assert_eq!(value("!on || count"), json!(5));
        assert_eq!(value("temp < 0 ? 'cold' : 'warm'"), json!("warm"));
        assert_eq!(value("'sen' in name"), json!(true));
        assert_eq!(value("20 in reading.raw"), json!(true));
    }

    #[test]
    fn members_and_literals() {
        assert_eq!(value("reading.raw[1]"), json!(20));
        assert_eq!(value("reading['unit']"), json!("C"));
        assert_eq!(value("reading.raw.length"), json!(3));
        assert_eq!(value("[count, {a: on, 'b c': null}]"), json!([5, {"a": true, "b c": null}]));
        assert_eq!(eval("reading.missing").unwrap(), None);
        assert_eq!(eval("reading.missing.deeper").unwrap(), None);
    }

    #[test]
    fn valueless_measures_are_undefined() {
        assert_eq!(eval("pending").unwrap(), None);
        assert_eq!(eval("pending.unit").unwrap(), None);
        assert_eq!(value("pending == null"), json!(true));
        assert_eq!(value("pending || count"), json!(5));
    }

    #[test]
    fn transforms_pipe_the_subject() {
        assert_eq!(value("name|touppercase"), json!("SENSOR"));
        assert_eq!(value("name|substr(0, 3)|touppercase"), json!("SEN"));
        assert_eq!(value("count + temp|floor"), json!(28));
        assert_eq!(
            eval("name|nosuch"),
            Err(EvalError::UnknownTransform("nosuch".into()))
        );
    }

    #[test]
    fn errors() {
        assert_eq!(
            eval("undefinedVar * 2"),
            Err(EvalError::UndefinedReference("undefinedVar".into()))
        );
        assert!(matches!(eval("count +"), Err(EvalError::Parse(_))));
        assert!(matches!(eval("count count"), Err(EvalError::Parse(_))));
        assert!(matches!(eval("'open"), Err(EvalError::Parse(_))));
        assert!(matches!(eval("count * 1e400"), Err(EvalError::Parse(_))));
    }
}
