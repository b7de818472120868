use winnow::{
    ascii::{multispace0, multispace1},
    combinator::{alt, delimited, opt, preceded},
    prelude::*,
    token::take_while,
};

use super::{GrammarViolation, Node, Op};
use crate::grammar::Grammar;

#[derive(Clone, Debug)]
pub enum ParseError {
    Grammar(GrammarViolation),
    Other(String),
}
impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match *self {
            ParseError::Grammar(ref err) => write!(f, "ill-formed program: {}", err),
            ParseError::Other(ref err) => write!(f, "could not parse: {}", err),
        }
    }
}
impl std::error::Error for ParseError {}

#[derive(Debug)]
struct Item(Op, Vec<Item>);
impl Item {
    fn leaf(op: Op) -> Item {
        Item(op, vec![])
    }
    fn into_node(self, grammar: &Grammar) -> Result<Node, GrammarViolation> {
        let children = self
            .1
            .into_iter()
            .map(|item| item.into_node(grammar))
            .collect::<Result<Vec<_>, _>>()?;
        grammar.build(self.0, children)
    }
}

fn identifier(input: &mut &str) -> PResult<String> {
    let name = take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_')
        .verify(|s: &str| !s.starts_with(|c: char| c.is_ascii_digit()))
        .parse_next(input)?;
    Ok(name.to_owned())
}

fn index(input: &mut &str) -> PResult<usize> {
    take_while(1.., |c: char| c.is_ascii_digit())
        .try_map(|s: &str| s.parse::<usize>())
        .parse_next(input)
}

fn number(input: &mut &str) -> PResult<Item> {
    let value = take_while(1.., |c: char| c.is_ascii_digit() || c == '.' || c == '-')
        .try_map(|s: &str| s.parse::<f64>())
        .parse_next(input)?;
    Ok(Item::leaf(Op::Constant(value)))
}

fn reference(input: &mut &str) -> PResult<Item> {
    let name = identifier.parse_next(input)?;
    let position = opt(delimited("[", index, "]")).parse_next(input)?;
    let op = match (position, name.as_str()) {
        (Some(i), _) => Op::ArrayElementRef(name, i),
        (None, "PlayerPosition") => Op::PlayerPosition,
        (None, "NonPlayerObjectPosition") => Op::NonPlayerObjectPosition,
        (None, "NonPlayerObjectApproaching") => Op::NonPlayerObjectApproaching,
        (None, _) => Op::ScalarRef(name),
    };
    Ok(Item::leaf(op))
}

fn binary(input: &mut &str) -> PResult<Item> {
    "(".parse_next(input)?;
    let left = parse_expr.parse_next(input)?;
    multispace0(input)?;
    let symbol = alt(("==", "<", ">", "+", "-", "*", "//")).parse_next(input)?;
    let right = parse_expr.parse_next(input)?;
    multispace0(input)?;
    ")".parse_next(input)?;
    let op = match symbol {
        "==" => Op::EqualTo,
        "<" => Op::LessThan,
        ">" => Op::GreaterThan,
        "+" => Op::Plus,
        "-" => Op::Minus,
        "*" => Op::Times,
        _ => Op::Divide,
    };
    Ok(Item(op, vec![left, right]))
}

fn parse_expr(input: &mut &str) -> PResult<Item> {
    multispace0(input)?;
    alt((binary, number, reference)).parse_next(input)
}

fn block(input: &mut &str) -> PResult<Item> {
    multispace0(input)?;
    "{".parse_next(input)?;
    let body = parse_sequence.parse_next(input)?;
    multispace0(input)?;
    "}".parse_next(input)?;
    Ok(body)
}

fn parse_if(input: &mut &str) -> PResult<Item> {
    ("if", multispace1).parse_next(input)?;
    let cond = parse_expr.parse_next(input)?;
    let then = block.parse_next(input)?;
    let otherwise = opt(preceded((multispace0, "else"), block)).parse_next(input)?;
    Ok(match otherwise {
        Some(otherwise) => Item(Op::IfThenElse, vec![cond, then, otherwise]),
        None => Item(Op::IfThen, vec![cond, then]),
    })
}

fn parse_for(input: &mut &str) -> PResult<Item> {
    ("for", multispace1).parse_next(input)?;
    identifier.parse_next(input)?;
    (multispace1, "in", multispace1).parse_next(input)?;
    let array = identifier.parse_next(input)?;
    let body = block.parse_next(input)?;
    Ok(Item(Op::ForEach, vec![Item::leaf(Op::ArrayRef(array)), body]))
}

fn parse_return(input: &mut &str) -> PResult<Item> {
    ("return", multispace1).parse_next(input)?;
    let action = parse_expr.parse_next(input)?;
    Ok(Item(Op::ReturnAction, vec![action]))
}

fn parse_statement(input: &mut &str) -> PResult<Item> {
    multispace0(input)?;
    alt((parse_if, parse_for, parse_return)).parse_next(input)
}

/// `a` is a bare statement, `a;` a sequence of one, and `a; b` a sequence continuing with `b`.
fn parse_sequence(input: &mut &str) -> PResult<Item> {
    let head = parse_statement.parse_next(input)?;
    let sequenced = opt((multispace0, ";")).parse_next(input)?;
    if sequenced.is_none() {
        return Ok(head);
    }
    let next = opt(parse_sequence).parse_next(input)?;
    Ok(match next {
        Some(next) => Item(Op::Strategy, vec![head, next]),
        None => Item(Op::Strategy, vec![head]),
    })
}

fn parse_program(input: &mut &str) -> PResult<Item> {
    let item = alt((parse_sequence, parse_expr)).parse_next(input)?;
    multispace0(input)?;
    Ok(item)
}

pub(crate) fn parse(grammar: &Grammar, input: &str) -> Result<Node, ParseError> {
    match parse_program.parse(input) {
        Ok(item) => item.into_node(grammar).map_err(ParseError::Grammar),
        Err(err) => Err(ParseError::Other(err.to_string())),
    }
}
