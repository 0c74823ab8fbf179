#[derive(Parser)]
#[grammar = "parser/mo_grammar.pest"] // relative to src
pub struct MoParser;

use pest::error::Error;
use pest::iterators::Pair;
use pest::Parser;
use std::boxed::Box;

use crate::ast;
use crate::ast::Ast;
use crate::ast::AstKind;
use crate::ast::StringSpan;
use crate::ast::Variability;

//sign       = @{ "-" | "+" }
//factor_op  = @{ "*" | "/" }
fn parse_sign(pair: Pair<'_, Rule>) -> char {
    *pair
        .as_str()
        .chars()
        .collect::<Vec<char>>()
        .first()
        .unwrap()
}

//name       = @{ !keyword ~ (ASCII_ALPHA | "_") ~ ident_char* }
fn parse_name<'i>(pair: Pair<'i, Rule>) -> &'i str {
    pair.as_str()
}

//description = ${ "\"" ~ description_text ~ "\"" }
fn parse_description<'i>(pair: Pair<'i, Rule>) -> &'i str {
    pair.into_inner().next().unwrap().as_str()
}

fn span_of(pair: &Pair<'_, Rule>) -> Option<StringSpan> {
    Some(StringSpan {
        pos_start: pair.as_span().start(),
        pos_end: pair.as_span().end(),
    })
}

fn join_spans(left: &Ast, right: &Ast) -> Option<StringSpan> {
    match (left.span, right.span) {
        (Some(l), Some(r)) => Some(StringSpan {
            pos_start: l.pos_start,
            pos_end: r.pos_end,
        }),
        _ => None,
    }
}

fn parse_value(pair: Pair<'_, Rule>) -> Ast<'_> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::name => Ast {
            kind: AstKind::Name(pair.as_str()),
            span,
        },

        // real = @{ ASCII_DIGIT+ ~ ("." ~ ASCII_DIGIT+)? ~ (^"e" ~ ("+" | "-")? ~ ASCII_DIGIT+)? }
        Rule::real => Ast {
            kind: AstKind::Number(pair.as_str().parse().unwrap()),
            span,
        },

        // model = { "model" ~ name ~ description? ~ declaration* ~ ("equation" ~ equation*)? ~ "end" ~ name ~ ";" }
        Rule::model => {
            let mut inner = pair.into_inner();
            let name = parse_name(inner.next().unwrap());
            let description = if inner.peek().unwrap().as_rule() == Rule::description {
                Some(parse_description(inner.next().unwrap()))
            } else {
                None
            };
            let mut declarations = Vec::new();
            while inner.peek().unwrap().as_rule() == Rule::declaration {
                declarations.push(Box::new(parse_value(inner.next().unwrap())));
            }
            let mut equations = Vec::new();
            while inner.peek().unwrap().as_rule() == Rule::equation {
                equations.push(Box::new(parse_value(inner.next().unwrap())));
            }
            let end_name = parse_name(inner.next().unwrap());
            Ast {
                kind: AstKind::Model(ast::Model {
                    name,
                    description,
                    declarations,
                    equations,
                    end_name,
                }),
                span,
            }
        }

        // declaration = { variability? ~ real_type ~ name ~ modification? ~ binding? ~ description? ~ ";" }
        Rule::declaration => {
            let mut inner = pair.into_inner();
            let variability = if inner.peek().unwrap().as_rule() == Rule::variability {
                match inner.next().unwrap().as_str() {
                    "parameter" => Variability::Parameter,
                    _ => Variability::Constant,
                }
            } else {
                Variability::Continuous
            };
            // real_type
            inner.next();
            let name = parse_name(inner.next().unwrap());
            let mut start = None;
            let mut binding = None;
            let mut description = None;
            for child in inner {
                match child.as_rule() {
                    // modification = { "(" ~ "start" ~ "=" ~ expression ~ ")" }
                    Rule::modification => {
                        start = Some(Box::new(parse_value(child.into_inner().next().unwrap())))
                    }
                    // binding = { "=" ~ expression }
                    Rule::binding => {
                        binding = Some(Box::new(parse_value(child.into_inner().next().unwrap())))
                    }
                    Rule::description => description = Some(parse_description(child)),
                    _ => unreachable!("{:?}", child.to_string()),
                }
            }
            Ast {
                kind: AstKind::Declaration(ast::Declaration {
                    name,
                    variability,
                    start,
                    binding,
                    description,
                }),
                span,
            }
        }

        // equation = { (derivative | name) ~ "=" ~ expression ~ ";" }
        Rule::equation => {
            let mut inner = pair.into_inner();
            Ast {
                kind: AstKind::Equation(ast::Equation {
                    lhs: Box::new(parse_value(inner.next().unwrap())),
                    rhs: Box::new(parse_value(inner.next().unwrap())),
                }),
                span,
            }
        }

        // derivative = { "der" ~ "(" ~ name ~ ")" }
        Rule::derivative => Ast {
            kind: AstKind::Derivative(parse_name(pair.into_inner().next().unwrap())),
            span,
        },

        // call = { name ~ "(" ~ expression ~ ("," ~ expression)* ~ ")" }
        Rule::call => {
            let mut inner = pair.into_inner();
            Ast {
                kind: AstKind::Call(ast::Call {
                    fn_name: parse_name(inner.next().unwrap()),
                    args: inner.map(parse_value).map(Box::new).collect(),
                }),
                span,
            }
        }

        // expression = { sign? ~ term ~ (term_op ~ term)* }
        Rule::expression => {
            let mut inner = pair.into_inner();
            let sign = if inner.peek().unwrap().as_rule() == Rule::sign {
                Some(parse_sign(inner.next().unwrap()))
            } else {
                None
            };
            let mut head_term = parse_value(inner.next().unwrap());
            if let Some(op) = sign {
                head_term = Ast {
                    kind: AstKind::Monop(ast::Monop {
                        op,
                        child: Box::new(head_term),
                    }),
                    span,
                };
            }
            while inner.peek().is_some() {
                let term_op = parse_sign(inner.next().unwrap());
                let rhs_term = parse_value(inner.next().unwrap());
                let subspan = join_spans(&head_term, &rhs_term);
                head_term = Ast {
                    kind: AstKind::Binop(ast::Binop {
                        op: term_op,
                        left: Box::new(head_term),
                        right: Box::new(rhs_term),
                    }),
                    span: subspan,
                };
            }
            head_term
        }

        // term = { factor ~ (factor_op ~ factor)* }
        // factor = { primary ~ (pow_op ~ primary)? }
        Rule::term | Rule::factor => {
            let mut inner = pair.into_inner();
            let mut head = parse_value(inner.next().unwrap());
            while inner.peek().is_some() {
                let op = parse_sign(inner.next().unwrap());
                let rhs = parse_value(inner.next().unwrap());
                let subspan = join_spans(&head, &rhs);
                head = Ast {
                    kind: AstKind::Binop(ast::Binop {
                        op,
                        left: Box::new(head),
                        right: Box::new(rhs),
                    }),
                    span: subspan,
                };
            }
            head
        }

        _ => unreachable!("{:?}", pair.to_string()),
    }
}

pub fn parse_string(text: &str) -> Result<Vec<Ast<'_>>, Box<Error<Rule>>> {
    let main = MoParser::parse(Rule::main, text)?.next().unwrap();
    let models = main
        .into_inner()
        .take_while(|pair| pair.as_rule() != Rule::EOI)
        .map(parse_value)
        .collect();
    Ok(models)
}
