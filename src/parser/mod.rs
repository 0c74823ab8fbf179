use pest::error::Error;

pub mod mo_parser;
pub use mo_parser::MoParser;
pub use mo_parser::Rule as MoRule;

use crate::ast::Ast;

pub fn parse_mo_string(text: &str) -> Result<Vec<Ast<'_>>, Box<Error<MoRule>>> {
    mo_parser::parse_string(text)
}
