//! Near-CNF conversion and probabilistic CKY parsing for PCFGs.

pub mod cyk;
pub mod grammar;
pub mod parser;
pub mod structs;
pub mod transformations;

pub use crate::cyk::parse;
pub use crate::grammar::{Grammar, Rule, VariableGenerator, EPSILON};
pub use crate::parser::{load_grammar, parse_grammar};
pub use crate::structs::{Node, ParseTree};
pub use crate::transformations::{back_map, to_near_cnf, ChangeKind, ChangeLog, PcfgChange};
