use std::fs;
use std::io;
use std::path::Path;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{space0, space1};
use nom::combinator::{all_consuming, map};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded, tuple};
use nom::IResult;

use crate::grammar::{Grammar, Rule, EPSILON};

// --- Grammar Loading ---
//
// One rule per line: `LHS -> SYM SYM .. PROB`. The token `''` stands
// for epsilon. Blank lines and lines starting with `#` are skipped.

/// A grammar symbol: `''` for epsilon, otherwise any whitespace-free token.
fn symbol(input: &str) -> IResult<&str, String> {
    alt((
        map(tag("''"), |_| EPSILON.to_string()),
        map(take_while1(|c: char| !c.is_whitespace()), String::from),
    ))(input)
}

/// `LHS -> SYM SYM ..` (the probability is split off beforehand).
fn rule_body(input: &str) -> IResult<&str, (String, Vec<String>)> {
    all_consuming(tuple((
        preceded(space0, symbol),
        delimited(
            delimited(space1, tag("->"), space1),
            separated_list1(space1, symbol),
            space0,
        ),
    )))(input)
}

fn parse_probability(prob_str: &str, line_num: usize) -> io::Result<f64> {
    prob_str.parse::<f64>().map_err(|e| {
        let msg = format!("Error parsing probability '{}' on line {}: {}", prob_str, line_num, e);
        io::Error::new(io::ErrorKind::InvalidData, msg)
    })
}

/// Assembles a grammar from rule lines. The start symbol is `ROOT` if a
/// variable of that name exists, otherwise the first rule's variable.
pub fn parse_grammar(text: &str) -> io::Result<Grammar> {
    let mut grammar = Grammar::new(String::new());
    let mut first_variable: Option<String> = None;

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((rule_part, prob_str)) = line.rsplit_once(char::is_whitespace) else {
            eprintln!("Warning: Skipping rule line {} (no probability): '{}'", line_num + 1, line);
            continue;
        };
        let probability = parse_probability(prob_str.trim(), line_num + 1)?;

        match rule_body(rule_part.trim_end()) {
            Ok((_, (variable, derivation))) => {
                first_variable.get_or_insert_with(|| variable.clone());
                grammar.add_rule(Rule::new(variable, derivation, probability));
            }
            Err(_) => {
                eprintln!("Warning: Skipping malformed rule line {}: '{}'", line_num + 1, line);
            }
        }
    }

    if grammar.is_variable("ROOT") {
        grammar.start = "ROOT".to_string();
    } else if let Some(variable) = first_variable {
        grammar.start = variable;
    } else {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "No rules found in grammar."));
    }

    Ok(grammar)
}

pub fn load_grammar(path: &Path) -> io::Result<Grammar> {
    let text = fs::read_to_string(path)?;
    parse_grammar(&text)
}
