use std::collections::HashMap;

use crate::grammar::{Grammar, Rule, EPSILON};
use crate::structs::{Node, ParseTree};

// --- CKY/Viterbi Parsing ---

/// Acceptance floor: 2^-50. Guards against table entries that are pure
/// floating-point accumulation noise, not a rejection of legitimately
/// unlikely parses.
const MIN_PARSE_PROB: f64 = 8.881784197001252e-16;

#[derive(Debug, Clone)]
enum BackPointer {
    Terminal,
    Unary { child: String },
    Binary { split: usize, left: String, right: String },
}

#[derive(Debug, Clone)]
struct ChartEntry {
    probability: f64,
    backpointer: BackPointer,
}

/// `chart[i][j]` maps each variable to its best probability of deriving
/// tokens `i..j`, for 0 <= i < j <= n. Absent entries are implicitly 0.
type Chart = Vec<Vec<HashMap<String, ChartEntry>>>;

/// Parses `words` with the probabilistic CKY algorithm and returns a
/// maximum-probability parse tree rooted at the grammar's start symbol,
/// or `None` if the grammar does not generate the input. The grammar is
/// expected to be in near-CNF (see `to_near_cnf`).
///
/// Among derivations of equal probability, the one encountered first
/// wins; no canonical tie-break is guaranteed.
pub fn parse(grammar: &Grammar, words: &[String]) -> Option<ParseTree> {
    let n = words.len();
    if n == 0 {
        return parse_empty_input(grammar);
    }

    // The grammar store keys rules by variable only, so index them for
    // the chart loops: lexical rules by their terminal, unary rules by
    // their child variable, binary rules by their child pair.
    let mut lexical_by_word: HashMap<&str, Vec<&Rule>> = HashMap::new();
    let mut unary_by_child: HashMap<&str, Vec<&Rule>> = HashMap::new();
    let mut binary_by_children: HashMap<(&str, &str), Vec<&Rule>> = HashMap::new();
    for rule in grammar.rules.values().flatten() {
        match rule.derivation_length() {
            1 => {
                let symbol = rule.derivation[0].as_str();
                if grammar.is_variable(symbol) {
                    unary_by_child.entry(symbol).or_default().push(rule);
                } else {
                    lexical_by_word.entry(symbol).or_default().push(rule);
                }
            }
            2 => {
                let pair = (rule.derivation[0].as_str(), rule.derivation[1].as_str());
                binary_by_children.entry(pair).or_default().push(rule);
            }
            _ => {}
        }
    }

    let mut chart: Chart = vec![vec![HashMap::new(); n + 1]; n + 1];

    // Length-1 spans: lexical seeding, then unary closure.
    for j in 1..=n {
        let cell = &mut chart[j - 1][j];
        if let Some(rules) = lexical_by_word.get(words[j - 1].as_str()) {
            for rule in rules {
                improve(cell, &rule.variable, rule.probability, BackPointer::Terminal);
            }
        }
        apply_unary_closure(&unary_by_child, cell);
    }

    // Longer spans, by increasing length: binary splits, then closure.
    for r in 2..=n {
        for i in 0..=(n - r) {
            let j = i + r;

            // Collect candidate updates first; the split cells and the
            // target cell live in the same chart.
            let mut updates: Vec<(String, f64, BackPointer)> = Vec::new();
            for k in (i + 1)..j {
                for (left, left_entry) in &chart[i][k] {
                    for (right, right_entry) in &chart[k][j] {
                        let Some(rules) = binary_by_children.get(&(left.as_str(), right.as_str()))
                        else {
                            continue;
                        };
                        for rule in rules {
                            let probability =
                                rule.probability * left_entry.probability * right_entry.probability;
                            let backpointer = BackPointer::Binary {
                                split: k,
                                left: left.clone(),
                                right: right.clone(),
                            };
                            updates.push((rule.variable.clone(), probability, backpointer));
                        }
                    }
                }
            }

            let cell = &mut chart[i][j];
            for (variable, probability, backpointer) in updates {
                improve(cell, &variable, probability, backpointer);
            }
            apply_unary_closure(&unary_by_child, cell);
        }
    }

    let best = chart[0][n].get(&grammar.start)?;
    if best.probability <= MIN_PARSE_PROB {
        return None;
    }
    let probability = best.probability;
    let root = reconstruct_tree(&chart, &grammar.start, 0, n, words);
    Some(ParseTree { root, probability })
}

/// The empty input is derivable only through an epsilon rule on the
/// start symbol, which near-CNF reserves for exactly this case.
fn parse_empty_input(grammar: &Grammar) -> Option<ParseTree> {
    let rule = grammar.rules_for(&grammar.start).iter().find(|r| r.is_epsilon())?;
    if rule.probability <= MIN_PARSE_PROB {
        return None;
    }
    Some(ParseTree {
        root: Node::branch(grammar.start.clone(), vec![Node::leaf(EPSILON)]),
        probability: rule.probability,
    })
}

/// Records `probability` for `variable` if it strictly beats the current
/// entry (absent entries count as 0). Returns whether the cell changed.
fn improve(
    cell: &mut HashMap<String, ChartEntry>,
    variable: &str,
    probability: f64,
    backpointer: BackPointer,
) -> bool {
    match cell.get_mut(variable) {
        Some(entry) => {
            if probability > entry.probability {
                entry.probability = probability;
                entry.backpointer = backpointer;
                true
            } else {
                false
            }
        }
        None => {
            if probability > 0.0 {
                cell.insert(variable.to_string(), ChartEntry { probability, backpointer });
                true
            } else {
                false
            }
        }
    }
}

/// Propagates unary rules `X -> Y` inside one cell until no entry
/// improves. A worklist makes this a true change-detection fixpoint:
/// an improved variable is requeued so chains of any length converge.
fn apply_unary_closure(unary_by_child: &HashMap<&str, Vec<&Rule>>, cell: &mut HashMap<String, ChartEntry>) {
    let mut worklist: Vec<String> = cell.keys().cloned().collect();
    let mut processed = 0;

    while processed < worklist.len() {
        let child = worklist[processed].clone();
        processed += 1;

        let child_prob = match cell.get(&child) {
            Some(entry) => entry.probability,
            None => continue,
        };
        let Some(rules) = unary_by_child.get(child.as_str()) else {
            continue;
        };
        for rule in rules {
            let probability = rule.probability * child_prob;
            let backpointer = BackPointer::Unary { child: child.clone() };
            if improve(cell, &rule.variable, probability, backpointer)
                && !worklist[processed..].contains(&rule.variable)
            {
                worklist.push(rule.variable.clone());
            }
        }
    }
}

fn reconstruct_tree(chart: &Chart, variable: &str, i: usize, j: usize, words: &[String]) -> Node {
    let entry = chart[i][j].get(variable).unwrap_or_else(|| {
        panic!("reconstruct_tree: '{}' not found in chart for span ({}, {})", variable, i, j)
    });

    match &entry.backpointer {
        BackPointer::Terminal => Node::branch(variable, vec![Node::leaf(words[i].clone())]),
        BackPointer::Unary { child } => {
            let child_tree = reconstruct_tree(chart, child, i, j, words);
            Node::branch(variable, vec![child_tree])
        }
        BackPointer::Binary { split, left, right } => {
            let left_tree = reconstruct_tree(chart, left, i, *split, words);
            let right_tree = reconstruct_tree(chart, right, *split, j, words);
            Node::branch(variable, vec![left_tree, right_tree])
        }
    }
}
