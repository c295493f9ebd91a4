use std::collections::HashMap;

use crate::grammar::{Grammar, Rule, VariableGenerator, EPSILON};
use crate::structs::{Node, ParseTree};

// --- Near-CNF Conversion ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    NewStart,
    EpsilonRule,
    Auxiliary,
}

/// Documents one change made while converting a grammar, keyed in the
/// change log by the variable it introduced (or, for an eliminated
/// epsilon rule, the variable it was removed from).
#[derive(Debug, Clone)]
pub struct PcfgChange {
    pub rule: Rule,
    pub kind: ChangeKind,
}

pub type ChangeLog = HashMap<String, PcfgChange>;

/// Converts a grammar into an equivalent near-CNF grammar: every rule
/// has derivation length <= 2, both symbols of a length-2 rule are
/// variables, and only the dedicated start symbol may derive epsilon.
/// The input grammar is assumed valid (see `Grammar::is_valid`).
pub fn to_near_cnf(grammar: &Grammar) -> (Grammar, ChangeLog) {
    let mut cnf = grammar.clone();
    let mut changes = ChangeLog::new();
    let mut gen = VariableGenerator::new();

    // Wrap the original start in a dedicated start symbol.
    let new_start = if cnf.is_variable("S0") || cnf.start == "S0" {
        gen.fresh(&cnf)
    } else {
        "S0".to_string()
    };
    let start_rule = Rule::new(new_start.clone(), vec![cnf.start.clone()], 1.0);
    changes.insert(new_start.clone(), PcfgChange { rule: start_rule.clone(), kind: ChangeKind::NewStart });
    cnf.add_rule(start_rule);
    cnf.start = new_start;

    binarize_long_rules(&mut cnf, &mut gen, &mut changes);
    isolate_terminals(&mut cnf, &mut gen, &mut changes);
    eliminate_epsilon_rules(&mut cnf, &mut changes);

    (cnf, changes)
}

fn sorted_variables(grammar: &Grammar) -> Vec<String> {
    let mut variables: Vec<String> = grammar.rules.keys().cloned().collect();
    variables.sort();
    variables
}

/// Pass 1: replace every rule `A -> B1 B2 .. Bn` (n > 2) with
/// `A -> B1 X` and a fresh tail `X -> B2 .. Bn` of probability 1,
/// repeating on the tail until all derivations have length <= 2.
pub(crate) fn binarize_long_rules(
    grammar: &mut Grammar,
    gen: &mut VariableGenerator,
    changes: &mut ChangeLog,
) {
    let mut dirty = true;
    while dirty {
        dirty = false;
        for variable in sorted_variables(grammar) {
            let long_rules: Vec<Rule> = grammar
                .rules_for(&variable)
                .iter()
                .filter(|r| r.derivation_length() > 2)
                .cloned()
                .collect();
            for rule in long_rules {
                convert_long_rule(grammar, rule, gen, changes);
                dirty = true;
            }
        }
    }
}

fn convert_long_rule(
    grammar: &mut Grammar,
    mut rule: Rule,
    gen: &mut VariableGenerator,
    changes: &mut ChangeLog,
) {
    while rule.derivation_length() > 2 {
        let fresh = gen.fresh(grammar);
        let head = Rule::new(
            rule.variable.clone(),
            vec![rule.derivation[0].clone(), fresh.clone()],
            rule.probability,
        );
        let tail = Rule::new(fresh.clone(), rule.derivation[1..].to_vec(), 1.0);
        grammar.add_rule(head);
        grammar.add_rule(tail.clone());
        grammar.remove_rule(&rule);
        changes.insert(fresh, PcfgChange { rule: tail.clone(), kind: ChangeKind::Auxiliary });
        rule = tail;
    }
}

/// Pass 2: in every length-2 rule, replace each side that is a terminal
/// with a fresh variable `X` carrying the single rule `X -> terminal`.
/// Both sides are checked independently.
pub(crate) fn isolate_terminals(
    grammar: &mut Grammar,
    gen: &mut VariableGenerator,
    changes: &mut ChangeLog,
) {
    let mut dirty = true;
    while dirty {
        dirty = false;
        for variable in sorted_variables(grammar) {
            let mixed_rules: Vec<Rule> = grammar
                .rules_for(&variable)
                .iter()
                .filter(|r| {
                    r.derivation_length() == 2
                        && (!grammar.is_variable(&r.derivation[0])
                            || !grammar.is_variable(&r.derivation[1]))
                })
                .cloned()
                .collect();
            for rule in mixed_rules {
                convert_mixed_rule(grammar, rule, gen, changes);
                dirty = true;
            }
        }
    }
}

fn convert_mixed_rule(
    grammar: &mut Grammar,
    rule: Rule,
    gen: &mut VariableGenerator,
    changes: &mut ChangeLog,
) {
    let mut derivation = rule.derivation.clone();
    for side in 0..2 {
        if !grammar.is_variable(&derivation[side]) {
            let fresh = gen.fresh(grammar);
            let lexical = Rule::new(fresh.clone(), vec![derivation[side].clone()], 1.0);
            derivation[side] = fresh.clone();
            grammar.add_rule(lexical.clone());
            changes.insert(fresh, PcfgChange { rule: lexical, kind: ChangeKind::Auxiliary });
        }
    }
    grammar.add_rule(Rule::new(rule.variable.clone(), derivation, rule.probability));
    grammar.remove_rule(&rule);
}

/// Pass 3: remove every epsilon rule on a non-start variable and
/// redistribute its probability mass into the rules that mention the
/// variable. Rewriting can surface new epsilon rules, so the pass
/// rescans until none remain.
pub(crate) fn eliminate_epsilon_rules(grammar: &mut Grammar, changes: &mut ChangeLog) {
    // Each round eliminates at least one epsilon rule and the set of
    // variables is finite, so a legitimate grammar converges quickly.
    // Degenerate cycles (mutually-nullable variables with no terminal
    // yield) would regenerate shrinking epsilon mass forever.
    let variable_count = grammar.rules.len();
    let max_rounds = variable_count * variable_count + 64;
    let mut rounds = 0;

    let mut dirty = true;
    while dirty {
        dirty = false;
        rounds += 1;
        if rounds > max_rounds {
            panic!(
                "epsilon elimination did not reach a fixpoint after {} passes",
                max_rounds
            );
        }
        for variable in sorted_variables(grammar) {
            if variable == grammar.start {
                continue;
            }
            let epsilon_rule = grammar
                .rules_for(&variable)
                .iter()
                .find(|r| r.is_epsilon())
                .cloned();
            if let Some(rule) = epsilon_rule {
                eliminate_e_rule(grammar, &rule, changes);
                dirty = true;
            }
        }
    }
}

fn eliminate_e_rule(grammar: &mut Grammar, rule: &Rule, changes: &mut ChangeLog) {
    let p = rule.probability;

    // Drop the epsilon rule and renormalize the variable's remaining mass.
    grammar.remove_rule(rule);
    if let Some(rules) = grammar.rules.get_mut(&rule.variable) {
        for r in rules.iter_mut() {
            r.probability /= 1.0 - p;
        }
    }
    changes
        .entry(rule.variable.clone())
        .or_insert(PcfgChange { rule: rule.clone(), kind: ChangeKind::EpsilonRule });

    adjust_e_rule_rhs(grammar, &rule.variable, p);
}

/// Rewrites every rule mentioning the eliminated variable `a`. The new
/// probabilities are computed from the rule set as it stood when the
/// epsilon rule was removed, so the outcome does not depend on rule
/// order: each merge targets a distinct derivation.
fn adjust_e_rule_rhs(grammar: &mut Grammar, a: &str, p: f64) {
    for variable in sorted_variables(grammar) {
        let mut additions: Vec<(Vec<String>, f64)> = Vec::new();
        if let Some(rules) = grammar.rules.get_mut(&variable) {
            for r in rules.iter_mut() {
                if !r.derivation.iter().any(|s| s == a) {
                    continue;
                }
                if r.derivation_length() == 2 {
                    let (left, right) = (r.derivation[0].clone(), r.derivation[1].clone());
                    if left == a && right == a {
                        // B -> A A: both sides may vanish.
                        additions.push((vec![EPSILON.to_string()], r.probability * p * p));
                        additions.push((vec![a.to_string()], 2.0 * r.probability * p * (1.0 - p)));
                        r.probability *= (1.0 - p) * (1.0 - p);
                    } else if left == a {
                        additions.push((vec![right], r.probability * p));
                        r.probability *= 1.0 - p;
                    } else if right == a {
                        additions.push((vec![left], r.probability * p));
                        r.probability *= 1.0 - p;
                    }
                } else if r.derivation_length() == 1 {
                    // B -> A: the whole derivation may vanish.
                    additions.push((vec![EPSILON.to_string()], r.probability * p));
                    r.probability *= 1.0 - p;
                }
            }
        }
        for (derivation, mass) in additions {
            merge_or_create(grammar, &variable, derivation, mass);
        }
    }
}

/// Adds `mass` to the rule `variable -> derivation`, creating the rule
/// if no rule with that derivation exists yet.
fn merge_or_create(grammar: &mut Grammar, variable: &str, derivation: Vec<String>, mass: f64) {
    if let Some(rules) = grammar.rules.get_mut(variable) {
        if let Some(existing) = rules.iter_mut().find(|r| r.derivation == derivation) {
            existing.probability += mass;
            return;
        }
    }
    grammar.add_rule(Rule::new(variable, derivation, mass));
}

// --- Tree Back-Mapping ---

/// Maps a parse tree over the converted grammar back onto the original
/// grammar: drops the synthetic start wrapper and splices out every
/// auxiliary node recorded in the change log, inlining its children.
/// The probability is left untouched.
pub fn back_map(tree: ParseTree, changes: &ChangeLog) -> ParseTree {
    let mut root = tree.root;
    let wraps_start = matches!(changes.get(&root.label), Some(c) if c.kind == ChangeKind::NewStart);
    if wraps_start && root.children.len() == 1 {
        root = root.children.remove(0);
    }
    ParseTree { root: strip_auxiliaries(root, changes), probability: tree.probability }
}

fn strip_auxiliaries(node: Node, changes: &ChangeLog) -> Node {
    if node.is_terminal() {
        return node;
    }
    let mut new_children = Vec::new();
    for child in node.children {
        // Flatten the child's own auxiliaries first, then splice the
        // child itself out if it was introduced by the conversion.
        let child = strip_auxiliaries(child, changes);
        let is_auxiliary = !child.is_terminal()
            && matches!(changes.get(&child.label), Some(c) if c.kind == ChangeKind::Auxiliary);
        if is_auxiliary {
            new_children.extend(child.children);
        } else {
            new_children.push(child);
        }
    }
    Node { label: node.label, children: new_children }
}
