use std::collections::HashMap;
use std::fmt;

// --- Grammar Structures ---

/// The reserved token that marks an epsilon production when it is the
/// only symbol of a derivation.
pub const EPSILON: &str = "";

/// A weighted production `variable -> derivation` with a probability.
#[derive(Debug, Clone)]
pub struct Rule {
    pub variable: String,
    pub derivation: Vec<String>,
    pub probability: f64,
}

impl Rule {
    pub fn new(variable: impl Into<String>, derivation: Vec<String>, probability: f64) -> Rule {
        Rule { variable: variable.into(), derivation, probability }
    }

    pub fn derivation_length(&self) -> usize {
        self.derivation.len()
    }

    pub fn is_epsilon(&self) -> bool {
        self.derivation.len() == 1 && self.derivation[0] == EPSILON
    }
}

/// Rules are equal when variable and derivation match. Probability is
/// excluded so that rules sharing a derivation can be merged by adding
/// their probabilities.
impl PartialEq for Rule {
    fn eq(&self, other: &Rule) -> bool {
        self.variable == other.variable && self.derivation == other.derivation
    }
}

impl Eq for Rule {}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.variable, self.derivation.join(" "), self.probability)
    }
}

/// A probabilistic context-free grammar: a start symbol and a mapping
/// from each variable to its list of rules. A symbol is a terminal
/// exactly when it is absent from the `rules` map.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub start: String,
    pub rules: HashMap<String, Vec<Rule>>,
    pub size: usize,
}

impl Grammar {
    pub fn new(start: impl Into<String>) -> Grammar {
        Grammar { start: start.into(), rules: HashMap::new(), size: 0 }
    }

    pub fn with_rules(start: impl Into<String>, rules: Vec<Rule>) -> Grammar {
        let mut grammar = Grammar::new(start);
        for rule in rules {
            grammar.add_rule(rule);
        }
        grammar
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.entry(rule.variable.clone()).or_default().push(rule);
        self.size += 1;
    }

    /// Removes the rule matching `rule` by (variable, derivation).
    /// Removing a rule that is not present is a no-op.
    pub fn remove_rule(&mut self, rule: &Rule) {
        if let Some(rules) = self.rules.get_mut(&rule.variable) {
            if let Some(pos) = rules.iter().position(|r| r == rule) {
                rules.remove(pos);
                self.size -= 1;
            }
        }
    }

    pub fn is_variable(&self, symbol: &str) -> bool {
        self.rules.contains_key(symbol)
    }

    pub fn rules_for(&self, variable: &str) -> &[Rule] {
        self.rules.get(variable).map_or(&[], Vec::as_slice)
    }

    /// Checks that the rule probabilities of every variable sum to 1
    /// within tolerance. Variables without rules do not participate.
    pub fn is_valid(&self) -> bool {
        for rules in self.rules.values() {
            if rules.is_empty() {
                continue;
            }
            let prob_sum: f64 = rules.iter().map(|r| r.probability).sum();
            if !(0.9999..=1.0001).contains(&prob_sum) {
                return false;
            }
        }
        true
    }
}

// --- Fresh Variables ---

/// Yields variable names `X1`, `X2`, ... that are not keys of the
/// grammar. Membership is re-checked against the live rule set on every
/// call, so names consumed by earlier passes are never handed out again.
#[derive(Debug)]
pub struct VariableGenerator {
    next: usize,
}

impl VariableGenerator {
    pub fn new() -> VariableGenerator {
        VariableGenerator { next: 1 }
    }

    pub fn fresh(&mut self, grammar: &Grammar) -> String {
        let mut candidate = format!("X{}", self.next);
        while grammar.rules.contains_key(&candidate) {
            self.next += 1;
            candidate = format!("X{}", self.next);
        }
        candidate
    }
}

impl Default for VariableGenerator {
    fn default() -> VariableGenerator {
        VariableGenerator::new()
    }
}
