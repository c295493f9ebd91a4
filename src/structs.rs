use std::fmt;

// --- Tree Structures ---

/// A node in a parse tree. A terminal (a word of the input) is a leaf
/// node with no children.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub label: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn leaf(label: impl Into<String>) -> Node {
        Node { label: label.into(), children: vec![] }
    }

    pub fn branch(label: impl Into<String>, children: Vec<Node>) -> Node {
        Node { label: label.into(), children }
    }

    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_terminal() {
            return write!(f, "{}", self.label);
        }
        write!(f, "({}", self.label)?;
        for child in &self.children {
            write!(f, " {}", child)?;
        }
        write!(f, ")")
    }
}

/// A complete parse tree together with its Viterbi probability.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseTree {
    pub root: Node,
    pub probability: f64,
}

impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (p={})", self.root, self.probability)
    }
}
