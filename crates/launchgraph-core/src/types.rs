use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Handle of a declared function in a program arena.
///
/// Equality is identity: two declarations with identical text get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

/// Handle of a syntax node in a program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// Handle of a compilation unit (module) in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ModuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    For,
    While,
    DoWhile,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopKind::For => "for",
            LoopKind::While => "while",
            LoopKind::DoWhile => "do-while",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LoopKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "for" => Ok(LoopKind::For),
            "while" => Ok(LoopKind::While),
            "do-while" | "do_while" | "dowhile" => Ok(LoopKind::DoWhile),
            other => Err(format!("unknown loop kind: {}", other)),
        }
    }
}

/// Structural classification of a syntax node.
///
/// Nodes that only matter through their children (blocks, name references,
/// literals, receivers of qualified calls) are `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    FunctionDeclaration {
        function: FunctionId,
    },
    Call {
        /// Callee as written at the call site, qualified or not.
        callee: String,
        /// Target already resolved by the host, when it has one.
        #[serde(default)]
        target: Option<FunctionId>,
        arguments: Vec<NodeId>,
    },
    Lambda,
    CallableReference,
    Try,
    Loop {
        loop_kind: LoopKind,
    },
    If {
        #[serde(default)]
        condition: Option<NodeId>,
        #[serde(default)]
        then_branch: Option<NodeId>,
        #[serde(default)]
        else_branch: Option<NodeId>,
    },
    When {
        #[serde(default)]
        subject: Option<NodeId>,
        entries: Vec<NodeId>,
    },
    WhenEntry {
        #[serde(default)]
        conditions: Vec<NodeId>,
        #[serde(default)]
        body: Option<NodeId>,
    },
    Other {
        #[serde(default)]
        label: String,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::FunctionDeclaration { .. } => "function_declaration",
            NodeKind::Call { .. } => "call",
            NodeKind::Lambda => "lambda",
            NodeKind::CallableReference => "callable_reference",
            NodeKind::Try => "try",
            NodeKind::Loop { .. } => "loop",
            NodeKind::If { .. } => "if",
            NodeKind::When { .. } => "when",
            NodeKind::WhenEntry { .. } => "when_entry",
            NodeKind::Other { .. } => "other",
        }
    }

    /// Nodes named by the kind itself, in addition to the node's children.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Call { arguments, .. } => arguments.clone(),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => [*condition, *then_branch, *else_branch]
                .into_iter()
                .flatten()
                .collect(),
            NodeKind::When { subject, entries } => {
                subject.iter().chain(entries).copied().collect()
            }
            NodeKind::WhenEntry { conditions, body } => {
                conditions.iter().chain(body).copied().collect()
            }
            NodeKind::FunctionDeclaration { .. }
            | NodeKind::Lambda
            | NodeKind::CallableReference
            | NodeKind::Try
            | NodeKind::Loop { .. }
            | NodeKind::Other { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_column: Option<u32>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.line, self.column)
    }
}
