use crate::{CallClassifier, Expression, ExpressionMemo};
use launchgraph_core::{FunctionId, NodeId, NodeKind, ProgramModel};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Structural visitor producing one [`Expression`] per syntax node.
///
/// Unless a node kind has its own rule, a node contributes the sum of its
/// children. Function declarations are memoized in the shared
/// [`ExpressionMemo`], so each body is walked at most once per session.
pub struct Analyser<'a> {
    program: &'a dyn ProgramModel,
    classifier: &'a CallClassifier,
    memo: &'a ExpressionMemo,
}

impl<'a> Analyser<'a> {
    pub fn new(
        program: &'a dyn ProgramModel,
        classifier: &'a CallClassifier,
        memo: &'a ExpressionMemo,
    ) -> Self {
        Self {
            program,
            classifier,
            memo,
        }
    }

    pub fn program(&self) -> &'a dyn ProgramModel {
        self.program
    }

    /// Raw expression of `function`, computed and memoized on first use.
    pub fn analyse_function(&self, function: FunctionId) -> Expression {
        if let Some(existing) = self.memo.get(function) {
            return existing;
        }

        let Some(declared) = self.program.function(function) else {
            debug!("{} is not part of the program", function);
            return Expression::Indeterminate;
        };
        match declared.declaration {
            Some(node) => self.visit(node),
            // Library code: nothing in the snapshot can launch.
            None => self.memo.insert_if_absent(function, Expression::ZERO),
        }
    }

    pub fn visit(&self, node: NodeId) -> Expression {
        let Some(kind) = self.program.node_kind(node) else {
            return Expression::ZERO;
        };

        match kind {
            NodeKind::FunctionDeclaration { function } => {
                self.visit_function_declaration(node, *function)
            }
            NodeKind::CallableReference => Expression::ZERO,
            NodeKind::Lambda => Expression::ZERO,
            NodeKind::Try => Expression::Indeterminate,
            NodeKind::Loop { .. } => Expression::Indeterminate,
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.visit_if(*condition, *then_branch, *else_branch),
            NodeKind::When { subject, entries } => self.visit_when(*subject, entries),
            NodeKind::WhenEntry { conditions, body } => self.visit_when_entry(conditions, *body),
            NodeKind::Call { .. } => self.visit_call(node),
            NodeKind::Other { .. } => self.visit_children(node),
        }
    }

    /// Default rule: sum of the children, left to right, starting from zero.
    pub fn visit_children(&self, node: NodeId) -> Expression {
        self.program
            .children(node)
            .iter()
            .fold(Expression::ZERO, |acc, child| acc + self.visit(*child))
    }

    fn visit_function_declaration(&self, node: NodeId, function: FunctionId) -> Expression {
        self.memo.get_or_compute(function, || {
            let expression = self.visit_children(node);
            debug!("Analysed {}: {}", function, expression);
            expression
        })
    }

    fn visit_if(
        &self,
        condition: Option<NodeId>,
        then_branch: Option<NodeId>,
        else_branch: Option<NodeId>,
    ) -> Expression {
        let present: Vec<NodeId> = [then_branch, else_branch].into_iter().flatten().collect();
        if present.is_empty() {
            return Expression::Indeterminate;
        }
        let Some(branches) = self.common_branch(&present) else {
            return Expression::Indeterminate;
        };
        self.visit_optional(condition) + branches
    }

    fn visit_when(&self, subject: Option<NodeId>, entries: &[NodeId]) -> Expression {
        let entries = if entries.is_empty() {
            Expression::ZERO
        } else {
            self.common_branch(entries)
                .unwrap_or(Expression::Indeterminate)
        };
        self.visit_optional(subject) + entries
    }

    /// A guard that may itself launch work makes the entry unpredictable.
    fn visit_when_entry(&self, conditions: &[NodeId], body: Option<NodeId>) -> Expression {
        let guards_are_inert = conditions
            .iter()
            .all(|condition| self.visit(*condition) == Expression::ZERO);
        if guards_are_inert {
            self.visit_optional(body)
        } else {
            Expression::Indeterminate
        }
    }

    fn visit_call(&self, node: NodeId) -> Expression {
        let Some(resolved) = self.program.resolve_call(node) else {
            trace!("Unresolved call at {}", node);
            return Expression::Indeterminate;
        };

        let categories = self.classifier.classify(&resolved.qualified_name);
        let arguments = resolved.arguments.iter().fold(Expression::ZERO, |acc, argument| {
            let contribution = if categories.lambda_immediately_invoked && self.is_lambda(*argument)
            {
                self.visit_children(*argument)
            } else {
                self.visit(*argument)
            };
            acc + contribution
        });

        let callee = if categories.launch_builtin {
            Expression::ONE
        } else {
            Expression::FunctionRef(resolved.target)
        };
        callee + arguments
    }

    /// The shared expression of all branches, or `None` when they disagree.
    fn common_branch(&self, branches: &[NodeId]) -> Option<Expression> {
        let distinct: HashSet<Expression> = branches.iter().map(|b| self.visit(*b)).collect();
        if distinct.len() == 1 {
            distinct.into_iter().next()
        } else {
            None
        }
    }

    fn visit_optional(&self, node: Option<NodeId>) -> Expression {
        node.map(|n| self.visit(n)).unwrap_or(Expression::ZERO)
    }

    fn is_lambda(&self, node: NodeId) -> bool {
        matches!(self.program.node_kind(node), Some(NodeKind::Lambda))
    }
}
