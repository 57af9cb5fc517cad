use crate::Expression;
use dashmap::DashMap;
use launchgraph_core::FunctionId;

/// Raw (unevaluated) expression per function, shared by every worker.
///
/// Entries are written once and never replaced. Two workers may compute the
/// same entry concurrently; the first insert is kept and both see it.
#[derive(Debug, Default)]
pub struct ExpressionMemo {
    entries: DashMap<FunctionId, Expression>,
}

impl ExpressionMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, function: FunctionId) -> Option<Expression> {
        self.entries.get(&function).map(|e| e.value().clone())
    }

    pub fn contains(&self, function: FunctionId) -> bool {
        self.entries.contains_key(&function)
    }

    /// Stores `expression` unless an entry exists, returning whichever is kept.
    pub fn insert_if_absent(&self, function: FunctionId, expression: Expression) -> Expression {
        self.entries
            .entry(function)
            .or_insert(expression)
            .value()
            .clone()
    }

    /// `compute` runs without any shard lock held, so it may recurse into the
    /// memo for other functions.
    pub fn get_or_compute(
        &self,
        function: FunctionId,
        compute: impl FnOnce() -> Expression,
    ) -> Expression {
        if let Some(existing) = self.get(function) {
            return existing;
        }
        self.insert_if_absent(function, compute())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
