use crate::{Analyser, Expression, Terminated};
use launchgraph_core::{CountError, FunctionId, Result};
use std::collections::HashSet;
use tracing::trace;

/// Collapses deferred expressions into [`Terminated`] values.
///
/// One evaluator serves one query: its in-progress set starts empty and
/// records the chain of functions currently being expanded. Reaching a
/// function already on that chain is a recursion cycle and yields
/// `Unbounded` without looking any further.
pub struct Evaluator<'a> {
    analyser: &'a Analyser<'a>,
    in_progress: HashSet<FunctionId>,
}

impl<'a> Evaluator<'a> {
    pub fn new(analyser: &'a Analyser<'a>) -> Self {
        Self {
            analyser,
            in_progress: HashSet::new(),
        }
    }

    pub fn evaluate_function(&mut self, function: FunctionId) -> Result<Terminated> {
        self.evaluate(&Expression::FunctionRef(function))
    }

    pub fn evaluate(&mut self, expression: &Expression) -> Result<Terminated> {
        match expression {
            Expression::Constant(n) => Ok(Terminated::Constant(*n)),
            Expression::Indeterminate => Ok(Terminated::Indeterminate),
            Expression::Unbounded => Ok(Terminated::Unbounded),
            Expression::Sum(lhs, rhs) => {
                let lhs = self.evaluate(lhs)?;
                let rhs = self.evaluate(rhs)?;
                Ok(lhs + rhs)
            }
            Expression::FunctionRef(function) => self.expand(*function),
        }
    }

    fn expand(&mut self, function: FunctionId) -> Result<Terminated> {
        if self.analyser.program().is_disposed() {
            return Err(CountError::Cancelled);
        }
        if !self.in_progress.insert(function) {
            trace!("Recursion through {}", function);
            return Ok(Terminated::Unbounded);
        }

        let raw = self.analyser.analyse_function(function);
        let result = self.evaluate(&raw);
        self.in_progress.remove(&function);
        result
    }
}
