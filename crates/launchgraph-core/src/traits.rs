use crate::{Function, FunctionId, ModuleId, NodeId, NodeKind};

/// Read access to an immutable snapshot of a program's syntax.
pub trait SyntaxTree: Send + Sync {
    fn node_kind(&self, node: NodeId) -> Option<&NodeKind>;
    fn children(&self, node: NodeId) -> &[NodeId];
    fn function(&self, function: FunctionId) -> Option<&Function>;
    fn function_count(&self) -> usize;

    /// Set once the host has thrown the snapshot away. Queries observing it
    /// abandon their work.
    fn is_disposed(&self) -> bool {
        false
    }
}

/// Outcome of resolving a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCall {
    pub target: FunctionId,
    pub qualified_name: String,
    /// Argument expressions mapped to the target's parameters.
    pub arguments: Vec<NodeId>,
}

pub trait NameResolver: Send + Sync {
    /// `None` when the callee is not a known function declaration.
    fn resolve_call(&self, call: NodeId) -> Option<ResolvedCall>;
}

/// Module membership, used only to pick candidate functions.
pub trait ModuleIndex: Send + Sync {
    fn modules(&self) -> Vec<ModuleId>;
    fn module_name(&self, module: ModuleId) -> Option<&str>;
    fn depends_on(&self, module: ModuleId, library: &str) -> bool;
    /// Every named function declared in the module, nested ones included.
    fn named_functions(&self, module: ModuleId) -> Vec<FunctionId>;
}

/// Everything the analysis needs from a host program representation.
pub trait ProgramModel: SyntaxTree + NameResolver + ModuleIndex {}

impl<T: SyntaxTree + NameResolver + ModuleIndex> ProgramModel for T {}

/// Receives completed-item counts while a bulk computation runs.
pub trait ProgressSink: Send + Sync {
    fn stage_started(&self, _stage: usize, _stages: usize, _total: usize) {}
    fn advance(&self, stage: usize, completed: usize, total: usize);
    fn stage_finished(&self, _stage: usize, _stages: usize) {}
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _stage: usize, _completed: usize, _total: usize) {}
}
