//! Arena-backed program snapshot.
//!
//! `Program` is the representation shipped with LaunchGraph: a flat arena of
//! syntax nodes plus the functions and modules that own them. It implements
//! [`SyntaxTree`], [`NameResolver`] and [`ModuleIndex`], so it can be handed
//! to the analysis directly. Hosts with their own syntax trees implement the
//! traits instead.

use crate::{
    CountError, FunctionId, Location, LoopKind, ModuleId, ModuleIndex, NameResolver, NodeId, NodeKind,
    ResolvedCall, Result, SyntaxTree,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub qualified_name: String,
    #[serde(default)]
    pub location: Location,
    /// Declaration node. Library functions have none; their bodies are opaque.
    #[serde(default)]
    pub declaration: Option<NodeId>,
    #[serde(default)]
    pub module: Option<ModuleId>,
}

impl Function {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        let name = simple_name(&qualified_name).to_string();
        Self {
            name,
            qualified_name,
            location: Location::default(),
            declaration: None,
            module: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }

    pub fn is_library(&self) -> bool {
        self.declaration.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    /// Presentable names of the libraries this module depends on.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Top-level nodes of the module's files.
    #[serde(default)]
    pub roots: Vec<NodeId>,
}

fn simple_name(qualified_name: &str) -> &str {
    qualified_name
        .rsplit('.')
        .next()
        .unwrap_or(qualified_name)
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    modules: Vec<Module>,
    functions: Vec<Function>,
    nodes: Vec<SyntaxNode>,
    #[serde(skip)]
    by_qualified_name: HashMap<String, Vec<FunctionId>>,
    #[serde(skip)]
    disposed: AtomicBool,
}

impl Program {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut program: Program = serde_json::from_str(json)?;
        program.validate()?;
        program.reindex();
        debug!(
            "Loaded program: {} modules, {} functions, {} nodes",
            program.modules.len(),
            program.functions.len(),
            program.nodes.len()
        );
        Ok(program)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn node(&self, node: NodeId) -> Option<&SyntaxNode> {
        self.nodes.get(node.index())
    }

    pub fn module(&self, module: ModuleId) -> Option<&Module> {
        self.modules.get(module.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every function declared with this qualified name, in declaration order.
    pub fn find_functions(&self, qualified_name: &str) -> &[FunctionId] {
        self.by_qualified_name
            .get(qualified_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Marks the snapshot as thrown away by its host.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn reindex(&mut self) {
        self.by_qualified_name.clear();
        for (i, function) in self.functions.iter().enumerate() {
            self.by_qualified_name
                .entry(function.qualified_name.clone())
                .or_default()
                .push(FunctionId(i as u32));
        }
    }

    /// Checks that every handle in the arena points at something that exists,
    /// that declarations and functions agree with each other, and that no node
    /// is reachable from itself.
    pub fn validate(&self) -> Result<()> {
        let node_ok = |id: NodeId| id.index() < self.nodes.len();
        let function_ok = |id: FunctionId| id.index() < self.functions.len();
        let invalid = |msg: String| Err(CountError::InvalidProgram(msg));

        for (i, node) in self.nodes.iter().enumerate() {
            let here = NodeId(i as u32);
            if let Some(child) = node.children.iter().find(|c| !node_ok(**c)) {
                return invalid(format!("{} has dangling child {}", here, child));
            }

            let referenced = node.kind.referenced_nodes();
            match &node.kind {
                NodeKind::FunctionDeclaration { function } => {
                    let Some(owner) = self.functions.get(function.index()) else {
                        return invalid(format!("{} declares unknown {}", here, function));
                    };
                    if owner.declaration != Some(here) {
                        return invalid(format!(
                            "{} declares {} but the function points elsewhere",
                            here, owner.qualified_name
                        ));
                    }
                }
                NodeKind::Call {
                    target: Some(target),
                    ..
                } if !function_ok(*target) => {
                    return invalid(format!("{} calls unknown {}", here, target));
                }
                _ => {}
            }
            if let Some(dangling) = referenced.into_iter().find(|n| !node_ok(*n)) {
                return invalid(format!("{} references dangling {}", here, dangling));
            }
        }

        for (i, function) in self.functions.iter().enumerate() {
            if let Some(declaration) = function.declaration {
                let declared = self.nodes.get(declaration.index()).map(|n| &n.kind);
                match declared {
                    Some(NodeKind::FunctionDeclaration { function: owner })
                        if owner.index() == i => {}
                    _ => {
                        return invalid(format!(
                            "{} has no matching declaration node",
                            function.qualified_name
                        ))
                    }
                }
            }
            if let Some(module) = function.module {
                if module.index() >= self.modules.len() {
                    return invalid(format!(
                        "{} belongs to unknown module {}",
                        function.qualified_name, module.0
                    ));
                }
            }
        }

        for module in &self.modules {
            if let Some(root) = module.roots.iter().find(|r| !node_ok(**r)) {
                return invalid(format!("module {} has dangling root {}", module.name, root));
            }
        }

        self.check_acyclic()
    }

    /// Children and the nodes named inside each kind must form a DAG; the
    /// walkers over the arena recurse along both without a visited set.
    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let edges = |index: usize| -> Vec<NodeId> {
            let node = &self.nodes[index];
            let mut edges = node.children.clone();
            edges.extend(node.kind.referenced_nodes());
            edges
        };

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnStack;
            let mut stack = vec![(start, edges(start), 0usize)];

            while let Some((node, next, cursor)) = stack.last_mut() {
                let Some(target) = next.get(*cursor).map(|n| n.index()) else {
                    marks[*node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                *cursor += 1;
                match marks[target] {
                    Mark::OnStack => {
                        return Err(CountError::InvalidProgram(format!(
                            "{} is its own ancestor",
                            NodeId(target as u32)
                        )))
                    }
                    Mark::Done => {}
                    Mark::Unvisited => {
                        marks[target] = Mark::OnStack;
                        stack.push((target, edges(target), 0));
                    }
                }
            }
        }
        Ok(())
    }
}

impl SyntaxTree for Program {
    fn node_kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node.index()).map(|n| &n.kind)
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.index())
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn function(&self, function: FunctionId) -> Option<&Function> {
        self.functions.get(function.index())
    }

    fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl NameResolver for Program {
    /// A target recorded on the call site wins. Otherwise the callee text must
    /// name exactly one declared function; overloads stay unresolved.
    fn resolve_call(&self, call: NodeId) -> Option<ResolvedCall> {
        let NodeKind::Call {
            callee,
            target,
            arguments,
        } = self.node_kind(call)?
        else {
            return None;
        };

        let target = match target {
            Some(target) => *target,
            None => match self.find_functions(callee) {
                [only] => *only,
                _ => return None,
            },
        };
        let function = self.function(target)?;

        Some(ResolvedCall {
            target,
            qualified_name: function.qualified_name.clone(),
            arguments: arguments.clone(),
        })
    }
}

impl ModuleIndex for Program {
    fn modules(&self) -> Vec<ModuleId> {
        (0..self.modules.len() as u32).map(ModuleId).collect()
    }

    fn module_name(&self, module: ModuleId) -> Option<&str> {
        self.module(module).map(|m| m.name.as_str())
    }

    fn depends_on(&self, module: ModuleId, library: &str) -> bool {
        self.module(module)
            .map(|m| m.libraries.iter().any(|name| name.contains(library)))
            .unwrap_or(false)
    }

    fn named_functions(&self, module: ModuleId) -> Vec<FunctionId> {
        let Some(module) = self.module(module) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = module.roots.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if let Some(NodeKind::FunctionDeclaration { function }) = self.node_kind(node) {
                if !found.contains(function) {
                    found.push(*function);
                }
            }
            stack.extend(self.children(node).iter().rev());
        }
        found
    }
}

/// Incremental construction of a [`Program`]. Nodes are created bottom-up;
/// every constructor returns the handle of the node it added.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    modules: Vec<Module>,
    functions: Vec<Function>,
    nodes: Vec<SyntaxNode>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&mut self, name: &str, libraries: &[&str]) -> ModuleId {
        self.modules.push(Module {
            name: name.to_string(),
            libraries: libraries.iter().map(|l| l.to_string()).collect(),
            roots: Vec::new(),
        });
        ModuleId(self.modules.len() as u32 - 1)
    }

    /// A function whose body is not part of the snapshot (library code).
    pub fn library_function(&mut self, qualified_name: &str) -> FunctionId {
        self.push_function(Function::new(qualified_name))
    }

    /// Declares a function owned by `module`; give it a body with [`Self::define`].
    pub fn function(&mut self, module: ModuleId, qualified_name: &str) -> FunctionId {
        self.push_function(Function::new(qualified_name).with_module(module))
    }

    pub fn set_location(&mut self, function: FunctionId, location: Location) {
        if let Some(f) = self.functions.get_mut(function.index()) {
            f.location = location;
        }
    }

    fn push_function(&mut self, function: Function) -> FunctionId {
        self.functions.push(function);
        FunctionId(self.functions.len() as u32 - 1)
    }

    fn push(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        self.nodes.push(SyntaxNode { kind, children });
        NodeId(self.nodes.len() as u32 - 1)
    }

    /// Creates the declaration node of `function` with `body` as its children.
    /// The node can be nested in another body to model a local function.
    pub fn define(&mut self, function: FunctionId, body: Vec<NodeId>) -> NodeId {
        let node = self.push(NodeKind::FunctionDeclaration { function }, body);
        if let Some(f) = self.functions.get_mut(function.index()) {
            f.declaration = Some(node);
        }
        node
    }

    /// Defines `function` and registers it as a top-level declaration of `module`.
    pub fn top_level(&mut self, module: ModuleId, function: FunctionId, body: Vec<NodeId>) -> NodeId {
        let node = self.define(function, body);
        self.add_root(module, node);
        node
    }

    pub fn add_root(&mut self, module: ModuleId, node: NodeId) {
        if let Some(m) = self.modules.get_mut(module.index()) {
            m.roots.push(node);
        }
    }

    /// Call resolved through the qualified-name index at analysis time.
    pub fn call(&mut self, callee: &str, arguments: Vec<NodeId>) -> NodeId {
        self.push(
            NodeKind::Call {
                callee: callee.to_string(),
                target: None,
                arguments: arguments.clone(),
            },
            arguments,
        )
    }

    /// Call whose target the host already resolved.
    pub fn call_to(&mut self, target: FunctionId, arguments: Vec<NodeId>) -> NodeId {
        let callee = self
            .functions
            .get(target.index())
            .map(|f| f.qualified_name.clone())
            .unwrap_or_default();
        self.push(
            NodeKind::Call {
                callee,
                target: Some(target),
                arguments: arguments.clone(),
            },
            arguments,
        )
    }

    pub fn lambda(&mut self, body: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Lambda, body)
    }

    pub fn callable_reference(&mut self, children: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::CallableReference, children)
    }

    pub fn try_block(&mut self, children: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Try, children)
    }

    pub fn loop_node(&mut self, loop_kind: LoopKind, body: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Loop { loop_kind }, body)
    }

    pub fn if_node(
        &mut self,
        condition: Option<NodeId>,
        then_branch: Option<NodeId>,
        else_branch: Option<NodeId>,
    ) -> NodeId {
        let children = [condition, then_branch, else_branch]
            .into_iter()
            .flatten()
            .collect();
        self.push(
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            },
            children,
        )
    }

    pub fn when_node(&mut self, subject: Option<NodeId>, entries: Vec<NodeId>) -> NodeId {
        let mut children: Vec<NodeId> = subject.into_iter().collect();
        children.extend(&entries);
        self.push(NodeKind::When { subject, entries }, children)
    }

    pub fn when_entry(&mut self, conditions: Vec<NodeId>, body: Option<NodeId>) -> NodeId {
        let mut children = conditions.clone();
        children.extend(body);
        self.push(NodeKind::WhenEntry { conditions, body }, children)
    }

    /// Any node without its own rule: blocks, references, literals, receivers.
    pub fn other(&mut self, label: &str, children: Vec<NodeId>) -> NodeId {
        self.push(
            NodeKind::Other {
                label: label.to_string(),
            },
            children,
        )
    }

    pub fn block(&mut self, children: Vec<NodeId>) -> NodeId {
        self.other("block", children)
    }

    /// `receiver.call(...)`
    pub fn qualified(&mut self, receiver: NodeId, call: NodeId) -> NodeId {
        self.other("dot_qualified", vec![receiver, call])
    }

    pub fn build(self) -> Result<Program> {
        let mut program = Program {
            modules: self.modules,
            functions: self.functions,
            nodes: self.nodes,
            by_qualified_name: HashMap::new(),
            disposed: AtomicBool::new(false),
        };
        program.validate()?;
        program.reindex();
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Program, FunctionId, FunctionId, FunctionId) {
        let mut b = ProgramBuilder::new();
        let app = b.module("app", &["kotlinx-coroutines-core-1.6.4"]);
        let launch = b.library_function("kotlinx.coroutines.launch");
        let outer = b.function(app, "demo.outer");
        let inner = b.function(app, "demo.inner");

        let body = b.lambda(vec![]);
        let call = b.call("kotlinx.coroutines.launch", vec![body]);
        let inner_decl = b.define(inner, vec![call]);
        let local_call = b.call_to(inner, vec![]);
        let loop_body = b.block(vec![local_call]);
        let looped = b.loop_node(LoopKind::While, vec![loop_body]);
        b.top_level(app, outer, vec![inner_decl, looped]);

        (b.build().unwrap(), launch, outer, inner)
    }

    #[test]
    fn named_functions_include_nested_declarations() {
        let (program, _, outer, inner) = sample();
        let module = program.modules()[0];
        assert_eq!(program.named_functions(module), vec![outer, inner]);
        assert!(program.depends_on(module, "kotlinx-coroutines-core"));
        assert!(!program.depends_on(module, "ktor-server"));
    }

    #[test]
    fn resolves_by_qualified_name_and_by_recorded_target() {
        let (program, launch, _, inner) = sample();

        let (call, _) = program
            .nodes
            .iter()
            .enumerate()
            .find(|(_, n)| matches!(&n.kind, NodeKind::Call { target: None, .. }))
            .unwrap();
        let resolved = program.resolve_call(NodeId(call as u32)).unwrap();
        assert_eq!(resolved.target, launch);
        assert_eq!(resolved.qualified_name, "kotlinx.coroutines.launch");
        assert_eq!(resolved.arguments.len(), 1);

        let (call, _) = program
            .nodes
            .iter()
            .enumerate()
            .find(|(_, n)| matches!(&n.kind, NodeKind::Call { target: Some(_), .. }))
            .unwrap();
        assert_eq!(program.resolve_call(NodeId(call as u32)).unwrap().target, inner);
    }

    #[test]
    fn overloaded_names_stay_unresolved() {
        let mut b = ProgramBuilder::new();
        let app = b.module("app", &[]);
        let first = b.function(app, "demo.f");
        let second = b.function(app, "demo.f");
        let call = b.call("demo.f", vec![]);
        b.top_level(app, first, vec![call]);
        b.top_level(app, second, vec![]);
        let program = b.build().unwrap();

        assert_eq!(program.find_functions("demo.f"), &[first, second]);
        assert_eq!(program.resolve_call(call), None);
    }

    #[test]
    fn json_snapshot_survives_reload() {
        let (program, _, outer, _) = sample();
        let json = program.to_json().unwrap();
        let reloaded = Program::from_json(&json).unwrap();
        assert_eq!(reloaded.function(outer).unwrap().name, "outer");
        assert_eq!(reloaded.node_count(), program.node_count());
        assert_eq!(reloaded.find_functions("demo.inner").len(), 1);
    }

    #[test]
    fn dangling_references_are_rejected() {
        let json = r#"{
            "functions": [{"name": "f", "qualified_name": "f", "declaration": 0}],
            "nodes": [{"kind": {"type": "function_declaration", "function": 0}, "children": [7]}]
        }"#;
        let err = Program::from_json(json).unwrap_err();
        assert!(matches!(err, CountError::InvalidProgram(_)));
    }

    #[test]
    fn cyclic_children_are_rejected() {
        let json = r#"{
            "functions": [{"name": "f", "qualified_name": "f", "declaration": 0}],
            "nodes": [
                {"kind": {"type": "function_declaration", "function": 0}, "children": [1]},
                {"kind": {"type": "other", "label": "block"}, "children": [2]},
                {"kind": {"type": "other", "label": "block"}, "children": [1]}
            ]
        }"#;
        let err = Program::from_json(json).unwrap_err();
        assert!(matches!(err, CountError::InvalidProgram(msg) if msg.contains("ancestor")));
    }

    #[test]
    fn self_referencing_branch_is_rejected() {
        let json = r#"{
            "functions": [],
            "nodes": [
                {"kind": {"type": "if", "condition": null, "then_branch": 0, "else_branch": null}}
            ]
        }"#;
        let err = Program::from_json(json).unwrap_err();
        assert!(matches!(err, CountError::InvalidProgram(_)));
    }

    #[test]
    fn shared_subtrees_are_accepted() {
        let mut b = ProgramBuilder::new();
        let app = b.module("app", &[]);
        let f = b.function(app, "demo.f");
        let shared = b.block(vec![]);
        let left = b.block(vec![shared]);
        let right = b.block(vec![shared]);
        b.top_level(app, f, vec![left, right]);
        assert!(b.build().is_ok());
    }

    #[test]
    fn dispose_is_observable() {
        let (program, ..) = sample();
        assert!(!program.is_disposed());
        program.dispose();
        assert!(program.is_disposed());
    }
}
