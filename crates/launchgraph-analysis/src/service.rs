//! Bulk and on-demand counting over one program snapshot.

use crate::{
    Analyser, AnalysisReport, CallClassifier, Evaluator, ExpressionMemo, FunctionReport,
    LaunchCount,
};
use launchgraph_core::{
    CancellationToken, CountError, FunctionId, LaunchGraphConfig, ModuleId, ProgramModel,
    ProgressSink, Result,
};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of stages in a bulk run: build, then evaluate.
pub const STAGES: usize = 2;
pub const BUILD_STAGE: usize = 0;
pub const EVALUATE_STAGE: usize = 1;

#[derive(Debug, Clone, Default)]
struct Scope {
    modules: Vec<ModuleId>,
    functions: Vec<FunctionId>,
}

/// Owns the shared memo for one snapshot and answers counting queries.
///
/// Raw expressions are computed at most once per function for the lifetime of
/// the service. Terminated values are not cached: every query re-runs the
/// evaluator.
pub struct CountingService {
    program: Arc<dyn ProgramModel>,
    classifier: CallClassifier,
    memo: ExpressionMemo,
    pool: rayon::ThreadPool,
    batch_size: usize,
    concurrency_library: String,
    scope: OnceCell<Scope>,
}

impl CountingService {
    pub fn new(program: Arc<dyn ProgramModel>, config: &LaunchGraphConfig) -> Result<Self> {
        if program.is_disposed() {
            return Err(CountError::Cancelled);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.analysis.num_threads)
            .thread_name(|i| format!("launchgraph-worker-{}", i))
            .stack_size(config.analysis.worker_stack_mb.saturating_mul(1024 * 1024))
            .build()
            .map_err(|e| CountError::WorkerPool(e.to_string()))?;

        Ok(Self {
            program,
            classifier: CallClassifier::new(&config.classifier),
            memo: ExpressionMemo::new(),
            pool,
            batch_size: config.analysis.batch_size.max(1),
            concurrency_library: config.analysis.concurrency_library.clone(),
            scope: OnceCell::new(),
        })
    }

    pub fn memo(&self) -> &ExpressionMemo {
        &self.memo
    }

    pub fn program(&self) -> &dyn ProgramModel {
        self.program.as_ref()
    }

    /// Named functions of every module that depends on the concurrency library.
    pub fn candidates(&self) -> &[FunctionId] {
        &self.scope().functions
    }

    pub fn modules_with_concurrency(&self) -> usize {
        self.scope().modules.len()
    }

    pub fn total_modules(&self) -> usize {
        self.program.modules().len()
    }

    fn scope(&self) -> &Scope {
        self.scope.get_or_init(|| {
            let modules: Vec<ModuleId> = self
                .program
                .modules()
                .into_iter()
                .filter(|m| self.program.depends_on(*m, &self.concurrency_library))
                .collect();

            let mut seen = HashSet::new();
            let functions: Vec<FunctionId> = modules
                .iter()
                .flat_map(|m| self.program.named_functions(*m))
                .filter(|f| seen.insert(*f))
                .collect();

            debug!(
                "{} of {} modules in scope, {} candidate functions",
                modules.len(),
                self.program.modules().len(),
                functions.len()
            );
            Scope { modules, functions }
        })
    }

    /// Every function with the given qualified name, in handle order.
    pub fn functions_named(&self, qualified_name: &str) -> Vec<FunctionId> {
        (0..self.program.function_count() as u32)
            .map(FunctionId)
            .filter(|f| {
                self.program
                    .function(*f)
                    .is_some_and(|declared| declared.qualified_name == qualified_name)
            })
            .collect()
    }

    fn analyser(&self) -> Analyser<'_> {
        Analyser::new(self.program.as_ref(), &self.classifier, &self.memo)
    }

    /// On-demand count of a single function. Runs on a worker so deep call
    /// chains get the configured stack.
    pub fn count(&self, function: FunctionId) -> Result<LaunchCount> {
        if self.program.is_disposed() {
            return Err(CountError::Cancelled);
        }
        if self.program.function(function).is_none() {
            return Err(CountError::FunctionNotFound(function.to_string()));
        }

        let value = self.pool.install(|| {
            let analyser = self.analyser();
            Evaluator::new(&analyser).evaluate_function(function)
        })?;
        Ok(value.into())
    }

    pub fn report(&self, function: FunctionId) -> Result<FunctionReport> {
        let count = self.count(function)?;
        self.describe(function, count)
    }

    fn describe(&self, function: FunctionId, count: LaunchCount) -> Result<FunctionReport> {
        let declared = self
            .program
            .function(function)
            .ok_or_else(|| CountError::FunctionNotFound(function.to_string()))?;
        Ok(FunctionReport {
            function,
            name: declared.name.clone(),
            qualified_name: declared.qualified_name.clone(),
            location: declared.location.clone(),
            count,
        })
    }

    /// Counts every candidate: first fills the memo, then evaluates.
    ///
    /// Cancellation is checked between functions. A cancelled run returns
    /// [`CountError::Cancelled`]; memo entries built so far are kept.
    pub fn run_full_analysis(
        &self,
        token: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisReport> {
        let candidates = self.candidates();
        info!(
            "Counting launches in {} functions across {} modules",
            candidates.len(),
            self.modules_with_concurrency()
        );

        self.run_stage(BUILD_STAGE, candidates, token, progress, |analyser, function| {
            analyser.analyse_function(function);
            Ok(())
        })?;
        info!("Built {} raw expressions", self.memo.len());

        let counts = self.run_stage(
            EVALUATE_STAGE,
            candidates,
            token,
            progress,
            |analyser, function| Evaluator::new(analyser).evaluate_function(function),
        )?;

        let reports = counts
            .into_iter()
            .map(|(function, value)| self.describe(function, value.into()))
            .collect::<Result<Vec<_>>>()?;
        let report = AnalysisReport::new(
            reports,
            self.modules_with_concurrency(),
            self.total_modules(),
        );
        info!(
            "Analysis finished: {} exact, {} indeterminate, {} unbounded",
            report.summary.exact, report.summary.indeterminate, report.summary.unbounded
        );
        Ok(report)
    }

    fn run_stage<T, F>(
        &self,
        stage: usize,
        functions: &[FunctionId],
        token: &CancellationToken,
        progress: &dyn ProgressSink,
        work: F,
    ) -> Result<Vec<(FunctionId, T)>>
    where
        T: Send,
        F: Fn(&Analyser<'_>, FunctionId) -> Result<T> + Sync,
    {
        let total = functions.len();
        let completed = AtomicUsize::new(0);
        let analyser = self.analyser();
        progress.stage_started(stage, STAGES, total);

        let batches = self.pool.install(|| {
            functions
                .par_chunks(self.batch_size)
                .map(|chunk| {
                    let mut results = Vec::with_capacity(chunk.len());
                    for &function in chunk {
                        if token.is_cancelled() || self.program.is_disposed() {
                            return Err(CountError::Cancelled);
                        }
                        results.push((function, work(&analyser, function)?));
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        progress.advance(stage, done, total);
                    }
                    Ok(results)
                })
                .collect::<Result<Vec<_>>>()
        });

        let batches = match batches {
            Ok(batches) => batches,
            Err(e) => {
                if e.is_cancellation() {
                    warn!(
                        "Stage {} cancelled after {} of {} functions",
                        stage,
                        completed.load(Ordering::Relaxed),
                        total
                    );
                }
                return Err(e);
            }
        };

        progress.stage_finished(stage, STAGES);
        Ok(batches.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Terminated;
    use launchgraph_core::{NoProgress, Program, ProgramBuilder};
    use std::sync::Mutex;

    fn config(threads: usize, batch_size: usize) -> LaunchGraphConfig {
        let mut config = LaunchGraphConfig::default();
        config.analysis.num_threads = threads;
        config.analysis.batch_size = batch_size;
        config
    }

    /// `app` uses coroutines, `plain` does not.
    fn two_modules() -> (Program, FunctionId, FunctionId) {
        let mut b = ProgramBuilder::new();
        let app = b.module("app", &["org.jetbrains.kotlinx:kotlinx-coroutines-core:1.7.3"]);
        let plain = b.module("plain", &["kotlin-stdlib"]);
        b.library_function("kotlinx.coroutines.launch");

        let worker = b.function(app, "demo.worker");
        let body = b.lambda(vec![]);
        let launched = b.call("kotlinx.coroutines.launch", vec![body]);
        b.top_level(app, worker, vec![launched]);

        let helper = b.function(plain, "util.helper");
        b.top_level(plain, helper, vec![]);

        (b.build().unwrap(), worker, helper)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(usize, usize, usize)>>,
        finished: Mutex<Vec<usize>>,
    }

    impl ProgressSink for Recorder {
        fn advance(&self, stage: usize, completed: usize, total: usize) {
            self.events.lock().unwrap().push((stage, completed, total));
        }

        fn stage_finished(&self, stage: usize, _stages: usize) {
            self.finished.lock().unwrap().push(stage);
        }
    }

    #[test]
    fn only_modules_using_the_library_are_in_scope() {
        let (program, worker, _) = two_modules();
        let service = CountingService::new(Arc::new(program), &config(2, 8)).unwrap();
        assert_eq!(service.modules_with_concurrency(), 1);
        assert_eq!(service.total_modules(), 2);
        assert_eq!(service.candidates(), &[worker]);
    }

    #[test]
    fn full_run_reports_every_candidate() {
        let (program, worker, _) = two_modules();
        let service = CountingService::new(Arc::new(program), &config(2, 1)).unwrap();
        let recorder = Recorder::default();

        let report = service
            .run_full_analysis(&CancellationToken::new(), &recorder)
            .unwrap();
        assert_eq!(report.functions.len(), 1);
        assert_eq!(report.functions[0].function, worker);
        assert_eq!(report.functions[0].count.label, "1");
        assert_eq!(report.modules_in_scope, 1);
        assert_eq!(report.total_modules, 2);

        let events = recorder.events.lock().unwrap();
        assert_eq!(*events, vec![(BUILD_STAGE, 1, 1), (EVALUATE_STAGE, 1, 1)]);
        assert_eq!(*recorder.finished.lock().unwrap(), vec![BUILD_STAGE, EVALUATE_STAGE]);
    }

    #[test]
    fn cancelled_run_surfaces_no_report() {
        let (program, ..) = two_modules();
        let service = CountingService::new(Arc::new(program), &config(1, 4)).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = service.run_full_analysis(&token, &NoProgress).unwrap_err();
        assert!(err.is_cancellation());
        assert!(service.memo().is_empty());
    }

    #[test]
    fn single_query_counts_functions_outside_the_scope() {
        let (program, _, helper) = two_modules();
        let service = CountingService::new(Arc::new(program), &config(1, 4)).unwrap();
        let count = service.count(helper).unwrap();
        assert_eq!(count.label, "0");
        assert!(service.memo().contains(helper));
    }

    #[test]
    fn unknown_function_is_reported() {
        let (program, ..) = two_modules();
        let service = CountingService::new(Arc::new(program), &config(1, 4)).unwrap();
        let err = service.count(FunctionId(99)).unwrap_err();
        assert!(matches!(err, CountError::FunctionNotFound(_)));
    }

    #[test]
    fn disposed_program_is_rejected() {
        let (program, ..) = two_modules();
        program.dispose();
        let err = CountingService::new(Arc::new(program), &config(1, 4))
            .err()
            .unwrap();
        assert!(err.is_cancellation());
    }

    #[test]
    fn disposal_mid_session_cancels_queries() {
        let (program, worker, _) = two_modules();
        let program = Arc::new(program);
        let service = CountingService::new(program.clone(), &config(1, 4)).unwrap();
        program.dispose();

        assert!(service.count(worker).unwrap_err().is_cancellation());
        assert!(service
            .run_full_analysis(&CancellationToken::new(), &NoProgress)
            .unwrap_err()
            .is_cancellation());
    }

    #[test]
    fn deep_call_chain_runs_on_the_worker_stack() {
        const DEPTH: usize = 10_000;
        let mut b = ProgramBuilder::new();
        let app = b.module("app", &["kotlinx-coroutines-core"]);
        let launch = b.library_function("kotlinx.coroutines.launch");

        let mut previous = None;
        for i in 0..DEPTH {
            let function = b.function(app, &format!("demo.step{}", i));
            let mut body = Vec::new();
            if let Some(callee) = previous {
                body.push(b.call_to(callee, vec![]));
            }
            let lambda = b.lambda(vec![]);
            body.push(b.call_to(launch, vec![lambda]));
            b.top_level(app, function, body);
            previous = Some(function);
        }
        let tip = previous.unwrap();

        let service = CountingService::new(Arc::new(b.build().unwrap()), &config(1, 4)).unwrap();
        assert_eq!(
            service.count(tip).unwrap().value,
            Terminated::Constant(DEPTH as u64)
        );
    }

    #[test]
    fn lookup_by_qualified_name() {
        let (program, worker, _) = two_modules();
        let service = CountingService::new(Arc::new(program), &config(1, 4)).unwrap();
        assert_eq!(service.functions_named("demo.worker"), vec![worker]);
        assert!(service.functions_named("demo.nothing").is_empty());
    }
}
