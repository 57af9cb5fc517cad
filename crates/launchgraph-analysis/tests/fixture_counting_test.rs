use launchgraph_analysis::{CountTag, CountingService, Terminated};
use launchgraph_core::{
    CancellationToken, ConfigManager, CountError, LaunchGraphConfig, MatchMode, NoProgress,
    Program, ProgressSink,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn fixture() -> Program {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/coroutines.json");
    Program::from_file(&path).expect("fixture should load")
}

fn service(config: &LaunchGraphConfig) -> CountingService {
    CountingService::new(Arc::new(fixture()), config).expect("service should start")
}

#[test]
fn test_fixture_counts() {
    let service = service(&LaunchGraphConfig::default());
    let report = service
        .run_full_analysis(&CancellationToken::new(), &NoProgress)
        .unwrap();

    let label = |name: &str| {
        report
            .find(name)
            .next()
            .map(|r| r.count.label.clone())
            .unwrap_or_else(|| panic!("{} missing from report", name))
    };
    assert_eq!(label("sample.startWorkers"), "2");
    assert_eq!(label("sample.supervise"), "3");
    assert_eq!(label("sample.poll"), "Some coroutines could be launched");
    assert_eq!(label("sample.ping"), "Infinity");
    assert_eq!(label("sample.pong"), "Infinity");

    assert_eq!(report.find("util.format").count(), 0);
    assert_eq!(report.modules_in_scope, 1);
    assert_eq!(report.total_modules, 2);
    assert_eq!(report.summary.exact, 2);
    assert_eq!(report.summary.indeterminate, 1);
    assert_eq!(report.summary.unbounded, 2);
    assert_eq!(report.summary.total_launches, 5);
}

#[test]
fn test_report_locations_survive() {
    let service = service(&LaunchGraphConfig::default());
    let supervise = service.functions_named("sample.supervise")[0];
    let report = service.report(supervise).unwrap();
    assert_eq!(report.location.to_string(), "app/src/Workers.kt:10:1");
    assert_eq!(report.count.value, Terminated::Constant(3));
    assert_eq!(report.count.tag, CountTag::Exact);
}

#[test]
fn test_single_query_outside_scope() {
    let service = service(&LaunchGraphConfig::default());
    let format = service.functions_named("util.format")[0];
    assert_eq!(service.count(format).unwrap().badge(), "0");
}

#[test]
fn test_config_file_drives_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("launchgraph.toml");
    std::fs::write(
        &config_path,
        r#"
[classifier]
match_mode = "exact"

[analysis]
num_threads = 2
batch_size = 1
concurrency_library = "kotlin-stdlib"
"#,
    )
    .unwrap();

    let manager = ConfigManager::from_file(&config_path).unwrap();
    assert_eq!(manager.config().classifier.match_mode, MatchMode::Exact);

    let service = service(manager.config());
    assert_eq!(service.modules_with_concurrency(), 2);
    assert_eq!(service.candidates().len(), 6);
}

#[test]
fn test_cancellation_mid_run() {
    struct CancelAfter {
        token: CancellationToken,
        after: usize,
        seen: AtomicUsize,
    }

    impl ProgressSink for CancelAfter {
        fn advance(&self, _stage: usize, _completed: usize, _total: usize) {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.token.cancel();
            }
        }
    }

    let mut config = LaunchGraphConfig::default();
    config.analysis.num_threads = 1;
    config.analysis.batch_size = 100;
    let service = service(&config);

    let sink = CancelAfter {
        token: CancellationToken::new(),
        after: 2,
        seen: AtomicUsize::new(0),
    };
    let result = service.run_full_analysis(&sink.token, &sink);
    assert!(matches!(result, Err(CountError::Cancelled)));
    assert_eq!(sink.seen.load(Ordering::SeqCst), 2);
}
