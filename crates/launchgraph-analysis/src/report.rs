use crate::Terminated;
use launchgraph_core::{FunctionId, Location};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountTag {
    Exact,
    Indeterminate,
    Unbounded,
}

impl fmt::Display for CountTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CountTag::Exact => "exact",
            CountTag::Indeterminate => "indeterminate",
            CountTag::Unbounded => "unbounded",
        };
        f.write_str(name)
    }
}

/// Presentable launch count of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCount {
    pub value: Terminated,
    pub label: String,
    pub tag: CountTag,
}

impl LaunchCount {
    /// One-glyph form for gutters and table cells: the number itself, `S`
    /// for "some" or `I` for infinity.
    pub fn badge(&self) -> String {
        match self.value {
            Terminated::Constant(n) => n.to_string(),
            Terminated::Indeterminate => "S".to_string(),
            Terminated::Unbounded => "I".to_string(),
        }
    }
}

impl From<Terminated> for LaunchCount {
    fn from(value: Terminated) -> Self {
        let tag = match value {
            Terminated::Constant(_) => CountTag::Exact,
            Terminated::Indeterminate => CountTag::Indeterminate,
            Terminated::Unbounded => CountTag::Unbounded,
        };
        Self {
            value,
            label: value.to_string(),
            tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReport {
    pub function: FunctionId,
    pub name: String,
    pub qualified_name: String,
    pub location: Location,
    pub count: LaunchCount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub exact: usize,
    pub indeterminate: usize,
    pub unbounded: usize,
    /// Sum of the exact counts only.
    pub total_launches: u64,
}

impl ReportSummary {
    pub fn record(&mut self, count: &LaunchCount) {
        match count.value {
            Terminated::Constant(n) => {
                self.exact += 1;
                self.total_launches = self.total_launches.saturating_add(n);
            }
            Terminated::Indeterminate => self.indeterminate += 1,
            Terminated::Unbounded => self.unbounded += 1,
        }
    }
}

/// Result of a completed bulk run. Cancelled runs produce none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub functions: Vec<FunctionReport>,
    pub modules_in_scope: usize,
    pub total_modules: usize,
    pub summary: ReportSummary,
}

impl AnalysisReport {
    pub fn new(
        mut functions: Vec<FunctionReport>,
        modules_in_scope: usize,
        total_modules: usize,
    ) -> Self {
        functions.sort_by_key(|report| report.function);
        let mut summary = ReportSummary::default();
        for report in &functions {
            summary.record(&report.count);
        }
        Self {
            functions,
            modules_in_scope,
            total_modules,
            summary,
        }
    }

    pub fn find<'a>(
        &'a self,
        qualified_name: &'a str,
    ) -> impl Iterator<Item = &'a FunctionReport> + 'a {
        self.functions
            .iter()
            .filter(move |report| report.qualified_name == qualified_name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
