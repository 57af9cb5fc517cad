use launchgraph_core::{ClassifierConfig, MatchMode};

/// Categories a callee can fall into. A name may be in both or in neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCategories {
    /// Starts a new concurrently scheduled task.
    pub launch_builtin: bool,
    /// Runs its lambda argument in place, exactly once.
    pub lambda_immediately_invoked: bool,
}

/// Static registries keyed on qualified callee names.
///
/// Matching is on names only: no types, no overloads. With
/// [`MatchMode::Substring`] a name qualifies when it starts with the namespace
/// and contains a registry entry anywhere, so `kotlinx.coroutines.restart`
/// counts as `start`.
#[derive(Debug, Clone)]
pub struct CallClassifier {
    concurrency_namespace: String,
    stdlib_namespace: String,
    launch_builtins: Vec<String>,
    scope_entries: Vec<String>,
    pass_through_combinators: Vec<String>,
    match_mode: MatchMode,
}

impl Default for CallClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl CallClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            concurrency_namespace: config.concurrency_namespace.clone(),
            stdlib_namespace: config.stdlib_namespace.clone(),
            launch_builtins: config.launch_builtins.clone(),
            scope_entries: config.scope_entries.clone(),
            pass_through_combinators: config.pass_through_combinators.clone(),
            match_mode: config.match_mode,
        }
    }

    pub fn classify(&self, qualified_name: &str) -> CallCategories {
        CallCategories {
            launch_builtin: self.is_launch_builtin(qualified_name),
            lambda_immediately_invoked: self.invokes_lambda_immediately(qualified_name),
        }
    }

    pub fn is_launch_builtin(&self, qualified_name: &str) -> bool {
        self.is_name_allowed(
            qualified_name,
            &self.concurrency_namespace,
            &self.launch_builtins,
        )
    }

    /// Launch builtins, scope entries and pass-through combinators all run
    /// their lambda argument.
    pub fn invokes_lambda_immediately(&self, qualified_name: &str) -> bool {
        self.is_name_allowed(
            qualified_name,
            &self.stdlib_namespace,
            &self.pass_through_combinators,
        ) || self.is_launch_builtin(qualified_name)
            || self.is_name_allowed(
                qualified_name,
                &self.concurrency_namespace,
                &self.scope_entries,
            )
    }

    fn is_name_allowed(&self, name: &str, prefix: &str, names: &[String]) -> bool {
        if !name.starts_with(prefix) {
            return false;
        }
        match self.match_mode {
            MatchMode::Substring => names.iter().any(|entry| name.contains(entry.as_str())),
            MatchMode::Exact => {
                let Some((_, last)) = name.rsplit_once('.') else {
                    return false;
                };
                names.iter().any(|entry| entry == last)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact() -> CallClassifier {
        CallClassifier::new(&ClassifierConfig {
            match_mode: MatchMode::Exact,
            ..ClassifierConfig::default()
        })
    }

    #[test]
    fn launch_builtins_are_recognized() {
        let classifier = CallClassifier::default();
        for name in [
            "kotlinx.coroutines.launch",
            "kotlinx.coroutines.async",
            "kotlinx.coroutines.runBlocking",
            "kotlinx.coroutines.channels.produce",
            "kotlinx.coroutines.channels.actor",
        ] {
            let categories = classifier.classify(name);
            assert!(categories.launch_builtin, "{}", name);
            assert!(categories.lambda_immediately_invoked, "{}", name);
        }
    }

    #[test]
    fn scope_entries_run_lambdas_without_launching() {
        let classifier = CallClassifier::default();
        for name in ["kotlinx.coroutines.coroutineScope", "kotlinx.coroutines.withContext"] {
            assert_eq!(
                classifier.classify(name),
                CallCategories {
                    launch_builtin: false,
                    lambda_immediately_invoked: true,
                }
            );
        }
    }

    #[test]
    fn pass_through_combinators_need_the_stdlib_namespace() {
        let classifier = CallClassifier::default();
        assert!(classifier.invokes_lambda_immediately("kotlin.let"));
        assert!(classifier.invokes_lambda_immediately("kotlin.takeUnless"));
        assert!(!classifier.invokes_lambda_immediately("com.example.let"));
        assert!(!classifier.is_launch_builtin("com.example.launch"));
    }

    #[test]
    fn unrelated_names_have_no_category() {
        let classifier = CallClassifier::default();
        assert_eq!(
            classifier.classify("com.example.fetchUser"),
            CallCategories::default()
        );
        assert_eq!(
            classifier.classify("kotlin.collections.map"),
            CallCategories::default()
        );
    }

    #[test]
    fn substring_matching_catches_lookalike_names() {
        let classifier = CallClassifier::default();
        assert!(classifier.is_launch_builtin("kotlinx.coroutines.restartLater"));
        assert!(classifier.invokes_lambda_immediately("kotlin.runCatching"));
    }

    #[test]
    fn exact_matching_compares_the_last_segment() {
        let classifier = exact();
        assert!(classifier.is_launch_builtin("kotlinx.coroutines.launch"));
        assert!(classifier.is_launch_builtin("kotlinx.coroutines.channels.produce"));
        assert!(!classifier.is_launch_builtin("kotlinx.coroutines.restartLater"));
        assert!(!classifier.invokes_lambda_immediately("kotlin.runCatching"));
        assert!(classifier.invokes_lambda_immediately("kotlin.run"));
        assert!(!classifier.is_launch_builtin("launch"));
        assert!(!classifier.is_launch_builtin("com.example.launch"));
    }
}
