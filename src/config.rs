use std::collections::HashMap;

/// Snapshot of environment variables injected into provider construction.
///
/// Adapters never read the process environment directly; they resolve
/// their credentials from one of these maps, captured once by the caller.
/// This keeps adapters testable without mutating process-level state.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    vars: HashMap<String, String>,
}

impl EnvConfig {
    /// Creates an empty configuration (no credentials resolvable).
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the current process environment.
    pub fn from_process_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Looks up a single variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Returns the first non-empty value among `names`, in order.
    ///
    /// Empty strings count as unset so that `FOO=` in the environment
    /// does not shadow a usable fallback variable.
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|value| !value.is_empty())
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
