//! Weaving options and the runtime enable/disable surface

use serde::{Deserialize, Serialize};

/// Per-compilation-unit switches for the injector
///
/// These decide which check kinds are synthesized at all; the runtime
/// toggles below decide whether injected checks execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaveOptions {
    pub preconditions: bool,
    pub postconditions: bool,
    pub invariants: bool,
}

impl WeaveOptions {
    /// Inject every check kind
    pub fn all() -> Self {
        Self {
            preconditions: true,
            postconditions: true,
            invariants: true,
        }
    }

    /// Inject nothing (weaving becomes a marking-only pass)
    pub fn none() -> Self {
        Self {
            preconditions: false,
            postconditions: false,
            invariants: false,
        }
    }
}

impl Default for WeaveOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// Runtime lookup table: class or package name prefix to enabled flag
///
/// Consulted once per class at load time. Longest-prefix match over dotted
/// segments, falling back to a global default of enabled. Populated from an
/// external enable/disable directive list at process start; the directive
/// syntax itself is out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeToggles {
    entries: Vec<(String, bool)>,
    default_enabled: bool,
}

impl RuntimeToggles {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default_enabled: true,
        }
    }

    /// Change the global default applied when no prefix matches
    pub fn default_enabled(mut self, enabled: bool) -> Self {
        self.default_enabled = enabled;
        self
    }

    /// Enable checks for a class or package prefix
    pub fn enable(mut self, prefix: impl Into<String>) -> Self {
        self.entries.push((prefix.into(), true));
        self
    }

    /// Disable checks for a class or package prefix
    pub fn disable(mut self, prefix: impl Into<String>) -> Self {
        self.entries.push((prefix.into(), false));
        self
    }

    /// Resolve the flag for a fully-qualified class name
    pub fn is_enabled(&self, fq_name: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;
        for (prefix, enabled) in &self.entries {
            let matches = fq_name == prefix
                || (fq_name.len() > prefix.len()
                    && fq_name.starts_with(prefix.as_str())
                    && fq_name.as_bytes()[prefix.len()] == b'.');
            if matches {
                // Later entries win ties so directives can be layered
                match best {
                    Some((len, _)) if len > prefix.len() => {}
                    _ => best = Some((prefix.len(), *enabled)),
                }
            }
        }
        best.map(|(_, enabled)| enabled).unwrap_or(self.default_enabled)
    }
}

impl Default for RuntimeToggles {
    fn default() -> Self {
        Self::new()
    }
}
