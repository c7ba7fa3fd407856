use serde::{Deserialize, Serialize};

/// Switches controlling one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Emit sequence points for nodes carrying a source span.
    pub debug: bool,
    /// Apply fold, eliminate and normalize rewrites. When off only the
    /// annotations code generation depends on are recorded.
    pub speculative: bool,
    /// The root expression writes to the output sink instead of returning a
    /// sequence.
    pub root_output: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { debug: false, speculative: true, root_output: true }
    }
}

impl CompilerOptions {
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_speculative(mut self, speculative: bool) -> Self {
        self.speculative = speculative;
        self
    }

    #[must_use]
    pub fn with_root_output(mut self, root_output: bool) -> Self {
        self.root_output = root_output;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn missing_fields_take_defaults() {
        let opts: CompilerOptions = serde_json::from_str(r#"{"debug":true}"#).expect("json");
        assert_eq!(opts, CompilerOptions::default().with_debug(true));
    }
}
