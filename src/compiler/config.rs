//! Configuration for the concatenation pipeline.

/// Controls which stages of [`ConcatPipeline`](crate::compiler::ConcatPipeline) run and how.
///
/// # Examples
///
/// ```rust
/// use catopt::compiler::OptimizerConfig;
///
/// let config = OptimizerConfig::new()
///     .with_expansion(false)
///     .with_max_fixpoint_iterations(10)
///     .with_verification(true);
///
/// assert!(config.enable_common_inputs);
/// assert!(!config.enable_expansion);
/// assert_eq!(config.max_fixpoint_iterations, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Run common-input elimination across variadic concatenations.
    pub enable_common_inputs: bool,

    /// Expand list concatenations into allocate/slice/copy sequences and fuse nested buffers.
    pub enable_expansion: bool,

    /// Promote list concatenations to variadic form, interleaved with list-mutation removal.
    pub enable_variadic: bool,

    /// Maximum rounds of the list-mutation/variadic fixpoint (default: 100).
    pub max_fixpoint_iterations: usize,

    /// Lint the graph after every stage (slow).
    pub verify_graph: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_common_inputs: true,
            enable_expansion: true,
            enable_variadic: true,
            max_fixpoint_iterations: 100,
            verify_graph: false,
        }
    }
}

impl OptimizerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every stage disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_common_inputs: false,
            enable_expansion: false,
            enable_variadic: false,
            ..Self::default()
        }
    }

    /// Returns true if any stage is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.enable_common_inputs || self.enable_expansion || self.enable_variadic
    }

    /// Enables or disables common-input elimination.
    #[must_use]
    pub fn with_common_inputs(mut self, enable: bool) -> Self {
        self.enable_common_inputs = enable;
        self
    }

    /// Enables or disables concatenation expansion.
    #[must_use]
    pub fn with_expansion(mut self, enable: bool) -> Self {
        self.enable_expansion = enable;
        self
    }

    /// Enables or disables variadic promotion.
    #[must_use]
    pub fn with_variadic(mut self, enable: bool) -> Self {
        self.enable_variadic = enable;
        self
    }

    /// Sets the maximum number of fixpoint rounds.
    ///
    /// # Arguments
    ///
    /// * `max` - The ceiling; values below one are treated as one.
    #[must_use]
    pub fn with_max_fixpoint_iterations(mut self, max: usize) -> Self {
        self.max_fixpoint_iterations = max.max(1);
        self
    }

    /// Enables or disables graph verification after every stage.
    #[must_use]
    pub fn with_verification(mut self, enable: bool) -> Self {
        self.verify_graph = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default();
        assert!(config.any_enabled());
        assert_eq!(config.max_fixpoint_iterations, 100);
        assert!(!config.verify_graph);
    }

    #[test]
    fn test_disabled() {
        let config = OptimizerConfig::disabled();
        assert!(!config.any_enabled());
        assert!(config.with_variadic(true).any_enabled());
    }

    #[test]
    fn test_iteration_floor() {
        assert_eq!(
            OptimizerConfig::new()
                .with_max_fixpoint_iterations(0)
                .max_fixpoint_iterations,
            1
        );
    }
}
