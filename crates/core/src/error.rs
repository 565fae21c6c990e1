//! Shared error taxonomy.

/// Errors found while validating a plan's structure. Validation runs
/// before any execution, so a malformed plan never partially runs.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Two steps share an id
    #[error("duplicate step id '{0}'")]
    DuplicateStep(String),

    /// A dependency references a step that does not exist
    #[error("step '{step}' depends on missing step '{dependency}'")]
    MissingStep {
        /// The step declaring the dependency
        step: String,
        /// The dangling dependency id
        dependency: String,
    },

    /// The dependency graph contains a cycle
    #[error("dependency cycle through steps {0:?}")]
    Cycle(Vec<String>),

    /// An action is missing a field its kind requires
    #[error("step '{step}' has a malformed action: {detail}")]
    MalformedAction {
        /// The offending step
        step: String,
        /// What is wrong with the action
        detail: String,
    },
}
