//! Stack assembly
//!
//! The mode flag selects which component `keel up` materializes: the compute
//! stack, the pipeline service, or nothing. Never both.

/// Value of the mode flag
///
/// The `ONLY_*` spellings are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AssemblyMode {
    /// Provision the compute stack only
    #[value(alias = "ONLY_STACK")]
    Stack,
    /// Run the pipeline service only
    #[value(alias = "ONLY_PIPELINE")]
    Pipeline,
}

/// A component the assembly can materialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    ComputeStack,
    PipelineService,
}

/// The component to materialize for `mode`, if any
pub fn select(mode: Option<AssemblyMode>) -> Option<Component> {
    match mode? {
        AssemblyMode::Stack => Some(Component::ComputeStack),
        AssemblyMode::Pipeline => Some(Component::PipelineService),
    }
}
