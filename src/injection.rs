//! Variable and parameter injection ahead of remote and clustered runs.
//!
//! Order matters: internal variables are copied first, then parameters
//! overwrite them. A parameter therefore always wins over a plain variable
//! of the same name.

use crate::pipeline::PipelineHandle;
use ferry_common::ExecutionConfiguration;
use tracing::trace;

/// Copy the current value of every internal variable the pipeline declares
/// into the configuration, overwriting earlier values. Variables without a
/// current value are skipped.
pub fn inject_internal_variables(config: &mut ExecutionConfiguration, pipeline: &dyn PipelineHandle) {
    for name in pipeline.internal_variable_names() {
        if let Some(value) = pipeline.variable(&name) {
            trace!(variable = %name, value = %value, "Injecting internal variable");
            config.variables.insert(name, value);
        }
    }
}

/// Resolve a parameter: explicit value, else declared default, else the
/// pipeline variable of the same name. Empty strings count as unset.
pub fn resolve_parameter(pipeline: &dyn PipelineHandle, name: &str) -> Option<String> {
    fn non_empty(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.is_empty())
    }

    non_empty(pipeline.parameter_value(name))
        .or_else(|| non_empty(pipeline.parameter_default(name)))
        .or_else(|| non_empty(pipeline.variable(name)))
}

/// Write every resolvable parameter of the original pipeline into the
/// configuration, overwriting whatever was there.
pub fn inject_parameters(config: &mut ExecutionConfiguration, original: &dyn PipelineHandle) {
    for name in original.parameter_names() {
        if let Some(value) = resolve_parameter(original, &name) {
            trace!(parameter = %name, value = %value, "Injecting parameter");
            config.variables.insert(name, value);
        }
    }
}

/// Internal variables from `pipeline`, then parameters from `original`.
///
/// For a remote run both are the same pipeline; for a clustered run
/// `original` is the unsplit pipeline the splitter started from.
pub fn inject(
    config: &mut ExecutionConfiguration,
    pipeline: &dyn PipelineHandle,
    original: &dyn PipelineHandle,
) {
    inject_internal_variables(config, pipeline);
    inject_parameters(config, original);
}
