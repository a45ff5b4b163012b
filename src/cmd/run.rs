//! Pipeline execution: `ferry run`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use ferry::cluster::StaticSplitter;
use ferry::engine::EngineRegistry;
use ferry::ferry_config::FerryConfig;
use ferry::pipeline::{load_pipeline, parse_assignment};
use ferry::remote::HttpTransport;
use ferry::strategy::Dispatcher;
use ferry_common::{LogLevel, RunMode, RunResult};
use tracing::{info, warn};

use super::super::RunArgs;

/// Pick the run mode: explicit `--mode`, else clustered when a manifest is
/// given, else remote when a server is given, else local.
fn resolve_mode(args: &RunArgs) -> Result<RunMode> {
    if let Some(mode) = &args.mode {
        return Ok(mode.parse()?);
    }
    Ok(if args.cluster.is_some() {
        RunMode::Clustered
    } else if args.server.is_some() {
        RunMode::Remote
    } else {
        RunMode::Local
    })
}

pub async fn cmd_run(project_dir: &Path, args: &RunArgs) -> Result<()> {
    let config = FerryConfig::new(project_dir.to_path_buf())?;
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let mut pipeline = load_pipeline(&args.pipeline)?;
    for raw in &args.params {
        let (name, value) = parse_assignment(raw)?;
        if !pipeline.set_parameter_value(&name, value) {
            bail!(
                "Parameter '{}' is not declared by pipeline '{}'",
                name,
                pipeline.name
            );
        }
    }

    let mode = resolve_mode(args)?;
    let mut exec = config.execution_configuration(mode);
    for raw in &args.vars {
        let (name, value) = parse_assignment(raw)?;
        exec.variables.insert(name, value);
    }
    if args.safe_mode {
        exec.safe_mode = true;
    }
    if args.metrics {
        exec.gather_metrics = true;
    }
    if let Some(level) = &args.log_level {
        exec.log_level = level.parse::<LogLevel>()?;
    }
    if let Some(engine) = &args.engine {
        exec.run_configuration = engine.clone();
    }
    if let Some(name) = &args.server {
        exec.remote_server = Some(config.server(name)?.clone());
    }

    let mut dispatcher = Dispatcher::new(EngineRegistry::with_defaults(), Arc::new(HttpTransport::new()))
        .with_poll_interval(config.poll_interval());

    if mode == RunMode::Clustered {
        let manifest = args
            .cluster
            .clone()
            .unwrap_or_else(|| config.cluster_manifest());
        let splitter = StaticSplitter::load(&manifest, config.servers())
            .with_context(|| format!("Failed to load cluster manifest: {}", manifest.display()))?;
        dispatcher = dispatcher.with_splitter(Arc::new(splitter));
    }

    let cancel = dispatcher.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; no longer waiting for remote runs");
            cancel.cancel();
        }
    });

    info!(pipeline = %pipeline.name, mode = %mode, "Starting pipeline");
    let result = dispatcher
        .execute(&pipeline, None, &mut exec, &args.args)
        .await?;

    print_summary(&pipeline.name, mode, &result);
    if !result.success {
        bail!(
            "Pipeline '{}' finished with {} error(s)",
            pipeline.name,
            result.error_count
        );
    }
    Ok(())
}

fn print_summary(name: &str, mode: RunMode, result: &RunResult) {
    let status = if result.success { "success" } else { "failed" };
    println!("Pipeline '{}' ({}) finished: {}", name, mode, status);
    println!(
        "  errors={} read={} written={} input={} output={} updated={} rejected={}",
        result.error_count,
        result.lines_read,
        result.lines_written,
        result.lines_input,
        result.lines_output,
        result.lines_updated,
        result.lines_rejected
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> RunArgs {
        RunArgs {
            pipeline: PathBuf::from("p.toml"),
            mode: None,
            server: None,
            cluster: None,
            params: vec![],
            vars: vec![],
            safe_mode: false,
            metrics: false,
            log_level: None,
            engine: None,
            args: vec![],
        }
    }

    #[test]
    fn test_mode_inferred_from_flags() {
        assert_eq!(resolve_mode(&args()).unwrap(), RunMode::Local);

        let mut remote = args();
        remote.server = Some("w1".into());
        assert_eq!(resolve_mode(&remote).unwrap(), RunMode::Remote);

        let mut clustered = remote.clone();
        clustered.cluster = Some(PathBuf::from("cluster.toml"));
        assert_eq!(resolve_mode(&clustered).unwrap(), RunMode::Clustered);
    }

    #[test]
    fn test_explicit_mode_wins() {
        let mut a = args();
        a.server = Some("w1".into());
        a.mode = Some("local".into());
        assert_eq!(resolve_mode(&a).unwrap(), RunMode::Local);

        a.mode = Some("swarm".into());
        assert!(resolve_mode(&a).is_err());
    }
}
