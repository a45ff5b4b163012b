//! Configuration view and validation commands: `ferry config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use ferry::ferry_config::{FerryConfig, FerryToml};

    let ferry_dir = project_dir.join(".ferry");
    let config_path = ferry_dir.join("ferry.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Ferry Configuration");
            println!("===================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No ferry.toml found at {}", config_path.display());
                println!("Using default configuration:");
            }
            println!();

            // Effective values include environment overrides
            let config = FerryConfig::new(project_dir.to_path_buf())?;
            let toml = &config.toml;

            println!("[defaults]");
            println!("  log_level = \"{}\"", toml.defaults.log_level);
            println!("  safe_mode = {}", toml.defaults.safe_mode);
            println!("  gather_metrics = {}", toml.defaults.gather_metrics);
            println!("  run_configuration = \"{}\"", toml.defaults.run_configuration);
            println!();
            println!("[ports]");
            println!("  base_port = {}", toml.ports.base_port);
            println!();
            println!("[monitor]");
            println!("  poll_interval_ms = {}", toml.monitor.poll_interval_ms);
            println!();
            println!("[worker]");
            println!("  bind = \"{}\"", toml.worker.bind);
            println!("  port = {}", toml.worker.port);
            println!();

            if toml.servers.is_empty() {
                println!("No servers configured.");
            } else {
                println!("Servers:");
                for server in &toml.servers {
                    let role = if server.master { " [master]" } else { "" };
                    println!("  {}{}", server, role);
                }
            }
            println!();

            if !config_path.exists() {
                println!("Run 'ferry config init' to create a ferry.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No ferry.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = FerryToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("ferry.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !ferry_dir.exists() {
                std::fs::create_dir_all(&ferry_dir)?;
            }

            let toml = FerryToml::default();
            toml.save(&config_path)?;

            println!("Created ferry.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] log_level, safe_mode, run_configuration");
            println!("  - [ports] base_port, [monitor] poll_interval_ms");
            println!("  - [[servers]] name, host, port, master");
            println!();
        }
    }

    Ok(())
}
