//! Worker node: `ferry serve`.

use std::path::Path;

use anyhow::Result;
use ferry::engine::EngineRegistry;
use ferry::ferry_config::FerryConfig;
use ferry::worker::start_server;

pub async fn cmd_serve(project_dir: &Path, bind: Option<String>, port: Option<u16>, dev: bool) -> Result<()> {
    let config = FerryConfig::new(project_dir.to_path_buf())?;
    let mut server_config = config.server_config(bind, port);
    server_config.permissive_cors = dev;

    start_server(server_config, EngineRegistry::with_defaults()).await
}
