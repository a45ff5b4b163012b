//! Port table commands against a worker: `ferry ports`.

use std::path::Path;

use anyhow::Result;
use ferry::ferry_config::FerryConfig;
use ferry::remote::{HttpTransport, RemoteTransport};
use ferry_common::PortRequest;

use super::super::PortsCommands;

pub async fn cmd_ports(project_dir: &Path, command: PortsCommands) -> Result<()> {
    let config = FerryConfig::new(project_dir.to_path_buf())?;
    let transport = HttpTransport::new();

    match command {
        PortsCommands::Allocate {
            server,
            host,
            pipeline,
            source_slave,
            source_step,
            source_copy,
            target_slave,
            target_step,
            target_copy,
            base_port,
            run_id,
        } => {
            let server = config.server(&server)?;
            let request = PortRequest {
                base_port: base_port.unwrap_or_else(|| config.base_port()),
                host: host.unwrap_or_else(|| server.host.clone()),
                run_id,
                pipeline_name: pipeline,
                source_slave,
                source_step,
                source_copy,
                target_slave,
                target_step,
                target_copy,
            };
            let port = transport.allocate_port(server, &request).await?;
            println!("{}", port);
        }
        PortsCommands::Deallocate { server, host, port } => {
            let server = config.server(&server)?;
            let host = host.unwrap_or_else(|| server.host.clone());
            transport.deallocate_port(server, &host, port).await?;
            println!("Released port {} on {}", port, host);
        }
        PortsCommands::Release { server, pipeline } => {
            let server = config.server(&server)?;
            let released = transport.release_ports(server, &pipeline).await?;
            println!("Released {} port(s) held by '{}'", released, pipeline);
        }
    }

    Ok(())
}
