use std::collections::BTreeSet;
use std::path::Path;

use dockyard_engine::{EngineClient, RealExecutor};

/// Works without a source repository configured; only `[run]` settings are read.
pub async fn free_ports(config: Option<&Path>, ports: &[u16]) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let client = EngineClient::with_executor(RealExecutor::with_timeout(config.run.timeout()));

    let requested: BTreeSet<u16> = ports.iter().copied().collect();
    let stopped = client.free_ports(&requested).await?;

    if stopped.is_empty() {
        println!("No running container holds any of the requested ports");
    }
    for container in &stopped {
        println!("Stopped {} (port {})", container.id, container.port);
    }

    Ok(())
}
