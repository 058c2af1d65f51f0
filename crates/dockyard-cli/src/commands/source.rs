use std::path::Path;

use dockyard::Pipeline;

pub async fn source(config: Option<&Path>) -> anyhow::Result<()> {
    let ctx = super::resolve_context(config)?;
    let log = super::stage_log(&ctx)?;

    Pipeline::new(&ctx, &log).acquire_source().await?;

    Ok(())
}
