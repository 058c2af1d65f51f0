use std::path::Path;

use dockyard::Pipeline;

pub async fn compose(config: Option<&Path>) -> anyhow::Result<()> {
    let ctx = super::resolve_context(config)?;
    super::require_source(&ctx)?;
    let log = super::stage_log(&ctx)?;

    let outcome = Pipeline::new(&ctx, &log).launch().await?;

    println!();
    if !outcome.stopped.is_empty() {
        println!("Stopped {} conflicting container(s)", outcome.stopped.len());
    }
    println!("Stack launched from {}", outcome.manifest.display());

    Ok(())
}
