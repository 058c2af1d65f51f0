use std::path::Path;

use dockyard::Pipeline;

pub async fn publish(config: Option<&Path>) -> anyhow::Result<()> {
    let ctx = super::resolve_context(config)?;
    super::require_source(&ctx)?;
    let log = super::stage_log(&ctx)?;

    let outcome = Pipeline::new(&ctx, &log).publish_images().await?;

    println!();
    println!("Published {} image(s):", outcome.images.len());
    for image in &outcome.images {
        println!("  {:<16} {}", image.service, image.image);
    }
    for warning in &outcome.warnings {
        println!("Warning: {warning}");
    }

    Ok(())
}
