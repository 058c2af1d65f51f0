use std::path::Path;

use dockyard::Pipeline;
use dockyard::build::RecipeStatus;

pub fn verify(config: Option<&Path>) -> anyhow::Result<()> {
    let ctx = super::resolve_context(config)?;
    super::require_source(&ctx)?;
    let log = super::stage_log(&ctx)?;

    let statuses = Pipeline::new(&ctx, &log).verify_recipes()?;

    let synthesized = statuses
        .iter()
        .filter(|(_, status)| *status == RecipeStatus::Synthesized)
        .count();
    println!();
    println!(
        "{} service(s) verified, {synthesized} placeholder Dockerfile(s) written",
        statuses.len()
    );

    Ok(())
}
