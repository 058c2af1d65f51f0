use std::path::Path;

use dockyard::{Pipeline, RunLog};

use super::narrator::Narrator;

/// Run the whole pipeline, starting a fresh run log.
pub async fn up(config: Option<&Path>, narrate: bool) -> anyhow::Result<()> {
    let ctx = super::resolve_context(config)?;
    let log = RunLog::create(&ctx.log_file)?;
    let narrator = Narrator::default();

    let mut pipeline = Pipeline::new(&ctx, &log);
    if narrate {
        pipeline = pipeline.observe(&narrator);
    }
    let result = pipeline.run().await;

    if narrate {
        println!();
        print!("{}", narrator.summary());
    }

    let report = match result {
        Ok(report) => report,
        Err(aborted) => {
            if let Some(path) = log.path() {
                eprintln!("Run log: {}", path.display());
            }
            return Err(aborted.into());
        }
    };

    println!();
    println!("Published {} image(s):", report.images.len());
    for image in &report.images {
        println!("  {:<16} {}", image.service, image.image);
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    let synthesized: Vec<&str> = report.synthesized_recipes().collect();
    if !synthesized.is_empty() {
        println!(
            "Placeholder Dockerfiles were written for: {}. Review them before relying on these images.",
            synthesized.join(", ")
        );
    }
    println!("Stack launched from {}", report.manifest.display());
    if let Some(path) = log.path() {
        println!("Run log: {}", path.display());
    }

    Ok(())
}
