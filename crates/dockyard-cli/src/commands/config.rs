use std::collections::BTreeMap;
use std::path::Path;

use dockyard::{RecipePolicy, RunContext};
use serde::Serialize;

/// Resolved configuration as shown to the user. Holds no secret material.
#[derive(Serialize)]
struct ConfigView<'a> {
    repository_url: &'a str,
    branch: Option<&'a str>,
    clone_path: &'a Path,
    registry_user: Option<&'a str>,
    registry_secret: &'static str,
    recipe_policy: RecipePolicy,
    compose_file: String,
    log_file: &'a Path,
    timeout_secs: Option<u64>,
    retry_attempts: u32,
    services: Vec<ServiceView<'a>>,
}

#[derive(Serialize)]
struct ServiceView<'a> {
    name: &'a str,
    context: &'a Path,
    image: &'a str,
    ports: Option<String>,
    run: bool,
    depends_on: &'a [String],
    environment: &'a BTreeMap<String, String>,
}

impl<'a> ConfigView<'a> {
    fn new(ctx: &'a RunContext) -> Self {
        Self {
            repository_url: &ctx.repository_url,
            branch: ctx.branch.as_deref(),
            clone_path: &ctx.clone_path,
            registry_user: ctx.credentials.as_ref().map(|c| c.user.as_str()),
            registry_secret: if ctx.credentials.is_some() {
                "[REDACTED]"
            } else {
                "unset"
            },
            recipe_policy: ctx.recipe.policy,
            compose_file: ctx.compose_path().display().to_string(),
            log_file: &ctx.log_file,
            timeout_secs: ctx.timeout.map(|t| t.as_secs()),
            retry_attempts: ctx.retry_attempts,
            services: ctx
                .services
                .iter()
                .map(|s| ServiceView {
                    name: &s.name,
                    context: &s.context,
                    image: &s.image,
                    ports: s.port_mapping(),
                    run: s.runs_locally(),
                    depends_on: &s.depends_on,
                    environment: &s.environment,
                })
                .collect(),
        }
    }
}

pub fn show_config(config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let ctx = super::resolve_context(config)?;
    let view = ConfigView::new(&ctx);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let branch = view.branch.map(|b| format!(" ({b})")).unwrap_or_default();
    println!("Source:       {}{branch}", view.repository_url);
    println!("Clone path:   {}", view.clone_path.display());
    println!(
        "Registry:     {} (secret: {})",
        view.registry_user.unwrap_or("unset"),
        view.registry_secret
    );
    println!("Recipes:      {:?}", view.recipe_policy);
    println!("Compose file: {}", view.compose_file);
    println!("Run log:      {}", view.log_file.display());
    match view.timeout_secs {
        Some(secs) => println!("Timeout:      {secs}s"),
        None => println!("Timeout:      none"),
    }
    println!("Attempts:     {} (login, push)", view.retry_attempts);
    println!("Services:");
    for s in &view.services {
        println!(
            "  {:<12} {:<40} {:<12} context={}",
            s.name,
            s.image,
            s.ports.as_deref().unwrap_or("-"),
            s.context.display()
        );
    }

    Ok(())
}
