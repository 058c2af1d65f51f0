mod compose;
mod config;
mod doctor;
mod free_ports;
mod narrator;
mod publish;
mod source;
mod up;
mod verify;

use std::path::Path;

use dockyard::{DockyardConfig, ProcessEnv, RunContext, RunLog};

pub use compose::compose;
pub use config::show_config;
pub use doctor::doctor;
pub use free_ports::free_ports;
pub use publish::publish;
pub use source::source;
pub use up::up;
pub use verify::verify;

/// `--config PATH` if given (must exist), otherwise `./dockyard.toml` or defaults.
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<DockyardConfig> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Ok(DockyardConfig::load_file(path)?)
        }
        None => Ok(DockyardConfig::load(Path::new("."))?),
    }
}

pub(crate) fn resolve_context(path: Option<&Path>) -> anyhow::Result<RunContext> {
    let config = load_config(path)?;
    Ok(RunContext::resolve(config, &ProcessEnv)?)
}

/// Single-stage commands continue the current run log instead of starting a new one.
pub(crate) fn stage_log(ctx: &RunContext) -> anyhow::Result<RunLog> {
    Ok(RunLog::append(&ctx.log_file)?)
}

pub(crate) fn require_source(ctx: &RunContext) -> anyhow::Result<()> {
    if !ctx.source_root().is_dir() {
        anyhow::bail!(
            "no source at {}; run `dockyard source` first",
            ctx.source_root().display()
        );
    }
    Ok(())
}
