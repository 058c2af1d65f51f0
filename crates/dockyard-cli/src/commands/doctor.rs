use std::path::{Path, PathBuf};

use dockyard::{CONFIG_FILE_NAME, DockyardConfig};
use dockyard_engine::{CheckResult, EngineClient};

pub async fn doctor(config: Option<&Path>) -> anyhow::Result<()> {
    let client = EngineClient::new();
    let mut report = client.doctor().await;

    // Config file check
    let path = config.map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), Path::to_path_buf);
    report.config_file = if !path.exists() {
        CheckResult::fail("Not found")
    } else {
        match DockyardConfig::load_file(&path) {
            Ok(c) => CheckResult::ok(&format!("Found ({} service(s))", c.services.len())),
            Err(e) => CheckResult::fail(&e.to_string()),
        }
    };

    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed; see above for details");
    }

    Ok(())
}
