use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use dockyard::build::RecipeStatus;
use dockyard::engine::Acquisition;
use dockyard::{PipelineState, StageEvent, StageObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Source,
    Recipes,
    Images,
    Ports,
    Launch,
    Outcome,
}

impl Section {
    fn title(&self) -> &'static str {
        match self {
            Section::Source => "Source",
            Section::Recipes => "Recipes",
            Section::Images => "Images",
            Section::Ports => "Ports",
            Section::Launch => "Launch",
            Section::Outcome => "Outcome",
        }
    }
}

/// Collects pipeline events into a per-stage summary for `up --narrate`.
#[derive(Default)]
pub(crate) struct Narrator {
    notes: Mutex<BTreeMap<Section, Vec<String>>>,
}

impl Narrator {
    fn note(&self, section: Section, line: String) {
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(section)
            .or_default()
            .push(line);
    }

    pub(crate) fn summary(&self) -> String {
        let notes = self.notes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for (section, lines) in notes.iter() {
            out.push_str(section.title());
            out.push('\n');
            for line in lines {
                out.push_str(&format!("  {line}\n"));
            }
        }
        out
    }
}

impl StageObserver for Narrator {
    fn on_event(&self, event: &StageEvent<'_>) {
        match event {
            StageEvent::SourceAcquired { path, acquisition } => {
                let line = match acquisition {
                    Acquisition::Cloned => format!("cloned into {}", path.display()),
                    Acquisition::AlreadyPresent => {
                        format!("reused existing clone at {}", path.display())
                    }
                };
                self.note(Section::Source, line);
            }
            StageEvent::SourceListed { files } => {
                self.note(Section::Source, format!("{} tracked file(s)", files.len()));
            }
            StageEvent::RecipeVerified { service, status } => {
                let line = match status {
                    RecipeStatus::Found => format!("{service}: Dockerfile found"),
                    RecipeStatus::Synthesized => format!("{service}: placeholder Dockerfile written"),
                };
                self.note(Section::Recipes, line);
            }
            StageEvent::ImagePublished(image) => {
                let mut line = format!("{}: pushed {}", image.service, image.image);
                if let Some(id) = &image.container {
                    let short: String = id.chars().take(12).collect();
                    line.push_str(&format!(" (ran as {short})"));
                }
                self.note(Section::Images, line);
            }
            StageEvent::RunWarning(warning) => {
                self.note(
                    Section::Images,
                    format!("{}: container did not start ({})", warning.service, warning.message),
                );
            }
            StageEvent::ContainerStopped(container) => {
                self.note(
                    Section::Ports,
                    format!("stopped {} holding port {}", container.id, container.port),
                );
            }
            StageEvent::Launched { manifest } => {
                self.note(
                    Section::Launch,
                    format!("compose up from {}", manifest.display()),
                );
            }
            StageEvent::StateChanged(PipelineState::Done) => {
                self.note(Section::Outcome, "done".to_owned());
            }
            StageEvent::Aborted { reached, error } => {
                self.note(
                    Section::Outcome,
                    format!("aborted after '{reached}': {error}"),
                );
            }
            StageEvent::StateChanged(_) => {}
        }
    }
}
