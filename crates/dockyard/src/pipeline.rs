use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use dockyard_build::recipe::{recipe_path, verify_or_synthesize};
use dockyard_build::{ComposeManifest, RecipeStatus};
use dockyard_core::{RunContext, RunLog, ServiceSpec, Stage};
use dockyard_engine::{Acquisition, EngineClient, RealExecutor, StoppedContainer, ToolExecutor};

use crate::error::{Aborted, PipelineError, error_chain};
use crate::observer::{StageEvent, StageObserver};
use crate::report::{LaunchOutcome, PipelineReport, PublishOutcome, PublishedImage, RunWarning};
use crate::state::PipelineState;

/// Runs the stages of one pipeline run against a resolved [`RunContext`].
///
/// Stages are public so each can be run on its own; [`Pipeline::run`] chains
/// them in order and stops at the first fatal error.
pub struct Pipeline<'a, E: ToolExecutor = RealExecutor> {
    ctx: &'a RunContext,
    log: &'a RunLog,
    client: EngineClient<E>,
    observer: Option<&'a dyn StageObserver>,
    capture: bool,
    state: Mutex<PipelineState>,
}

impl<'a> Pipeline<'a, RealExecutor> {
    /// A pipeline driving the real tools, each call bounded by `ctx.timeout`.
    pub fn new(ctx: &'a RunContext, log: &'a RunLog) -> Self {
        Self::with_executor(ctx, log, RealExecutor::with_timeout(ctx.timeout))
    }
}

impl<'a, E: ToolExecutor> Pipeline<'a, E> {
    pub fn with_executor(ctx: &'a RunContext, log: &'a RunLog, executor: E) -> Self {
        Self {
            ctx,
            log,
            client: EngineClient::with_executor(executor),
            observer: None,
            capture: false,
            state: Mutex::new(PipelineState::Start),
        }
    }

    pub fn observe(mut self, observer: &'a dyn StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// `true`: capture build / compose output instead of streaming it to the terminal.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every stage in order: source → recipes → publish → launch.
    pub async fn run(&self) -> Result<PipelineReport, Aborted> {
        self.log.log(
            Stage::Pipeline,
            format!(
                "Pipeline started: {} service(s) from {}",
                self.ctx.services.len(),
                self.ctx.repository_url
            ),
        );

        match self.run_stages().await {
            Ok(report) => {
                self.advance(PipelineState::Done);
                self.log.log(Stage::Pipeline, "Pipeline completed");
                Ok(report)
            }
            Err(error) => {
                let reached = self.state();
                let message = error_chain(&error);
                self.advance(PipelineState::Aborted);
                self.log.log(
                    Stage::Pipeline,
                    format!("Pipeline aborted after '{reached}': {message}"),
                );
                self.notify(StageEvent::Aborted {
                    reached,
                    error: &message,
                });
                Err(Aborted { reached, error })
            }
        }
    }

    async fn run_stages(&self) -> Result<PipelineReport, PipelineError> {
        let acquisition = self.acquire_source().await?;
        let recipes = self.verify_recipes()?;
        let published = self.publish_images().await?;
        let launched = self.launch().await?;

        Ok(PipelineReport {
            state: PipelineState::Done,
            acquisition,
            recipes,
            images: published.images,
            warnings: published.warnings,
            stopped: launched.stopped,
            manifest: launched.manifest,
        })
    }

    // ── Source ──

    /// Clone the repository unless the clone path already exists.
    pub async fn acquire_source(&self) -> Result<Acquisition, PipelineError> {
        let url = &self.ctx.repository_url;
        let path = &self.ctx.clone_path;

        let acquisition = self
            .client
            .ensure_source(url, path, self.ctx.branch.as_deref())
            .await
            .map_err(|source| PipelineError::Acquisition {
                url: url.clone(),
                source,
            })?;

        match acquisition {
            Acquisition::Cloned => self.log.log(
                Stage::Source,
                format!("Cloned {url} into {}", path.display()),
            ),
            Acquisition::AlreadyPresent => self.log.log(
                Stage::Source,
                format!("Using existing clone at {}", path.display()),
            ),
        };

        self.notify(StageEvent::SourceAcquired {
            path: path.as_path(),
            acquisition,
        });
        self.list_source_files().await;
        self.advance(PipelineState::SourceAcquired);
        Ok(acquisition)
    }

    /// Log the files tracked in the checkout. A checkout git cannot list is
    /// only a warning; the recipes are checked on disk either way.
    async fn list_source_files(&self) {
        let path = &self.ctx.clone_path;
        match self.client.list_files(path).await {
            Ok(files) => {
                self.log.log(
                    Stage::Source,
                    format!("Files in {} ({}):", path.display(), files.len()),
                );
                for file in &files {
                    self.log.log(Stage::Source, format!(" - {file}"));
                }
                self.notify(StageEvent::SourceListed { files: &files });
            }
            Err(e) => {
                self.log.warn(
                    Stage::Source,
                    format!("Could not list repository files: {}", error_chain(&e)),
                );
            }
        }
    }

    // ── Recipes ──

    /// Verify every service's recipe, then report all failures together.
    pub fn verify_recipes(&self) -> Result<Vec<(String, RecipeStatus)>, PipelineError> {
        let root = self.ctx.source_root();
        let mut statuses = Vec::with_capacity(self.ctx.services.len());
        let mut failures = Vec::new();

        for service in &self.ctx.services {
            match verify_or_synthesize(root, service, &self.ctx.recipe) {
                Ok(status) => {
                    match status {
                        RecipeStatus::Found => self.log.log(
                            Stage::Recipe,
                            format!("Found Dockerfile for '{}'", service.name),
                        ),
                        RecipeStatus::Synthesized => self.log.warn(
                            Stage::Recipe,
                            format!(
                                "No Dockerfile for '{}'; wrote a placeholder to {}",
                                service.name,
                                recipe_path(root, service).display()
                            ),
                        ),
                    };
                    self.notify(StageEvent::RecipeVerified {
                        service: &service.name,
                        status,
                    });
                    statuses.push((service.name.clone(), status));
                }
                Err(e) => {
                    self.log.warn(
                        Stage::Recipe,
                        format!("'{}': {}", service.name, error_chain(&e)),
                    );
                    failures.push((service.name.clone(), e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(PipelineError::Recipe { failures });
        }

        self.advance(PipelineState::RecipesVerified);
        Ok(statuses)
    }

    // ── Publish ──

    /// Log in to the registry. Retried up to `retry_attempts` times.
    pub async fn authenticate(&self) -> Result<(), PipelineError> {
        let creds = self
            .ctx
            .require_credentials()
            .map_err(|source| PipelineError::Credentials { source })?;

        self.log.log(
            Stage::Auth,
            format!("Logging in to registry as {}", creds.user),
        );
        self.retrying(Stage::Auth, "registry login", move || {
            self.client.login(&creds.user, &creds.secret)
        })
        .await
        .map_err(|source| PipelineError::Authentication {
            user: creds.user.clone(),
            source,
        })?;
        self.log.log(Stage::Auth, "Registry login succeeded");

        self.advance(PipelineState::Authenticated);
        Ok(())
    }

    /// Authenticate once, then build, optionally run, and push each service in order.
    ///
    /// A build or push failure aborts; a container that fails to start does not.
    pub async fn publish_images(&self) -> Result<PublishOutcome, PipelineError> {
        self.authenticate().await?;

        let mut outcome = PublishOutcome::default();
        for service in &self.ctx.services {
            let (published, warning) = self.publish_service(service).await?;
            outcome.images.push(published);
            outcome.warnings.extend(warning);
        }

        Ok(outcome)
    }

    async fn publish_service(
        &self,
        service: &ServiceSpec,
    ) -> Result<(PublishedImage, Option<RunWarning>), PipelineError> {
        let context = self.ctx.source_root().join(&service.context);

        self.log.log(
            Stage::Build,
            format!("Building {} from {}", service.image, context.display()),
        );
        let output = self
            .client
            .build_image(&service.image, &context, self.capture)
            .await
            .map_err(|source| PipelineError::Build {
                service: service.name.clone(),
                source,
            })?;
        if let Some(output) = output {
            tracing::debug!(service = %service.name, "{output}");
        }
        self.log.log(Stage::Build, format!("Built {}", service.image));
        self.advance(PipelineState::Built);

        let mut container = None;
        let mut warning = None;
        if let Some(mapping) = service.port_mapping().filter(|_| service.runs_locally()) {
            match self.client.run_container(&service.image, &mapping).await {
                Ok(id) => {
                    self.log.log(
                        Stage::Run,
                        format!("Started {} on {mapping} (container {id})", service.image),
                    );
                    container = Some(id);
                }
                Err(e) => {
                    let w = RunWarning {
                        service: service.name.clone(),
                        image: service.image.clone(),
                        message: error_chain(&e),
                    };
                    self.log.warn(Stage::Run, &w);
                    self.notify(StageEvent::RunWarning(&w));
                    warning = Some(w);
                }
            }
            self.advance(PipelineState::RunAttempted);
        }

        self.log.log(Stage::Push, format!("Pushing {}", service.image));
        self.retrying(Stage::Push, "push", move || {
            self.client.push_image(&service.image)
        })
        .await
        .map_err(|source| PipelineError::Publish {
            service: service.name.clone(),
            image: service.image.clone(),
            source,
        })?;
        self.log.log(Stage::Push, format!("Pushed {}", service.image));
        self.advance(PipelineState::Pushed);

        let published = PublishedImage {
            service: service.name.clone(),
            image: service.image.clone(),
            container,
        };
        self.notify(StageEvent::ImagePublished(&published));
        Ok((published, warning))
    }

    // ── Launch ──

    /// Stop every running container that holds one of `ports` on the host.
    pub async fn free_ports(
        &self,
        ports: &BTreeSet<u16>,
    ) -> Result<Vec<StoppedContainer>, PipelineError> {
        if ports.is_empty() {
            self.log.log(Stage::Ports, "No host ports to free");
        } else {
            self.log
                .log(Stage::Ports, format!("Freeing host port(s) {}", join_ports(ports)));
        }

        let stopped = self.client.free_ports(ports).await?;

        for container in &stopped {
            self.log.log(
                Stage::Ports,
                format!(
                    "Stopped container {} holding port {}",
                    container.id, container.port
                ),
            );
            self.notify(StageEvent::ContainerStopped(container));
        }
        if stopped.is_empty() && !ports.is_empty() {
            self.log.log(Stage::Ports, "No conflicting containers running");
        }

        self.advance(PipelineState::PortsFreed);
        Ok(stopped)
    }

    /// Free the stack's ports, write the compose manifest, and bring the stack up.
    pub async fn launch(&self) -> Result<LaunchOutcome, PipelineError> {
        let stopped = self.free_ports(&self.ctx.published_ports()).await?;

        let path = self.ctx.compose_path();
        ComposeManifest::from_services(&self.ctx.compose.version, &self.ctx.services)
            .write(&path)?;
        self.log.log(
            Stage::Compose,
            format!(
                "Wrote compose manifest {} ({} service(s))",
                path.display(),
                self.ctx.services.len()
            ),
        );
        self.advance(PipelineState::ManifestEmitted);

        self.log.log(
            Stage::Compose,
            format!("Running compose up with {}", path.display()),
        );
        let output = self
            .client
            .compose_up(&path, self.capture)
            .await
            .map_err(|source| PipelineError::Orchestration { source })?;
        if let Some(output) = output {
            tracing::debug!("{output}");
        }
        self.log.log(Stage::Compose, "Stack launched");

        self.advance(PipelineState::Launched);
        self.notify(StageEvent::Launched { manifest: &path });
        Ok(LaunchOutcome {
            stopped,
            manifest: path,
        })
    }

    // ── Helpers ──

    async fn retrying<T, Er, F, Fut>(&self, stage: Stage, what: &str, mut op: F) -> Result<T, Er>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Er>>,
        Er: std::error::Error,
    {
        let attempts = self.ctx.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    self.log.warn(
                        stage,
                        format!(
                            "{what} failed (attempt {attempt}/{attempts}), retrying: {}",
                            error_chain(&e)
                        ),
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn advance(&self, to: PipelineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = to;
        tracing::debug!(state = %to, "pipeline state");
        self.notify(StageEvent::StateChanged(to));
    }

    fn notify(&self, event: StageEvent<'_>) {
        if let Some(observer) = self.observer {
            observer.on_event(&event);
        }
    }
}

fn join_ports(ports: &BTreeSet<u16>) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
