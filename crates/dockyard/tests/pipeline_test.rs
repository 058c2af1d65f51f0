use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dockyard::build::{ComposeManifest, RecipeStatus};
use dockyard::engine::{Acquisition, Invocation, Tool, ToolError, ToolExecutor};
use dockyard::{
    ComposeConfig, Pipeline, PipelineError, PipelineState, RecipeConfig, RecipePolicy,
    RegistryCredentials, RunContext, RunLog, ServiceSpec, StageEvent, StageObserver,
};
use mockall::{Sequence, mock};
use secrecy::SecretString;
use tempfile::TempDir;

mock! {
    Executor {}

    impl ToolExecutor for Executor {
        async fn exec(&self, invocation: &Invocation) -> Result<String, ToolError>;
        async fn exec_streaming(&self, invocation: &Invocation) -> Result<(), ToolError>;
        async fn exec_with_stdin(
            &self,
            invocation: &Invocation,
            stdin_data: &[u8],
        ) -> Result<String, ToolError>;
    }
}

// ── Fixtures ──

fn failed(stderr: &str) -> ToolError {
    ToolError::CommandFailed {
        command: "test".to_owned(),
        stderr: stderr.to_owned(),
    }
}

fn listing(inv: &Invocation) -> bool {
    inv.tool == Tool::Git && inv.subcommand() == Some("ls-files")
}

fn service(name: &str, port: Option<u16>) -> ServiceSpec {
    ServiceSpec {
        name: name.to_owned(),
        context: PathBuf::from(name),
        image: format!("acme/shop-{name}:latest"),
        port,
        container_port: None,
        run: true,
        depends_on: Vec::new(),
        environment: BTreeMap::new(),
    }
}

fn context(root: &Path, services: Vec<ServiceSpec>) -> RunContext {
    RunContext {
        credentials: Some(RegistryCredentials {
            user: "acme".to_owned(),
            secret: SecretString::from("s3cret"),
        }),
        repository_url: "https://github.com/acme/shop".to_owned(),
        branch: None,
        clone_path: root.to_path_buf(),
        services,
        recipe: RecipeConfig::default(),
        compose: ComposeConfig::default(),
        log_file: root.join("dockyard.log"),
        timeout: None,
        retry_attempts: 1,
    }
}

/// A clone directory whose services all have a Dockerfile.
fn checkout(names: &[&str]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for name in names {
        std::fs::create_dir_all(tmp.path().join(name)).unwrap();
        std::fs::write(tmp.path().join(name).join("Dockerfile"), "FROM scratch\n").unwrap();
    }
    tmp
}

fn run_log(dir: &Path) -> RunLog {
    RunLog::create(&dir.join("run.log")).unwrap().quiet()
}

fn log_contents(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("run.log")).unwrap()
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl StageObserver for Recorder {
    fn on_event(&self, event: &StageEvent<'_>) {
        let line = match event {
            StageEvent::StateChanged(state) => format!("state:{state}"),
            StageEvent::SourceAcquired { acquisition, .. } => format!("source:{acquisition:?}"),
            StageEvent::SourceListed { files } => format!("listed:{}", files.len()),
            StageEvent::RecipeVerified { service, status } => format!("recipe:{service}:{status:?}"),
            StageEvent::ImagePublished(image) => format!("published:{}", image.service),
            StageEvent::RunWarning(w) => format!("run-warning:{}", w.service),
            StageEvent::ContainerStopped(c) => format!("stopped:{}", c.id),
            StageEvent::Launched { .. } => "launched".to_owned(),
            StageEvent::Aborted { reached, .. } => format!("aborted:{reached}"),
        };
        self.0.lock().unwrap().push(line);
    }
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ── Full run ──

#[tokio::test]
async fn full_run_executes_stages_in_order() {
    let tmp = checkout(&["api", "db"]);
    let root = tmp.path().to_path_buf();
    let mut db = service("db", Some(27017));
    db.run = false;
    let ctx = context(&root, vec![service("api", Some(5001)), db]);
    let log = run_log(&root);

    let api_ctx = root.join("api").to_str().unwrap().to_owned();
    let db_ctx = root.join("db").to_str().unwrap().to_owned();
    let compose_dir = root.clone();

    let mut seq = Sequence::new();
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(listing)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("api/Dockerfile\0db/Dockerfile\0".to_owned()));
    mock.expect_exec_with_stdin()
        .withf(|inv, _| inv.subcommand() == Some("login"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(move |inv| inv.args == ["build", "-t", "acme/shop-api:latest", api_ctx.as_str()])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.args == ["run", "-d", "-p", "5001:5001", "acme/shop-api:latest"])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("a1\n".to_owned()));
    mock.expect_exec()
        .withf(|inv| inv.args == ["push", "acme/shop-api:latest"])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(move |inv| inv.args == ["build", "-t", "acme/shop-db:latest", db_ctx.as_str()])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.args == ["push", "acme/shop-db:latest"])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("ps"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("a1 0.0.0.0:5001->5001/tcp\nzz 0.0.0.0:9999->9999/tcp\n".to_owned()));
    mock.expect_exec()
        .withf(|inv| inv.args == ["stop", "a1"])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(move |inv| {
            inv.tool == Tool::Compose && inv.cwd.as_deref() == Some(compose_dir.as_path())
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let report = pipeline.run().await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.acquisition, Acquisition::AlreadyPresent);
    assert_eq!(report.images.len(), 2);
    assert_eq!(report.images[0].container.as_deref(), Some("a1"));
    assert_eq!(report.images[1].container, None);
    assert!(report.warnings.is_empty());
    assert_eq!(report.stopped.len(), 1);
    assert_eq!(report.stopped[0].id, "a1");
    assert_eq!(report.manifest, root.join("docker-compose.yml"));

    let manifest = ComposeManifest::load(&report.manifest).unwrap();
    assert_eq!(
        manifest.services.keys().collect::<Vec<_>>(),
        vec!["api", "db"]
    );

    let log = log_contents(&root);
    assert!(log.contains("Using existing clone"));
    assert!(log.contains(" - db/Dockerfile"));
    assert!(log.contains("Pushed acme/shop-db:latest"));
    assert!(log.contains("Stopped container a1 holding port 5001"));
    assert!(log.contains("Pipeline completed"));
}

#[tokio::test]
async fn observer_sees_state_transitions() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", None)]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec().returning(|_| Ok(String::new()));

    let recorder = Recorder::default();
    let pipeline = Pipeline::with_executor(&ctx, &log, mock)
        .capture_output(true)
        .observe(&recorder);
    pipeline.run().await.unwrap();

    let states: Vec<String> = recorder
        .events()
        .into_iter()
        .filter(|e| e.starts_with("state:"))
        .collect();
    assert_eq!(
        states,
        vec![
            "state:source acquired",
            "state:recipes verified",
            "state:authenticated",
            "state:built",
            "state:pushed",
            "state:ports freed",
            "state:manifest emitted",
            "state:launched",
            "state:done",
        ]
    );
    let events = recorder.events();
    assert!(events.contains(&"listed:0".to_owned()));
    assert!(events.contains(&"recipe:api:Found".to_owned()));
    assert!(events.contains(&"published:api".to_owned()));
    assert!(events.contains(&"launched".to_owned()));
}

// ── Source ──

#[tokio::test]
async fn missing_clone_is_cloned_once() {
    let tmp = TempDir::new().unwrap();
    let mut ctx = context(tmp.path(), vec![service("api", None)]);
    ctx.clone_path = tmp.path().join("shop");
    ctx.branch = Some("main".to_owned());
    let log = run_log(tmp.path());
    let clone_path = ctx.clone_path.clone();

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|inv| inv.tool == Tool::Git && inv.has_arg("--branch") && inv.has_arg("main"))
        .times(1)
        .returning(move |_| {
            std::fs::create_dir_all(&clone_path).unwrap();
            Ok(String::new())
        });
    mock.expect_exec()
        .withf(listing)
        .times(2)
        .returning(|_| Ok("app.py\0".to_owned()));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    assert_eq!(pipeline.acquire_source().await.unwrap(), Acquisition::Cloned);
    assert_eq!(
        pipeline.acquire_source().await.unwrap(),
        Acquisition::AlreadyPresent
    );
}

#[tokio::test]
async fn clone_failure_aborts_before_anything_else() {
    let tmp = TempDir::new().unwrap();
    let mut ctx = context(tmp.path(), vec![service("api", Some(5001))]);
    ctx.clone_path = tmp.path().join("shop");
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|inv| inv.tool == Tool::Git)
        .times(1)
        .returning(|_| Err(failed("fatal: repository 'https://github.com/acme/shop' not found")));
    mock.expect_exec_with_stdin().never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    let aborted = pipeline.run().await.unwrap_err();

    assert_eq!(aborted.reached, PipelineState::Start);
    assert!(matches!(aborted.error, PipelineError::Acquisition { .. }));
    assert_eq!(pipeline.state(), PipelineState::Aborted);

    let chain = format!("{:#}", ErrorChain(&aborted));
    assert!(chain.contains("repository 'https://github.com/acme/shop' not found"));
}

#[tokio::test]
async fn unlistable_checkout_is_only_a_warning() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", None)]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(listing)
        .times(1)
        .returning(|_| Err(failed("fatal: not a git repository")));

    let recorder = Recorder::default();
    let pipeline = Pipeline::with_executor(&ctx, &log, mock).observe(&recorder);
    let acquisition = pipeline.acquire_source().await.unwrap();

    assert_eq!(acquisition, Acquisition::AlreadyPresent);
    assert_eq!(pipeline.state(), PipelineState::SourceAcquired);
    assert!(!recorder.events().iter().any(|e| e.starts_with("listed:")));
    assert!(
        log_contents(tmp.path())
            .contains("WARNING: Could not list repository files: failed to list files in")
    );
}

// ── Recipes ──

#[tokio::test]
async fn missing_recipe_is_synthesized_and_build_proceeds() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", None), service("worker", None)]);
    let log = run_log(tmp.path());

    let pipeline = Pipeline::with_executor(&ctx, &log, MockExecutor::new());
    let statuses = pipeline.verify_recipes().unwrap();

    assert_eq!(
        statuses,
        vec![
            ("api".to_owned(), RecipeStatus::Found),
            ("worker".to_owned(), RecipeStatus::Synthesized),
        ]
    );
    assert!(tmp.path().join("worker/Dockerfile").is_file());
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("api/Dockerfile")).unwrap(),
        "FROM scratch\n"
    );
    assert!(log_contents(tmp.path()).contains("WARNING: No Dockerfile for 'worker'"));
}

#[tokio::test]
async fn require_policy_reports_every_missing_recipe_together() {
    let tmp = checkout(&["api"]);
    let mut ctx = context(
        tmp.path(),
        vec![service("web", None), service("api", None), service("worker", None)],
    );
    ctx.recipe.policy = RecipePolicy::Require;
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin().never();
    mock.expect_exec()
        .withf(listing)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.tool == Tool::Docker)
        .never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    let aborted = pipeline.run().await.unwrap_err();

    assert_eq!(aborted.reached, PipelineState::SourceAcquired);
    match &aborted.error {
        PipelineError::Recipe { failures } => {
            let names: Vec<&str> = failures.iter().map(|(s, _)| s.as_str()).collect();
            assert_eq!(names, vec!["web", "worker"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let message = aborted.error.to_string();
    assert!(message.contains("2 service(s)"), "got: {message}");
    assert!(message.contains("web:"), "got: {message}");
    assert!(!tmp.path().join("web/Dockerfile").exists());
}

// ── Publish ──

#[tokio::test]
async fn failed_authentication_builds_nothing() {
    let tmp = checkout(&["api", "db"]);
    let ctx = context(
        tmp.path(),
        vec![service("api", Some(5001)), service("db", Some(27017))],
    );
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .times(1)
        .returning(|_, _| Err(failed("unauthorized: incorrect username or password")));
    mock.expect_exec().never();
    mock.expect_exec_streaming().never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    let err = pipeline.publish_images().await.unwrap_err();

    match err {
        PipelineError::Authentication { user, .. } => assert_eq!(user, "acme"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn login_is_retried_up_to_configured_attempts() {
    let tmp = checkout(&["api"]);
    let mut ctx = context(tmp.path(), vec![service("api", None)]);
    ctx.retry_attempts = 2;
    let log = run_log(tmp.path());

    let mut seq = Sequence::new();
    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| {
            Err(failed(
                "Error response from daemon: Get \"https://registry-1.docker.io/v2/\": EOF",
            ))
        });
    mock.expect_exec_with_stdin()
        .withf(|_, secret| secret == b"s3cret")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok("Login Succeeded\n".to_owned()));
    mock.expect_exec().returning(|_| Ok(String::new()));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let outcome = pipeline.publish_images().await.unwrap();

    assert_eq!(outcome.images.len(), 1);
    assert_eq!(pipeline.state(), PipelineState::Pushed);
    let log = log_contents(tmp.path());
    assert!(log.contains("registry login failed (attempt 1/2), retrying"));
    assert!(log.contains("Registry login succeeded"));
}

#[tokio::test]
async fn login_rejected_on_every_attempt_is_fatal() {
    let tmp = checkout(&["api"]);
    let mut ctx = context(tmp.path(), vec![service("api", None)]);
    ctx.retry_attempts = 3;
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .times(3)
        .returning(|_, _| Err(failed("unauthorized: incorrect username or password")));
    mock.expect_exec().never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    let err = pipeline.publish_images().await.unwrap_err();

    assert!(matches!(err, PipelineError::Authentication { .. }));
    assert!(log_contents(tmp.path()).contains("attempt 2/3"));
}

#[tokio::test]
async fn missing_credentials_is_reported_before_login() {
    let tmp = checkout(&["api"]);
    let mut ctx = context(tmp.path(), vec![service("api", None)]);
    ctx.credentials = None;
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin().never();
    mock.expect_exec().never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    let err = pipeline.publish_images().await.unwrap_err();

    assert!(matches!(err, PipelineError::Credentials { .. }));
}

#[tokio::test]
async fn run_failure_does_not_block_push() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", Some(5001))]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("build"))
        .times(1)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("run"))
        .times(1)
        .returning(|_| Err(failed("Bind for 0.0.0.0:5001 failed: port is already allocated")));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("push"))
        .times(1)
        .returning(|_| Ok(String::new()));

    let recorder = Recorder::default();
    let pipeline = Pipeline::with_executor(&ctx, &log, mock)
        .capture_output(true)
        .observe(&recorder);
    let outcome = pipeline.publish_images().await.unwrap();

    assert_eq!(outcome.images.len(), 1);
    assert_eq!(outcome.images[0].container, None);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].service, "api");
    assert!(outcome.warnings[0].message.contains("port is already allocated"));
    assert_eq!(pipeline.state(), PipelineState::Pushed);
    assert!(recorder.events().contains(&"run-warning:api".to_owned()));
    assert!(log_contents(tmp.path()).contains("WARNING: container for 'api'"));
}

#[tokio::test]
async fn build_failure_is_fatal_and_skips_run_and_push() {
    let tmp = checkout(&["api", "db"]);
    let ctx = context(
        tmp.path(),
        vec![service("api", Some(5001)), service("db", Some(27017))],
    );
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("build"))
        .times(1)
        .returning(|_| Err(failed("failed to solve: process \"/bin/sh -c pip install\" did not complete")));
    mock.expect_exec()
        .withf(listing)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.tool == Tool::Docker && inv.subcommand() != Some("build"))
        .never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let aborted = pipeline.run().await.unwrap_err();

    assert_eq!(aborted.reached, PipelineState::Authenticated);
    match &aborted.error {
        PipelineError::Build { service, .. } => assert_eq!(service, "api"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(log_contents(tmp.path()).contains("Pipeline aborted after 'authenticated'"));
}

#[tokio::test]
async fn timed_out_build_aborts_as_build_failure() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", Some(5001))]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(listing)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("build"))
        .times(1)
        .returning(|inv| {
            Err(ToolError::TimedOut {
                command: inv.to_string(),
                timeout: Duration::from_secs(600),
            })
        });
    mock.expect_exec()
        .withf(|inv| inv.tool == Tool::Docker && inv.subcommand() != Some("build"))
        .never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let aborted = pipeline.run().await.unwrap_err();

    assert_eq!(aborted.reached, PipelineState::Authenticated);
    match &aborted.error {
        PipelineError::Build { service, source } => {
            assert_eq!(service, "api");
            assert!(matches!(
                std::error::Error::source(source)
                    .and_then(|e| e.downcast_ref::<ToolError>()),
                Some(ToolError::TimedOut { .. })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(log_contents(tmp.path()).contains("timed out after 600s"));
}

#[tokio::test]
async fn timed_out_push_is_publish_failure() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", None)]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("build"))
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("push"))
        .times(1)
        .returning(|inv| {
            Err(ToolError::TimedOut {
                command: inv.to_string(),
                timeout: Duration::from_secs(30),
            })
        });

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let err = pipeline.publish_images().await.unwrap_err();

    match err {
        PipelineError::Publish { service, .. } => assert_eq!(service, "api"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn streamed_build_failure_keeps_tool_diagnostics_in_log() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", None)]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(listing)
        .returning(|_| Ok(String::new()));
    mock.expect_exec_streaming()
        .withf(|inv| inv.subcommand() == Some("build"))
        .times(1)
        .returning(|_| {
            Err(failed(
                "ERROR: failed to solve: pip install returned a non-zero code: 1\n(exit code: exit status: 1)",
            ))
        });

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    pipeline.run().await.unwrap_err();

    let log = log_contents(tmp.path());
    assert!(log.contains("Pipeline aborted after 'authenticated'"));
    assert!(log.contains("pip install returned a non-zero code: 1"));
}

#[tokio::test]
async fn push_is_retried_up_to_configured_attempts() {
    let tmp = checkout(&["api"]);
    let mut ctx = context(tmp.path(), vec![service("api", None)]);
    ctx.retry_attempts = 2;
    let log = run_log(tmp.path());

    let mut seq = Sequence::new();
    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("build"))
        .times(1)
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("push"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(failed("net/http: TLS handshake timeout")));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("push"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(String::new()));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    pipeline.publish_images().await.unwrap();

    assert!(log_contents(tmp.path()).contains("push failed (attempt 1/2), retrying"));
}

#[tokio::test]
async fn push_failure_after_last_attempt_is_fatal() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", None)]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec_with_stdin()
        .returning(|_, _| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("build"))
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("push"))
        .times(1)
        .returning(|_| Err(failed("denied: requested access to the resource is denied")));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let err = pipeline.publish_images().await.unwrap_err();

    match err {
        PipelineError::Publish { service, image, .. } => {
            assert_eq!(service, "api");
            assert_eq!(image, "acme/shop-api:latest");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Launch ──

#[tokio::test]
async fn launch_rewrites_manifest_from_scratch() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", Some(5001))]);
    let log = run_log(tmp.path());
    std::fs::write(tmp.path().join("docker-compose.yml"), "stale: true\n").unwrap();

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("ps"))
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.tool == Tool::Compose)
        .times(1)
        .returning(|_| Ok(String::new()));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let outcome = pipeline.launch().await.unwrap();

    let written = std::fs::read_to_string(&outcome.manifest).unwrap();
    assert!(!written.contains("stale"));
    assert!(written.contains("acme/shop-api:latest"));
    assert!(outcome.stopped.is_empty());
    assert_eq!(pipeline.state(), PipelineState::Launched);
}

#[tokio::test]
async fn launch_hands_custom_manifest_to_compose() {
    let tmp = checkout(&["api"]);
    let mut ctx = context(tmp.path(), vec![service("api", Some(5001))]);
    ctx.compose.file = "stack.yml".to_owned();
    let log = run_log(tmp.path());
    let root = tmp.path().to_path_buf();

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("ps"))
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(move |inv| {
            inv.tool == Tool::Compose
                && inv.args == ["-f", "stack.yml", "up", "-d"]
                && inv.cwd.as_deref() == Some(root.as_path())
        })
        .times(1)
        .returning(|_| Ok(String::new()));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let outcome = pipeline.launch().await.unwrap();

    assert_eq!(outcome.manifest, tmp.path().join("stack.yml"));
    assert!(ComposeManifest::load(&outcome.manifest).is_ok());
    assert!(!tmp.path().join("docker-compose.yml").exists());
}

#[tokio::test]
async fn compose_failure_is_orchestration_error() {
    let tmp = checkout(&["api"]);
    let ctx = context(tmp.path(), vec![service("api", Some(5001))]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|inv| inv.subcommand() == Some("ps"))
        .returning(|_| Ok(String::new()));
    mock.expect_exec()
        .withf(|inv| inv.tool == Tool::Compose)
        .returning(|_| Err(failed("ERROR: manifest invalid")));

    let pipeline = Pipeline::with_executor(&ctx, &log, mock).capture_output(true);
    let err = pipeline.launch().await.unwrap_err();

    assert!(matches!(err, PipelineError::Orchestration { .. }));
    assert_eq!(pipeline.state(), PipelineState::ManifestEmitted);
}

#[tokio::test]
async fn free_ports_without_ports_skips_listing() {
    let tmp = checkout(&[]);
    let ctx = context(tmp.path(), vec![service("api", None)]);
    let log = run_log(tmp.path());

    let mut mock = MockExecutor::new();
    mock.expect_exec().never();

    let pipeline = Pipeline::with_executor(&ctx, &log, mock);
    let stopped = pipeline.free_ports(&Default::default()).await.unwrap();

    assert!(stopped.is_empty());
    assert!(log_contents(tmp.path()).contains("No host ports to free"));
}

/// Renders an error with all of its sources.
struct ErrorChain<'a>(&'a dyn std::error::Error);

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}
