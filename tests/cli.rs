use apphost::cli::{PlanArgs, RunArgs};
use apphost::commands::{plan, run};
use apphost::handlers;
use apphost::Exit;
use apphost_engine::{FailurePolicy, ReadinessPolicy, RunSettings, StartOutcome};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

fn declarations(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

fn settings() -> RunSettings {
    RunSettings {
        readiness: ReadinessPolicy {
            timeout: Duration::from_secs(2),
            interval: Duration::from_millis(10),
        },
        failure_policy: FailurePolicy::ContinueIndependent,
    }
}

fn run_args(file: PathBuf) -> RunArgs {
    RunArgs {
        file,
        once: true,
        non_interactive: true,
        fail_fast: false,
        readiness_timeout_secs: 2,
        probe_interval_ms: 10,
        supervise_interval_ms: 50,
    }
}

async fn never() {
    std::future::pending::<()>().await
}

const STACK: &str = r#"
    [[parameter]]
    name = "region"
    value = "eu-west"

    [[resource]]
    name = "server"
    kind = "settle"
    config = { settle_ms = 30, host = "localhost" }

    [[resource]]
    name = "database"
    kind = "settle"
    parent = "server"

    [[resource]]
    name = "app"
    kind = "settle"
    wait_for = ["database"]
    config = { region = { parameter = "region" }, host = { resource = "server", output = "host" } }
"#;

#[tokio::test]
async fn stack_comes_up_and_down() {
    let file = declarations(STACK);
    let orchestrator = run::prepare(file.path(), false, settings(), &handlers::builtin()).unwrap();
    assert_eq!(orchestrator.graph().topological_order(), ["server", "database", "app"]);

    let exit = run::execute(orchestrator, None, never).await;
    assert_eq!(exit, Exit::Success);
}

#[tokio::test]
async fn held_stack_stops_on_interrupt() {
    let file = declarations(STACK);
    let orchestrator = run::prepare(file.path(), false, settings(), &handlers::builtin()).unwrap();

    // The first interrupt future covers startup and never fires; the second
    // ends the hold.
    let calls = std::sync::atomic::AtomicUsize::new(0);
    let interrupt = || {
        let call = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        async move {
            if call == 0 {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(Duration::from_millis(50)).await
            }
        }
    };
    let exit = run::execute(orchestrator, Some(Duration::from_millis(10)), interrupt).await;
    assert_eq!(exit, Exit::Success);
}

#[tokio::test]
async fn failing_resource_exits_with_run_failure() {
    let file = declarations(
        r#"
        [[resource]]
        name = "broken"
        kind = "settle"
        config = { settle_ms = "soon" }

        [[resource]]
        name = "fine"
        kind = "settle"
        "#,
    );
    let exit = run::run(run_args(file.path().to_path_buf())).await;
    assert_eq!(exit, Exit::RunFailed);
}

#[tokio::test]
async fn cycle_is_a_declaration_error() {
    let file = declarations(
        r#"
        [[resource]]
        name = "a"
        kind = "settle"
        wait_for = ["b"]

        [[resource]]
        name = "b"
        kind = "settle"
        wait_for = ["a"]
        "#,
    );
    assert_eq!(run::run(run_args(file.path().to_path_buf())).await, Exit::Invalid);

    let err = plan::plan(file.path(), &handlers::builtin()).unwrap_err();
    assert!(err.to_string().contains("Cyclic dependency"), "{err:#}");
}

#[tokio::test]
async fn missing_file_is_a_declaration_error() {
    let exit = run::run(run_args(PathBuf::from("/nonexistent/apphost.toml"))).await;
    assert_eq!(exit, Exit::Invalid);
}

#[tokio::test]
async fn missing_secret_fails_closed_without_prompt() {
    let file = declarations(
        r#"
        [[parameter]]
        name = "apphost-cli-test-unset-secret"
        secret = true

        [[resource]]
        name = "db"
        kind = "settle"
        env = { PASSWORD = { parameter = "apphost-cli-test-unset-secret" } }
        "#,
    );
    let orchestrator = run::prepare(file.path(), false, settings(), &handlers::builtin()).unwrap();
    let err = orchestrator.run().await.unwrap_err();
    let cause = err.report.get("db").unwrap().cause.clone().unwrap();
    assert_eq!(
        cause.to_string(),
        "Missing value for parameter 'apphost-cli-test-unset-secret'"
    );
}

#[tokio::test]
async fn secrets_come_from_the_environment() {
    std::env::set_var("APPHOST_PARAM_APPHOST_CLI_TEST_PASSWORD", "hunter2");
    let file = declarations(
        r#"
        [[parameter]]
        name = "apphost-cli-test-password"
        secret = true

        [[resource]]
        name = "db"
        kind = "settle"
        config = { password = { parameter = "apphost-cli-test-password" } }
        "#,
    );
    let orchestrator = run::prepare(file.path(), false, settings(), &handlers::builtin()).unwrap();
    let handle = orchestrator.run().await.unwrap();

    let outputs = handle.outputs("db").unwrap();
    assert!(outputs["password"].is_secret());
    assert_eq!(outputs["password"].expose(), "hunter2");
    assert!(!format!("{:?}", handle.report()).contains("hunter2"));
    handle.shutdown().await.unwrap();
}

fn persistent_listener(port: u16) -> String {
    format!(
        r#"
        [[resource]]
        name = "db"
        kind = "process"
        lifetime = "persistent"
        config = {{ command = "apphost-cli-test-not-a-command" }}

        [[resource.endpoint]]
        name = "tcp"
        target = {port}
        "#
    )
}

#[tokio::test]
async fn attached_process_survives_supervision() {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let file = declarations(&persistent_listener(port));

    let orchestrator = run::prepare(file.path(), false, settings(), &handlers::builtin()).unwrap();
    let handle = orchestrator.run().await.unwrap();
    assert_eq!(
        handle.report().get("db").unwrap().outcome,
        Some(StartOutcome::Attached)
    );
    let supervised = tokio::time::timeout(
        Duration::from_millis(200),
        handle.supervise(Duration::from_millis(20)),
    )
    .await;
    assert!(supervised.is_err(), "attached instance reported as crashed");
    handle.shutdown().await.unwrap();

    // Held the way `apphost run` holds it, until interrupted.
    let orchestrator = run::prepare(file.path(), false, settings(), &handlers::builtin()).unwrap();
    let calls = std::sync::atomic::AtomicUsize::new(0);
    let interrupt = || {
        let call = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        async move {
            if call == 0 {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(Duration::from_millis(200)).await
            }
        }
    };
    let exit = run::execute(orchestrator, Some(Duration::from_millis(20)), interrupt).await;
    assert_eq!(exit, Exit::Success);

    // Once the instance goes away, supervision notices.
    let orchestrator = run::prepare(file.path(), false, settings(), &handlers::builtin()).unwrap();
    let handle = orchestrator.run().await.unwrap();
    drop(listener);
    let err = tokio::time::timeout(Duration::from_secs(2), handle.supervise(Duration::from_millis(20)))
        .await
        .unwrap();
    assert!(err.report.get("db").unwrap().cause.is_some());
}

#[test]
fn plan_prints_order_and_edges() {
    let file = declarations(STACK);
    let text = plan::plan(file.path(), &handlers::builtin()).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("server"));
    assert!(lines[1].contains("database  wait-for: server"));
    assert!(lines[2].contains("wait-for: database"));
    assert!(lines[2].contains("reference: server"));

    assert_eq!(
        plan::run(PlanArgs {
            file: file.path().to_path_buf()
        }),
        Exit::Success
    );
}

#[test]
fn unknown_kind_fails_plan() {
    let file = declarations(
        r#"
        [[resource]]
        name = "db"
        kind = "postgres"
        "#,
    );
    let err = plan::plan(file.path(), &handlers::builtin()).unwrap_err();
    assert!(err.to_string().contains("postgres"));
}
