use postmetrics_core::{CacheKey, Database, Metric};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("postmetrics/data.db")
    }

    fn open_db(&self) -> Database {
        let db = Database::open(&self.db_path()).expect("failed to open db");
        db.migrate().expect("failed to migrate db");
        db
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("postmetrics");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

/// Provision the primary store with traffic inside and outside the window.
fn seed_traffic(db: &Database) {
    db.connection()
        .execute_batch(
            r#"
            CREATE TABLE traffic_daily (
                subject_id INTEGER NOT NULL,
                day        TEXT NOT NULL,
                views      INTEGER NOT NULL DEFAULT 0,
                sessions   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (subject_id, day)
            );
            INSERT INTO traffic_daily VALUES (42, date('now', '-1 day'), 100, 30);
            INSERT INTO traffic_daily VALUES (42, date('now', '-29 days'), 20, 10);
            INSERT INTO traffic_daily VALUES (42, date('now', '-45 days'), 5000, 5000);
            INSERT INTO traffic_daily VALUES (7, date('now', '-2 days'), 300, 3);
            "#,
        )
        .expect("failed to seed traffic");
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("postmetrics"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute postmetrics: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "postmetrics {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn resolve_reads_primary_store_and_updates_projection() {
    let env = CliTestEnv::new();
    seed_traffic(&env.open_db());

    let stdout = run_ok(&env, &["resolve", "42", "7", "--format", "json"]);
    let rows: serde_json::Value =
        serde_json::from_str(&stdout).expect("resolve should print JSON");

    assert_eq!(rows[0]["subject_id"], 42);
    assert_eq!(rows[0]["views"], 120);
    assert_eq!(rows[0]["sessions"], 40);
    assert_eq!(rows[1]["subject_id"], 7);
    assert_eq!(rows[1]["views"], 300);

    let db = env.open_db();
    assert_eq!(
        db.get_projected_metric(CacheKey::new(42, Metric::Views))
            .unwrap(),
        Some(120)
    );
    assert!(
        env.xdg_state.join("postmetrics").exists(),
        "log directory should be created"
    );
}

#[test]
fn rank_lists_projected_subjects() {
    let env = CliTestEnv::new();
    seed_traffic(&env.open_db());
    run_ok(&env, &["resolve", "42", "7"]);

    let stdout = run_ok(&env, &["rank", "--metric", "views"]);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "unexpected rank output:\n{stdout}");
    assert!(lines[0].contains("7") && lines[0].contains("views=300"));
    assert!(lines[1].contains("42") && lines[1].contains("views=120"));

    let stdout = run_ok(&env, &["rank", "--metric", "sessions", "--limit", "1"]);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("sessions=40"));
}

#[test]
fn resolve_without_any_source_reports_no_data() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["resolve", "42"]);
    assert!(
        stdout.contains("views=0") && stdout.contains("sessions=0"),
        "unresolved metrics should print as zero, got:\n{stdout}"
    );

    let stdout = run_ok(&env, &["resolve", "42", "--format", "json"]);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(rows[0]["views"], 0);
    assert_eq!(rows[0]["sessions"], 0);
    assert!(rows[0].get("cancelled").is_none());

    let stdout = run_ok(&env, &["rank"]);
    assert!(stdout.contains("No views recorded yet"));
}

#[test]
fn resolve_serves_durable_cache_when_primary_missing() {
    let env = CliTestEnv::new();
    let db = env.open_db();
    db.set_cached_metric(CacheKey::new(9, Metric::Views), 55)
        .unwrap();
    db.set_cached_metric(CacheKey::new(9, Metric::Sessions), 0)
        .unwrap();
    drop(db);

    let stdout = run_ok(&env, &["resolve", "9", "--format", "json"]);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(rows[0]["views"], 55);
    assert_eq!(rows[0]["sessions"], 0);
}

#[test]
fn refresh_overwrites_stale_projection() {
    let env = CliTestEnv::new();
    let db = env.open_db();
    db.set_projected_metric(CacheKey::new(42, Metric::Views), 1)
        .unwrap();
    seed_traffic(&db);
    drop(db);

    let stdout = run_ok(&env, &["refresh", "42"]);
    assert!(stdout.contains("views=120"), "got:\n{stdout}");

    assert_eq!(
        env.open_db()
            .get_projected_metric(CacheKey::new(42, Metric::Views))
            .unwrap(),
        Some(120)
    );
}

#[test]
fn path_command_records_page_path() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["path", "42", "/hello-world/"]);
    assert!(stdout.contains("/hello-world/"));
    assert_eq!(
        env.open_db().get_page_path(42).unwrap().as_deref(),
        Some("/hello-world/")
    );

    let output = run_bin(&env, &["path", "42", "no-slash"]);
    assert!(!output.status.success());
}

#[test]
fn invalid_arguments_are_rejected() {
    let env = CliTestEnv::new();

    assert!(!run_bin(&env, &["resolve"]).status.success());
    assert!(!run_bin(&env, &["rank", "--metric", "clicks"]).status.success());
}

#[test]
fn invalid_config_fails_fast() {
    let env = CliTestEnv::new();
    env.write_config("[resolver]\nmax_span_days = 0\n");

    let output = run_bin(&env, &["resolve", "42"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("configuration"), "got:\n{stderr}");
}

#[test]
fn blank_api_key_leaves_commands_working() {
    let env = CliTestEnv::new();
    env.write_config(
        "[analytics]\naccount_name = \"blog\"\nproperty_id = \"site\"\napi_key = \"\"\n",
    );
    seed_traffic(&env.open_db());

    let stdout = run_ok(&env, &["refresh", "42"]);
    assert!(stdout.contains("views=120"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["rank"]);
    assert!(stdout.contains("views=120"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["resolve", "99"]);
    assert!(stdout.contains("views=0"), "got:\n{stdout}");
}
