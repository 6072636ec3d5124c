// End-to-end tests for the `sjoin` binary.
//
// Every test gets its own data directory and a settings path that does not
// exist, so nothing touches the user's real snapshot or config.
//
// Run with: cargo test -p sheetjoin-cli --test cli_tests

use std::path::Path;
use std::process::{Command, Output};

use tempfile::{tempdir, TempDir};

fn sjoin(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sjoin"));
    cmd.env("SHEETJOIN_CONFIG", dir.join("settings.json"))
        .env_remove("SHEETJOIN_DATA_DIR")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(dir.join("data"));
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    sjoin(dir).args(args).output().expect("failed to run sjoin")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be JSON ({}):\n{}", e, stdout))
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "exit code: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Workspace with `src` and `tgt` loaded: key "1" has two names, "2" has one.
fn loaded() -> TempDir {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src.csv");
    let tgt = dir.path().join("tgt.csv");
    std::fs::write(&src, "id\n1\n2\n").unwrap();
    std::fs::write(&tgt, "id,name\n1,x\n1,y\n2,z\n").unwrap();

    let out = run(dir.path(), &["load", src.to_str().unwrap(), tgt.to_str().unwrap()]);
    assert_success(&out);
    dir
}

#[test]
fn load_then_list_tables() {
    let dir = loaded();
    let stdout = String::from_utf8_lossy(&run(dir.path(), &["tables"]).stdout).to_string();
    assert!(stdout.contains("src"));

    let out = run(dir.path(), &["tables", "--json"]);
    assert_success(&out);
    assert_eq!(
        stdout_json(&out),
        serde_json::json!([
            { "name": "src", "rows": 2, "columns": ["id"] },
            { "name": "tgt", "rows": 3, "columns": ["id", "name"] }
        ])
    );
}

#[test]
fn match_reports_conflicts_then_applies_selection() {
    let dir = loaded();
    let base = ["match", "src", "id", "tgt", "--columns", "name", "--json"];

    let out = run(dir.path(), &base);
    assert_eq!(out.status.code(), Some(6));
    let pending = stdout_json(&out);
    assert_eq!(
        pending["conflicts"],
        serde_json::json!({ "1": [{ "name": "x" }, { "name": "y" }] })
    );
    assert!(String::from_utf8_lossy(&out.stderr).contains("--select"));

    let mut args = base.to_vec();
    args.extend(["--select", "1=1"]);
    let out = run(dir.path(), &args);
    assert_success(&out);
    assert_eq!(
        stdout_json(&out),
        serde_json::json!([{ "id": 1, "name": "y" }, { "id": 2, "name": "z" }])
    );
}

#[test]
fn match_first_writes_output_file() {
    let dir = loaded();
    let csv = dir.path().join("joined.csv");
    let out = run(
        dir.path(),
        &["match", "src", "id", "tgt", "--columns", "name", "--first", "-o", csv.to_str().unwrap()],
    );
    assert_success(&out);
    assert!(out.stdout.is_empty());
    assert_eq!(std::fs::read_to_string(&csv).unwrap(), "id,name\n1,x\n2,z\n");
}

#[test]
fn match_errors_use_kind_exit_codes() {
    let dir = loaded();

    let out = run(dir.path(), &["match", "ghost", "id", "tgt", "--columns", "name"]);
    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stderr).contains("table 'ghost' does not exist"));

    let out = run(dir.path(), &["match", "src", "id", "tgt", "--columns", "name,age,email"]);
    assert_eq!(out.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&out.stderr)
        .contains("table 'tgt': columns ['age', 'email'] do not exist"));

    let out = run(dir.path(), &["match", "src", "id", "tgt", "--columns", "name", "--select", "1=9"]);
    assert_eq!(out.status.code(), Some(5));

    let out = run(dir.path(), &["match", "src", "id", "tgt", "--columns", "name", "--select", "oops"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn multi_match_plan_chains_and_saves() {
    let dir = tempdir().unwrap();
    let files = [
        ("orders.csv", "order,customer\no1,c1\no2,c2\no3,C1\n"),
        ("customers.csv", "id,name,region\nc1,Ann,EU\nc2,Ben,US\n"),
        ("reps.csv", "region,rep\nEU,Eve\neu,Eli\nUS,Sam\n"),
    ];
    for (name, body) in files {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        assert_success(&run(dir.path(), &["load", path.to_str().unwrap()]));
    }

    let plan = dir.path().join("enrich.toml");
    std::fs::write(
        &plan,
        r#"
[[targets]]
target_table = "customers"
target_match_column = "id"
target_columns = ["region"]

[[targets]]
source_column = "region(customers)"
target_table = "reps"
target_match_column = "region"
target_columns = ["rep"]
"#,
    )
    .unwrap();

    let out = run(
        dir.path(),
        &["multi-match", "orders", "customer", "--plan", plan.to_str().unwrap(), "--save-as", "enriched", "--json"],
    );
    assert_success(&out);
    let rows = stdout_json(&out);
    // o1 and o3 fan out to both EU reps, o2 has one US rep
    assert_eq!(rows.as_array().unwrap().len(), 5);
    assert_eq!(rows[0], serde_json::json!({
        "order": "o1", "customer": "c1", "region(customers)": "EU", "rep(reps)": "Eve"
    }));

    let out = run(dir.path(), &["show", "enriched", "--json"]);
    assert_success(&out);
    let page = stdout_json(&out);
    assert_eq!(page["total"], 5);
    assert_eq!(
        page["columns"],
        serde_json::json!(["order", "customer", "region(customers)", "rep(reps)"])
    );
}

#[test]
fn multi_match_without_source_is_a_usage_error() {
    let dir = loaded();
    let plan = dir.path().join("plan.toml");
    std::fs::write(
        &plan,
        "[[targets]]\ntarget_table = \"tgt\"\ntarget_match_column = \"id\"\ntarget_columns = [\"name\"]\n",
    )
    .unwrap();

    let out = run(dir.path(), &["multi-match", "--plan", plan.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("source_table must not be blank"));
}

#[test]
fn search_finds_case_insensitive_substrings() {
    let dir = loaded();
    let out = run(dir.path(), &["search", "tgt", "Y", "--json"]);
    assert_success(&out);
    assert_eq!(stdout_json(&out), serde_json::json!([{ "id": 1, "name": "y" }]));

    let out = run(dir.path(), &["search", "tgt", "y", "--column", "nope"]);
    assert_eq!(out.status.code(), Some(4));
}

#[test]
fn show_pages_through_a_table() {
    let dir = loaded();
    let out = run(dir.path(), &["show", "tgt", "--page", "2", "--page-size", "2", "--json"]);
    assert_success(&out);
    let page = stdout_json(&out);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["data"], serde_json::json!([{ "id": 2, "name": "z" }]));
}

#[test]
fn export_selected_columns_and_delete() {
    let dir = loaded();
    let json = dir.path().join("names.json");
    let out = run(dir.path(), &["export", "tgt", "-o", json.to_str().unwrap(), "--columns", "name"]);
    assert_success(&out);
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(written, serde_json::json!([{ "name": "x" }, { "name": "y" }, { "name": "z" }]));

    assert_success(&run(dir.path(), &["delete", "tgt"]));
    let out = run(dir.path(), &["tables", "--json"]);
    assert_eq!(stdout_json(&out), serde_json::json!([{ "name": "src", "rows": 2, "columns": ["id"] }]));

    let out = run(dir.path(), &["delete", "tgt"]);
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn unsupported_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.md");
    std::fs::write(&path, "# hi\n").unwrap();

    let out = run(dir.path(), &["load", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(7));
    let out = run(dir.path(), &["tables", "--json"]);
    assert_eq!(stdout_json(&out), serde_json::json!([]));
}

#[test]
fn load_succeeds_when_snapshot_cannot_be_saved() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src.csv");
    std::fs::write(&src, "id\n1\n").unwrap();
    std::fs::write(dir.path().join("data"), "in the way").unwrap();

    let out = run(dir.path(), &["load", src.to_str().unwrap()]);
    assert_success(&out);
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to save snapshot"));
}

#[test]
fn malformed_settings_are_reported_and_ignored() {
    let dir = loaded();
    std::fs::write(dir.path().join("settings.json"), "{ not json").unwrap();

    let out = run(dir.path(), &["tables", "--json"]);
    assert_success(&out);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Error parsing"), "stderr: {}", stderr);
    assert!(stderr.contains("using default settings"));
    assert_eq!(stdout_json(&out).as_array().unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn serve_saves_snapshot_on_sigterm() {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;
    use std::process::Stdio;

    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data").join("people.csv"), "id,name\n1,Ann\n").unwrap();

    let mut child = sjoin(dir.path())
        .args(["serve", "--bind", "127.0.0.1:0"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let mut stderr = BufReader::new(child.stderr.take().unwrap());
    let addr = loop {
        let mut line = String::new();
        assert!(stderr.read_line(&mut line).unwrap() > 0, "serve exited early");
        if let Some(addr) = line.trim().strip_prefix("serving tables on ") {
            break addr.to_string();
        }
    };

    let mut stream = TcpStream::connect(&addr).unwrap();
    writeln!(stream, r#"{{"type":"load_file","id":"1","path":"people.csv"}}"#).unwrap();
    let mut reply = String::new();
    BufReader::new(stream.try_clone().unwrap()).read_line(&mut reply).unwrap();
    assert!(reply.contains(r#""type":"loaded""#), "reply: {}", reply);

    let killed = Command::new("kill").args(["-TERM", &child.id().to_string()]).status().unwrap();
    assert!(killed.success());
    let status = child.wait().unwrap();
    assert!(status.success(), "serve exited with {:?}", status);

    let out = run(dir.path(), &["tables", "--json"]);
    assert_eq!(
        stdout_json(&out),
        serde_json::json!([{ "name": "people", "rows": 1, "columns": ["id", "name"] }])
    );
}
