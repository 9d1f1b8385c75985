use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn assist_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("assist");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("timetable.json"),
        r#"[
  {"lecture_title": "Algorithms", "day": "الأحد", "lecture_time": "08:00",
   "instructor": "د. أحمد", "room": "A1", "level": "المستوى الأول", "department": "علوم حاسوب"},
  {"lecture_title": "Databases", "day": "الاثنين", "lecture_time": "10:00",
   "instructor": "د. سارة", "room": "B2", "level": "المستوى الثاني", "department": "تقنية معلومات"},
  {"lecture_title": "Networks", "day": "الأحد", "lecture_time": "12:00",
   "instructor": "د. منى", "room": "C3"}
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/assist.sqlite"

[chat]
response_cache_path = "{root}/data/responses.json"
transcript_path = "{root}/data/transcript.json"

[generation]
provider = "disabled"

[server]
bind = "127.0.0.1:8787"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("assist.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_assist(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = assist_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run assist binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn import_timetable(config_path: &Path) {
    let timetable = config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("timetable.json");
    let (stdout, stderr, success) = run_assist(
        config_path,
        &["lectures", "import", timetable.to_str().unwrap()],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success1) = run_assist(&config_path, &["init"]);
    assert!(success1, "First init failed");
    assert!(stdout.contains("initialized"));

    let (_, _, success2) = run_assist(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_and_list_lectures() {
    let (_tmp, config_path) = setup_test_env();
    run_assist(&config_path, &["init"]);
    import_timetable(&config_path);

    let (stdout, stderr, success) = run_assist(&config_path, &["lectures", "list"]);
    assert!(success, "list failed: {}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("1. Algorithms | الأحد 08:00"));
    assert!(lines[2].starts_with("3. Networks"));

    let (stdout, _, _) = run_assist(&config_path, &["lectures", "list", "--limit", "1"]);
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn test_import_rejects_malformed_file() {
    let (tmp, config_path) = setup_test_env();
    let bad = tmp.path().join("bad.json");
    fs::write(&bad, "{ not an array").unwrap();

    let (_, stderr, success) =
        run_assist(&config_path, &["lectures", "import", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Failed to parse lectures file"));
}

#[test]
fn test_clear_lectures() {
    let (_tmp, config_path) = setup_test_env();
    import_timetable(&config_path);

    let (stdout, _, success) = run_assist(&config_path, &["lectures", "clear"]);
    assert!(success);
    assert!(stdout.contains("removed 3 lectures"));

    let (stdout, _, _) = run_assist(&config_path, &["lectures", "list"]);
    assert!(stdout.contains("No lectures stored."));
}

#[test]
fn test_ask_falls_back_to_listing_when_generation_disabled() {
    let (_tmp, config_path) = setup_test_env();
    import_timetable(&config_path);

    let (stdout, stderr, success) = run_assist(&config_path, &["ask", "محاضرات الأحد"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.starts_with("مرحباً! 👋"));
    assert!(stdout.contains("**المحاضرات المتاحة:**"));
    assert!(stdout.contains("1. **Algorithms** 📚"));
    assert!(stdout.contains("2. **Networks** 📚"));
    assert!(stdout.contains("   - 🏫 القسم: علوم حاسوب"));
    assert!(!stdout.contains("Databases"));
    assert!(stderr.contains("[source: fallback]"));
}

#[test]
fn test_ask_without_matches_explains() {
    let (_tmp, config_path) = setup_test_env();
    import_timetable(&config_path);

    let (stdout, stderr, success) = run_assist(&config_path, &["ask", "محاضرات الجمعة"]);
    assert!(success);
    assert!(stdout.contains("غير مفعّل"));
    assert!(stderr.contains("[source: error]"));
}

#[test]
fn test_fallback_answers_are_not_cached() {
    let (_tmp, config_path) = setup_test_env();
    import_timetable(&config_path);

    run_assist(&config_path, &["ask", "محاضرات الأحد"]);
    let (stdout, _, success) = run_assist(&config_path, &["cache", "stats"]);
    assert!(success);
    assert!(stdout.contains("entries: 0"));
}

#[test]
fn test_history_records_and_clears() {
    let (_tmp, config_path) = setup_test_env();
    import_timetable(&config_path);

    let (stdout, _, _) = run_assist(&config_path, &["history"]);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("assistant: مرحباً! أنا مساعدك الذكي"));

    run_assist(&config_path, &["ask", "محاضرات الأحد"]);
    let (stdout, _, _) = run_assist(&config_path, &["history"]);
    assert!(stdout.contains("you: محاضرات الأحد"));

    let (stdout, _, success) = run_assist(&config_path, &["history", "--clear"]);
    assert!(success);
    assert!(stdout.contains("Transcript cleared."));
    let (stdout, _, _) = run_assist(&config_path, &["history"]);
    assert!(!stdout.contains("you:"));
}

#[test]
fn test_docs_require_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_assist(&config_path, &["docs", "add", "ساعات المكتبة"]);
    assert!(!success);
    assert!(stderr.contains("Embedding provider is disabled"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(
        &bad,
        r#"[db]
path = "x.sqlite"

[generation]
provider = "mystery"

[server]
bind = "127.0.0.1:8787"
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_assist(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown generation provider"));
}
