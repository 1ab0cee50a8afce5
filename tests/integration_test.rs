use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

// Use atomic counter to give each test a unique port
static PORT_COUNTER: AtomicU16 = AtomicU16::new(9480);

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Features {
    #[serde(rename = "type")]
    kind: String,
    brand: String,
    model: String,
    year: String,
    extra: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Record {
    id: String,
    plate: String,
    segment: String,
    notes: String,
    tags: Vec<String>,
    features: Features,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct InfoResponse {
    version: String,
    engines: Vec<String>,
    engines_ready: bool,
    ocr_language: String,
    max_pdf_pages: usize,
    max_file_size_bytes: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ErrorResponse {
    error: String,
    code: String,
}

fn ledger(data_dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_plate-ledger"));
    command
        .env("PLATE_LEDGER_DATA_DIR", data_dir)
        .env_remove("PLATE_LEDGER_PROXY_URL")
        .env("RUST_LOG", "warn");
    command
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    ledger(data_dir)
        .args(args)
        .output()
        .expect("Failed to run plate-ledger")
}

fn run_with_stdin(data_dir: &Path, args: &[&str], input: &str) -> Output {
    let mut child = ledger(data_dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to run plate-ledger");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn list_json(data_dir: &Path, args: &[&str]) -> Vec<Record> {
    let mut full = vec!["list", "--json"];
    full.extend_from_slice(args);
    let output = run(data_dir, &full);
    assert!(output.status.success(), "{:?}", output);
    serde_json::from_slice(&output.stdout).expect("list --json should print records")
}

#[test]
fn test_add_list_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();

    let output = run(
        dir.path(),
        &[
            "add",
            "ab-12 34",
            "--segment",
            "Autos de remates",
            "--tags",
            "urgente, rojo ,,",
            "--feature",
            "marca=Toyota",
            "--feature",
            "Permiso=Pagado",
            "--notes",
            "  llamar lunes  ",
        ],
    );
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("Saved AB1234"));

    let records = list_json(dir.path(), &[]);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.plate, "AB1234");
    assert_eq!(record.segment, "Autos de remates");
    assert_eq!(record.notes, "llamar lunes");
    assert_eq!(record.tags, vec!["urgente", "rojo"]);
    assert_eq!(record.features.brand, "Toyota");
    assert_eq!(record.features.extra, "Permiso: Pagado");

    assert!(dir.path().join("plate-records.json").exists());

    let table = stdout(&run(dir.path(), &["list"]));
    assert!(table
        .contains("AB1234 | Autos de remates | Marca: Toyota | llamar lunes | urgente, rojo"));

    let output = run(dir.path(), &["delete", &record.id]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Deleted"));
    assert!(list_json(dir.path(), &[]).is_empty());

    // Deleting again is a no-op, not an error
    let output = run(dir.path(), &["delete", &record.id]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No record"));
}

#[test]
fn test_add_without_segment_uses_first_suggestion() {
    let dir = tempfile::tempdir().unwrap();
    assert!(run(dir.path(), &["add", "GHJK55"]).status.success());
    assert!(run(dir.path(), &["add", "XY9876", "--segment", "  "]).status.success());

    let records = list_json(dir.path(), &["--segment", "Autos para comprar"]);
    let plates: Vec<&str> = records.iter().map(|r| r.plate.as_str()).collect();
    assert_eq!(plates, vec!["XY9876", "GHJK55"]);
    assert!(records.iter().all(|r| r.segment == "Autos para comprar"));
}

#[test]
fn test_list_filters_by_plate_and_segment() {
    let dir = tempfile::tempdir().unwrap();
    for (plate, segment) in [
        ("AB1234", "Otro"),
        ("ZZ1234", "Camiones mineros"),
        ("AB9999", "Camiones mineros"),
    ] {
        assert!(run(dir.path(), &["add", plate, "--segment", segment]).status.success());
    }

    let plates = |args: &[&str]| -> Vec<String> {
        list_json(dir.path(), args)
            .into_iter()
            .map(|r| r.plate)
            .collect()
    };

    assert_eq!(plates(&[]), vec!["AB9999", "ZZ1234", "AB1234"]);
    assert_eq!(plates(&["--plate", "ab"]), vec!["AB9999", "AB1234"]);
    assert_eq!(
        plates(&["--plate", "1234", "--segment", "Camiones mineros"]),
        vec!["ZZ1234"]
    );
    assert!(plates(&["--segment", "Sin segmento"]).is_empty());

    let empty = stdout(&run(dir.path(), &["list", "--segment", "Sin segmento"]));
    assert!(empty.contains("No saved plates yet."));
}

#[test]
fn test_add_without_plate_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["add", " - ", "--segment", "Otro"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("A plate is required"));
    assert!(!dir.path().join("plate-records.json").exists());
}

#[test]
fn test_add_fills_fields_from_pasted_text() {
    let dir = tempfile::tempdir().unwrap();
    let pasted = "Información vehicular\nPatente: GHJK55\nMarca: Hyundai\nModelo: Accent\nAño: 2012\nKilometraje: 150000";

    let output = run_with_stdin(
        dir.path(),
        &["add", "--text", "-", "--feature", "modelo=Accent RB"],
        pasted,
    );
    assert!(output.status.success(), "{:?}", output);

    let records = list_json(dir.path(), &[]);
    let record = &records[0];
    assert_eq!(record.plate, "GHJK55");
    assert_eq!(record.features.brand, "Hyundai");
    assert_eq!(record.features.model, "Accent RB");
    assert_eq!(record.features.year, "2012");
    assert_eq!(record.features.extra, "Kilometraje: 150000");
}

#[test]
fn test_extract_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_with_stdin(
        dir.path(),
        &["extract"],
        "PPU BBCC-10\nMARCA     KIA\nColor: Blanco",
    );
    assert!(output.status.success(), "{:?}", output);
    let text = stdout(&output);
    assert!(text.contains("Patente: BBCC10"));
    assert!(text.contains("Marca: KIA"));
    assert!(text.contains("Color: Blanco"));
}

#[test]
fn test_segments_include_defaults_and_history() {
    let dir = tempfile::tempdir().unwrap();
    assert!(run(dir.path(), &["add", "AB1234", "--segment", "Flota municipal"])
        .status
        .success());

    let lines: Vec<String> = stdout(&run(dir.path(), &["segments"]))
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines.first().map(String::as_str), Some("Autos para comprar"));
    assert_eq!(lines.last().map(String::as_str), Some("Flota municipal"));
    assert_eq!(lines.iter().filter(|l| *l == "Otro").count(), 1);
}

#[test]
fn test_corrupted_store_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plate-records.json"), "{ not json").unwrap();

    let output = run(dir.path(), &["list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No saved plates yet."));

    assert!(run(dir.path(), &["add", "AB1234"]).status.success());
    assert_eq!(list_json(dir.path(), &[]).len(), 1);
}

#[test]
fn test_legacy_records_are_migrated_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = r#"[
        {"plate": "ab 1234", "segment": "Otro", "notes": "", "tags": "a, b",
         "features": {"vehicle": "Yaris", "brand": "Toyota", "kms": 12000},
         "timestamp": 10},
        {"segment": "Otro"},
        "garbage"
    ]"#;
    std::fs::write(dir.path().join("plate-records.json"), legacy).unwrap();

    let records = list_json(dir.path(), &[]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].plate, "AB1234");
    assert_eq!(records[0].tags, vec!["a", "b"]);
    assert_eq!(records[0].features.model, "Yaris");
    assert_eq!(records[0].features.extra, "Kilometraje: 12000");
    assert!(!records[0].id.is_empty());
}

#[test]
fn test_lookup_blank_plate_fails_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["lookup", " "]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Enter a plate"));
}

struct TestServer {
    child: Child,
    port: u16,
    _data_dir: tempfile::TempDir,
}

impl TestServer {
    fn start() -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let data_dir = tempfile::tempdir().unwrap();

        let child = ledger(data_dir.path())
            .args(["serve", "--host", "127.0.0.1", "--port", &port.to_string()])
            .spawn()
            .expect("Failed to start server");

        // Wait for server to be ready
        std::thread::sleep(Duration::from_secs(2));

        Self {
            child,
            port,
            _data_dir: data_dir,
        }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let response: HealthResponse = client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(response.status, "ok");
    assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_info_endpoint() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let info: InfoResponse = client
        .get(format!("{}/info", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(info.max_pdf_pages, 3);
    assert_eq!(info.ocr_language, "spa");
    assert!(!info.engines_ready);
}

#[tokio::test]
async fn test_proxy_requires_plate() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/proxy", server.base_url()))
        .header("Origin", "http://localhost:8000")
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_capture_requires_file() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("preset", "none");
    let response = client
        .post(format!("{}/api/capture", server.base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.code, "MISSING_FILE");
}
