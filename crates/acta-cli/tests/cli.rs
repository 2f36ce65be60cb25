//! Integration tests for the `acta` binary.

#![allow(deprecated)] // cargo_bin deprecation, replacement not yet stable

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use rusqlite::{Connection, params};
use tempfile::TempDir;

const ROWS: &str = "\
CodigoMesa,Partido1,Partido2,Partido3,Partido4,Blancos,Validos,CantidadAnfora,PapeletasNoUsadas,Nulos
01234,100,50,20,10,5,185,200,50,15
05678,100,50,20,10,5,184,200,50,[NO ENCONTRADO]
";

fn acta() -> Command {
    Command::cargo_bin("acta").expect("binary 'acta' should be built")
}

/// A workspace with an empty config file, so the user's own config is never read.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{}").unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn command(&self) -> Command {
        let mut cmd = acta();
        cmd.arg("--config").arg(self.path("config.json"));
        cmd
    }

    fn rows(&self) -> PathBuf {
        let path = self.path("sheets.csv");
        fs::write(&path, ROWS).unwrap();
        path
    }

    fn registry(&self) -> PathBuf {
        let path = self.path("acta.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE precincts (id INTEGER PRIMARY KEY AUTOINCREMENT, status TEXT NOT NULL DEFAULT 'Inactive');
             CREATE TABLE polling_tables (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 code TEXT NOT NULL UNIQUE,
                 capacity INTEGER NOT NULL,
                 precinct_id INTEGER REFERENCES precincts(id)
             );
             INSERT INTO precincts (status) VALUES ('Inactive');",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO polling_tables (code, capacity, precinct_id) VALUES (?1, ?2, 1)",
            params!["01234", 250],
        )
        .unwrap();
        path
    }
}

fn stored_statuses(db: &Path) -> Vec<String> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn.prepare("SELECT status FROM tally_sheets ORDER BY id").unwrap();
    let statuses = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap();
    statuses
}

#[test]
fn help_lists_commands() {
    acta()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: acta"))
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn version_flag_shows_semver() {
    acta()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^acta \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn config_path_names_file() {
    acta()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.json"));
}

#[test]
fn process_missing_file_fails() {
    let ws = Workspace::new();
    ws.command()
        .arg("process")
        .arg(ws.path("nope.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn process_rejects_non_pdf() {
    let ws = Workspace::new();
    let input = ws.rows();
    ws.command()
        .arg("process")
        .arg(input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file format"));
}

#[test]
fn batch_on_empty_folder_fails() {
    let ws = Workspace::new();
    ws.command()
        .arg("batch")
        .arg(ws.dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No PDF files found"));
}

#[test]
fn ingest_without_database_reports_capacity_unavailable() {
    let ws = Workspace::new();
    ws.command()
        .arg("ingest")
        .arg(ws.rows())
        .assert()
        .success()
        .stdout(predicate::str::contains("Tally sheet: sheets.csv#1"))
        .stdout(predicate::str::contains("Capacity unavailable for table code 01234"))
        .stdout(predicate::str::contains("votosNulos was not read correctly"));
}

#[test]
fn ingest_persist_needs_database() {
    let ws = Workspace::new();
    ws.command()
        .arg("ingest")
        .arg(ws.rows())
        .arg("--persist")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--persist needs a database"));
}

#[test]
fn ingest_checks_against_registry_and_persists() {
    let ws = Workspace::new();
    let db = ws.registry();

    ws.command()
        .arg("ingest")
        .arg(ws.rows())
        .arg("--database")
        .arg(&db)
        .arg("--persist")
        .assert()
        .success()
        .stdout(predicate::str::contains("Observations: none"))
        .stdout(predicate::str::contains("Stored sheets.csv#1"))
        .stderr(predicate::str::contains("no polling table registered for code 05678"));

    assert_eq!(stored_statuses(&db), vec!["V".to_string()]);

    let conn = Connection::open(&db).unwrap();
    let status: String = conn
        .query_row("SELECT status FROM precincts WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(status, "Active");
}

#[test]
fn ingest_json_output_is_an_array() {
    let ws = Workspace::new();
    let output = ws
        .command()
        .args(["ingest", "--format", "json"])
        .arg(ws.rows())
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["source"], "sheets.csv#1");
    assert_eq!(rows[0]["fields"]["MAS"]["value"], 100);
}
