/*
 * cli.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for the tessera command-line interface.
 */

//! Integration tests for the `tessera` binary.
//!
//! Each test builds a scratch site (templates + cache directory) and runs the
//! binary with that directory as its working directory.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

struct Site {
    dir: TempDir,
}

impl Site {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_tessera"))
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .arg("--cache-dir")
            .arg(self.path().join("cache"))
            .args(args)
            .output()
            .expect("Failed to run tessera")
    }
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "tessera failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn test_render_with_data() {
    let site = Site::new(&[
        ("templates/base.html", "<h1>{% block title %}Site{% endblock %}</h1>"),
        (
            "templates/page.html",
            "{% extends \"base\" %}{% block title %}{{ title }}{% endblock %}",
        ),
        ("data.json", r#"{"title": "Fish & Chips"}"#),
    ]);

    let output = site.run(&["render", "page", "--data", "data.json"]);
    assert_eq!(stdout(&output), "<h1>Fish &amp; Chips</h1>");
}

#[test]
fn test_render_to_file() {
    let site = Site::new(&[("templates/hello.html", "Hello {{ name|default:you }}")]);

    let output = site.run(&["render", "hello", "-o", "out.html"]);
    assert_eq!(stdout(&output), "");
    assert_eq!(
        fs::read_to_string(site.path().join("out.html")).unwrap(),
        "Hello you"
    );
}

#[test]
fn test_search_path_flag_overrides_default() {
    let site = Site::new(&[
        ("templates/page.html", "default root"),
        ("other/page.html", "other root"),
    ]);

    let output = site.run(&["-I", "other", "render", "page"]);
    assert_eq!(stdout(&output), "other root");
}

#[test]
fn test_config_file() {
    let site = Site::new(&[
        ("views/page.tpl", "from config"),
        ("tessera.toml", "search-paths = [\"views\"]\nextension = \"tpl\"\n"),
    ]);

    let output = site.run(&["render", "page"]);
    assert_eq!(stdout(&output), "from config");
}

#[test]
fn test_missing_template_fails() {
    let site = Site::new(&[]);

    let output = site.run(&["render", "nope"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Template not found: nope"), "{}", stderr);
}

#[test]
fn test_compile_and_clear() {
    let site = Site::new(&[("templates/page.html", "Hi {{ who }}")]);

    let output = site.run(&["compile", "page"]);
    let artifact = stdout(&output).trim().to_string();
    assert!(Path::new(&artifact).is_file());
    assert!(artifact.contains("page_"));

    let output = site.run(&["compile", "page", "--print"]);
    assert!(stdout(&output).contains("\"op\":\"emit\""));

    let output = site.run(&["clear"]);
    assert_eq!(stdout(&output), "Removed 1 compiled template\n");
    assert!(!Path::new(&artifact).exists());
}

#[test]
fn test_tokens() {
    let site = Site::new(&[("list.html", "{% for xs as x %}{{ x }}{% endfor %}")]);

    let output = site.run(&["tokens", "list.html"]);
    let tree: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(tree.as_array().unwrap().len(), 1);

    let output = site.run(&["tokens", "list.html", "--flat"]);
    let flat: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(flat.as_array().unwrap().len(), 3);
}

#[test]
fn test_tokens_reports_syntax_error() {
    let site = Site::new(&[("bad.html", "{% if x %}never closed")]);

    let output = site.run(&["tokens", "bad.html"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unclosed `if`"), "{}", stderr);
}
