//! Integration tests for zipapps

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn zipapps(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("zipapps");
        cmd.current_dir(dir).env_remove("ZIPAPPS_LOG");
        cmd
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.py"), "def main():\n    print('hi')\n").unwrap();
        dir
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        zipapps(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("zipapps"))
            .stdout(predicate::str::contains("build"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        zipapps(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("zipapps"));
    }

    #[test]
    fn build_with_includes_only() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-a", "app.py", "-m", "app:main", "-o", "app.pyz"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Successfully built"));

        let archive = fs::read(dir.path().join("app.pyz")).unwrap();
        assert!(!archive.starts_with(b"#!"));
        assert!(archive.windows(6).any(|w| w == b"app.py"));
    }

    #[test]
    fn build_writes_shebang() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-a", "app.py", "-p", "/usr/local/bin/zipapps run"])
            .assert()
            .success();

        let archive = fs::read(dir.path().join("app.pyz")).unwrap();
        assert!(archive.starts_with(b"#!/usr/local/bin/zipapps run\n"));
    }

    #[test]
    fn build_rejects_invalid_output_name() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-a", "app.py", "-o", "my-app.pyz"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid output name"));
        assert!(!dir.path().join("my-app.pyz").exists());
    }

    #[test]
    fn build_rejects_pip_target() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-o", "app.pyz", "six", "--target", "/tmp/x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("conflicts"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_fails_on_missing_include() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-a", "nope.py"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("nope.py"));
    }

    #[test]
    fn dump_config_to_stdout_skips_build() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-m", "app:main", "-u", "AUTO", "--dump-config", "-"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""main":"app:main""#))
            .stdout(predicate::str::contains(r#""unzip":"AUTO""#));
        assert!(!dir.path().join("app.pyz").exists());
    }

    #[test]
    fn load_config_with_flag_override() {
        let dir = project();
        fs::write(
            dir.path().join("build.json"),
            r#"{"includes": "app.py", "main": "app:main", "output": "first.pyz"}"#,
        )
        .unwrap();

        zipapps(dir.path())
            .args(["build", "--load-config", "build.json", "-o", "second.pyz"])
            .assert()
            .success();
        assert!(dir.path().join("second.pyz").is_file());
        assert!(!dir.path().join("first.pyz").exists());
    }

    #[test]
    fn unchanged_build_id_skips_rebuild() {
        let dir = project();
        let args = ["build", "-a", "app.py", "-b", "app.py"];
        zipapps(dir.path()).args(args).assert().success();
        zipapps(dir.path())
            .args(args)
            .assert()
            .success()
            .stderr(predicate::str::contains("up to date"));
    }

    #[test]
    fn run_activate_only_extracts_cache() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-a", "app.py", "-u", "*", "-o", "app.pyz"])
            .assert()
            .success();

        zipapps(dir.path())
            .args(["run", "app.pyz", "--activate-zipapps"])
            .assert()
            .success()
            .stdout(predicate::str::contains("zipapps_cache"))
            .stdout(predicate::str::contains("app.pyz"));

        assert!(dir.path().join("zipapps_cache/app/app.py").is_file());
    }

    #[test]
    fn run_missing_archive_fails() {
        let dir = TempDir::new().unwrap();
        zipapps(dir.path())
            .args(["run", "missing.pyz"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing.pyz"));
    }

    #[test]
    fn activate_prints_search_path() {
        let dir = project();
        zipapps(dir.path())
            .args(["build", "-a", "app.py", "-o", "app.pyz"])
            .assert()
            .success();

        zipapps(dir.path())
            .env_remove("PYTHONPATH")
            .args(["activate", "app.pyz"])
            .assert()
            .success()
            .stdout(predicate::str::contains("app.pyz"));
    }
}
