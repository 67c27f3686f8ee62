mod common;

use common::{project, snapshot, write, Entry};
use std::{fs, path::PathBuf};
use stratum::{build::TemplateError, Project, StratumError};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|id| id.to_string()).collect()
}

#[test]
fn builds_every_template_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    let report = Project::open(dir.path()).unwrap().build(&[], 1).unwrap();

    let order: Vec<_> = report.results.iter().map(|r| r.template_id.as_str()).collect();
    assert_eq!(order, vec!["r-small", "broken", "clash", "python-small"]);

    assert!(report.get("r-small").unwrap().is_success());
    assert!(report.get("python-small").unwrap().is_success());

    let broken = report.get("broken").unwrap();
    assert!(matches!(broken.error(), Some(TemplateError::Render(_))));
    assert!(!dir.path().join("out/broken").exists());

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);
}

#[test]
fn conflicting_blocks_fail_the_template_without_output() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    let report = Project::open(dir.path()).unwrap().build(&[], 1).unwrap();

    let Some(TemplateError::Conflict(conflict)) = report.get("clash").unwrap().error() else {
        panic!("clash should fail with a composition conflict");
    };
    assert_eq!(conflict.path, PathBuf::from("README.md"));
    assert_eq!(conflict.first, "base");
    assert_eq!(conflict.second, "docs");

    assert!(!dir.path().join("out/clash").exists());
    assert!(dir.path().join("out/r-small/README.md").exists());
}

#[test]
fn writes_rendered_files_links_and_shared_files() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    let project = Project::open(dir.path()).unwrap();
    let report = project.build(&ids(&["r-small"]), 1).unwrap();
    let out = dir.path().join("out/r-small");

    assert_eq!(
        report.get("r-small").unwrap().files(),
        &[
            PathBuf::from(".gitignore"),
            PathBuf::from("LICENSE"),
            PathBuf::from("README.md"),
            PathBuf::from("assets"),
            PathBuf::from("main.R"),
            PathBuf::from("scripts/setup.sh"),
        ]
    );

    assert_eq!(
        fs::read_to_string(out.join("README.md")).unwrap(),
        "# r-small (2026-q1)\n\nWelcome to RECAP.\n"
    );
    assert_eq!(
        fs::read_to_string(out.join("main.R")).unwrap(),
        "# maintained by recap\nprint(\"r\")\n"
    );
    assert_eq!(fs::read_to_string(out.join("LICENSE")).unwrap(), "MIT\n");
    assert_eq!(fs::read_to_string(out.join(".gitignore")).unwrap(), "out/\n");

    let link = fs::symlink_metadata(out.join("assets")).unwrap();
    assert!(link.file_type().is_symlink());
    assert_eq!(fs::read_link(out.join("assets")).unwrap(), PathBuf::from("../../assets"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = fs::metadata(out.join("scripts/setup.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}

#[test]
fn rebuilding_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let project = Project::open(dir.path()).unwrap();
    let out = dir.path().join("out");

    project.build(&[], 1).unwrap();
    let first = snapshot(&out);

    // stale files from earlier builds must not survive
    write(&out, "r-small/stale.txt", "left over");

    project.build(&[], 1).unwrap();
    let second = snapshot(&out);

    assert_eq!(first, second);
}

#[test]
fn parallel_build_matches_sequential_build() {
    let sequential = tempfile::tempdir().unwrap();
    project(sequential.path());
    let sequential_report = Project::open(sequential.path()).unwrap().build(&[], 1).unwrap();

    let parallel = tempfile::tempdir().unwrap();
    project(parallel.path());
    let parallel_report = Project::open(parallel.path()).unwrap().build(&[], 4).unwrap();

    let order = |report: &stratum::report::BuildReport| {
        report
            .results
            .iter()
            .map(|r| (r.template_id.clone(), r.is_success()))
            .collect::<Vec<_>>()
    };
    assert_eq!(order(&sequential_report), order(&parallel_report));
    assert_eq!(
        snapshot(&sequential.path().join("out")),
        snapshot(&parallel.path().join("out"))
    );
}

#[test]
fn changing_an_atom_changes_bytes_not_paths() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let out = dir.path().join("out/r-small");

    Project::open(dir.path()).unwrap().build(&ids(&["r-small"]), 1).unwrap();
    let before = snapshot(&out);

    write(dir.path(), "src/atoms/intro/intro.md", "A different welcome.");
    Project::open(dir.path()).unwrap().build(&ids(&["r-small"]), 1).unwrap();
    let after = snapshot(&out);

    let paths = |entries: &[(PathBuf, Entry)]| entries.iter().map(|(p, _)| p.clone()).collect::<Vec<_>>();
    assert_eq!(paths(&before), paths(&after));
    assert_ne!(before, after);
}

#[test]
fn failed_template_removes_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    write(dir.path(), "out/clash/README.md", "from an older, successful build");

    Project::open(dir.path()).unwrap().build(&ids(&["clash"]), 1).unwrap();

    assert!(!dir.path().join("out/clash").exists());
}

#[test]
fn manifest_errors_abort_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    write(
        dir.path(),
        "templates.toml",
        r#"
[[templates]]
id = "julia"
size = "small"
language = "julia"
setup = "s"
run = "r"
blocks = ["base", "julia"]
"#,
    );

    let error = Project::open(dir.path()).unwrap_err();

    assert!(matches!(error, StratumError::Manifest(_)));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn malformed_atom_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    write(dir.path(), "src/atoms/broken.json", "{ not json");

    let error = Project::open(dir.path()).unwrap_err();

    assert!(matches!(error, StratumError::Atom(_)));
}

#[test]
fn unknown_template_selection_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    let error = Project::open(dir.path())
        .unwrap()
        .build(&ids(&["nope"]), 1)
        .unwrap_err();

    assert!(matches!(error, StratumError::UnknownTemplate { ref id } if id == "nope"));
}

#[test]
fn plan_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    let tree = Project::open(dir.path()).unwrap().plan("python-small").unwrap();

    assert!(tree.contains("main.py"));
    assert!(tree.contains("assets"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn jinja_blocks_include_atoms_without_stray_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    write(
        dir.path(),
        "src/blocks/python/WELCOME.md.j2",
        "{% include \"atoms/intro/intro.md\" %}\n{% if language == \"python\" %}\nRun: {{ run }}\n{% endif %}\n",
    );

    let report = Project::open(dir.path())
        .unwrap()
        .build(&ids(&["python-small"]), 1)
        .unwrap();

    assert!(report.get("python-small").unwrap().is_success());
    assert_eq!(
        fs::read_to_string(dir.path().join("out/python-small/WELCOME.md")).unwrap(),
        "Welcome to RECAP.Run: python main.py\n"
    );
}
