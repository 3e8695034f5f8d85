//! End-to-end target builds on projects laid out on disk

use kiln_build::{BuildError, TargetBuilder, Variant};
use kiln_config::ConfigLoader;
use kiln_package::ResolveProblem;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Create a project with a kiln.toml and the given files
fn create_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("kiln.toml"),
        "[project]\nname = \"test-firmware\"\n",
    )
    .unwrap();

    for (rel, contents) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

const TARGET: &str = r#"
pkg.name = "targets/t"
pkg.type = "target"
pkg.deps = ["apps/a", "libs/b"]
pkg.cflags = ["-DTARGET"]
"#;

const APP_A: &str = r#"
pkg.name = "apps/a"
pkg.type = "app"
pkg.apis = ["log"]
pkg.init = { a_init = 10 }
pkg.cflags = ["-DA", "-Wall"]
"#;

const LIB_B: &str = r#"
pkg.name = "libs/b"
pkg.req_apis = ["log"]
pkg.init = { b_init = 20 }
pkg.cflags = ["-Wall", "-DB"]
pkg.lflags = ["-lm"]
"#;

fn log_project() -> TempDir {
    create_project(&[
        ("targets/t/pkg.toml", TARGET),
        ("apps/a/pkg.toml", APP_A),
        ("libs/b/pkg.toml", LIB_B),
        ("libs/b/src/b.c", "void b_init(void) {}\n"),
    ])
}

fn builder(root: &Path, target: &str) -> TargetBuilder {
    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(root)
        .unwrap();
    TargetBuilder::from_config(&config, target).unwrap()
}

#[test]
fn test_sysinit_scenario() {
    let project = log_project();
    let builder = builder(project.path(), "targets/t");

    let (path, changed) = builder.write_sysinit(Variant::App).unwrap();
    assert!(changed);
    assert_eq!(path, project.path().join("bin/generated/t-sysinit-app.c"));

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("#if !SPLIT_LOADER\n\nvoid a_init(void);\nvoid b_init(void);\n"));
    let a = text.find("    a_init();").unwrap();
    let b = text.find("    b_init();").unwrap();
    assert!(a < b);
    assert!(text.contains("    /* 10.0: apps/a */\n"));
    assert!(text.contains("    /* 20.0: libs/b */\n"));
}

#[test]
fn test_sysinit_rewrite_is_noop() {
    let project = log_project();
    let builder = builder(project.path(), "targets/t");

    let (path, first) = builder.write_sysinit(Variant::Loader).unwrap();
    let modified = fs::metadata(&path).unwrap().modified().unwrap();
    let (_, second) = builder.write_sysinit(Variant::Loader).unwrap();

    assert!(first);
    assert!(!second);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_outputs_are_deterministic() {
    let project = log_project();
    let first = builder(project.path(), "targets/t");
    let second = builder(project.path(), "targets/t");

    let res_one = first.resolve().unwrap();
    let res_two = second.resolve().unwrap();
    assert_eq!(
        kiln_build::generate(&res_one, Variant::App).unwrap(),
        kiln_build::generate(&res_two, Variant::App).unwrap()
    );
    assert_eq!(
        first.dep_graph::<&str>(&[]).unwrap().0.render(),
        second.dep_graph::<&str>(&[]).unwrap().0.render()
    );
    assert_eq!(first.cfg_text().unwrap(), second.cfg_text().unwrap());
}

#[test]
fn test_missing_capability_blocks_downstream_stages() {
    let project = create_project(&[
        (
            "targets/radio/pkg.toml",
            "pkg.name = \"targets/radio\"\npkg.type = \"target\"\npkg.deps = [\"libs/c\"]\n",
        ),
        (
            "libs/c/pkg.toml",
            "pkg.name = \"libs/c\"\npkg.req_apis = [\"radio\"]\npkg.init = { c_init = 1 }\n",
        ),
    ]);
    let builder = builder(project.path(), "targets/radio");

    match builder.resolve() {
        Err(BuildError::Resolve(failure)) => assert_eq!(
            failure.problems,
            vec![ResolveProblem::UnresolvedApi {
                requester: "libs/c".to_string(),
                api: "radio".to_string(),
            }]
        ),
        other => panic!("expected a resolve failure, got {:?}", other.map(|r| r.len())),
    }

    assert!(matches!(builder.cfg(), Err(BuildError::Resolve(_))));
    assert!(matches!(
        builder.write_sysinit(Variant::App),
        Err(BuildError::Resolve(_))
    ));
    assert!(!project.path().join("bin/generated").exists());
}

#[test]
fn test_dep_graph_filter_reports_missing() {
    let project = log_project();
    let builder = builder(project.path(), "targets/t");

    let (graph, missing) = builder.dep_graph(&["libs/b", "libs/nope"]).unwrap();
    assert_eq!(missing, vec!["libs/nope"]);
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.get("libs/b").unwrap(), ["apps/a"]);

    let (revdeps, missing) = builder.revdep_graph(&["apps/a"]).unwrap();
    assert!(missing.is_empty());
    assert_eq!(revdeps.get("apps/a").unwrap(), ["libs/b", "targets/t"]);
}

#[test]
fn test_full_dep_graph_render() {
    let project = log_project();
    let builder = builder(project.path(), "targets/t");

    let (graph, _) = builder.dep_graph::<&str>(&[]).unwrap();
    insta::assert_snapshot!(graph.render(), @r###"
    Dependency graph (depender --> [dependees]):
        apps/a -> []
        libs/b -> [apps/a]
        targets/t -> [apps/a, libs/b]
    "###);
}

#[test]
fn test_build_flags_follow_dependency_order() {
    let project = log_project();
    let flags = builder(project.path(), "targets/t").build_flags().unwrap();

    assert_eq!(flags.cflags(), ["-DA", "-Wall", "-DB", "-DTARGET"]);
    assert_eq!(flags.lflags(), ["-lm"]);
    assert!(flags.aflags().is_empty());
}

#[test]
fn test_target_vars_select_app() {
    let project = create_project(&[
        (
            "targets/blinky/pkg.toml",
            "pkg.name = \"targets/blinky\"\npkg.type = \"target\"\n\ntarget.app = \"apps/a\"\n",
        ),
        ("apps/a/pkg.toml", APP_A),
        ("libs/b/pkg.toml", LIB_B),
    ]);
    let builder = builder(project.path(), "targets/blinky");

    let res = builder.resolve().unwrap();
    assert!(res.contains("apps/a"));
    assert!(!res.contains("libs/b"));
    assert_eq!(builder.show_text(), "targets/blinky\n    app=apps/a\n");
}

#[test]
fn test_custom_generated_dir() {
    let project = log_project();
    fs::write(
        project.path().join("kiln.toml"),
        "[project]\nname = \"fw\"\n\n[build]\ngenerated_dir = \"out/src\"\n",
    )
    .unwrap();

    let (path, _) = builder(project.path(), "targets/t")
        .write_sysinit(Variant::App)
        .unwrap();
    assert_eq!(path, project.path().join("out/src/t-sysinit-app.c"));
}

#[test]
fn test_unknown_target() {
    let project = log_project();
    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(project.path())
        .unwrap();

    assert!(matches!(
        TargetBuilder::from_config(&config, "targets/missing"),
        Err(BuildError::TargetNotFound { .. })
    ));
}

#[test]
fn test_package_hashes_track_content() {
    let project = log_project();
    let before = builder(project.path(), "targets/t").package_hashes().unwrap();

    fs::write(project.path().join("libs/b/src/b.c"), "void b_init(void) { }\n").unwrap();
    let after = builder(project.path(), "targets/t").package_hashes().unwrap();

    assert_eq!(before["apps/a"], after["apps/a"]);
    assert_ne!(before["libs/b"], after["libs/b"]);
}

fn split_project() -> TempDir {
    create_project(&[
        (
            "targets/s/pkg.toml",
            "pkg.name = \"targets/s\"\npkg.type = \"target\"\n\n\
             target.app = \"apps/a\"\ntarget.loader = \"apps/boot\"\n",
        ),
        (
            "apps/a/pkg.toml",
            "pkg.name = \"apps/a\"\npkg.type = \"app\"\npkg.init = { a_init = 10 }\n",
        ),
        (
            "apps/a/syscfg.toml",
            "[syscfg.defs.APP_X]\ndescription = \"App setting\"\nvalue = 1\n",
        ),
        (
            "apps/boot/pkg.toml",
            "pkg.name = \"apps/boot\"\npkg.type = \"app\"\npkg.init = { boot_init = 5 }\n",
        ),
        (
            "apps/boot/syscfg.toml",
            "[syscfg.defs.BOOT_Y]\ndescription = \"Loader setting\"\nvalue = 0\n",
        ),
    ])
}

#[test]
fn test_split_target_covers_both_images() {
    let project = split_project();
    let builder = builder(project.path(), "targets/s");

    let res = builder.resolve().unwrap();
    assert_eq!(res.order(), ["apps/a", "apps/boot", "targets/s"]);

    let cfg = builder.cfg().unwrap();
    assert_eq!(cfg.value("APP_X"), Some("1"));
    assert_eq!(cfg.value("BOOT_Y"), Some("0"));

    let (graph, _) = builder.dep_graph::<&str>(&[]).unwrap();
    assert_eq!(graph.get("targets/s").unwrap(), ["apps/a", "apps/boot"]);
}

#[test]
fn test_split_target_sysinit_per_image() {
    let project = split_project();
    let builder = builder(project.path(), "targets/s");

    let (loader, _) = builder.write_sysinit(Variant::Loader).unwrap();
    let loader = fs::read_to_string(loader).unwrap();
    assert!(loader.contains("    boot_init();"));
    assert!(!loader.contains("a_init"));

    let (app, _) = builder.write_sysinit(Variant::App).unwrap();
    let app = fs::read_to_string(app).unwrap();
    assert!(app.contains("    a_init();"));
    assert!(!app.contains("boot_init"));
}

#[test]
fn test_write_cfg_pins_effective_values() {
    let project = split_project();
    let before = builder(project.path(), "targets/s").cfg().unwrap().values();

    let path = builder(project.path(), "targets/s").write_cfg().unwrap();
    assert_eq!(path, project.path().join("targets/s/syscfg.toml"));

    let target = kiln_package::Package::load(project.path().join("targets/s")).unwrap();
    assert_eq!(target.syscfg_vals(), &before);

    let after = builder(project.path(), "targets/s").cfg().unwrap();
    assert_eq!(after.values(), before);
    assert!(!after.has_conflicts());
    assert_eq!(after.get("APP_X").unwrap().history().len(), 2);
}

#[test]
fn test_write_cfg_refuses_conflicts() {
    let project = create_project(&[
        (
            "targets/c/pkg.toml",
            "pkg.name = \"targets/c\"\npkg.type = \"target\"\npkg.deps = [\"apps/x\", \"apps/y\"]\n",
        ),
        ("apps/x/pkg.toml", "pkg.name = \"apps/x\"\npkg.type = \"app\"\n"),
        ("apps/x/syscfg.toml", "[syscfg.vals]\nLEVEL = \"1\"\n"),
        ("apps/y/pkg.toml", "pkg.name = \"apps/y\"\npkg.type = \"app\"\n"),
        ("apps/y/syscfg.toml", "[syscfg.vals]\nLEVEL = \"2\"\n"),
    ]);

    assert!(matches!(
        builder(project.path(), "targets/c").write_cfg(),
        Err(BuildError::CfgConflicts { .. })
    ));
    assert!(!project.path().join("targets/c/syscfg.toml").exists());
}
