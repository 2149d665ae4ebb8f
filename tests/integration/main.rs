//! Integration tests for Arbor
//!
//! These exercise the model and the graph engine together through the
//! `Project` facade.

mod properties;

use std::io::Write;
use std::sync::Arc;

use arbor::model::{DependencyTarget, LibraryOwner, SdkRef};
use arbor::{DependencyScope, LibraryTableId, ModelError, OrderRootType, Project, RegistryConfig};
use insta::assert_snapshot;

fn module_names(project: &Project, ids: &[arbor::ModuleId]) -> String {
    let state = project.registry().current();
    ids.iter()
        .filter_map(|id| state.module(*id))
        .map(|m| m.name.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

/// web -> service -> persistence, plus a shared library and an SDK.
fn layered_project() -> Project {
    let project = Project::default();
    project
        .commit_with_retry(1, |snapshot| {
            for name in ["web", "service", "persistence"] {
                snapshot.create_module(name)?;
            }
            let jdk = snapshot.create_sdk("jdk-21", "JavaSDK");
            snapshot.sdk_mut(jdk)?.roots.insert(OrderRootType::CLASSES, vec!["jrt://jdk-21".to_string()]);
            snapshot.set_project_sdk(Some("jdk-21"));

            let slf4j = snapshot.create_library(LibraryOwner::Table(LibraryTableId::Project), Some("slf4j"))?;
            snapshot
                .library_editor(slf4j)?
                .add_root("jar:///slf4j.jar!/", OrderRootType::CLASSES)?;

            for (module, dependency) in [("web", "service"), ("service", "persistence")] {
                let id = snapshot.find_module(module).unwrap().id;
                let mut root = snapshot.root_model(id)?;
                root.set_sdk(Some(SdkRef::Inherited))?;
                root.set_output_url(Some(format!("file:///out/{module}").as_str()))?;
                root.add_order_entry(DependencyTarget::module(dependency), DependencyScope::Compile, true)?;
                root.add_library_dependency(LibraryTableId::Project, "slf4j", DependencyScope::Compile)?;
            }
            let persistence = snapshot.find_module("persistence").unwrap().id;
            snapshot.root_model(persistence)?.set_output_url(Some("file:///out/persistence"))?;
            Ok(())
        })
        .unwrap();
    project
}

#[test]
fn test_layered_project_classpath() {
    let project = layered_project();
    let web = project.registry().current().find_module("web").unwrap().id;

    let sorted = project.graph().sorted_modules().unwrap();
    assert_snapshot!(module_names(&project, &sorted), @"persistence, service, web");

    let roots = project.graph().order_entries(web).unwrap().recursively().class_roots();
    assert_snapshot!(roots.join("\n"), @r"
    file:///out/web
    jrt://jdk-21
    file:///out/service
    file:///out/persistence
    jar:///slf4j.jar!/
    ");
}

#[test]
fn test_readers_keep_their_generation() {
    let project = layered_project();
    let before = project.registry().current();
    let web = before.find_module("web").unwrap().id;

    project
        .commit_with_retry(1, |snapshot| {
            snapshot.rename_module(web, "frontend")?;
            snapshot.create_module("api")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(before.module(web).unwrap().name, "web");
    assert_eq!(before.module_count(), 3);
    let after = project.registry().current();
    assert_eq!(after.module(web).unwrap().name, "frontend");
    assert_eq!(after.module_count(), 4);

    // the dependency on "service" survives the rename
    let graph = project.graph().module_graph(true).unwrap();
    let service = after.find_module("service").unwrap().id;
    assert_eq!(graph.get_out(service), vec![web]);
}

#[test]
fn test_renamed_dependency_target_leaves_entry_dangling() {
    let project = layered_project();
    let service = project.registry().current().find_module("service").unwrap().id;

    project
        .commit_with_retry(1, |snapshot| snapshot.rename_module(service, "domain"))
        .unwrap();

    let state = project.registry().current();
    let dangling = state.dangling_references();
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].entry.presentable_name(), "service");
    assert_eq!(project.graph().module_graph(true).unwrap().edge_count(), 1);
}

#[test]
fn test_commit_with_retry_reapplies_after_stale_base() {
    let project = Project::default();
    project
        .commit_with_retry(1, |snapshot| snapshot.create_module("core").map(|_| ()))
        .unwrap();

    let mut calls = 0;
    let generation = project
        .commit_with_retry(3, |snapshot| {
            calls += 1;
            let core = snapshot.find_module("core").unwrap().id;
            snapshot.root_model(core)?.set_output_url(Some("file:///out/core"))?;
            if calls == 1 {
                // a concurrent writer replaces "core" before this snapshot commits
                let mut other = project.open();
                other.dispose_module(core)?;
                other.commit()?;
                let mut other = project.open();
                other.create_module("core")?;
                other.commit()?;
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(calls, 2);
    assert_eq!(generation, project.registry().generation());
    let state = project.registry().current();
    assert_eq!(
        state.find_module("core").unwrap().root_model.output_url.as_deref(),
        Some("file:///out/core")
    );
}

#[test]
fn test_commit_with_retry_gives_up_on_other_errors() {
    let project = Project::default();
    let mut calls = 0;
    let err = project
        .commit_with_retry(5, |snapshot| {
            calls += 1;
            snapshot.create_module("a")?;
            snapshot.create_module("a")?;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(matches!(err, ModelError::DuplicateModuleName(name) if name == "a"));
    assert_eq!(project.registry().current().module_count(), 0);
}

#[test]
fn test_concurrent_writers_all_land() {
    let project = Project::default();
    std::thread::scope(|scope| {
        for worker in 0..8 {
            let project = &project;
            scope.spawn(move || {
                project
                    .commit_with_retry(3, |snapshot| snapshot.create_module(&format!("m{worker}")).map(|_| ()))
                    .unwrap();
            });
        }
    });

    let state = project.registry().current();
    assert_eq!(state.module_count(), 8);
    assert_eq!(project.registry().generation(), arbor::Generation(8));
    assert_eq!(project.registry().history().len(), 8);
    assert_eq!(project.graph().sorted_modules().unwrap().len(), 8);
}

#[test]
fn test_project_libraries_through_table_models() {
    let project = layered_project();
    let table = project.registry().library_table(LibraryTableId::Project);

    let mut first = table.modifiable_model();
    let mut second = table.modifiable_model();
    first.create_library("guava").unwrap();
    let slf4j = second.library_by_name("slf4j").unwrap().id;
    second.remove_library(slf4j).unwrap();
    first.commit().unwrap();
    second.commit().unwrap();

    let names: Vec<String> = table.libraries().iter().filter_map(|l| l.name.clone()).collect();
    assert_eq!(names, ["guava"]);

    // every module still lists the removed library, now unresolved
    assert_eq!(project.registry().current().dangling_references().len(), 2);
}

#[test]
fn test_engine_tracks_structural_commits() {
    let project = layered_project();
    let first = project.graph().module_graph(false).unwrap();

    project
        .commit_with_retry(1, |snapshot| {
            let web = snapshot.find_module("web").unwrap().id;
            snapshot.root_model(web)?.add_module_dependency("persistence", DependencyScope::Runtime)?;
            Ok(())
        })
        .unwrap();

    let second = project.graph().module_graph(false).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.edge_count(), 2);
    assert_eq!(second.edge_count(), 3);
}

#[test]
fn test_project_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "project_name = \"petclinic\"\nhistory_limit = 2").unwrap();

    let project = Project::from_config_file(file.path()).unwrap();
    assert_eq!(project.registry().config().project_name, "petclinic");
    assert_eq!(project.registry().current().project_name(), "petclinic");

    for name in ["a", "b", "c"] {
        project
            .commit_with_retry(1, |snapshot| snapshot.create_module(name).map(|_| ()))
            .unwrap();
    }
    assert_eq!(project.registry().history().len(), 2);
}

#[test]
fn test_missing_config_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arbor.toml");

    let err = Project::from_config_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to load project config"));
    assert!(err.to_string().contains("arbor.toml"));
}

#[test]
fn test_config_serializes() {
    let config = RegistryConfig {
        project_name: "demo".to_string(),
        ..RegistryConfig::default()
    };
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["project_name"], "demo");
    assert_eq!(json["history_limit"], 64);
}

#[test]
fn test_init_logging_once() {
    assert!(arbor::logging::init_logging(true).is_ok());
    assert!(arbor::logging::init_logging(false).is_err());
}
