//! Property tests over random edit sequences

use std::collections::HashSet;

use arbor::model::OrderEntry;
use arbor::{DependencyScope, ModuleId, Project};
use proptest::prelude::*;

/// A module with `n` dependency entries after its module source, plus a
/// permutation of the entry indices that keeps the source in place.
fn entries_and_permutation() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..8).prop_flat_map(|n| {
        let shuffled = Just((1..=n).collect::<Vec<_>>()).prop_shuffle();
        (Just(n), shuffled.prop_map(|tail| std::iter::once(0).chain(tail).collect::<Vec<usize>>()))
    })
}

/// Edges `(dependent, dependency)` between `n` modules.
fn dependency_edges() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..10).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..(n * 2))))
}

#[derive(Debug, Clone)]
enum Edit {
    Create(String),
    Rename(usize, String),
    Remove(usize),
}

/// Edits over a small name pool so renames and removals hit reused names.
fn edit_sequence() -> impl Strategy<Value = Vec<Edit>> {
    let edit = prop_oneof![
        "[a-f]".prop_map(Edit::Create),
        (any::<usize>(), "[a-f]").prop_map(|(i, name)| Edit::Rename(i, name)),
        any::<usize>().prop_map(Edit::Remove),
    ];
    prop::collection::vec(edit, 1..24)
}

fn project_with_edges(n: usize, edges: &[(usize, usize)]) -> Project {
    let project = Project::default();
    project
        .commit_with_retry(1, |snapshot| {
            let ids = (0..n)
                .map(|i| snapshot.create_module(&format!("m{i}")))
                .collect::<Result<Vec<_>, _>>()?;
            for &(from, to) in edges {
                snapshot
                    .root_model(ids[from])?
                    .add_module_dependency(&format!("m{to}"), DependencyScope::Compile)?;
            }
            Ok(())
        })
        .unwrap();
    project
}

proptest! {
    #[test]
    fn rearrange_then_inverse_restores_entries((n, order) in entries_and_permutation()) {
        let project = Project::default();
        let mut snapshot = project.open();
        let module = snapshot.create_module("m").unwrap();
        let mut root = snapshot.root_model(module).unwrap();
        for i in 0..n {
            root.add_module_dependency(&format!("dep{i}"), DependencyScope::Compile).unwrap();
        }
        let original: Vec<OrderEntry> = root.order_entries().to_vec();

        root.rearrange_order_entries(&order).unwrap();
        for (position, &index) in order.iter().enumerate() {
            prop_assert_eq!(&root.order_entries()[position], &original[index]);
        }

        let mut inverse = vec![0; order.len()];
        for (position, &index) in order.iter().enumerate() {
            inverse[index] = position;
        }
        root.rearrange_order_entries(&inverse).unwrap();
        prop_assert_eq!(root.order_entries(), original.as_slice());
    }

    #[test]
    fn sorted_modules_respects_acyclic_dependencies((n, edges) in dependency_edges()) {
        // keep only edges pointing at lower indices so the graph is acyclic
        let edges: Vec<(usize, usize)> = edges.into_iter().filter(|(from, to)| from > to).collect();
        let project = project_with_edges(n, &edges);
        let state = project.registry().current();

        let sorted = project.graph().sorted_modules().unwrap();
        let position = |i: usize| {
            let id = state.find_module(&format!("m{i}")).unwrap().id;
            sorted.iter().position(|m| *m == id).unwrap()
        };
        for &(from, to) in &edges {
            prop_assert!(position(to) < position(from));
        }
    }

    #[test]
    fn sorted_modules_lists_every_module_once((n, edges) in dependency_edges()) {
        let project = project_with_edges(n, &edges);

        let sorted = project.graph().sorted_modules().unwrap();
        prop_assert_eq!(sorted.len(), n);
        let distinct: HashSet<_> = sorted.iter().collect();
        prop_assert_eq!(distinct.len(), n);
    }

    #[test]
    fn open_snapshot_never_sees_later_commits(names in prop::collection::hash_set("[a-z]{1,6}", 1..6)) {
        let project = Project::default();
        let reader = project.open();
        let pinned = project.registry().current();

        for name in &names {
            project
                .commit_with_retry(1, |snapshot| snapshot.create_module(name).map(|_| ()))
                .unwrap();
        }

        prop_assert!(reader.modules().is_empty());
        prop_assert_eq!(pinned.module_count(), 0);
        prop_assert_eq!(project.registry().current().module_count(), names.len());
    }

    #[test]
    fn find_module_follows_last_committed_name(edits in edit_sequence()) {
        let project = Project::default();
        let mut live: Vec<(ModuleId, String)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for edit in edits {
            let taken = |name: &str| live.iter().any(|(_, n)| n == name);
            let mut snapshot = project.open();
            match edit {
                Edit::Create(name) => {
                    if taken(&name) {
                        continue;
                    }
                    let id = snapshot.create_module(&name).unwrap();
                    seen.insert(name.clone());
                    live.push((id, name));
                }
                Edit::Rename(i, name) => {
                    if live.is_empty() || taken(&name) {
                        continue;
                    }
                    let i = i % live.len();
                    snapshot.rename_module(live[i].0, &name).unwrap();
                    seen.insert(name.clone());
                    live[i].1 = name;
                }
                Edit::Remove(i) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (id, _) = live.remove(i % live.len());
                    snapshot.dispose_module(id).unwrap();
                }
            }
            snapshot.commit().unwrap();

            let state = project.registry().current();
            prop_assert_eq!(state.module_count(), live.len());
            for (id, name) in &live {
                prop_assert_eq!(state.find_module(name).map(|m| m.id), Some(*id));
            }
            for name in seen.iter().filter(|name| !live.iter().any(|(_, n)| n == *name)) {
                prop_assert!(state.find_module(name).is_none(), "retired name {} still resolves", name);
            }
        }
    }
}
