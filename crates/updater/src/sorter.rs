//! Topological ordering of grain elements by their reference graph,
//! used inside individual update phases (views among views, tables among
//! tables). An element that references another sorts after it.

use score::{ElementKind, GrainElement};
use std::collections::{BTreeSet, HashMap};

type Key = (String, String, ElementKind);

fn key_of<E: GrainElement + ?Sized>(element: &E) -> Key {
    (
        element.grain_name().to_string(),
        element.name().to_string(),
        element.kind(),
    )
}

/// Stable Kahn topological sort: referenced elements come first, ties keep
/// their input order. References to elements outside the input set are
/// ignored. The input is cycle-free by construction (the score builder
/// rejects cyclic references); should a cycle slip through regardless, the
/// leftover elements are appended in input order.
pub fn sort_elements<E: GrainElement + ?Sized>(elements: Vec<&E>) -> Vec<&E> {
    let index: HashMap<Key, usize> = elements
        .iter()
        .enumerate()
        .map(|(position, element)| (key_of(*element), position))
        .collect();

    // dependents[i] lists elements that reference element i.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); elements.len()];
    let mut in_degree: Vec<usize> = vec![0; elements.len()];
    for (position, element) in elements.iter().enumerate() {
        let mut targets: Vec<usize> = element
            .references()
            .into_iter()
            .filter_map(|reference| {
                index
                    .get(&(
                        reference.grain_name.to_string(),
                        reference.element_name.to_string(),
                        reference.kind,
                    ))
                    .copied()
            })
            .filter(|&target| target != position)
            .collect();
        targets.sort_unstable();
        targets.dedup();
        for target in targets {
            dependents[target].push(position);
            in_degree[position] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(position, _)| position)
        .collect();
    let mut output = Vec::with_capacity(elements.len());
    while let Some(&position) = ready.iter().next() {
        ready.remove(&position);
        output.push(elements[position]);
        for &dependent in &dependents[position] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
        in_degree[position] = usize::MAX; // visited
    }

    if output.len() < elements.len() {
        debug_assert!(false, "cycle in element references");
        for (position, &degree) in in_degree.iter().enumerate() {
            if degree != usize::MAX {
                output.push(elements[position]);
            }
        }
    }
    output
}
