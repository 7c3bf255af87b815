//! Deterministic topological ordering with cycle reporting.

use std::collections::{BTreeSet, HashMap};

use super::descriptor::{ProviderDescriptor, ProviderPosition};
use crate::error::RegistryError;

/// Order the nodes `0..edges.len()` so every edge `a -> b` puts `a` first.
///
/// Among ready nodes the lowest index goes first, so unconstrained nodes
/// keep their declaration order. On failure returns one cycle, closed by
/// repeating its first node.
pub(crate) fn topological_order(edges: &[BTreeSet<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = edges.len();
    let mut in_degree = vec![0usize; n];
    for targets in edges {
        for &t in targets {
            in_degree[t] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &t in &edges[node] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                ready.insert(t);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let remaining: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
    Err(find_cycle(&remaining, edges))
}

/// Walk predecessors inside `remaining` until a node repeats. Every node
/// left over by Kahn's algorithm has such a predecessor.
fn find_cycle(remaining: &BTreeSet<usize>, edges: &[BTreeSet<usize>]) -> Vec<usize> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut seen = HashMap::from([(start, 0usize)]);
    let mut current = start;

    loop {
        let predecessor = remaining
            .iter()
            .copied()
            .find(|p| edges[*p].contains(&current));
        let Some(predecessor) = predecessor else {
            return path;
        };
        if let Some(&at) = seen.get(&predecessor) {
            let mut cycle = path[at..].to_vec();
            cycle.reverse();
            cycle.push(cycle[0]);
            return cycle;
        }
        seen.insert(predecessor, path.len());
        path.push(predecessor);
        current = predecessor;
    }
}

/// Compute the chain order of one capability's providers, as indices into
/// `descriptors`.
pub(crate) fn order_providers(
    capability: &'static str,
    descriptors: &[&ProviderDescriptor],
) -> Result<Vec<usize>, RegistryError> {
    let mut index = HashMap::new();
    for (i, d) in descriptors.iter().enumerate() {
        if index.insert(d.name(), i).is_some() {
            return Err(RegistryError::DuplicateProvider {
                capability,
                provider: d.name().to_string(),
            });
        }
    }

    let lookup = |d: &ProviderDescriptor, reference: &str| {
        index
            .get(reference)
            .copied()
            .ok_or_else(|| RegistryError::UnknownReference {
                capability,
                provider: d.name().to_string(),
                reference: reference.to_string(),
            })
    };

    let mut edges = vec![BTreeSet::new(); descriptors.len()];
    for (i, d) in descriptors.iter().enumerate() {
        match d.position() {
            ProviderPosition::Unconstrained => {}
            ProviderPosition::Before(other) => {
                edges[i].insert(lookup(d, other)?);
            }
            ProviderPosition::After(other) => {
                edges[lookup(d, other)?].insert(i);
            }
            ProviderPosition::First => {
                for (j, o) in descriptors.iter().enumerate() {
                    if *o.position() != ProviderPosition::First {
                        edges[i].insert(j);
                    }
                }
            }
            ProviderPosition::Last => {
                for (j, o) in descriptors.iter().enumerate() {
                    if *o.position() != ProviderPosition::Last {
                        edges[j].insert(i);
                    }
                }
            }
        }
    }

    topological_order(&edges).map_err(|cycle| RegistryError::Cycle {
        capability,
        cycle: cycle
            .into_iter()
            .map(|i| descriptors[i].name().to_string())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FindPackageByIdCapability;

    fn descriptor(name: &str, position: ProviderPosition) -> ProviderDescriptor {
        ProviderDescriptor::new::<FindPackageByIdCapability>(name).with_position(position)
    }

    fn names(descriptors: &[ProviderDescriptor]) -> Result<Vec<String>, RegistryError> {
        let refs: Vec<_> = descriptors.iter().collect();
        let order = order_providers("Cap", &refs)?;
        Ok(order
            .into_iter()
            .map(|i| descriptors[i].name().to_string())
            .collect())
    }

    #[test]
    fn test_unconstrained_keeps_declaration_order() {
        let descriptors = vec![
            descriptor("a", ProviderPosition::Unconstrained),
            descriptor("b", ProviderPosition::Unconstrained),
            descriptor("c", ProviderPosition::Unconstrained),
        ];
        assert_eq!(names(&descriptors).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_before_after_first_last() {
        let descriptors = vec![
            descriptor("tail", ProviderPosition::Last),
            descriptor("x", ProviderPosition::After("y".into())),
            descriptor("y", ProviderPosition::Unconstrained),
            descriptor("w", ProviderPosition::Before("y".into())),
            descriptor("head", ProviderPosition::First),
        ];
        assert_eq!(
            names(&descriptors).unwrap(),
            vec!["head", "w", "y", "x", "tail"]
        );
    }

    #[test]
    fn test_chain_matches_declared_constraints() {
        let descriptors = vec![
            descriptor("LocalV3", ProviderPosition::Unconstrained),
            descriptor("LocalV2", ProviderPosition::Before("LocalV3".into())),
            descriptor("RemoteV2", ProviderPosition::Before("LocalV2".into())),
            descriptor("HttpFs", ProviderPosition::Before("RemoteV2".into())),
        ];
        assert_eq!(
            names(&descriptors).unwrap(),
            vec!["HttpFs", "RemoteV2", "LocalV2", "LocalV3"]
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let descriptors = vec![
            descriptor("a", ProviderPosition::Before("b".into())),
            descriptor("b", ProviderPosition::Before("c".into())),
            descriptor("c", ProviderPosition::Before("a".into())),
        ];
        match names(&descriptors) {
            Err(RegistryError::Cycle { cycle, .. }) => {
                assert_eq!(cycle.len(), 4);
                assert_eq!(cycle.first(), cycle.last());
                for name in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|c| c == name));
                }
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_reference() {
        let descriptors = vec![descriptor("a", ProviderPosition::After("ghost".into()))];
        assert_eq!(
            names(&descriptors),
            Err(RegistryError::UnknownReference {
                capability: "Cap",
                provider: "a".into(),
                reference: "ghost".into(),
            })
        );
    }

    #[test]
    fn test_duplicate_name() {
        let descriptors = vec![
            descriptor("a", ProviderPosition::Unconstrained),
            descriptor("a", ProviderPosition::Last),
        ];
        assert!(matches!(
            names(&descriptors),
            Err(RegistryError::DuplicateProvider { .. })
        ));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let edges = vec![BTreeSet::from([0])];
        assert_eq!(topological_order(&edges), Err(vec![0, 0]));
    }
}
