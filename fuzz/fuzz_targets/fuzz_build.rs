#![no_main]

//! Fuzz target for registry construction
//!
//! Builds registries from arbitrary dependency graphs. A build must succeed
//! exactly when the graph is acyclic and every required dependency exists.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use service_injector::{
    BoxError, Definition, DiError, FactoryDeclaration, Instance, ResolvedDependencies,
    ServiceDependencies, ServiceDependency, ServicesBuilder, TypeDescriptor,
};
use std::sync::Arc;

const MAX_NODES: usize = 8;

#[derive(Debug, Arbitrary)]
struct Edge {
    target: u8,
    optional: bool,
}

#[derive(Debug, Arbitrary)]
struct Node {
    priority: i8,
    edges: Vec<Edge>,
}

fn descriptor(i: usize) -> TypeDescriptor {
    TypeDescriptor::new(format!("node{i}"))
}

/// Targets are taken modulo `MAX_NODES + 2` so some point at missing nodes
fn target(edge: &Edge) -> usize {
    usize::from(edge.target) % (MAX_NODES + 2)
}

fn has_cycle(nodes: &[Node]) -> bool {
    fn visit(i: usize, nodes: &[Node], state: &mut [u8]) -> bool {
        match state[i] {
            1 => return true,
            2 => return false,
            _ => {}
        }
        state[i] = 1;
        for edge in &nodes[i].edges {
            let t = target(edge);
            if t < nodes.len() && visit(t, nodes, state) {
                return true;
            }
        }
        state[i] = 2;
        false
    }

    let mut state = vec![0u8; nodes.len()];
    (0..nodes.len()).any(|i| visit(i, nodes, &mut state))
}

fuzz_target!(|nodes: Vec<Node>| {
    let nodes: Vec<Node> = nodes.into_iter().take(MAX_NODES).collect();

    let mut builder = ServicesBuilder::new();
    for (i, node) in nodes.iter().enumerate() {
        let dependencies: ServiceDependencies = node
            .edges
            .iter()
            .map(|edge| {
                let dependency = ServiceDependency::on(descriptor(target(edge)));
                if edge.optional { dependency.as_optional() } else { dependency }
            })
            .collect();
        let value = i as u32;
        let declaration = FactoryDeclaration::new(
            Definition::new(descriptor(i), format!("n{i}"), i32::from(node.priority)),
            dependencies,
            Arc::new(
                move |_: &ResolvedDependencies| -> Result<Instance, BoxError> {
                    Ok(Arc::new(value))
                },
            ),
        );
        builder = builder.register(Arc::new(declaration));
    }

    let missing_required = nodes
        .iter()
        .flat_map(|node| &node.edges)
        .any(|edge| !edge.optional && target(edge) >= nodes.len());
    let expected_ok = !has_cycle(&nodes) && !missing_required;

    match builder.build() {
        Ok(services) => {
            assert!(expected_ok);
            for i in 0..nodes.len() {
                let service = services.service(None, &descriptor(i)).unwrap();
                assert_eq!(*service.get_as::<u32>().unwrap(), i as u32);
            }
        }
        Err(DiError::CircularDependency { path }) => {
            assert!(!expected_ok);
            assert_eq!(path.first(), path.last());
        }
        Err(DiError::UnresolvedDependency { .. }) => assert!(!expected_ok),
        Err(other) => panic!("unexpected build error: {other:?}"),
    }
});
