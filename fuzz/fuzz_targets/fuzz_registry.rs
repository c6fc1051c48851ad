#![no_main]

//! Fuzz target for registry operations
//!
//! Registers and looks up services with arbitrary names and priorities and
//! checks every result against a simple model of the registry.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use service_injector::{
    DiError, FactoryDeclaration, ServiceDefinition, Services, TypeDescriptor,
};

#[derive(Debug, Arbitrary)]
enum RegistryOp {
    Declare { name: u8, priority: i8, value: u32 },
    Get,
    GetNamed(u8),
    Typed,
    Freeze,
    Close,
}

fn name(n: u8) -> String {
    format!("s{}", n % 8)
}

/// Expected outcome of a lookup among `priorities`
fn check(result: Result<std::sync::Arc<u32>, DiError>, priorities: &[i32]) {
    let best = priorities.iter().min();
    let tied = best.map_or(0, |best| priorities.iter().filter(|p| *p == best).count());
    match (result, tied) {
        (Err(DiError::NotFound { .. }), 0) => {}
        (Ok(_), 1) => {}
        (Err(DiError::Conflict { candidates, .. }), n) if n > 1 => {
            assert_eq!(candidates.len(), n);
        }
        (other, n) => panic!("lookup among {n} best candidates returned {other:?}"),
    }
}

fuzz_target!(|ops: Vec<RegistryOp>| {
    let services = Services::new();
    let ty = TypeDescriptor::of::<u32>();
    let mut model: Vec<(String, i32)> = Vec::new();
    let mut frozen = false;

    for op in ops {
        match op {
            RegistryOp::Declare { name: n, priority, value } => {
                let name = name(n);
                let priority = i32::from(priority);
                let result = services.declare(FactoryDeclaration::instance(
                    ty.clone(),
                    Some(name.clone()),
                    priority,
                    value,
                ));
                let duplicate = model.iter().any(|(m, p)| *m == name && *p == priority);
                match result {
                    Err(DiError::Frozen) => assert!(frozen),
                    Err(DiError::DuplicateRegistration { .. }) => assert!(duplicate),
                    Ok(Some(service)) => {
                        assert!(!frozen && !duplicate);
                        assert_eq!(service.name(), name);
                        model.push((name, priority));
                    }
                    other => panic!("declare returned {other:?}"),
                }
            }
            RegistryOp::Get => {
                let priorities: Vec<i32> = model.iter().map(|(_, p)| *p).collect();
                check(services.get::<u32>(), &priorities);
            }
            RegistryOp::GetNamed(n) => {
                let name = name(n);
                let priorities: Vec<i32> = model
                    .iter()
                    .filter(|(m, _)| *m == name)
                    .map(|(_, p)| *p)
                    .collect();
                check(services.get_named::<u32>(&name), &priorities);
            }
            RegistryOp::Typed => {
                let typed = services.services(&ty);
                assert_eq!(typed.len(), model.len());
                let priorities: Vec<i32> = typed.iter().map(|s| s.priority()).collect();
                assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
            }
            RegistryOp::Freeze => {
                services.freeze();
                frozen = true;
            }
            RegistryOp::Close => services.close(),
        }
    }
});
