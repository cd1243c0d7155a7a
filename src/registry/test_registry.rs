use crate::registry::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn test_registry_register_and_get() {
    let mut reg = SharedObjectRegistry::with_capacity(3);
    assert!(reg.is_empty());

    for oid in 0..3 {
        reg.register_objects(oid, 1000).unwrap();
    }
    assert_eq!(3, reg.len());

    assert_eq!(
        Err(RegistryError::Duplicated(1)),
        reg.register_objects(1, 5)
    );

    *reg.get_object(1).unwrap() = 7;

    let cases = vec![(0, Ok(1000)), (1, Ok(7)), (2, Ok(1000)), (3, Err(RegistryError::NotFound(3)))];
    for (oid, want) in cases.into_iter() {
        let got = reg.get_object(oid).map(|v| *v);
        assert_eq!(want, got, "oid: {}", oid);
    }
}

#[test]
fn test_registry_shared_between_threads() {
    use std::sync::Arc;
    use std::thread;

    let mut reg = SharedObjectRegistry::default();
    reg.register_objects(0, 0u64).unwrap();
    let reg = Arc::new(reg);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reg = reg.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    *reg.get_object(0).unwrap() += 1;
                }
            })
        })
        .collect();

    for h in handles.into_iter() {
        h.join().unwrap();
    }

    assert_eq!(400, *reg.get_object(0).unwrap());
}
