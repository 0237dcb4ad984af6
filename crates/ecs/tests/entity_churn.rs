use helio_ecs::{ComponentLibrary, EcsContext, Entity};

fn library() -> ComponentLibrary {
    let mut ctx = EcsContext::new();
    ctx.finalize();
    match ctx.create_library() {
        Ok(lib) => lib,
        Err(e) => panic!("{e}"),
    }
}

#[test]
fn churn_reuses_indices_and_bumps_generations() {
    let mut lib = library();

    let first: Vec<Entity> = (0..1000).map(|_| lib.create_entity(None)).collect();
    for e in &first {
        assert!(lib.is_valid(*e));
        assert_eq!(e.generation, 0);
    }

    let removed: Vec<Entity> = first.iter().copied().filter(|e| e.index % 2 == 1).collect();
    for e in &removed {
        lib.remove_entity(*e);
    }
    for e in &removed {
        assert!(!lib.is_valid(*e));
    }

    let second: Vec<Entity> = (0..500).map(|_| lib.create_entity(None)).collect();
    for e in &second {
        // free-list reuse: all 500 come from the removed odd indices
        assert!(e.index <= 1000);
        assert_eq!(e.index % 2, 1);
        assert_eq!(e.generation, 1);
        assert!(lib.is_valid(*e));
    }
    for e in &removed {
        assert!(!lib.is_valid(*e));
    }

    assert_eq!(lib.entity_count(), 1000);
}

#[test]
fn component_density_holds_under_random_churn() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut lib = library();
    let key = lib.keys().transform;
    let mut rng = StdRng::seed_from_u64(17);
    let mut live: Vec<Entity> = Vec::new();

    for step in 0..5000 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let e = lib.create_entity(None);
            if rng.gen_bool(0.8) {
                if let Some(t) = lib.add_component(key, e) {
                    t.translation.x = step as f32;
                }
            }
            live.push(e);
        } else {
            let victim = live.swap_remove(rng.gen_range(0..live.len()));
            lib.remove_entity(victim);
        }
    }

    let (components, entities) = lib.get_components(key);
    assert_eq!(components.len(), entities.len());
    for (i, entity) in entities.iter().enumerate() {
        assert!(lib.is_valid(*entity));
        let looked_up = lib.get_component(key, *entity);
        assert_eq!(
            looked_up.map(|t| t.translation.x),
            Some(components[i].translation.x)
        );
    }
}
