//! Property tests for parameter domains

use mctune_space::{
    Component, ComponentMapping, ParameterDomain, ParameterKind, ParameterSpec, SlotId,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn mixed_domain() -> ParameterDomain {
    let component = Component::new("p.Mixed")
        .with_parameter(ParameterSpec::new("i", ParameterKind::Int { min: -5, max: 5 }))
        .with_parameter(ParameterSpec::new("d", ParameterKind::Double { min: 0.5, max: 2.5 }))
        .with_parameter(ParameterSpec::new("b", ParameterKind::Bool))
        .with_parameter(ParameterSpec::new(
            "c",
            ParameterKind::Categorical {
                values: vec![serde_json::json!("x"), serde_json::json!("y")],
            },
        ));
    let mut mapping = ComponentMapping::new();
    mapping.insert(SlotId::ROOT, Arc::new(component));
    ParameterDomain::new(&mapping)
}

proptest! {
    #[test]
    fn clamped_vectors_decode_to_valid_configs(raw in prop::collection::vec(-100.0f64..100.0, 4)) {
        let domain = mixed_domain();
        let clamped = domain.clamp(&raw);
        for (x, (min, max)) in clamped.iter().zip(domain.bounds()) {
            prop_assert!(*min <= *x && *x <= *max);
        }

        let config = domain.from_vector(&clamped).unwrap();
        let slot = config.slot(SlotId::ROOT).unwrap();
        let component = domain.components().next().unwrap().1;
        prop_assert!(component.validate_config(&slot.parameters));
    }

    #[test]
    fn random_vectors_stay_in_bounds(seed in any::<u64>()) {
        let domain = mixed_domain();
        let mut rng = StdRng::seed_from_u64(seed);
        let vector = domain.random_vector(&mut rng);
        prop_assert_eq!(vector.len(), domain.len());
        for (x, (min, max)) in vector.iter().zip(domain.bounds()) {
            prop_assert!(*min <= *x && *x <= *max);
        }
    }

    #[test]
    fn top_k_is_descending(scores in prop::collection::vec(-10.0f64..10.0, 1..40), k in 1usize..50) {
        let domain = mixed_domain();
        for (i, score) in scores.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            domain.add_result(&[i as f64], *score);
        }
        let top = domain.top_k(k);
        prop_assert_eq!(top.len(), k.min(scores.len()));
        for pair in top.windows(2) {
            prop_assert!(pair[0].0 >= pair[1].0);
        }
    }
}
