#[cfg(test)]
mod tests {
    use crate::error::UnknownBasisError;
    use crate::molecule::{Atom, Molecule};
    use crate::registry::BasisRegistry;
    use crate::shell::{BasisSpec, Harmonics, Shell};
    use nalgebra::Vector3;
    use std::sync::Arc;
    use std::thread;

    const AUX: &str = "H  S\n 1.0 1.0\nH  S\n 0.3 1.0\nH  P\n 0.5 1.0\nO  S\n 8.0 1.0\nO  P\n 2.0 1.0\nO  D\n 1.0 1.0\n";

    fn registry() -> BasisRegistry {
        let mut registry = BasisRegistry::new();
        registry.register_nwchem("Test-JKFIT", AUX, Harmonics::Spherical).unwrap();
        registry
    }

    fn water() -> Molecule {
        Molecule::new(
            "h2o",
            vec![
                Atom::new("O", Vector3::zeros()).unwrap(),
                Atom::new("H", Vector3::new(0.0, 1.43, 1.11)).unwrap(),
                Atom::new("H", Vector3::new(0.0, -1.43, 1.11)).unwrap(),
            ],
            0,
            1,
            "sto-3g",
            "test-jkfit",
        )
        .unwrap()
    }

    #[test]
    fn test_dimension_and_ranges() {
        let registry = registry();
        let molecule = water();
        // O: 1 + 3 + 5, H: 1 + 1 + 3
        assert_eq!(registry.function_count("O", "test-jkfit").unwrap(), 9);
        assert_eq!(registry.function_count("H", "TEST-JKFIT").unwrap(), 5);
        assert_eq!(registry.dimension(&molecule, "test-jkfit").unwrap(), 19);
        assert_eq!(
            registry.atom_index_ranges(&molecule, "test-jkfit").unwrap(),
            vec![0..9, 9..14, 14..19]
        );

        let resolved = registry.resolve(&molecule, "test-jkfit").unwrap();
        assert_eq!(resolved.dimension(), 19);
        assert_eq!(resolved.atom_of(10), Some(1));
        assert_eq!(resolved.atom_of(19), None);
        let momenta = resolved.function_angular_momenta();
        assert_eq!(momenta.len(), 19);
        assert_eq!(&momenta[0..4], &[0, 1, 1, 1]);
    }

    #[test]
    fn test_unknown_pairs() {
        let registry = registry();
        assert_eq!(
            registry.shells_for("C", "test-jkfit").unwrap_err(),
            UnknownBasisError::new("C", "test-jkfit")
        );
        assert!(registry.shells_for("H", "cc-pvdz-ri").is_err());
        assert!(registry.check_molecule(&water(), "cc-pvdz-ri").is_err());
        assert!(registry.check_molecule(&water(), "test-jkfit").is_ok());
    }

    #[test]
    fn test_with_basis_leaves_original_untouched() {
        let registry = registry();
        let candidate = BasisSpec::new("H", vec![Shell::primitive(0, 0.7).unwrap()], Harmonics::Spherical).unwrap();
        let extended = registry.with_basis("candidate-0", vec![candidate]);
        assert!(extended.contains("candidate-0"));
        assert!(!registry.contains("candidate-0"));
        assert_eq!(extended.elements_for("candidate-0"), vec!["H"]);
        assert_eq!(extended.elements_for("test-jkfit"), vec!["H", "O"]);
        assert_eq!(extended.basis_names(), vec!["candidate-0", "test-jkfit"]);
    }

    #[test]
    fn test_concurrent_reads() {
        let registry = Arc::new(registry());
        let molecule = Arc::new(water());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let molecule = Arc::clone(&molecule);
                thread::spawn(move || registry.dimension(&molecule, "test-jkfit").unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 19);
        }
    }

    #[test]
    fn test_json_round_trip_validates() {
        let registry = registry();
        let spec = registry.spec("O", "test-jkfit").unwrap();
        let text = spec.to_json().unwrap();
        let back = BasisSpec::from_json(&text).unwrap();
        assert_eq!(&back, spec.as_ref());

        let broken = text.replace("8.0", "-8.0");
        assert!(BasisSpec::from_json(&broken).is_err());
    }
}
