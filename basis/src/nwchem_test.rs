#[cfg(test)]
mod tests {
    use crate::error::BasisParseError;
    use crate::nwchem::parse_nwchem;
    use crate::shell::Harmonics;

    const H_631G: &str = r#"
#----------------------------------------------------------------------
# Basis Set Exchange
#   Basis set: 6-31G
#----------------------------------------------------------------------
BASIS "ao basis" SPHERICAL PRINT
#BASIS SET: (4s) -> [2s]
H    S
      0.1873113696E+02       0.3349460434E-01
      0.2825394365E+01       0.2347269535E+00
      0.6401216923E+00       0.8137573261E+00
H    S
      0.1612777588E+00       1.0000000
END
"#;

    const O_SP: &str = r#"
BASIS "ao basis" CARTESIAN PRINT
O    S
   5484.6717000              0.0018311
    825.2349500              0.0139501
O    SP
     15.5396160             -0.1107775              0.0708743
      3.5999336             -0.1480263              0.3397528
O    D
      0.8000000              1.0000000
END
"#;

    #[test]
    fn test_parse_hydrogen_631g() {
        let specs = parse_nwchem(H_631G, Harmonics::Spherical).unwrap();
        assert_eq!(specs.len(), 1);
        let h = &specs[0];
        assert_eq!(h.symbol, "H");
        assert_eq!(h.atomic_number, 1);
        assert_eq!(h.shells.len(), 2);
        assert_eq!(h.shells[0].num_primitives(), 3);
        assert!((h.shells[0].exponents[0] - 18.73113696).abs() < 1e-10);
        assert!((h.shells[1].coefficients[0] - 1.0).abs() < 1e-12);
        assert_eq!(h.function_count(), 2);
        assert_eq!(h.contraction_pattern(), "[2s]");
    }

    #[test]
    fn test_sp_block_splits_and_cartesian_header() {
        let specs = parse_nwchem(O_SP, Harmonics::Spherical).unwrap();
        let o = &specs[0];
        assert_eq!(o.harmonics, Harmonics::Cartesian);
        let momenta: Vec<u32> = o.shells.iter().map(|s| s.l).collect();
        assert_eq!(momenta, vec![0, 0, 1, 2]);
        assert_eq!(o.shells[1].exponents, o.shells[2].exponents);
        assert!((o.shells[2].coefficients[1] - 0.3397528).abs() < 1e-12);
        // cartesian: s + s + 3p + 6d
        assert_eq!(o.function_count(), 11);
        assert_eq!(o.contraction_pattern(), "[2s1p1d]");
    }

    #[test]
    fn test_general_contraction_and_fortran_exponents() {
        let text = "C    S\n  0.1D+02   0.5D+00   0.0D+00\n  0.1D+01   0.5D+00   1.0D+00\n";
        let specs = parse_nwchem(text, Harmonics::Spherical).unwrap();
        assert_eq!(specs[0].shells.len(), 2);
        assert!((specs[0].shells[0].exponents[0] - 10.0).abs() < 1e-12);
        assert!((specs[0].shells[1].coefficients[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_multiple_elements_keep_order() {
        let text = "O  S\n 1.0 1.0\nH  S\n 0.5 1.0\nO  P\n 0.8 1.0\n";
        let specs = parse_nwchem(text, Harmonics::Spherical).unwrap();
        let symbols: Vec<&str> = specs.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["O", "H"]);
        assert_eq!(specs[0].function_count(), 4);
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            parse_nwchem("Qq  S\n 1.0 1.0\n", Harmonics::Spherical),
            Err(BasisParseError::UnknownElement { line: 1, .. })
        ));
        assert!(matches!(
            parse_nwchem("H  X\n 1.0 1.0\n", Harmonics::Spherical),
            Err(BasisParseError::UnknownShell { line: 1, .. })
        ));
        assert!(matches!(
            parse_nwchem(" 1.0 1.0\n", Harmonics::Spherical),
            Err(BasisParseError::OrphanRow { line: 1 })
        ));
        assert!(matches!(
            parse_nwchem("H  SP\n 1.0 1.0\n", Harmonics::Spherical),
            Err(BasisParseError::ColumnCount { line: 2, .. })
        ));
        assert!(matches!(
            parse_nwchem("H  S\n 1.0 abc\n", Harmonics::Spherical),
            Err(BasisParseError::BadNumber { line: 2, .. })
        ));
        assert!(matches!(
            parse_nwchem("H  S\nEND\n", Harmonics::Spherical),
            Err(BasisParseError::EmptyShell { line: 1 })
        ));
        assert_eq!(parse_nwchem("# nothing\n", Harmonics::Spherical), Err(BasisParseError::Empty));
    }
}
