use super::*;
use crate::jacobian::build_jacobian_template;
use crate::state::VarType;
use approx::assert_relative_eq;
use super::arrhenius::ArrheniusParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use super::troe::TroeParams;

// T = P makes conv·P/T = conv, so conv = 1 leaves the rate constant untouched
fn unit_env() -> EnvState {
    EnvState::new(300.0, 300.0)
}

fn arrhenius(a: f64, react: Vec<usize>, prod: Vec<usize>, yields: Vec<f64>) -> ArrheniusReaction {
    let params = ArrheniusParams {
        a,
        ..ArrheniusParams::default()
    };
    ArrheniusReaction::new(params, 1.0, RxnSpecies::new(react, prod, yields).unwrap())
}

/// 0: O3, 1: NO, 2: NO2, 3: O, 4: O2, 5: M (constant)
fn mixed_mechanism() -> Mechanism {
    let mut mech = Mechanism::new();
    // O3 + NO -> NO2 + O2
    mech.push(arrhenius(1.8, vec![0, 1], vec![2, 4], vec![1.0, 1.0]));
    // NO2 -> NO + O
    let photo = RxnSpecies::new(vec![2], vec![1, 3], vec![1.0, 1.0]).unwrap();
    mech.push(PhotolysisReaction::new(7, 1.0, photo));
    // O + O2 + M -> O3 + M
    let troe = RxnSpecies::new(vec![3, 4, 5], vec![0, 5], vec![1.0, 1.0]).unwrap();
    mech.push(TroeReaction::new(
        TroeParams {
            k0_a: 0.9,
            kinf_a: 2.0,
            ..TroeParams::default()
        },
        1.0,
        troe,
    ));
    // 2 O -> O2, with a fractional yield
    mech.push(arrhenius(0.7, vec![3, 3], vec![4], vec![0.8]));
    mech
}

fn mixed_state_map() -> StateMap {
    let mut var_type = vec![VarType::Solved; 5];
    var_type.push(VarType::Constant);
    StateMap::new(var_type)
}

fn prepared_mechanism() -> (Mechanism, StateMap, SparsityTemplate) {
    let mut mech = mixed_mechanism();
    let map = mixed_state_map();
    let template = build_jacobian_template(&mut mech, &map).unwrap();
    let update = UpdateData::PhotolysisRate {
        photo_id: 7,
        base_rate: 0.35,
    };
    assert_eq!(mech.update_data(&update), 1);
    mech.update_env_state(&unit_env());
    (mech, map, template)
}

#[test]
fn test_skip_walk_consumes_whole_buffer() {
    let (mech, _, _) = prepared_mechanism();
    let bytes = mech.to_bytes();
    assert_eq!(bytes.len(), mech.encoded_len());

    let lengths = Mechanism::record_lengths(&bytes).unwrap();
    assert_eq!(lengths.len(), 4);
    for (len, rxn) in lengths.iter().zip(mech.iter()) {
        assert_eq!(*len, rxn.encoded_len());
    }
    assert_eq!(INT_SIZE + lengths.iter().sum::<usize>(), bytes.len());

    let decoded = Mechanism::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, mech);
}

#[test]
fn test_trailing_and_truncated_buffers_are_rejected() {
    let (mech, _, _) = prepared_mechanism();
    let mut bytes = mech.to_bytes();
    bytes.extend_from_slice(&[0u8; 3]);
    assert!(matches!(
        Mechanism::record_lengths(&bytes),
        Err(PhlexError::TrailingBytes {
            n_rxn: 4,
            remaining: 3
        })
    ));
    assert!(matches!(
        Mechanism::from_bytes(&bytes),
        Err(PhlexError::TrailingBytes { .. })
    ));

    let full = mech.to_bytes();
    let cut = &full[..full.len() - FLOAT_SIZE];
    let err = Mechanism::from_bytes(cut).unwrap_err();
    assert!(matches!(err, PhlexError::TruncatedBuffer { .. }));
    assert!(err.is_structural());
}

#[test]
fn test_unknown_kind_tag_is_fatal() {
    let (mech, _, _) = prepared_mechanism();
    let mut bytes = mech.to_bytes();
    // first kind tag follows the reaction count
    bytes[INT_SIZE..2 * INT_SIZE].copy_from_slice(&9i32.to_le_bytes());
    assert!(matches!(
        Mechanism::record_lengths(&bytes),
        Err(PhlexError::UnrecognizedReactionKind(9))
    ));
    assert!(matches!(
        Mechanism::from_bytes(&bytes),
        Err(PhlexError::UnrecognizedReactionKind(9))
    ));
}

fn header_only(n_react: i32, n_prod: i32) -> Vec<u8> {
    [1i32, ReactionKind::Arrhenius.code(), n_react, n_prod]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

#[test]
fn test_overflowing_counts_are_malformed() {
    let bytes = header_only(i32::MAX, i32::MAX);
    for result in [
        Mechanism::record_lengths(&bytes).map(|_| ()),
        Mechanism::from_bytes(&bytes).map(|_| ()),
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, PhlexError::MalformedRecord { .. }));
        assert!(err.is_structural());
    }
}

#[test]
fn test_record_without_reactants_is_malformed() {
    let mut bytes = header_only(0, 1);
    // product index, one deriv id, seven parameters and one yield
    bytes.extend_from_slice(&2i32.to_le_bytes());
    bytes.extend_from_slice(&(-1i32).to_le_bytes());
    for _ in 0..8 {
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
    }
    assert!(matches!(
        Mechanism::from_bytes(&bytes),
        Err(PhlexError::MalformedRecord { .. })
    ));
    assert!(matches!(
        Mechanism::record_lengths(&bytes),
        Err(PhlexError::MalformedRecord { .. })
    ));
}

#[test]
fn test_empty_mechanism() {
    let mech = Mechanism::new();
    let bytes = mech.to_bytes();
    assert_eq!(bytes, 0i32.to_le_bytes().to_vec());
    assert!(Mechanism::from_bytes(&bytes).unwrap().is_empty());
    assert!(Mechanism::from_bytes(&[]).is_err());
}

#[test]
fn test_mass_conservation() {
    let map = StateMap::new(vec![VarType::Solved; 3]);
    let state = [2.0e-3, 5.0e-4, 1.0e-3];

    // A -> B: contributions cancel exactly
    let mut mech = Mechanism::new();
    mech.push(arrhenius(0.25, vec![0], vec![1], vec![1.0]));
    build_jacobian_template(&mut mech, &map).unwrap();
    mech.update_env_state(&unit_env());
    let mut deriv = [0.0; 3];
    mech.calc_deriv(&state, &mut deriv);
    assert_eq!(deriv.iter().sum::<f64>(), 0.0);
    assert_eq!(deriv[0], -0.25 * 2.0e-3);

    // A + B -> C: sum is rate · (1 − n_react)
    let mut mech = Mechanism::new();
    mech.push(arrhenius(3.0, vec![0, 1], vec![2], vec![1.0]));
    build_jacobian_template(&mut mech, &map).unwrap();
    mech.update_env_state(&unit_env());
    let rate = 3.0 * 2.0e-3 * 5.0e-4;
    let mut deriv = [0.0; 3];
    mech.calc_deriv(&state, &mut deriv);
    assert_relative_eq!(deriv.iter().sum::<f64>(), -rate, max_relative = 1e-12);
}

#[test]
fn test_declared_mask_covers_every_nonzero_partial() {
    let (mech, map, template) = prepared_mechanism();
    let n = map.n_dep_var();
    let mut rng = StdRng::seed_from_u64(42);
    for trial in 0..20 {
        let mut state: Vec<f64> = (0..map.n_state_var())
            .map(|_| rng.gen_range(0.0..1.0))
            .collect();
        // one reactant at exactly zero
        state[trial % n] = 0.0;

        let mut jac = vec![0.0; template.nnz()];
        mech.calc_jac(&state, &mut jac);
        assert!(jac.iter().all(|v| v.is_finite()));

        // central differences over every solved variable
        for col in 0..n {
            let i_spec = map.full_index(col).unwrap();
            let h = 1.0e-6;
            let mut plus = state.clone();
            plus[i_spec] += h;
            let mut minus = state.clone();
            minus[i_spec] -= h;
            let mut f_plus = vec![0.0; n];
            let mut f_minus = vec![0.0; n];
            mech.calc_deriv(&plus, &mut f_plus);
            mech.calc_deriv(&minus, &mut f_minus);
            for row in 0..n {
                let fd = (f_plus[row] - f_minus[row]) / (2.0 * h);
                match template.offset(row, col) {
                    Some(offset) => {
                        assert_relative_eq!(jac[offset], fd, epsilon = 1e-7, max_relative = 1e-6)
                    }
                    None => assert!(
                        fd.abs() < 1e-9,
                        "undeclared element ({}, {}) has partial {}",
                        row,
                        col,
                        fd
                    ),
                }
            }
        }
    }
}

#[test]
fn test_repeated_evaluation_is_bitwise_identical() {
    let (mech, map, template) = prepared_mechanism();
    let state = [1.0e-3, 2.0e-4, 3.0e-5, 4.0e-6, 0.21, 2.5];
    let mut first = vec![0.0; map.n_dep_var()];
    let mut second = vec![0.0; map.n_dep_var()];
    mech.calc_deriv(&state, &mut first);
    mech.calc_deriv(&state, &mut second);
    let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first), bits(&second));

    let mut jac_a = vec![0.0; template.nnz()];
    let mut jac_b = vec![0.0; template.nnz()];
    mech.calc_jac(&state, &mut jac_a);
    mech.calc_jac(&state, &mut jac_b);
    assert_eq!(bits(&jac_a), bits(&jac_b));
}

#[test]
fn test_update_data_routes_by_photo_id() {
    let mut mech = Mechanism::new();
    for photo_id in [3, 3, 4, 0] {
        let species = RxnSpecies::new(vec![0], vec![1], vec![1.0]).unwrap();
        mech.push(PhotolysisReaction::new(photo_id, 1.0, species));
    }
    mech.push(arrhenius(1.0, vec![0], vec![1], vec![1.0]));
    let update = |photo_id| UpdateData::PhotolysisRate {
        photo_id,
        base_rate: 0.5,
    };
    assert_eq!(mech.update_data(&update(3)), 2);
    assert_eq!(mech.update_data(&update(4)), 1);
    assert_eq!(mech.update_data(&update(0)), 0);
    mech.update_env_state(&EnvState::default());
    let k: Vec<f64> = mech.iter().map(|r| r.rate_constant()).collect();
    assert_eq!(k[..4], [0.5, 0.5, 0.5, 0.0]);
}

#[test]
fn test_out_of_range_species_index() {
    let mut mech = Mechanism::new();
    mech.push(arrhenius(1.0, vec![0], vec![6], vec![1.0]));
    assert!(matches!(
        mech.check_indices(6),
        Err(PhlexError::StateIndexOutOfRange { index: 6, .. })
    ));
    assert!(build_jacobian_template(&mut mech, &mixed_state_map()).is_err());
}

#[test]
fn test_table_lists_every_reaction() {
    let (mech, _, _) = prepared_mechanism();
    let names: Vec<String> = ["O3", "NO", "NO2", "O", "O2", "M"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let table = mech.table(Some(&names));
    assert_eq!(table.len(), mech.len() + 1);
    let text = table.to_string();
    assert!(text.contains("O3 + NO"));
    assert!(text.contains("0.8*O2"));
    assert!(text.contains("PHOTOLYSIS"));
}
