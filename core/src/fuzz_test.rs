use crate::encoding::{encode_string, padded_len, InitCode};
use crate::errors::FactoryError;
use crate::factory::{DeploymentFactory, FactoryConfig};
use crate::ledger::Ledger;
use crate::oracle::{AddressOracle, StateReader};
use crate::registry::{sort_tokens, CanonicalPairRegistry, UNISWAP_V2_PAIR_INIT_CODE_HASH};
use crate::verify::{DeploymentExpectation, Verifier};
use alloy_primitives::{address, Address, B256, U256};
use proptest::prelude::*;

const REGISTRY: Address = address!("5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c");
const REFERENCE: Address = address!("c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0");

fn any_address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]
    #[test]
    fn test_predict_is_deterministic_and_matches_alloy(
        deployer in any_address(),
        salt in any::<[u8; 32]>(),
        init in proptest::collection::vec(any::<u8>(), 1..256),
    ) {
        let init_code = InitCode::from_bytes(init.clone()).unwrap();
        let salt = B256::from(salt);

        let first = AddressOracle::predict(deployer, salt, &init_code);
        let second = AddressOracle::predict(deployer, salt, &init_code);
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, deployer.create2_from_code(salt.0, &init));
        prop_assert_eq!(
            AddressOracle::predict_raw(deployer.as_slice(), salt.as_slice(), &init).unwrap(),
            first
        );
    }

    #[test]
    fn test_salt_equal_iff_names_equal(a in "\\PC{1,40}", b in "\\PC{1,40}") {
        let same =
            AddressOracle::derive_salt(&a).unwrap() == AddressOracle::derive_salt(&b).unwrap();
        prop_assert_eq!(same, a == b);
    }

    #[test]
    fn test_encoded_string_length(s in ".{0,200}") {
        let encoded = encode_string(&s).unwrap();
        prop_assert_eq!(encoded.len(), 64 + padded_len(s.len()));
        prop_assert_eq!(encoded.len() % 32, 0);
    }

    #[test]
    fn test_pair_ordering(a in any_address(), b in any_address()) {
        prop_assume!(a != b);
        let (token0, token1) = sort_tokens(a, b);
        prop_assert!(token0 < token1);
        prop_assert_eq!(sort_tokens(b, a), (token0, token1));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn test_deploy_then_verify(
        name in "[A-Za-z][A-Za-z0-9 ]{0,31}",
        symbol in "[A-Z]{1,8}",
        supply in any::<u128>(),
        originator in any_address(),
    ) {
        let mut ledger = Ledger::new();
        let registry =
            CanonicalPairRegistry::install(&mut ledger, REGISTRY, UNISWAP_V2_PAIR_INIT_CODE_HASH)
                .unwrap();
        let factory = DeploymentFactory::deploy(
            &mut ledger,
            Address::repeat_byte(0x0f),
            registry,
            FactoryConfig::new(REFERENCE),
        )
        .unwrap();
        let supply = U256::from(supply);

        let expectation =
            DeploymentExpectation::for_factory(&factory, &name, &symbol, supply, originator);
        let predicted = expectation.predict().unwrap();
        prop_assert!(!ledger.has_code(predicted));

        let outcome = factory
            .deploy_new_token(&mut ledger, originator, &name, &symbol, supply)
            .unwrap();
        prop_assert_eq!(outcome.token_address, predicted);

        let report = Verifier::new()
            .verify(&expectation, ledger.state(), &outcome.receipt)
            .unwrap();
        prop_assert!(report.is_clean(), "{:?}", report.violations);

        let again = factory.deploy_new_token(&mut ledger, originator, &name, &symbol, supply);
        let occupied = matches!(again, Err(FactoryError::AddressOccupied { .. }));
        prop_assert!(occupied);
    }
}
