//! Property tests: any generated KEL survives serialization and import.

use proptest::prelude::*;

use keri_kernel::core::serialize_stream;
use keri_kernel_testkit::generators::{kel_from_params, KelParams};
use keri_kernel_testkit::memory_kernel;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_imported_kel_matches_source(params: KelParams) {
        let kel = kel_from_params(&params);
        let bodies: Vec<_> = kel.events().iter().map(|e| e.to_value()).collect();
        let stream = serialize_stream(&bodies).unwrap();

        let (report, state) = runtime().block_on(async {
            let kernel = memory_kernel();
            let report = kernel.import(&stream).await.unwrap();
            let state = kernel.key_state(kel.prefix().unwrap()).await.unwrap();
            (report, state)
        });

        prop_assert!(report.is_success());
        prop_assert_eq!(report.accepted, kel.len());
        prop_assert_eq!(&state, kel.state().unwrap());
    }

    #[test]
    fn test_leading_events_import_alone(params in any::<KelParams>(), cut in 0usize..8) {
        let kel = kel_from_params(&params);
        let keep = cut.min(kel.len());
        let bodies: Vec<_> = kel.events()[..keep].iter().map(|e| e.to_value()).collect();
        let stream = serialize_stream(&bodies).unwrap();

        let accepted = runtime().block_on(async {
            let kernel = memory_kernel();
            kernel.import(&stream).await.unwrap().accepted
        });
        prop_assert_eq!(accepted, keep);
    }
}
