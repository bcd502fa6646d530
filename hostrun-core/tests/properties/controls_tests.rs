//! Property tests for the control mapping and scoped overrides

use hostrun_core::controls::CONTROL_NAMES;
use hostrun_core::{ControlValue, Controls, Scoped};
use proptest::prelude::*;

fn arb_controls() -> impl Strategy<Value = Controls> {
    (
        "[A-Za-z_.0-9-]{0,10}",
        0u64..600,
        any::<bool>(),
        prop::option::of("[a-z]{1,6}"),
    )
        .prop_map(|(locale, timeout, escape_args, shell)| Controls {
            locale,
            timeout,
            escape_args,
            shell,
            ..Controls::default()
        })
}

/// Opens one scope per value, innermost last, checking each level on the way
/// back out
fn nest(controls: &mut Controls, timeouts: &[u64]) {
    let Some((first, rest)) = timeouts.split_first() else {
        return;
    };
    let outside = controls.clone();
    {
        let mut scope = Scoped::new(controls, [("timeout", *first)]).unwrap();
        assert_eq!(scope.timeout, *first);
        assert_eq!(scope.saved(), &outside);
        nest(&mut scope, rest);
        assert_eq!(scope.timeout, *first);
    }
    assert_eq!(*controls, outside);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn nested_scopes_restore_every_level(
        start in arb_controls(),
        timeouts in prop::collection::vec(0u64..1000, 0..6),
    ) {
        let mut controls = start.clone();
        nest(&mut controls, &timeouts);
        prop_assert_eq!(controls, start);
    }

    #[test]
    fn failed_override_changes_nothing(start in arb_controls(), timeout in 1u64..1000) {
        let mut controls = start.clone();
        let overrides: [(&str, ControlValue); 2] = [
            ("timeout", timeout.into()),
            ("escape_args", "not a bool".into()),
        ];
        prop_assert!(Scoped::new(&mut controls, overrides).is_err());
        prop_assert_eq!(controls, start);
    }

    #[test]
    fn unknown_names_are_rejected(name in "[a-z_]{1,12}") {
        prop_assume!(!CONTROL_NAMES.contains(&name.as_str()));
        let mut controls = Controls::default();
        prop_assert!(controls.get(&name).is_err());
        prop_assert!(controls.set(&name, "x").is_err());
        prop_assert_eq!(controls, Controls::default());
    }

    #[test]
    fn timeout_accepts_numbers_and_text(timeout in any::<u64>()) {
        let mut controls = Controls::default();
        controls.set("timeout", timeout).unwrap();
        prop_assert_eq!(controls.timeout, timeout);
        controls.set("timeout", timeout.to_string()).unwrap();
        prop_assert_eq!(controls.get("timeout").unwrap(), ControlValue::Number(timeout));
    }

    #[test]
    fn toml_round_trip(controls in arb_controls()) {
        let text = toml::to_string(&controls).unwrap();
        let back: Controls = toml::from_str(&text).unwrap();
        prop_assert_eq!(back, controls);
    }
}
