//! Property tests for command rendering

use std::collections::BTreeSet;

use hostrun_core::{Command, Controls, OptionsPlace, format, shell_quote};
use proptest::prelude::*;

// ========== Strategies ==========

fn arb_word() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}"
}

fn arb_words() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_word(), 0..5)
}

/// Distinct single-letter option names
fn arb_flags() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-z]", 0..5)
}

fn bare_controls(place: OptionsPlace) -> Controls {
    Controls {
        options_place: place,
        locale: String::new(),
        ..Controls::default()
    }
}

fn command_with(base: &str, positional: &[String], flags: &BTreeSet<String>) -> Command {
    let mut command = Command::new(base).args(positional.iter().cloned());
    for flag in flags {
        command = command.opt(flag.clone(), true);
    }
    command
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn rendering_is_deterministic(
        base in arb_word(),
        args in prop::collection::vec(any::<String>(), 0..4),
        locale in "[A-Za-z_.0-9-]{0,12}",
        escape in any::<bool>(),
    ) {
        let controls = Controls {
            locale,
            escape_args: escape,
            ..Controls::default()
        };
        let command = Command::new(base).args(args);
        prop_assert_eq!(format(&command, &controls), format(&command, &controls));
    }

    #[test]
    fn placement_moves_positionals_only(
        base in arb_word(),
        positional in arb_words(),
        flags in arb_flags(),
    ) {
        let command = command_with(&base, &positional, &flags);
        let flag_tokens: Vec<String> = flags.iter().map(|f| format!("-{f}")).collect();

        let before = format(&command, &bare_controls(OptionsPlace::Before)).line;
        let mut expected: Vec<String> = vec![base.clone()];
        expected.extend(flag_tokens.iter().cloned());
        expected.extend(positional.iter().cloned());
        prop_assert_eq!(before, expected.join(" "));

        let after = format(&command, &bare_controls(OptionsPlace::After)).line;
        let mut expected: Vec<String> = vec![base];
        expected.extend(positional.iter().cloned());
        expected.extend(flag_tokens);
        prop_assert_eq!(after, expected.join(" "));
    }

    #[test]
    fn false_flags_are_omitted(base in arb_word(), flags in arb_flags()) {
        let mut command = Command::new(base.clone());
        for flag in &flags {
            command = command.opt(flag.clone(), false);
        }
        prop_assert_eq!(format(&command, &bare_controls(OptionsPlace::Before)).line, base);
    }

    #[test]
    fn list_values_repeat_the_flag(
        name in "[a-z]{2,8}",
        values in prop::collection::vec("[a-z0-9]{1,5}", 1..5),
    ) {
        let command = Command::new("cmd").opt(name.clone(), values.clone());
        let line = format(&command, &bare_controls(OptionsPlace::Before)).line;
        let expected: Vec<String> = values.iter().map(|v| format!("--{name} {v}")).collect();
        prop_assert_eq!(line, format!("cmd {}", expected.join(" ")));
    }

    #[test]
    fn escaped_positional_is_one_quoted_word(arg in any::<String>()) {
        let command = Command::new("echo").arg(arg.clone());
        let line = format(&command, &bare_controls(OptionsPlace::Before)).line;
        prop_assert_eq!(line, format!("echo {}", shell_quote(&arg)));
    }

    #[test]
    fn locale_prefixes_every_variable(locale in "[A-Za-z][A-Za-z_.0-9-]{0,10}", base in arb_word()) {
        let controls = Controls {
            locale: locale.clone(),
            ..Controls::default()
        };
        let line = format(&Command::new(base.clone()), &controls).line;
        prop_assert_eq!(
            line,
            format!("LANG={locale} LANGUAGE={locale} LC_ALL={locale} {base}")
        );
    }
}
