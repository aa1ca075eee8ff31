//! Property tests for the permitted-transitions table. No database is
//! involved — `PaymentStatus::can_transition_to` is pure.

use gateway_orchestrator::domain::payment::{decide_transition, PaymentStatus};
use gateway_orchestrator::domain::payment::PaymentStatus::*;
use proptest::prelude::*;

fn any_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(Pending),
        Just(Authorized),
        Just(Failed),
        Just(Canceled),
        Just(Refunded),
        Just(ToConfirm),
        Just(Abandoned),
    ]
}

const ALLOWED: &[(PaymentStatus, PaymentStatus)] = &[
    (Pending, Authorized),
    (Pending, Failed),
    (Pending, Canceled),
    (Pending, ToConfirm),
    (Pending, Abandoned),
    (Authorized, Failed),
    (Authorized, Refunded),
    (Failed, Authorized),
];

proptest! {
    #[test]
    fn transitions_match_the_permitted_table(from in any_status(), to in any_status()) {
        let expected = ALLOWED.contains(&(from, to));
        prop_assert_eq!(from.can_transition_to(&to), expected);
    }

    #[test]
    fn no_status_ever_transitions_to_itself(s in any_status()) {
        prop_assert!(!s.can_transition_to(&s));
    }

    #[test]
    fn decide_transition_allowed_flag_mirrors_can_transition_to(from in any_status(), to in any_status()) {
        let outcome = decide_transition(from, to, false);
        prop_assert_eq!(outcome.allowed, from.can_transition_to(&to));
    }

    #[test]
    fn disallowed_transitions_never_set_any_timestamp_flag(from in any_status(), to in any_status()) {
        prop_assume!(!from.can_transition_to(&to));
        let outcome = decide_transition(from, to, false);
        prop_assert!(!outcome.sets_first_authorized_at);
        prop_assert!(!outcome.sets_failed_at);
        prop_assert!(!outcome.sets_canceled_at);
        prop_assert!(!outcome.sets_refunded_at);
        prop_assert!(!outcome.completes_order);
    }

    #[test]
    fn first_authorized_at_never_sets_twice(from in any_status()) {
        let outcome = decide_transition(from, PaymentStatus::Authorized, true);
        prop_assert!(!outcome.sets_first_authorized_at);
    }

}

proptest! {
    #![proptest_config(ProptestConfig { max_global_rejects: 8192, ..ProptestConfig::default() })]
    #[test]
    fn exactly_one_timestamp_flag_set_on_an_allowed_transition(from in any_status(), to in any_status()) {
        prop_assume!(from.can_transition_to(&to));
        let outcome = decide_transition(from, to, false);
        let flags = [
            outcome.sets_first_authorized_at,
            outcome.sets_failed_at,
            outcome.sets_canceled_at,
            outcome.sets_refunded_at,
        ];
        prop_assert!(flags.iter().filter(|f| **f).count() <= 1);
    }
}

#[test]
fn terminal_statuses_have_no_outgoing_transitions_except_the_dispute_edges() {
    use PaymentStatus::*;
    for terminal in [Canceled, Refunded] {
        for target in [Pending, Authorized, Failed, Canceled, Refunded, ToConfirm, Abandoned] {
            assert!(!terminal.can_transition_to(&target), "{terminal:?} -> {target:?} should be rejected");
        }
    }
    // Authorized and Failed are the two terminal states that keep a
    // dispute-driven edge back into each other.
    assert!(Authorized.can_transition_to(&Failed));
    assert!(Failed.can_transition_to(&Authorized));
}
