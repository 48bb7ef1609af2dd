//! State machine transition validation for the AEC lifecycle.

use crate::status::AecStatus;

/// Returns `true` if the lifecycle transition from `from` to `to` is valid.
///
/// The only edge back into [`AecStatus::Draft`] leaves
/// [`AecStatus::SuspendedFindings`] (the "edit" decision); every other edge
/// moves forward.
#[must_use]
pub fn can_transition(from: AecStatus, to: AecStatus) -> bool {
    matches!(
        (from, to),
        (AecStatus::Draft, AecStatus::Generating)
            | (AecStatus::Draft, AecStatus::Failed)
            | (AecStatus::Generating, AecStatus::SuspendedFindings)
            | (AecStatus::Generating, AecStatus::SuspendedQuestions)
            | (AecStatus::Generating, AecStatus::Ready)
            | (AecStatus::Generating, AecStatus::Failed)
            | (AecStatus::SuspendedFindings, AecStatus::Generating)
            | (AecStatus::SuspendedFindings, AecStatus::Draft)
            | (AecStatus::SuspendedFindings, AecStatus::Failed)
            | (AecStatus::SuspendedQuestions, AecStatus::Generating)
            | (AecStatus::SuspendedQuestions, AecStatus::Failed)
            | (AecStatus::Ready, AecStatus::Done)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AecStatus::Draft, AecStatus::Generating)]
    #[case(AecStatus::Generating, AecStatus::SuspendedFindings)]
    #[case(AecStatus::Generating, AecStatus::SuspendedQuestions)]
    #[case(AecStatus::Generating, AecStatus::Ready)]
    #[case(AecStatus::SuspendedFindings, AecStatus::Generating)]
    #[case(AecStatus::SuspendedFindings, AecStatus::Draft)]
    #[case(AecStatus::SuspendedQuestions, AecStatus::Generating)]
    #[case(AecStatus::SuspendedQuestions, AecStatus::Failed)]
    #[case(AecStatus::Ready, AecStatus::Done)]
    fn valid_transitions(#[case] from: AecStatus, #[case] to: AecStatus) {
        assert!(can_transition(from, to));
    }

    #[rstest]
    #[case(AecStatus::Draft, AecStatus::Ready)]
    #[case(AecStatus::Draft, AecStatus::Draft)]
    #[case(AecStatus::Generating, AecStatus::Draft)]
    #[case(AecStatus::SuspendedQuestions, AecStatus::Draft)]
    #[case(AecStatus::SuspendedFindings, AecStatus::SuspendedQuestions)]
    #[case(AecStatus::Ready, AecStatus::Failed)]
    #[case(AecStatus::Failed, AecStatus::Generating)]
    #[case(AecStatus::Done, AecStatus::Draft)]
    fn invalid_transitions(#[case] from: AecStatus, #[case] to: AecStatus) {
        assert!(!can_transition(from, to));
    }

    #[test]
    fn draft_is_reachable_only_from_findings_review() {
        let all = [
            AecStatus::Draft,
            AecStatus::Generating,
            AecStatus::SuspendedFindings,
            AecStatus::SuspendedQuestions,
            AecStatus::Ready,
            AecStatus::Done,
            AecStatus::Failed,
        ];
        let sources: Vec<_> = all
            .into_iter()
            .filter(|&from| can_transition(from, AecStatus::Draft))
            .collect();
        assert_eq!(sources, vec![AecStatus::SuspendedFindings]);
    }

    #[test]
    fn terminal_states_only_leave_ready_for_done() {
        for from in [AecStatus::Done, AecStatus::Failed] {
            for to in [AecStatus::Draft, AecStatus::Generating, AecStatus::Ready] {
                assert!(!can_transition(from, to), "{from} -> {to}");
            }
        }
    }
}
