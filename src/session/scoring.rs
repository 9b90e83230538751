//! Submission grading: correctness by exact option-set match, points with a time bonus.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{error::ServiceError, session::Question};

/// Tunable scoring parameters, loaded from the application configuration.
#[derive(Debug, Clone)]
pub struct ScoringRules {
    /// Flat points awarded for a correct answer.
    pub base_points: u32,
    /// Extra points per second left on the clock when answering correctly.
    pub bonus_rate: f64,
    /// Slack beyond the question time limit still accepted as a valid `time_spent`.
    pub grace_window_secs: f64,
}

/// Outcome of grading a single submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    /// Whether the selected option set exactly matched the correct set.
    pub correct: bool,
    /// Points awarded, zero for an incorrect answer.
    pub points: u32,
}

/// Validate the raw submission input before any session state is touched.
///
/// Rejects an empty selection and a `time_spent` outside
/// `[0, time_limit + grace_window]`.
pub fn validate_submission(
    question: &Question,
    selected_options: &[Uuid],
    time_spent: f64,
    rules: &ScoringRules,
) -> Result<(), ServiceError> {
    if selected_options.is_empty() {
        return Err(ServiceError::InvalidInput(
            "at least one option must be selected".into(),
        ));
    }

    let upper = f64::from(question.time_limit_secs) + rules.grace_window_secs;
    if !time_spent.is_finite() || time_spent < 0.0 || time_spent > upper {
        return Err(ServiceError::InvalidInput(format!(
            "time spent {time_spent:.2}s is outside the accepted range [0, {upper:.2}]"
        )));
    }

    Ok(())
}

/// Grade a submission against the current question.
///
/// A submission is correct iff the selected set equals the correct set
/// exactly. Time spent is clamped into `[0, time_limit]` before the bonus is
/// computed so grace-window overshoot never inflates or negates the bonus.
pub fn score_submission(
    question: &Question,
    selected_options: &[Uuid],
    time_spent: f64,
    rules: &ScoringRules,
) -> ScoreOutcome {
    let selected: HashSet<Uuid> = selected_options.iter().copied().collect();
    let correct = selected == question.correct_option_ids();

    let points = if correct {
        let limit = f64::from(question.time_limit_secs);
        let clamped = time_spent.clamp(0.0, limit);
        let bonus = ((limit - clamped) * rules.bonus_rate).max(0.0).floor() as u32;
        rules.base_points + bonus
    } else {
        0
    };

    ScoreOutcome { correct, points }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AnswerOption;

    fn rules() -> ScoringRules {
        ScoringRules {
            base_points: 100,
            bonus_rate: 2.0,
            grace_window_secs: 2.0,
        }
    }

    fn question() -> Question {
        Question {
            id: Uuid::new_v4(),
            text: "capital of Peru?".into(),
            options: vec![
                AnswerOption {
                    id: Uuid::new_v4(),
                    text: "Lima".into(),
                    correct: true,
                },
                AnswerOption {
                    id: Uuid::new_v4(),
                    text: "Quito".into(),
                    correct: false,
                },
            ],
            time_limit_secs: 30,
        }
    }

    fn correct_ids(question: &Question) -> Vec<Uuid> {
        question.correct_option_ids().into_iter().collect()
    }

    #[test]
    fn correct_answer_earns_base_plus_time_bonus() {
        let question = question();
        let outcome = score_submission(&question, &correct_ids(&question), 10.0, &rules());
        assert!(outcome.correct);
        assert_eq!(outcome.points, 140);
    }

    #[test]
    fn instant_answer_earns_full_bonus() {
        let question = question();
        let outcome = score_submission(&question, &correct_ids(&question), 0.0, &rules());
        assert_eq!(outcome.points, 160);
    }

    #[test]
    fn incorrect_answer_earns_nothing() {
        let question = question();
        let wrong = vec![question.options[1].id];
        let outcome = score_submission(&question, &wrong, 5.0, &rules());
        assert!(!outcome.correct);
        assert_eq!(outcome.points, 0);
    }

    #[test]
    fn partial_selection_is_not_correct() {
        let mut question = question();
        question.options[1].correct = true;
        let partial = vec![question.options[0].id];
        let outcome = score_submission(&question, &partial, 0.0, &rules());
        assert!(!outcome.correct);

        let superset = vec![question.options[0].id, question.options[1].id];
        let outcome = score_submission(&question, &superset, 0.0, &rules());
        assert!(outcome.correct);
    }

    #[test]
    fn grace_window_overshoot_cannot_inflate_the_bonus() {
        let question = question();
        let outcome = score_submission(&question, &correct_ids(&question), 31.5, &rules());
        assert!(outcome.correct);
        assert_eq!(outcome.points, 100);
    }

    #[test]
    fn time_spent_outside_the_grace_window_is_rejected() {
        let question = question();
        let ids = correct_ids(&question);
        assert!(validate_submission(&question, &ids, 32.5, &rules()).is_err());
        assert!(validate_submission(&question, &ids, -0.1, &rules()).is_err());
        assert!(validate_submission(&question, &ids, f64::NAN, &rules()).is_err());
        assert!(validate_submission(&question, &ids, 31.9, &rules()).is_ok());
    }

    #[test]
    fn empty_selection_is_rejected() {
        let question = question();
        let err = validate_submission(&question, &[], 1.0, &rules()).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}
