//! Answer checking.
//!
//! Shape validation and grading are separate: a submission with the wrong
//! shape for its question is rejected outright, while a well-shaped but
//! wrong answer is accepted and scored zero. A question whose canonical
//! answer is empty or doesn't fit its kind can never be answered
//! correctly.

use std::collections::BTreeSet;

use quizlive_protocol::{AnswerPayload, CorrectAnswer, Question, QuestionKind};

use crate::RoomError;

/// Checks that `answer` has the shape the question kind expects.
///
/// # Errors
/// [`RoomError::InvalidPayload`] on a mismatch.
pub fn check_shape(kind: QuestionKind, answer: &AnswerPayload) -> Result<(), RoomError> {
    let fits = match kind {
        QuestionKind::SingleChoice | QuestionKind::TrueFalse => {
            matches!(answer, AnswerPayload::Choice(_))
        }
        QuestionKind::MultiSelect => matches!(answer, AnswerPayload::Choices(_)),
        QuestionKind::FreeText => matches!(answer, AnswerPayload::Text(_)),
        QuestionKind::FillBlank => matches!(answer, AnswerPayload::Blanks(_)),
        QuestionKind::Ordering => matches!(answer, AnswerPayload::Sequence(_)),
        QuestionKind::Pairing => matches!(answer, AnswerPayload::Pairs(_)),
        // Graded as wrong, but not the player's fault.
        QuestionKind::Unsupported => true,
    };
    if fits {
        Ok(())
    } else {
        Err(RoomError::InvalidPayload(format!(
            "answer shape does not match a {kind:?} question"
        )))
    }
}

/// Grades an answer against the question's canonical answer.
pub fn is_correct(question: &Question, answer: &AnswerPayload) -> bool {
    use AnswerPayload as A;
    use CorrectAnswer as C;
    use QuestionKind as K;

    match (question.kind, &question.correct, answer) {
        (K::SingleChoice | K::TrueFalse, C::Choices(canon), A::Choice(picked)) => {
            let picked = picked.trim();
            !picked.is_empty() && canon.iter().any(|c| c.trim() == picked)
        }
        (K::MultiSelect, C::Choices(canon), A::Choices(picked)) => {
            let canon = index_set(canon);
            !canon.is_empty() && canon == index_set(picked)
        }
        (K::FreeText, C::Text(canon), A::Text(given)) => {
            let canon = fold(canon);
            !canon.is_empty() && canon == fold(given)
        }
        (K::FillBlank, C::Blanks(canon), A::Blanks(given)) => {
            !canon.is_empty()
                && canon.len() == given.len()
                && canon.iter().zip(given).all(|(c, g)| {
                    let c = fold(c);
                    !c.is_empty() && c == fold(g)
                })
        }
        (K::Ordering, C::Sequence(canon), A::Sequence(given)) => {
            !canon.is_empty() && canon == given
        }
        (K::Pairing, C::Pairs(canon), A::Pairs(given)) => {
            !canon.is_empty()
                && canon.iter().all(|(left, right)| {
                    given
                        .get(left)
                        .is_some_and(|g| g.trim() == right.trim())
                })
        }
        _ => false,
    }
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

fn index_set(indices: &[String]) -> BTreeSet<&str> {
    indices
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use quizlive_protocol::QuestionId;

    fn question(kind: QuestionKind, correct: CorrectAnswer) -> Question {
        Question {
            id: QuestionId(1),
            position: 0,
            prompt: "?".into(),
            media: None,
            kind,
            options: vec![],
            correct,
            time_limit_secs: None,
            points: 1000,
            explanation: None,
        }
    }

    fn choices(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // =====================================================================
    // check_shape
    // =====================================================================

    #[test]
    fn test_check_shape_accepts_matching_payload() {
        assert!(check_shape(QuestionKind::SingleChoice, &AnswerPayload::Choice("1".into())).is_ok());
        assert!(check_shape(QuestionKind::Pairing, &AnswerPayload::Pairs(BTreeMap::new())).is_ok());
    }

    #[test]
    fn test_check_shape_rejects_mismatched_payload() {
        let err = check_shape(QuestionKind::FreeText, &AnswerPayload::Choice("1".into()))
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidPayload(_)));
    }

    #[test]
    fn test_check_shape_unsupported_kind_accepts_anything() {
        assert!(check_shape(QuestionKind::Unsupported, &AnswerPayload::Text("x".into())).is_ok());
    }

    // =====================================================================
    // is_correct
    // =====================================================================

    #[test]
    fn test_single_choice_membership() {
        let q = question(QuestionKind::SingleChoice, CorrectAnswer::Choices(choices(&["2"])));
        assert!(is_correct(&q, &AnswerPayload::Choice("2".into())));
        assert!(is_correct(&q, &AnswerPayload::Choice(" 2 ".into())));
        assert!(!is_correct(&q, &AnswerPayload::Choice("1".into())));
    }

    #[test]
    fn test_true_false_uses_choice_rules() {
        let q = question(QuestionKind::TrueFalse, CorrectAnswer::Choices(choices(&["0"])));
        assert!(is_correct(&q, &AnswerPayload::Choice("0".into())));
    }

    #[test]
    fn test_multi_select_requires_exact_set() {
        let q = question(QuestionKind::MultiSelect, CorrectAnswer::Choices(choices(&["0", "3"])));
        assert!(is_correct(&q, &AnswerPayload::Choices(choices(&["3", "0"]))));
        assert!(!is_correct(&q, &AnswerPayload::Choices(choices(&["0"]))));
        assert!(!is_correct(&q, &AnswerPayload::Choices(choices(&["0", "1", "3"]))));
    }

    #[test]
    fn test_free_text_trimmed_case_insensitive() {
        let q = question(QuestionKind::FreeText, CorrectAnswer::Text("Paris".into()));
        assert!(is_correct(&q, &AnswerPayload::Text("  pARIS ".into())));
        assert!(!is_correct(&q, &AnswerPayload::Text("Lyon".into())));
    }

    #[test]
    fn test_fill_blank_positional() {
        let q = question(
            QuestionKind::FillBlank,
            CorrectAnswer::Blanks(choices(&["red", "blue"])),
        );
        assert!(is_correct(&q, &AnswerPayload::Blanks(choices(&["Red", " BLUE"]))));
        assert!(!is_correct(&q, &AnswerPayload::Blanks(choices(&["blue", "red"]))));
        assert!(!is_correct(&q, &AnswerPayload::Blanks(choices(&["red"]))));
    }

    #[test]
    fn test_ordering_positional() {
        let q = question(QuestionKind::Ordering, CorrectAnswer::Sequence(vec![2, 0, 1]));
        assert!(is_correct(&q, &AnswerPayload::Sequence(vec![2, 0, 1])));
        assert!(!is_correct(&q, &AnswerPayload::Sequence(vec![0, 1, 2])));
    }

    #[test]
    fn test_pairing_ignores_extra_keys() {
        let canon = BTreeMap::from([("H".to_string(), "Hydrogen".to_string())]);
        let q = question(QuestionKind::Pairing, CorrectAnswer::Pairs(canon));
        let given = BTreeMap::from([
            ("H".to_string(), "Hydrogen".to_string()),
            ("O".to_string(), "Gold".to_string()),
        ]);
        assert!(is_correct(&q, &AnswerPayload::Pairs(given)));

        let wrong = BTreeMap::from([("H".to_string(), "Helium".to_string())]);
        assert!(!is_correct(&q, &AnswerPayload::Pairs(wrong)));
    }

    #[test]
    fn test_empty_canonical_answer_is_never_correct() {
        let q = question(QuestionKind::FreeText, CorrectAnswer::Text("  ".into()));
        assert!(!is_correct(&q, &AnswerPayload::Text("".into())));

        let q = question(QuestionKind::MultiSelect, CorrectAnswer::Choices(vec![]));
        assert!(!is_correct(&q, &AnswerPayload::Choices(vec![])));
    }

    #[test]
    fn test_canonical_shape_mismatch_is_never_correct() {
        let q = question(QuestionKind::SingleChoice, CorrectAnswer::Text("1".into()));
        assert!(!is_correct(&q, &AnswerPayload::Choice("1".into())));
    }

    #[test]
    fn test_unsupported_kind_is_never_correct() {
        let q = question(QuestionKind::Unsupported, CorrectAnswer::Text("x".into()));
        assert!(!is_correct(&q, &AnswerPayload::Text("x".into())));
    }
}
