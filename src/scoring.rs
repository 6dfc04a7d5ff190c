// src/scoring.rs

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        attempt::SubmittedAnswer,
        question::{OptionLabel, Question},
    },
};

/// Outcome of grading one submission against an answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCard {
    pub correct_count: usize,
    pub total_questions: usize,
    /// Percentage, 0-100, rounded half up.
    pub score: i32,
    pub is_passed: bool,
}

/// Grades `answers` against the loaded questions.
///
/// A question counts as correct only when an answer with the same question id
/// selects the correct option. Answers for questions outside the key are ignored.
/// An empty key is a definition error and is reported as not found.
pub fn calculate_score(
    questions: &[Question],
    answers: &[SubmittedAnswer],
    passing_score: i32,
) -> Result<ScoreCard, AppError> {
    let total_questions = questions.len();
    if total_questions == 0 {
        return Err(AppError::NotFound("Assessment has no questions".to_string()));
    }

    let submitted: HashMap<i64, OptionLabel> = answers
        .iter()
        .map(|a| (a.question_id, a.selected_option))
        .collect();

    let correct_count = questions
        .iter()
        .filter(|q| submitted.get(&q.id) == Some(&q.correct_answer))
        .count();

    let score = percentage_half_up(correct_count, total_questions);

    Ok(ScoreCard {
        correct_count,
        total_questions,
        score,
        is_passed: score >= passing_score,
    })
}

/// `round(correct / total * 100)` with 0.5 rounding up, in integer arithmetic.
fn percentage_half_up(correct: usize, total: usize) -> i32 {
    let numerator = correct as u64 * 200 + total as u64;
    let denominator = 2 * total as u64;
    (numerator / denominator) as i32
}

/// Builds a shareable certificate code, e.g. `CERT-9F2C04A1B7E3`.
pub fn generate_certificate_code() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("CERT-{}", &raw[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(correct: &[OptionLabel]) -> Vec<Question> {
        correct
            .iter()
            .enumerate()
            .map(|(i, label)| Question {
                id: i as i64 + 1,
                assessment_id: 1,
                position: i as i32,
                question: format!("Question {}", i + 1),
                option_a: "a".to_string(),
                option_b: "b".to_string(),
                option_c: "c".to_string(),
                option_d: "d".to_string(),
                correct_answer: *label,
            })
            .collect()
    }

    fn answers(picks: &[(i64, OptionLabel)]) -> Vec<SubmittedAnswer> {
        picks
            .iter()
            .map(|(question_id, selected_option)| SubmittedAnswer {
                question_id: *question_id,
                selected_option: *selected_option,
            })
            .collect()
    }

    use OptionLabel::{A, B, C, D};

    #[test]
    fn test_calculate_score_perfect() {
        let questions = key(&[A, B, C, D]);
        let card = calculate_score(&questions, &answers(&[(1, A), (2, B), (3, C), (4, D)]), 100).unwrap();
        assert_eq!(card.correct_count, 4);
        assert_eq!(card.score, 100);
        assert!(card.is_passed);
    }

    #[test]
    fn test_calculate_score_zero() {
        let questions = key(&[A, B]);
        let card = calculate_score(&questions, &answers(&[(1, B), (2, A)]), 50).unwrap();
        assert_eq!(card.correct_count, 0);
        assert_eq!(card.score, 0);
        assert!(!card.is_passed);
    }

    #[test]
    fn test_three_of_four_passes_at_seventy_five() {
        let questions = key(&[A, B, C, D]);
        let card = calculate_score(&questions, &answers(&[(1, A), (2, B), (3, C), (4, A)]), 75).unwrap();
        assert_eq!(card.score, 75);
        assert!(card.is_passed);
    }

    #[test]
    fn test_two_of_four_fails_at_seventy_five() {
        let questions = key(&[A, B, C, D]);
        let card = calculate_score(&questions, &answers(&[(1, A), (2, B)]), 75).unwrap();
        assert_eq!(card.score, 50);
        assert!(!card.is_passed);
    }

    #[test]
    fn test_pass_boundary_is_inclusive() {
        // 74/100 fails, 75/100 passes.
        let labels = vec![A; 100];
        let questions = key(&labels);
        let picks: Vec<(i64, OptionLabel)> = (1..=74).map(|id| (id, A)).collect();
        let card = calculate_score(&questions, &answers(&picks), 75).unwrap();
        assert_eq!(card.score, 74);
        assert!(!card.is_passed);

        let picks: Vec<(i64, OptionLabel)> = (1..=75).map(|id| (id, A)).collect();
        let card = calculate_score(&questions, &answers(&picks), 75).unwrap();
        assert_eq!(card.score, 75);
        assert!(card.is_passed);
    }

    #[test]
    fn test_rounding_half_up() {
        // 1/8 = 12.5% -> 13, 1/3 = 33.3% -> 33, 2/3 = 66.7% -> 67
        assert_eq!(percentage_half_up(1, 8), 13);
        assert_eq!(percentage_half_up(1, 3), 33);
        assert_eq!(percentage_half_up(2, 3), 67);
        assert_eq!(percentage_half_up(0, 7), 0);
        assert_eq!(percentage_half_up(7, 7), 100);
    }

    #[test]
    fn test_unknown_and_missing_answers_are_incorrect() {
        let questions = key(&[A, B]);
        let card = calculate_score(&questions, &answers(&[(1, A), (99, B)]), 0).unwrap();
        assert_eq!(card.correct_count, 1);
        assert_eq!(card.score, 50);
    }

    #[test]
    fn test_empty_answer_key_is_rejected() {
        let err = calculate_score(&[], &answers(&[(1, A)]), 50).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_certificate_code_shape() {
        let code = generate_certificate_code();
        assert!(code.starts_with("CERT-"));
        assert_eq!(code.len(), 17);
        assert!(code[5..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(code, generate_certificate_code());
    }
}
