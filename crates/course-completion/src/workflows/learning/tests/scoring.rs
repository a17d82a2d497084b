use super::common::*;
use crate::workflows::learning::domain::{CorrectAnswer, QuestionKind, SubmittedAnswer, UserAnswer};
use crate::workflows::learning::scoring::{percentage, ScoringEngine};

fn short_answer(allow_partial_credit: bool, case_sensitive: bool) -> QuestionKind {
    QuestionKind::ShortAnswer {
        correct: "The Sun".to_string(),
        case_sensitive,
        keywords: vec!["sun".to_string(), "light".to_string()],
        allow_partial_credit,
    }
}

fn choices(values: &[&str]) -> UserAnswer {
    UserAnswer::Choices(values.iter().map(|value| value.to_string()).collect())
}

#[test]
fn weighted_score_drives_pass_while_raw_score_is_informational() {
    let questions = vec![
        multiple_choice("q1", 10, 1.0, "B"),
        multiple_choice("q2", 10, 2.0, "C"),
    ];
    let answers = vec![answer("q1", "B"), answer("q2", "A")];

    let outcome = ScoringEngine::new().grade(&questions, &answers);

    assert_eq!(outcome.earned_points, 10);
    assert_eq!(outcome.total_points, 20);
    assert_eq!(outcome.raw_score, 50);
    assert_eq!(outcome.score, 33);
    assert!((outcome.total_weighted_points - 30.0).abs() < f64::EPSILON);
    assert!(!outcome.passed(50));
    assert!(outcome.passed(33));
}

#[test]
fn short_answer_awards_keyword_partial_credit() {
    let questions = vec![question("q-sun", 10, 1.0, short_answer(true, false))];
    let answers = vec![answer("q-sun", "the SUN gives heat")];

    let outcome = ScoringEngine::new().grade(&questions, &answers);
    let graded = &outcome.answers[0];

    assert_eq!(graded.points_earned, 5);
    assert!(!graded.is_correct);
    assert!((graded.partial_credit - 0.5).abs() < f64::EPSILON);
    assert_eq!(outcome.score, 50);
}

#[test]
fn short_answer_exact_match_ignores_case_and_whitespace() {
    let questions = vec![question("q-sun", 10, 1.0, short_answer(false, false))];
    let answers = vec![answer("q-sun", "  the sun ")];

    let outcome = ScoringEngine::new().grade(&questions, &answers);

    assert!(outcome.answers[0].is_correct);
    assert_eq!(outcome.answers[0].points_earned, 10);
}

#[test]
fn case_sensitive_short_answer_rejects_wrong_casing() {
    let questions = vec![question("q-sun", 10, 1.0, short_answer(false, true))];
    let answers = vec![answer("q-sun", "the sun")];

    let outcome = ScoringEngine::new().grade(&questions, &answers);

    assert_eq!(outcome.answers[0].points_earned, 0);
    assert_eq!(outcome.score, 0);
}

#[test]
fn multi_select_requires_the_exact_set() {
    let kind = QuestionKind::MultipleChoice {
        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct: CorrectAnswer::Set(vec!["a".into(), "c".into()]),
    };
    let questions = vec![question("q-set", 10, 1.0, kind)];
    let engine = ScoringEngine::new();

    let grade = |given: UserAnswer| {
        let answers = vec![SubmittedAnswer {
            question_id: question_id("q-set"),
            answer: given,
        }];
        engine.grade(&questions, &answers).answers[0].points_earned
    };

    assert_eq!(grade(choices(&["c", "a"])), 10);
    assert_eq!(grade(choices(&["a"])), 0);
    assert_eq!(grade(choices(&["a", "c", "d"])), 0);
    assert_eq!(grade(choices(&["a", "a"])), 0);
}

#[test]
fn true_false_matches_textual_boolean() {
    let questions = vec![true_false("q-tf", 5, 1.0, false)];

    let right = ScoringEngine::new().grade(&questions, &[answer("q-tf", "false")]);
    let wrong = ScoringEngine::new().grade(&questions, &[answer("q-tf", "true")]);

    assert_eq!(right.score, 100);
    assert_eq!(wrong.score, 0);
}

#[test]
fn manual_questions_count_against_the_denominator() {
    let questions = vec![
        multiple_choice("q-auto", 10, 1.0, "A"),
        question("q-essay", 10, 1.0, QuestionKind::Essay),
    ];
    let answers = vec![answer("q-auto", "A"), answer("q-essay", "long form")];

    let outcome = ScoringEngine::new().grade(&questions, &answers);

    assert_eq!(outcome.score, 50);
    assert_eq!(outcome.answers[1].points_earned, 0);
}

#[test]
fn quiz_of_only_manual_questions_cannot_pass() {
    let questions = vec![
        question("q-essay", 10, 1.0, QuestionKind::Essay),
        question(
            "q-order",
            10,
            1.0,
            QuestionKind::Ordering {
                items: vec!["first".into(), "second".into()],
            },
        ),
    ];
    let answers = vec![answer("q-essay", "text"), answer("q-order", "first")];

    let outcome = ScoringEngine::new().grade(&questions, &answers);

    assert_eq!(outcome.score, 0);
    assert!(!outcome.passed(1));
}

#[test]
fn unanswered_questions_earn_nothing_and_first_duplicate_wins() {
    let questions = vec![
        multiple_choice("q1", 10, 1.0, "B"),
        multiple_choice("q2", 10, 1.0, "C"),
    ];
    let answers = vec![answer("q1", "B"), answer("q1", "D")];

    let outcome = ScoringEngine::new().grade(&questions, &answers);

    assert_eq!(outcome.answers[0].points_earned, 10);
    assert_eq!(outcome.answers[1].user_answer, None);
    assert_eq!(outcome.raw_score, 50);
}

#[test]
fn percentage_of_an_empty_quiz_is_zero() {
    assert_eq!(percentage(0.0, 0.0), 0);
    assert_eq!(percentage(2.0, 3.0), 67);
    assert_eq!(ScoringEngine::new().grade(&[], &[]).score, 0);
}
