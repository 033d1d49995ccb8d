use std::collections::{BTreeMap, HashMap};

use crate::model::{AssessmentResult, Breakdown, Question, QuestionId, ScoredAnswer, rounded_percentage};

/// Build the final result from the question snapshot and its scored answers.
///
/// Every question counts toward the totals; a question without a scored answer
/// contributes zero points. Output ordering is fixed (questions in order, groups
/// sorted by key), so equal inputs always yield equal results.
#[must_use]
pub fn summarize(questions: &[Question], scored: &[ScoredAnswer]) -> AssessmentResult {
    let by_id: HashMap<&QuestionId, &ScoredAnswer> =
        scored.iter().map(|s| (&s.question_id, s)).collect();

    let mut earned_points = 0_u64;
    let mut total_points = 0_u64;
    let mut correct_count = 0_u32;
    let mut answers = Vec::with_capacity(questions.len());
    let mut by_section: BTreeMap<String, Breakdown> = BTreeMap::new();
    let mut by_category: BTreeMap<String, Breakdown> = BTreeMap::new();
    let mut by_difficulty = BTreeMap::new();

    for question in questions {
        let entry = by_id.get(question.id()).copied();

        total_points += u64::from(question.points());
        if let Some(s) = entry {
            earned_points += u64::from(s.points_earned);
            if s.is_correct {
                correct_count += 1;
            }
        }

        by_section
            .entry(question.section().to_owned())
            .or_default()
            .add(question.points(), entry);
        by_category
            .entry(question.category().to_owned())
            .or_default()
            .add(question.points(), entry);
        by_difficulty
            .entry(question.difficulty())
            .or_insert_with(Breakdown::default)
            .add(question.points(), entry);

        answers.push(entry.cloned().unwrap_or_else(|| ScoredAnswer {
            question_id: question.id().clone(),
            points_earned: 0,
            is_correct: false,
        }));
    }

    AssessmentResult {
        earned_points,
        total_points,
        percentage: rounded_percentage(earned_points, total_points),
        correct_count,
        total_questions: u32::try_from(questions.len()).unwrap_or(u32::MAX),
        answers,
        by_section,
        by_category,
        by_difficulty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Answer, AnswerValue, Difficulty, QuestionBank, QuestionDraft};
    use crate::scoring::score_all;
    use crate::time::fixed_now;

    fn law_bank() -> QuestionBank {
        QuestionBank::validate(vec![
            QuestionDraft::single_choice("k1", ["Offer", "Acceptance", "Consideration"], 1)
                .with_points(2)
                .with_section("Part A")
                .with_category("Contracts")
                .with_difficulty(Difficulty::Medium),
            QuestionDraft::true_false("t1", true)
                .with_section("Part A")
                .with_category("Torts")
                .with_difficulty(Difficulty::Easy),
            QuestionDraft::free_text("e1", 10, 20)
                .with_section("Part B")
                .with_category("Contracts")
                .with_difficulty(Difficulty::Expert),
        ])
        .unwrap()
    }

    fn answered(pairs: &[(&str, AnswerValue)]) -> HashMap<QuestionId, Answer> {
        pairs
            .iter()
            .map(|(id, v)| (QuestionId::new(*id), Answer::new(v.clone(), fixed_now())))
            .collect()
    }

    #[test]
    fn end_to_end_scenario_totals() {
        let bank = law_bank();
        let answers = answered(&[
            ("k1", AnswerValue::Choice(1)),
            ("t1", AnswerValue::Boolean(true)),
            ("e1", AnswerValue::Text("a".repeat(200))),
        ]);
        let result = summarize(bank.questions(), &score_all(bank.questions(), &answers));

        assert_eq!(result.earned_points, 11);
        assert_eq!(result.total_points, 13);
        assert_eq!(result.percentage, 85);
        assert_eq!(result.correct_count, 3);
        assert_eq!(result.total_questions, 3);

        let contracts = result.by_category["Contracts"];
        assert_eq!(contracts.total, 2);
        assert_eq!(contracts.earned_points, 10);
        assert_eq!(contracts.max_points, 12);
        assert_eq!(contracts.correct, 2);

        let part_b = result.by_section["Part B"];
        assert_eq!(part_b.earned_points, 8);
        assert_eq!(result.by_difficulty[&Difficulty::Easy].correct, 1);
    }

    #[test]
    fn breakdowns_sum_to_totals() {
        let bank = law_bank();
        let answers = answered(&[
            ("k1", AnswerValue::Choice(0)),
            ("e1", AnswerValue::Text("b".repeat(120))),
        ]);
        let result = summarize(bank.questions(), &score_all(bank.questions(), &answers));

        let maps: [Vec<Breakdown>; 3] = [
            result.by_section.values().copied().collect(),
            result.by_category.values().copied().collect(),
            result.by_difficulty.values().copied().collect(),
        ];
        for groups in maps {
            let total: u32 = groups.iter().map(|g| g.total).sum();
            let earned: u64 = groups.iter().map(|g| g.earned_points).sum();
            let max: u64 = groups.iter().map(|g| g.max_points).sum();
            let correct: u32 = groups.iter().map(|g| g.correct).sum();
            assert_eq!(total, result.total_questions);
            assert_eq!(earned, result.earned_points);
            assert_eq!(max, result.total_points);
            assert_eq!(correct, result.correct_count);
        }
        assert!(result.percentage <= 100);
    }

    #[test]
    fn summarize_is_deterministic() {
        let bank = law_bank();
        let answers = answered(&[
            ("t1", AnswerValue::Boolean(false)),
            ("e1", AnswerValue::Text("c".repeat(310))),
        ]);
        let scored = score_all(bank.questions(), &answers);

        let first = serde_json::to_string(&summarize(bank.questions(), &scored)).unwrap();
        let second = serde_json::to_string(&summarize(bank.questions(), &scored)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unanswered_session_scores_zero() {
        let bank = law_bank();
        let result = summarize(bank.questions(), &[]);
        assert_eq!(result.earned_points, 0);
        assert_eq!(result.percentage, 0);
        assert_eq!(result.answers.len(), 3);
        assert!(result.answers.iter().all(|a| !a.is_correct));
    }

    #[test]
    fn equal_weights_reduce_to_plain_accuracy() {
        let bank = QuestionBank::validate(vec![
            QuestionDraft::true_false("a", true),
            QuestionDraft::true_false("b", true),
            QuestionDraft::true_false("c", false),
        ])
        .unwrap();
        let answers = answered(&[
            ("a", AnswerValue::Boolean(true)),
            ("b", AnswerValue::Boolean(true)),
            ("c", AnswerValue::Boolean(true)),
        ]);
        let result = summarize(bank.questions(), &score_all(bank.questions(), &answers));
        assert_eq!(result.percentage, rounded_percentage(2, 3));
        assert_eq!(result.percentage, 67);
    }
}
