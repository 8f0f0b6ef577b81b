use exam_core::model::{AnswerOption, ExamCode, ExamData, OptionId, Question, QuestionId, QuestionKind};

/// `n` single-choice questions `q0..`, each answered correctly by option `a`.
pub(crate) fn sample_exam(n: usize) -> ExamData {
    ExamData {
        exam_code: ExamCode::new("SAMPLE-01"),
        exam_name: "Sample Certification".into(),
        questions: (0..n)
            .map(|i| Question {
                id: QuestionId::new(format!("q{i}")),
                kind: QuestionKind::SingleChoice,
                text: format!("Which service fits case {i}?"),
                scenario: None,
                options: vec![
                    AnswerOption::new("a", "Queue"),
                    AnswerOption::new("b", "Topic"),
                    AnswerOption::new("c", "Bucket"),
                ],
                correct_answers: [OptionId::new("a")].into_iter().collect(),
                domain: if i % 2 == 0 { "Design" } else { "Security" }.into(),
                explanation: String::new(),
            })
            .collect(),
    }
}
