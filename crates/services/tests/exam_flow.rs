use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use exam_core::model::{ExamData, ExamSettings, FinishReason, OptionId, QuestionId};
use exam_core::time::fixed_now;
use services::{
    Clock, ExamGenerator, ExamSessionService, GenerationRequest, HistoryService, Intent,
    JsonExamSource, ResumeOutcome, RunOutcome, SessionEvent, SessionRunner,
};
use storage::{StaleReason, Storage};

fn exam_json(count: usize) -> serde_json::Value {
    let questions: Vec<_> = (1..=count)
        .map(|i| {
            json!({
                "id": format!("q{i}"),
                "type": "single",
                "text": format!("Which option is correct for item {i}?"),
                "options": [
                    {"id": "a", "text": "Alpha"},
                    {"id": "b", "text": "Bravo"},
                    {"id": "c", "text": "Charlie"},
                    {"id": "d", "text": "Delta"}
                ],
                "correctAnswers": ["b"],
                "domain": if i <= count / 2 { "Compute" } else { "Networking" },
                "explanation": "Bravo is always right here."
            })
        })
        .collect();
    json!({
        "examCode": "PRACTICE-10",
        "examName": "Practice Exam",
        "questions": questions
    })
}

async fn load_exam(dir: &Path, count: usize) -> ExamData {
    let path = dir.join("exam.json");
    std::fs::write(&path, exam_json(count).to_string()).unwrap();
    JsonExamSource::new(path)
        .generate(&GenerationRequest::new("PRACTICE-10"))
        .await
        .unwrap()
}

async fn sqlite_storage(dir: &Path) -> Storage {
    let url = format!("sqlite://{}?mode=rwc", dir.join("history.sqlite3").display());
    Storage::sqlite(&url, dir.join("snapshots")).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn timeout_scores_the_answers_held_at_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let exam = load_exam(dir.path(), 10).await;

    let storage = Storage::in_memory();
    let service = ExamSessionService::from_storage(
        Clock::fixed(fixed_now()),
        ExamSettings::default(),
        &storage,
    );
    let session = service.start_session(exam).unwrap();
    assert_eq!(session.time_left(), 900);

    let (handle, mut events) = SessionRunner::new(service.clone(), session).spawn();
    handle.send(Intent::Answer {
        question: QuestionId::new("q1"),
        options: vec![OptionId::new("b")],
    });

    let mut warnings = Vec::new();
    let attempt = loop {
        match events.recv().await {
            Some(SessionEvent::TimeWarning { remaining }) => warnings.push(remaining),
            Some(SessionEvent::Finished(attempt)) => break attempt,
            Some(_) => {}
            None => panic!("runner stopped without finishing"),
        }
    };

    assert_eq!(warnings, [120, 60, 30]);
    assert_eq!(attempt.reason(), FinishReason::Timeout);
    assert_eq!(attempt.correct_answers(), 1);
    assert_eq!(attempt.total_questions(), 10);
    assert!((attempt.score() - 10.0).abs() < f64::EPSILON);

    assert!(matches!(handle.join().await.unwrap(), RunOutcome::Finished(_)));
    let history = HistoryService::new(Arc::clone(&storage.attempts));
    assert_eq!(history.list(10).await.unwrap().len(), 1);
    assert!(service.pending_session().unwrap().is_none());
}

#[tokio::test]
async fn crashed_session_resumes_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let exam = load_exam(dir.path(), 4).await;

    {
        let storage = sqlite_storage(dir.path()).await;
        let service =
            ExamSessionService::from_storage(Clock::default(), ExamSettings::default(), &storage);
        let mut session = service.start_session(exam.clone()).unwrap();
        session.answer(&QuestionId::new("q1"), [OptionId::new("b")]);
        session.answer(&QuestionId::new("q2"), [OptionId::new("a")]);
        session.toggle_flag(&QuestionId::new("q4"));
        session.reorder(3, 0);
        session.jump(2);
        for _ in 0..42 {
            session.tick();
        }
        // Process dies here: nothing is finished or archived.
    }

    let storage = sqlite_storage(dir.path()).await;
    let service =
        ExamSessionService::from_storage(Clock::default(), ExamSettings::default(), &storage);

    let offer = service.pending_session().unwrap().expect("a saved session");
    assert_eq!(offer.exam_code.as_str(), "PRACTICE-10");
    assert_eq!(offer.answered, 2);
    assert_eq!(offer.total, 4);
    assert_eq!(offer.time_left_seconds, 360 - 42);

    let ResumeOutcome::Resumed(mut session) = service.resume_saved_exam().await.unwrap() else {
        panic!("expected the session to resume");
    };
    let order: Vec<&str> = session
        .state()
        .ordered_ids()
        .map(QuestionId::as_str)
        .collect();
    assert_eq!(order, ["q4", "q1", "q2", "q3"]);
    assert_eq!(session.current_question().map(|q| q.id.as_str()), Some("q2"));
    assert!(session.is_flagged(&QuestionId::new("q4")));

    let attempt = service
        .finish_session(&mut session, FinishReason::Manual)
        .await
        .unwrap();
    assert_eq!(attempt.correct_answers(), 1);
    assert!((attempt.score() - 25.0).abs() < f64::EPSILON);
    assert!(service.pending_session().unwrap().is_none());

    let history = HistoryService::new(Arc::clone(&storage.attempts));
    let review = history.review(attempt.id()).await.unwrap();
    assert_eq!(review.summary.correct, 1);
    assert_eq!(review.items.len(), 4);
    assert_eq!(review.domains.len(), 2);
    assert_eq!(
        history.best_score(&exam.exam_code).await.unwrap(),
        Some(25.0)
    );
}

#[tokio::test]
async fn edited_exam_discards_the_saved_session() {
    let dir = tempfile::tempdir().unwrap();
    let exam = load_exam(dir.path(), 4).await;
    let storage = sqlite_storage(dir.path()).await;
    let service =
        ExamSessionService::from_storage(Clock::default(), ExamSettings::default(), &storage);

    let mut session = service.start_session(exam.clone()).unwrap();
    session.answer(&QuestionId::new("q1"), [OptionId::new("b")]);
    drop(session);

    let mut edited = exam;
    edited.questions.pop();
    let outcome = service.resume_session(edited).await.unwrap();

    assert!(matches!(
        outcome,
        ResumeOutcome::Stale(StaleReason::CountMismatch {
            expected: 3,
            found: 4
        })
    ));
    assert!(service.pending_session().unwrap().is_none());
}
