use serde_json::{json, Map};
use std::sync::Arc;
use verity_evaluate::{
    evaluate_case, EvaluationError, Evaluator, EvaluatorRegistry, LLMJudge, LLMJudgeSpec,
};
use verity_mocks::{GradeCall, MockGrader};
use verity_types::error::GradingError;
use verity_types::{EvaluationContext, EvaluationReason, EvaluatorOutput};

fn context() -> EvaluationContext {
    EvaluationContext::new(
        "greeting",
        json!({"prompt": "Say hello"}),
        json!("Hello world"),
    )
}

#[tokio::test]
async fn test_judge_grades_output_only() {
    let grader = Arc::new(MockGrader::new(true, "Polite and on topic"));
    let judge = LLMJudge::new("Output is a greeting", grader.clone());

    let output = judge.evaluate(&context()).await.unwrap();
    assert_eq!(
        output,
        EvaluatorOutput::Reason(EvaluationReason::new(true, Some("Polite and on topic")))
    );

    assert_eq!(
        grader.calls(),
        vec![GradeCall {
            inputs: None,
            output: json!("Hello world"),
            rubric: "Output is a greeting".to_string(),
            model: None,
            model_settings: None,
        }]
    );
}

#[tokio::test]
async fn test_judge_includes_input_and_model() {
    let grader = Arc::new(MockGrader::new(true, "Answers the prompt"));
    let judge = LLMJudge::new("Output answers the prompt", grader.clone())
        .with_input()
        .with_model("openai:gpt-4o");

    judge.evaluate(&context()).await.unwrap();

    let calls = grader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].inputs, Some(json!({"prompt": "Say hello"})));
    assert_eq!(calls[0].output, json!("Hello world"));
    assert_eq!(calls[0].model.as_deref(), Some("openai:gpt-4o"));
}

#[tokio::test]
async fn test_judge_forwards_model_settings() {
    let grader = Arc::new(MockGrader::new(true, "ok"));
    let mut settings = Map::new();
    settings.insert("temperature".to_string(), json!(0.77));

    let judge = LLMJudge::new("Output is a greeting", grader.clone())
        .with_model_settings(settings.clone());
    judge.evaluate(&context()).await.unwrap();

    assert_eq!(grader.calls()[0].model_settings, Some(settings));
}

#[tokio::test]
async fn test_judge_failing_verdict() {
    let grader = Arc::new(MockGrader::new(false, "Response is rude"));
    let judge = LLMJudge::new("Output is polite", grader);

    let EvaluatorOutput::Reason(reason) = judge.evaluate(&context()).await.unwrap() else {
        panic!("expected a reason");
    };
    assert_eq!(reason.value.as_bool(), Some(false));
    assert_eq!(reason.reason.as_deref(), Some("Response is rude"));
}

#[tokio::test]
async fn test_grader_errors_propagate() {
    let grader = Arc::new(MockGrader::failing(GradingError::RequestError(
        "connection reset".to_string(),
    )));
    let judge: Arc<dyn Evaluator> = Arc::new(LLMJudge::new("Output is polite", grader));

    let err = judge.evaluate(&context()).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::GradingError(GradingError::RequestError(_))
    ));

    // the runner reports it as a failure instead of a result
    let case = evaluate_case(&context(), &[judge], 1).await;
    assert!(case.results.is_empty());
    assert_eq!(case.failures.len(), 1);
    assert_eq!(case.failures[0].evaluator, "LLMJudge");
    assert_eq!(
        case.failures[0].error,
        "Grading request failed: connection reset"
    );
}

#[tokio::test]
async fn test_registry_judge_configuration() {
    let grader = Arc::new(MockGrader::new(true, "fine"));
    let spec = json!({"llm_judge": {"rubric": "Output is a greeting"}});

    let err = EvaluatorRegistry::new()
        .build_from_value(spec.clone())
        .unwrap_err();
    assert!(matches!(err, EvaluationError::MissingGrader));

    let registry = EvaluatorRegistry::new()
        .with_grader(grader.clone())
        .with_default_judge_model("anthropic:claude-default");
    let judge = registry.build_from_value(spec).unwrap();
    judge.evaluate(&context()).await.unwrap();
    assert_eq!(
        grader.calls()[0].model.as_deref(),
        Some("anthropic:claude-default")
    );

    // an explicit model wins over the registry default
    let judge = registry
        .build(verity_evaluate::EvaluatorSpec::LLMJudge(LLMJudgeSpec {
            rubric: "Output is a greeting".to_string(),
            include_input: false,
            model: Some("openai:gpt-4o".to_string()),
            model_settings: None,
            evaluation_name: Some("greeting_judge".to_string()),
        }))
        .unwrap();
    assert_eq!(judge.name(), "greeting_judge");
    judge.evaluate(&context()).await.unwrap();
    assert_eq!(grader.calls()[1].model.as_deref(), Some("openai:gpt-4o"));

    let empty = registry.build_from_value(json!({"llm_judge": {"rubric": "  "}}));
    assert!(matches!(empty, Err(EvaluationError::InvalidConfiguration(_))));
}

#[test]
fn test_grading_output_accepts_passed_alias() {
    let output: verity_types::judge::GradingOutput =
        serde_json::from_value(json!({"passed": true, "reason": "ok"})).unwrap();
    assert!(output.pass);
}
