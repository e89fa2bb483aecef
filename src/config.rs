//! Loading service configuration (prompts + evaluation/scheduler policy) from TOML.
//!
//! See `AppConfig` and `Prompts` for expected schema. Every section is optional;
//! missing keys fall back to the defaults below.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub evaluation: EvaluationSettings,
  #[serde(default)]
  pub scheduler: SchedulerSettings,
}

/// Prompt templates used by the evaluation pipeline.
///
/// Placeholders: `{question}`, `{answer}`, and for the criteria template also
/// `{criteria_list}` and `{criteria_json}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Fixed three-axis rubric (logic 40%, creativity 30%, consistency 30%).
  pub rubric_template: String,
  /// Caller-supplied axis list, unweighted.
  pub criteria_template: String,
  /// Feedback returned when the pre-check rejects an answer.
  pub rejected_feedback: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      rubric_template: r#"
다음 철학적 질문에 대한 답변을 3가지 기준으로 평가하세요.

**질문**: {question}

**답변**: {answer}

**평가 기준**:
1. **논리적 사고** (40%): 논리 구조, 인과관계, 반박에 대한 처리
2. **창의적 사고** (30%): 새로운 관점, 독창적 접근, 적절한 비유
3. **일관성** (30%): 자기모순 부재, 결론과 논증의 정합성

**채점 방식**:
- 각 기준마다 0-100점 (정수)
- 총점 = round(논리적 사고 × 0.4 + 창의적 사고 × 0.3 + 일관성 × 0.3)
- 길이보다는 질을 중시하여 평가 (장황함이나 중복은 감점)

**피드백 형식**: 정확히 2문장 (첫 번째 문장=강점, 두 번째 문장=개선점)

**응답 형식** (JSON만):
{
  "score": 총점,
  "feedback": "강점: [구체적 강점]. 개선점: [구체적 개선사항].",
  "criteriaScores": {
    "논리적 사고": 점수,
    "창의적 사고": 점수,
    "일관성": 점수
  }
}
"#.into(),
      criteria_template: r#"
다음 질문에 대한 답변을 아래 평가 기준으로 평가하세요.

**질문**: {question}

**답변**: {answer}

**평가 기준**:
{criteria_list}

**채점 방식**:
- 각 기준마다 0-100점 (정수)
- 총점 = 각 기준 점수의 종합 평가 (0-100 정수)
- criteriaScores의 키는 위 평가 기준 이름을 글자 그대로 사용하세요. 정확히 대응되지 않으면 가장 가까운 기준 이름을 사용하세요.
- 길이보다는 질을 중시하여 평가 (장황함이나 중복은 감점)

**피드백 형식**: 정확히 2문장 (첫 번째 문장=강점, 두 번째 문장=개선점)

**응답 형식** (JSON만):
{
  "score": 총점,
  "feedback": "강점: [구체적 강점]. 개선점: [구체적 개선사항].",
  "criteriaScores": {criteria_json}
}
"#.into(),
      rejected_feedback: "목록 기호나 이모지가 포함되어 채점 시스템을 우회하려는 시도로 판단됩니다. 서술형 문장으로 다시 작성해 주세요.".into(),
    }
  }
}

/// Evaluation policy.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
  pub model: String,
  pub reasoning_effort: String,
  pub verbosity: String,
  /// Write a usage-log entry for answers rejected by the pre-check.
  pub log_rejected_attempts: bool,
}

impl Default for EvaluationSettings {
  fn default() -> Self {
    Self {
      model: "gpt-5-nano".into(),
      reasoning_effort: "low".into(),
      verbosity: "low".into(),
      log_rejected_attempts: false,
    }
  }
}

/// Daily publish job.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
  pub enabled: bool,
  /// How often the job wakes up to check whether today's run happened.
  pub interval_secs: u64,
}

impl Default for SchedulerSettings {
  fn default() -> Self {
    Self { enabled: true, interval_secs: 600 }
  }
}

impl AppConfig {
  /// Config file (if any) with env overrides applied on top.
  pub fn from_env() -> Self {
    let mut cfg = load_config_from_env().unwrap_or_default();
    if let Ok(model) = std::env::var("OPENAI_EVAL_MODEL") {
      if !model.trim().is_empty() {
        cfg.evaluation.model = model;
      }
    }
    cfg
  }
}

/// Attempt to load `AppConfig` from THINKSCORE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("THINKSCORE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => parse_config(&s, &path),
    Err(e) => {
      error!(target: "thinkscore", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

fn parse_config(raw: &str, path: &str) -> Option<AppConfig> {
  match toml::from_str::<AppConfig>(raw) {
    Ok(cfg) => {
      info!(target: "thinkscore", %path, "Loaded service config (TOML)");
      Some(cfg)
    }
    Err(e) => {
      error!(target: "thinkscore", %path, error = %e, "Failed to parse TOML config");
      None
    }
  }
}
