//! Scripted LLM and sub-agent doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::agents::sub_agent::{check_analyzable, SubAgent};
use crate::evidence::record::{META_DESCRIPTION, META_PRIMARY_LANGUAGE, META_STARS, META_UPDATED_AT};
use crate::evidence::{EvidenceId, EvidenceKind, EvidenceRecord};
use crate::explorer::finding_set::{Completeness, CoverageReport};
use crate::llms::base_llm::{BaseLLM, LLMMessage};
use crate::synthesis::narrative::{AnalysisMode, Tone};
use crate::synthesis::persona::{ClaimRank, DocClaim, GlobalMetadata, PersonaDocument, Section, SectionKind};
use crate::tasks::{Citation, Claim, Finding, RoleAssertion, TechRole, TechSignal};
use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::errors::{LlmError, SubAgentError};

// ---------------------------------------------------------------------------
// ScriptedLlm
// ---------------------------------------------------------------------------

/// LLM that replays canned responses in order.
#[derive(Debug)]
pub(crate) struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    messages: Mutex<Vec<Vec<LLMMessage>>>,
    usage: Mutex<UsageMetrics>,
}

impl ScriptedLlm {
    pub(crate) fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            messages: Mutex::new(Vec::new()),
            usage: Mutex::new(UsageMetrics::default()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.messages.lock().len()
    }

    pub(crate) fn last_messages(&self) -> Option<Vec<LLMMessage>> {
        self.messages.lock().last().cloned()
    }
}

#[async_trait]
impl BaseLLM for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    fn provider(&self) -> &str {
        "test"
    }

    async fn acall(&self, messages: &[LLMMessage]) -> Result<String, LlmError> {
        self.messages.lock().push(messages.to_vec());
        let next = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse {
                message: "script exhausted".to_string(),
            }));
        if next.is_ok() {
            self.usage.lock().record_response(Some(&serde_json::json!({
                "prompt_tokens": 10, "completion_tokens": 5
            })));
        }
        next
    }

    fn get_token_usage_summary(&self) -> UsageMetrics {
        self.usage.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// ScriptedSubAgent
// ---------------------------------------------------------------------------

pub(crate) type FindingFn = Arc<dyn Fn(Uuid, &EvidenceRecord) -> Finding + Send + Sync>;

/// What one attempt does.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Succeed,
    Fail(SubAgentError),
    Delay(Duration, Box<Step>),
    /// Never completes; only a timeout or cancellation ends it.
    Hang,
}

/// Sub-agent whose per-record attempts follow a script. Records without a
/// script succeed with [`default_finding`].
pub(crate) struct ScriptedSubAgent {
    finding_fn: FindingFn,
    scripts: Mutex<HashMap<EvidenceId, VecDeque<Step>>>,
    attempts: Mutex<HashMap<EvidenceId, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for ScriptedSubAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSubAgent").finish_non_exhaustive()
    }
}

impl ScriptedSubAgent {
    pub(crate) fn new() -> Self {
        Self {
            finding_fn: Arc::new(default_finding),
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_findings(
        mut self,
        f: impl Fn(Uuid, &EvidenceRecord) -> Finding + Send + Sync + 'static,
    ) -> Self {
        self.finding_fn = Arc::new(f);
        self
    }

    pub(crate) fn script(self, subject: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .insert(EvidenceId::repository(subject), steps.into());
        self
    }

    pub(crate) fn attempts(&self, subject: &str) -> u32 {
        self.attempts
            .lock()
            .get(&EvidenceId::repository(subject))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run_step(&self, step: Step, task_id: Uuid, record: &EvidenceRecord) -> Result<Finding, SubAgentError> {
        let mut step = step;
        loop {
            match step {
                Step::Succeed => return Ok((self.finding_fn)(task_id, record)),
                Step::Fail(err) => return Err(err),
                Step::Delay(delay, next) => {
                    tokio::time::sleep(delay).await;
                    step = *next;
                }
                Step::Hang => std::future::pending::<()>().await,
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubAgent for ScriptedSubAgent {
    async fn analyze(&self, task_id: Uuid, record: &EvidenceRecord) -> Result<Finding, SubAgentError> {
        let id = record.id();
        *self.attempts.lock().entry(id.clone()).or_default() += 1;
        check_analyzable(record)?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let step = self
            .scripts
            .lock()
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed);
        self.run_step(step, task_id, record).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Finding derived from a record's metadata: a primary-language claim and a
/// description claim, each citing the field it came from.
pub(crate) fn default_finding(task_id: Uuid, record: &EvidenceRecord) -> Finding {
    let id = record.id();
    let mut claims = Vec::new();
    let mut signals = Vec::new();

    if let Some(lang) = record.meta(META_PRIMARY_LANGUAGE).and_then(|v| v.as_str()) {
        claims.push(
            Claim::new(format!("Primary language is {lang}"), [id.clone()], 0.8)
                .with_citation(Citation::new(format!("metadata.{META_PRIMARY_LANGUAGE}"), None))
                .with_assertion(RoleAssertion::new(TechRole::PrimaryLanguage, lang)),
        );
        signals.push(TechSignal::new(lang, 0.8));
    }
    if let Some(description) = record.description() {
        claims.push(
            Claim::new(format!("{}: {}", record.display_name(), description), [id.clone()], 0.7)
                .with_citation(Citation::new(
                    format!("metadata.{META_DESCRIPTION}"),
                    Some(description.to_string()),
                )),
        );
    }

    Finding::new(
        task_id,
        id,
        record
            .description()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Repository {}", record.display_name())),
        5,
        claims,
        signals,
    )
}

/// Repository record with the metadata the fixtures read.
pub(crate) fn repo_record(
    subject: &str,
    readme: &str,
    description: &str,
    language: &str,
    stars: i64,
    updated_at: &str,
) -> EvidenceRecord {
    EvidenceRecord::new(
        EvidenceKind::Repository,
        subject,
        readme,
        format!("https://github.com/{subject}"),
    )
    .with_metadata(META_DESCRIPTION, description)
    .with_metadata(META_PRIMARY_LANGUAGE, language)
    .with_metadata(META_STARS, stars)
    .with_metadata(META_UPDATED_AT, updated_at)
}

/// Document claim with the given text and references.
pub(crate) fn doc_claim(text: &str, refs: &[EvidenceId]) -> DocClaim {
    DocClaim::from_claim(&Claim::new(text, refs.iter().cloned(), 0.8), ClaimRank::Primary)
}

/// Bare document holding the given sections.
pub(crate) fn document(sections: Vec<(SectionKind, Vec<DocClaim>)>) -> PersonaDocument {
    PersonaDocument {
        sections: sections
            .into_iter()
            .map(|(kind, claims)| {
                let mut section = Section::new(kind, "intro");
                section.claims = claims;
                section
            })
            .collect(),
        global_metadata: GlobalMetadata {
            subject: None,
            headline: None,
            sources_consulted: vec![],
            failed_tasks: vec![],
            skipped: vec![],
            coverage: CoverageReport::default(),
            completeness: Completeness::Complete,
            cancelled: false,
            tone: Tone::Professional,
            mode: AnalysisMode::Summary,
            tech_stack: vec![],
            links: vec![],
        },
    }
}
