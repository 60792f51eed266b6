//! Workflow definition loading and structural validation.
//!
//! The registry is populated once at process start — built-in variants
//! first, optionally overlaid with YAML files — then shared read-only by
//! every concurrent run. Validation is structural and runs at load time:
//! a definition that could strand the state machine (missing transition,
//! unreachable stage, transition cycle) is rejected before any document is
//! processed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::workflow::schema::{StageRule, WorkflowDefinition};
use crate::workflow::stage::StageId;

/// Built-in workflow variant names.
pub const STANDARD: &str = "standard";
pub const FAST_TRACK: &str = "fast_track";
pub const DETAILED_REVIEW: &str = "detailed_review";
pub const COMPLIANCE_ONLY: &str = "compliance_only";

/// Read-only set of validated workflow definitions, selected by name at
/// run start.
#[derive(Default)]
pub struct WorkflowRegistry {
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in variants, tuned by `settings`.
    pub fn builtin(settings: &Settings) -> Result<Self, OrchestrationError> {
        let mut registry = Self::empty();
        for definition in builtin_definitions(settings) {
            registry.insert(definition)?;
        }
        Ok(registry)
    }

    /// Validate and insert a definition, replacing any variant of the same
    /// name.
    pub fn insert(&mut self, definition: WorkflowDefinition) -> Result<(), OrchestrationError> {
        validate_definition(&definition)?;
        tracing::info!(
            "[WorkflowRegistry] Loaded variant '{}' v{} ({} stages)",
            definition.name,
            definition.version,
            definition.stages.len()
        );
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Load and insert one YAML definition file.
    pub fn load_file(&mut self, path: &str) -> Result<(), OrchestrationError> {
        let definition = WorkflowDefinition::from_file(path)?;
        self.insert(definition)
    }

    /// Load every `.yaml`/`.yml` file in a directory. Returns the number of
    /// definitions loaded; a single invalid file fails the whole load.
    pub fn load_dir(&mut self, dir: &str) -> Result<usize, OrchestrationError> {
        let entries = std::fs::read_dir(dir).map_err(|e| OrchestrationError::DefinitionIo {
            path: dir.to_string(),
            message: e.to_string(),
        })?;

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml {
                self.load_file(&path.to_string_lossy())?;
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Look up a variant by name.
    pub fn get(&self, variant: &str) -> Result<Arc<WorkflowDefinition>, OrchestrationError> {
        self.definitions
            .get(variant)
            .cloned()
            .ok_or_else(|| OrchestrationError::UnknownVariant(variant.to_string()))
    }

    /// Names of all loaded variants.
    pub fn variants(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    /// Union of stage identifiers referenced by any loaded definition.
    pub fn referenced_stages(&self) -> HashSet<StageId> {
        self.definitions
            .values()
            .flat_map(|d| d.stage_ids())
            .collect()
    }
}

/// Structural validation: every reachable (stage, outcome-class) pair must
/// resolve to exactly one transition, and every path must terminate.
fn validate_definition(definition: &WorkflowDefinition) -> Result<(), OrchestrationError> {
    let name = &definition.name;
    let invalid = |reason: String| OrchestrationError::invalid(name.clone(), reason);

    if definition.name.trim().is_empty() {
        return Err(OrchestrationError::invalid("<unnamed>", "empty variant name"));
    }
    if definition.stages.is_empty() {
        return Err(invalid("definition declares no stages".to_string()));
    }

    let mut seen = HashSet::new();
    for rule in &definition.stages {
        if !seen.insert(rule.stage) {
            return Err(invalid(format!("duplicate rule for stage '{}'", rule.stage)));
        }
    }

    if !seen.contains(&definition.initial) {
        return Err(invalid(format!(
            "initial stage '{}' has no rule",
            definition.initial
        )));
    }

    for rule in &definition.stages {
        check_rule(rule, &seen).map_err(invalid)?;
    }

    if definition.terminal_stages().is_empty() {
        return Err(invalid("no terminal stage declared".to_string()));
    }

    check_reachability(definition).map_err(invalid)?;
    check_acyclic(definition).map_err(invalid)?;

    Ok(())
}

fn check_rule(rule: &StageRule, declared: &HashSet<StageId>) -> Result<(), String> {
    let stage = rule.stage;

    if !(0.0..=1.0).contains(&rule.threshold) {
        return Err(format!(
            "stage '{}' threshold {} outside [0.0, 1.0]",
            stage, rule.threshold
        ));
    }
    if rule.max_attempts == 0 {
        return Err(format!("stage '{}' allows zero attempts", stage));
    }
    if rule.timeout_secs == 0 {
        return Err(format!("stage '{}' has zero timeout", stage));
    }

    if rule.terminal {
        if rule.next.is_some() {
            return Err(format!(
                "terminal stage '{}' also declares a next stage",
                stage
            ));
        }
    } else if rule.next.is_none() {
        return Err(format!(
            "stage '{}' is neither terminal nor has a next stage",
            stage
        ));
    }

    // A threshold above zero makes the low-confidence outcome class
    // reachable, so the branch must be named; at zero it never fires.
    if rule.threshold > 0.0 && rule.on_low_confidence.is_none() {
        return Err(format!(
            "stage '{}' has threshold {} but no on_low_confidence branch",
            stage, rule.threshold
        ));
    }
    if rule.threshold == 0.0 && rule.on_low_confidence.is_some() {
        return Err(format!(
            "stage '{}' declares an unreachable on_low_confidence branch (threshold is 0.0)",
            stage
        ));
    }

    for target in [rule.next, rule.on_low_confidence].into_iter().flatten() {
        if !declared.contains(&target) {
            return Err(format!(
                "stage '{}' transitions to '{}', which has no rule",
                stage, target
            ));
        }
    }

    Ok(())
}

fn edges(rule: &StageRule) -> impl Iterator<Item = StageId> + '_ {
    [rule.next, rule.on_low_confidence].into_iter().flatten()
}

fn check_reachability(definition: &WorkflowDefinition) -> Result<(), String> {
    let mut reachable = HashSet::new();
    let mut queue = vec![definition.initial];
    while let Some(stage) = queue.pop() {
        if !reachable.insert(stage) {
            continue;
        }
        if let Some(rule) = definition.rule(stage) {
            queue.extend(edges(rule));
        }
    }

    for rule in &definition.stages {
        if !reachable.contains(&rule.stage) {
            return Err(format!(
                "stage '{}' is unreachable from initial stage '{}'",
                rule.stage, definition.initial
            ));
        }
    }
    Ok(())
}

/// The transition graph must be acyclic: retries are the only sanctioned
/// repetition, and they are bounded per stage by `max_attempts`. Together
/// with totality this guarantees every run reaches a terminal state.
fn check_acyclic(definition: &WorkflowDefinition) -> Result<(), String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    fn visit(
        stage: StageId,
        definition: &WorkflowDefinition,
        marks: &mut HashMap<StageId, Mark>,
    ) -> Result<(), String> {
        match marks.get(&stage) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(format!("transition cycle through stage '{}'", stage));
            }
            None => {}
        }
        marks.insert(stage, Mark::InProgress);
        if let Some(rule) = definition.rule(stage) {
            for target in edges(rule) {
                visit(target, definition, marks)?;
            }
        }
        marks.insert(stage, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    visit(definition.initial, definition, &mut marks)
}

/// The four built-in variants, expressed as data so that adding a variant
/// never touches orchestration code.
fn builtin_definitions(settings: &Settings) -> Vec<WorkflowDefinition> {
    let attempts = settings.default_max_attempts;

    let rule = |stage: StageId, timeout_secs: u64, max_attempts: u32| StageRule {
        stage,
        timeout_secs,
        max_attempts,
        threshold: 0.0,
        next: None,
        on_low_confidence: None,
        terminal: false,
    };
    let advance = |mut r: StageRule, next: StageId| {
        r.next = Some(next);
        r
    };
    let gated = |mut r: StageRule, threshold: f64, next: StageId, low: StageId| {
        r.threshold = threshold;
        r.next = Some(next);
        r.on_low_confidence = Some(low);
        r
    };
    let terminal = |mut r: StageRule| {
        r.terminal = true;
        r
    };

    let standard = WorkflowDefinition {
        name: STANDARD.to_string(),
        description: Some("Full review path; low-confidence extraction detours through detailed review".to_string()),
        version: "1.0".to_string(),
        initial: StageId::DocumentParser,
        stages: vec![
            advance(rule(StageId::DocumentParser, 30, attempts), StageId::DataExtraction),
            gated(
                rule(StageId::DataExtraction, 45, attempts),
                settings.extraction_threshold,
                StageId::Validation,
                StageId::DetailedReview,
            ),
            advance(rule(StageId::DetailedReview, 60, 2), StageId::Validation),
            advance(rule(StageId::Validation, 30, 2), StageId::RegionalCompliance),
            advance(rule(StageId::RegionalCompliance, 60, 2), StageId::Approval),
            advance(rule(StageId::Approval, 30, 1), StageId::Audit),
            terminal(rule(StageId::Audit, 15, 1)),
        ],
    };

    // Fast track: extraction confident enough skips validation outright;
    // anything below the auto-approve bar routes through it, and a shaky
    // validation pass gets a detailed review before compliance.
    let fast_track = WorkflowDefinition {
        name: FAST_TRACK.to_string(),
        description: Some("Minimal gating for trusted sources".to_string()),
        version: "1.0".to_string(),
        initial: StageId::DocumentParser,
        stages: vec![
            advance(rule(StageId::DocumentParser, 30, attempts), StageId::DataExtraction),
            gated(
                rule(StageId::DataExtraction, 45, attempts),
                settings.auto_approve_threshold,
                StageId::RegionalCompliance,
                StageId::Validation,
            ),
            gated(
                rule(StageId::Validation, 30, 2),
                settings.validation_threshold,
                StageId::RegionalCompliance,
                StageId::DetailedReview,
            ),
            advance(rule(StageId::DetailedReview, 60, 2), StageId::RegionalCompliance),
            advance(rule(StageId::RegionalCompliance, 60, 2), StageId::Approval),
            advance(rule(StageId::Approval, 30, 1), StageId::Audit),
            terminal(rule(StageId::Audit, 15, 1)),
        ],
    };

    let detailed_review = WorkflowDefinition {
        name: DETAILED_REVIEW.to_string(),
        description: Some("Strict thresholds; every stage required, audit included".to_string()),
        version: "1.0".to_string(),
        initial: StageId::DocumentParser,
        stages: vec![
            advance(rule(StageId::DocumentParser, 60, attempts), StageId::DataExtraction),
            gated(
                rule(StageId::DataExtraction, 90, attempts),
                settings.auto_approve_threshold,
                StageId::Validation,
                StageId::DetailedReview,
            ),
            advance(rule(StageId::DetailedReview, 120, 2), StageId::Validation),
            advance(rule(StageId::Validation, 60, 2), StageId::RegionalCompliance),
            advance(rule(StageId::RegionalCompliance, 90, 2), StageId::Approval),
            advance(rule(StageId::Approval, 60, 2), StageId::Audit),
            terminal(rule(StageId::Audit, 30, 2)),
        ],
    };

    // Pre-approved vendors: no approval stage, audit still mandatory.
    let compliance_only = WorkflowDefinition {
        name: COMPLIANCE_ONLY.to_string(),
        description: Some("Compliance checks for pre-approved vendors".to_string()),
        version: "1.0".to_string(),
        initial: StageId::DocumentParser,
        stages: vec![
            advance(rule(StageId::DocumentParser, 30, attempts), StageId::DataExtraction),
            gated(
                rule(StageId::DataExtraction, 45, attempts),
                settings.extraction_threshold,
                StageId::Validation,
                StageId::DetailedReview,
            ),
            advance(rule(StageId::DetailedReview, 60, 2), StageId::Validation),
            advance(rule(StageId::Validation, 30, 2), StageId::RegionalCompliance),
            advance(rule(StageId::RegionalCompliance, 60, 2), StageId::Audit),
            terminal(rule(StageId::Audit, 15, 1)),
        ],
    };

    vec![standard, fast_track, detailed_review, compliance_only]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_builtin_variants_validate() {
        let registry = WorkflowRegistry::builtin(&settings()).unwrap();
        let mut names = registry.variants();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![COMPLIANCE_ONLY, DETAILED_REVIEW, FAST_TRACK, STANDARD]
        );
    }

    #[test]
    fn test_unknown_variant_lookup() {
        let registry = WorkflowRegistry::builtin(&settings()).unwrap();
        let err = registry.get("expedited").unwrap_err();
        assert!(matches!(err, OrchestrationError::UnknownVariant(v) if v == "expedited"));
    }

    #[test]
    fn test_standard_branches_low_confidence_extraction() {
        let registry = WorkflowRegistry::builtin(&settings()).unwrap();
        let standard = registry.get(STANDARD).unwrap();
        let extraction = standard.rule(StageId::DataExtraction).unwrap();
        assert_eq!(extraction.on_low_confidence, Some(StageId::DetailedReview));
        assert_eq!(extraction.next, Some(StageId::Validation));
    }

    #[test]
    fn test_fast_track_skips_validation_on_pass() {
        let registry = WorkflowRegistry::builtin(&settings()).unwrap();
        let fast = registry.get(FAST_TRACK).unwrap();
        let extraction = fast.rule(StageId::DataExtraction).unwrap();
        assert_eq!(extraction.next, Some(StageId::RegionalCompliance));
        assert_eq!(extraction.on_low_confidence, Some(StageId::Validation));
    }

    #[test]
    fn test_rejects_dangling_transition() {
        let yaml = r#"
name: "dangling"
initial: document_parser
stages:
  - stage: document_parser
    next: validation
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        let err = WorkflowRegistry::empty().insert(def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("which has no rule"), "{}", msg);
    }

    #[test]
    fn test_rejects_missing_low_confidence_branch() {
        let yaml = r#"
name: "no_branch"
initial: data_extraction
stages:
  - stage: data_extraction
    threshold: 0.8
    next: audit
  - stage: audit
    terminal: true
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        let err = WorkflowRegistry::empty().insert(def).unwrap_err();
        assert!(err.to_string().contains("no on_low_confidence branch"));
    }

    #[test]
    fn test_rejects_unreachable_stage() {
        let yaml = r#"
name: "orphan"
initial: document_parser
stages:
  - stage: document_parser
    next: audit
  - stage: validation
    next: audit
  - stage: audit
    terminal: true
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        let err = WorkflowRegistry::empty().insert(def).unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn test_rejects_transition_cycle() {
        let yaml = r#"
name: "loop"
initial: data_extraction
stages:
  - stage: data_extraction
    threshold: 0.8
    next: validation
    on_low_confidence: detailed_review
  - stage: detailed_review
    next: data_extraction
  - stage: validation
    next: audit
  - stage: audit
    terminal: true
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        let err = WorkflowRegistry::empty().insert(def).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_rejects_no_terminal() {
        let yaml = r#"
name: "endless"
initial: document_parser
stages:
  - stage: document_parser
    next: audit
  - stage: audit
    next: document_parser
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert!(WorkflowRegistry::empty().insert(def).is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let yaml = r#"
name: "zero"
initial: audit
stages:
  - stage: audit
    max_attempts: 0
    terminal: true
"#;
        let def = WorkflowDefinition::from_yaml(yaml).unwrap();
        let err = WorkflowRegistry::empty().insert(def).unwrap_err();
        assert!(err.to_string().contains("zero attempts"));
    }

    #[test]
    fn test_load_dir_reads_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(
            &path,
            r#"
name: "custom"
initial: document_parser
stages:
  - stage: document_parser
    next: audit
  - stage: audit
    terminal: true
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = WorkflowRegistry::empty();
        let loaded = registry.load_dir(&dir.path().to_string_lossy()).unwrap();
        assert_eq!(loaded, 1);
        assert!(registry.get("custom").is_ok());
    }
}
