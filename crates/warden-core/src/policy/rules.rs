//! Policy rule model and loader.
//!
//! Rules arrive as loosely-typed [`RuleSpec`] structures (deserialized from
//! YAML or JSON) and are compiled into typed [`PolicyRule`] values before a
//! rule set is published. Compilation is strict: an unrecognized condition
//! key or a malformed action is a load-time error, never a silently ignored
//! clause.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DataClassification, Industry, ProviderId, RequestContext};

use super::catalog::ProviderCatalog;

/// Errors from loading or compiling policy rules.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML rules: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON rules: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),

    #[error("rule '{rule}': unrecognized condition key '{key}'")]
    UnknownConditionKey { rule: String, key: String },

    #[error("rule '{rule}': invalid value for condition '{key}': {reason}")]
    InvalidCondition {
        rule: String,
        key: String,
        reason: String,
    },

    #[error("rule '{rule}': allowed_providers must be a provider list or the string \"unrestricted\"")]
    InvalidProviderConstraint { rule: String },

    #[error("rule '{rule}': allowed_providers list must not be empty")]
    EmptyProviderList { rule: String },
}

/// A condition value as written in a rule file: a single value or a list of
/// acceptable values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    One(String),
    Many(Vec<String>),
}

impl ConditionValue {
    fn values(&self) -> Vec<&str> {
        match self {
            Self::One(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// Provider constraint as written in a rule file: an explicit list or the
/// sentinel string `"unrestricted"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderListSpec {
    Sentinel(String),
    List(Vec<ProviderId>),
}

/// Action block of a rule as written in a rule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_providers: Option<ProviderListSpec>,

    #[serde(default)]
    pub require_human_review: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_models: Option<Vec<String>>,
}

fn default_priority() -> i32 {
    50
}

/// A rule as it appears in external rule definitions, prior to compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Higher priority evaluates first.
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub conditions: BTreeMap<String, ConditionValue>,

    #[serde(default)]
    pub actions: ActionSpec,
}

impl RuleSpec {
    /// Compile into a typed rule, rejecting unknown condition keys and
    /// malformed actions.
    pub fn compile(&self) -> Result<PolicyRule, PolicyError> {
        let mut conditions = Vec::with_capacity(self.conditions.len());

        for (key, value) in &self.conditions {
            let condition = match key.as_str() {
                "industry" => {
                    let industries = value
                        .values()
                        .into_iter()
                        .map(|v| {
                            v.parse::<Industry>().map_err(|e| {
                                PolicyError::InvalidCondition {
                                    rule: self.name.clone(),
                                    key: key.clone(),
                                    reason: e.to_string(),
                                }
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Condition::IndustryIn(industries)
                }
                "data_classification" => {
                    let levels = value
                        .values()
                        .into_iter()
                        .map(|v| {
                            v.parse::<DataClassification>().map_err(|e| {
                                PolicyError::InvalidCondition {
                                    rule: self.name.clone(),
                                    key: key.clone(),
                                    reason: e.to_string(),
                                }
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Condition::ClassificationIn(levels)
                }
                "min_classification" => match value {
                    ConditionValue::One(v) => Condition::MinClassification(
                        v.parse::<DataClassification>().map_err(|e| {
                            PolicyError::InvalidCondition {
                                rule: self.name.clone(),
                                key: key.clone(),
                                reason: e.to_string(),
                            }
                        })?,
                    ),
                    ConditionValue::Many(_) => {
                        return Err(PolicyError::InvalidCondition {
                            rule: self.name.clone(),
                            key: key.clone(),
                            reason: "threshold conditions take a single value".to_string(),
                        })
                    }
                },
                other => {
                    return Err(PolicyError::UnknownConditionKey {
                        rule: self.name.clone(),
                        key: other.to_string(),
                    })
                }
            };
            conditions.push(condition);
        }

        let allowed_providers = match &self.actions.allowed_providers {
            None => None,
            Some(ProviderListSpec::Sentinel(s)) if s == "unrestricted" => None,
            Some(ProviderListSpec::Sentinel(_)) => {
                return Err(PolicyError::InvalidProviderConstraint {
                    rule: self.name.clone(),
                })
            }
            Some(ProviderListSpec::List(providers)) => {
                if providers.is_empty() {
                    return Err(PolicyError::EmptyProviderList {
                        rule: self.name.clone(),
                    });
                }
                Some(providers.iter().cloned().collect::<BTreeSet<_>>())
            }
        };

        let allowed_models = self
            .actions
            .allowed_models
            .as_ref()
            .map(|models| models.iter().cloned().collect::<BTreeSet<_>>());

        Ok(PolicyRule {
            name: self.name.clone(),
            description: self.description.clone(),
            priority: self.priority,
            conditions,
            action: RuleAction {
                allowed_providers,
                require_human_review: self.actions.require_human_review,
                allowed_models,
            },
        })
    }
}

/// A rule-definition file: the external input shape for additional rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl RuleFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}

/// A typed, compiled condition. The set of keys is closed: anything else is
/// rejected when the rule is loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Context industry is one of these.
    IndustryIn(Vec<Industry>),

    /// Context classification is one of these.
    ClassificationIn(Vec<DataClassification>),

    /// Context classification is at least this sensitive.
    MinClassification(DataClassification),
}

impl Condition {
    pub fn matches(&self, context: &RequestContext) -> bool {
        match self {
            Self::IndustryIn(industries) => industries.contains(&context.industry),
            Self::ClassificationIn(levels) => levels.contains(&context.data_classification),
            Self::MinClassification(floor) => context.data_classification >= *floor,
        }
    }
}

/// The effect a matching rule applies to the running constraint state.
///
/// Every field only narrows: provider and model sets intersect, the review
/// bit only rises.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleAction {
    /// `None` means the rule places no provider constraint.
    pub allowed_providers: Option<BTreeSet<ProviderId>>,

    pub require_human_review: bool,

    /// `None` means the rule places no model constraint.
    pub allowed_models: Option<BTreeSet<String>>,
}

/// A compiled policy rule, immutable once part of a rule set.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyRule {
    pub name: String,
    pub description: String,
    pub priority: i32,
    pub conditions: Vec<Condition>,
    pub action: RuleAction,
}

impl PolicyRule {
    /// A rule matches when every declared condition holds; a rule with no
    /// conditions matches every context.
    pub fn matches(&self, context: &RequestContext) -> bool {
        self.conditions.iter().all(|c| c.matches(context))
    }
}

/// The rules every engine carries regardless of externally loaded sets.
///
/// Protected-data routing restricts to providers with a signed agreement;
/// regulated industries force human review; the lowest-priority rule is the
/// explicit unrestricted fallback.
pub fn baseline_rules(catalog: &ProviderCatalog) -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            name: "phi_requires_baa_provider".to_string(),
            description: "Protected health data may only be routed to providers with a signed BAA"
                .to_string(),
            priority: 100,
            conditions: vec![Condition::ClassificationIn(vec![
                DataClassification::Phi,
                DataClassification::Restricted,
            ])],
            action: RuleAction {
                allowed_providers: Some(catalog.baa_signed_ids()),
                ..RuleAction::default()
            },
        },
        PolicyRule {
            name: "healthcare_requires_review".to_string(),
            description: "Healthcare requests require human review before delivery".to_string(),
            priority: 90,
            conditions: vec![Condition::IndustryIn(vec![Industry::Healthcare])],
            action: RuleAction {
                require_human_review: true,
                ..RuleAction::default()
            },
        },
        PolicyRule {
            name: "financial_requires_review".to_string(),
            description: "Financial-services requests require human review before delivery"
                .to_string(),
            priority: 85,
            conditions: vec![Condition::IndustryIn(vec![Industry::Financial])],
            action: RuleAction {
                require_human_review: true,
                ..RuleAction::default()
            },
        },
        PolicyRule {
            name: "default_unrestricted".to_string(),
            description: "Fallback when no restriction applies".to_string(),
            priority: 0,
            conditions: vec![],
            action: RuleAction::default(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_from_yaml(yaml: &str) -> RuleSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_compile_membership_condition() {
        let spec = spec_from_yaml(
            r#"
name: phi_lockdown
priority: 100
conditions:
  data_classification: [phi, restricted]
actions:
  allowed_providers: [anthropic]
"#,
        );

        let rule = spec.compile().unwrap();
        assert_eq!(rule.priority, 100);

        let phi = RequestContext::new("r", "u", "p")
            .with_classification(DataClassification::Phi);
        let public = RequestContext::new("r", "u", "p")
            .with_classification(DataClassification::Public);
        assert!(rule.matches(&phi));
        assert!(!rule.matches(&public));
    }

    #[test]
    fn test_compile_threshold_condition() {
        let spec = spec_from_yaml(
            r#"
name: sensitive_floor
conditions:
  min_classification: confidential
actions:
  require_human_review: true
"#,
        );

        let rule = spec.compile().unwrap();
        let internal = RequestContext::new("r", "u", "p")
            .with_classification(DataClassification::Internal);
        let phi = RequestContext::new("r", "u", "p")
            .with_classification(DataClassification::Phi);
        assert!(!rule.matches(&internal));
        assert!(rule.matches(&phi));
    }

    #[test]
    fn test_unknown_condition_key_rejected() {
        let spec = spec_from_yaml(
            r#"
name: bad_rule
conditions:
  user_agent: curl
"#,
        );

        let err = spec.compile().unwrap_err();
        assert!(matches!(
            err,
            PolicyError::UnknownConditionKey { ref key, .. } if key == "user_agent"
        ));
    }

    #[test]
    fn test_unrestricted_sentinel() {
        let spec = spec_from_yaml(
            r#"
name: open_rule
actions:
  allowed_providers: unrestricted
"#,
        );

        let rule = spec.compile().unwrap();
        assert!(rule.action.allowed_providers.is_none());
    }

    #[test]
    fn test_bad_sentinel_rejected() {
        let spec = spec_from_yaml(
            r#"
name: typo_rule
actions:
  allowed_providers: unrestrcted
"#,
        );

        assert!(matches!(
            spec.compile(),
            Err(PolicyError::InvalidProviderConstraint { .. })
        ));
    }

    #[test]
    fn test_empty_provider_list_rejected() {
        let spec = spec_from_yaml(
            r#"
name: empty_rule
actions:
  allowed_providers: []
"#,
        );

        assert!(matches!(
            spec.compile(),
            Err(PolicyError::EmptyProviderList { .. })
        ));
    }

    #[test]
    fn test_rule_file_parsing() {
        let file = RuleFile::from_yaml(
            r#"
rules:
  - name: one
    priority: 10
  - name: two
    conditions:
      industry: healthcare
"#,
        )
        .unwrap();

        assert_eq!(file.rules.len(), 2);
        assert_eq!(file.rules[1].priority, 50);
    }

    #[test]
    fn test_baseline_rules_reference_catalog() {
        let catalog = ProviderCatalog::default();
        let rules = baseline_rules(&catalog);

        let phi_rule = rules
            .iter()
            .find(|r| r.name == "phi_requires_baa_provider")
            .unwrap();
        assert_eq!(
            phi_rule.action.allowed_providers.as_ref().unwrap(),
            &catalog.baa_signed_ids()
        );

        let fallback = rules.iter().find(|r| r.name == "default_unrestricted").unwrap();
        assert!(fallback.conditions.is_empty());
        assert!(fallback.action.allowed_providers.is_none());
    }
}
