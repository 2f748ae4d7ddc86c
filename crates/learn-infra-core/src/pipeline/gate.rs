// Guarded stage transitions
//
// A guard is evaluated against the run's pipeline variables before the stage
// is entered. When it does not hold, the stage is skipped rather than failed.

use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Enter,
    Skip,
}

/// `variable == expected`, the only guard the pipeline needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableCheck {
    pub variable: String,
    pub expected: String,
}

impl VariableCheck {
    pub fn equals(variable: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            expected: expected.into(),
        }
    }

    /// An unset variable never satisfies the check
    pub fn evaluate(&self, variables: &BTreeMap<String, String>) -> GuardOutcome {
        match variables.get(&self.variable) {
            Some(value) if *value == self.expected => GuardOutcome::Enter,
            _ => GuardOutcome::Skip,
        }
    }

    /// Render as a CodePipeline V2 `BeforeEntry` condition. A failed
    /// VariableCheck rule with result SKIP skips the stage.
    pub fn to_condition(&self) -> Value {
        json!({
            "Conditions": [{
                "Result": "SKIP",
                "Rules": [{
                    "Name": format!("{}-check", self.variable.to_lowercase()),
                    "RuleTypeId": {
                        "Category": "Rule",
                        "Owner": "AWS",
                        "Provider": "VariableCheck",
                        "Version": "1",
                    },
                    "Configuration": {
                        "Variable": format!("#{{variables.{}}}", self.variable),
                        "Value": self.expected,
                        "Operator": "EQ",
                    },
                }],
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_evaluate() {
        let guard = VariableCheck::equals("TRIGGER", "github");
        assert_eq!(guard.evaluate(&vars(&[("TRIGGER", "github")])), GuardOutcome::Enter);
        assert_eq!(guard.evaluate(&vars(&[("TRIGGER", "lambda")])), GuardOutcome::Skip);
        assert_eq!(guard.evaluate(&vars(&[])), GuardOutcome::Skip);
    }

    #[test]
    fn test_condition_shape() {
        let condition = VariableCheck::equals("TRIGGER", "github").to_condition();
        let rule = &condition["Conditions"][0]["Rules"][0];
        assert_eq!(condition["Conditions"][0]["Result"], "SKIP");
        assert_eq!(rule["RuleTypeId"]["Provider"], "VariableCheck");
        assert_eq!(rule["Configuration"]["Variable"], "#{variables.TRIGGER}");
        assert_eq!(rule["Configuration"]["Value"], "github");
        assert_eq!(rule["Configuration"]["Operator"], "EQ");
    }
}
