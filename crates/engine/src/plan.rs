//! Multi-target match plans read from TOML.
//!
//! ```toml
//! source_table = "orders"
//! source_column = "customer_id"
//!
//! [[targets]]
//! target_table = "customers"
//! target_match_column = "id"
//! target_columns = ["name", "region"]
//!
//! [[targets.conditions]]
//! source_column = "region"
//! target_column = "region"
//! ```

use crate::error::MatchError;
use crate::model::MultiMatchRequest;

impl MultiMatchRequest {
    pub fn from_toml(input: &str) -> Result<Self, MatchError> {
        let plan = Self::parse_toml(input)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Parse without validating. The source may be left out of the file
    /// and supplied by the caller before `validate`.
    pub fn parse_toml(input: &str) -> Result<Self, MatchError> {
        toml::from_str(input).map_err(|e| MatchError::PlanParse(e.to_string()))
    }

    /// Structural checks only. Column existence depends on the loaded
    /// tables and the order of the steps, so it is checked while running.
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.source_table.trim().is_empty() {
            return Err(MatchError::PlanValidation("source_table must not be blank".into()));
        }
        if self.source_column.trim().is_empty() {
            return Err(MatchError::PlanValidation("source_column must not be blank".into()));
        }
        if self.targets.is_empty() {
            return Err(MatchError::PlanValidation("at least one target is required".into()));
        }

        for (i, spec) in self.targets.iter().enumerate() {
            let step = i + 1;
            if spec.target_table.trim().is_empty() {
                return Err(MatchError::PlanValidation(format!(
                    "target {step}: target_table must not be blank"
                )));
            }
            if spec.target_match_column.trim().is_empty() {
                return Err(MatchError::PlanValidation(format!(
                    "target {step} ('{}'): target_match_column must not be blank",
                    spec.target_table
                )));
            }
            if spec.source_column.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(MatchError::PlanValidation(format!(
                    "target {step} ('{}'): source_column must not be blank",
                    spec.target_table
                )));
            }
            for cond in &spec.conditions {
                if cond.source_column.trim().is_empty() || cond.target_column.trim().is_empty() {
                    return Err(MatchError::PlanValidation(format!(
                        "target {step} ('{}'): condition columns must not be blank",
                        spec.target_table
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
source_table = "orders"
source_column = "cust"

[[targets]]
target_table = "customers"
target_match_column = "id"
target_columns = ["name", "region"]

[[targets.conditions]]
source_column = "region"
target_column = "region"

[[targets]]
source_column = "region(customers)"
target_table = "reps"
target_match_column = "region"
target_columns = ["rep"]
"#;

    #[test]
    fn parse_two_step_plan() {
        let plan = MultiMatchRequest::from_toml(PLAN).unwrap();
        assert_eq!(plan.source_table, "orders");
        assert_eq!(plan.targets.len(), 2);
        assert_eq!(plan.targets[0].conditions.len(), 1);
        assert_eq!(plan.targets[0].source_column, None);
        assert_eq!(plan.targets[1].source_column.as_deref(), Some("region(customers)"));
        assert!(plan.targets[1].conditions.is_empty());
    }

    #[test]
    fn rejects_plan_without_targets() {
        let err = MultiMatchRequest::from_toml(
            "source_table = \"a\"\nsource_column = \"b\"\ntargets = []\n",
        )
        .unwrap_err();
        assert!(matches!(err, MatchError::PlanValidation(_)));
    }

    #[test]
    fn rejects_blank_match_column() {
        let input = PLAN.replace("target_match_column = \"id\"", "target_match_column = \" \"");
        let err = MultiMatchRequest::from_toml(&input).unwrap_err();
        assert_eq!(
            err.to_string(),
            "match plan validation error: target 1 ('customers'): target_match_column must not be blank"
        );
    }

    #[test]
    fn source_may_come_from_the_caller() {
        let input = PLAN.replace("source_table = \"orders\"\n", "");
        assert!(matches!(
            MultiMatchRequest::from_toml(&input).unwrap_err(),
            MatchError::PlanValidation(_)
        ));

        let mut plan = MultiMatchRequest::parse_toml(&input).unwrap();
        assert_eq!(plan.source_table, "");
        plan.source_table = "orders".into();
        plan.validate().unwrap();
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = MultiMatchRequest::from_toml("source_table = ").unwrap_err();
        assert!(matches!(err, MatchError::PlanParse(_)));
    }
}
