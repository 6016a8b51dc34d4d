use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub const SAMPLE_VALUES: usize = 5;

/// Semantic type of a column, either detected or declared by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Date,
    Numeric,
    Categorical,
    Text,
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariableType::Date => "date",
            VariableType::Numeric => "numeric",
            VariableType::Categorical => "categorical",
            VariableType::Text => "text",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(VariableType::Date),
            "numeric" => Ok(VariableType::Numeric),
            "categorical" => Ok(VariableType::Categorical),
            "text" => Ok(VariableType::Text),
            other => Err(format!("Unknown variable type: {}", other)),
        }
    }
}

/// Granularity that date values are floored to before counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRounding {
    Year,
    Month,
    Week,
    #[default]
    Day,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub detected_type: VariableType,
    pub missingness: usize,
    pub missingness_percent: f64,
    pub unique_count: usize,
    pub sample_values: SmallVec<[String; SAMPLE_VALUES]>,
    pub total_count: usize,
}

/// Outcome of a single assumption check attached to a test or model.
#[derive(Debug, Clone, Serialize)]
pub struct AssumptionCheck {
    pub method: String,
    pub p_value: Option<f64>,
    pub passed: bool,
}

impl AssumptionCheck {
    pub fn at_05(method: &str, p_value: Option<f64>) -> Self {
        Self {
            method: method.to_string(),
            p_value,
            passed: p_value.map_or(false, |p| p > 0.05),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_type_wire_names() {
        let json = serde_json::to_string(&VariableType::Categorical).unwrap();
        assert_eq!(json, "\"categorical\"");
        let parsed: VariableType = serde_json::from_str("\"date\"").unwrap();
        assert_eq!(parsed, VariableType::Date);
        assert!(serde_json::from_str::<VariableType>("\"boolean\"").is_err());
        assert_eq!("text".parse::<VariableType>(), Ok(VariableType::Text));
        assert_eq!(
            "boolean".parse::<VariableType>(),
            Err("Unknown variable type: boolean".to_string())
        );
    }

    #[test]
    fn assumption_passes_above_threshold() {
        assert!(AssumptionCheck::at_05("Levene", Some(0.2)).passed);
        assert!(!AssumptionCheck::at_05("Levene", Some(0.01)).passed);
        assert!(!AssumptionCheck::at_05("Levene", None).passed);
    }
}
