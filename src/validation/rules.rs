use crate::models::Value;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    String,
    Integer,
    Float,
    Boolean,
}

impl SemanticType {
    /// Whether an already-coerced cell carries this type.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (SemanticType::String, Value::Text(_))
                | (SemanticType::Integer, Value::Integer(_))
                | (SemanticType::Float, Value::Float(_))
                | (SemanticType::Float, Value::Integer(_))
                | (SemanticType::Boolean, Value::Boolean(_))
        )
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticType::String => write!(f, "string"),
            SemanticType::Integer => write!(f, "integer"),
            SemanticType::Float => write!(f, "float"),
            SemanticType::Boolean => write!(f, "boolean"),
        }
    }
}

/// Value check applied to non-null, correctly typed cells.
#[derive(Debug, Clone)]
pub enum Constraint {
    None,
    /// Closed interval `[min, max]`.
    Range { min: f64, max: f64 },
    /// `0` ("not measured") or the closed interval `[min, max]`.
    RangeOrZero { min: f64, max: f64 },
    OneOf(Vec<&'static str>),
    MaxLength(usize),
    Custom {
        name: &'static str,
        predicate: fn(&Value) -> bool,
    },
}

impl Constraint {
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Constraint::None => true,
            Constraint::Range { min, max } => value.as_f64().is_some_and(|x| in_range(x, *min, *max)),
            Constraint::RangeOrZero { min, max } => {
                value.as_f64().is_some_and(|x| range_or_zero(x, *min, *max))
            }
            Constraint::OneOf(allowed) => {
                let text = value.to_text();
                allowed.iter().any(|a| *a == text)
            }
            Constraint::MaxLength(max) => value.to_text().chars().count() <= *max,
            Constraint::Custom { predicate, .. } => predicate(value),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::None => write!(f, "none"),
            Constraint::Range { min, max } => write!(f, "in_range({min}, {max})"),
            Constraint::RangeOrZero { min, max } => write!(f, "zero_or_in_range({min}, {max})"),
            Constraint::OneOf(allowed) => {
                let quoted: Vec<String> = allowed.iter().map(|a| format!("'{a}'")).collect();
                write!(f, "isin([{}])", quoted.join(", "))
            }
            Constraint::MaxLength(max) => write!(f, "str_length(max={max})"),
            Constraint::Custom { name, .. } => write!(f, "{name}"),
        }
    }
}

pub fn in_range(x: f64, min: f64, max: f64) -> bool {
    x >= min && x <= max
}

/// `0` is always accepted: it marks a value that was not measured.
pub fn range_or_zero(x: f64, min: f64, max: f64) -> bool {
    x == 0.0 || in_range(x, min, max)
}

/// Rule for one column of a dataset.
#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub column: &'static str,
    pub semantic_type: SemanticType,
    pub nullable: bool,
    /// Whether the column must be present in the input.
    pub required: bool,
    pub default: Option<Value>,
    pub constraint: Constraint,
}

impl ColumnRule {
    fn new(column: &'static str, semantic_type: SemanticType) -> Self {
        Self {
            column,
            semantic_type,
            nullable: false,
            required: true,
            default: None,
            constraint: Constraint::None,
        }
    }

    pub fn string(column: &'static str) -> Self {
        Self::new(column, SemanticType::String)
    }

    pub fn integer(column: &'static str) -> Self {
        Self::new(column, SemanticType::Integer)
    }

    pub fn float(column: &'static str) -> Self {
        Self::new(column, SemanticType::Float)
    }

    pub fn boolean(column: &'static str) -> Self {
        Self::new(column, SemanticType::Boolean)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Constraint::Range { min, max };
        self
    }

    pub fn range_or_zero(mut self, min: f64, max: f64) -> Self {
        self.constraint = Constraint::RangeOrZero { min, max };
        self
    }

    pub fn one_of(mut self, allowed: &[&'static str]) -> Self {
        self.constraint = Constraint::OneOf(allowed.to_vec());
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.constraint = Constraint::MaxLength(max);
        self
    }

    pub fn custom(mut self, name: &'static str, predicate: fn(&Value) -> bool) -> Self {
        self.constraint = Constraint::Custom { name, predicate };
        self
    }
}

/// The rules of one dataset. Columns without a rule pass through unchecked.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub dataset: &'static str,
    pub columns: Vec<ColumnRule>,
}

impl RuleSet {
    pub fn rule(&self, column: &str) -> Option<&ColumnRule> {
        self.columns.iter().find(|r| r.column == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_range_inclusive_bounds() {
        let c = Constraint::Range { min: 1.0, max: 3.0 };
        assert!(c.check(&Value::Integer(1)));
        assert!(c.check(&Value::Float(3.0)));
        assert!(!c.check(&Value::Float(3.01)));
        assert!(!c.check(&Value::Integer(0)));
    }

    #[test]
    fn test_range_or_zero_accepts_zero() {
        let c = Constraint::RangeOrZero { min: 7.0, max: 800.0 };
        assert!(c.check(&Value::Float(0.0)));
        assert!(c.check(&Value::Float(7.0)));
        assert!(!c.check(&Value::Float(6.9)));
        assert!(!c.check(&Value::Float(-1.0)));
    }

    #[test]
    fn test_one_of_compares_text() {
        let c = Constraint::OneOf(vec!["", "100", "200"]);
        assert!(c.check(&Value::from("100")));
        assert!(c.check(&Value::from("")));
        assert!(!c.check(&Value::from("300")));
    }

    #[test]
    fn test_max_length_counts_chars() {
        let c = Constraint::MaxLength(4);
        assert!(c.check(&Value::from("žluť")));
        assert!(!c.check(&Value::from("žluťo")));
    }

    #[test]
    fn test_custom_predicate() {
        fn even(v: &Value) -> bool {
            v.as_i64().is_some_and(|i| i % 2 == 0)
        }
        let rule = ColumnRule::integer("n").custom("even", even);
        assert!(rule.constraint.check(&Value::Integer(4)));
        assert!(!rule.constraint.check(&Value::Integer(5)));
        assert_eq!(rule.constraint.to_string(), "even");
    }

    #[test]
    fn test_semantic_type_matching() {
        assert!(SemanticType::Float.matches(&Value::Integer(3)));
        assert!(!SemanticType::Integer.matches(&Value::Float(3.0)));
        assert!(!SemanticType::Float.matches(&Value::from("3,5")));
    }

    #[test]
    fn test_constraint_display() {
        assert_eq!(Constraint::OneOf(vec!["A", "N"]).to_string(), "isin(['A', 'N'])");
        assert_eq!(
            Constraint::RangeOrZero { min: 1.3, max: 80.0 }.to_string(),
            "zero_or_in_range(1.3, 80)"
        );
    }

    proptest! {
        #[test]
        fn prop_zero_always_valid(min in -1000.0f64..1000.0, width in 0.0f64..1000.0) {
            prop_assert!(range_or_zero(0.0, min, min + width));
        }

        #[test]
        fn prop_outside_nonzero_fails(min in 1.0f64..100.0, width in 0.0f64..100.0, offset in 0.001f64..500.0) {
            let max = min + width;
            prop_assert!(!range_or_zero(max + offset, min, max));
            let below = min - offset;
            prop_assume!(below != 0.0);
            prop_assert!(!range_or_zero(below, min, max));
        }

        #[test]
        fn prop_inside_valid(min in 1.0f64..100.0, width in 0.0f64..100.0, t in 0.0f64..=1.0) {
            let x = min + width * t;
            prop_assert!(range_or_zero(x, min, min + width));
        }
    }
}
