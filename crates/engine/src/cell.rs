use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single table value.
///
/// Everything compares as trimmed, case-folded text for join and search
/// purposes; the variant only matters for display and export.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

/// Exact structural key for a cell (hashable, orderable).
/// Used to deduplicate value tuples; `Text("x")` and `Text("X")` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellKey {
    Empty,
    Number(OrderedFloat<f64>),
    Text(String),
}

impl Cell {
    /// Parse user/CSV input. Blank input is `Empty`; a number is only
    /// recognised when it prints back to the same text, so identifiers
    /// like `007` or `1.50` keep their spelling.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Cell::Empty;
        }

        if let Ok(num) = trimmed.parse::<f64>() {
            if num.is_finite() && format_number(num) == trimmed {
                return Cell::Number(num);
            }
        }

        Cell::Text(trimmed.to_string())
    }

    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Stringified value. Empty cells render as "".
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
        }
    }

    /// Normalized join key: stringified, trimmed, case-folded.
    pub fn join_key(&self) -> String {
        normalize_key(&self.display())
    }

    pub fn key(&self) -> CellKey {
        match self {
            Cell::Empty => CellKey::Empty,
            Cell::Text(s) if s.is_empty() => CellKey::Empty,
            Cell::Text(s) => CellKey::Text(s.clone()),
            Cell::Number(n) => CellKey::Number(OrderedFloat(*n)),
        }
    }

    /// Case-insensitive substring test. `needle` must already be lowercased.
    pub fn contains_folded(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        self.display().to_lowercase().contains(needle)
    }
}

/// Normalize free text to join-key form (trim + lowercase).
pub fn normalize_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Integers print without decimals; everything else uses the shortest
/// round-trip representation.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::text(s)
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

// Wire form: "" for empty, plain JSON strings and numbers otherwise.
impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_str(""),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Cell::Number(n) => serializer.serialize_f64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(f64),
            Bool(bool),
            Text(String),
        }

        Ok(match Option::<Wire>::deserialize(deserializer)? {
            None => Cell::Empty,
            Some(Wire::Number(n)) => Cell::Number(n),
            Some(Wire::Bool(b)) => Cell::Text(if b { "TRUE" } else { "FALSE" }.to_string()),
            Some(Wire::Text(s)) => Cell::text(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_input_keeps_identifier_spelling() {
        assert_eq!(Cell::from_input("42"), Cell::Number(42.0));
        assert_eq!(Cell::from_input(" 2.5 "), Cell::Number(2.5));
        assert_eq!(Cell::from_input("007"), Cell::Text("007".into()));
        assert_eq!(Cell::from_input("1.50"), Cell::Text("1.50".into()));
        assert_eq!(Cell::from_input("   "), Cell::Empty);
        assert_eq!(Cell::from_input("abc"), Cell::Text("abc".into()));
    }

    #[test]
    fn join_key_folds_case_and_whitespace() {
        assert_eq!(Cell::Text("  ABC-1 ".into()).join_key(), "abc-1");
        assert_eq!(Cell::Number(12.0).join_key(), "12");
        assert_eq!(Cell::Empty.join_key(), "");
    }

    #[test]
    fn structural_key_distinguishes_case() {
        assert_ne!(Cell::Text("x".into()).key(), Cell::Text("X".into()).key());
        assert_eq!(Cell::Text(String::new()).key(), Cell::Empty.key());
        assert_eq!(Cell::Number(1.0).key(), Cell::Number(1.0).key());
    }

    #[test]
    fn empty_never_contains_non_empty_term() {
        assert!(!Cell::Empty.contains_folded("a"));
        assert!(Cell::Empty.contains_folded(""));
        assert!(Cell::Text("ABCdef".into()).contains_folded("abc"));
        assert!(Cell::Number(1234.0).contains_folded("23"));
    }

    #[test]
    fn wire_round_trip_shapes() {
        let cells = vec![Cell::Empty, Cell::Text("x".into()), Cell::Number(3.0), Cell::Number(0.5)];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r#"["","x",3,0.5]"#);

        let back: Vec<Cell> = serde_json::from_str(r#"["",null,"x",3,true]"#).unwrap();
        assert_eq!(
            back,
            vec![Cell::Empty, Cell::Empty, Cell::Text("x".into()), Cell::Number(3.0), Cell::Text("TRUE".into())]
        );
    }
}
