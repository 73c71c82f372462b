//! The flattened, typed payload of every `DATA` statement in the program,
//! as produced by the (out of scope) DATA preprocessor, plus the label/line
//! restore points `RESTORE` can jump to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Int(i64),
    Double(f64),
    Str(String),
}

impl DataValue {
    /// The type tag word written alongside each DATA entry's payload
    /// (0 = int, 1 = double, 2 = string), per the program driver's DATA
    /// segment format.
    pub fn tag(&self) -> u32 {
        match self {
            DataValue::Int(_) => 0,
            DataValue::Double(_) => 1,
            DataValue::Str(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataPreprocessorResult {
    pub values: Vec<DataValue>,
    pub label_restore_points: BTreeMap<String, usize>,
    pub line_restore_points: BTreeMap<u32, usize>,
}

impl DataPreprocessorResult {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_the_driver_segment_encoding() {
        assert_eq!(DataValue::Int(1).tag(), 0);
        assert_eq!(DataValue::Double(1.0).tag(), 1);
        assert_eq!(DataValue::Str("x".to_string()).tag(), 2);
    }

    #[test]
    fn default_result_is_empty() {
        assert!(DataPreprocessorResult::default().is_empty());
    }

    #[test]
    fn result_with_values_is_not_empty() {
        let result = DataPreprocessorResult {
            values: vec![DataValue::Int(1)],
            label_restore_points: BTreeMap::new(),
            line_restore_points: BTreeMap::new(),
        };
        assert!(!result.is_empty());
    }
}
