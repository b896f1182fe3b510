use thiserror::Error;

/// Failures the progression core can report. Everything else degrades to "ignored".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    #[error("invalid input: {field} must be non-negative, got {value}")]
    InvalidInput { field: &'static str, value: i64 },
}

pub type Result<T> = std::result::Result<T, ProgressionError>;

pub(crate) fn non_negative(field: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| ProgressionError::InvalidInput { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_values_are_rejected_with_field_name() {
        let err = non_negative("total_xp", -5).unwrap_err();
        assert_eq!(
            err,
            ProgressionError::InvalidInput {
                field: "total_xp",
                value: -5
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid input: total_xp must be non-negative, got -5"
        );
    }

    #[test]
    fn zero_is_accepted() {
        assert_eq!(non_negative("base_xp", 0), Ok(0));
    }
}
