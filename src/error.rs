//! Error type for code generation operations.
//!
//! Mirrors the three error categories from the design: internal invariant
//! violations and compile-time feature errors are non-fatal by policy (the
//! caller may choose to keep going and treat the returned string as a
//! diagnostic), while `Format` surfaces `std::fmt::Write` failures on the
//! output buffer, which are effectively infallible in practice.

#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error in code generation (missing symbol, malformed CFG,
    /// unknown edge type, and the like).
    Logic(String),
    /// A formatting error while writing IL text.
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "IL generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

impl CodeGenError {
    pub fn undefined_variable(name: &str) -> Self {
        CodeGenError::Logic(format!("undefined variable '{}'", name))
    }

    pub fn undefined_function(name: &str) -> Self {
        CodeGenError::Logic(format!("undefined function/sub '{}'", name))
    }

    pub fn undefined_type(name: &str) -> Self {
        CodeGenError::Logic(format!("undefined user-defined type '{}'", name))
    }

    pub fn malformed_cfg(detail: impl Into<String>) -> Self {
        CodeGenError::Logic(format!("malformed CFG: {}", detail.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_format_a_readable_message() {
        assert_eq!(CodeGenError::undefined_variable("X%").to_string(), "undefined variable 'X%'");
        assert_eq!(CodeGenError::undefined_function("FOO").to_string(), "undefined function/sub 'FOO'");
        assert_eq!(CodeGenError::undefined_type("Point").to_string(), "undefined user-defined type 'Point'");
        assert_eq!(CodeGenError::malformed_cfg("no out edges").to_string(), "malformed CFG: no out edges");
    }

    #[test]
    fn format_error_wraps_fmt_error_display() {
        let fmt_err = std::fmt::Error;
        let err: CodeGenError = fmt_err.into();
        assert!(err.to_string().starts_with("IL generation error:"));
    }

    #[test]
    fn implements_std_error() {
        let err = CodeGenError::undefined_variable("X");
        let _: &dyn std::error::Error = &err;
    }
}
