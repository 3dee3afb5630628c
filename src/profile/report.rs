use std::fmt;

/// Outcome of a profile audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileReport {
    /// Certificate chain, hostname and OCSP problems
    pub validation_errors: Vec<String>,
    /// Deviations from the profile
    pub profile_errors: Vec<String>,
}

impl ProfileReport {
    pub fn validated(&self) -> bool {
        self.validation_errors.is_empty()
    }

    pub fn profile_matched(&self) -> bool {
        self.profile_errors.is_empty()
    }

    pub fn all_ok(&self) -> bool {
        self.validated() && self.profile_matched()
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation errors:")?;
        for error in &self.validation_errors {
            writeln!(f, "  - {}", error)?;
        }
        writeln!(f, "Profile errors:")?;
        for error in &self.profile_errors {
            writeln!(f, "  - {}", error)?;
        }
        writeln!(f, "Validated: {}", self.validated())?;
        writeln!(f, "Profile matched: {}", self.profile_matched())?;
        write!(f, "All ok: {}", self.all_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let mut report = ProfileReport::default();
        assert!(report.all_ok());

        report.profile_errors.push("must not support \"TLSv1\"".to_string());
        assert!(report.validated());
        assert!(!report.profile_matched());
        assert!(!report.all_ok());
    }

    #[test]
    fn test_display() {
        let report = ProfileReport {
            validation_errors: vec!["validation not successful: UnknownIssuer".to_string()],
            profile_errors: vec![],
        };
        let text = report.to_string();
        assert!(text.contains("  - validation not successful: UnknownIssuer"));
        assert!(text.contains("Validated: false"));
        assert!(text.ends_with("All ok: false"));
    }
}
