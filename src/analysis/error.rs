use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
            DiagnosticLevel::Info => write!(f, "info"),
        }
    }
}

impl Diagnostic {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: msg.into(),
            location: None,
        }
    }
    pub fn warning(msg: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: msg.into(),
            location: None,
        }
    }
    pub fn info(msg: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            message: msg.into(),
            location: None,
        }
    }

    /// 例: `page 2 "Bayes" / block b-17`, `asset sim_ab12cd34`
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
