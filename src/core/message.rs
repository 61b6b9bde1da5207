use serde::{Deserialize, Serialize};

/// Warning and error codes emitted by the completion pipeline.
///
/// Codes are stable: human operators use them to locate the exact
/// discrepancy in the bookkeeping system.
pub mod codes {
    /// The rate lookup collaborator reported a communication error.
    pub const RATE_LOOKUP_FAILED: u32 = 810;
    /// The tax-type decision table produced no candidates; a safe default
    /// pair was substituted.
    pub const NO_VAT_TYPES: u32 = 811;
    /// A line's calculated rate matched no legally possible rate and the
    /// line cannot be split.
    pub const LINE_RATE_UNRESOLVED: u32 = 812;
    /// A corrective line was added to repair a total mismatch.
    pub const CORRECTIVE_LINE_ADDED: u32 = 820;
    /// Totals provably differ but too many fields are incomplete to
    /// synthesize a correction.
    pub const TOTALS_DIFFER: u32 = 821;
    /// No strategy could resolve all pending lines.
    pub const STRATEGY_FAILED: u32 = 822;
    /// No tax type is consistent with the line rates; the first candidate
    /// was adopted.
    pub const VAT_TYPE_UNDETERMINED: u32 = 823;
    /// Multiple tax types fit; the invoice may need splitting.
    pub const VAT_TYPE_MAY_SPLIT: u32 = 824;
    /// The lines mix incompatible tax regimes; the invoice must be split.
    pub const VAT_TYPE_MUST_SPLIT: u32 = 825;
    /// A 0%-rated line exists under a tax type that does not allow it.
    pub const ZERO_RATE_NOT_ALLOWED: u32 = 826;
    /// An empty customer email was replaced by the configured placeholder.
    pub const EMPTY_EMAIL_REPLACED: u32 = 827;
}

/// Severity of a collected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single diagnostic collected during completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub severity: Severity,
    /// Numeric code from [`codes`].
    pub code: u32,
    /// Optional tag identifying the emitting collaborator (e.g. "lookup").
    pub code_tag: Option<String>,
    /// Human-readable description.
    pub text: String,
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code_tag {
            Some(tag) => write!(f, "[{}:{}] {}", self.code, tag, self.text),
            None => write!(f, "[{}] {}", self.code, self.text),
        }
    }
}

/// Append-only sink the pipeline writes warnings and errors into.
///
/// The engine never throws for business-rule conditions; everything
/// recoverable ends up here, and the sink travels with the completed
/// invoice to the submission collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageSink {
    messages: Vec<Message>,
}

impl MessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn info(&mut self, code: u32, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Info,
            code,
            code_tag: None,
            text: text.into(),
        });
    }

    pub fn warning(&mut self, code: u32, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Warning,
            code,
            code_tag: None,
            text: text.into(),
        });
    }

    pub fn warning_tagged(&mut self, code: u32, tag: impl Into<String>, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Warning,
            code,
            code_tag: Some(tag.into()),
            text: text.into(),
        });
    }

    pub fn error(&mut self, code: u32, text: impl Into<String>) {
        self.add(Message {
            severity: Severity::Error,
            code,
            code_tag: None,
            text: text.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity >= Severity::Warning)
    }

    /// Whether a message with the given code was collected.
    pub fn has_code(&self, code: u32) -> bool {
        self.messages.iter().any(|m| m.code == code)
    }
}
