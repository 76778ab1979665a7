use crate::domain::errors::ValidationError;

/// A validated, normalized stock ticker symbol.
///
/// Symbols are upper-cased and trimmed on construction, 1 to 10 characters,
/// ASCII letters/digits plus the separators seen in real tickers (`.` `-`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_uppercase();

        if normalized.is_empty() {
            return Err(ValidationError::MissingSymbol);
        }

        if normalized.len() > 10 {
            return Err(ValidationError::InvalidSymbol);
        }

        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(ValidationError::InvalidSymbol);
        }

        Ok(Symbol(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
