//! Compound row labels of the form `<source>:<region>[:<depth suffix>]`.

use std::fmt;

pub const LABEL_DELIMITER: char = ':';

/// Structured view of a row label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLabel {
    pub source_key: String,
    pub region_name: String,
    /// Everything after the second field, delimiters preserved.
    pub depth_suffix: Option<String>,
}

impl DecodedLabel {
    /// Decode a label. `None` for an absent label or fewer than two fields.
    pub fn decode(label: Option<&str>) -> Option<Self> {
        let mut fields = label?.splitn(3, LABEL_DELIMITER);
        let source_key = fields.next()?;
        let region_name = fields.next()?;
        Some(Self {
            source_key: source_key.to_string(),
            region_name: region_name.to_string(),
            depth_suffix: fields.next().map(str::to_string),
        })
    }

    /// Both the source key and the region name are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.source_key.is_empty() && !self.region_name.is_empty()
    }

    /// The suffix when it carries any text. `"a:b:"` decodes to an empty
    /// suffix, which matches like a label without one.
    pub fn nonempty_suffix(&self) -> Option<&str> {
        self.depth_suffix.as_deref().filter(|s| !s.is_empty())
    }
}

impl fmt::Display for DecodedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{LABEL_DELIMITER}{}", self.source_key, self.region_name)?;
        if let Some(suffix) = &self.depth_suffix {
            write!(f, "{LABEL_DELIMITER}{suffix}")?;
        }
        Ok(())
    }
}
