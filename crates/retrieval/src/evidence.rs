//! Evidence units and tool-output normalization
//!
//! Every tool result, whatever its shape, is turned into at least one
//! [`EvidenceUnit`] before anything is indexed or ranked.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of payload a unit carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Text,
    Image,
}

/// Unit payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    /// Base64-encoded image bytes
    Image {
        data: String,
        mime_type: Option<String>,
    },
}

/// Which metadata entries a rendering includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    /// Every entry (retrieval traces)
    All,
    /// Entries visible to the generation step
    Llm,
    /// Entries visible to relevance scoring
    Embed,
    /// Content only
    None,
}

/// One metadata key/value pair with its visibility flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    /// Hidden from relevance scoring
    pub exclude_embed: bool,
    /// Hidden from the generation context
    pub exclude_llm: bool,
}

impl MetadataEntry {
    fn visible(&self, mode: MetadataMode) -> bool {
        match mode {
            MetadataMode::All => true,
            MetadataMode::Llm => !self.exclude_llm,
            MetadataMode::Embed => !self.exclude_embed,
            MetadataMode::None => false,
        }
    }
}

/// An immutable unit of retrievable content
///
/// Units are assembled with the `with_*` builders and never change once
/// handed to an index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceUnit {
    id: Uuid,
    content: Content,
    metadata: Vec<MetadataEntry>,
    source_link: Option<String>,
}

impl EvidenceUnit {
    /// Create a text unit
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: Content::Text { text: text.into() },
            metadata: Vec::new(),
            source_link: None,
        }
    }

    /// Create an image unit from an already-encoded payload
    pub fn image(data: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: Content::Image {
                data: data.into(),
                mime_type,
            },
            metadata: Vec::new(),
            source_link: None,
        }
    }

    /// A chunk of `parent`, sharing its metadata and source
    pub(crate) fn derived(id: Uuid, parent: &EvidenceUnit, text: &str) -> Self {
        Self {
            id,
            content: Content::Text { text: text.to_string() },
            metadata: parent.metadata.clone(),
            source_link: parent.source_link.clone(),
        }
    }

    /// Copy of this unit under another id
    pub(crate) fn with_id(&self, id: Uuid) -> Self {
        Self { id, ..self.clone() }
    }

    /// Add a metadata entry visible everywhere
    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_metadata_flags(key, value, false, false)
    }

    /// Add a metadata entry with explicit visibility
    pub fn with_metadata_flags(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        exclude_embed: bool,
        exclude_llm: bool,
    ) -> Self {
        self.metadata.push(MetadataEntry {
            key: key.into(),
            value: value.into(),
            exclude_embed,
            exclude_llm,
        });
        self
    }

    /// Record where the unit came from
    pub fn with_source_link(mut self, link: impl Into<String>) -> Self {
        self.source_link = Some(link.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> UnitKind {
        match self.content {
            Content::Text { .. } => UnitKind::Text,
            Content::Image { .. } => UnitKind::Image,
        }
    }

    pub fn raw_content(&self) -> &Content {
        &self.content
    }

    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /// Look up a metadata value by key
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.value.as_str())
    }

    pub fn source_link(&self) -> Option<&str> {
        self.source_link.as_deref()
    }

    /// Text payload; empty for images
    pub fn text_content(&self) -> &str {
        match &self.content {
            Content::Text { text } => text,
            Content::Image { .. } => "",
        }
    }

    /// Render the unit with the metadata visible in `mode`
    ///
    /// Visible entries are rendered as `key: value` lines followed by a blank
    /// line and the text. Without visible entries the text is returned as is.
    pub fn content(&self, mode: MetadataMode) -> String {
        let header: Vec<String> = self
            .metadata
            .iter()
            .filter(|m| m.visible(mode))
            .map(|m| format!("{}: {}", m.key, m.value))
            .collect();

        if header.is_empty() {
            self.text_content().to_string()
        } else {
            format!("{}\n\n{}", header.join("\n"), self.text_content())
        }
    }
}

/// Output of a tool call, tagged at the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Text(String),
    Unit(EvidenceUnit),
    Structured(serde_json::Value),
    Sequence(Vec<RawOutput>),
}

impl From<serde_json::Value> for RawOutput {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => RawOutput::Text(s),
            serde_json::Value::Array(items) => {
                RawOutput::Sequence(items.into_iter().map(RawOutput::from).collect())
            }
            other => RawOutput::Structured(other),
        }
    }
}

impl From<Vec<EvidenceUnit>> for RawOutput {
    fn from(units: Vec<EvidenceUnit>) -> Self {
        RawOutput::Sequence(units.into_iter().map(RawOutput::Unit).collect())
    }
}

impl From<&str> for RawOutput {
    fn from(text: &str) -> Self {
        RawOutput::Text(text.to_string())
    }
}

impl fmt::Display for RawOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawOutput::Text(text) => f.write_str(text),
            RawOutput::Unit(unit) => f.write_str(&unit.content(MetadataMode::All)),
            RawOutput::Structured(value) => write!(f, "{}", value),
            RawOutput::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Coerce any tool output into evidence units
///
/// Never fails and never returns an empty sequence: sequence elements are
/// coerced one by one (typed units pass through, anything else becomes a
/// text unit of its string form), a lone unit or string becomes a
/// one-element sequence, and anything else (including an empty sequence) is
/// wrapped as its string form.
pub fn normalize(raw: RawOutput) -> Vec<EvidenceUnit> {
    match raw {
        RawOutput::Sequence(items) if !items.is_empty() => items
            .into_iter()
            .map(|item| match item {
                RawOutput::Unit(unit) => unit,
                RawOutput::Text(text) => EvidenceUnit::text(text),
                other => EvidenceUnit::text(other.to_string()),
            })
            .collect(),
        RawOutput::Unit(unit) => vec![unit],
        RawOutput::Text(text) => vec![EvidenceUnit::text(text)],
        other => vec![EvidenceUnit::text(other.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_becomes_single_unit() {
        let units = normalize(RawOutput::Text("Paris is the capital of France.".into()));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind(), UnitKind::Text);
        assert_eq!(units[0].text_content(), "Paris is the capital of France.");
    }

    #[test]
    fn test_sequence_keeps_order_and_typed_units() {
        let image = EvidenceUnit::image("aGVsbG8=", Some("image/png".into()));
        let image_id = image.id();
        let raw = RawOutput::Sequence(vec![
            RawOutput::Text("first".into()),
            RawOutput::Unit(image),
            RawOutput::Structured(json!({ "title": "Paris" })),
        ]);

        let units = normalize(raw);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].text_content(), "first");
        assert_eq!(units[1].id(), image_id);
        assert_eq!(units[1].kind(), UnitKind::Image);
        assert_eq!(units[2].text_content(), r#"{"title":"Paris"}"#);
    }

    #[test]
    fn test_structured_record_uses_string_form() {
        let units = normalize(RawOutput::Structured(json!(42)));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text_content(), "42");
    }

    #[test]
    fn test_empty_sequence_still_yields_a_unit() {
        let units = normalize(RawOutput::Sequence(vec![]));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text_content(), "[]");
    }

    #[test]
    fn test_nested_sequence_is_stringified() {
        let raw = RawOutput::Sequence(vec![RawOutput::Sequence(vec![
            RawOutput::Text("a".into()),
            RawOutput::Text("b".into()),
        ])]);
        let units = normalize(raw);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text_content(), "[a, b]");
    }

    #[test]
    fn test_json_arrays_become_sequences() {
        let raw = RawOutput::from(json!(["one", "two"]));
        assert_eq!(
            raw,
            RawOutput::Sequence(vec![RawOutput::Text("one".into()), RawOutput::Text("two".into())])
        );
    }

    #[test]
    fn test_metadata_modes() {
        let unit = EvidenceUnit::text("Body")
            .with_metadata("title", "Paris")
            .with_metadata_flags("Link", "https://example.org", true, true);

        assert_eq!(unit.content(MetadataMode::Llm), "title: Paris\n\nBody");
        assert_eq!(unit.content(MetadataMode::Embed), "title: Paris\n\nBody");
        assert_eq!(
            unit.content(MetadataMode::All),
            "title: Paris\nLink: https://example.org\n\nBody"
        );
        assert_eq!(unit.content(MetadataMode::None), "Body");
    }

    #[test]
    fn test_hidden_metadata_only_leaves_text() {
        let unit = EvidenceUnit::text("Body").with_metadata_flags("Link", "x", true, true);
        assert_eq!(unit.content(MetadataMode::Llm), "Body");
        assert_eq!(unit.metadata_value("Link"), Some("x"));
    }
}
