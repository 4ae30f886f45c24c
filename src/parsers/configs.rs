//! Structural validators for configuration formats. These yield no
//! imports or functions; they only decide whether the content parses.

use super::{ParsedSource, StructuralParser};

pub struct JsonParser;

impl StructuralParser for JsonParser {
    fn language(&self) -> &'static str {
        "json"
    }

    fn parse(&self, source: &str) -> Result<ParsedSource, String> {
        serde_json::from_str::<serde_json::Value>(source)
            .map(|_| ParsedSource::default())
            .map_err(|e| e.to_string())
    }
}

pub struct TomlParser;

impl StructuralParser for TomlParser {
    fn language(&self) -> &'static str {
        "toml"
    }

    fn parse(&self, source: &str) -> Result<ParsedSource, String> {
        source
            .parse::<toml::Value>()
            .map(|_| ParsedSource::default())
            .map_err(|e| e.to_string())
    }
}

pub struct YamlParser;

impl StructuralParser for YamlParser {
    fn language(&self) -> &'static str {
        "yaml"
    }

    fn parse(&self, source: &str) -> Result<ParsedSource, String> {
        serde_yaml::from_str::<serde_yaml::Value>(source)
            .map(|_| ParsedSource::default())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_verdicts() {
        assert!(JsonParser.parse(r#"{"a": 1}"#).is_ok());
        assert!(JsonParser.parse(r#"{"a": }"#).is_err());
    }

    #[test]
    fn toml_verdicts() {
        assert!(TomlParser.parse("[package]\nname = \"x\"\n").is_ok());
        assert!(TomlParser.parse("package =").is_err());
    }

    #[test]
    fn yaml_verdicts() {
        assert!(YamlParser.parse("a: 1\nb:\n  - 2\n").is_ok());
        assert!(YamlParser.parse("a: [1, 2\n").is_err());
    }
}
