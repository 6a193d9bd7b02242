//! Config loading and merging.
//!
//! Every source is parsed into a `serde_json::Value` and folded into one
//! document: objects merge key by key, arrays append, anything else is
//! replaced by the later source.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigFormat, ConfigSource};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no config files to load")]
    NoSources,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {} as json: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {} as toml: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse {} as yaml: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{}: top-level config must be an object", path.display())]
    NotAnObject { path: PathBuf },
}

/// Load every source in order and merge them into one document.
pub fn merge_sources(source: &ConfigSource) -> Result<Value, LoadError> {
    if source.is_empty() {
        return Err(LoadError::NoSources);
    }

    let mut merged = Value::Object(Default::default());
    for path in source.paths() {
        let document = load_document(path, source.format().for_path(path))?;
        tracing::debug!(path = %path.display(), "Loaded config source");
        merge_into(&mut merged, document);
    }
    Ok(merged)
}

/// Parse a single config file in the given concrete format.
pub fn load_document(path: &Path, format: ConfigFormat) -> Result<Value, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value = match format {
        ConfigFormat::Toml => toml::from_str::<Value>(&content).map_err(|source| LoadError::Toml {
            path: path.to_path_buf(),
            source,
        })?,
        ConfigFormat::Yaml => serde_yaml::from_str::<Value>(&content).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        })?,
        ConfigFormat::Json | ConfigFormat::Auto => {
            serde_json::from_str::<Value>(&strip_json_comments(&content)).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            })?
        }
    };

    if !value.is_object() {
        return Err(LoadError::NotAnObject {
            path: path.to_path_buf(),
        });
    }
    Ok(value)
}

/// Fold `overlay` into `base`.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(overlay)) => base.extend(overlay),
        (base, overlay) => *base = overlay,
    }
}

/// Remove `//`, `/* */` and `#` comments that sit outside string literals.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '#' => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    if c == '\n' {
                        out.push('\n');
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

// Line numbers in parse errors stay accurate because the newline is kept.
fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    for c in chars.by_ref() {
        if c == '\n' {
            out.push('\n');
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_strip_comments_outside_strings() {
        let input = r#"{
            // line comment
            "a": "http://example.com", # hash comment
            /* block
               comment */ "b": "x#y/*z*/"
        }"#;
        let value: Value = serde_json::from_str(&strip_json_comments(input)).unwrap();
        assert_eq!(value, json!({"a": "http://example.com", "b": "x#y/*z*/"}));
    }

    #[test]
    fn test_strip_keeps_escaped_quotes() {
        let input = r#"{"a": "say \"hi\" // not a comment"}"#;
        let value: Value = serde_json::from_str(&strip_json_comments(input)).unwrap();
        assert_eq!(value["a"], "say \"hi\" // not a comment");
    }

    #[test]
    fn test_merge_rules() {
        let mut base = json!({
            "log": {"loglevel": "warning", "access": "none"},
            "inbounds": [{"tag": "socks"}],
            "version": 1
        });
        merge_into(
            &mut base,
            json!({
                "log": {"loglevel": "debug"},
                "inbounds": [{"tag": "http"}],
                "version": 2,
                "routing": {}
            }),
        );

        assert_eq!(
            base,
            json!({
                "log": {"loglevel": "debug", "access": "none"},
                "inbounds": [{"tag": "socks"}, {"tag": "http"}],
                "version": 2,
                "routing": {}
            })
        );
    }

    #[test]
    fn test_merge_mixed_formats_in_order() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("00-base.jsonc");
        let toml_path = dir.path().join("10-log.toml");
        let yaml_path = dir.path().join("20-out.yml");

        fs::write(&json_path, "{ // base\n \"log\": {\"loglevel\": \"warning\"}, \"outbounds\": [{\"protocol\": \"freedom\"}] }").unwrap();
        fs::write(&toml_path, "[log]\nloglevel = \"info\"\n").unwrap();
        fs::write(&yaml_path, "outbounds:\n  - protocol: blackhole\n").unwrap();

        let source = ConfigSource::new(vec![json_path, toml_path, yaml_path], ConfigFormat::Auto);
        let merged = merge_sources(&source).unwrap();

        assert_eq!(merged["log"]["loglevel"], "info");
        assert_eq!(
            merged["outbounds"],
            json!([{"protocol": "freedom"}, {"protocol": "blackhole"}])
        );
    }

    #[test]
    fn test_declared_format_overrides_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.conf");
        fs::write(&path, "[log]\nloglevel = \"debug\"\n").unwrap();

        let merged = merge_sources(&ConfigSource::new(vec![path], ConfigFormat::Toml)).unwrap();
        assert_eq!(merged["log"]["loglevel"], "debug");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = merge_sources(&ConfigSource::new(vec![missing], ConfigFormat::Auto)).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));

        let array = dir.path().join("array.json");
        fs::write(&array, "[1, 2]").unwrap();
        let err = merge_sources(&ConfigSource::new(vec![array], ConfigFormat::Auto)).unwrap_err();
        assert!(matches!(err, LoadError::NotAnObject { .. }));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ \"a\": ").unwrap();
        let err = merge_sources(&ConfigSource::new(vec![broken], ConfigFormat::Auto)).unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));

        let err = merge_sources(&ConfigSource::new(vec![], ConfigFormat::Auto)).unwrap_err();
        assert!(matches!(err, LoadError::NoSources));
    }
}
