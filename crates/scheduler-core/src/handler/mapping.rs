//! Declarative binding of task `type_code`s to handler factories.
//!
//! Operators ship a small text file naming which compiled-in factory backs
//! each `type_code` (`type_code=factory_name` per line, `#` comments and
//! blank lines ignored), instead of the engine hardcoding the binding. This
//! keeps the binary generic while still forbidding arbitrary code execution:
//! only factory names matching an allow-listed prefix are accepted.

use thiserror::Error;

use super::registry::{HandlerFactoryRegistry, HandlerRegistry};

/// Policy controlling how the mapping file is resolved.
#[derive(Debug, Clone)]
pub struct MappingConfig {
    /// Factory names must start with one of these prefixes.
    pub allowed_prefixes: Vec<String>,
    /// When `true`, a `type_code` bound more than once is an error instead
    /// of the later binding silently winning.
    pub strict: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: vec!["builtin.".to_owned(), "sample.".to_owned()],
            strict: false,
        }
    }
}

/// Errors resolving a mapping file into a live [`HandlerRegistry`].
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid mapping line (expected 'type_code=factory'): {0:?}")]
    InvalidLine(String),

    #[error("factory '{0}' does not match any allowed prefix")]
    DisallowedFactory(String),

    #[error("factory '{0}' is not registered in this binary")]
    UnknownFactory(String),

    #[error("type_code '{0}' is bound more than once")]
    DuplicateTypeCode(String),
}

/// Parse a mapping file and resolve every binding against `factories`,
/// producing a live [`HandlerRegistry`].
///
/// An empty or entirely-comment file is legal and produces an empty
/// registry.
pub fn load_mapping(
    text: &str,
    factories: &HandlerFactoryRegistry,
    config: &MappingConfig,
) -> Result<HandlerRegistry, MappingError> {
    let mut registry = HandlerRegistry::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((type_code, factory)) = line.split_once('=') else {
            return Err(MappingError::InvalidLine(raw_line.to_owned()));
        };
        let type_code = type_code.trim();
        let factory = factory.trim();
        if type_code.is_empty() || factory.is_empty() {
            return Err(MappingError::InvalidLine(raw_line.to_owned()));
        }

        let allowed = config
            .allowed_prefixes
            .iter()
            .any(|prefix| factory.starts_with(prefix.as_str()));
        if !allowed {
            return Err(MappingError::DisallowedFactory(factory.to_owned()));
        }

        if registry.get(type_code).is_some() {
            if config.strict {
                return Err(MappingError::DuplicateTypeCode(type_code.to_owned()));
            }
            tracing::warn!(type_code, "type_code already bound, keeping first binding");
            continue;
        }

        let handler = factories
            .construct(factory)
            .ok_or_else(|| MappingError::UnknownFactory(factory.to_owned()))?;

        registry.register(type_code, handler);
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_valid_mapping() {
        let text = "sample.index=sample.code_index\n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let registry = load_mapping(text, &factories, &MappingConfig::default()).unwrap();
        assert!(registry.get("sample.index").is_some());
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = "# a comment\n\nsample.index=sample.code_index\n   \n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let registry = load_mapping(text, &factories, &MappingConfig::default()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_file_is_legal() {
        let factories = HandlerFactoryRegistry::with_builtins();
        let registry = load_mapping("", &factories, &MappingConfig::default()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_disallowed_prefix() {
        let text = "evil=arbitrary.shellout\n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let err = load_mapping(text, &factories, &MappingConfig::default()).unwrap_err();
        assert!(matches!(err, MappingError::DisallowedFactory(_)));
    }

    #[test]
    fn rejects_unknown_factory() {
        let text = "sample.ghost=sample.does_not_exist\n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let err = load_mapping(text, &factories, &MappingConfig::default()).unwrap_err();
        assert!(matches!(err, MappingError::UnknownFactory(_)));
    }

    #[test]
    fn rejects_malformed_line() {
        let text = "not-a-binding-line\n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let err = load_mapping(text, &factories, &MappingConfig::default()).unwrap_err();
        assert!(matches!(err, MappingError::InvalidLine(_)));
    }

    #[test]
    fn strict_mode_rejects_duplicate_type_code() {
        let text = "sample.index=sample.code_index\nsample.index=sample.code_index\n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let strict = MappingConfig {
            strict: true,
            ..MappingConfig::default()
        };
        let err = load_mapping(text, &factories, &strict).unwrap_err();
        assert!(matches!(err, MappingError::DuplicateTypeCode(_)));
    }

    #[test]
    fn lenient_mode_keeps_first_binding() {
        let text = "sample.index=sample.code_index\nsample.index=sample.code_index\n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let registry = load_mapping(text, &factories, &MappingConfig::default()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lenient_mode_never_resolves_the_conflicting_binding() {
        // The second binding names a nonexistent factory. If lenient mode
        // actually let the later binding win, this would fail to resolve
        // it and error; first-wins skips it before construction is ever
        // attempted.
        let text = "sample.index=sample.code_index\nsample.index=sample.does_not_exist\n";
        let factories = HandlerFactoryRegistry::with_builtins();
        let registry = load_mapping(text, &factories, &MappingConfig::default()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("sample.index").is_some());
    }
}
