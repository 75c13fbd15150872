//! Credential resolution for connectors.
//!
//! Each connector declares the credential names it requires or accepts.
//! Resolution walks a fixed, documented source order and stops at the first
//! source that yields a non-empty value:
//!
//! 1. Explicit value passed in configuration
//! 2. Environment variable(s) declared for the name
//! 3. A designated file path (contents trimmed)
//! 4. Interactive stdin prompt — only when explicitly allowed
//! 5. An external secret store, if the connector declares one
//!
//! Resolved credentials are memoized for the lifetime of the resolver.
//! Repeated resolution returns the cached value; `refresh` invalidates the
//! entry and resolves again. The cache is read-mostly and lock-free on the
//! read path.
//!
//! # Security
//! - A `Credential` value is never serialized and its `Debug` form redacts it
//! - Values are held in memory only; nothing is persisted across restarts

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConnectorError, Result};

/// Where a credential value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// Explicit value supplied in connector configuration.
    Explicit,
    /// Environment variable.
    Env,
    /// File contents.
    File,
    /// Interactive stdin prompt.
    Prompt,
    /// External secret store declared by the connector.
    SecretStore,
}

/// A resolved credential. Immutable once resolved.
#[derive(Clone)]
pub struct Credential {
    name: String,
    value: String,
    source: CredentialSource,
    resolved_at: DateTime<Utc>,
}

impl Credential {
    /// Logical credential name (e.g. `api_key`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The secret value. Never log or serialize this.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Which source produced the value.
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// When the value was resolved.
    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }
}

// Redact the value — credentials must never leak through Debug formatting.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .field("resolved_at", &self.resolved_at)
            .finish()
    }
}

/// Declaration of a credential a connector requires or accepts.
#[derive(Clone, Debug)]
pub struct CredentialSpec {
    name: String,
    env_vars: Vec<String>,
    file_path: Option<PathBuf>,
    required: bool,
}

impl CredentialSpec {
    /// A required credential. By default the environment is consulted via
    /// the uppercased credential name (`api_key` → `API_KEY`).
    pub fn required(name: impl Into<String>) -> Self {
        let name = name.into();
        let default_env = name.to_uppercase();
        Self {
            name,
            env_vars: vec![default_env],
            file_path: None,
            required: true,
        }
    }

    /// An optional credential — resolution yields `None` instead of failing.
    pub fn optional(name: impl Into<String>) -> Self {
        let mut spec = Self::required(name);
        spec.required = false;
        spec
    }

    /// Adds an environment variable alias, consulted in declaration order
    /// after the default (e.g. `ANTHROPIC_API_KEY` for `api_key`).
    pub fn env_alias(mut self, var: impl Into<String>) -> Self {
        self.env_vars.push(var.into());
        self
    }

    /// Replaces the environment variable list entirely.
    pub fn env_vars(mut self, vars: Vec<String>) -> Self {
        self.env_vars = vars;
        self
    }

    /// Designates a file whose trimmed contents are the credential value.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// External secret store declared by a connector (source of last resort).
pub trait SecretStore: Send + Sync {
    /// Looks up a secret by logical name. `Ok(None)` means not present.
    fn get(&self, name: &str) -> anyhow::Result<Option<String>>;
}

/// Interactive prompt source. Split out as a trait so tests can substitute
/// a scripted prompter for real stdin.
pub trait PromptSource: Send + Sync {
    fn prompt(&self, name: &str) -> io::Result<String>;
}

/// Prompts on stderr and reads one line from stdin.
pub struct StdinPrompter;

impl PromptSource for StdinPrompter {
    fn prompt(&self, name: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "Enter value for credential '{}': ", name)?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Resolves credentials for one connector instance.
///
/// Built once per connector; the memoization cache lives as long as the
/// resolver. Never shared across connectors.
pub struct CredentialResolver {
    connector: String,
    explicit: HashMap<String, String>,
    specs: HashMap<String, CredentialSpec>,
    secret_store: Option<Arc<dyn SecretStore>>,
    prompter: Option<Arc<dyn PromptSource>>,
    cache: DashMap<String, Arc<Credential>>,
}

impl CredentialResolver {
    pub fn new(connector: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
            explicit: HashMap::new(),
            specs: HashMap::new(),
            secret_store: None,
            prompter: None,
            cache: DashMap::new(),
        }
    }

    /// Declares a credential this connector requires or accepts.
    pub fn declare(mut self, spec: CredentialSpec) -> Self {
        self.specs.insert(spec.name.clone(), spec);
        self
    }

    /// Supplies an explicit configuration value (highest precedence).
    pub fn with_explicit(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.explicit.insert(name.into(), value.into());
        self
    }

    /// Declares an external secret store (lowest precedence).
    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    /// Enables interactive prompting. Without this call the prompt source
    /// is never consulted.
    pub fn with_prompter(mut self, prompter: Arc<dyn PromptSource>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Resolves a required credential.
    ///
    /// Returns the memoized value when present; otherwise walks the source
    /// order and caches the first non-empty hit. Fails with
    /// `CredentialNotFound` when no source yields a value.
    pub fn resolve(&self, name: &str) -> Result<Arc<Credential>> {
        match self.resolve_optional(name)? {
            Some(cred) => Ok(cred),
            None => Err(ConnectorError::CredentialNotFound(name.to_string())),
        }
    }

    /// Resolves an optional credential; absent values yield `Ok(None)`.
    pub fn resolve_optional(&self, name: &str) -> Result<Option<Arc<Credential>>> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(Some(Arc::clone(cached.value())));
        }

        match self.resolve_uncached(name) {
            Some(cred) => {
                let cred = Arc::new(cred);
                self.cache.insert(name.to_string(), Arc::clone(&cred));
                debug!(
                    connector = %self.connector,
                    credential = %name,
                    source = ?cred.source,
                    "Resolved credential"
                );
                Ok(Some(cred))
            }
            None => {
                if self.specs.get(name).map_or(true, |s| s.required) {
                    Err(ConnectorError::CredentialNotFound(name.to_string()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Invalidates the cached entry and resolves again.
    pub fn refresh(&self, name: &str) -> Result<Arc<Credential>> {
        self.cache.remove(name);
        self.resolve(name)
    }

    fn resolve_uncached(&self, name: &str) -> Option<Credential> {
        let now = Utc::now();
        let make = |value: String, source: CredentialSource| Credential {
            name: name.to_string(),
            value,
            source,
            resolved_at: now,
        };

        // 1. Explicit configuration value
        if let Some(value) = self.explicit.get(name).filter(|v| !v.is_empty()) {
            return Some(make(value.clone(), CredentialSource::Explicit));
        }

        let spec = self.specs.get(name);

        // 2. Environment variables, in declaration order. Undeclared names
        //    still get the uppercased-name convention.
        let default_env;
        let env_vars: &[String] = match spec {
            Some(s) => &s.env_vars,
            None => {
                default_env = [name.to_uppercase()];
                &default_env
            }
        };
        for var in env_vars {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return Some(make(value, CredentialSource::Env));
                }
            }
        }

        // 3. Designated file path
        if let Some(path) = spec.and_then(|s| s.file_path.as_ref()) {
            if let Ok(contents) = std::fs::read_to_string(path) {
                let trimmed = contents.trim();
                if !trimmed.is_empty() {
                    return Some(make(trimmed.to_string(), CredentialSource::File));
                }
            }
        }

        // 4. Interactive prompt, only when explicitly enabled
        if let Some(prompter) = &self.prompter {
            if let Ok(value) = prompter.prompt(name) {
                if !value.is_empty() {
                    return Some(make(value, CredentialSource::Prompt));
                }
            }
        }

        // 5. External secret store
        if let Some(store) = &self.secret_store {
            match store.get(name) {
                Ok(Some(value)) if !value.is_empty() => {
                    return Some(make(value, CredentialSource::SecretStore));
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        connector = %self.connector,
                        credential = %name,
                        error = %e,
                        "Secret store lookup failed"
                    );
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    struct MapStore(HashMap<String, String>);

    impl SecretStore for MapStore {
        fn get(&self, name: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.get(name).cloned())
        }
    }

    struct ScriptedPrompter(String);

    impl PromptSource for ScriptedPrompter {
        fn prompt(&self, _name: &str) -> io::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_explicit_value_wins_over_env() {
        std::env::set_var("VC_TEST_EXPLICIT_WINS", "from_env");
        let resolver = CredentialResolver::new("test")
            .declare(CredentialSpec::required("token").env_vars(vec![
                "VC_TEST_EXPLICIT_WINS".to_string(),
            ]))
            .with_explicit("token", "from_config");

        let cred = resolver.resolve("token").unwrap();
        assert_eq!(cred.value(), "from_config");
        assert_eq!(cred.source(), CredentialSource::Explicit);
        std::env::remove_var("VC_TEST_EXPLICIT_WINS");
    }

    #[test]
    fn test_env_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from_file").unwrap();

        std::env::set_var("VC_TEST_ENV_OVER_FILE", "from_env");
        let resolver = CredentialResolver::new("test").declare(
            CredentialSpec::required("token")
                .env_vars(vec!["VC_TEST_ENV_OVER_FILE".to_string()])
                .file(file.path()),
        );

        let cred = resolver.resolve("token").unwrap();
        assert_eq!(cred.value(), "from_env");
        assert_eq!(cred.source(), CredentialSource::Env);
        std::env::remove_var("VC_TEST_ENV_OVER_FILE");
    }

    #[test]
    fn test_file_source_trims_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-from-file  ").unwrap();

        let resolver = CredentialResolver::new("test").declare(
            CredentialSpec::required("token")
                .env_vars(vec!["VC_TEST_UNSET_VAR_1".to_string()])
                .file(file.path()),
        );

        let cred = resolver.resolve("token").unwrap();
        assert_eq!(cred.value(), "secret-from-file");
        assert_eq!(cred.source(), CredentialSource::File);
    }

    #[test]
    fn test_env_alias_order() {
        std::env::set_var("VC_TEST_ALIAS_SECOND", "from_alias");
        let resolver = CredentialResolver::new("test").declare(
            CredentialSpec::required("api_key").env_vars(vec![
                "VC_TEST_ALIAS_FIRST".to_string(),
                "VC_TEST_ALIAS_SECOND".to_string(),
            ]),
        );

        let cred = resolver.resolve("api_key").unwrap();
        assert_eq!(cred.value(), "from_alias");
        std::env::remove_var("VC_TEST_ALIAS_SECOND");
    }

    #[test]
    fn test_prompt_only_when_enabled() {
        let spec = || {
            CredentialSpec::required("token").env_vars(vec!["VC_TEST_UNSET_VAR_2".to_string()])
        };

        // Without a prompter the credential is simply not found
        let resolver = CredentialResolver::new("test").declare(spec());
        assert!(matches!(
            resolver.resolve("token"),
            Err(ConnectorError::CredentialNotFound(_))
        ));

        // With a prompter it resolves from the prompt
        let resolver = CredentialResolver::new("test")
            .declare(spec())
            .with_prompter(Arc::new(ScriptedPrompter("typed_in".to_string())));
        let cred = resolver.resolve("token").unwrap();
        assert_eq!(cred.value(), "typed_in");
        assert_eq!(cred.source(), CredentialSource::Prompt);
    }

    #[test]
    fn test_secret_store_is_last_resort() {
        let mut secrets = HashMap::new();
        secrets.insert("token".to_string(), "from_store".to_string());

        let resolver = CredentialResolver::new("test")
            .declare(
                CredentialSpec::required("token")
                    .env_vars(vec!["VC_TEST_UNSET_VAR_3".to_string()]),
            )
            .with_secret_store(Arc::new(MapStore(secrets)));

        let cred = resolver.resolve("token").unwrap();
        assert_eq!(cred.value(), "from_store");
        assert_eq!(cred.source(), CredentialSource::SecretStore);
    }

    #[test]
    fn test_missing_required_fails() {
        let resolver = CredentialResolver::new("test").declare(
            CredentialSpec::required("token").env_vars(vec!["VC_TEST_UNSET_VAR_4".to_string()]),
        );
        let err = resolver.resolve("token").unwrap_err();
        assert!(matches!(err, ConnectorError::CredentialNotFound(name) if name == "token"));
    }

    #[test]
    fn test_missing_optional_is_none() {
        let resolver = CredentialResolver::new("test").declare(
            CredentialSpec::optional("token").env_vars(vec!["VC_TEST_UNSET_VAR_5".to_string()]),
        );
        assert!(resolver.resolve_optional("token").unwrap().is_none());
    }

    #[test]
    fn test_resolution_is_memoized() {
        std::env::set_var("VC_TEST_MEMO", "first");
        let resolver = CredentialResolver::new("test").declare(
            CredentialSpec::required("token").env_vars(vec!["VC_TEST_MEMO".to_string()]),
        );

        let first = resolver.resolve("token").unwrap();
        assert_eq!(first.value(), "first");

        // Environment changes are invisible until an explicit refresh
        std::env::set_var("VC_TEST_MEMO", "second");
        let cached = resolver.resolve("token").unwrap();
        assert_eq!(cached.value(), "first");

        let refreshed = resolver.refresh("token").unwrap();
        assert_eq!(refreshed.value(), "second");
        std::env::remove_var("VC_TEST_MEMO");
    }

    #[test]
    fn test_empty_env_value_falls_through() {
        std::env::set_var("VC_TEST_EMPTY", "");
        let mut secrets = HashMap::new();
        secrets.insert("token".to_string(), "from_store".to_string());

        let resolver = CredentialResolver::new("test")
            .declare(
                CredentialSpec::required("token").env_vars(vec!["VC_TEST_EMPTY".to_string()]),
            )
            .with_secret_store(Arc::new(MapStore(secrets)));

        let cred = resolver.resolve("token").unwrap();
        assert_eq!(cred.source(), CredentialSource::SecretStore);
        std::env::remove_var("VC_TEST_EMPTY");
    }

    #[test]
    fn test_debug_redacts_value() {
        let resolver = CredentialResolver::new("test").with_explicit("token", "super_secret");
        let cred = resolver.resolve("token").unwrap();
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("super_secret"));
        assert!(debug.contains("<redacted>"));
    }
}
