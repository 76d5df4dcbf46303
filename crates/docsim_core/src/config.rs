//! Emulator configuration.

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on drain iterations in `finish_all_scheduled_functions`.
    pub max_scheduler_iterations: usize,

    /// Vector search result limit when the query does not give one.
    pub default_vector_limit: usize,

    /// Largest accepted vector search limit.
    pub max_vector_limit: usize,

    /// Issuer filled into impersonated identities.
    pub identity_issuer: String,

    /// Prefix of URLs handed out for stored files.
    pub storage_url_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_scheduler_iterations: 100,
            default_vector_limit: 10,
            max_vector_limit: 256,
            identity_issuer: "https://docsim.test".to_string(),
            storage_url_base: "https://docsim.test/api/storage".to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the drain iteration bound.
    #[must_use]
    pub const fn max_scheduler_iterations(mut self, value: usize) -> Self {
        self.max_scheduler_iterations = value;
        self
    }

    /// Sets the default vector search limit.
    #[must_use]
    pub const fn default_vector_limit(mut self, value: usize) -> Self {
        self.default_vector_limit = value;
        self
    }

    /// Sets the maximum vector search limit.
    #[must_use]
    pub const fn max_vector_limit(mut self, value: usize) -> Self {
        self.max_vector_limit = value;
        self
    }

    /// Sets the issuer used for impersonated identities.
    #[must_use]
    pub fn identity_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.identity_issuer = issuer.into();
        self
    }

    /// Sets the base of storage URLs.
    #[must_use]
    pub fn storage_url_base(mut self, base: impl Into<String>) -> Self {
        self.storage_url_base = base.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_scheduler_iterations, 100);
        assert_eq!(config.default_vector_limit, 10);
        assert_eq!(config.max_vector_limit, 256);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .max_scheduler_iterations(5)
            .identity_issuer("https://issuer.example");

        assert_eq!(config.max_scheduler_iterations, 5);
        assert_eq!(config.identity_issuer, "https://issuer.example");
    }
}
