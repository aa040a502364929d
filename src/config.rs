use crate::error::{Error, Result};
use url::Url;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
}

impl Config {
    /// Creates a new Config instance with the provided parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `api_url` is empty or not an absolute http(s) URL
    /// - `api_key` is present but empty
    pub fn new(api_url: String, api_key: Option<String>) -> Result<Self> {
        if api_url.trim().is_empty() {
            return Err(Error::Config("API URL cannot be empty".to_string()));
        }

        let parsed = Url::parse(&api_url)
            .map_err(|e| Error::Config(format!("Invalid API URL '{api_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "API URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if api_key.as_deref().is_some_and(str::is_empty) {
            return Err(Error::Config("API key cannot be empty".to_string()));
        }

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = Config::new("https://images.example.com/api/".to_string(), None).unwrap();
        assert_eq!(
            config.endpoint("/upload"),
            "https://images.example.com/api/upload"
        );
        assert_eq!(
            config.endpoint("finalize-upload"),
            "https://images.example.com/api/finalize-upload"
        );
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(
            Config::new(String::new(), None),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::new("not a url".to_string(), None),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::new("ftp://example.com".to_string(), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_empty_api_key() {
        let result = Config::new("http://localhost:8080".to_string(), Some(String::new()));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
