use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let status = ScanError::HttpStatus {
            url: "https://example.com/login".to_string(),
            status: 503,
        };
        assert_eq!(status.to_string(), "HTTP status 503 for https://example.com/login");
        assert_eq!(
            ScanError::InvalidUrl("not a url".to_string()).to_string(),
            "Invalid URL: not a url"
        );
        assert_eq!(
            ScanError::UnsupportedContent("image/png".to_string()).to_string(),
            "Unsupported content: image/png"
        );
    }
}
