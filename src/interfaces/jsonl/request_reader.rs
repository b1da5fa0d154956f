use crate::error::{MarketError, Result};
use crate::interfaces::commands::Request;
use std::io::BufRead;

/// Reads requests from a JSON-lines source, one request object per line.
///
/// Blank lines are skipped. A malformed line yields an error for that line
/// only; reading continues with the next one.
pub struct RequestReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> RequestReader<R> {
    /// Creates a new `RequestReader` from any buffered source (e.g. a `BufReader<File>`, stdin).
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<Request>> {
        self.source
            .lines()
            .filter(|line| !matches!(line, Ok(text) if text.trim().is_empty()))
            .map(|line| {
                let line = line.map_err(MarketError::from)?;
                serde_json::from_str::<Request>(&line).map_err(MarketError::from)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "{\"operation\": \"getBalance\", \"identityKey\": \"a\"}\n\n{\"operation\": \"listMarketplaceBots\"}\n";
        let reader = RequestReader::new(data.as_bytes());
        let results: Vec<Result<Request>> = reader.requests().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.operation, "getBalance");
        assert_eq!(first.params["identityKey"], "a");
        assert!(results[1].as_ref().unwrap().params.is_empty());
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{not json}\n{\"identityKey\": \"a\"}\n{\"operation\": \"cashOut\", \"identityKey\": \"a\"}";
        let reader = RequestReader::new(data.as_bytes());
        let results: Vec<Result<Request>> = reader.requests().collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_err());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
