//! Partial-failure accounting for scrapers.
//!
//! A scraper that walks a multi-row result, or runs several independent
//! queries, keeps going after an individual failure and reports everything
//! that went wrong as one combined error at the end.

use anyhow::{Error, Result, anyhow};
use std::fmt;

/// Accumulates errors and folds them into a single `"; "`-joined error.
#[derive(Debug, Default)]
pub struct ScrapeErrors {
    errors: Vec<Error>,
}

impl ScrapeErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl Into<Error>) {
        self.errors.push(error.into());
    }

    /// Record the error of `result`, if any, and hand back the success value.
    pub fn record<T, E: Into<Error>>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise one combined error.
    ///
    /// # Errors
    ///
    /// Returns the combined error when at least one error was recorded.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{self}"))
        }
    }
}

impl fmt::Display for ScrapeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e:#}")?;
        }
        Ok(())
    }
}

impl Extend<Error> for ScrapeErrors {
    fn extend<I: IntoIterator<Item = Error>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

/// Decode every row, emit the good ones and collect the failures.
///
/// Scanning never stops at a bad row, so a result set with one malformed
/// row still yields samples for every other row.
pub fn decode_rows<R, T, D, E>(rows: &[R], mut decode: D, mut emit: E) -> ScrapeErrors
where
    D: FnMut(&R) -> Result<T>,
    E: FnMut(T),
{
    let mut errors = ScrapeErrors::new();

    for row in rows {
        if let Some(record) = errors.record(decode(row)) {
            emit(record);
        }
    }

    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_ok() {
        assert!(ScrapeErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_combined_message_keeps_order() {
        let mut errors = ScrapeErrors::new();
        errors.push(anyhow!("first"));
        errors.push(anyhow!("second"));

        assert_eq!(errors.len(), 2);
        let combined = errors.into_result().unwrap_err();
        assert_eq!(combined.to_string(), "first; second");
    }

    #[test]
    fn test_record_passes_values_through() {
        let mut errors = ScrapeErrors::new();
        assert_eq!(errors.record::<_, Error>(Ok(7)), Some(7));
        assert_eq!(errors.record::<i32, _>(Err(anyhow!("boom"))), None);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_decode_rows_keeps_going_after_bad_row() {
        let rows = vec!["1", "2", "oops", "4"];
        let mut decoded = Vec::new();

        let errors = decode_rows(
            &rows,
            |raw| raw.parse::<i64>().map_err(Error::from),
            |value| decoded.push(value),
        );

        assert_eq!(decoded, vec![1, 2, 4]);
        assert_eq!(errors.len(), 1);
        assert!(errors.into_result().is_err());
    }
}
