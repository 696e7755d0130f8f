//! Line-buffered stderr capture with noise filtering.

use regex::Regex;

use super::LineBuffer;

/// A set of patterns matching stderr lines that carry no diagnostic value.
#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    patterns: Vec<Regex>,
}

impl NoiseFilter {
    /// Compile a filter from regex patterns.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Add already compiled patterns.
    #[must_use]
    pub fn extend(mut self, other: NoiseFilter) -> Self {
        self.patterns.extend(other.patterns);
        self
    }

    /// Check whether a line should be dropped.
    #[must_use]
    pub fn is_noise(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Splits stderr chunks into lines worth keeping.
#[derive(Debug, Default)]
pub struct StderrLines {
    lines: LineBuffer,
    filter: NoiseFilter,
}

impl StderrLines {
    #[must_use]
    pub fn new(filter: NoiseFilter) -> Self {
        Self {
            lines: LineBuffer::new(),
            filter,
        }
    }

    /// Feed a chunk and return the complete lines that survive filtering.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.lines
            .push(chunk)
            .into_iter()
            .filter(|line| self.keep(line))
            .collect()
    }

    /// Take the trailing partial line, if it is worth keeping.
    pub fn finish(&mut self) -> Option<String> {
        self.lines.finish().filter(|line| self.keep(line))
    }

    fn keep(&self, line: &str) -> bool {
        !line.trim().is_empty() && !self.filter.is_noise(line)
    }
}
