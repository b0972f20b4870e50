use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DqmError;

static RUN_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:-(\d+))?$").expect("valid run expression regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunNumber(u32);

impl RunNumber {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Nine-digit zero-padded form used in archive file names.
    pub fn padded(self) -> String {
        format!("{:0>9}", self.0)
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RunNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Runs of one expression: either a single run or an inclusive range.
///
/// A range whose start is above its end is accepted and yields no runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExpression {
    Single(RunNumber),
    Range { start: RunNumber, end: RunNumber },
}

impl RunExpression {
    pub fn runs(self) -> impl Iterator<Item = RunNumber> {
        let (start, end) = match self {
            RunExpression::Single(run) => (run.get(), run.get()),
            RunExpression::Range { start, end } => (start.get(), end.get()),
        };
        (start..=end).map(RunNumber)
    }
}

impl FromStr for RunExpression {
    type Err = DqmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || DqmError::MalformedRunExpression(value.to_string());
        let captures = RUN_EXPRESSION.captures(value).ok_or_else(malformed)?;
        let parse = |text: &str| text.parse::<u32>().map(RunNumber).map_err(|_| malformed());

        let start = parse(&captures[1])?;
        match captures.get(2) {
            Some(end) => Ok(RunExpression::Range {
                start,
                end: parse(end.as_str())?,
            }),
            None => Ok(RunExpression::Single(start)),
        }
    }
}

/// Deduplicated, ascending set of runs built from user expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSet(BTreeSet<RunNumber>);

impl RunSet {
    /// Union of every expression. The first malformed expression fails the
    /// whole parse, before any work is scheduled.
    pub fn parse<S: AsRef<str>>(expressions: &[S]) -> Result<Self, DqmError> {
        let mut runs = BTreeSet::new();
        for expression in expressions {
            let parsed: RunExpression = expression.as_ref().parse()?;
            runs.extend(parsed.runs());
        }
        Ok(Self(runs))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RunNumber> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<RunNumber> {
        self.iter().collect()
    }
}

impl FromIterator<RunNumber> for RunSet {
    fn from_iter<I: IntoIterator<Item = RunNumber>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `/<Primary>/<AcquisitionEra>-<Stream>-<ProcVersion>/<Tier>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DasDatasetName {
    pub primary: String,
    pub acquisition_era: String,
    pub stream: String,
    pub proc_version: String,
    pub tier: String,
}

impl DasDatasetName {
    pub fn looks_like_das(value: &str) -> bool {
        value.starts_with('/')
    }

    pub fn processed(&self) -> String {
        format!(
            "{}-{}-{}",
            self.acquisition_era, self.stream, self.proc_version
        )
    }
}

impl fmt::Display for DasDatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.primary, self.processed(), self.tier)
    }
}

impl FromStr for DasDatasetName {
    type Err = DqmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || DqmError::InvalidDatasetName(value.to_string());
        let parts = value.split('/').collect::<Vec<_>>();
        let [empty, primary, processed, tier] = parts.as_slice() else {
            return Err(invalid());
        };
        if !empty.is_empty() {
            return Err(invalid());
        }
        let processed_parts = processed.split('-').collect::<Vec<_>>();
        let [acquisition_era, stream, proc_version] = processed_parts.as_slice() else {
            return Err(invalid());
        };

        let name = Self {
            primary: primary.to_string(),
            acquisition_era: acquisition_era.to_string(),
            stream: stream.to_string(),
            proc_version: proc_version.to_string(),
            tier: tier.to_string(),
        };
        if name.to_string() != value
            || [
                &name.primary,
                &name.acquisition_era,
                &name.stream,
                &name.proc_version,
                &name.tier,
            ]
            .iter()
            .any(|part| part.is_empty())
        {
            return Err(invalid());
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_single_run() {
        let expr: RunExpression = "355100".parse().unwrap();
        assert_eq!(expr, RunExpression::Single(RunNumber::new(355100)));
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        let err = "355100-3552x".parse::<RunExpression>().unwrap_err();
        assert_matches!(err, DqmError::MalformedRunExpression(_));
    }

    #[test]
    fn parse_rejects_surrounding_whitespace() {
        for raw in [" 10 ", "10\n", "\t10", "10 - 12"] {
            assert_matches!(
                raw.parse::<RunExpression>(),
                Err(DqmError::MalformedRunExpression(_)),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn padded_run_is_nine_digits() {
        assert_eq!(RunNumber::new(355100).padded(), "000355100");
    }

    #[test]
    fn das_name_round_trips() {
        let name: DasDatasetName = "/Muon/Run2022C-PromptReco-v1/DQMIO".parse().unwrap();
        assert_eq!(name.primary, "Muon");
        assert_eq!(name.acquisition_era, "Run2022C");
        assert_eq!(name.processed(), "Run2022C-PromptReco-v1");
        assert_eq!(name.tier, "DQMIO");
    }

    #[test]
    fn das_name_requires_three_processed_parts() {
        let err = "/Muon/Run2022C-PromptReco/DQMIO"
            .parse::<DasDatasetName>()
            .unwrap_err();
        assert_matches!(err, DqmError::InvalidDatasetName(_));
    }
}
