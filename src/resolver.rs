use regex::Regex;
use reqwest::Url;
use tracing::debug;

use crate::config::ARCHIVE_BASE_URL;
use crate::domain::{DasDatasetName, RunNumber};
use crate::era::{EraResolver, EraSource, normalize_era_label};
use crate::error::DqmError;
use crate::listing::{anchor_hrefs, last_segment, table_rows};
use crate::transport::ArchiveTransport;

const OFFLINE_ROOT: &str = "dqm/offline/data/browse/ROOT/OfflineData";
const ONLINE_ROOT: &str = "dqm/offline/data/browse/ROOT/OnlineData/original";

/// Turns a (run, dataset) pair into the URL of one archived ROOT file.
pub trait LinkResolver: Send + Sync {
    fn resolve(&self, run: RunNumber, dataset: &str) -> Result<Url, DqmError>;
}

/// Directory layout of the archive relative to its origin.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    base: Url,
}

impl ArchiveLayout {
    pub fn new(base: &str) -> Result<Self, DqmError> {
        let base = Url::parse(base).map_err(|err| DqmError::InvalidUrl(format!("{base}: {err}")))?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `.../OfflineData/<era>/<dataset>/<run bucket>xx/`
    pub fn offline_dir(&self, era: &str, dataset: &str, run: RunNumber) -> Result<Url, DqmError> {
        self.join(&format!(
            "{OFFLINE_ROOT}/{era}/{dataset}/{}/",
            offline_bucket(run)
        ))
    }

    /// `.../OnlineData/original/<5-wide bucket>xxxx/<7-wide bucket>xx/`
    pub fn online_dir(&self, run: RunNumber) -> Result<Url, DqmError> {
        let (outer, inner) = online_buckets(run);
        self.join(&format!("{ONLINE_ROOT}/{outer}/{inner}/"))
    }

    fn join(&self, path: &str) -> Result<Url, DqmError> {
        self.base
            .join(path)
            .map_err(|err| DqmError::InvalidUrl(format!("{path}: {err}")))
    }
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self {
            base: Url::parse(ARCHIVE_BASE_URL).expect("valid archive base URL"),
        }
    }
}

/// Nine-digit run with its last two digits replaced by `xx`.
pub fn offline_bucket(run: RunNumber) -> String {
    let padded = run.padded();
    format!("{}xx", &padded[..padded.len() - 2])
}

/// Thousand-run and hundred-run buckets of the online archive.
pub fn online_buckets(run: RunNumber) -> (String, String) {
    let digits = run.to_string();
    let prefix = |dropped: usize| &digits[..digits.len().saturating_sub(dropped)];
    (
        format!("{:0>5}xxxx", prefix(4)),
        format!("{:0>7}xx", prefix(2)),
    )
}

/// `DQM_V####_R<run>__<dataset>__<tag>__DQMIO.root`
pub fn offline_file_pattern(run: RunNumber, dataset: &str) -> Result<Regex, DqmError> {
    compile(&format!(
        r"^DQM_V\d{{4}}_R{}__{}__[a-zA-Z0-9\-]+__DQMIO\.root$",
        run.padded(),
        regex::escape(dataset)
    ))
}

/// `DQM_V####_R<run>__<primary>__<era>-<stream>-<version>__<tier>.root`
pub fn das_file_pattern(run: RunNumber, name: &DasDatasetName) -> Result<Regex, DqmError> {
    compile(&format!(
        r"^DQM_V\d{{4}}_R{}__{}__{}__{}\.root$",
        run.padded(),
        regex::escape(&name.primary),
        regex::escape(&name.processed()),
        regex::escape(&name.tier)
    ))
}

/// `DQM_V####_<client>_R<run>.root`
pub fn online_file_pattern(run: RunNumber, client: &str) -> Result<Regex, DqmError> {
    compile(&format!(
        r"^DQM_V\d{{4}}_{}_R{}\.root$",
        regex::escape(client),
        run.padded()
    ))
}

fn compile(pattern: &str) -> Result<Regex, DqmError> {
    Regex::new(pattern).map_err(|err| DqmError::InvalidDatasetName(err.to_string()))
}

fn join_href(listing: &Url, href: &str) -> Result<Url, DqmError> {
    listing
        .join(href)
        .map_err(|err| DqmError::InvalidUrl(format!("{href}: {err}")))
}

fn link_not_found(pattern: &Regex, listing: &Url) -> DqmError {
    DqmError::LinkNotFound {
        pattern: pattern.as_str().to_string(),
        url: listing.to_string(),
    }
}

/// Resolves reprocessed (offline) DQMIO files. Plain primary datasets need
/// the run's era from OMS; full DAS names carry their own era.
pub struct OfflineLinkResolver<'a, T: ArchiveTransport + ?Sized, S: EraSource> {
    transport: &'a T,
    layout: ArchiveLayout,
    eras: EraResolver<S>,
}

impl<'a, T: ArchiveTransport + ?Sized, S: EraSource> OfflineLinkResolver<'a, T, S> {
    pub fn new(transport: &'a T, layout: ArchiveLayout, eras: EraResolver<S>) -> Self {
        Self {
            transport,
            layout,
            eras,
        }
    }

    pub fn eras(&self) -> &EraResolver<S> {
        &self.eras
    }

    fn find_in_anchors(&self, listing: &Url, pattern: &Regex) -> Result<Url, DqmError> {
        let html = self.transport.get_text(listing)?;
        let hrefs = anchor_hrefs(&html);
        debug!(url = %listing, entries = hrefs.len(), "offline listing");
        let href = hrefs
            .iter()
            .find(|href| pattern.is_match(last_segment(href)))
            .ok_or_else(|| link_not_found(pattern, listing))?;
        join_href(listing, href)
    }
}

impl<T: ArchiveTransport + ?Sized, S: EraSource> LinkResolver for OfflineLinkResolver<'_, T, S> {
    fn resolve(&self, run: RunNumber, dataset: &str) -> Result<Url, DqmError> {
        if DasDatasetName::looks_like_das(dataset) {
            let name: DasDatasetName = dataset.parse()?;
            let era = normalize_era_label(&name.acquisition_era);
            let listing = self.layout.offline_dir(era, &name.primary, run)?;
            return self.find_in_anchors(&listing, &das_file_pattern(run, &name)?);
        }

        let era = self.eras.resolve(run)?;
        let listing = self
            .layout
            .offline_dir(era.archive_label(), dataset, run)?;
        self.find_in_anchors(&listing, &offline_file_pattern(run, dataset)?)
    }
}

/// Resolves files written by the online DQM clients during data taking.
pub struct OnlineLinkResolver<'a, T: ArchiveTransport + ?Sized> {
    transport: &'a T,
    layout: ArchiveLayout,
}

impl<'a, T: ArchiveTransport + ?Sized> OnlineLinkResolver<'a, T> {
    pub fn new(transport: &'a T, layout: ArchiveLayout) -> Self {
        Self { transport, layout }
    }
}

impl<T: ArchiveTransport + ?Sized> LinkResolver for OnlineLinkResolver<'_, T> {
    fn resolve(&self, run: RunNumber, dataset: &str) -> Result<Url, DqmError> {
        let listing = self.layout.online_dir(run)?;
        let pattern = online_file_pattern(run, dataset)?;
        let html = self.transport.get_text(&listing)?;
        let rows = table_rows(&html);
        debug!(url = %listing, entries = rows.len(), "online listing");
        let href = rows
            .iter()
            .filter(|row| pattern.is_match(&row.name))
            .find_map(|row| row.href.as_deref())
            .ok_or_else(|| link_not_found(&pattern, &listing))?;
        join_href(&listing, href)
    }
}
