//! Keyword rank matrix and day-over-day position changes.
//!
//! The matrix holds, for every keyword bound to a domain, one observation per
//! entry of [`DAY_OFFSETS`] counted back from the most recent collection
//! date. Missing observations stay distinct from rank 0: rank 0 means the
//! keyword was searched but not found inside the tracked result window,
//! while [`RankValue::NotAvailable`] means nothing was recorded at all.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::ser::{SerializeMap, SerializeTuple};
use serde::{Serialize, Serializer};

use crate::days_before;

/// Days back from the most recent collection. Offset 0 must stay first: it
/// is the reference day and the only one that carries the matched URL.
pub const DAY_OFFSETS: [u64; 8] = [0, 1, 2, 3, 4, 5, 6, 30];

pub const NOT_AVAILABLE: &str = "n/a";

const FIRST_PAGE_LAST_RANK: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankValue {
    Observed(u32),
    NotAvailable,
}

impl RankValue {
    pub fn observed(self) -> Option<u32> {
        match self {
            Self::Observed(rank) => Some(rank),
            Self::NotAvailable => None,
        }
    }

    pub fn is_first_page(self) -> bool {
        matches!(self, Self::Observed(rank) if (1..=FIRST_PAGE_LAST_RANK).contains(&rank))
    }
}

impl fmt::Display for RankValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observed(rank) => write!(f, "{rank}"),
            Self::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for RankValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Observed(rank) => serializer.serialize_u32(*rank),
            Self::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankObservation {
    pub keyword: String,
    pub rank: u32,
    pub url: String,
}

/// Read access to collected rank rows.
pub trait RankSource {
    type Error;

    /// Most recent date with any rank row, across all domains.
    fn latest_collection_date(&self) -> Result<Option<NaiveDate>, Self::Error>;

    fn domain_keywords(&self, domain_id: i64) -> Result<Vec<String>, Self::Error>;

    fn observations_on(
        &self,
        domain_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<RankObservation>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRanks {
    /// URL matched on the reference day; `None` renders as `n/a`.
    pub url: Option<String>,
    /// One value per entry of [`DAY_OFFSETS`], in the same order.
    pub ranks: Vec<RankValue>,
}

impl KeywordRanks {
    pub fn current(&self) -> RankValue {
        self.ranks.first().copied().unwrap_or(RankValue::NotAvailable)
    }

    pub fn url_or_na(&self) -> &str {
        self.url.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    /// Flattened `[url, rank_0, rank_1, ...]`; always `1 + DAY_OFFSETS.len()`
    /// cells.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(1 + self.ranks.len());
        cells.push(self.url_or_na().to_owned());
        cells.extend(self.ranks.iter().map(ToString::to_string));
        cells
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstPageCount {
    pub date: NaiveDate,
    pub count: usize,
}

impl Serialize for FirstPageCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.date.format("%Y-%m-%d").to_string(), &self.count)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankMatrix {
    /// Calendar date of each offset, aligned with [`KeywordRanks::ranks`].
    pub dates: Vec<NaiveDate>,
    pub keywords: BTreeMap<String, KeywordRanks>,
    pub first_page: Vec<FirstPageCount>,
}

impl RankMatrix {
    /// Table headings: keyword, url, one column per offset date, history.
    pub fn headings(&self) -> Vec<String> {
        let mut headings = vec!["Keyword".to_owned(), "Url".to_owned()];
        headings.extend(
            self.dates
                .iter()
                .map(|date| date.format("%Y-%m-%d").to_string()),
        );
        headings.push("History".to_owned());
        headings
    }
}

/// Days between `today` and the latest collection; zero when the latest
/// collection is today or later.
pub fn collection_lag(today: NaiveDate, latest: NaiveDate) -> u64 {
    u64::try_from((today - latest).num_days()).unwrap_or(0)
}

pub fn offset_dates(today: NaiveDate, lag: u64) -> Vec<NaiveDate> {
    DAY_OFFSETS
        .iter()
        .map(|offset| days_before(today, offset + lag))
        .collect()
}

/// Builds the rank matrix for `domain_id`. Returns `Ok(None)` when no rank
/// has ever been collected.
pub fn build_rank_matrix<S>(
    source: &S,
    domain_id: i64,
    today: NaiveDate,
) -> Result<Option<RankMatrix>, S::Error>
where
    S: RankSource + ?Sized,
{
    let Some(latest) = source.latest_collection_date()? else {
        return Ok(None);
    };

    let lag = collection_lag(today, latest);
    let dates = offset_dates(today, lag);
    let keywords: BTreeSet<String> = source.domain_keywords(domain_id)?.into_iter().collect();

    let mut rows: BTreeMap<String, KeywordRanks> = keywords
        .iter()
        .map(|keyword| {
            (
                keyword.clone(),
                KeywordRanks {
                    url: None,
                    ranks: Vec::with_capacity(dates.len()),
                },
            )
        })
        .collect();
    let mut first_page = Vec::with_capacity(dates.len());

    for (index, date) in dates.iter().enumerate() {
        let observations = source.observations_on(domain_id, *date)?;
        let mut by_keyword: HashMap<&str, &RankObservation> = HashMap::new();
        for observation in &observations {
            by_keyword
                .entry(observation.keyword.as_str())
                .or_insert(observation);
        }

        let mut count = 0;
        for (keyword, row) in rows.iter_mut() {
            let value = match by_keyword.get(keyword.as_str()) {
                Some(observation) => {
                    if index == 0 {
                        row.url = Some(observation.url.clone());
                    }
                    RankValue::Observed(observation.rank)
                }
                None => RankValue::NotAvailable,
            };
            if value.is_first_page() {
                count += 1;
            }
            row.ranks.push(value);
        }

        first_page.push(FirstPageCount { date: *date, count });
    }

    Ok(Some(RankMatrix {
        dates,
        keywords: rows,
        first_page,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Improved,
    Declined,
    Unchanged,
}

/// Compares the reference-day rank with an earlier one. Lower numbers are
/// better placements, except that rank 0 (dropped out of the results)
/// ranks below every placed position.
pub fn classify_movement(current: RankValue, previous: RankValue) -> Option<Movement> {
    let (current, previous) = (current.observed()?, previous.observed()?);

    let movement = if current == previous {
        Movement::Unchanged
    } else if current == 0 {
        Movement::Declined
    } else if previous == 0 || current < previous {
        Movement::Improved
    } else {
        Movement::Declined
    };
    Some(movement)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChangeCounts {
    pub up: usize,
    pub down: usize,
    pub unch: usize,
}

impl ChangeCounts {
    fn record(&mut self, movement: Movement) {
        match movement {
            Movement::Improved => self.up += 1,
            Movement::Declined => self.down += 1,
            Movement::Unchanged => self.unch += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.up + self.down + self.unch
    }
}

/// Serialized as a `[date, counts]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayChange {
    pub date: NaiveDate,
    pub counts: ChangeCounts,
}

impl Serialize for DayChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.date.format("%Y-%m-%d").to_string())?;
        tuple.serialize_element(&self.counts)?;
        tuple.end()
    }
}

/// Up/down/unchanged counts per earlier offset date, newest date first.
/// Dates without a single comparable pair are left out.
pub fn compute_changes(matrix: &RankMatrix) -> Vec<DayChange> {
    let mut changes: BTreeMap<NaiveDate, ChangeCounts> = BTreeMap::new();

    for row in matrix.keywords.values() {
        let current = row.current();
        for (date, previous) in matrix.dates.iter().zip(&row.ranks).skip(1) {
            if let Some(movement) = classify_movement(current, *previous) {
                changes.entry(*date).or_default().record(movement);
            }
        }
    }

    changes
        .into_iter()
        .rev()
        .map(|(date, counts)| DayChange { date, counts })
        .collect()
}
