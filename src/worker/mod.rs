//! Local aggregation
//!
//! Every rank, the coordinator included, runs the same local phase: walk the
//! whole record stream, keep the records its partition owns, and count them
//! into one scalar and two keyed maps. Nothing here touches another rank's
//! state; results leave the rank only through [`send_contribution`].
//!
//! # Example
//!
//! ```
//! use tweetpulse::partition::Partition;
//! use tweetpulse::source::{LineSource, RecordFormat};
//! use tweetpulse::worker::LocalAggregator;
//! use std::io::Cursor;
//!
//! let input = Cursor::new("#a #a hello\n@b kanye\n");
//! let mut aggregator = LocalAggregator::new(Partition::whole(), "kanye", RecordFormat::Plain);
//! for record in LineSource::new(input, false)? {
//!     aggregator.observe(&record?);
//! }
//!
//! let local = aggregator.finish();
//! assert_eq!(local.matches, 1);
//! assert_eq!(local.topics.get("#a"), 2);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::counts::{self, CountMap};
use crate::distributed::{Tag, Transport, COORDINATOR_RANK};
use crate::error::AggregationError;
use crate::partition::Partition;
use crate::source::{extract_text, tokenize, Record, RecordFormat};
use std::io;
use tracing::{debug, warn};

/// One rank's partial results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAggregate {
    /// Tokens equal to the search term
    pub matches: u64,
    /// `@`-prefixed tokens
    pub mentions: CountMap,
    /// `#`-prefixed tokens
    pub topics: CountMap,
}

impl LocalAggregate {
    /// Fold `other` into `self`
    pub fn merge(&mut self, other: LocalAggregate) {
        self.matches += other.matches;
        self.mentions.merge_owned(other.mentions);
        self.topics.merge_owned(other.topics);
    }
}

/// Which map a token counts toward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Topic,
    Mention,
    Plain,
}

impl TokenClass {
    /// Classify by first character; a bare marker is plain
    pub fn of(token: &str) -> Self {
        if token.len() <= 1 {
            return TokenClass::Plain;
        }

        match token.as_bytes()[0] {
            b'#' => TokenClass::Topic,
            b'@' => TokenClass::Mention,
            _ => TokenClass::Plain,
        }
    }
}

/// Diagnostics for one local phase (not transmitted)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub records_seen: u64,
    pub records_owned: u64,
    pub records_skipped: u64,
}

/// Counts the records one partition owns
pub struct LocalAggregator {
    partition: Partition,
    search_term: String,
    format: RecordFormat,
    aggregate: LocalAggregate,
    stats: AggregatorStats,
}

impl LocalAggregator {
    /// `search_term` is compared against lowercased tokens, so it is lowercased here
    pub fn new(partition: Partition, search_term: &str, format: RecordFormat) -> Self {
        Self {
            partition,
            search_term: search_term.to_ascii_lowercase(),
            format,
            aggregate: LocalAggregate::default(),
            stats: AggregatorStats::default(),
        }
    }

    /// Count `record` if this partition owns it
    ///
    /// A record whose text cannot be extracted is logged and skipped.
    pub fn observe(&mut self, record: &Record) {
        self.stats.records_seen += 1;
        if !self.partition.owns(record.index) {
            return;
        }
        self.stats.records_owned += 1;

        match extract_text(self.format, &record.raw) {
            Ok(text) => self.count_text(text),
            Err(e) => {
                self.stats.records_skipped += 1;
                warn!(record = record.index, rank = self.partition.rank(), "Skipping record: {}", e);
            }
        }
    }

    /// Count the tokens of one text
    pub fn count_text(&mut self, text: &str) {
        for token in tokenize(text) {
            match TokenClass::of(&token) {
                TokenClass::Topic => self.aggregate.topics.increment(&token),
                TokenClass::Mention => self.aggregate.mentions.increment(&token),
                TokenClass::Plain => {}
            }

            if token == self.search_term {
                self.aggregate.matches += 1;
            }
        }
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn finish(self) -> LocalAggregate {
        self.aggregate
    }
}

/// Run the local phase over `records`
///
/// Read errors from the source are fatal; extraction errors are not.
pub fn aggregate_records<I>(
    records: I,
    partition: Partition,
    search_term: &str,
    format: RecordFormat,
) -> io::Result<(LocalAggregate, AggregatorStats)>
where
    I: IntoIterator<Item = io::Result<Record>>,
{
    let mut aggregator = LocalAggregator::new(partition, search_term, format);
    for record in records {
        aggregator.observe(&record?);
    }

    let stats = aggregator.stats();
    Ok((aggregator.finish(), stats))
}

/// Ship `local` to the coordinator: scalar, then mentions, then topics
///
/// Both maps are encoded before anything is sent, so an encoding failure
/// leaves the coordinator with nothing from this rank.
pub async fn send_contribution<T: Transport + ?Sized>(
    transport: &T,
    local: &LocalAggregate,
) -> Result<(), AggregationError> {
    let mentions = counts::encode(&local.mentions).map_err(|source| AggregationError::Encode {
        tag: Tag::Mentions,
        source,
    })?;
    let topics = counts::encode(&local.topics).map_err(|source| AggregationError::Encode {
        tag: Tag::Topics,
        source,
    })?;

    transport
        .send(&counts::encode_scalar(local.matches), COORDINATOR_RANK, Tag::Scalar)
        .await?;
    transport.send(&mentions, COORDINATOR_RANK, Tag::Mentions).await?;
    transport.send(&topics, COORDINATOR_RANK, Tag::Topics).await?;

    debug!(
        rank = transport.rank(),
        matches = local.matches,
        mentions_bytes = mentions.len(),
        topics_bytes = topics.len(),
        "Contribution sent"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::LocalTransport;

    const RECORDS: [&str; 4] = ["#a #a hello", "@b kanye", "#a @b", "kanye kanye"];

    fn records(lines: &[&str]) -> Vec<io::Result<Record>> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                Ok(Record {
                    index: i as u64,
                    raw: line.as_bytes().to_vec(),
                })
            })
            .collect()
    }

    fn run(partition: Partition) -> LocalAggregate {
        aggregate_records(records(&RECORDS), partition, "kanye", RecordFormat::Plain)
            .unwrap()
            .0
    }

    #[test]
    fn test_token_class() {
        assert_eq!(TokenClass::of("#a"), TokenClass::Topic);
        assert_eq!(TokenClass::of("@b"), TokenClass::Mention);
        assert_eq!(TokenClass::of("#"), TokenClass::Plain);
        assert_eq!(TokenClass::of("@"), TokenClass::Plain);
        assert_eq!(TokenClass::of("a#b"), TokenClass::Plain);
        // First character decides, later markers don't matter
        assert_eq!(TokenClass::of("#@x"), TokenClass::Topic);
        assert_eq!(TokenClass::of("@#x"), TokenClass::Mention);
    }

    #[test]
    fn test_whole_stream() {
        let local = run(Partition::whole());
        assert_eq!(local.matches, 3);
        assert_eq!(local.mentions, CountMap::from_iter([("@b", 2)]));
        assert_eq!(local.topics, CountMap::from_iter([("#a", 3)]));
    }

    #[test]
    fn test_two_way_split() {
        let rank0 = run(Partition::new(0, 2).unwrap());
        let rank1 = run(Partition::new(1, 2).unwrap());

        // Rank 0 owns records 0 and 2
        assert_eq!(rank0.matches, 0);
        assert_eq!(rank0.topics.get("#a"), 3);
        assert_eq!(rank0.mentions.get("@b"), 1);

        // Rank 1 owns records 1 and 3
        assert_eq!(rank1.matches, 3);
        assert!(rank1.topics.is_empty());
        assert_eq!(rank1.mentions.get("@b"), 1);

        let mut merged = rank0;
        merged.merge(rank1);
        assert_eq!(merged, run(Partition::whole()));
    }

    #[test]
    fn test_search_term_is_case_insensitive() {
        let mut aggregator = LocalAggregator::new(Partition::whole(), "Kanye", RecordFormat::Plain);
        aggregator.count_text("KANYE kanye KaNyE kanyewest");
        assert_eq!(aggregator.finish().matches, 3);
    }

    #[test]
    fn test_search_term_counted_independently_of_class() {
        let mut aggregator = LocalAggregator::new(Partition::whole(), "#yeezy", RecordFormat::Plain);
        aggregator.count_text("#yeezy #Yeezy");
        let local = aggregator.finish();
        assert_eq!(local.matches, 2);
        assert_eq!(local.topics.get("#yeezy"), 2);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let mut input = records(&["1,2,3,4,5,6,{\"\"text\"\":\"\"#ok\"\"}", "garbage"]);
        input.push(Ok(Record {
            index: 2,
            raw: vec![0xff, 0xfe],
        }));

        let (local, stats) =
            aggregate_records(input, Partition::whole(), "ok", RecordFormat::TwitterCsv).unwrap();

        assert_eq!(local.topics.get("#ok"), 1);
        assert_eq!(
            stats,
            AggregatorStats {
                records_seen: 3,
                records_owned: 3,
                records_skipped: 2,
            }
        );
    }

    #[test]
    fn test_unowned_records_not_parsed() {
        let input = records(&["@x", "\u{0}not csv", "@x"]);
        let (_, stats) = aggregate_records(
            input,
            Partition::new(0, 2).unwrap(),
            "x",
            RecordFormat::TwitterCsv,
        )
        .unwrap();

        assert_eq!(stats.records_owned, 2);
        assert_eq!(stats.records_skipped, 2);
    }

    #[test]
    fn test_read_error_is_fatal() {
        let input = vec![Err(io::Error::new(io::ErrorKind::Other, "disk gone"))];
        assert!(aggregate_records(input, Partition::whole(), "x", RecordFormat::Plain).is_err());
    }

    #[tokio::test]
    async fn test_send_contribution_tags() {
        let mut cluster = LocalTransport::cluster(2);
        let worker = cluster.pop().unwrap();
        let coordinator = cluster.pop().unwrap();

        let local = run(Partition::new(1, 2).unwrap());
        send_contribution(&worker, &local).await.unwrap();

        let scalar = coordinator.receive_sized(1, Tag::Scalar).await.unwrap();
        assert_eq!(counts::decode_scalar(&scalar).unwrap(), 3);

        let topics = coordinator.receive_sized(1, Tag::Topics).await.unwrap();
        assert!(counts::decode(&topics).unwrap().is_empty());

        let mentions = coordinator.receive_sized(1, Tag::Mentions).await.unwrap();
        assert_eq!(counts::decode(&mentions).unwrap().get("@b"), 1);
    }
}
