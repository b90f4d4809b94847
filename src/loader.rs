//! CSV Loader
//!
//! Streams a registry CSV through the row parser and hands bounded chunks of
//! records to the subgraph builder. Chunks are submitted one after another;
//! a failed chunk stops the run and everything before it stays committed.

use crate::error::{ImportError, ParseError};
use crate::record::ParsedRecord;
use crate::row_parser::RowParser;
use crate::store::GraphStore;
use crate::subgraph::SubgraphBatchBuilder;
use std::borrow::Cow;
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_BATCH_SIZE: usize = 3000;

/// UTF-8 when the cell is valid UTF-8, Latin-1 otherwise
fn decode_cell(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    /// Records per submitted batch
    pub batch_size: usize,
    /// Skip the first row of the file
    pub has_header: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            has_header: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub rows: u64,
    pub batches: usize,
    pub operations: usize,
}

/// Records waiting for the next flush, with the file lines they came from
#[derive(Default)]
struct Chunk {
    records: Vec<ParsedRecord>,
    first_row: u64,
    last_row: u64,
}

impl Chunk {
    fn push(&mut self, row: u64, record: ParsedRecord) {
        if self.records.is_empty() {
            self.first_row = row;
        }
        self.last_row = row;
        self.records.push(record);
    }
}

pub struct Loader<S> {
    parser: RowParser,
    builder: SubgraphBatchBuilder<S>,
    options: LoaderOptions,
}

impl<S: GraphStore> Loader<S> {
    pub fn new(store: S, options: LoaderOptions) -> Result<Self, ImportError> {
        let builder = SubgraphBatchBuilder::new(store).map_err(ParseError::from)?;
        Ok(Self {
            parser: RowParser::new()?,
            builder,
            options,
        })
    }

    pub fn store(&self) -> &S {
        self.builder.store()
    }

    pub async fn load_file(&self, path: &Path) -> Result<LoadSummary, ImportError> {
        info!("📂 Loading {}", path.display());
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        self.load_reader(file).await
    }

    /// Load every row of `reader`. Row numbers in errors are 1-based file
    /// lines, so the header counts when present.
    pub async fn load_reader<R: io::Read>(&self, reader: R) -> Result<LoadSummary, ImportError> {
        let started = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(self.options.has_header)
            .flexible(true)
            .from_reader(reader);

        let mut summary = LoadSummary::default();
        let mut chunk = Chunk::default();
        let header_rows = u64::from(self.options.has_header);

        for (i, result) in csv_reader.byte_records().enumerate() {
            let row_data = result?;
            let row = row_data
                .position()
                .map(|p| p.line())
                .unwrap_or(i as u64 + 1 + header_rows);

            let cells: Vec<Cow<'_, str>> = row_data.iter().map(decode_cell).collect();
            let record = self
                .parser
                .parse(&cells)
                .map_err(|source| ImportError::Row { row, source })?;

            summary.rows += 1;
            chunk.push(row, record);

            if chunk.records.len() >= batch_size {
                self.flush(&mut chunk, &mut summary).await?;
            }
        }
        self.flush(&mut chunk, &mut summary).await?;

        info!(
            "✅ Loaded {} rows in {} batches ({} operations) in {:.2?}",
            summary.rows,
            summary.batches,
            summary.operations,
            started.elapsed()
        );
        Ok(summary)
    }

    async fn flush(&self, chunk: &mut Chunk, summary: &mut LoadSummary) -> Result<(), ImportError> {
        if chunk.records.is_empty() {
            return Ok(());
        }

        let submitted = self
            .builder
            .build_and_submit(&chunk.records)
            .await
            .map_err(|source| ImportError::Submit {
                first_row: chunk.first_row,
                last_row: chunk.last_row,
                source,
            })?;

        summary.batches += 1;
        summary.operations += submitted.operations;
        debug!(
            "Flushed rows {}-{} as batch {}",
            chunk.first_row, chunk.last_row, summary.batches
        );
        info!(
            "📦 Batch {} committed: {} records, {} total rows so far",
            summary.batches, submitted.records, summary.rows
        );

        *chunk = Chunk::default();
        Ok(())
    }
}
