//! Retail/sale price CSV files to NewStore price book imports.
//!
//! Files arrive as `<prefix>_<CCY>_<RET|SAL>_<timestamp>.csv`. A pair is only
//! imported once both halves exist; the retail book goes first so sale
//! prices land on top of it.

use crate::config::env;
use crate::core::import_files::{archive_file, import_step_input, object_prefix, start_import_workflow, ChunkWriter};
use crate::core::EtlEngine;
use crate::domain::model::{PriceBook, PriceBookHead, PriceItem, S3Event, S3EventRecord, StepInput};
use crate::domain::ports::{Pipeline, Storage, WorkflowStarter};
use crate::utils::error::{IntegrationError, Result};
use crate::utils::validation::{validate_positive_number, validate_s3_bucket_name, validate_s3_prefix, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;

pub const CATALOG_EN: &str = "storefront-catalog-en";
pub const CATALOG_FR: &str = "storefront-catalog-fr";
pub const ENTRY_NAME: &str = "prices.json";
pub const KIND: &str = "prices/msrp";

fn file_name_pattern() -> Option<Regex> {
    Regex::new(r"^([A-Za-z0-9]*)_([A-Z]{3})_([A-Z]{3})_(\d{8,14})\.csv$").ok()
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bucket: String,
    pub s3_prefix: String,
    pub chunk_size: usize,
    pub secs_between_chunks: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bucket: env::required("S3_BUCKET")?,
            s3_prefix: env::required("S3_PREFIX")?,
            chunk_size: env::parse_required("CHUNK_SIZE")?,
            secs_between_chunks: env::parse_required("SECS_BETWEEN_CHUNKS")?,
        })
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_s3_bucket_name("S3_BUCKET", &self.bucket)?;
        validate_s3_prefix("S3_PREFIX", &self.s3_prefix)?;
        validate_positive_number("CHUNK_SIZE", self.chunk_size, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriceType {
    Retail,
    Sale,
}

impl PriceType {
    pub fn code(&self) -> &'static str {
        match self {
            PriceType::Retail => "RET",
            PriceType::Sale => "SAL",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "RET" => Some(PriceType::Retail),
            "SAL" => Some(PriceType::Sale),
            _ => None,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            PriceType::Retail => PriceType::Sale,
            PriceType::Sale => PriceType::Retail,
        }
    }
}

/// A price file recognised from its object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceFile {
    pub bucket: String,
    pub key: String,
    pub directory: String,
    pub prefix: String,
    pub currency: String,
    pub price_type: PriceType,
    pub timestamp: String,
}

impl PriceFile {
    pub fn parse(bucket: &str, key: &str) -> Option<Self> {
        let (directory, file_name) = match key.rsplit_once('/') {
            Some((dir, name)) => (dir.to_string(), name),
            None => (String::new(), key),
        };
        let caps = file_name_pattern()?.captures(file_name)?;
        let price_type = PriceType::from_code(&caps[3])?;

        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            directory,
            prefix: caps[1].to_string(),
            currency: caps[2].to_string(),
            price_type,
            timestamp: caps[4].to_string(),
        })
    }

    fn with_type(&self, price_type: PriceType) -> Self {
        let file_name = format!("{}_{}_{}_{}.csv", self.prefix, self.currency, price_type.code(), self.timestamp);
        let key = if self.directory.is_empty() {
            file_name
        } else {
            format!("{}/{}", self.directory, file_name)
        };
        Self {
            key,
            price_type,
            ..self.clone()
        }
    }

    pub fn sibling(&self) -> Self {
        self.with_type(self.price_type.other())
    }

    pub fn is_sale(&self) -> bool {
        self.price_type == PriceType::Sale
    }

    fn pair_id(&self) -> (String, String, String, String, String) {
        (
            self.bucket.clone(),
            self.directory.clone(),
            self.prefix.clone(),
            self.currency.clone(),
            self.timestamp.clone(),
        )
    }
}

/// Retail and sale file of the same upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricePair {
    pub retail: PriceFile,
    pub sale: PriceFile,
}

impl PricePair {
    pub fn files(&self) -> [&PriceFile; 2] {
        [&self.retail, &self.sale]
    }

    pub fn currency(&self) -> &str {
        &self.retail.currency
    }
}

/// Pairs whose two files both exist, each pair listed once.
pub async fn find_pairs<S: Storage>(storage: &S, records: &[S3EventRecord]) -> Result<Vec<PricePair>> {
    let mut seen = BTreeSet::new();
    let mut pairs = Vec::new();

    for record in records {
        if !record.is_object_created() {
            tracing::warn!("Ignoring {} event", record.event_name);
            continue;
        }
        let key = record.decoded_key();
        let Some(file) = PriceFile::parse(record.bucket(), &key) else {
            tracing::error!("invalid file name: {} - skipping", key);
            continue;
        };
        if !seen.insert(file.pair_id()) {
            continue;
        }

        let sibling = file.sibling();
        if !storage.exists(&sibling.bucket, &sibling.key).await? {
            tracing::info!("Waiting for {} before importing {}", sibling.key, file.key);
            continue;
        }

        let (retail, sale) = match file.price_type {
            PriceType::Retail => (file, sibling),
            PriceType::Sale => (sibling, file),
        };
        tracing::debug!("found pair {} / {}", retail.key, sale.key);
        pairs.push(PricePair { retail, sale });
    }

    Ok(pairs)
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(rename = "ProductSKU")]
    product_sku: String,
    #[serde(rename = "Price")]
    price: String,
}

pub fn pricebook_name(currency: &str) -> String {
    if currency == "CAD" {
        "default".to_string()
    } else {
        format!("{}-prices", currency.to_lowercase())
    }
}

/// Reads a `ProductSKU,Price` CSV into a price book.
pub fn csv_to_pricebook(data: &[u8], currency: &str, catalog: &str, is_sale: bool) -> Result<PriceBook> {
    let mut reader = csv::Reader::from_reader(data);
    let mut items = Vec::new();

    for (index, row) in reader.deserialize::<PriceRow>().enumerate() {
        let line_no = index + 1;
        let row = row.map_err(|e| {
            tracing::error!("error processing line {}", line_no);
            IntegrationError::processing(format!("line {}: {}", line_no, e))
        })?;
        let value: f64 = row.price.trim().parse().map_err(|_| {
            tracing::error!("error processing line {}", line_no);
            IntegrationError::processing(format!("line {}: invalid price '{}'", line_no, row.price))
        })?;

        if value == 0.0 && is_sale {
            continue;
        }
        items.push(PriceItem {
            product_id: row.product_sku,
            value,
        });
    }

    Ok(PriceBook {
        head: PriceBookHead {
            pricebook: pricebook_name(currency),
            catalog: catalog.to_string(),
            currency: currency.to_string(),
        },
        items,
    })
}

/// The English catalog book, plus the French one for CAD.
pub fn pricebooks(data: &[u8], currency: &str, is_sale: bool) -> Result<Vec<PriceBook>> {
    let mut books = vec![csv_to_pricebook(data, currency, CATALOG_EN, is_sale)?];
    if currency == "CAD" {
        books.push(csv_to_pricebook(data, currency, CATALOG_FR, is_sale)?);
    }
    Ok(books)
}

pub fn pricebooks_for(file: &PriceFile, data: &[u8]) -> Result<Vec<PriceBook>> {
    pricebooks(data, &file.currency, file.is_sale())
}

/// Writes all books under one prefix, numbering chunks across books.
pub async fn write_pricebooks<S: Storage>(
    storage: &S,
    bucket: &str,
    prefix: &str,
    books: &[PriceBook],
    chunk_size: usize,
) -> Result<usize> {
    let writer = ChunkWriter::new(storage, bucket, ENTRY_NAME, chunk_size);
    let mut written = 0;
    for book in books {
        written += writer.write(prefix, &book.head, &book.items, written).await?;
    }
    Ok(written)
}

pub struct PricePairPipeline<'a, S: Storage, W: WorkflowStarter> {
    storage: &'a S,
    workflows: &'a W,
    settings: &'a Settings,
    pair: PricePair,
    now: DateTime<Utc>,
}

impl<'a, S: Storage, W: WorkflowStarter> PricePairPipeline<'a, S, W> {
    pub fn new(storage: &'a S, workflows: &'a W, settings: &'a Settings, pair: PricePair, now: DateTime<Utc>) -> Self {
        Self {
            storage,
            workflows,
            settings,
            pair,
            now,
        }
    }
}

#[async_trait]
impl<'a, S: Storage, W: WorkflowStarter> Pipeline for PricePairPipeline<'a, S, W> {
    type Extracted = Vec<(PriceFile, Vec<u8>)>;
    type Transformed = Vec<PriceBook>;
    type Loaded = StepInput;

    async fn extract(&self) -> Result<Self::Extracted> {
        let mut files = Vec::new();
        for file in self.pair.files() {
            tracing::info!("processing {}", file.key);
            let data = self.storage.read_file(&file.bucket, &file.key).await?;
            files.push((file.clone(), data));
        }
        Ok(files)
    }

    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed> {
        let mut books = Vec::new();
        for (file, bytes) in &data {
            let file_books = pricebooks_for(file, bytes)?;
            tracing::info!(
                "{} -> {} price books, {} items",
                file.key,
                file_books.len(),
                file_books.iter().map(|b| b.items.len()).sum::<usize>()
            );
            books.extend(file_books);
        }
        Ok(books)
    }

    async fn load(&self, books: Self::Transformed) -> Result<Self::Loaded> {
        let prefix = object_prefix(&self.settings.s3_prefix, KIND, self.now);
        tracing::info!("obj_prefix is {}", prefix);

        write_pricebooks(self.storage, &self.settings.bucket, &prefix, &books, self.settings.chunk_size).await?;

        for file in self.pair.files() {
            archive_file(self.storage, &file.bucket, &file.key).await?;
        }

        let input = import_step_input(
            &self.settings.bucket,
            &prefix,
            &self.settings.s3_prefix,
            self.settings.secs_between_chunks,
        );
        start_import_workflow(self.workflows, &input).await?;
        Ok(input)
    }
}

/// Imports every complete pair referenced by the event.
pub async fn handle<S: Storage, W: WorkflowStarter>(
    storage: &S,
    workflows: &W,
    settings: &Settings,
    event: &S3Event,
) -> Result<Vec<StepInput>> {
    let pairs = find_pairs(storage, &event.records).await?;
    tracing::info!("Found {} price file pairs", pairs.len());

    let mut started = Vec::new();
    for pair in pairs {
        let name = format!("price import {}", pair.retail.key);
        let pipeline = PricePairPipeline::new(storage, workflows, settings, pair, Utc::now());
        started.push(EtlEngine::new(&name, pipeline).run().await?);
    }
    Ok(started)
}
