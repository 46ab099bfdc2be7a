use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::compute::concat_batches;
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing_subscriber::EnvFilter;

use scancore::analysis::{histogram, remove_outliers, summarize};
use scancore::datafusion::{QuerySession, parse_filter};
use scancore::polars::to_dataframe;
use scancore::prelude::*;
use scancore::{CatalogError, Dataset, TableScanBuilder};

#[derive(Parser)]
#[command(name = "scancli")]
#[command(about = "Ingest, plan and scan partitioned tables", long_about = None)]
struct Cli {
    /// Directory holding table metadata and data files
    #[arg(short, long, default_value = "warehouse", global = true)]
    warehouse: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append the rows of a Parquet file to a table, creating it if needed
    Ingest {
        /// The table identifier (e.g., "nyc.taxis")
        #[arg(short, long)]
        table: String,
        /// The Parquet file to load
        #[arg(short, long)]
        file: PathBuf,
        /// Partition field for a new table as COLUMN=TRANSFORM
        /// (e.g., "tpep_pickup_datetime=day"); repeatable
        #[arg(short, long)]
        partition: Vec<String>,
    },
    /// Show which data files a scan would read
    Plan(ScanArgs),
    /// Read a table into memory and print it
    Scan {
        #[command(flatten)]
        scan: ScanArgs,
        /// Rows to print
        #[arg(long, default_value_t = 10)]
        head: usize,
        /// SQL to run over the result, registered as table "scan"
        #[arg(long)]
        sql: Option<String>,
        /// Drop rows whose value in this column has a z-score of 3 or more
        #[arg(long)]
        remove_outliers: Option<String>,
        #[arg(long, default_value_t = 3.0, requires = "remove_outliers")]
        z_threshold: f64,
        /// Also drop rows whose outlier column is not above this value
        #[arg(long, requires = "remove_outliers")]
        above: Option<f64>,
        /// Print summary statistics and a histogram of this column
        #[arg(long)]
        histogram: Option<String>,
        #[arg(long, default_value_t = 50, requires = "histogram")]
        bins: usize,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// The table identifier (e.g., "nyc.taxis")
    #[arg(short, long)]
    table: String,
    /// Row filter as a SQL boolean expression
    #[arg(short, long)]
    filter: Option<String>,
    /// Comma-separated output columns
    #[arg(short, long, value_delimiter = ',')]
    select: Option<Vec<String>>,
    /// JSON file with scan options
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    max_concurrent_tasks: Option<usize>,
    /// Skip unreadable files instead of failing
    #[arg(long)]
    best_effort: bool,
    /// Append batches in completion order
    #[arg(long)]
    unordered: bool,
    /// Read files sorted by partition values instead of manifest order
    #[arg(long)]
    sort_by_partition: bool,
}

impl ScanArgs {
    async fn options(&self) -> Result<ScanOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let raw = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_slice(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => ScanOptions::default(),
        };
        if let Some(max) = self.max_concurrent_tasks {
            options = options.with_max_concurrent_tasks(max);
        }
        if self.best_effort {
            options = options.best_effort();
        }
        if self.unordered {
            options = options.with_ordering(OutputOrdering::Unordered);
        }
        if self.sort_by_partition {
            options = options.with_file_order(scancore::FileOrder::PartitionValues);
        }
        Ok(options)
    }

    async fn builder(&self, table: &Table) -> Result<TableScanBuilder> {
        let mut scan = table.scan().with_options(self.options().await?);
        if let Some(sql) = &self.filter {
            scan = scan.with_filter(parse_filter(sql, table.schema()?)?);
        }
        if let Some(columns) = &self.select {
            scan = scan.select(columns.iter().map(|c| c.trim()));
        }
        Ok(scan)
    }
}

struct Warehouse {
    catalog: Arc<StorageCatalog>,
    storage: Storage,
}

impl Warehouse {
    async fn open(root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("creating {}", root.display()))?;
        let storage = Storage::local(root)?;
        Ok(Self {
            catalog: Arc::new(StorageCatalog::new("local", storage.clone())),
            storage,
        })
    }

    async fn load(&self, name: &str) -> Result<Table> {
        Ok(Table::load(
            self.catalog.clone(),
            self.storage.clone(),
            TableIdentifier::parse(name),
        )
        .await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let warehouse = Warehouse::open(&cli.warehouse).await?;

    match cli.command {
        Commands::Ingest {
            table,
            file,
            partition,
        } => ingest(&warehouse, &table, &file, &partition).await?,
        Commands::Plan(args) => {
            let table = warehouse.load(&args.table).await?;
            let scan = args.builder(&table).await?;
            println!("filter: {}", scan.filter());
            let tasks = scan.plan_files().await?;
            for task in &tasks {
                println!(
                    "{}\trows={}\tresidual={}",
                    task.file_path(),
                    task.data_file.record_count,
                    task.residual
                );
            }
            println!("{} data files to read", tasks.len());
        }
        Commands::Scan {
            scan,
            head,
            sql,
            remove_outliers: outlier_column,
            z_threshold,
            above,
            histogram: histogram_column,
            bins,
        } => {
            let table = warehouse.load(&scan.table).await?;
            let mut dataset = scan.builder(&table).await?.execute().await?;
            println!("{} rows, {} columns", dataset.num_rows(), dataset.num_columns());
            for warning in dataset.warnings() {
                println!("warning: {}", warning);
            }

            if let Some(column) = outlier_column {
                let before = dataset.num_rows();
                dataset = remove_outliers(&dataset, &column, z_threshold, above)?;
                println!(
                    "removed {} outlier rows by {}",
                    before - dataset.num_rows(),
                    column
                );
            }

            if let Some(column) = histogram_column {
                match summarize(&dataset, &column)? {
                    Some(summary) => println!("{}: {}", column, summary),
                    None => println!("{}: no values", column),
                }
                print!("{}", histogram(&dataset, &column, bins)?.render(40));
            }

            if let Some(query) = sql {
                let session = QuerySession::new();
                session.register_dataset("scan", &dataset)?;
                dataset = session.sql_dataset(&query).await?;
            }

            print_head(&dataset, head)?;
        }
    }

    Ok(())
}

async fn ingest(
    warehouse: &Warehouse,
    name: &str,
    file: &Path,
    partition: &[String],
) -> Result<()> {
    let raw = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(raw))?;
    let arrow_schema = builder.schema().clone();
    let batches = builder.build()?;
    let batches = batches.collect::<Result<Vec<_>, _>>()?;
    let batch = concat_batches(&arrow_schema, &batches)?;

    let mut table = match warehouse.load(name).await {
        Ok(table) => {
            if !partition.is_empty() {
                tracing::warn!(table = name, "table exists; ignoring --partition");
            }
            table
        }
        Err(e) if is_table_not_found(&e) => {
            let schema = Schema::from_arrow(&arrow_schema, 0)?;
            let spec = partition_spec(&schema, partition)?;
            let identifier = TableIdentifier::parse(name);
            let metadata = TableMetadata::builder(identifier.to_path(), schema)
                .with_partition_spec(spec)
                .build();
            Table::create(
                warehouse.catalog.clone(),
                warehouse.storage.clone(),
                identifier,
                metadata,
            )
            .await?
        }
        Err(e) => return Err(e),
    };

    let files = table.writer()?.write(&batch).await?;
    let file_count = files.len();
    let snapshot = table.append(files).await?;
    println!(
        "appended {} rows in {} files to {} (snapshot {})",
        batch.num_rows(),
        file_count,
        table.identifier(),
        snapshot.snapshot_id
    );
    Ok(())
}

fn partition_spec(schema: &Schema, fields: &[String]) -> Result<PartitionSpec> {
    let mut builder = PartitionSpec::builder(schema);
    for field in fields {
        let Some((column, transform)) = field.split_once('=') else {
            bail!("partition field {} is not COLUMN=TRANSFORM", field);
        };
        builder = builder.add_transform(column.trim(), transform.parse::<Transform>()?)?;
    }
    Ok(builder.build())
}

fn is_table_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ScanError>(),
        Some(ScanError::Catalog(CatalogError::TableNotFound(_)))
    )
}

fn print_head(dataset: &Dataset, rows: usize) -> Result<()> {
    if rows == 0 {
        return Ok(());
    }
    let frame = to_dataframe(dataset)?;
    println!("{}", frame.head(Some(rows)));
    Ok(())
}
