//! Hyperschema navigation CLI
//!
//! Command-line access to pointer reads, masks, schema inspection, link
//! expansion, paging and validation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use hyperschema_nav::{
    is_url, load_document_auto, pointer_exclusion_mask, pointer_get_all, pointer_get_ref,
    pointer_get_with, pointer_inclusion_mask, schema_id, CollectionFilterDescriptor,
    CollectionSortDescriptor, Cursor, CursorOptions, FileSchemaFetcher, FilterOperator,
    JsonSchemaValidator, MemorySchemaCache, NavigatorOptions, NotFoundDefault, SchemaFetcher,
    SchemaNavigator, SchemaRegistry, SchemaValidator, SortDirection, StreamingCursor, ValueCursor,
    READ_LINK_RELS,
};

#[derive(Parser)]
#[command(name = "hyperschema-nav")]
#[command(about = "Navigate JSON data and the hyperschemas that describe it")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the value at a JSON pointer
    Get {
        /// Data source: file path or URL
        data: String,

        /// Absolute, star or relative pointer
        pointer: String,

        /// Return every match of a star pointer as an array
        #[arg(long)]
        all: bool,

        /// Maximum matches with --all
        #[arg(long)]
        limit: Option<usize>,

        /// Root pointer that relative pointers start from
        #[arg(long)]
        root: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Keep (or drop) the parts of a document named by pointers
    Mask {
        /// Data source: file path or URL
        data: String,

        /// Pointer to keep (repeatable)
        #[arg(long, conflicts_with = "exclude", required_unless_present = "exclude")]
        include: Vec<String>,

        /// Pointer to remove (repeatable)
        #[arg(long, conflicts_with = "include", required_unless_present = "include")]
        exclude: Vec<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Summarise a schema: properties, identity, links and columns
    Inspect {
        /// Schema source: file path or URL
        schema: String,

        /// Data pointer to where entity properties begin
        #[arg(long, default_value = "")]
        prefix: String,

        /// Directory holding schemas referenced by external $refs
        /// (default: the schema file's directory)
        #[arg(long)]
        schema_dir: Option<PathBuf>,
    },

    /// Expand a schema link's href against instance data
    Link {
        /// Schema source: file path or URL
        schema: String,

        /// Data source: file path or URL
        data: String,

        /// Link relation to use, tried in order (default: read-like relations)
        #[arg(long)]
        rel: Vec<String>,

        /// Data pointer to where entity properties begin
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// Print one page of a JSON array
    Page {
        /// Data source: file path or URL
        data: String,

        /// Pointer to the array inside the document
        #[arg(long, default_value = "")]
        pointer: String,

        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Items per page
        #[arg(long, default_value_t = hyperschema_nav::DEFAULT_PAGE_LIMIT)]
        limit: usize,

        /// Re-page a parent cursor of this page size instead of slicing directly
        #[arg(long)]
        parent_limit: Option<usize>,

        /// Filter as path:operator:value; value is parsed as JSON when possible
        #[arg(long)]
        filter: Vec<String>,

        /// Sort as path or path:desc
        #[arg(long)]
        sort: Vec<String>,

        /// Case-insensitive search over item fields
        #[arg(long)]
        search: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate data against a JSON Schema
    Validate {
        /// Data source: file path or URL
        data: String,

        /// Schema source: file path or URL
        #[arg(long)]
        schema: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: starting runtime: {}", e);
            return ExitCode::from(3);
        }
    };

    match runtime.block_on(run(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("hyperschema_nav=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<(), u8> {
    match command {
        Commands::Get {
            data,
            pointer,
            all,
            limit,
            root,
            pretty,
        } => run_get(&data, &pointer, all, limit, root.as_deref(), pretty).await,

        Commands::Mask {
            data,
            include,
            exclude,
            pretty,
        } => run_mask(&data, &include, &exclude, pretty).await,

        Commands::Inspect {
            schema,
            prefix,
            schema_dir,
        } => run_inspect(&schema, &prefix, schema_dir).await,

        Commands::Link {
            schema,
            data,
            rel,
            prefix,
        } => run_link(&schema, &data, &rel, &prefix).await,

        Commands::Page {
            data,
            pointer,
            page,
            limit,
            parent_limit,
            filter,
            sort,
            search,
            pretty,
        } => {
            run_page(PageArgs {
                data,
                pointer,
                page,
                limit,
                parent_limit,
                filter,
                sort,
                search,
                pretty,
            })
            .await
        }

        Commands::Validate { data, schema, json } => run_validate(&data, &schema, json).await,
    }
}

async fn load(source: &str, what: &str) -> Result<Value, u8> {
    load_document_auto(source).await.map_err(|e| {
        eprintln!("Error: loading {}: {}", what, e);
        e.exit_code() as u8
    })
}

/// Report a library error as an input error (exit code 2).
fn input_error(e: impl std::fmt::Display) -> u8 {
    eprintln!("Error: {}", e);
    2
}

fn print_json(value: &Value, pretty: bool) -> Result<(), u8> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", text);
    Ok(())
}

async fn run_get(
    source: &str,
    pointer: &str,
    all: bool,
    limit: Option<usize>,
    root: Option<&str>,
    pretty: bool,
) -> Result<(), u8> {
    let data = load(source, "data").await?;
    let value = if all {
        Value::Array(pointer_get_all(&data, pointer, root, limit).map_err(input_error)?)
    } else {
        pointer_get_with(&data, pointer, root, &NotFoundDefault).map_err(input_error)?
    };
    print_json(&value, pretty)
}

async fn run_mask(
    source: &str,
    include: &[String],
    exclude: &[String],
    pretty: bool,
) -> Result<(), u8> {
    let data = load(source, "data").await?;
    let masked = if include.is_empty() {
        pointer_exclusion_mask(&data, exclude)
    } else {
        pointer_inclusion_mask(&data, include)
    }
    .map_err(input_error)?;
    print_json(&masked, pretty)
}

/// Build a navigator, pre-loading schemas reached through external `$ref`s.
async fn navigator_for(
    source: &str,
    prefix: &str,
    schema_dir: Option<PathBuf>,
) -> Result<SchemaNavigator, u8> {
    let schema = Arc::new(load(source, "schema").await?);
    let registry = SchemaRegistry::new(
        Arc::new(MemorySchemaCache::new()),
        ref_fetcher(source, schema_dir)?,
    );

    let id = schema_id(&schema).unwrap_or(source).to_string();
    registry
        .cache()
        .set_schema_as(&id, Arc::clone(&schema))
        .map_err(input_error)?;
    registry.load_with_refs(&id).await.map_err(|e| {
        eprintln!("Error: loading referenced schemas: {}", e);
        e.exit_code() as u8
    })?;

    let options = NavigatorOptions::new().property_prefix(prefix);
    SchemaNavigator::with_resolver(schema, &options, &registry).map_err(input_error)
}

fn ref_fetcher(source: &str, schema_dir: Option<PathBuf>) -> Result<Arc<dyn SchemaFetcher>, u8> {
    if let Some(dir) = schema_dir {
        return Ok(Arc::new(FileSchemaFetcher::new(dir)));
    }
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            let base = source.rsplit_once('/').map_or(source, |(base, _)| base);
            let fetcher = hyperschema_nav::HttpSchemaFetcher::new()
                .map_err(input_error)?
                .with_base_url(base);
            return Ok(Arc::new(fetcher));
        }
    }
    let dir = Path::new(source)
        .parent()
        .unwrap_or(Path::new("."))
        .to_path_buf();
    Ok(Arc::new(FileSchemaFetcher::new(dir)))
}

async fn run_inspect(source: &str, prefix: &str, schema_dir: Option<PathBuf>) -> Result<(), u8> {
    let nav = navigator_for(source, prefix, schema_dir).await?;

    let columns: Vec<Value> = nav
        .columns()
        .into_iter()
        .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
        .collect();
    let links: Vec<Value> = nav
        .links()
        .iter()
        .map(|l| serde_json::to_value(l).unwrap_or(Value::Null))
        .collect();

    let summary = json!({
        "id": nav.id(),
        "entity": nav.entity(),
        "identity": nav.identity_property(),
        "identityProperties": nav.identity_properties(),
        "properties": nav.property_names(),
        "required": nav.required(),
        "columns": columns,
        "links": links,
    });
    print_json(&summary, true)
}

async fn run_link(schema: &str, source: &str, rels: &[String], prefix: &str) -> Result<(), u8> {
    let nav = navigator_for(schema, prefix, None).await?;
    let data = load(source, "data").await?;

    let rels: Vec<&str> = if rels.is_empty() {
        READ_LINK_RELS.to_vec()
    } else {
        rels.iter().map(String::as_str).collect()
    };
    let Some(link) = nav.get_first_link(&rels) else {
        eprintln!("Error: schema has no link with rel {}", rels.join(", "));
        return Err(2);
    };

    let href = nav.resolve_link_href(link, &data).map_err(input_error)?;
    println!("{}", href);
    Ok(())
}

struct PageArgs {
    data: String,
    pointer: String,
    page: usize,
    limit: usize,
    parent_limit: Option<usize>,
    filter: Vec<String>,
    sort: Vec<String>,
    search: Option<String>,
    pretty: bool,
}

/// Parse `path:operator:value`. The value is JSON if it parses, else a string.
fn parse_filter(spec: &str) -> Result<CollectionFilterDescriptor, u8> {
    let mut parts = spec.splitn(3, ':');
    let (Some(path), Some(op), Some(raw)) = (parts.next(), parts.next(), parts.next()) else {
        eprintln!("Error: filter must be path:operator:value, got {:?}", spec);
        return Err(2);
    };
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok(CollectionFilterDescriptor::new(
        path,
        FilterOperator::parse(op),
        value,
    ))
}

/// Parse `path` or `path:asc|desc`.
fn parse_sort(spec: &str) -> CollectionSortDescriptor {
    match spec
        .rsplit_once(':')
        .and_then(|(path, dir)| SortDirection::parse(dir).map(|d| (path, d)))
    {
        Some((path, direction)) => CollectionSortDescriptor::new(path, direction),
        None => CollectionSortDescriptor::new(spec, SortDirection::Asc),
    }
}

async fn run_page(args: PageArgs) -> Result<(), u8> {
    let data = load(&args.data, "data").await?;
    let items = match pointer_get_ref(&data, &args.pointer).map_err(input_error)? {
        Value::Array(items) => items.clone(),
        other => {
            eprintln!(
                "Error: {:?} is {}, not an array",
                args.pointer,
                hyperschema_nav::json_type_name(other)
            );
            return Err(2);
        }
    };

    let filters = args
        .filter
        .iter()
        .map(|f| parse_filter(f))
        .collect::<Result<Vec<_>, _>>()?;
    let sorters: Vec<_> = args.sort.iter().map(|s| parse_sort(s)).collect();

    let options = CursorOptions::new().limit(args.limit);
    let mut cursor: Box<dyn Cursor> = match args.parent_limit {
        Some(parent_limit) => {
            let parent = ValueCursor::new(items, &CursorOptions::new().limit(parent_limit))
                .map_err(input_error)?;
            Box::new(StreamingCursor::new(Box::new(parent), &options).map_err(input_error)?)
        }
        None => Box::new(ValueCursor::new(items, &options).map_err(input_error)?),
    };

    if !filters.is_empty() {
        if let Some(filterable) = cursor.as_filterable() {
            filterable.filter_by(filters);
        }
    }
    if !sorters.is_empty() {
        if let Some(sortable) = cursor.as_sortable() {
            sortable.sort_by(sorters);
        }
    }
    if args.search.is_some() {
        if let Some(searchable) = cursor.as_searchable() {
            searchable.search(args.search);
        }
    }

    let items = cursor.select(args.page, false).await.map_err(input_error)?;
    let output = json!({
        "page": cursor.current(),
        "limit": cursor.limit(),
        "count": cursor.count(),
        "totalPages": cursor.total_pages(),
        "hasNext": cursor.has_next(),
        "hasPrevious": cursor.has_previous(),
        "items": items,
    });
    print_json(&output, args.pretty)
}

async fn run_validate(data_source: &str, schema_source: &str, json_output: bool) -> Result<(), u8> {
    let data = load_document_auto(data_source).await.map_err(|e| {
        report_error(json_output, &format!("loading data: {}", e));
        e.exit_code() as u8
    })?;
    let schema = load_document_auto(schema_source).await.map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;

    let validator = JsonSchemaValidator::new(&schema).map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    let outcome = validator.validate(&data);
    if outcome.valid {
        if json_output {
            println!(r#"{{"valid":true}}"#);
        } else {
            println!("Valid");
        }
        return Ok(());
    }

    if json_output {
        println!("{}", json!({ "valid": false, "errors": outcome.errors }));
    } else {
        eprintln!("Validation failed:");
        for error in &outcome.errors {
            eprintln!("  {}", error);
        }
    }
    Err(1)
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
