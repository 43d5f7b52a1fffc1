use atlas_data_client::config::{ENV_API_KEY, ENV_BASE_URL};
use atlas_data_client::{
    CollectionClient, DataApiConfig, DataApiTransport, Document, MaterializeStrategy, Query,
    ReturnDocument,
};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::{Value, json};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "atlas-data")]
#[command(about = "Run collection operations against the MongoDB Atlas Data API")]
struct Cli {
    #[arg(long)]
    database: String,
    #[arg(long)]
    collection: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    FindOne(FindOneArgs),
    Find(FindArgs),
    FindById(IdArgs),
    UpdateOne(UpdateArgs),
    UpdateMany(UpdateArgs),
    DeleteOne(FilterArgs),
    DeleteMany(FilterArgs),
    InsertOne(InsertOneArgs),
    InsertMany(InsertManyArgs),
    FindOneAndUpdate(FindOneAndUpdateArgs),
    FindOneAndDelete(FilterArgs),
    FindByIdAndUpdate(FindByIdAndUpdateArgs),
    FindByIdAndDelete(IdArgs),
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// JSON object; defaults to `{}`.
    #[arg(long)]
    filter: Option<String>,
}

#[derive(clap::Args, Debug)]
struct FindOneArgs {
    #[arg(long)]
    filter: Option<String>,
    #[arg(long)]
    projection: Option<String>,
}

#[derive(clap::Args, Debug)]
struct FindArgs {
    #[arg(long)]
    filter: Option<String>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    projection: Option<String>,
    #[arg(long)]
    limit: Option<u64>,
    #[arg(long)]
    skip: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct IdArgs {
    #[arg(long)]
    id: String,
}

#[derive(clap::Args, Debug)]
struct UpdateArgs {
    #[arg(long)]
    filter: Option<String>,
    #[arg(long)]
    update: String,
    #[arg(long, action = ArgAction::SetTrue)]
    upsert: bool,
}

#[derive(clap::Args, Debug)]
struct InsertOneArgs {
    #[arg(long)]
    document: String,
    /// Re-fetch and print the stored document instead of its id.
    #[arg(long = "return-document", action = ArgAction::SetTrue)]
    return_document: bool,
}

#[derive(clap::Args, Debug)]
struct InsertManyArgs {
    /// JSON array of objects.
    #[arg(long)]
    documents: String,
    #[arg(long = "return-documents", action = ArgAction::SetTrue)]
    return_documents: bool,
    /// Fetch returned documents concurrently.
    #[arg(long, action = ArgAction::SetTrue)]
    concurrent: bool,
}

#[derive(clap::Args, Debug)]
struct FindOneAndUpdateArgs {
    #[arg(long)]
    filter: Option<String>,
    #[arg(long)]
    update: String,
    #[arg(long, action = ArgAction::SetTrue)]
    upsert: bool,
    /// Print the document as re-fetched after the update.
    #[arg(long = "return-after", action = ArgAction::SetTrue)]
    return_after: bool,
}

#[derive(clap::Args, Debug)]
struct FindByIdAndUpdateArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    update: String,
    #[arg(long, action = ArgAction::SetTrue)]
    upsert: bool,
    #[arg(long = "return-after", action = ArgAction::SetTrue)]
    return_after: bool,
}

/// A fully parsed command, ready to send.
#[derive(Debug)]
enum Operation {
    FindOne(Query),
    Find(Query),
    FindById(String),
    UpdateOne { query: Query, upsert: bool },
    UpdateMany { query: Query, upsert: bool },
    DeleteOne(Query),
    DeleteMany(Query),
    InsertOne { document: Document, returning: bool },
    InsertMany {
        documents: Vec<Document>,
        returning: Option<MaterializeStrategy>,
    },
    FindOneAndUpdate {
        query: Query,
        return_document: ReturnDocument,
        upsert: bool,
    },
    FindOneAndDelete(Query),
    FindByIdAndUpdate {
        id: String,
        update: Document,
        return_document: ReturnDocument,
        upsert: bool,
    },
    FindByIdAndDelete(String),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<String, String> {
    let operation = parse_operation(cli.command)?;
    let client = connect(cli.database, cli.collection)?;
    let output = execute(&client, operation).await.map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&output).map_err(|e| e.to_string())
}

fn connect(
    database: String,
    collection: String,
) -> Result<CollectionClient<atlas_data_client::ReqwestDataApiTransport>, String> {
    let lookup = |key: &str| std::env::var(key).ok();
    for variable in DataApiConfig::missing_variables(lookup) {
        if variable == ENV_BASE_URL || variable == ENV_API_KEY {
            warn!(variable, "Data API credential not set");
        }
    }
    let config = DataApiConfig::from_lookup(lookup).map_err(|e| e.to_string())?;
    CollectionClient::from_config(&config, database, collection).map_err(|e| e.to_string())
}

fn parse_operation(command: Commands) -> Result<Operation, String> {
    let operation = match command {
        Commands::FindOne(args) => {
            let mut query = filter_query(args.filter.as_deref())?;
            if let Some(projection) = optional_object("--projection", args.projection.as_deref())? {
                query = query.with_projection(projection);
            }
            Operation::FindOne(query)
        }
        Commands::Find(args) => {
            let mut query = filter_query(args.filter.as_deref())?;
            if let Some(sort) = optional_object("--sort", args.sort.as_deref())? {
                query = query.with_sort(sort);
            }
            if let Some(projection) = optional_object("--projection", args.projection.as_deref())? {
                query = query.with_projection(projection);
            }
            if let Some(limit) = args.limit {
                query = query.with_limit(limit);
            }
            if let Some(skip) = args.skip {
                query = query.with_skip(skip);
            }
            Operation::Find(query)
        }
        Commands::FindById(args) => Operation::FindById(non_empty_id(args.id)?),
        Commands::UpdateOne(args) => Operation::UpdateOne {
            query: update_query(args.filter.as_deref(), &args.update)?,
            upsert: args.upsert,
        },
        Commands::UpdateMany(args) => Operation::UpdateMany {
            query: update_query(args.filter.as_deref(), &args.update)?,
            upsert: args.upsert,
        },
        Commands::DeleteOne(args) => Operation::DeleteOne(filter_query(args.filter.as_deref())?),
        Commands::DeleteMany(args) => Operation::DeleteMany(filter_query(args.filter.as_deref())?),
        Commands::InsertOne(args) => Operation::InsertOne {
            document: parse_object("--document", &args.document)?,
            returning: args.return_document,
        },
        Commands::InsertMany(args) => Operation::InsertMany {
            documents: parse_object_array("--documents", &args.documents)?,
            returning: args.return_documents.then_some(if args.concurrent {
                MaterializeStrategy::Concurrent
            } else {
                MaterializeStrategy::Sequential
            }),
        },
        Commands::FindOneAndUpdate(args) => Operation::FindOneAndUpdate {
            query: update_query(args.filter.as_deref(), &args.update)?,
            return_document: return_document(args.return_after),
            upsert: args.upsert,
        },
        Commands::FindOneAndDelete(args) => {
            Operation::FindOneAndDelete(filter_query(args.filter.as_deref())?)
        }
        Commands::FindByIdAndUpdate(args) => Operation::FindByIdAndUpdate {
            id: non_empty_id(args.id)?,
            update: parse_object("--update", &args.update)?,
            return_document: return_document(args.return_after),
            upsert: args.upsert,
        },
        Commands::FindByIdAndDelete(args) => Operation::FindByIdAndDelete(non_empty_id(args.id)?),
    };
    Ok(operation)
}

async fn execute<T>(
    client: &CollectionClient<T>,
    operation: Operation,
) -> atlas_data_client::DataApiResult<Value>
where
    T: DataApiTransport,
{
    let output = match operation {
        Operation::FindOne(query) => json!(client.find_one(&query).await?),
        Operation::Find(query) => json!(client.find_many(&query).await?),
        Operation::FindById(id) => json!(client.find_by_id(&id).await?),
        Operation::UpdateOne { query, upsert } => {
            json!({ "modified": client.update_one(&query, upsert).await? })
        }
        Operation::UpdateMany { query, upsert } => {
            json!({ "modified": client.update_many(&query, upsert).await? })
        }
        Operation::DeleteOne(query) => json!({ "deleted": client.delete_one(&query).await? }),
        Operation::DeleteMany(query) => json!({ "deleted": client.delete_many(&query).await? }),
        Operation::InsertOne {
            document,
            returning: false,
        } => json!({ "id": client.insert_one(document).await? }),
        Operation::InsertOne {
            document,
            returning: true,
        } => json!(client.insert_one_returning(document).await?),
        Operation::InsertMany {
            documents,
            returning: None,
        } => json!({ "ids": client.insert_many(documents).await? }),
        Operation::InsertMany {
            documents,
            returning: Some(strategy),
        } => json!(client.insert_many_returning(documents, strategy).await?),
        Operation::FindOneAndUpdate {
            query,
            return_document,
            upsert,
        } => json!(client.find_one_and_update(&query, return_document, upsert).await?),
        Operation::FindOneAndDelete(query) => json!(client.find_one_and_delete(&query).await?),
        Operation::FindByIdAndUpdate {
            id,
            update,
            return_document,
            upsert,
        } => json!(
            client
                .find_by_id_and_update(&id, update, return_document, upsert)
                .await?
        ),
        Operation::FindByIdAndDelete(id) => json!(client.find_by_id_and_delete(&id).await?),
    };
    Ok(output)
}

fn return_document(after: bool) -> ReturnDocument {
    if after {
        ReturnDocument::After
    } else {
        ReturnDocument::Before
    }
}

fn non_empty_id(id: String) -> Result<String, String> {
    let id = id.trim().to_string();
    if id.is_empty() {
        return Err("--id must not be empty".to_string());
    }
    Ok(id)
}

fn filter_query(filter: Option<&str>) -> Result<Query, String> {
    Ok(match optional_object("--filter", filter)? {
        Some(filter) => Query::filter(filter),
        None => Query::new(),
    })
}

fn update_query(filter: Option<&str>, update: &str) -> Result<Query, String> {
    Ok(filter_query(filter)?.with_update(parse_object("--update", update)?))
}

fn optional_object(flag: &str, raw: Option<&str>) -> Result<Option<Document>, String> {
    raw.map(|raw| parse_object(flag, raw)).transpose()
}

fn parse_object(flag: &str, raw: &str) -> Result<Document, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|error| format!("{flag} is not valid JSON: {error}"))?;
    atlas_data_client::into_document(value).map_err(|error| format!("{flag}: {error}"))
}

fn parse_object_array(flag: &str, raw: &str) -> Result<Vec<Document>, String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|error| format!("{flag} is not valid JSON: {error}"))?;
    let Value::Array(items) = value else {
        return Err(format!("{flag} must be a JSON array of objects"));
    };
    items
        .into_iter()
        .map(|item| {
            atlas_data_client::into_document(item).map_err(|error| format!("{flag}: {error}"))
        })
        .collect()
}
