use anyhow::{Context, Result};
use attrsearch_core::{
    AttributeFilter, PageRequest, QueryCompiler, SortDirection, SortField, StrategyTable,
};
use attrsearch_storage::es_dsl;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "attrsearch")]
#[command(about = "AttrSearch admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum Table {
    Users,
    Shops,
}

impl Table {
    fn strategies(self) -> StrategyTable {
        match self {
            Table::Users => StrategyTable::users(),
            Table::Shops => StrategyTable::repair_shops(),
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the compiled clause list and its fingerprint.
    Compile {
        /// Attribute filter as a JSON object.
        #[arg(long)]
        filter: String,
        #[arg(long, value_enum, default_value = "users")]
        table: Table,
    },
    /// Print the Elasticsearch request body for a filter.
    Dsl {
        #[arg(long)]
        filter: String,
        #[arg(long, value_enum, default_value = "users")]
        table: Table,
        #[arg(long, default_value_t = 0)]
        page: i64,
        #[arg(long, default_value_t = 10)]
        size: i64,
        #[arg(long, default_value = "_score")]
        sort_by: String,
        #[arg(long, default_value = "desc")]
        direction: String,
        /// Render the `_count` body instead of `_search`.
        #[arg(long)]
        count: bool,
    },
}

fn compiler(table: Table) -> QueryCompiler {
    QueryCompiler::new(Arc::new(table.strategies()))
}

fn parse_filter(raw: &str) -> Result<AttributeFilter> {
    serde_json::from_str(raw).context("--filter must be a JSON object")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let out = match cli.cmd {
        Cmd::Compile { filter, table } => {
            let query = compiler(table).compile(&parse_filter(&filter)?);
            serde_json::json!({
                "fingerprint": query.fingerprint(None),
                "query": query,
            })
        }
        Cmd::Dsl {
            filter,
            table,
            page,
            size,
            sort_by,
            direction,
            count,
        } => {
            let query = compiler(table).compile(&parse_filter(&filter)?);
            if count {
                es_dsl::count_body(&query)
            } else {
                let page = PageRequest::new(page, size)?
                    .with_sort(SortField::parse(&sort_by), SortDirection::parse(&direction));
                es_dsl::search_body(&query, &page)
            }
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dsl_arguments() {
        let cli = Cli::try_parse_from([
            "attrsearch", "dsl", "--filter", r#"{"city":"Lyon"}"#, "--table", "shops",
            "--size", "5", "--count",
        ])
        .unwrap();
        match cli.cmd {
            Cmd::Dsl { size, count, table, .. } => {
                assert_eq!(size, 5);
                assert!(count);
                assert!(matches!(table, Table::Shops));
            }
            Cmd::Compile { .. } => panic!("expected dsl"),
        }
    }

    #[test]
    fn filter_must_be_an_object() {
        assert!(parse_filter("[1, 2]").is_err());
        assert_eq!(parse_filter(r#"{"name": "Smith"}"#).unwrap().len(), 1);
    }
}
