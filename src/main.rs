//! `flint-note` — CLI entry point over `flint_core::Workspace`. Top-level
//! flags are hand-parsed (spec §6 pins their exact behavior: `--help`
//! exits zero, a missing flag value's message must contain "requires a
//! path argument"); subcommand parsing is delegated to `clap` (`cli.rs`).
//! Mirrors the teacher's `main.rs` exit-code plumbing
//! (`FlintError::exit_code()` converted to `std::process::ExitCode`).

mod cli;
mod json;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use cli::{Cli, Commands};
use flint_core::error::{ExitCode as FlintExitCode, FlintError, Result};
use flint_core::logging;
use flint_core::metadata::MetadataMap;
use flint_core::registry::Registry;
use flint_core::search::{
    AdvancedSearchParams, FilterOp, MetadataFilter, SortField, SortOrder, SortSpec, SqlSearchParams,
};
use flint_core::store::UpdatePatch;
use flint_core::workspace::Workspace;

const USAGE: &str = "\
flint-note [--workspace <path>] <command> [args]

Global options:
  --workspace, --workspace-path <path>   workspace root (defaults to the registry's current vault, else cwd)
  --help, -h                             print this message and exit

Commands:
  create <type> <title> [--body TEXT] [--metadata JSON]
  get <id>
  update <id> --prior-hash HASH [--body TEXT] [--metadata JSON]
  rename <id> <new-title> --prior-hash HASH
  move <id> <new-type> --prior-hash HASH
  delete <id> --prior-hash HASH --confirm
  search <query> [--type TYPE] [--limit N] [--regex]
  search-advanced [--type TYPE] [--filter key=value]... [--sort field:order]... [--updated-within 7d] ...
  search-sql <query> [--param VALUE]... [--limit N] [--timeout-ms N]
  tags [--tag TAG]... [--all]
  similar <id> [--k N]
  link <from> <to> [--label TEXT]
  links <id>
  broken-links
  create-type <name> [--description TEXT]
  update-type <name> <description>
  type-info <name>
  list-types
  rebuild
";

fn main() -> ExitCode {
    let start = Instant::now();
    let args: Vec<String> = env::args().skip(1).collect();

    let parsed = match extract_global_flags(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(FlintExitCode::Usage as u8);
        }
    };

    if parsed.help {
        println!("{USAGE}");
        return ExitCode::from(FlintExitCode::Success as u8);
    }

    if let Err(e) = logging::init_tracing(false, None, false) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let cli = match Cli::try_parse_from(parsed.rest.iter().cloned()) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(FlintExitCode::Usage as u8);
        }
    };

    tracing::debug!(elapsed = ?start.elapsed(), "parse_args");

    match run(&parsed.workspace, cli) {
        Ok(()) => ExitCode::from(FlintExitCode::Success as u8),
        Err(e) => {
            eprintln!("{}", e.to_json());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

struct GlobalFlags {
    workspace: Option<PathBuf>,
    help: bool,
    rest: Vec<String>,
}

/// Hand-parse `--workspace`/`--workspace-path`/`--help`/`-h` out of
/// `argv`, leaving the rest (subcommand + its args) for `clap`. A flag
/// with no following value is an error whose message contains "requires
/// a path argument" (spec §6, literal).
fn extract_global_flags(argv: &[String]) -> std::result::Result<GlobalFlags, String> {
    let mut workspace = None;
    let mut help = false;
    let mut rest = Vec::with_capacity(argv.len());

    let mut iter = argv.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--workspace" | "--workspace-path" => {
                let value = iter.next().ok_or_else(|| {
                    format!("{arg} requires a path argument")
                })?;
                workspace = Some(PathBuf::from(value));
            }
            "--help" | "-h" => help = true,
            other => rest.push(other.to_string()),
        }
    }

    Ok(GlobalFlags { workspace, help, rest })
}

/// Resolve the workspace root: the explicit flag, else the registry's
/// current vault, else the current directory (spec §6: the registry is
/// "out-of-scope specifics" for lookup precedence, so cwd is the
/// reasonable terminal fallback for a bare invocation).
fn resolve_workspace_root(explicit: &Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    if let Ok(registry) = Registry::load() {
        if let Some(path) = registry.current_path() {
            return Ok(path.clone());
        }
    }
    env::current_dir().map_err(FlintError::StdIo)
}

fn run(explicit_workspace: &Option<PathBuf>, cli: Cli) -> Result<()> {
    let root = resolve_workspace_root(explicit_workspace)?;
    let ws = Workspace::open(&root)?;

    let output = match cli.command {
        Commands::Create { note_type, title, body, metadata } => {
            let metadata = parse_metadata(metadata)?;
            let note = ws.create_note(&note_type, &title, &body, metadata)?;
            json::note_to_json(&note)
        }
        Commands::Get { identifier } => {
            let note = ws.get_note(&identifier)?;
            json::note_to_json(&note)
        }
        Commands::Update { identifier, body, metadata, prior_hash } => {
            let metadata = match metadata {
                Some(raw) => Some(json::parse_metadata_json(&raw).map_err(|e| FlintError::invalid("metadata", e))?),
                None => None,
            };
            let patch = UpdatePatch { body, metadata };
            let note = ws.update_note(&identifier, patch, &prior_hash)?;
            json::note_to_json(&note)
        }
        Commands::Rename { identifier, new_title, prior_hash } => {
            let report = ws.rename_note(&identifier, &new_title, &prior_hash)?;
            json::mutation_report_to_json(&report)
        }
        Commands::Move { identifier, new_type, prior_hash } => {
            let report = ws.move_note(&identifier, &new_type, &prior_hash)?;
            json::mutation_report_to_json(&report)
        }
        Commands::Delete { identifier, prior_hash, confirm } => {
            let outcome = ws.delete_note(&identifier, &prior_hash, confirm)?;
            json::delete_outcome_to_json(&outcome)
        }
        Commands::Search { query, note_type, limit, regex } => {
            let results = ws.search_notes(&query, note_type.as_deref(), limit, regex)?;
            json::search_results_to_json(&results)
        }
        Commands::SearchAdvanced {
            note_type,
            filters,
            updated_within,
            updated_before,
            created_within,
            created_before,
            content_contains,
            sort,
            limit,
            offset,
        } => {
            let params = AdvancedSearchParams {
                note_type,
                metadata_filters: filters
                    .iter()
                    .map(|f| parse_metadata_filter(f))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| FlintError::invalid("--filter", e))?,
                updated_within,
                updated_before,
                created_within,
                created_before,
                content_contains,
                sort: sort
                    .iter()
                    .map(|s| parse_sort_spec(s))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| FlintError::invalid("--sort", e))?,
                limit,
                offset,
            };
            let response = ws.search_notes_advanced(&params)?;
            json::advanced_response_to_json(&response)
        }
        Commands::SearchSql { query, params, limit, timeout_ms } => {
            let bound: Vec<_> = params.iter().map(|p| json::parse_sql_param(p)).collect();
            let request = SqlSearchParams { query: &query, params: bound, limit, timeout_ms };
            let outcome = ws.search_notes_sql(request)?;
            json::sql_outcome_to_json(&outcome)
        }
        Commands::Tags { tags, all } => {
            let results = ws.search_by_tags(&tags, all)?;
            json::search_results_to_json(&results)
        }
        Commands::Similar { identifier, k } => {
            let results = ws.similar_notes(&identifier, k)?;
            json::search_results_to_json(&results)
        }
        Commands::Link { from, to, label } => {
            let note = ws.link_notes(&from, &to, label.as_deref())?;
            json::note_to_json(&note)
        }
        Commands::Links { identifier } => {
            let links = ws.get_note_links(&identifier)?;
            json::note_links_to_json(&links)
        }
        Commands::BrokenLinks => {
            let groups = ws.find_broken_links()?;
            json::broken_links_to_json(&groups)
        }
        Commands::CreateType { name, description } => {
            let info = ws.create_note_type(&name, description.as_deref())?;
            json::note_type_info_to_json(&info)
        }
        Commands::UpdateType { name, description } => {
            let info = ws.update_note_type(&name, &description)?;
            json::note_type_info_to_json(&info)
        }
        Commands::TypeInfo { name } => {
            let info = ws.get_note_type_info(&name)?;
            json::note_type_info_to_json(&info)
        }
        Commands::ListTypes => {
            let infos = ws.list_note_types()?;
            json::note_type_infos_to_json(&infos)
        }
        Commands::Rebuild => {
            let count = ws.rebuild()?;
            serde_json::json!({ "notes_indexed": count })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_metadata(raw: Option<String>) -> Result<MetadataMap> {
    match raw {
        Some(raw) => json::parse_metadata_json(&raw).map_err(|e| FlintError::invalid("metadata", e)),
        None => Ok(MetadataMap::new()),
    }
}

/// `key=value` (equality) or `key[op]=value`.
fn parse_metadata_filter(raw: &str) -> std::result::Result<MetadataFilter, String> {
    let (key_part, value) = raw.split_once('=').ok_or_else(|| format!("{raw:?} is not key=value or key[op]=value"))?;
    let (key, operator) = if let Some(bracket) = key_part.find('[') {
        if !key_part.ends_with(']') {
            return Err(format!("{key_part:?} is missing a closing ']'"));
        }
        let key = &key_part[..bracket];
        let op = &key_part[bracket + 1..key_part.len() - 1];
        (key, parse_filter_op(op)?)
    } else {
        (key_part, FilterOp::Eq)
    };
    Ok(MetadataFilter { key: key.to_string(), value: value.to_string(), operator })
}

fn parse_filter_op(raw: &str) -> std::result::Result<FilterOp, String> {
    match raw {
        "eq" => Ok(FilterOp::Eq),
        "neq" => Ok(FilterOp::Neq),
        "lt" => Ok(FilterOp::Lt),
        "lte" => Ok(FilterOp::Lte),
        "gt" => Ok(FilterOp::Gt),
        "gte" => Ok(FilterOp::Gte),
        "like" => Ok(FilterOp::Like),
        "in" => Ok(FilterOp::In),
        other => Err(format!("unknown filter operator {other:?}")),
    }
}

/// `field:order`, e.g. `updated:desc`. `order` defaults to `asc`.
fn parse_sort_spec(raw: &str) -> std::result::Result<SortSpec, String> {
    let (field, order) = match raw.split_once(':') {
        Some((field, order)) => (field, order),
        None => (raw, "asc"),
    };
    let field = match field {
        "title" => SortField::Title,
        "type" => SortField::Type,
        "created" => SortField::Created,
        "updated" => SortField::Updated,
        "size" => SortField::Size,
        other => return Err(format!("unknown sort field {other:?}")),
    };
    let order = match order {
        "asc" => SortOrder::Asc,
        "desc" => SortOrder::Desc,
        other => return Err(format!("unknown sort order {other:?}")),
    };
    Ok(SortSpec { field, order })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_flag_is_recognized_anywhere_in_argv() {
        let parsed = extract_global_flags(&["search".into(), "--help".into()]).unwrap();
        assert!(parsed.help);
        assert_eq!(parsed.rest, vec!["search".to_string()]);
    }

    #[test]
    fn missing_workspace_value_mentions_path_argument() {
        let err = extract_global_flags(&["--workspace".into()]).unwrap_err();
        assert!(err.contains("requires a path argument"), "{err}");
    }

    #[test]
    fn workspace_path_alias_is_equivalent() {
        let parsed = extract_global_flags(&["--workspace-path".into(), "/tmp/x".into()]).unwrap();
        assert_eq!(parsed.workspace, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn filter_with_operator_parses() {
        let filter = parse_metadata_filter("views[gt]=10").unwrap();
        assert_eq!(filter.key, "views");
        assert_eq!(filter.operator, FilterOp::Gt);
        assert_eq!(filter.value, "10");
    }

    #[test]
    fn filter_without_operator_defaults_to_eq() {
        let filter = parse_metadata_filter("status=draft").unwrap();
        assert_eq!(filter.operator, FilterOp::Eq);
    }

    #[test]
    fn sort_spec_defaults_order_to_asc() {
        let spec = parse_sort_spec("title").unwrap();
        assert_eq!(spec.order, SortOrder::Asc);
    }
}
