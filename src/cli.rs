//! Subcommand parsing. The top-level `--workspace`/`--workspace-path`
//! and `--help`/`-h` flags are hand-parsed in `main.rs` (spec §6 pins
//! their exact exit/message behavior); everything after that is a
//! regular `clap` derive, mirroring the teacher's `cli.rs` shape for the
//! parts the spec doesn't pin an exact error string for.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "flint-note", no_binary_name = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// create_note
    Create {
        note_type: String,
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// JSON object of custom metadata fields
        #[arg(long)]
        metadata: Option<String>,
    },

    /// get_note
    Get { identifier: String },

    /// update_note (single item)
    Update {
        identifier: String,
        #[arg(long)]
        body: Option<String>,
        /// JSON object of custom metadata fields
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long)]
        prior_hash: String,
    },

    /// rename_note
    Rename {
        identifier: String,
        new_title: String,
        #[arg(long)]
        prior_hash: String,
    },

    /// move_note
    Move {
        identifier: String,
        new_type: String,
        #[arg(long)]
        prior_hash: String,
    },

    /// delete_note
    Delete {
        identifier: String,
        #[arg(long)]
        prior_hash: String,
        /// Must be set; mirrors `deletion.require_confirmation`.
        #[arg(long)]
        confirm: bool,
    },

    /// search_notes (§4.8.1)
    Search {
        query: String,
        #[arg(long = "type")]
        note_type: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long)]
        regex: bool,
    },

    /// search_notes_advanced (§4.8.2)
    SearchAdvanced {
        #[arg(long = "type")]
        note_type: Option<String>,
        /// `key=value` (equality) or `key[op]=value` for
        /// eq/neq/lt/lte/gt/gte/like/in; repeatable.
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        updated_within: Option<String>,
        #[arg(long)]
        updated_before: Option<String>,
        #[arg(long)]
        created_within: Option<String>,
        #[arg(long)]
        created_before: Option<String>,
        #[arg(long)]
        content_contains: Option<String>,
        /// `field:order`, e.g. `updated:desc`; repeatable.
        #[arg(long = "sort")]
        sort: Vec<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },

    /// search_notes_sql (§4.8.3)
    SearchSql {
        query: String,
        /// Bound parameter, JSON-decoded if possible; repeatable, in order.
        #[arg(long = "param")]
        params: Vec<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Tag search (§4.8.4)
    Tags {
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Require every tag (intersection) instead of any (union).
        #[arg(long)]
        all: bool,
    },

    /// Similar-notes search (§4.8.4)
    Similar {
        identifier: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },

    /// link_notes
    Link {
        from: String,
        to: String,
        #[arg(long)]
        label: Option<String>,
    },

    /// get_note_links
    Links { identifier: String },

    /// find_broken_links
    BrokenLinks,

    /// create_note_type
    CreateType {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// update_note_type
    UpdateType { name: String, description: String },

    /// get_note_type_info
    TypeInfo { name: String },

    /// list_note_types
    ListTypes,

    /// Force a full index rebuild.
    Rebuild,
}
