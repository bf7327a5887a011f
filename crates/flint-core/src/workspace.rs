//! Workspace coordinator (C10): the single façade a caller (the CLI, or
//! an embedding tool) talks to. Owns the config, the index database, and
//! the process-wide writer lock, and wires the note store, indexer, link
//! synchronizer and search engine together behind the tool-level
//! contract named in spec §6. Grounded on the teacher's `Workspace`/`App`
//! struct (single-entry-point over store+db+config), reshaped around a
//! `std::sync::RwLock<()>` for this system's single-writer,
//! concurrent-reader model (spec §5) instead of the teacher's
//! single-connection serialization.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::config::WorkspaceConfig;
use crate::db::{self, Database};
use crate::error::{FlintError, Result};
use crate::indexer;
use crate::metadata::MetadataMap;
use crate::note::Note;
use crate::note_type::{self, NoteTypeInfo};
use crate::search::{self, AdvancedSearchParams, AdvancedSearchResponse, SearchResult, SqlSearchOutcome, SqlSearchParams};
use crate::store::{self, BatchItemResult, BatchUpdateRequest, UpdatePatch};
use crate::sync::{self, LifecycleEvent, SyncOutcome};

const FORCE_REBUILD_ENV_VAR: &str = "FORCE_INDEX_REBUILD";

/// The full picture of a note's outgoing/incoming link state, as
/// returned by `get_note_links`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteLinks {
    pub outgoing_internal: Vec<db::links::InternalLinkRow>,
    pub outgoing_external: Vec<db::links::ExternalLinkRow>,
    pub incoming_internal: Vec<db::links::InternalLinkRow>,
}

/// Report returned by `rename_note`/`move_note`, surfacing the link-graph
/// side effects alongside the updated note (spec §4.9, §8 scenario S4).
#[derive(Debug, Clone)]
pub struct MutationReport {
    pub note: Note,
    pub sync: SyncOutcome,
}

pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
    db: Database,
    lock: RwLock<()>,
}

impl Workspace {
    /// Open (or initialize) a workspace at `root` (spec §4.10): load
    /// config, open/create the index database, and rebuild the index
    /// when it was just created or `FORCE_INDEX_REBUILD` is set.
    #[tracing::instrument(skip_all, fields(root = %root.display()))]
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(FlintError::not_found("workspace", root.display()));
        }
        let config_path = db_config_path(root);
        let config = WorkspaceConfig::load(&config_path)?;

        let db_path = root.join(&config.search.index_path);
        let (db, needs_rebuild) = Database::open(&db_path)?;

        let force_rebuild = std::env::var(FORCE_REBUILD_ENV_VAR).is_ok();
        if needs_rebuild || force_rebuild || config.search.rebuild_on_startup {
            let mut progress = |done: usize, total: usize| {
                tracing::info!(done, total, "rebuilding index");
            };
            indexer::rebuild(&db, root, Some(&mut progress))?;
        }

        Ok(Workspace {
            root: root.to_path_buf(),
            config,
            db,
            lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    fn known_universe(&self) -> Result<(HashSet<String>, HashMap<String, String>)> {
        let ids: HashSet<String> = db::notes::all_ids(self.db.reader())?.into_iter().collect();
        let titles: HashMap<String, String> = db::notes::all_titles(self.db.reader())?;
        Ok((ids, titles))
    }

    // -- mutating operations (write lock) --------------------------------

    /// `create_note` (spec §6 tool surface).
    #[tracing::instrument(skip(self, body, metadata))]
    pub fn create_note(&self, note_type: &str, title: &str, body: &str, metadata: MetadataMap) -> Result<Note> {
        let _guard = self.lock.write().unwrap();
        let (note, _event) = store::create(&self.root, note_type, title, body, metadata)?;
        let (known_ids, title_to_id) = self.known_universe()?;
        indexer::upsert(self.db.writer(), &note, &known_ids, &title_to_id)?;
        Ok(note)
    }

    /// `update_note` single-item form (spec §6). `prior_hash` enforces
    /// optimistic concurrency; protected fields are rejected untouched.
    #[tracing::instrument(skip(self, patch))]
    pub fn update_note(&self, identifier: &str, patch: UpdatePatch, prior_hash: &str) -> Result<Note> {
        let _guard = self.lock.write().unwrap();
        let (note, _event) = store::update(&self.root, identifier, patch, prior_hash)?;
        let (known_ids, title_to_id) = self.known_universe()?;
        indexer::upsert(self.db.writer(), &note, &known_ids, &title_to_id)?;
        Ok(note)
    }

    /// `update_note` batched form (spec §6, §7: "batched operations never
    /// abort siblings on one item's failure").
    #[tracing::instrument(skip(self, requests))]
    pub fn update_notes_batch(&self, requests: Vec<BatchUpdateRequest>) -> Vec<BatchItemResult> {
        let _guard = self.lock.write().unwrap();
        let outcomes = store::update_batch(&self.root, requests);
        let mut results = Vec::with_capacity(outcomes.len());
        for (item, event) in outcomes {
            if event.is_some() {
                if let Ok(note) = &item.result {
                    if let Ok((known_ids, title_to_id)) = self.known_universe() {
                        let _ = indexer::upsert(self.db.writer(), note, &known_ids, &title_to_id);
                    }
                }
            }
            results.push(item);
        }
        results
    }

    /// `rename_note` (spec §6, §4.4, §4.9): title only; resolves any
    /// other notes' broken incoming links that were waiting on the new
    /// title (spec §8 scenario S4).
    #[tracing::instrument(skip(self))]
    pub fn rename_note(&self, identifier: &str, new_title: &str, prior_hash: &str) -> Result<MutationReport> {
        let _guard = self.lock.write().unwrap();
        let (note, event) = store::rename(&self.root, identifier, new_title, prior_hash, self.config.rewrite_h1_on_rename)?;
        let (known_ids, title_to_id) = self.known_universe()?;
        indexer::upsert(self.db.writer(), &note, &known_ids, &title_to_id)?;
        let outcome = sync::handle(self.db.writer(), &event, Some(&note))?;
        Ok(MutationReport { note, sync: outcome })
    }

    /// `move_note` (spec §6, §4.4, §4.9): type only; the note's id
    /// changes, so its row is re-keyed and every other note's incoming
    /// link pointing at the old id is rewritten.
    #[tracing::instrument(skip(self))]
    pub fn move_note(&self, identifier: &str, new_type: &str, prior_hash: &str) -> Result<MutationReport> {
        let _guard = self.lock.write().unwrap();
        let (note, event) = store::move_note(&self.root, identifier, new_type, prior_hash)?;
        let old_id = match &event {
            LifecycleEvent::Moved { old_id, .. } => old_id.clone(),
            _ => unreachable!("store::move_note always returns a Moved event"),
        };
        db::notes::delete(self.db.writer(), &old_id)?;
        db::fts::delete(self.db.writer(), &old_id)?;
        let (known_ids, title_to_id) = self.known_universe()?;
        indexer::upsert(self.db.writer(), &note, &known_ids, &title_to_id)?;
        let outcome = sync::handle(self.db.writer(), &event, None)?;
        Ok(MutationReport { note, sync: outcome })
    }

    /// `delete_note` (spec §6, §4.4, §4.9): requires `confirm=true`;
    /// breaks (doesn't cascade-remove) other notes' incoming links.
    #[tracing::instrument(skip(self))]
    pub fn delete_note(&self, identifier: &str, prior_hash: &str, confirm: bool) -> Result<SyncOutcome> {
        let _guard = self.lock.write().unwrap();
        let backup_dir = self
            .config
            .deletion
            .create_backups
            .then(|| self.root.join(&self.config.deletion.backup_path));
        let event = store::delete(&self.root, identifier, prior_hash, confirm, backup_dir.as_deref())?;
        sync::handle(self.db.writer(), &event, None)
    }

    /// `link_notes` (spec §6): append an explicit wiki-style link to
    /// `from`'s body and re-sync its outgoing links. Open design decision
    /// (recorded in `DESIGN.md`): spec.md names this tool but doesn't
    /// specify its shape, so it's implemented as the simplest operation
    /// consistent with the link syntax C3 already parses.
    #[tracing::instrument(skip(self))]
    pub fn link_notes(&self, from: &str, to: &str, label: Option<&str>) -> Result<Note> {
        let _guard = self.lock.write().unwrap();
        let current = store::get(&self.root, from)?;
        let link_line = match label {
            Some(label) => format!("\n[[{to}|{label}]]\n"),
            None => format!("\n[[{to}]]\n"),
        };
        let patch = UpdatePatch {
            body: Some(format!("{}{link_line}", current.body)),
            metadata: None,
        };
        let (note, _event) = store::update(&self.root, from, patch, &current.content_hash)?;
        let (known_ids, title_to_id) = self.known_universe()?;
        indexer::upsert(self.db.writer(), &note, &known_ids, &title_to_id)?;
        Ok(note)
    }

    /// `create_note_type` (spec §6).
    #[tracing::instrument(skip(self))]
    pub fn create_note_type(&self, name: &str, description: Option<&str>) -> Result<NoteTypeInfo> {
        let _guard = self.lock.write().unwrap();
        note_type::create(&self.root, &self.config, name, description)
    }

    /// `update_note_type` (spec §6): only the description is mutable
    /// post-creation (the directory name/layout is fixed by C2).
    #[tracing::instrument(skip(self))]
    pub fn update_note_type(&self, name: &str, description: &str) -> Result<NoteTypeInfo> {
        let _guard = self.lock.write().unwrap();
        note_type::update_description(&self.root, name, description)?;
        note_type::info(&self.root, name)
    }

    /// Force a full rebuild of the index (spec §4.10).
    #[tracing::instrument(skip(self))]
    pub fn rebuild(&self) -> Result<usize> {
        let _guard = self.lock.write().unwrap();
        let mut progress = |done: usize, total: usize| {
            tracing::info!(done, total, "rebuilding index");
        };
        indexer::rebuild(&self.db, &self.root, Some(&mut progress))
    }

    // -- read-only operations (read lock) --------------------------------

    /// `get_note` (spec §6).
    pub fn get_note(&self, identifier: &str) -> Result<Note> {
        let _guard = self.lock.read().unwrap();
        store::get(&self.root, identifier)
    }

    /// `get_note_type_info` (spec §6).
    pub fn get_note_type_info(&self, name: &str) -> Result<NoteTypeInfo> {
        let _guard = self.lock.read().unwrap();
        note_type::info(&self.root, name)
    }

    /// `list_note_types` (spec §6).
    pub fn list_note_types(&self) -> Result<Vec<NoteTypeInfo>> {
        let _guard = self.lock.read().unwrap();
        note_type::list(&self.root)
    }

    /// `get_note_links` (spec §6): outgoing internal/external plus
    /// incoming internal (backlinks).
    pub fn get_note_links(&self, identifier: &str) -> Result<NoteLinks> {
        let _guard = self.lock.read().unwrap();
        let (note_type, slug) = crate::id::split_id(identifier)?;
        let id = crate::id::note_id(note_type, slug);
        Ok(NoteLinks {
            outgoing_internal: db::links::outgoing_internal(self.db.reader(), &id)?,
            outgoing_external: db::links::outgoing_external(self.db.reader(), &id)?,
            incoming_internal: db::links::incoming_internal(self.db.reader(), &id)?,
        })
    }

    /// `find_broken_links` (spec §6, §4.9).
    pub fn find_broken_links(&self) -> Result<Vec<db::links::BrokenLinkGroup>> {
        let _guard = self.lock.read().unwrap();
        sync::broken_links(self.db.reader())
    }

    /// `search_notes` (spec §6, §4.8.1).
    pub fn search_notes(&self, query: &str, type_filter: Option<&str>, limit: i64, use_regex: bool) -> Result<Vec<SearchResult>> {
        let _guard = self.lock.read().unwrap();
        search::simple_search(self.db.reader(), query, type_filter, limit, use_regex)
    }

    /// `search_notes_advanced` (spec §6, §4.8.2).
    pub fn search_notes_advanced(&self, params: &AdvancedSearchParams) -> Result<AdvancedSearchResponse> {
        let _guard = self.lock.read().unwrap();
        search::advanced_search(self.db.reader(), params)
    }

    /// `search_notes_sql` (spec §6, §4.8.3).
    pub fn search_notes_sql(&self, request: SqlSearchParams) -> Result<SqlSearchOutcome> {
        let _guard = self.lock.read().unwrap();
        search::sql_search(self.db.reader(), request)
    }

    /// Tag search (spec §4.8.4), exposed for completeness beyond the
    /// named tool surface.
    pub fn search_by_tags(&self, tags: &[String], require_all: bool) -> Result<Vec<SearchResult>> {
        let _guard = self.lock.read().unwrap();
        search::by_tags(self.db.reader(), tags, require_all)
    }

    /// Similar-notes search (spec §4.8.4).
    pub fn similar_notes(&self, id: &str, k: usize) -> Result<Vec<SearchResult>> {
        let _guard = self.lock.read().unwrap();
        search::similar(self.db.reader(), id, k)
    }
}

fn db_config_path(root: &Path) -> PathBuf {
    crate::id::metadata_dir(root).join(crate::config::CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("general")).unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (dir, ws)
    }

    #[test]
    fn create_then_search_finds_note() {
        let (_dir, ws) = init_workspace();
        ws.create_note("general", "Programming Guide", "Learning Rust programming", MetadataMap::new())
            .unwrap();
        let results = ws.search_notes("prog", None, 10, false).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Programming Guide");
    }

    #[test]
    fn rename_resolves_broken_incoming_links() {
        let (_dir, ws) = init_workspace();
        ws.create_note("general", "Source", "See [[Future Title]].", MetadataMap::new()).unwrap();
        let broken = ws.find_broken_links().unwrap();
        assert_eq!(broken.len(), 1);

        let draft = ws.create_note("projects", "Draft", "Body.", MetadataMap::new()).unwrap();
        let report = ws.rename_note(&draft.id, "Future Title", &draft.content_hash).unwrap();
        assert_eq!(report.sync.resolved_incoming, 1);
        assert!(ws.find_broken_links().unwrap().is_empty());

        let links = ws.get_note_links("general/source").unwrap();
        assert_eq!(links.outgoing_internal[0].target_id.as_deref(), Some("projects/draft"));
    }

    #[test]
    fn move_note_rewrites_incoming_links_and_requeries_by_new_id() {
        let (_dir, ws) = init_workspace();
        let target = ws.create_note("general", "Target", "Body.", MetadataMap::new()).unwrap();
        ws.create_note("general", "Source", "See [[general/target]].", MetadataMap::new()).unwrap();

        let report = ws.move_note(&target.id, "projects", &target.content_hash).unwrap();
        assert_eq!(report.note.id, "projects/target");
        assert_eq!(report.sync.rewritten_incoming, 1);

        let links = ws.get_note_links("general/source").unwrap();
        assert_eq!(links.outgoing_internal[0].target_id.as_deref(), Some("projects/target"));
    }

    #[test]
    fn move_note_leaves_no_orphaned_fts_row_under_the_old_id() {
        let (_dir, ws) = init_workspace();
        let target = ws.create_note("general", "Target", "Original body.", MetadataMap::new()).unwrap();
        ws.move_note(&target.id, "projects", &target.content_hash).unwrap();

        // Recreate a note at the vacated id. If the old id's FTS row
        // survived the move, a search matching both rows would return
        // this one note twice.
        ws.create_note("general", "Target", "Original body.", MetadataMap::new()).unwrap();

        let results = ws.search_notes("Original", None, 10, false).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn delete_note_breaks_incoming_links() {
        let (_dir, ws) = init_workspace();
        let target = ws.create_note("general", "Target", "Body.", MetadataMap::new()).unwrap();
        ws.create_note("general", "Source", "See [[general/target]].", MetadataMap::new()).unwrap();

        ws.delete_note(&target.id, &target.content_hash, true).unwrap();
        let broken = ws.find_broken_links().unwrap();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].target_title, "Target");
    }

    #[test]
    fn link_notes_appends_wiki_link_and_indexes_it() {
        let (_dir, ws) = init_workspace();
        let source = ws.create_note("general", "Source", "Intro.", MetadataMap::new()).unwrap();
        ws.create_note("general", "Target", "Body.", MetadataMap::new()).unwrap();

        let updated = ws.link_notes(&source.id, "general/target", None).unwrap();
        assert!(updated.body.contains("[[general/target]]"));

        let links = ws.get_note_links(&source.id).unwrap();
        assert_eq!(links.outgoing_internal[0].target_id.as_deref(), Some("general/target"));
    }

    #[test]
    fn update_note_rejects_stale_hash_and_indexer_stays_consistent() {
        let (_dir, ws) = init_workspace();
        let note = ws.create_note("general", "Note", "Body.", MetadataMap::new()).unwrap();
        let err = ws
            .update_note(&note.id, UpdatePatch { body: Some("x".into()), metadata: None }, "stale")
            .unwrap_err();
        assert!(matches!(err, FlintError::ConflictStale { .. }));

        let fetched = ws.get_note(&note.id).unwrap();
        assert_eq!(fetched.body, "Body.");
    }

    #[test]
    fn force_index_rebuild_env_var_triggers_rebuild_on_open() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("general")).unwrap();
        std::fs::write(
            dir.path().join("general").join("manual.md"),
            "---\ntitle: Manual\n---\nWritten directly to disk.\n",
        )
        .unwrap();

        // SAFETY: test-only override of a process-wide env var, removed
        // at the end of this test.
        unsafe { std::env::set_var(FORCE_REBUILD_ENV_VAR, "1") };
        let ws = Workspace::open(dir.path()).unwrap();
        unsafe { std::env::remove_var(FORCE_REBUILD_ENV_VAR) };

        let note = ws.get_note("general/manual").unwrap();
        assert_eq!(note.title, "Manual");
        let results = ws.search_notes("Written", None, 10, false).unwrap();
        assert_eq!(results.len(), 1);
    }
}
