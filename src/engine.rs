//! Drives a search/replace session: traversal, per-node matching, anchored
//! object interception, match recording, progress and cancellation.
//!
//! A session is single-threaded and cooperative. Starting a new operation
//! resets all counters; cancellation is polled at node boundaries only, so a
//! node's own search/replace step always runs to completion once begun.

use crate::anchored::{line_containing, AnchorHit, AnchorKind};
use crate::error::SearchError;
use crate::offsets::{self, PLACEHOLDER_CHAR};
use crate::pattern::{CompiledPattern, MatchMode, SearchDirection, SearchOptions};
use crate::replace;
use crate::traverse::{SearchScope, TraversalCursor};
use crate::tree::{NodeId, NodeTree};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use unicode_width::UnicodeWidthChar;

const PREVIEW_MAX_COLUMNS: usize = 80;

/// What kind of find the session last ran, for `continue_search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentFind {
    #[default]
    None,
    SingleNode,
    MultipleNodes,
}

/// One reported hit.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub node_id: NodeId,
    /// Display name, with tags appended when the node carries any.
    pub node_name: String,
    /// Ancestor names joined root-to-leaf.
    pub node_path: String,
    /// Codepoint span in the node buffer; for an anchored-object hit this is
    /// the single placeholder codepoint.
    pub start: usize,
    pub end: usize,
    pub line_number: usize,
    pub line_content: String,
    pub anchor_kind: AnchorKind,
    pub anchor_cell_index: usize,
    pub anchor_start: usize,
    pub anchor_end: usize,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    NoMatches,
    SingleFound(MatchRecord),
    AllFound(Vec<MatchRecord>),
    Error(SearchError),
}

/// Mutable state of the active session.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    /// Codepoint span of the latest hit (or of its replacement).
    pub latest_match_offsets: Option<(usize, usize)>,
    pub current_find: CurrentFind,
    pub replace_active: bool,
    pub replace_subsequent: bool,
    pub matches_count: usize,
    pub processed_nodes: usize,
    pub counted_nodes: usize,
    /// False until the resume-from-selection node has been handled.
    pub first_useful_node: bool,
    pub all_matches_first_in_node: bool,
}

/// Shared cancellation flag; cloned into progress callbacks to request a
/// cooperative stop at the next node boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

type ProgressFn = dyn FnMut(usize, usize, usize);

/// One logical find/replace session. Only one operation runs at a time;
/// every `start_*` call resets counters and recorded matches.
pub struct SearchSession {
    pub options: SearchOptions,
    pub state: SearchState,
    scope: Option<SearchScope>,
    records: Vec<MatchRecord>,
    last_record: Option<MatchRecord>,
    stop: StopHandle,
    progress: Option<Box<ProgressFn>>,
    /// Node the session is anchored at: the selected node, later the node of
    /// the last reported hit.
    current_node: Option<NodeId>,
    /// Selection bounds on the current node, in user-visible characters
    /// (placeholder slots not counted).
    selection: Option<(usize, usize)>,
    /// Cursor mark on the current node, in user-visible characters.
    cursor_mark: usize,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchSession {
    pub fn new() -> Self {
        Self {
            options: SearchOptions::new(""),
            state: SearchState::default(),
            scope: None,
            records: Vec::new(),
            last_record: None,
            stop: StopHandle::default(),
            progress: None,
            current_node: None,
            selection: None,
            cursor_mark: 0,
        }
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: FnMut(usize, usize, usize) + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    /// Where the session resumes from: the selected node, an optional
    /// selection span on it and the cursor mark, both in user-visible
    /// characters (placeholder slots excluded).
    pub fn set_anchor(&mut self, node: NodeId, selection: Option<(usize, usize)>, cursor_mark: usize) {
        self.current_node = Some(node);
        self.selection = selection;
        self.cursor_mark = cursor_mark;
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Matches recorded by the last all-matches operation.
    pub fn last_matches(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn start_search(
        &mut self,
        tree: &mut NodeTree,
        options: SearchOptions,
        scope: SearchScope,
    ) -> Outcome {
        self.begin(options, scope, false);
        self.run(tree, self.options.direction)
    }

    pub fn start_replace(
        &mut self,
        tree: &mut NodeTree,
        options: SearchOptions,
        scope: SearchScope,
    ) -> Outcome {
        self.begin(options, scope, true);
        self.run(tree, self.options.direction)
    }

    /// Repeat the last query; `reverse` flips the direction for this one
    /// invocation and turns replacing off.
    pub fn continue_search(&mut self, tree: &mut NodeTree, reverse: bool) -> Outcome {
        if self.scope.is_none() || self.state.current_find == CurrentFind::None {
            return Outcome::Error(SearchError::NoPreviousSearch);
        }
        let direction = if reverse {
            self.state.replace_active = false;
            self.options.direction.reversed()
        } else {
            self.options.direction
        };
        self.run(tree, direction)
    }

    /// Repeat the last query as a chained replace: the next hit is searched
    /// from the prior replacement boundary, never inside the inserted text.
    pub fn replace_again(&mut self, tree: &mut NodeTree) -> Outcome {
        if self.scope.is_none() || self.state.current_find == CurrentFind::None {
            return Outcome::Error(SearchError::NoPreviousSearch);
        }
        self.state.replace_active = true;
        self.state.replace_subsequent = true;
        let outcome = self.run(tree, self.options.direction);
        self.state.replace_active = false;
        self.state.replace_subsequent = false;
        outcome
    }

    fn begin(&mut self, options: SearchOptions, scope: SearchScope, replace: bool) {
        self.options = options;
        self.scope = Some(scope);
        self.records.clear();
        self.last_record = None;
        self.state = SearchState {
            current_find: match scope {
                SearchScope::SingleNode(_) => CurrentFind::SingleNode,
                _ => CurrentFind::MultipleNodes,
            },
            replace_active: replace,
            ..SearchState::default()
        };
    }

    fn run(&mut self, tree: &mut NodeTree, direction: SearchDirection) -> Outcome {
        let matcher = match CompiledPattern::compile(&self.options) {
            Ok(matcher) => matcher,
            Err(err) => return Outcome::Error(err),
        };
        let Some(scope) = self.scope else {
            return Outcome::Error(SearchError::NoPreviousSearch);
        };
        let forward = direction.is_forward();
        let all_matches = self.options.match_mode == MatchMode::AllMatches;
        let from_selection = self.options.match_mode == MatchMode::FirstFromSelection;

        self.stop.reset();
        self.state.matches_count = 0;
        self.state.processed_nodes = 0;
        if all_matches {
            self.records.clear();
        }

        let (cursor_scope, resume_node, counted) = match scope {
            SearchScope::SingleNode(id) => (scope, Some(id), 1),
            SearchScope::SelectedSubtree(id) => (scope, Some(id), tree.count_subtree(id)),
            SearchScope::WholeTree { start } => {
                let start = start.or(if from_selection { self.current_node } else { None });
                (SearchScope::WholeTree { start }, start, tree.count_all())
            }
        };
        self.state.counted_nodes = counted;
        // every node except the resume node is searched from its boundary
        self.state.first_useful_node = match scope {
            SearchScope::WholeTree { .. } if !from_selection => true,
            _ => false,
        };

        let started = Instant::now();
        let mut cursor =
            TraversalCursor::new(tree, cursor_scope, direction, self.options.override_exclusions);
        let mut abort: Option<SearchError> = None;
        let mut single_hit: Option<MatchRecord> = None;

        'nodes: while let Some(visit) = cursor.next(tree) {
            if self.stop.is_stopped() {
                break;
            }
            tree.resolve(visit.node);
            self.state.all_matches_first_in_node = true;
            let first_node = self.consume_first_useful(visit.node, resume_node);

            if self.options.node_content {
                if let Err(err) = tree.content(visit.node) {
                    log::warn!("aborting traversal: {err}");
                    abort = Some(err);
                    break;
                }
            }

            let searchable = visit.search_own && self.within_time_filter(tree, visit.node);
            let mut found_in_content = false;
            if searchable && self.options.node_content {
                let mut last_offsets = None;
                loop {
                    let found = match self.find_in_node_content(
                        tree, visit.node, &matcher, forward, all_matches, first_node,
                    ) {
                        Ok(found) => found,
                        Err(err) => {
                            abort = Some(err);
                            break 'nodes;
                        }
                    };
                    let Some(batch) = found else { break };
                    // a hit that cannot advance the resume offset (zero-width
                    // match, refused replace) must not be counted twice
                    if self.state.latest_match_offsets == last_offsets {
                        break;
                    }
                    last_offsets = self.state.latest_match_offsets;
                    found_in_content = true;
                    self.state.matches_count += 1;
                    self.last_record = batch.first().cloned();
                    if !all_matches {
                        single_hit = self.last_record.clone();
                        break 'nodes;
                    }
                    self.records.extend(batch);
                }
            }

            if searchable && !found_in_content && self.options.node_name_and_tags {
                if self.find_in_name_and_tags(tree, visit.node, &matcher, all_matches) {
                    self.state.matches_count += 1;
                    if !all_matches {
                        single_hit = self.last_record.clone();
                        break 'nodes;
                    }
                }
            }

            self.state.processed_nodes += 1;
            self.report_progress();
            if self.stop.is_stopped() {
                break;
            }
        }

        if cursor.hit_exclusion() {
            log::debug!("exclusion flags suppressed part of the traversal");
        }
        log::debug!(
            "search for '{}' took {:?} ({} matches over {} nodes)",
            self.options.pattern,
            started.elapsed(),
            self.state.matches_count,
            self.state.processed_nodes
        );

        if let Some(err) = abort {
            return Outcome::Error(err);
        }
        if let Some(record) = single_hit {
            self.current_node = Some(record.node_id);
            return Outcome::SingleFound(record);
        }
        if self.state.matches_count == 0 {
            return Outcome::NoMatches;
        }
        Outcome::AllFound(self.records.clone())
    }

    /// Whether this visit is the one node that resumes from an inner offset.
    fn consume_first_useful(&mut self, node: NodeId, resume_node: Option<NodeId>) -> bool {
        if self.state.first_useful_node {
            return false;
        }
        match resume_node {
            None => {
                self.state.first_useful_node = true;
                true
            }
            Some(resume) if resume == node => {
                self.state.first_useful_node = true;
                true
            }
            Some(_) => false,
        }
    }

    fn within_time_filter(&self, tree: &NodeTree, node: NodeId) -> bool {
        let created = tree.created(node);
        if self.options.ts_created_after.on && created < self.options.ts_created_after.time {
            return false;
        }
        if self.options.ts_created_before.on && created > self.options.ts_created_before.time {
            return false;
        }
        let modified = tree.modified(node);
        if self.options.ts_modified_after.on && modified < self.options.ts_modified_after.time {
            return false;
        }
        if self.options.ts_modified_before.on && modified > self.options.ts_modified_before.time {
            return false;
        }
        true
    }

    /// One find step over the node's content. Returns the records for the
    /// hit (several when an anchored object batch superseded the text
    /// match), or None when the node is exhausted.
    fn find_in_node_content(
        &mut self,
        tree: &mut NodeTree,
        node: NodeId,
        matcher: &CompiledPattern,
        forward: bool,
        all_matches: bool,
        first_node: bool,
    ) -> Result<Option<Vec<MatchRecord>>, SearchError> {
        let from_selection = self.options.match_mode == MatchMode::FirstFromSelection;
        let buffer = tree.content(node)?;
        let buffer_cp = buffer.chars().count();

        let start_cp = if (from_selection && first_node)
            || (all_matches && !self.state.all_matches_first_in_node)
        {
            self.inner_start_offset(tree, node, &buffer, forward)
        } else {
            if all_matches {
                self.state.all_matches_first_in_node = false;
            }
            if forward { 0 } else { buffer_cp }
        };

        Ok(self.find_pattern(tree, node, &buffer, start_cp.min(buffer_cp), matcher, forward, all_matches))
    }

    /// Start offset for a resumed search within a node, in buffer
    /// codepoints: the latest hit in this session, else the caller-supplied
    /// selection, else the cursor mark. A fresh replace starts at the near
    /// edge so the already-selected occurrence is replaced first; a find or
    /// a chained replace starts at the far edge.
    fn inner_start_offset(
        &self,
        tree: &NodeTree,
        node: NodeId,
        buffer: &str,
        forward: bool,
    ) -> usize {
        let (min, max) = if let Some(span) = self.state.latest_match_offsets {
            span
        } else if self.current_node == Some(node) {
            match self.selection {
                Some((sel_min, sel_max)) => {
                    let min = sel_min + offsets::count_placeholders_before(buffer, sel_min);
                    let max = sel_max + offsets::count_placeholders_before(buffer, sel_max);
                    (min, max)
                }
                None => {
                    let mark =
                        self.cursor_mark + offsets::count_placeholders_before(buffer, self.cursor_mark);
                    (mark, mark)
                }
            }
        } else {
            (0, 0)
        };
        let replace_pending = self.state.replace_active && !tree.read_only(node);
        if !replace_pending || self.state.replace_subsequent {
            if forward { max } else { min }
        } else if forward {
            min
        } else {
            max
        }
    }

    fn find_pattern(
        &mut self,
        tree: &mut NodeTree,
        node: NodeId,
        buffer: &str,
        start_cp: usize,
        matcher: &CompiledPattern,
        forward: bool,
        all_matches: bool,
    ) -> Option<Vec<MatchRecord>> {
        let flat = offsets::flatten(buffer);
        let text = matcher.normalize(&flat).into_owned();
        let total_cp = text.chars().count();

        // plain-text candidate; placeholder slots are object-governed, so a
        // span touching one is stepped over and the scan retried
        let mut scan_cp = start_cp;
        let mut plain: Option<(usize, usize)> = None;
        loop {
            let scan_byte = offsets::codepoint_to_byte(&text, scan_cp);
            let found = if forward {
                matcher.first_match_at(&text, scan_byte)
            } else {
                matcher.last_match_in_prefix(&text, scan_byte)
            };
            let Some((start_byte, end_byte)) = found else { break };
            let cp_span = (
                offsets::byte_to_codepoint(&text, start_byte),
                offsets::byte_to_codepoint(&text, end_byte),
            );
            if span_covers_placeholder(&text, cp_span.0, cp_span.1) {
                if forward {
                    scan_cp = cp_span.0 + 1;
                    if scan_cp > total_cp {
                        break;
                    }
                } else {
                    if cp_span.1 == 0 {
                        break;
                    }
                    scan_cp = cp_span.1 - 1;
                }
                continue;
            }
            plain = Some(cp_span);
            break;
        }

        let hits =
            self.anchored_hits_between(tree, node, start_cp, plain.map(|p| p.0), forward, matcher, total_cp);

        if hits.is_empty() {
            let (m_start, m_end) = plain?;
            self.state.latest_match_offsets = Some((m_start, m_end));
            let mut record = self.content_record(tree, node, buffer, m_start, m_end);
            if self.state.replace_active {
                let replacement = self.options.replacement.clone();
                if let Some(new_end) =
                    replace::replace_in_content(tree, node, m_start, m_end, matcher, &replacement)
                {
                    self.state.latest_match_offsets = Some((m_start, new_end));
                    self.state.replace_subsequent = true;
                    record.end = new_end;
                }
            }
            Some(vec![record])
        } else {
            let mut records = Vec::new();
            for hit in &hits {
                self.state.latest_match_offsets = Some((hit.offset, hit.offset + 1));
                records.push(self.anchor_record(tree, node, buffer, hit));
                if !all_matches {
                    break;
                }
            }
            if self.state.replace_active && !tree.read_only(node) {
                let replacement = self.options.replacement.clone();
                let mut replaced = Vec::new();
                for hit in &hits {
                    if replaced.contains(&hit.offset) {
                        continue;
                    }
                    replaced.push(hit.offset);
                    replace::replace_in_object(tree, node, hit.offset, matcher, &replacement, forward);
                    if !all_matches {
                        break;
                    }
                }
            }
            Some(records)
        }
    }

    /// Anchored objects between the scan origin and the plain-text
    /// candidate (or the scanned end of the buffer), in traversal order.
    /// Scanning backward the window start steps one codepoint left of the
    /// origin; kept as-is from the reference behavior and pinned by the
    /// boundary tests.
    fn anchored_hits_between(
        &self,
        tree: &NodeTree,
        node: NodeId,
        start_cp: usize,
        plain_start: Option<usize>,
        forward: bool,
        matcher: &CompiledPattern,
        buffer_end: usize,
    ) -> Vec<AnchorHit> {
        let (lo, hi) = if forward {
            (start_cp, plain_start.unwrap_or(buffer_end))
        } else {
            if start_cp == 0 {
                return Vec::new();
            }
            (plain_start.unwrap_or(0), start_cp - 1)
        };
        if lo > hi {
            return Vec::new();
        }
        let mut slots = tree.anchored_in_range(node, lo, hi);
        if !forward {
            slots.reverse();
        }
        let mut hits = Vec::new();
        for slot in slots {
            hits.extend(slot.object.find_hits(slot.offset, matcher, forward));
        }
        hits
    }

    fn content_record(
        &self,
        tree: &NodeTree,
        node: NodeId,
        buffer: &str,
        start: usize,
        end: usize,
    ) -> MatchRecord {
        MatchRecord {
            node_id: node,
            node_name: tree.name_with_tags(node),
            node_path: tree.hierarchical_name(node),
            start,
            end,
            line_number: line_number_at(buffer, start),
            line_content: truncate_preview(&line_containing(buffer, end)),
            anchor_kind: AnchorKind::None,
            anchor_cell_index: 0,
            anchor_start: 0,
            anchor_end: 0,
        }
    }

    fn anchor_record(
        &self,
        tree: &NodeTree,
        node: NodeId,
        buffer: &str,
        hit: &AnchorHit,
    ) -> MatchRecord {
        MatchRecord {
            node_id: node,
            node_name: tree.name_with_tags(node),
            node_path: tree.hierarchical_name(node),
            start: hit.offset,
            end: hit.offset + 1,
            line_number: line_number_at(buffer, hit.offset),
            line_content: truncate_preview(&hit.line_content),
            anchor_kind: hit.kind,
            anchor_cell_index: hit.cell_index,
            anchor_start: hit.sub_start,
            anchor_end: hit.sub_end,
        }
    }

    /// Match against the node name, then the tags. At most one hit per node
    /// per pass; the hit reports the first content line as its preview.
    fn find_in_name_and_tags(
        &mut self,
        tree: &mut NodeTree,
        node: NodeId,
        matcher: &CompiledPattern,
        all_matches: bool,
    ) -> bool {
        let name = tree.name(node);
        let tags = tree.tags(node);
        if !matcher.is_match(&name) && !matcher.is_match(&tags) {
            return false;
        }
        let first_line = tree
            .content(node)
            .map(|buffer| truncate_preview(&line_containing(&buffer, 0)))
            .unwrap_or_default();
        let record = MatchRecord {
            node_id: node,
            node_name: tree.name_with_tags(node),
            node_path: tree.hierarchical_name(node),
            start: 0,
            end: 0,
            line_number: 1,
            line_content: first_line,
            anchor_kind: AnchorKind::None,
            anchor_cell_index: 0,
            anchor_start: 0,
            anchor_end: 0,
        };
        if self.state.replace_active {
            let replacement = self.options.replacement.clone();
            replace::replace_in_name_or_tags(tree, node, matcher, &replacement);
        }
        if all_matches {
            self.records.push(record.clone());
        }
        self.last_record = Some(record);
        true
    }

    fn report_progress(&mut self) {
        if let Some(callback) = self.progress.as_mut() {
            callback(
                self.state.processed_nodes,
                self.state.counted_nodes,
                self.state.matches_count,
            );
        }
    }
}

fn span_covers_placeholder(text: &str, start_cp: usize, end_cp: usize) -> bool {
    text.chars()
        .skip(start_cp)
        .take(end_cp.saturating_sub(start_cp))
        .any(|c| c == offsets::PLACEHOLDER_STAND_IN)
}

/// 1-based line number of the codepoint offset `cp` in `buffer`.
fn line_number_at(buffer: &str, cp: usize) -> usize {
    1 + buffer.chars().take(cp).filter(|&c| c == '\n').count()
}

/// Preview line with placeholder codepoints dropped, cut to a fixed display
/// width.
fn truncate_preview(line: &str) -> String {
    let mut width = 0usize;
    let mut out = String::new();
    for c in line.chars() {
        if c == PLACEHOLDER_CHAR {
            continue;
        }
        let char_width = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + char_width > PREVIEW_MAX_COLUMNS {
            out.push('…');
            break;
        }
        width += char_width;
        out.push(c);
    }
    out
}
