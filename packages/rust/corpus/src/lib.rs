//! Corpus construction: study material → flat list of citable text chunks.
//!
//! [`CorpusBuilder::build`] walks the recognized material sections in a fixed
//! order, strips the HTML of every item, resolves citation markers against the
//! footer reference list, and publishes the result as an immutable
//! [`CorpusSnapshot`]. Rebuilding swaps the whole snapshot at once.

mod html;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use energyqa_shared::{Chunk, Material, MaterialItem, MaterialSection, Reference, SECTION_KEYS};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One immutable build of the corpus.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    /// Build counter, increasing per builder.
    pub version: u64,
    /// When this snapshot was built.
    pub built_at: DateTime<Utc>,
    /// SHA-256 over chunk ids and texts; equal for identical material.
    pub fingerprint: String,
    /// Chunks in section order, then item order.
    pub chunks: Vec<Chunk>,
    /// Footer references keyed by citation id.
    pub ref_map: BTreeMap<u32, Reference>,
}

impl CorpusSnapshot {
    /// Build a standalone snapshot (version 0) without going through a builder.
    pub fn from_material(material: &Material) -> Self {
        let (chunks, ref_map) = build_chunks(material);
        Self::new(0, chunks, ref_map)
    }

    /// A snapshot with no chunks and no references.
    pub fn empty() -> Self {
        Self::new(0, Vec::new(), BTreeMap::new())
    }

    fn new(version: u64, chunks: Vec<Chunk>, ref_map: BTreeMap<u32, Reference>) -> Self {
        Self {
            version,
            built_at: Utc::now(),
            fingerprint: fingerprint(&chunks),
            chunks,
            ref_map,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk ids that occur more than once, in first-seen order.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut dupes: Vec<String> = Vec::new();
        for chunk in &self.chunks {
            let count = counts.entry(chunk.id.as_str()).or_insert(0);
            *count += 1;
            if *count == 2 {
                dupes.push(chunk.id.clone());
            }
        }
        dupes
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds corpus snapshots and keeps the latest one readable.
#[derive(Debug, Default)]
pub struct CorpusBuilder {
    latest: RwLock<Option<Arc<CorpusSnapshot>>>,
    builds: AtomicU64,
}

impl CorpusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh snapshot from `material` and make it the latest.
    ///
    /// Never fails: missing sections and unparseable HTML contribute nothing.
    #[instrument(skip_all, fields(sections = material.sections.len()))]
    pub fn build(&self, material: &Material) -> Arc<CorpusSnapshot> {
        let (chunks, ref_map) = build_chunks(material);
        let version = self.builds.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(CorpusSnapshot::new(version, chunks, ref_map));

        for id in snapshot.duplicate_ids() {
            warn!(%id, "duplicate chunk id; items share a title within a section");
        }

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());

        let short_fingerprint = &snapshot.fingerprint[..12];
        info!(
            version,
            chunks = snapshot.len(),
            references = snapshot.ref_map.len(),
            fingerprint = %short_fingerprint,
            "corpus built"
        );

        snapshot
    }

    /// The latest snapshot, if any build has happened.
    pub fn snapshot(&self) -> Option<Arc<CorpusSnapshot>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Chunks of the latest build (empty before the first build).
    pub fn chunks(&self) -> Vec<Chunk> {
        self.snapshot()
            .map(|s| s.chunks.clone())
            .unwrap_or_default()
    }

    /// Reference map of the latest build (empty before the first build).
    pub fn ref_map(&self) -> BTreeMap<u32, Reference> {
        self.snapshot()
            .map(|s| s.ref_map.clone())
            .unwrap_or_default()
    }

    pub fn is_built(&self) -> bool {
        self.snapshot().is_some()
    }
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// Convert material into chunks plus the footer reference map.
pub fn build_chunks(material: &Material) -> (Vec<Chunk>, BTreeMap<u32, Reference>) {
    let mut ref_map: BTreeMap<u32, Reference> = BTreeMap::new();
    for reference in &material.references {
        if ref_map.contains_key(&reference.id) {
            warn!(id = reference.id, "duplicate reference id, keeping the first entry");
            continue;
        }
        ref_map.insert(reference.id, reference.clone());
    }

    let mut chunks = Vec::new();
    for key in SECTION_KEYS {
        let Some(section) = material.section(key) else {
            debug!(section = key, "section absent");
            continue;
        };

        let section_name = if section.name.trim().is_empty() {
            key.to_string()
        } else {
            html::collapse_whitespace(&section.name)
        };

        for item in &section.items {
            chunks.push(build_chunk(key, &section_name, section, item, &ref_map));
        }
        debug!(section = key, items = section.items.len(), "section chunked");
    }

    (chunks, ref_map)
}

fn build_chunk(
    key: &str,
    section_name: &str,
    section: &MaterialSection,
    item: &MaterialItem,
    ref_map: &BTreeMap<u32, Reference>,
) -> Chunk {
    let title = html::strip_html(&item.title);
    let description = html::strip_html(&item.description);
    let detail = html::strip_html(&item.detail);
    let text = html::collapse_whitespace(&format!("{title} {description} {detail}"));

    let ref_ids = html::extract_citation_ids(&format!(
        "{} {} {}",
        item.title, item.description, item.detail
    ));

    let mut refs: Vec<Reference> = ref_ids
        .iter()
        .filter_map(|id| ref_map.get(id).cloned())
        .collect();
    for inline in &section.references {
        if !refs.iter().any(|r| r.text == inline.text) {
            refs.push(inline.clone());
        }
    }

    Chunk {
        id: format!("{key}-{}", html::slugify_title(&title)),
        section: key.to_string(),
        section_name: section_name.to_string(),
        title,
        text,
        ref_ids,
        refs,
    }
}

fn fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_material() -> Material {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/json/material.fixture.json");
        Material::from_path(&path).unwrap_or_else(|e| panic!("failed to load fixture: {e}"))
    }

    fn item(title: &str, description: &str, detail: &str) -> MaterialItem {
        MaterialItem {
            title: title.into(),
            description: description.into(),
            detail: detail.into(),
        }
    }

    fn material_with(key: &str, items: Vec<MaterialItem>) -> Material {
        let mut material = Material::default();
        material.sections.insert(
            key.into(),
            MaterialSection {
                name: "Nuclear Power".into(),
                items,
                references: vec![],
            },
        );
        material
    }

    #[test]
    fn chunk_count_matches_recognized_items() {
        let material = fixture_material();
        let expected: usize = SECTION_KEYS
            .iter()
            .filter_map(|k| material.section(k))
            .map(|s| s.items.len())
            .sum();
        let (chunks, _) = build_chunks(&material);
        assert_eq!(chunks.len(), expected);
        assert_eq!(chunks.len(), 8);
        assert!(chunks.iter().all(|c| c.section != "gallery"));
    }

    #[test]
    fn chunks_follow_section_order() {
        let (chunks, _) = build_chunks(&fixture_material());
        let sections: Vec<&str> = chunks.iter().map(|c| c.section.as_str()).collect();
        assert_eq!(
            sections,
            vec![
                "fundamentals",
                "fundamentals",
                "nuclear",
                "nuclear",
                "nuclear",
                "renewables",
                "renewables",
                "storage"
            ]
        );
    }

    #[test]
    fn empty_material_yields_no_chunks() {
        let (chunks, refs) = build_chunks(&Material::default());
        assert!(chunks.is_empty());
        assert!(refs.is_empty());
    }

    #[test]
    fn chunk_text_concatenates_stripped_fields() {
        let material = material_with(
            "nuclear",
            vec![item(
                "Control Rods",
                "<p>Boron   absorbs\nneutrons.</p>",
                "<ul><li>Insert</li><li>Withdraw</li></ul>",
            )],
        );
        let (chunks, _) = build_chunks(&material);
        let chunk = &chunks[0];
        assert_eq!(chunk.id, "nuclear-control-rods");
        assert_eq!(chunk.section_name, "Nuclear Power");
        assert_eq!(chunk.title, "Control Rods");
        assert_eq!(chunk.text, "Control Rods Boron absorbs neutrons. Insert Withdraw");
    }

    #[test]
    fn citations_resolve_against_footer() {
        let (chunks, ref_map) = build_chunks(&fixture_material());
        assert_eq!(ref_map.len(), 5);

        let fission = chunks.iter().find(|c| c.id == "nuclear-nuclear-fission").unwrap();
        assert_eq!(fission.ref_ids, vec![3, 4]);
        let ids: Vec<u32> = fission.refs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);

        let rods = chunks.iter().find(|c| c.id == "nuclear-control-rods").unwrap();
        assert_eq!(rods.ref_ids, vec![4]);
    }

    #[test]
    fn duplicate_footer_id_keeps_first_entry() {
        let mut material = material_with("nuclear", vec![item("Fusion", "<p>Tokamaks [7]</p>", "")]);
        material.references = vec![
            Reference {
                id: 7,
                text: "ITER Organization".into(),
                url: None,
            },
            Reference {
                id: 7,
                text: "Later duplicate".into(),
                url: None,
            },
        ];

        let (chunks, ref_map) = build_chunks(&material);
        assert_eq!(ref_map.len(), 1);
        assert_eq!(ref_map[&7].text, "ITER Organization");
        assert_eq!(chunks[0].refs.len(), 1);
        assert_eq!(chunks[0].refs[0].text, "ITER Organization");
    }

    #[test]
    fn unknown_citation_kept_in_ids_but_not_resolved() {
        let (chunks, _) = build_chunks(&fixture_material());
        let waste = chunks.iter().find(|c| c.id == "nuclear-radioactive-waste").unwrap();
        assert_eq!(waste.ref_ids, vec![42]);
        assert!(waste.refs.is_empty());
        assert!(waste.resolved_ref_ids().is_empty());
    }

    #[test]
    fn section_references_merge_by_text() {
        let (chunks, _) = build_chunks(&fixture_material());
        let hydro = chunks.iter().find(|c| c.id == "storage-pumped-hydro").unwrap();
        assert_eq!(hydro.ref_ids, vec![1]);
        // Footer [1] and inline #1 share text, so only the inline #90 is added.
        let ids: Vec<u32> = hydro.refs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 90]);
    }

    #[test]
    fn script_content_excluded_from_text() {
        let (chunks, _) = build_chunks(&fixture_material());
        let entropy = chunks.iter().find(|c| c.id == "fundamentals-efficiency-and-entropy").unwrap();
        assert!(!entropy.text.contains("trackScroll"));
        assert!(entropy.text.contains("Carnot efficiency limits every thermal power plant."));
        assert_eq!(entropy.ref_ids, vec![2]);
    }

    #[test]
    fn missing_section_name_falls_back_to_key() {
        let mut material = Material::default();
        material.sections.insert(
            "impacts".into(),
            MaterialSection {
                name: "  ".into(),
                items: vec![item("Air Quality", "", "")],
                references: vec![],
            },
        );
        let (chunks, _) = build_chunks(&material);
        assert_eq!(chunks[0].section_name, "impacts");
        assert_eq!(chunks[0].text, "Air Quality");
    }

    #[test]
    fn duplicate_titles_collide() {
        let material = material_with(
            "nuclear",
            vec![item("Fusion", "<p>a</p>", ""), item("Fusion", "<p>b</p>", "")],
        );
        let snapshot = CorpusSnapshot::from_material(&material);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.duplicate_ids(), vec!["nuclear-fusion".to_string()]);
    }

    #[test]
    fn rebuild_is_idempotent_by_value() {
        let material = fixture_material();
        let builder = CorpusBuilder::new();
        assert!(!builder.is_built());
        assert!(builder.chunks().is_empty());

        let first = builder.build(&material);
        let second = builder.build(&material);

        assert_eq!(first.chunks, second.chunks);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(second.version, first.version + 1);
        assert!(builder.is_built());
    }

    #[test]
    fn rebuild_replaces_latest_snapshot() {
        let builder = CorpusBuilder::new();
        builder.build(&fixture_material());
        assert_eq!(builder.chunks().len(), 8);
        assert_eq!(builder.ref_map().len(), 5);

        let smaller = material_with("nuclear", vec![item("Fusion", "", "")]);
        builder.build(&smaller);
        assert_eq!(builder.chunks().len(), 1);
        assert!(builder.ref_map().is_empty());
    }
}
