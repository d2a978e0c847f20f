//! Generation engine: re-expands the normalized tree N times, resolving
//! every field value per output instance.
//!
//! Resolution order per field: relation dependency first (dependents mirror
//! their master as `prefix + master + suffix`), then kind-specific handling
//! (null always resolves to the null literal, booleans to true/false), then
//! the field's mode. Random modes enforce per-field uniqueness across the
//! whole run with a bounded retry search; exhausting the estimated value
//! space or the retry budget aborts the run with no partial output.
//!
//! Resolution is memoized per output file, so a field referenced multiple
//! times within one document (directly or through relations) resolves
//! identically within that document but can differ across documents.

pub mod archive;

use crate::error::{GenerateError, GenerateResult};
use crate::model::{
    allowed_modes, DataFormat, FieldKind, FieldMode, FieldSetting, JsonScalarType, JsonShape,
    ListScope, LoopSetting, Node, Relation,
};
use crate::path::{normalize_loop_id, strip_loop_markers, to_template_path};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

/// Unambiguous alphabet for random text (no 0/O, 1/I or similar glyphs).
const RANDOM_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Hard cap on uniqueness retries when the value space is unbounded or
/// too large to estimate.
const MAX_RETRIES: u64 = 10_000;

/// One serialized output document: a named byte buffer, ready for the
/// archive writer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Options for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Requested output count; coerced to >= 1. For CSV this is the row
    /// count of the single output file.
    pub file_count: usize,
    pub format: DataFormat,
    pub csv_delimiter: char,
    /// Base for output names: `{base}_{i}.{ext}` or `{base}_generated.csv`.
    pub base_name: String,
}

impl GenerateOptions {
    pub fn new(file_count: usize, format: DataFormat) -> Self {
        GenerateOptions {
            file_count,
            format,
            csv_delimiter: ';',
            base_name: "document".to_string(),
        }
    }
}

type LoopIndexMap = BTreeMap<String, usize>;
type Cache = HashMap<String, String>;

/// Generate `file_count` documents from a parsed template.
///
/// Entry point for production use; seeds the engine from OS entropy.
pub fn generate(
    root: &Node,
    fields: &[FieldSetting],
    loops: &[LoopSetting],
    relations: &[Relation],
    options: &GenerateOptions,
) -> GenerateResult<Vec<GeneratedFile>> {
    generate_with_rng(root, fields, loops, relations, options, StdRng::from_entropy())
}

/// Generate with a caller-supplied RNG, for deterministic runs.
pub fn generate_with_rng<R: Rng>(
    root: &Node,
    fields: &[FieldSetting],
    loops: &[LoopSetting],
    relations: &[Relation],
    options: &GenerateOptions,
    rng: R,
) -> GenerateResult<Vec<GeneratedFile>> {
    let file_count = options.file_count.max(1);
    info!(
        files = file_count,
        format = %options.format,
        "generating documents"
    );

    let mut engine = Engine::new(fields, loops, relations, rng);

    match options.format {
        DataFormat::Csv => {
            let bytes = engine.generate_csv(root, file_count, options.csv_delimiter)?;
            Ok(vec![GeneratedFile {
                name: format!("{}_generated.csv", options.base_name),
                bytes,
            }])
        }
        DataFormat::Xml => {
            let mut files = Vec::with_capacity(file_count);
            for i in 0..file_count {
                let mut cache = Cache::new();
                let root_path = format!("/{}", root.tag);
                let body =
                    engine.serialize_xml(root, &root_path, i, &LoopIndexMap::new(), &mut cache)?;
                let document = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", body);
                files.push(GeneratedFile {
                    name: format!("{}_{}.xml", options.base_name, i + 1),
                    bytes: document.into_bytes(),
                });
            }
            Ok(files)
        }
        DataFormat::Json => {
            let mut files = Vec::with_capacity(file_count);
            for i in 0..file_count {
                let mut cache = Cache::new();
                let root_path = format!("/{}", root.tag);
                let value =
                    engine.build_json(root, &root_path, i, &LoopIndexMap::new(), &mut cache)?;
                let mut text = serde_json::to_string_pretty(&value)
                    .map_err(|err| GenerateError::Io(std::io::Error::other(err)))?;
                text.push('\n');
                files.push(GeneratedFile {
                    name: format!("{}_{}.json", options.base_name, i + 1),
                    bytes: text.into_bytes(),
                });
            }
            Ok(files)
        }
    }
}

/// Recompute loop counts driven by global-scope list fields: a loop whose
/// fields consume a global list must run `ceil(list_len / file_count)`
/// iterations per file so the whole batch covers the list. The largest
/// requirement wins when several fields target the same loop. Returns
/// whether any count changed.
pub fn autosize_list_loops(
    fields: &[FieldSetting],
    loops: &mut [LoopSetting],
    file_count: usize,
) -> bool {
    let loop_ids: Vec<String> = loops.iter().map(|l| l.id.clone()).collect();
    let mut desired: HashMap<String, usize> = HashMap::new();

    for field in fields {
        if field.mode != FieldMode::List || field.list_scope != ListScope::Global {
            continue;
        }
        let Some(loop_id) = loop_key_for_field(&field.id, loop_ids.iter()) else {
            continue;
        };
        let list_len = field.list_lines().len();
        let target = list_len.div_ceil(file_count.max(1)).max(1);
        let entry = desired.entry(loop_id).or_insert(0);
        *entry = (*entry).max(target);
    }

    let mut changed = false;
    for loop_setting in loops.iter_mut() {
        if let Some(&target) = desired.get(&loop_setting.id) {
            if target != loop_setting.count {
                loop_setting.count = target;
                changed = true;
            }
        }
    }
    changed
}

/// Find the loop a field belongs to from the last `[]` segment of its id,
/// tolerating the shape differences between XML and JSON/CSV loop ids.
fn loop_key_for_field<'a>(
    field_id: &str,
    mut loop_ids: impl Iterator<Item = &'a String>,
) -> Option<String> {
    let last = field_id.rfind("[]")?;
    let raw = &field_id[..last + 2];
    let candidates = [
        normalize_loop_id(&format!("/{}", raw)),
        normalize_loop_id(raw),
        format!("/{}", raw),
        raw.to_string(),
    ];
    loop_ids
        .find(|id| candidates.iter().any(|c| c == *id))
        .cloned()
}

// =============================================================================
// Engine
// =============================================================================

struct Engine<R: Rng> {
    fields: HashMap<String, FieldSetting>,
    loop_counts: HashMap<String, usize>,
    /// First enabled relation per dependent; disabled relations are
    /// ignored entirely, so the field resolves as if unrelated.
    relation_by_dependent: HashMap<String, Relation>,
    /// Original per-row values for CSV same-mode regeneration.
    row_samples: HashMap<String, Vec<String>>,
    /// Used-value sets per field id, for run-wide uniqueness of random modes.
    used: HashMap<String, HashSet<String>>,
    rng: R,
}

impl<R: Rng> Engine<R> {
    fn new(fields: &[FieldSetting], loops: &[LoopSetting], relations: &[Relation], rng: R) -> Self {
        let fields = fields
            .iter()
            .map(|f| (f.id.clone(), f.clone().normalize()))
            .collect();
        let loop_counts = loops.iter().map(|l| (l.id.clone(), l.count.max(1))).collect();
        let mut relation_by_dependent = HashMap::new();
        for rel in relations {
            if !rel.enabled {
                continue;
            }
            relation_by_dependent
                .entry(rel.dependent_id.clone())
                .or_insert_with(|| rel.clone());
        }
        Engine {
            fields,
            loop_counts,
            relation_by_dependent,
            row_samples: HashMap::new(),
            used: HashMap::new(),
            rng,
        }
    }

    /// Field lookup by template path, tolerating loop-marker presence.
    fn field_for(&self, template_path: &str) -> Option<&FieldSetting> {
        self.fields
            .get(template_path)
            .or_else(|| self.fields.get(&strip_loop_markers(template_path)))
    }

    fn resolve(
        &mut self,
        id: &str,
        file_index: usize,
        loop_map: &LoopIndexMap,
        cache: &mut Cache,
    ) -> GenerateResult<String> {
        let mut visiting = Vec::new();
        self.resolve_guarded(id, file_index, loop_map, cache, &mut visiting)
    }

    fn resolve_guarded(
        &mut self,
        id: &str,
        file_index: usize,
        loop_map: &LoopIndexMap,
        cache: &mut Cache,
        visiting: &mut Vec<String>,
    ) -> GenerateResult<String> {
        let key = cache_key(id, file_index, loop_map);
        if let Some(hit) = cache.get(&key) {
            return Ok(hit.clone());
        }

        // Cycle guard: a field already on the resolution stack resolves by
        // its own mode instead of recursing through its relation again.
        if !visiting.iter().any(|v| v == id) {
            if let Some(rel) = self.relation_by_dependent.get(id).cloned() {
                visiting.push(id.to_string());
                let master =
                    self.resolve_guarded(&rel.master_id, file_index, loop_map, cache, visiting)?;
                let value = format!("{}{}{}", rel.prefix, master, rel.suffix);
                cache.insert(key, value.clone());
                return Ok(value);
            }
        }

        let Some(field) = self.field_for(id).cloned() else {
            return Ok(String::new());
        };
        let value = self.resolve_field(&field, file_index, loop_map)?;
        cache.insert(key, value.clone());
        Ok(value)
    }

    fn resolve_field(
        &mut self,
        field: &FieldSetting,
        file_index: usize,
        loop_map: &LoopIndexMap,
    ) -> GenerateResult<String> {
        let mode = if allowed_modes(field.kind).contains(&field.mode) {
            field.mode
        } else {
            FieldMode::Same
        };

        // Null fields carry no generable value; mode is ignored.
        if field.kind == FieldKind::Null {
            return Ok("null".to_string());
        }

        if field.kind == FieldKind::Boolean {
            return Ok(match mode {
                FieldMode::Fixed => normalize_bool(&field.fixed_value),
                FieldMode::Random => {
                    if self.rng.gen_bool(0.5) { "true" } else { "false" }.to_string()
                }
                _ => normalize_bool(&field.value),
            });
        }

        match mode {
            FieldMode::Same => Ok(self.same_value(field, loop_map)),
            FieldMode::Fixed => Ok(field.fixed_value.clone()),
            FieldMode::Increment => {
                let offset = file_index + loop_map.values().sum::<usize>();
                Ok(increment_value(field, offset as i64))
            }
            FieldMode::Random => self.unique_random(field),
            FieldMode::List => Ok(self.list_value(field, file_index, loop_map)),
        }
    }

    /// Original sampled value; CSV leaves resolve to the value of the row
    /// currently being emitted where one exists.
    fn same_value(&self, field: &FieldSetting, loop_map: &LoopIndexMap) -> String {
        if let Some(rows) = self.row_samples.get(&field.id) {
            if let Some(key) = loop_key_for_field(&field.id, self.loop_counts.keys()) {
                if let Some(&row) = loop_map.get(&key) {
                    if let Some(value) = rows.get(row) {
                        return value.clone();
                    }
                }
            }
        }
        field.value.clone()
    }

    fn list_value(&self, field: &FieldSetting, file_index: usize, loop_map: &LoopIndexMap) -> String {
        let lines = field.list_lines();
        if lines.is_empty() {
            return field.value.clone();
        }
        let slot = match field.list_scope {
            ListScope::PerFile => file_index,
            ListScope::Global => match loop_key_for_field(&field.id, self.loop_counts.keys()) {
                Some(key) => {
                    let count = self.loop_counts.get(&key).copied().unwrap_or(1);
                    file_index * count + loop_map.get(&key).copied().unwrap_or(0)
                }
                None => file_index,
            },
        };
        lines[slot % lines.len()].to_string()
    }

    /// Draw a random value not yet used by this field anywhere in the run.
    ///
    /// The estimated value space bounds both the feasibility check and the
    /// retry budget (`min(10000, 2 x space)`); exhaustion is a hard failure
    /// naming the field.
    fn unique_random(&mut self, field: &FieldSetting) -> GenerateResult<String> {
        let space = value_space(field);
        let used = self.used.entry(field.id.clone()).or_default();

        if let Some(space) = space {
            if used.len() as u64 >= space {
                return Err(GenerateError::UniqueValuesExhausted {
                    field: field.id.clone(),
                });
            }
        }

        let budget = space
            .map(|s| s.saturating_mul(2).min(MAX_RETRIES))
            .unwrap_or(MAX_RETRIES);
        for _ in 0..budget {
            let candidate = random_candidate(field, &mut self.rng);
            if !used.contains(&candidate) {
                used.insert(candidate.clone());
                return Ok(candidate);
            }
        }
        Err(GenerateError::UniqueValuesExhausted {
            field: field.id.clone(),
        })
    }

    // -------------------------------------------------------------------------
    // XML serialization
    // -------------------------------------------------------------------------

    fn serialize_xml(
        &mut self,
        node: &Node,
        path: &str,
        file_index: usize,
        loop_map: &LoopIndexMap,
        cache: &mut Cache,
    ) -> GenerateResult<String> {
        let template_path = to_template_path(path);

        let mut attrs = String::new();
        for attr in &node.attrs {
            let attr_path = format!("{}/@{}", template_path, attr.name);
            let value = match self.field_for(&attr_path).map(|f| f.id.clone()) {
                Some(id) => self.resolve(&id, file_index, loop_map, cache)?,
                None => attr.value.clone(),
            };
            attrs.push_str(&format!(" {}=\"{}\"", attr.name, escape_xml(&value)));
        }

        if node.children.is_empty() {
            let value = match self.field_for(&template_path).map(|f| f.id.clone()) {
                Some(id) => self.resolve(&id, file_index, loop_map, cache)?,
                None => node.text.clone().unwrap_or_default(),
            };
            return Ok(format!(
                "<{}{}>{}</{}>",
                node.tag,
                attrs,
                escape_xml(&value),
                node.tag
            ));
        }

        let mut children = String::new();
        for child in &node.children {
            if let Some(loop_id) = &child.loop_id {
                let count = self.loop_counts.get(loop_id).copied().unwrap_or(1);
                for i in 0..count {
                    let mut next_loop = loop_map.clone();
                    next_loop.insert(loop_id.clone(), i);
                    let child_path = format!("{}/{}[{}]", path, child.tag, i);
                    children.push_str(&self.serialize_xml(
                        child,
                        &child_path,
                        file_index,
                        &next_loop,
                        cache,
                    )?);
                }
            } else {
                let child_path = format!("{}/{}", path, child.tag);
                children.push_str(&self.serialize_xml(
                    child, &child_path, file_index, loop_map, cache,
                )?);
            }
        }
        Ok(format!("<{}{}>{}</{}>", node.tag, attrs, children, node.tag))
    }

    // -------------------------------------------------------------------------
    // JSON serialization
    // -------------------------------------------------------------------------

    fn build_json(
        &mut self,
        node: &Node,
        path: &str,
        file_index: usize,
        loop_map: &LoopIndexMap,
        cache: &mut Cache,
    ) -> GenerateResult<serde_json::Value> {
        match node.json_shape {
            Some(JsonShape::Array) => {
                let Some(item) = node.children.first() else {
                    return Ok(serde_json::Value::Array(Vec::new()));
                };
                let loop_id = node
                    .loop_id
                    .clone()
                    .unwrap_or_else(|| format!("{}[]", path));
                let count = self.loop_counts.get(&loop_id).copied().unwrap_or(1);
                let mut items = Vec::with_capacity(count);
                for i in 0..count {
                    let mut next_loop = loop_map.clone();
                    next_loop.insert(loop_id.clone(), i);
                    let item_path = format!("{}[{}]", path, i);
                    items.push(self.build_json(item, &item_path, file_index, &next_loop, cache)?);
                }
                Ok(serde_json::Value::Array(items))
            }
            Some(JsonShape::Value) | None => {
                let template_path = to_template_path(path);
                let resolved = match self.field_for(&template_path).map(|f| f.id.clone()) {
                    Some(id) => self.resolve(&id, file_index, loop_map, cache)?,
                    None => node.json_value.clone().unwrap_or_default(),
                };
                Ok(coerce_json(node, resolved))
            }
            Some(JsonShape::Object) => {
                let mut map = serde_json::Map::new();
                for child in &node.children {
                    let child_path = format!("{}/{}", path, child.tag);
                    let value =
                        self.build_json(child, &child_path, file_index, loop_map, cache)?;
                    map.insert(child.tag.clone(), value);
                }
                Ok(serde_json::Value::Object(map))
            }
        }
    }

    // -------------------------------------------------------------------------
    // CSV serialization
    // -------------------------------------------------------------------------

    /// CSV output is special-cased: the root must be a single repeating
    /// row group, the requested file count becomes the row count, and one
    /// CSV file is produced.
    fn generate_csv(
        &mut self,
        root: &Node,
        row_count: usize,
        delimiter: char,
    ) -> GenerateResult<Vec<u8>> {
        if root.json_shape != Some(JsonShape::Array) || root.children.len() != 1 {
            return Err(GenerateError::CsvShape(
                "root must be a single repeating row group".into(),
            ));
        }
        let row = &root.children[0];
        if row.children.is_empty() {
            return Err(GenerateError::CsvShape("row group has no columns".into()));
        }

        let loop_id = root.loop_id.clone().unwrap_or_else(|| "root[]".to_string());

        // Per-row originals feed same-mode resolution.
        for column in &row.children {
            if !column.csv_values.is_empty() {
                let field_id = format!("{}[]/{}", root.tag, column.tag);
                self.row_samples
                    .insert(field_id, column.csv_values.clone());
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter as u8)
            .from_writer(Vec::new());

        let header: Vec<&str> = row.children.iter().map(|c| c.tag.as_str()).collect();
        writer.write_record(&header)?;

        for i in 0..row_count {
            let mut cache = Cache::new();
            let mut loop_map = LoopIndexMap::new();
            loop_map.insert(loop_id.clone(), i);

            let mut record = Vec::with_capacity(row.children.len());
            for column in &row.children {
                let field_path = format!("{}[]/{}", root.tag, column.tag);
                let value = match self.field_for(&field_path).map(|f| f.id.clone()) {
                    Some(id) => self.resolve(&id, 0, &loop_map, &mut cache)?,
                    None => column.json_value.clone().unwrap_or_default(),
                };
                record.push(value);
            }
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|err| GenerateError::Io(std::io::Error::other(err)))
    }
}

// =============================================================================
// Value helpers
// =============================================================================

fn cache_key(id: &str, file_index: usize, loop_map: &LoopIndexMap) -> String {
    format!("{}::{}::{:?}", id, file_index, loop_map)
}

fn normalize_bool(value: &str) -> String {
    if value.trim().eq_ignore_ascii_case("true") {
        "true".to_string()
    } else {
        "false".to_string()
    }
}

fn increment_value(field: &FieldSetting, offset: i64) -> String {
    match field.kind {
        FieldKind::Number => {
            let trimmed = field.value.trim();
            if let Ok(base) = trimmed.parse::<i64>() {
                (base + field.step * offset).to_string()
            } else if let Ok(base) = trimmed.parse::<f64>() {
                format!("{}", base + (field.step * offset) as f64)
            } else {
                (field.step * offset).to_string()
            }
        }
        FieldKind::Date => match parse_base_date(&field.value) {
            Some(base) => format_iso(base + Duration::days(field.step * offset)),
            None => field.value.clone(),
        },
        _ => field.value.clone(),
    }
}

fn random_candidate<R: Rng>(field: &FieldSetting, rng: &mut R) -> String {
    match field.kind {
        FieldKind::Number => {
            if field.length > 0 {
                // Fixed digit count; leading zeros allowed.
                (0..field.length)
                    .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                    .collect()
            } else {
                let (min, max) = (field.min.min(field.max), field.min.max(field.max));
                rng.gen_range(min..=max).to_string()
            }
        }
        FieldKind::Date => {
            let span = field.date_span_days.max(1);
            match parse_base_date(&field.value) {
                Some(base) => format_iso(base + Duration::days(rng.gen_range(0..span))),
                None => field.value.clone(),
            }
        }
        _ => {
            let length = field.length.max(4);
            (0..length)
                .map(|_| {
                    let idx = rng.gen_range(0..RANDOM_ALPHABET.len());
                    char::from(RANDOM_ALPHABET[idx])
                })
                .collect()
        }
    }
}

/// Estimated maximum number of distinct values a random-mode field can
/// produce; `None` when too large to compute.
fn value_space(field: &FieldSetting) -> Option<u64> {
    match field.kind {
        FieldKind::Number => {
            if field.length > 0 {
                10u64.checked_pow(field.length as u32)
            } else {
                let (min, max) = (field.min.min(field.max), field.min.max(field.max));
                Some((max - min) as u64 + 1)
            }
        }
        FieldKind::Date => Some(field.date_span_days.max(1) as u64),
        _ => (RANDOM_ALPHABET.len() as u64).checked_pow(field.length.max(4) as u32),
    }
}

fn parse_base_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.len() < 10 {
        return None;
    }
    NaiveDate::parse_from_str(&trimmed[..10], "%Y-%m-%d").ok()
}

fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Escape the five predefined XML entities.
fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Coerce a resolved string back to the leaf's original JSON scalar type,
/// falling back to a string when the generated value no longer parses.
fn coerce_json(node: &Node, resolved: String) -> serde_json::Value {
    match node.json_original_type {
        Some(JsonScalarType::Null) => serde_json::Value::Null,
        Some(JsonScalarType::Boolean) => match resolved.trim().to_lowercase().as_str() {
            "true" => serde_json::Value::Bool(true),
            "false" => serde_json::Value::Bool(false),
            _ => serde_json::Value::String(resolved),
        },
        Some(JsonScalarType::Number) => {
            let trimmed = resolved.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                serde_json::Value::Number(n.into())
            } else if let Some(n) = trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                serde_json::Value::Number(n)
            } else {
                serde_json::Value::String(resolved)
            }
        }
        _ => serde_json::Value::String(resolved),
    }
}
