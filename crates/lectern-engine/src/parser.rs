//! Parse LLM output into capability results
//!
//! Responses may be wrapped in markdown code fences or surrounded by prose. Items
//! that fail to parse are skipped with a warning; a response without usable JSON
//! is an error.

use crate::error::EngineError;
use lectern_domain::{ConceptCluster, MergeSection, OutlineEntry, SectionKind};
use serde_json::{Map, Value};
use tracing::warn;

/// Rationale marking a template section the sources have no material for
pub const NO_SOURCE_DATA: &str = "NO_SOURCE_DATA";

/// Parse the headings of one outline window
pub fn parse_outline_entries(response: &str) -> Result<Vec<OutlineEntry>, EngineError> {
    let json = parse_json(response)?;
    let items = list_under(&json, &["sections", "outline"])?;

    let mut entries = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        match parse_outline_entry(item) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Failed to parse outline entry {}: {}", idx, e),
        }
    }
    Ok(entries)
}

/// Parse the clusters proposed for one term batch
pub fn parse_clusters(response: &str) -> Result<Vec<ConceptCluster>, EngineError> {
    let json = parse_json(response)?;
    let items = list_under(&json, &["clusters"])?;

    let mut clusters = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        match parse_cluster(item) {
            Ok(cluster) => clusters.push(cluster),
            Err(e) => warn!("Failed to parse cluster {}: {}", idx, e),
        }
    }
    Ok(clusters)
}

/// Parse a merged outline
///
/// Accepts a plain section list or a standard course plan object with `overview`,
/// `safety_module`, `technical_modules` and `assessment` slots, flattened in that
/// order.
pub fn parse_merge_sections(response: &str) -> Result<Vec<MergeSection>, EngineError> {
    let json = parse_json(response)?;

    let slotted: Vec<(&Value, Option<SectionKind>)> = match &json {
        Value::Object(obj) if is_course_plan(obj) => {
            let mut slots = Vec::new();
            if let Some(v) = obj.get("overview") {
                slots.push((v, Some(SectionKind::Introduction)));
            }
            if let Some(v) = obj.get("safety_module") {
                slots.push((v, Some(SectionKind::Safety)));
            }
            if let Some(Value::Array(modules)) = obj.get("technical_modules") {
                slots.extend(modules.iter().map(|m| (m, Some(SectionKind::Technical))));
            }
            if let Some(v) = obj.get("assessment") {
                slots.push((v, Some(SectionKind::Assessment)));
            }
            slots
        }
        _ => list_under(&json, &["sections", "outline"])?
            .iter()
            .map(|v| (v, None))
            .collect(),
    };

    let mut sections = Vec::new();
    for (idx, (item, slot_kind)) in slotted.into_iter().enumerate() {
        match parse_merge_section(item, slot_kind) {
            Ok(mut section) => {
                section.order = sections.len() as u32;
                sections.push(section);
            }
            Err(e) => warn!("Failed to parse merged section {}: {}", idx, e),
        }
    }

    if sections.is_empty() {
        return Err(EngineError::InvalidFormat(
            "merged outline has no sections".to_string(),
        ));
    }
    Ok(sections)
}

fn is_course_plan(obj: &Map<String, Value>) -> bool {
    ["overview", "safety_module", "technical_modules", "assessment"]
        .iter()
        .any(|key| obj.contains_key(*key))
}

/// Extract JSON from response, handling markdown code blocks and surrounding prose
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // Check if wrapped in markdown code block
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
        let body = body.trim_end();
        return body.strip_suffix("```").unwrap_or(body).trim();
    }

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return trimmed;
    }

    // Prose around the payload: take the outermost bracketed span
    let start = trimmed.find(['[', '{']);
    let end = trimmed.rfind([']', '}']);
    match (start, end) {
        (Some(s), Some(e)) if e > s => &trimmed[s..=e],
        _ => trimmed,
    }
}

fn parse_json(response: &str) -> Result<Value, EngineError> {
    serde_json::from_str(extract_json(response))
        .map_err(|e| EngineError::InvalidFormat(format!("JSON parse error: {}", e)))
}

/// The array itself, or the array stored under one of `keys`
fn list_under<'a>(json: &'a Value, keys: &[&str]) -> Result<&'a Vec<Value>, EngineError> {
    if let Value::Array(items) = json {
        return Ok(items);
    }
    if let Value::Object(obj) = json {
        for key in keys {
            if let Some(Value::Array(items)) = obj.get(*key) {
                return Ok(items);
            }
        }
    }
    Err(EngineError::InvalidFormat("Expected JSON array".to_string()))
}

fn str_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn u32_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn string_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_outline_entry(json: &Value) -> Result<OutlineEntry, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Entry is not a JSON object".to_string())?;

    let title = str_field(obj, &["title", "heading"])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "Missing or invalid 'title'".to_string())?;

    Ok(OutlineEntry::new(
        title,
        u32_field(obj, &["level"]).unwrap_or(0),
        u32_field(obj, &["start_page", "page"]),
    ))
}

fn parse_cluster(json: &Value) -> Result<ConceptCluster, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Cluster is not a JSON object".to_string())?;

    let canonical_name = str_field(obj, &["canonical_name", "name"])
        .map(str::trim)
        .unwrap_or_default();
    let members = string_list(obj, &["member_terms", "source_concepts", "members"]);

    if canonical_name.is_empty() && members.is_empty() {
        return Err("Cluster has neither a name nor members".to_string());
    }
    Ok(ConceptCluster::new(canonical_name, members))
}

fn parse_merge_section(
    json: &Value,
    slot_kind: Option<SectionKind>,
) -> Result<MergeSection, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Section is not a JSON object".to_string())?;

    let title = str_field(obj, &["title"])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "Missing or invalid 'title'".to_string())?;

    let kind = slot_kind
        .or_else(|| str_field(obj, &["kind", "type"]).and_then(SectionKind::parse))
        .unwrap_or_default()
        .unreserved();

    Ok(MergeSection {
        title: title.to_string(),
        rationale: str_field(obj, &["rationale"]).unwrap_or_default().trim().to_string(),
        key_concepts: string_list(obj, &["key_concepts", "concepts"]),
        level: u32_field(obj, &["level"]).unwrap_or(0),
        order: 0,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outline_entries() {
        let response = r#"[
            {"title": "Introduction", "level": 0, "start_page": 1},
            {"title": "Hydraulic Basics", "level": 1, "page": "3"},
            {"title": "   "},
            "not an object"
        ]"#;
        let entries = parse_outline_entries(response).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], OutlineEntry::new("Hydraulic Basics", 1, Some(3)));
    }

    #[test]
    fn test_parse_json_with_markdown_wrapper() {
        let response = "```json\n[{\"title\": \"Safety\", \"start_page\": 2}]\n```";
        let entries = parse_outline_entries(response).unwrap();
        assert_eq!(entries[0].start_page, Some(2));
    }

    #[test]
    fn test_parse_json_with_surrounding_prose() {
        let response = "Here is the outline:\n[{\"title\": \"Safety\"}]\nLet me know!";
        assert_eq!(parse_outline_entries(response).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            parse_outline_entries("This is not JSON"),
            Err(EngineError::InvalidFormat(_))
        ));
        assert!(parse_clusters(r#"{"answer": 42}"#).is_err());
    }

    #[test]
    fn test_parse_clusters_with_aliases() {
        let response = r#"{"clusters": [
            {"canonical_name": "Emergency Stop", "source_concepts": ["E-Stop", "Emergency Halt"]},
            {"name": "Lockout Tagout", "member_terms": ["LOTO", "Lock Out Tag Out"]},
            {"description": "orphan"}
        ]}"#;
        let clusters = parse_clusters(response).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].member_terms, vec!["E-Stop", "Emergency Halt"]);
        assert_eq!(clusters[1].canonical_name, "Lockout Tagout");
    }

    #[test]
    fn test_parse_course_plan_in_template_order() {
        let response = r#"{
            "assessment": {"title": "Final Quiz", "rationale": "NO_SOURCE_DATA", "key_concepts": []},
            "technical_modules": [
                {"title": "Die Change", "rationale": "From both plants", "key_concepts": ["Die Change"]},
                {"title": "Tonnage", "rationale": "Plant B", "key_concepts": ["Tonnage"], "level": 1}
            ],
            "overview": {"title": "Course Overview", "rationale": "Scope", "key_concepts": []},
            "safety_module": {"title": "Press Safety", "rationale": "Both", "key_concepts": ["LOTO"]}
        }"#;
        let sections = parse_merge_sections(response).unwrap();
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Course Overview", "Press Safety", "Die Change", "Tonnage", "Final Quiz"]
        );
        assert_eq!(sections[0].kind, SectionKind::Introduction);
        assert_eq!(sections[1].kind, SectionKind::Safety);
        assert_eq!(sections[3].level, 1);
        assert_eq!(sections[4].kind, SectionKind::Assessment);
        assert_eq!(sections[4].rationale, NO_SOURCE_DATA);
        assert_eq!(sections[4].order, 4);
    }

    #[test]
    fn test_parse_flat_merge_sections() {
        let response = r#"[
            {"title": "Overview", "type": "introduction", "key_concepts": ["Scope"]},
            {"title": "Motors", "key_concepts": ["Torque", " ", "Slip"]}
        ]"#;
        let sections = parse_merge_sections(response).unwrap();
        assert_eq!(sections[0].kind, SectionKind::Introduction);
        assert_eq!(sections[1].kind, SectionKind::Technical);
        assert_eq!(sections[1].key_concepts, vec!["Torque", "Slip"]);
    }

    #[test]
    fn test_merge_labels_never_yield_reserved_kinds() {
        let response = r#"[
            {"title": "Course Overview", "type": "overview"},
            {"title": "Final Review", "type": "review", "key_concepts": ["Lockout"]},
            {"title": "Review Questions", "level": 1, "kind": "grouping"}
        ]"#;
        let sections = parse_merge_sections(response).unwrap();
        let kinds: Vec<SectionKind> = sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SectionKind::Introduction, SectionKind::Assessment, SectionKind::Technical]
        );
        assert!(sections.iter().all(|s| !s.kind.is_reserved()));
    }

    #[test]
    fn test_empty_merge_is_error() {
        assert!(parse_merge_sections("[]").is_err());
    }
}
