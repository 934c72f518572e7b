//! LLM prompt engineering for the language-model capabilities

use lectern_domain::MergeSection;
use serde::Serialize;

/// Builds prompts for the three LLM-backed capabilities
pub struct PromptBuilder;

impl PromptBuilder {
    /// Prompt asking for the headings found in one document window
    pub fn outline_window(text_chunk: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(OUTLINE_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str("Document excerpt:\n");
        prompt.push_str("---\n");
        prompt.push_str(text_chunk);
        prompt.push_str("\n---\n\n");
        prompt.push_str(OUTLINE_FORMAT);
        prompt
    }

    /// Prompt asking for synonym clusters over a batch of terms
    pub fn cluster_concepts(term_batch: &[String]) -> String {
        let mut prompt = String::new();
        prompt.push_str(CLUSTER_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str("Terms:\n");
        for term in term_batch {
            prompt.push_str(&format!("- {}\n", term));
        }
        prompt.push('\n');
        prompt.push_str(CLUSTER_FORMAT);
        prompt
    }

    /// Prompt asking for one consolidated outline from two source outlines
    pub fn merge_outlines(
        outline_a: &[MergeSection],
        outline_b: &[MergeSection],
        budget: usize,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(MERGE_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(&format!(
            "Use at most {} key concepts in total across all sections.\n\n",
            budget
        ));
        prompt.push_str("Outline A:\n");
        prompt.push_str(&render_outline(outline_a));
        prompt.push_str("\n\nOutline B:\n");
        prompt.push_str(&render_outline(outline_b));
        prompt.push_str("\n\n");
        prompt.push_str(MERGE_FORMAT);
        prompt
    }
}

#[derive(Serialize)]
struct SourceSection<'a> {
    section_title: &'a str,
    level: u32,
    concepts: &'a [String],
}

fn render_outline(sections: &[MergeSection]) -> String {
    let view: Vec<SourceSection<'_>> = sections
        .iter()
        .map(|s| SourceSection {
            section_title: &s.title,
            level: s.level,
            concepts: &s.key_concepts,
        })
        .collect();
    // Serializing plain strings and integers cannot fail
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| "[]".to_string())
}

const OUTLINE_INSTRUCTIONS: &str = r#"You are an expert Instructional Designer reading engineering training material.
Identify the section headings in the document excerpt below and build its outline.

Rules:
- Only report headings that appear in the excerpt; do not invent sections
- level 0 is a top-level section, level 1 a subsection, and so on
- start_page is the page number where the section begins, if the excerpt shows page markers
- Keep the original heading wording"#;

const OUTLINE_FORMAT: &str = r#"Output format (JSON array only, no additional text):
[
  {"title": "Section title", "level": 0, "start_page": 1}
]"#;

const CLUSTER_INSTRUCTIONS: &str = r#"Analyze the list of technical concepts and group them into semantic clusters.
Identify synonyms, acronyms, and spelling variations (e.g., 'E-Stop' and 'Emergency Halt').

Rules:
- Only group true synonyms; never merge a broader term with a narrower one
  ('Motor' and 'Servo Motor' stay separate)
- Every listed term belongs to exactly one cluster
- Terms without synonyms form a cluster of their own
- Choose the clearest, most complete name as canonical_name"#;

const CLUSTER_FORMAT: &str = r#"Output format (JSON array only, no additional text):
[
  {"canonical_name": "Emergency Stop", "member_terms": ["E-Stop", "Emergency Halt"]}
]"#;

const MERGE_INSTRUCTIONS: &str = r#"You are an expert Instructional Designer for Engineering.
Given two course outlines, create one unified course that follows the standard template:
1. Introduction (overview, purpose, scope, prerequisites)
2. Safety (mandatory)
3. Technical modules (merged and de-duplicated, fundamentals before advanced topics)
4. Assessment (knowledge checks and final review)

For every section give a short rationale explaining which source sections it combines.

CRITICAL INSTRUCTIONS FOR MISSING CONTENT:
1. Always include the Introduction, Safety and Assessment modules.
2. If the sources contain no concepts for one of them, keep the module, set key_concepts
   to an empty list and set rationale to "NO_SOURCE_DATA".
3. Only use concepts that appear in the source outlines."#;

const MERGE_FORMAT: &str = r#"Output format (JSON object only, no additional text):
{
  "overview": {"title": "...", "rationale": "...", "key_concepts": ["..."]},
  "safety_module": {"title": "...", "rationale": "...", "key_concepts": ["..."]},
  "technical_modules": [{"title": "...", "rationale": "...", "key_concepts": ["..."], "level": 0}],
  "assessment": {"title": "...", "rationale": "...", "key_concepts": ["..."]}
}"#;
