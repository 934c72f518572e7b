//! Output formatting for the CLI.

use crate::config::{Config, OutputFormat};
use crate::error::Result;
use colored::*;
use lectern_engine::{BudgetPlan, GenerationOutcome};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format a budget plan.
    pub fn format_plan(&self, plan: &BudgetPlan) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(plan)?),
            OutputFormat::Quiet => Ok(format!(
                "{} {} {} {}",
                plan.concept_batch_size, plan.max_sections_per_merge, plan.chunk_chars, plan.chunk_overlap
            )),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Setting", "Value"]);
                builder.push_record(["Context size".to_string(), format!("{} tokens", plan.context_size)]);
                builder.push_record([
                    "Concept batch".to_string(),
                    format!("{} terms", plan.concept_batch_size),
                ]);
                builder.push_record([
                    "Merge budget".to_string(),
                    format!("{} concepts", plan.max_sections_per_merge),
                ]);
                builder.push_record([
                    "Extraction window".to_string(),
                    format!("{} chars ({} overlap)", plan.chunk_chars, plan.chunk_overlap),
                ]);
                Ok(self.render(builder))
            }
        }
    }

    /// Format a generation outcome.
    pub fn format_outcome(&self, outcome: &GenerationOutcome) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
            OutputFormat::Quiet => Ok(outcome
                .sections
                .iter()
                .map(|s| format!("{}{}", "  ".repeat(s.level as usize), s.title))
                .collect::<Vec<_>>()
                .join("\n")),
            OutputFormat::Table => self.format_outcome_table(outcome),
        }
    }

    fn format_outcome_table(&self, outcome: &GenerationOutcome) -> Result<String> {
        if outcome.sections.is_empty() {
            return Ok(self.colorize("No sections generated.", "yellow"));
        }

        let mut builder = Builder::default();
        builder.push_record(["#", "Section", "Kind", "Key concepts", "Slides"]);

        for section in &outcome.sections {
            let mut title = format!("{}{}", "  ".repeat(section.level as usize), section.title);
            if section.is_placeholder {
                title.push_str(" (placeholder)");
            }
            let slides = if section.is_review() {
                outcome.assignment.unassigned.len()
            } else {
                outcome
                    .assignment
                    .bucket(&section.id)
                    .map(|ids| ids.len())
                    .unwrap_or(0)
            };
            builder.push_record([
                section.order.to_string(),
                title,
                section.kind.as_str().to_string(),
                section.key_concepts.join(", "),
                slides.to_string(),
            ]);
        }

        let table = self.render(builder);
        Ok(format!("{}\n\n{}", table, outcome.summary.summary()))
    }

    /// Format the effective configuration.
    pub fn format_config(&self, config: &Config) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(config)?),
            OutputFormat::Table | OutputFormat::Quiet => config.to_toml(),
        }
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn render(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_domain::{SectionAssignment, SectionKind, SlideAssignment, SlideId, TargetSection};
    use lectern_domain::RunId;
    use lectern_engine::GenerationSummary;

    fn section(id: &str, title: &str, level: u32, order: u32, kind: SectionKind) -> TargetSection {
        TargetSection {
            id: id.to_string(),
            title: title.to_string(),
            rationale: "Based on content from Plant A".to_string(),
            key_concepts: vec!["Lockout".to_string(), "E-Stop".to_string()],
            level,
            order,
            parent_id: None,
            kind,
            is_placeholder: false,
            suggested_source_ids: Vec::new(),
        }
    }

    fn create_test_outcome() -> GenerationOutcome {
        let mut review = section("t-2", "Unassigned Source Material", 0, 2, SectionKind::Review);
        review.key_concepts.clear();
        let mut quiz = section("t-1", "Knowledge Check", 1, 1, SectionKind::Assessment);
        quiz.is_placeholder = true;

        GenerationOutcome {
            sections: vec![
                section("t-0", "Press Safety", 0, 0, SectionKind::Technical),
                quiz,
                review,
            ],
            assignment: SlideAssignment {
                buckets: vec![SectionAssignment {
                    section_id: "t-0".to_string(),
                    slide_ids: vec![SlideId::new("a1"), SlideId::new("a2")],
                }],
                unassigned: vec![SlideId::new("b2")],
            },
            concepts: Vec::new(),
            summary: GenerationSummary::new(RunId::new()),
        }
    }

    #[test]
    fn test_outcome_table() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_outcome(&create_test_outcome()).unwrap();
        assert!(output.contains("Key concepts"));
        assert!(output.contains("Press Safety"));
        assert!(output.contains("  Knowledge Check (placeholder)"));
        assert!(output.contains("Lockout, E-Stop"));
        assert!(output.contains("Generation Summary"));
    }

    #[test]
    fn test_outcome_json() {
        let formatter = Formatter::new(OutputFormat::Json, false);
        let output = formatter.format_outcome(&create_test_outcome()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["sections"].as_array().unwrap().len(), 3);
        assert_eq!(value["assignment"]["unassigned"][0], "b2");
    }

    #[test]
    fn test_outcome_quiet() {
        let formatter = Formatter::new(OutputFormat::Quiet, false);
        let output = formatter.format_outcome(&create_test_outcome()).unwrap();
        assert_eq!(
            output,
            "Press Safety\n  Knowledge Check\nUnassigned Source Material"
        );
    }

    #[test]
    fn test_empty_outcome() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let mut outcome = create_test_outcome();
        outcome.sections.clear();
        let output = formatter.format_outcome(&outcome).unwrap();
        assert!(output.contains("No sections generated"));
    }

    #[test]
    fn test_plan_table() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let plan = BudgetPlan::plan(8192).unwrap();
        let output = formatter.format_plan(&plan).unwrap();
        assert!(output.contains("Concept batch"));
        assert!(output.contains(&format!("{} terms", plan.concept_batch_size)));
    }

    #[test]
    fn test_plan_quiet() {
        let formatter = Formatter::new(OutputFormat::Quiet, false);
        let plan = BudgetPlan::plan(8192).unwrap();
        let output = formatter.format_plan(&plan).unwrap();
        assert_eq!(output.split_whitespace().count(), 4);
    }

    #[test]
    fn test_colorize_disabled() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        assert_eq!(formatter.success("test"), "✓ test");
        assert_eq!(formatter.warning("test"), "⚠ test");
    }
}
