//! Markdown summary of an exported run.
//!
//! [`MarkdownGenerator`] renders a [`RunExport`] as the `README.md` that sits
//! next to the module files. It contains:
//!
//! - A summary table
//! - The module plan, for multi-module runs
//! - One section per generated module, linking its files
//! - The failure, if the run stopped early

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{ModuleExport, PartialModuleExport, RunExport};

/// Markdown summary generator.
pub struct MarkdownGenerator<'a> {
    export: &'a RunExport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given export.
    #[must_use]
    pub const fn new(export: &'a RunExport) -> Self {
        Self { export }
    }

    /// Generates the complete Markdown summary.
    ///
    /// # Examples
    ///
    /// ```
    /// use scholar_orchestrator::{GenerationMode, PipelineState, Topic};
    /// use scholar_report::{MarkdownGenerator, RunExport};
    ///
    /// let state = PipelineState::new("run-1", Topic::new("Tides").unwrap(), GenerationMode::Single);
    /// let export = RunExport::from_state(&state);
    /// let markdown = MarkdownGenerator::new(&export).generate();
    /// assert!(markdown.starts_with("# Scholar Run: Tides"));
    /// ```
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_plan(&mut output);
        self.write_modules(&mut output);
        self.write_failure(&mut output);
        Self::write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Scholar Run: {}\n",
            escape_markdown(&self.export.topic)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.export.summary;
        let planned = summary
            .modules_planned
            .map_or_else(|| "-".to_string(), |n| n.to_string());

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Run | `{}` |", self.export.run_id);
        let _ = writeln!(output, "| Status | {} |", summary.status);
        let _ = writeln!(output, "| Mode | {} |", self.export.mode);
        let _ = writeln!(
            output,
            "| Modules | {} of {planned} |",
            summary.modules_completed
        );
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(summary.duration_seconds)
        );
        let _ = writeln!(
            output,
            "| Started | {} |",
            format_timestamp(&summary.started_at)
        );
        let _ = writeln!(output);
    }

    fn write_plan(&self, output: &mut String) {
        let Some(plan) = &self.export.plan else {
            return;
        };

        let _ = writeln!(output, "## Plan\n");
        if plan.is_empty() {
            let _ = writeln!(output, "*The plan contained no modules.*\n");
            return;
        }
        for (i, planned) in plan.planned_modules.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. **{}**: {}",
                i + 1,
                escape_markdown(&planned.title),
                escape_markdown(&planned.concept)
            );
        }
        let _ = writeln!(output);
    }

    fn write_modules(&self, output: &mut String) {
        let _ = writeln!(output, "## Modules\n");

        if self.export.modules.is_empty() {
            let _ = writeln!(output, "*No modules were generated.*\n");
            return;
        }

        for module in &self.export.modules {
            Self::write_module(output, module);
        }
    }

    fn write_module(output: &mut String, module: &ModuleExport) {
        let _ = writeln!(
            output,
            "### {}. {}\n",
            module.index + 1,
            escape_markdown(&module.module_title)
        );
        if module.planned_title != module.module_title {
            let _ = writeln!(
                output,
                "*Planned as: {}*\n",
                escape_markdown(&module.planned_title)
            );
        }
        let _ = writeln!(output, "{}\n", escape_markdown(&module.concept));

        if !module.keywords.is_empty() {
            let keywords: Vec<String> = module
                .keywords
                .iter()
                .map(|k| format!("`{}`", k.replace('`', "'")))
                .collect();
            let _ = writeln!(output, "**Keywords:** {}\n", keywords.join(", "));
        }
        let _ = writeln!(
            output,
            "**Image prompt:** {}\n",
            escape_markdown(&module.image_prompt)
        );

        let _ = writeln!(output, "**Narration:**\n");
        for line in module.script.lines() {
            let _ = writeln!(output, "> {line}");
        }
        let _ = writeln!(output);

        let files = &module.files;
        let _ = writeln!(
            output,
            "Files: [content]({}) | [image]({}) | [audio]({})\n",
            files.content, files.image, files.audio
        );
    }

    fn write_failure(&self, output: &mut String) {
        let Some(failure) = &self.export.failure else {
            return;
        };

        let _ = writeln!(output, "## Failure\n");
        match failure.module_index {
            Some(index) => {
                let _ = writeln!(
                    output,
                    "The **{}** step failed for module {}.\n",
                    failure.step,
                    index + 1
                );
            }
            None => {
                let _ = writeln!(output, "The **{}** step failed.\n", failure.step);
            }
        }
        let _ = writeln!(output, "```\n{}\n```\n", failure.message);

        if let Some(partial) = &self.export.failed_module {
            Self::write_partial(output, partial);
        }
    }

    fn write_partial(output: &mut String, partial: &PartialModuleExport) {
        let _ = writeln!(
            output,
            "Module {} (*{}*) was in progress.",
            partial.index + 1,
            escape_markdown(&partial.planned_title)
        );
        if let Some(title) = &partial.module_title {
            let _ = writeln!(output, "Its idea was titled \"{}\".", escape_markdown(title));
        }
        if partial.script.is_some() {
            let _ = writeln!(output, "Its narration script had been written.");
        }
        let _ = writeln!(output);
    }

    fn write_footer(output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&Utc::now());
        let _ = writeln!(output, "*Generated by Scholar at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a duration in seconds, e.g. 65 -> "1m 5s".
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes characters that model output could turn into Markdown formatting.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push(' '),
            _ => result.push(ch),
        }
    }

    result
}
