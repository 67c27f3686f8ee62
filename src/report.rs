use crate::build::BuildResult;
use colored::Colorize;
use std::fmt::Write as _;

/// End-of-run summary: one line per template, in manifest order.
#[derive(Debug)]
pub struct BuildReport {
    pub results: Vec<BuildResult>,
}
impl BuildReport {
    pub fn new(results: Vec<BuildResult>) -> Self {
        Self { results }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn get(&self, template_id: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.template_id == template_id)
    }

    /// Formats the report as printed at the end of a run.
    pub fn render(&self) -> String {
        let mut out = String::new();

        for result in &self.results {
            match &result.outcome {
                Ok(files) => {
                    let _ = writeln!(
                        out,
                        "{} {} → {} ({} files)",
                        "✓".green(),
                        result.template_id.bold(),
                        result.output_root.display(),
                        files.len()
                    );
                }
                Err(error) => {
                    let _ = writeln!(
                        out,
                        "{} {} [{}] {}",
                        "✗".red(),
                        result.template_id.bold(),
                        error.kind().yellow(),
                        error
                    );
                }
            }
        }

        let summary = format!("{} built, {} failed", self.succeeded(), self.failed());

        let _ = writeln!(
            out,
            "\n{}",
            if self.has_failures() {
                summary.red()
            } else {
                summary.green()
            }
        );

        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}
