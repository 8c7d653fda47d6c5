use anyhow::{Context, Result};
use std::path::PathBuf;

use boq_lifecycle::boq::{
    parser_for, BoqId, BoqService, CommandOutcome, ImportOutcome, LifecycleCommand,
    LineCollection, RowParser,
};

use super::record::print_actions;

/// Import a row file into one line collection
pub struct ImportCommand {
    pub id: String,
    pub kind: LineCollection,
    pub file: PathBuf,
}

impl ImportCommand {
    pub async fn execute(&self, service: &BoqService) -> Result<()> {
        let parser = parser_for(&self.file)?;
        let rows = parser
            .parse(&self.file)
            .with_context(|| format!("Failed to parse {}", self.file.display()))?;
        println!("📥 Read {} rows from {}", rows.len(), self.file.display());

        let id = BoqId::new(self.id.as_str());
        let report = service
            .spawn_import(id.clone(), self.kind, rows)
            .await
            .context("Import task panicked")??;

        if let CommandOutcome::Imported(result) = &report.outcome {
            let icon = match result.outcome() {
                ImportOutcome::Complete => "✅",
                ImportOutcome::Partial => "⚠️ ",
                ImportOutcome::Failed | ImportOutcome::Empty => "❌",
            };
            println!("{icon} {}", result.summary());
            for failure in &result.failed {
                println!("   row {}: {}", failure.row_index, failure.reason);
            }
        }
        print_actions(service, &id).await
    }
}

/// Any other lifecycle command; prints the outcome summary and what comes next
pub struct RunCommand {
    pub id: String,
    pub command: LifecycleCommand,
}

impl RunCommand {
    pub async fn execute(&self, service: &BoqService) -> Result<()> {
        let id = BoqId::new(self.id.as_str());
        let report = service.run(&id, self.command.clone()).await?;
        println!("✅ {}", report.outcome.summary());

        match &report.outcome {
            CommandOutcome::ItemsDerived(result) => {
                for item in &result.created {
                    println!("   item {item}");
                }
                for skipped in &result.skipped {
                    println!(
                        "   skipped {} line {}: {:?}",
                        skipped.collection, skipped.line_id, skipped.reason
                    );
                }
            }
            CommandOutcome::TasksDerived(result) => {
                for task in &result.created {
                    println!("   task {task}");
                }
            }
            _ => {}
        }
        print_actions(service, &id).await
    }
}
