use anyhow::Result;

use boq_lifecycle::boq::{BoqId, BoqRecord, BoqService, LineCollection};

pub struct CreateCommand {
    pub id: String,
    pub project: String,
    pub warehouse: Option<String>,
}

impl CreateCommand {
    pub async fn execute(&self, service: &BoqService) -> Result<()> {
        let mut record = BoqRecord::new(BoqId::new(self.id.as_str()), self.project.as_str());
        if let Some(warehouse) = &self.warehouse {
            record = record.with_warehouse(warehouse.as_str());
        }
        let created = service.create_record(record).await?;
        println!("✅ Created BOQ {} for project {}", created.identity, created.project_ref);
        print_actions(service, &created.identity).await
    }
}

pub struct ListCommand;

impl ListCommand {
    pub async fn execute(&self, service: &BoqService) -> Result<()> {
        let ids = service.list().await?;
        if ids.is_empty() {
            println!("No BOQ records yet. Create one with 'boq-lifecycle create <id> --project <ref>'");
            return Ok(());
        }
        for id in ids {
            println!("{id}");
        }
        Ok(())
    }
}

pub struct ShowCommand {
    pub id: String,
    pub json: bool,
}

impl ShowCommand {
    pub async fn execute(&self, service: &BoqService) -> Result<()> {
        let record = service.load(&BoqId::new(self.id.as_str())).await?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&record)?);
            return Ok(());
        }

        println!("📋 BOQ {} (project {}, version {})", record.identity, record.project_ref, record.version);
        if let Some(warehouse) = &record.warehouse {
            println!("   Warehouse: {warehouse}");
        }
        println!("   Flags: {}", record.stage_flags);
        println!(
            "   Lines: {} BOQ, {} WBS",
            record.line_count(LineCollection::BoqLines),
            record.line_count(LineCollection::WbsLines)
        );
        let linked_items = record.boq_lines.iter().filter(|l| l.linked_item.is_some()).count()
            + record.wbs_lines.iter().filter(|l| l.linked_item.is_some()).count();
        let tasks = record.wbs_lines.iter().filter(|l| l.task.is_some()).count();
        println!("   Linked items: {linked_items}, tasks: {tasks}");
        Ok(())
    }
}

pub struct ActionsCommand {
    pub id: String,
}

impl ActionsCommand {
    pub async fn execute(&self, service: &BoqService) -> Result<()> {
        print_actions(service, &BoqId::new(self.id.as_str())).await
    }
}

pub async fn print_actions(service: &BoqService, id: &BoqId) -> Result<()> {
    let actions = service.available_actions(id).await?;
    if actions.is_empty() {
        println!("🏁 No lifecycle actions remaining for {id}");
        return Ok(());
    }
    println!("Available actions:");
    for action in actions {
        println!("  ▶ {action}");
    }
    Ok(())
}
